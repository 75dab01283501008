use async_trait::async_trait;
use serde_json::json;

use crate::constraint::{Rule, RuleError, RuleOutcome, RuleViolation};
use crate::domain::{ConstraintDefinition, DefinitionError, EvaluationContext, Schedule};
use crate::travel::travel_by_team;

/// Season travel per team must stay under `max_km_per_team`.
///
/// Severity is the excess as a fraction of the limit, so a team travelling
/// 1.5× its budget scores 0.5.
#[derive(Debug, Clone)]
pub struct TravelDistanceRule {
    pub max_km_per_team: f64,
}

impl TravelDistanceRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        let max = definition
            .param_f64("maxKmPerTeam")?
            .ok_or_else(|| definition.invalid_parameter("maxKmPerTeam", "is required"))?;
        if !max.is_finite() || max <= 0.0 {
            return Err(definition.invalid_parameter("maxKmPerTeam", "must be a positive number"));
        }
        Ok(Self {
            max_km_per_team: max,
        })
    }
}

#[async_trait]
impl Rule for TravelDistanceRule {
    fn kind(&self) -> &str {
        "travel_distance"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let by_team = travel_by_team(schedule);
        let violations = by_team
            .iter()
            .filter(|&(_, &km)| km > self.max_km_per_team)
            .map(|(team, &km)| {
                RuleViolation::new(
                    team,
                    format!(
                        "{team} travels {km:.0} km (limit {:.0} km)",
                        self.max_km_per_team
                    ),
                )
                .with_severity((km - self.max_km_per_team) / self.max_km_per_team)
            })
            .collect();
        let total: f64 = by_team.values().sum();

        Ok(RuleOutcome::checked(by_team.len())
            .with_violations(violations)
            .with_details(json!({ "maxKmPerTeam": self.max_km_per_team, "totalKm": total })))
    }
}
