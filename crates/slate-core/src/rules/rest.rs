use async_trait::async_trait;
use serde_json::json;

use crate::constraint::{Rule, RuleError, RuleOutcome, RuleViolation};
use crate::domain::{ConstraintDefinition, DefinitionError, EvaluationContext, Schedule};

/// Minimum days between consecutive games of the same team.
#[derive(Debug, Clone)]
pub struct RestDaysRule {
    pub min_days: u32,
}

impl RestDaysRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        Ok(Self {
            min_days: definition.param_u32("minDays")?.unwrap_or(1),
        })
    }
}

#[async_trait]
impl Rule for RestDaysRule {
    fn kind(&self) -> &str {
        "rest_days"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let mut checked = 0;
        let mut violations = Vec::new();
        let mut shortest: Option<i64> = None;
        for team in &schedule.teams {
            let games = schedule.games_for_team(&team.id);
            for pair in games.windows(2) {
                checked += 1;
                let gap = (pair[1].date - pair[0].date).num_days();
                shortest = Some(shortest.map_or(gap, |s| s.min(gap)));
                if gap < i64::from(self.min_days) {
                    violations.push(
                        RuleViolation::new(
                            &team.id,
                            format!(
                                "{} has {} day(s) between games on {} and {} (minimum {})",
                                team.name, gap, pair[0].date, pair[1].date, self.min_days
                            ),
                        )
                        .with_games(vec![pair[0].id.clone(), pair[1].id.clone()]),
                    );
                }
            }
        }

        Ok(RuleOutcome::checked(checked)
            .with_violations(violations)
            .with_details(json!({ "minDays": self.min_days, "shortestGap": shortest })))
    }
}
