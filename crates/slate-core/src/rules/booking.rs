use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use crate::constraint::{Rule, RuleError, RuleOutcome, RuleViolation};
use crate::domain::{ConstraintDefinition, DefinitionError, EvaluationContext, Game, Schedule};

/// A team plays at most one game per date.
#[derive(Debug, Clone, Copy)]
pub struct NoDoubleBookingRule;

#[async_trait]
impl Rule for NoDoubleBookingRule {
    fn kind(&self) -> &str {
        "no_double_booking"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let mut slots: BTreeMap<(&str, NaiveDate), Vec<&Game>> = BTreeMap::new();
        for game in &schedule.games {
            for team in [&game.home_team_id, &game.away_team_id] {
                slots.entry((team.as_str(), game.date)).or_default().push(game);
            }
        }
        Ok(collisions(slots, "is booked"))
    }
}

/// A venue hosts at most one game per date.
#[derive(Debug, Clone, Copy)]
pub struct VenueConflictRule;

#[async_trait]
impl Rule for VenueConflictRule {
    fn kind(&self) -> &str {
        "venue_conflict"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let mut slots: BTreeMap<(&str, NaiveDate), Vec<&Game>> = BTreeMap::new();
        for game in &schedule.games {
            if let Some(venue) = schedule.game_venue_id(game) {
                slots.entry((venue, game.date)).or_default().push(game);
            }
        }
        if slots.is_empty() {
            return Ok(RuleOutcome::not_applicable("no game has a resolvable venue"));
        }
        Ok(collisions(slots, "hosts"))
    }
}

fn collisions(slots: BTreeMap<(&str, NaiveDate), Vec<&Game>>, verb: &str) -> RuleOutcome {
    let violations = slots
        .iter()
        .filter(|(_, games)| games.len() > 1)
        .map(|((subject, date), games)| {
            RuleViolation::new(
                *subject,
                format!("{subject} {verb} {} games on {date}", games.len()),
            )
            .with_severity((games.len() - 1) as f64)
            .with_games(games.iter().map(|g| g.id.clone()).collect())
        })
        .collect();
    RuleOutcome::checked(slots.len()).with_violations(violations)
}

/// No games on blacked-out dates, optionally scoped to teams or venues.
#[derive(Debug, Clone)]
pub struct BlackoutDatesRule {
    pub dates: BTreeSet<NaiveDate>,
    pub teams: Option<HashSet<String>>,
    pub venues: Option<HashSet<String>>,
}

impl BlackoutDatesRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        let raw = definition
            .param_strings("dates")?
            .filter(|d| !d.is_empty())
            .ok_or_else(|| definition.invalid_parameter("dates", "at least one date is required"))?;
        let dates = raw
            .iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|e| {
                    definition.invalid_parameter("dates", format!("'{d}' is not YYYY-MM-DD: {e}"))
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            dates,
            teams: definition.param_strings("teams")?.map(|v| v.into_iter().collect()),
            venues: definition.param_strings("venues")?.map(|v| v.into_iter().collect()),
        })
    }

    fn in_scope(&self, schedule: &Schedule, game: &Game) -> bool {
        let team_hit = self
            .teams
            .as_ref()
            .map(|teams| teams.contains(&game.home_team_id) || teams.contains(&game.away_team_id));
        let venue_hit = self.venues.as_ref().map(|venues| {
            schedule
                .game_venue_id(game)
                .is_some_and(|v| venues.contains(v))
        });
        match (team_hit, venue_hit) {
            (None, None) => true,
            (t, v) => t.unwrap_or(false) || v.unwrap_or(false),
        }
    }
}

#[async_trait]
impl Rule for BlackoutDatesRule {
    fn kind(&self) -> &str {
        "blackout_dates"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let scoped: Vec<&Game> = schedule
            .games
            .iter()
            .filter(|g| self.in_scope(schedule, g))
            .collect();
        let violations = scoped
            .iter()
            .filter(|g| self.dates.contains(&g.date))
            .map(|g| {
                RuleViolation::new(
                    &g.id,
                    format!(
                        "{} vs {} is scheduled on blackout date {}",
                        g.home_team_id, g.away_team_id, g.date
                    ),
                )
                .with_games(vec![g.id.clone()])
            })
            .collect();

        Ok(RuleOutcome::checked(scoped.len())
            .with_violations(violations)
            .with_details(json!({ "blackoutDates": self.dates.len() })))
    }
}
