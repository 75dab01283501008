use async_trait::async_trait;
use serde_json::json;

use crate::constraint::{Rule, RuleError, RuleOutcome, RuleViolation};
use crate::domain::{ConstraintDefinition, DefinitionError, EvaluationContext, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    fn label(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// Caps runs of consecutive home (or away) games per team.
#[derive(Debug, Clone)]
pub struct ConsecutiveGamesRule {
    pub side: Side,
    pub max: u32,
}

impl ConsecutiveGamesRule {
    pub fn from_definition(
        definition: &ConstraintDefinition,
        side: Side,
    ) -> Result<Self, DefinitionError> {
        let max = definition.param_u32("max")?.unwrap_or(3);
        if max == 0 {
            return Err(definition.invalid_parameter("max", "must be at least 1"));
        }
        Ok(Self { side, max })
    }
}

#[async_trait]
impl Rule for ConsecutiveGamesRule {
    fn kind(&self) -> &str {
        match self.side {
            Side::Home => "max_consecutive_home",
            Side::Away => "max_consecutive_away",
        }
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let mut violations = Vec::new();
        let mut longest = 0usize;
        for team in &schedule.teams {
            let games = schedule.games_for_team(&team.id);
            let mut run: Vec<&str> = Vec::new();
            // Sentinel `None` flushes the final run.
            for game in games.iter().map(Some).chain(std::iter::once(None)) {
                let on_side = game.is_some_and(|g| g.is_home(&team.id) == (self.side == Side::Home));
                if on_side {
                    if let Some(g) = game {
                        run.push(&g.id);
                    }
                    continue;
                }
                longest = longest.max(run.len());
                if run.len() > self.max as usize {
                    violations.push(
                        RuleViolation::new(
                            &team.id,
                            format!(
                                "{} plays {} consecutive {} games (maximum {})",
                                team.name,
                                run.len(),
                                self.side.label(),
                                self.max
                            ),
                        )
                        .with_severity((run.len() - self.max as usize) as f64)
                        .with_games(run.iter().map(|id| id.to_string()).collect()),
                    );
                }
                run.clear();
            }
        }

        Ok(RuleOutcome::checked(schedule.teams.len())
            .with_violations(violations)
            .with_details(json!({ "max": self.max, "longestRun": longest })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Game, Location, Sport, Team};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn schedule() -> Schedule {
        let teams = vec![
            Team::new("a", "A", Location::default()),
            Team::new("b", "B", Location::default()),
            Team::new("c", "C", Location::default()),
            Team::new("d", "D", Location::default()),
        ];
        // a is away four times in a row, then home once.
        Schedule::new(Sport::Baseball, teams).with_games(vec![
            Game::new("b", "a", day(1)),
            Game::new("c", "a", day(2)),
            Game::new("d", "a", day(3)),
            Game::new("b", "a", day(4)),
            Game::new("a", "c", day(5)),
        ])
    }

    #[tokio::test]
    async fn test_long_away_trip_is_flagged_with_excess_severity() {
        let rule = ConsecutiveGamesRule {
            side: Side::Away,
            max: 2,
        };
        let outcome = rule.evaluate(&schedule(), &EvaluationContext::new()).await.unwrap();
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].subject, "a");
        assert_eq!(outcome.violations[0].severity, 2.0);
        assert_eq!(outcome.violations[0].game_ids.len(), 4);
        assert_eq!(outcome.details["longestRun"], json!(4));
    }

    #[tokio::test]
    async fn test_home_runs_flushed_at_season_end() {
        let rule = ConsecutiveGamesRule {
            side: Side::Home,
            max: 1,
        };
        // b hosts a twice at the end of its season.
        let outcome = rule.evaluate(&schedule(), &EvaluationContext::new()).await.unwrap();
        let b = outcome.violations.iter().find(|v| v.subject == "b");
        assert!(b.is_some(), "{:?}", outcome.violations);
    }

    #[test]
    fn test_zero_max_is_rejected() {
        let def = ConstraintDefinition::new(
            "c",
            "max_consecutive_home",
            crate::domain::ConstraintScope::Team,
            crate::domain::ConstraintCategory::Soft,
        )
        .with_param("max", json!(0));
        assert!(ConsecutiveGamesRule::from_definition(&def, Side::Home).is_err());
    }
}
