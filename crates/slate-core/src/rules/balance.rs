use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::constraint::{Rule, RuleError, RuleOutcome, RuleViolation};
use crate::domain::{ConstraintDefinition, DefinitionError, EvaluationContext, Schedule};

/// |home − away| per team must not exceed `max_difference`.
#[derive(Debug, Clone)]
pub struct HomeAwayBalanceRule {
    pub max_difference: u32,
}

impl HomeAwayBalanceRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        Ok(Self {
            max_difference: definition.param_u32("maxDifference")?.unwrap_or(1),
        })
    }
}

#[async_trait]
impl Rule for HomeAwayBalanceRule {
    fn kind(&self) -> &str {
        "home_away_balance"
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
        let mut worst = 0i64;
        for team in &schedule.teams {
            let games = schedule.games_for_team(&team.id);
            let home = games.iter().filter(|g| g.is_home(&team.id)).count() as i64;
            let away = games.len() as i64 - home;
            let diff = (home - away).abs();
            worst = worst.max(diff);
            if diff > i64::from(self.max_difference) {
                violations.push(
                    RuleViolation::new(
                        &team.id,
                        format!("{} has {home} home and {away} away games", team.name),
                    )
                    .with_severity((diff - i64::from(self.max_difference)) as f64),
                );
            }
        }

        Ok(RuleOutcome::checked(schedule.teams.len())
            .with_violations(violations)
            .with_details(json!({ "maxDifference": self.max_difference, "worstDifference": worst })))
    }
}

/// Each team's game count must fall within `[min, max]`.
#[derive(Debug, Clone)]
pub struct GamesPerTeamRule {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl GamesPerTeamRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        let min = definition.param_u32("min")?;
        let max = definition.param_u32("max")?;
        match (min, max) {
            (None, None) => Err(definition.invalid_parameter("min", "one of min or max is required")),
            (Some(lo), Some(hi)) if lo > hi => {
                Err(definition.invalid_parameter("min", format!("min {lo} exceeds max {hi}")))
            }
            _ => Ok(Self { min, max }),
        }
    }
}

#[async_trait]
impl Rule for GamesPerTeamRule {
    fn kind(&self) -> &str {
        "games_per_team"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if schedule.teams.is_empty() {
            return Ok(RuleOutcome::not_applicable("schedule has no teams"));
        }

        let mut counts: BTreeMap<&str, u32> =
            schedule.teams.iter().map(|t| (t.id.as_str(), 0)).collect();
        for game in &schedule.games {
            for id in [&game.home_team_id, &game.away_team_id] {
                if let Some(n) = counts.get_mut(id.as_str()) {
                    *n += 1;
                }
            }
        }

        let violations = counts
            .iter()
            .filter_map(|(&team, &n)| {
                let short = self.min.filter(|&lo| n < lo).map(|lo| lo - n);
                let over = self.max.filter(|&hi| n > hi).map(|hi| n - hi);
                short.or(over).map(|gap| {
                    RuleViolation::new(team, format!("{team} plays {n} games"))
                        .with_severity(f64::from(gap))
                })
            })
            .collect();

        Ok(RuleOutcome::checked(counts.len())
            .with_violations(violations)
            .with_details(json!({ "min": self.min, "max": self.max })))
    }
}

/// Each unordered pair of teams meets at most `max_meetings` times.
#[derive(Debug, Clone)]
pub struct UniqueMatchupsRule {
    pub max_meetings: u32,
}

impl UniqueMatchupsRule {
    pub fn from_definition(definition: &ConstraintDefinition) -> Result<Self, DefinitionError> {
        Ok(Self {
            max_meetings: definition.param_u32("maxMeetings")?.unwrap_or(1).max(1),
        })
    }
}

#[async_trait]
impl Rule for UniqueMatchupsRule {
    fn kind(&self) -> &str {
        "unique_matchups"
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        _context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError> {
        if let Some(outcome) = super::require_games(schedule) {
            return Ok(outcome);
        }

        let mut meetings: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
        for game in &schedule.games {
            let (a, b) = if game.home_team_id <= game.away_team_id {
                (game.home_team_id.as_str(), game.away_team_id.as_str())
            } else {
                (game.away_team_id.as_str(), game.home_team_id.as_str())
            };
            meetings.entry((a, b)).or_default().push(game.id.clone());
        }

        let violations = meetings
            .iter()
            .filter(|(_, games)| games.len() > self.max_meetings as usize)
            .map(|((a, b), games)| {
                RuleViolation::new(
                    format!("{a}-{b}"),
                    format!("{a} and {b} meet {} times", games.len()),
                )
                .with_severity((games.len() - self.max_meetings as usize) as f64)
                .with_games(games.clone())
            })
            .collect();

        Ok(RuleOutcome::checked(meetings.len()).with_violations(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Game, Location, Sport, Team};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn schedule(games: Vec<Game>) -> Schedule {
        Schedule::new(
            Sport::Soccer,
            vec![
                Team::new("a", "A", Location::default()),
                Team::new("b", "B", Location::default()),
                Team::new("c", "C", Location::default()),
            ],
        )
        .with_games(games)
    }

    #[tokio::test]
    async fn test_balance_flags_lopsided_team() {
        let s = schedule(vec![
            Game::new("a", "b", day(1)),
            Game::new("a", "c", day(2)),
            Game::new("a", "b", day(3)),
        ]);
        let rule = HomeAwayBalanceRule { max_difference: 1 };
        let outcome = rule.evaluate(&s, &EvaluationContext::new()).await.unwrap();
        // a: 3-0, b: 0-2, c: 0-1
        let subjects: Vec<_> = outcome.violations.iter().map(|v| v.subject.as_str()).collect();
        assert_eq!(subjects, vec!["a", "b"]);
        assert_eq!(outcome.violations[0].severity, 2.0);
    }

    #[tokio::test]
    async fn test_games_per_team_bounds() {
        let s = schedule(vec![Game::new("a", "b", day(1)), Game::new("a", "b", day(2))]);
        let rule = GamesPerTeamRule {
            min: Some(1),
            max: Some(1),
        };
        let outcome = rule.evaluate(&s, &EvaluationContext::new()).await.unwrap();
        // a=2 (over), b=2 (over), c=0 (short)
        assert_eq!(outcome.checked, 3);
        assert_eq!(outcome.violations.len(), 3);
    }

    #[test]
    fn test_games_per_team_requires_a_bound() {
        let def = ConstraintDefinition::new(
            "g",
            "games_per_team",
            crate::domain::ConstraintScope::Team,
            crate::domain::ConstraintCategory::Hard,
        );
        assert!(GamesPerTeamRule::from_definition(&def).is_err());
    }

    #[tokio::test]
    async fn test_repeat_matchup_regardless_of_venue() {
        let s = schedule(vec![Game::new("a", "b", day(1)), Game::new("b", "a", day(8))]);
        let rule = UniqueMatchupsRule { max_meetings: 1 };
        let outcome = rule.evaluate(&s, &EvaluationContext::new()).await.unwrap();
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].subject, "a-b");
        assert_eq!(outcome.violations[0].game_ids.len(), 2);
    }
}
