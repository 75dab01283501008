//! Schedule quality: travel, home/away breaks and a combined score.
//!
//! [`QualityModel`] scores a [`Plan`] on team indices with a precomputed
//! distance matrix, which keeps the search strategies cheap. Teams are
//! assumed to play at the home team's location, the same rule
//! [`slate_core::travel`] applies when a game names no venue.
//!
//! The score sits in `[0, 1]`:
//!
//! - travel part: `1 - travel / reference`, where `reference` is the cost
//!   of every away team making a separate round trip. Chaining away games
//!   never costs more than that (triangle inequality), so the ratio is at
//!   most 1. The reference does not depend on which side is home.
//! - break part: `1 - breaks / max_breaks`, a break being two consecutive
//!   games on the same side for one team.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use slate_core::{Schedule, Team};

use crate::strategy::{Fixture, Plan, Round};

pub const TRAVEL_WEIGHT: f64 = 0.6;
pub const BREAK_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub travel_km: f64,
    pub breaks: usize,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct QualityModel {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    divisions: Vec<Option<String>>,
    distance: Vec<Vec<f64>>,
}

impl QualityModel {
    pub fn new(teams: &[Team]) -> Self {
        let distance = teams
            .iter()
            .map(|a| teams.iter().map(|b| a.location.distance_km(&b.location)).collect())
            .collect();
        Self {
            ids: teams.iter().map(|t| t.id.clone()).collect(),
            index: teams
                .iter()
                .enumerate()
                .map(|(i, t)| (t.id.clone(), i))
                .collect(),
            divisions: teams.iter().map(|t| t.division.clone()).collect(),
            distance,
        }
    }

    pub fn team_count(&self) -> usize {
        self.ids.len()
    }

    pub fn index_of(&self, team_id: &str) -> Option<usize> {
        self.index.get(team_id).copied()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn same_division(&self, a: usize, b: usize) -> bool {
        matches!((&self.divisions[a], &self.divisions[b]), (Some(x), Some(y)) if x == y)
    }

    pub fn has_divisions(&self) -> bool {
        self.divisions.iter().any(Option::is_some)
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.distance[a][b]
    }

    /// Kilometres travelled by every team: from home, game to game in
    /// round order, then back home.
    pub fn travel_km(&self, plan: &[Vec<Fixture>]) -> f64 {
        let mut position: Vec<usize> = (0..self.team_count()).collect();
        let mut total = 0.0;
        for round in plan {
            for &(home, away) in round {
                total += self.distance[position[home]][home];
                total += self.distance[position[away]][home];
                position[home] = home;
                position[away] = home;
            }
        }
        total
            + position
                .iter()
                .enumerate()
                .map(|(team, &at)| self.distance[at][team])
                .sum::<f64>()
    }

    /// Separate round trip per away game.
    pub fn reference_km(&self, plan: &[Vec<Fixture>]) -> f64 {
        plan.iter()
            .flatten()
            .map(|&(home, away)| 2.0 * self.distance[home][away])
            .sum()
    }

    /// Consecutive same-side games, summed over teams. Byes do not reset a run.
    pub fn breaks(&self, plan: &[Vec<Fixture>]) -> usize {
        let mut last_home: Vec<Option<bool>> = vec![None; self.team_count()];
        let mut breaks = 0;
        for &(home, away) in plan.iter().flatten() {
            for (team, is_home) in [(home, true), (away, false)] {
                if last_home[team] == Some(is_home) {
                    breaks += 1;
                }
                last_home[team] = Some(is_home);
            }
        }
        breaks
    }

    /// A plan with no fixtures scores 0.
    pub fn assess(&self, plan: &[Vec<Fixture>]) -> QualityReport {
        if plan.iter().all(Vec::is_empty) {
            return QualityReport {
                travel_km: 0.0,
                breaks: 0,
                score: 0.0,
            };
        }
        let travel_km = self.travel_km(plan);
        let reference = self.reference_km(plan);
        let travel_part = if reference > 0.0 {
            (1.0 - travel_km / reference).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let mut games = vec![0usize; self.team_count()];
        for &(home, away) in plan.iter().flatten() {
            games[home] += 1;
            games[away] += 1;
        }
        let max_breaks: usize = games.iter().map(|g| g.saturating_sub(1)).sum();
        let breaks = self.breaks(plan);
        let break_part = if max_breaks > 0 {
            1.0 - breaks as f64 / max_breaks as f64
        } else {
            1.0
        };

        QualityReport {
            travel_km,
            breaks,
            score: (TRAVEL_WEIGHT * travel_part + BREAK_WEIGHT * break_part).clamp(0.0, 1.0),
        }
    }

    /// Map materialized rounds back onto team indices. `None` when a game
    /// names a team this model does not know.
    pub fn plan_from_rounds(&self, rounds: &[Round]) -> Option<Plan> {
        rounds
            .iter()
            .map(|round| {
                round
                    .games
                    .iter()
                    .map(|g| Some((self.index_of(&g.home_team_id)?, self.index_of(&g.away_team_id)?)))
                    .collect()
            })
            .collect()
    }
}

/// `home - away` per team.
pub fn home_away_difference(schedule: &Schedule) -> BTreeMap<String, i64> {
    let mut diff: BTreeMap<String, i64> = schedule.teams.iter().map(|t| (t.id.clone(), 0)).collect();
    for game in &schedule.games {
        *diff.entry(game.home_team_id.clone()).or_default() += 1;
        *diff.entry(game.away_team_id.clone()).or_default() -= 1;
    }
    diff
}

pub fn max_home_away_imbalance(schedule: &Schedule) -> u32 {
    home_away_difference(schedule)
        .values()
        .map(|d| d.unsigned_abs() as u32)
        .max()
        .unwrap_or(0)
}

/// Shortest gap in days between two games of the same team.
pub fn min_rest_days(schedule: &Schedule) -> Option<i64> {
    schedule
        .teams
        .iter()
        .flat_map(|team| {
            let games = schedule.games_for_team(&team.id);
            games
                .windows(2)
                .map(|pair| (pair[1].date - pair[0].date).num_days())
                .collect::<Vec<_>>()
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slate_core::{Game, Location, Sport};
    use chrono::NaiveDate;

    fn teams() -> Vec<Team> {
        vec![
            Team::new("a", "A", Location::new(0.0, 0.0)),
            Team::new("b", "B", Location::new(0.0, 1.0)),
            Team::new("c", "C", Location::new(0.0, 2.0)),
        ]
    }

    #[test]
    fn test_travel_matches_core_travel_math() {
        let model = QualityModel::new(&teams());
        let plan: Plan = vec![vec![(0, 1)], vec![(2, 0)], vec![(1, 2)]];
        let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
        let schedule = Schedule::new(Sport::Other, teams()).with_games(vec![
            Game::new("a", "b", day(1)),
            Game::new("c", "a", day(2)),
            Game::new("b", "c", day(3)),
        ]);
        let expected = slate_core::travel::total_travel_km(&schedule);
        assert!((model.travel_km(&plan) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_chaining_never_exceeds_reference() {
        let model = QualityModel::new(&teams());
        let plan: Plan = vec![vec![(1, 0)], vec![(2, 0)], vec![(2, 1)]];
        assert!(model.travel_km(&plan) <= model.reference_km(&plan) + 1e-9);
        let report = model.assess(&plan);
        assert!((0.0..=1.0).contains(&report.score));
    }

    #[test]
    fn test_breaks_count_same_side_runs() {
        let model = QualityModel::new(&teams());
        // a: home, home -> one break. b: away, then home. c: away, away -> one break.
        let plan: Plan = vec![vec![(0, 1)], vec![(0, 2)], vec![(1, 2)]];
        assert_eq!(model.breaks(&plan), 2);
    }

    #[test]
    fn test_colocated_teams_score_on_breaks_alone() {
        let same = vec![
            Team::new("x", "X", Location::default()),
            Team::new("y", "Y", Location::default()),
        ];
        let model = QualityModel::new(&same);
        let report = model.assess(&[vec![(0, 1)], vec![(1, 0)]]);
        assert_eq!(report.travel_km, 0.0);
        assert_eq!(report.breaks, 0);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_empty_plan_scores_zero() {
        let model = QualityModel::new(&teams());
        assert_eq!(model.assess(&[]).score, 0.0);
        assert_eq!(model.assess(&[vec![], vec![]]).score, 0.0);
    }

    #[test]
    fn test_unknown_team_in_rounds() {
        let model = QualityModel::new(&teams());
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let rounds = vec![Round {
            number: 1,
            date: day,
            games: vec![Game::new("a", "zed", day)],
        }];
        assert!(model.plan_from_rounds(&rounds).is_none());
    }

    #[test]
    fn test_schedule_balance_and_rest() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
        let schedule = Schedule::new(Sport::Other, teams()).with_games(vec![
            Game::new("a", "b", day(1)),
            Game::new("a", "c", day(4)),
            Game::new("b", "c", day(6)),
        ]);
        assert_eq!(max_home_away_imbalance(&schedule), 2);
        assert_eq!(min_rest_days(&schedule), Some(2));
    }
}
