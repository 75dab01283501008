//! Traveling-tournament heuristic: reorder rounds to cut total travel.
//!
//! Pairwise round swaps, first improvement, repeated until a full sweep
//! finds nothing. Game sides are left alone so home/away balance is that of
//! the baseline.

use super::{finish, prepare, Algorithm, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::error::OptimizeResult;

const IMPROVEMENT_EPSILON_KM: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct TravelingTournamentStrategy {
    pub max_sweeps: usize,
}

impl Default for TravelingTournamentStrategy {
    fn default() -> Self {
        Self { max_sweeps: 50 }
    }
}

impl Strategy for TravelingTournamentStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TravelingTournament
    }

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let model = &prepared.model;
        let mut plan = prepared.baseline.clone();
        let start_km = model.travel_km(&plan);
        let mut best_km = start_km;
        let mut iterations = 0u64;
        let mut sweeps = 0;

        while sweeps < self.max_sweeps {
            sweeps += 1;
            let mut improved = false;
            for i in 0..plan.len() {
                for j in i + 1..plan.len() {
                    iterations += 1;
                    plan.swap(i, j);
                    let km = model.travel_km(&plan);
                    if km + IMPROVEMENT_EPSILON_KM < best_km {
                        best_km = km;
                        improved = true;
                    } else {
                        plan.swap(i, j);
                    }
                }
            }
            if !improved {
                break;
            }
        }

        let search = Search {
            iterations,
            seed: None,
            notes: vec![format!(
                "round reordering cut travel from {start_km:.0} km to {best_km:.0} km in {sweeps} sweep(s)"
            )],
        };
        Ok(finish(request, prepared, Algorithm::TravelingTournament, plan, search))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{fixtures, RoundRobinStrategy};
    use std::collections::HashSet;

    #[test]
    fn test_never_travels_more_than_baseline() {
        let request = fixtures::request(8);
        let baseline = RoundRobinStrategy.optimize(&request).unwrap();
        let tuned = TravelingTournamentStrategy::default().optimize(&request).unwrap();
        assert!(
            tuned.metadata.travel_distance_total
                <= baseline.metadata.travel_distance_total + 1e-6
        );
    }

    #[test]
    fn test_keeps_the_same_fixtures() {
        let request = fixtures::request(6);
        let baseline = RoundRobinStrategy.optimize(&request).unwrap();
        let tuned = TravelingTournamentStrategy::default().optimize(&request).unwrap();
        let sides = |games: Vec<&slate_core::Game>| {
            games
                .into_iter()
                .map(|g| (g.home_team_id.clone(), g.away_team_id.clone()))
                .collect::<HashSet<_>>()
        };
        assert_eq!(sides(baseline.games().collect()), sides(tuned.games().collect()));
    }
}
