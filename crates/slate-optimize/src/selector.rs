//! Strategy selection.
//!
//! A coarse placeholder policy, not a tuned model: it only looks at how many
//! preference keys the caller set, whether travel matters, and league size.

use slate_core::Sport;
use tracing::debug;

use crate::constraints::SchedulingConstraints;
use crate::strategy::Algorithm;

/// More keys than this counts as a heavily constrained request.
pub const CONSTRAINT_KEY_THRESHOLD: usize = 3;

/// Leagues above this size go to the search strategies.
pub const LARGE_LEAGUE_TEAMS: usize = 12;

pub fn select_algorithm(
    sport: Sport,
    team_count: usize,
    constraints: &SchedulingConstraints,
) -> Algorithm {
    let constrained = constraints.len() > CONSTRAINT_KEY_THRESHOLD;
    let algorithm = if constrained && constraints.minimize_travel() {
        Algorithm::TravelingTournament
    } else if constrained {
        Algorithm::ConstrainedScheduling
    } else if team_count > LARGE_LEAGUE_TEAMS {
        Algorithm::SimulatedAnnealing
    } else {
        Algorithm::RoundRobin
    };
    debug!(
        sport = %sport,
        team_count,
        constraint_keys = constraints.len(),
        algorithm = %algorithm,
        "algorithm selected"
    );
    algorithm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{MINIMIZE_TRAVEL, MIN_REST_DAYS, SERIES_LENGTH};
    use serde_json::json;

    fn keys(n: usize) -> SchedulingConstraints {
        (0..n).map(|i| (format!("k{i}"), json!(i))).collect()
    }

    #[test]
    fn test_small_unconstrained_league_uses_round_robin() {
        assert_eq!(
            select_algorithm(Sport::Soccer, 12, &SchedulingConstraints::new()),
            Algorithm::RoundRobin
        );
    }

    #[test]
    fn test_large_league_anneals() {
        assert_eq!(
            select_algorithm(Sport::Soccer, 13, &keys(3)),
            Algorithm::SimulatedAnnealing
        );
    }

    #[test]
    fn test_many_keys_with_travel_flag() {
        let c = keys(3).with(MINIMIZE_TRAVEL, json!(true));
        assert_eq!(select_algorithm(Sport::Hockey, 6, &c), Algorithm::TravelingTournament);
    }

    #[test]
    fn test_many_keys_without_travel_flag() {
        let c = SchedulingConstraints::new()
            .with(MINIMIZE_TRAVEL, json!(false))
            .with(MIN_REST_DAYS, json!(2))
            .with(SERIES_LENGTH, json!(3))
            .with("blackoutDates", json!([]));
        assert_eq!(
            select_algorithm(Sport::Baseball, 30, &c),
            Algorithm::ConstrainedScheduling
        );
    }

    #[test]
    fn test_travel_flag_alone_is_not_enough() {
        let c = SchedulingConstraints::new().with(MINIMIZE_TRAVEL, json!(true));
        assert_eq!(select_algorithm(Sport::Hockey, 6, &c), Algorithm::RoundRobin);
    }
}
