//! Partial round robin: the first `gamesPerTeam` rounds of the baseline.

use super::{finish, prepare, Algorithm, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::constraints::GAMES_PER_TEAM;
use crate::error::OptimizeResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct PartialRoundRobinStrategy;

impl Strategy for PartialRoundRobinStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::PartialRoundRobin
    }

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let available = prepared.baseline.len();
        let mut search = Search::default();

        let keep = match request.constraints.u32(GAMES_PER_TEAM) {
            Some(wanted) if wanted as usize > available => {
                search.notes.push(format!(
                    "gamesPerTeam {wanted} exceeds a full round robin; capped at {available} rounds"
                ));
                available
            }
            Some(wanted) => wanted as usize,
            None => {
                search
                    .notes
                    .push("gamesPerTeam not set; kept the full round robin".to_string());
                available
            }
        };

        let plan = prepared.baseline[..keep].to_vec();
        search.iterations = keep as u64;
        Ok(finish(request, prepared, Algorithm::PartialRoundRobin, plan, search))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::SchedulingConstraints;
    use crate::strategy::fixtures;
    use serde_json::json;

    #[test]
    fn test_keeps_requested_rounds() {
        let request = fixtures::request(8)
            .with_constraints(SchedulingConstraints::new().with(GAMES_PER_TEAM, json!(3)));
        let output = PartialRoundRobinStrategy.optimize(&request).unwrap();
        assert_eq!(output.rounds.len(), 3);
        assert_eq!(output.games().count(), 12);
        for team in &request.teams {
            let played = output.games().filter(|g| g.involves(&team.id)).count();
            assert_eq!(played, 3);
        }
    }

    #[test]
    fn test_caps_at_full_round_robin() {
        let request = fixtures::request(4)
            .with_constraints(SchedulingConstraints::new().with(GAMES_PER_TEAM, json!(10)));
        let output = PartialRoundRobinStrategy.optimize(&request).unwrap();
        assert_eq!(output.rounds.len(), 3);
        assert!(output.metadata.notes.iter().any(|n| n.contains("capped")));
    }
}
