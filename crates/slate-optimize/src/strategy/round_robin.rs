//! Single round robin by the circle method.

use super::{finish, prepare, Algorithm, Plan, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::error::OptimizeResult;

/// Every team meets every other team once.
///
/// Team 0 stays fixed while the rest rotate one place per round. An odd
/// field is padded with a bye slot; pairings against it are dropped, so
/// `n` odd gives `n` rounds of `(n - 1) / 2` games and `n` even gives
/// `n - 1` rounds of `n / 2` games.
///
/// Sides follow slot parity, so a rotating team alternates home and away
/// as it moves along the ring; the fixed team alternates by round. No team
/// plays more than two in a row on one side in an even field.
pub fn circle_plan(team_count: usize) -> Plan {
    if team_count < 2 {
        return Vec::new();
    }
    let slots = team_count + team_count % 2;
    let bye = team_count;
    let mut ring: Vec<usize> = (0..slots).collect();
    let mut plan = Vec::with_capacity(slots - 1);

    for round in 0..slots - 1 {
        let mut fixtures = Vec::with_capacity(slots / 2);
        for i in 0..slots / 2 {
            let (a, b) = (ring[i], ring[slots - 1 - i]);
            if a == bye || b == bye {
                continue;
            }
            let a_home = if i == 0 { round % 2 == 0 } else { i % 2 == 1 };
            fixtures.push(if a_home { (a, b) } else { (b, a) });
        }
        plan.push(fixtures);
        ring[1..].rotate_right(1);
    }
    plan
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinStrategy;

impl Strategy for RoundRobinStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::RoundRobin
    }

    /// Always the plain circle method; an existing schedule is ignored.
    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let plan = circle_plan(prepared.model.team_count());
        Ok(finish(request, prepared, Algorithm::RoundRobin, plan, Search::default()))
    }
}
