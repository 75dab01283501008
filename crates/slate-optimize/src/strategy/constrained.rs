//! Constrained scheduling: divisional grouping plus home/away streak repair.

use super::{finish, prepare, Algorithm, Fixture, Plan, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::constraints::{MAX_CONSECUTIVE_AWAY, MAX_CONSECUTIVE_HOME};
use crate::error::OptimizeResult;
use crate::quality::QualityModel;

pub const DEFAULT_MAX_STREAK: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstrainedSchedulingStrategy;

impl Strategy for ConstrainedSchedulingStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ConstrainedScheduling
    }

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let mut plan = prepared.baseline.clone();
        let mut notes = Vec::new();

        if prepared.model.has_divisions() {
            group_divisions(&mut plan, &prepared.model);
            notes.push("rounds heavy in intra-division games moved to the end".to_string());
        }

        let max_home = request
            .constraints
            .u32(MAX_CONSECUTIVE_HOME)
            .unwrap_or(DEFAULT_MAX_STREAK)
            .max(1);
        let max_away = request
            .constraints
            .u32(MAX_CONSECUTIVE_AWAY)
            .unwrap_or(DEFAULT_MAX_STREAK)
            .max(1);
        let flips = repair_streaks(&mut plan, prepared.model.team_count(), max_home, max_away);
        notes.push(format!(
            "{flips} game(s) flipped to hold streaks to {max_home} home / {max_away} away"
        ));

        let search = Search {
            iterations: flips as u64,
            seed: None,
            notes,
        };
        Ok(finish(request, prepared, Algorithm::ConstrainedScheduling, plan, search))
    }
}

/// Stable sort: rounds with more intra-division games go later.
fn group_divisions(plan: &mut Plan, model: &QualityModel) {
    plan.sort_by_key(|round| {
        round
            .iter()
            .filter(|&&(home, away)| model.same_division(home, away))
            .count()
    });
}

#[derive(Debug, Clone, Copy, Default)]
struct Streak {
    home: bool,
    length: u32,
}

impl Streak {
    fn next(self, home: bool) -> u32 {
        if self.length > 0 && self.home == home {
            self.length + 1
        } else {
            1
        }
    }
}

/// Walk the plan in order and flip any game that would push either team
/// past its streak limit, provided the flipped game does not. Returns the
/// number of flips.
pub(crate) fn repair_streaks(plan: &mut Plan, teams: usize, max_home: u32, max_away: u32) -> usize {
    let mut streaks = vec![Streak::default(); teams];
    let breaches = |streaks: &[Streak], (home, away): Fixture| {
        streaks[home].next(true) > max_home || streaks[away].next(false) > max_away
    };

    let mut flips = 0;
    for fixture in plan.iter_mut().flatten() {
        let (home, away) = *fixture;
        if breaches(&streaks, (home, away)) && !breaches(&streaks, (away, home)) {
            *fixture = (away, home);
            flips += 1;
        }
        let (home, away) = *fixture;
        streaks[home] = Streak {
            home: true,
            length: streaks[home].next(true),
        };
        streaks[away] = Streak {
            home: false,
            length: streaks[away].next(false),
        };
    }
    flips
}
