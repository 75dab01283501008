//! Simulated annealing over round order and game sides.
//!
//! Moves: swap two rounds, or flip one game. Cost is `1 - score`, so both
//! travel and breaks count. Worse moves are accepted with probability
//! `exp(-delta / T)` under geometric cooling; the best plan seen wins.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{finish, prepare, Algorithm, Plan, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::constraints::ITERATIONS;
use crate::error::OptimizeResult;

const MIN_TEMPERATURE: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct SimulatedAnnealingStrategy {
    pub iterations: u64,
    pub initial_temperature: f64,
    /// Per-step multiplier on the temperature.
    pub cooling_rate: f64,
}

impl Default for SimulatedAnnealingStrategy {
    fn default() -> Self {
        Self {
            iterations: 2000,
            initial_temperature: 0.05,
            cooling_rate: 0.995,
        }
    }
}

impl Strategy for SimulatedAnnealingStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SimulatedAnnealing
    }

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let model = &prepared.model;
        let iterations = request
            .constraints
            .u32(ITERATIONS)
            .map_or(self.iterations, u64::from);
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed);

        let mut current = prepared.baseline.clone();
        let mut current_cost = 1.0 - prepared.baseline_score;
        let mut best = current.clone();
        let mut best_cost = current_cost;
        let mut temperature = self.initial_temperature;
        let mut accepted = 0u64;
        let mut steps = 0u64;

        for _ in 0..iterations {
            let mut candidate = current.clone();
            if !perturb(&mut candidate, &mut rng) {
                break;
            }
            steps += 1;
            let cost = 1.0 - model.assess(&candidate).score;
            let delta = cost - current_cost;
            if delta <= 0.0 || rng.random::<f64>() < (-delta / temperature).exp() {
                current = candidate;
                current_cost = cost;
                accepted += 1;
                if cost < best_cost {
                    best = current.clone();
                    best_cost = cost;
                }
            }
            temperature = (temperature * self.cooling_rate).max(MIN_TEMPERATURE);
        }

        let search = Search {
            iterations: steps,
            seed: Some(request.seed),
            notes: vec![format!(
                "{accepted} of {steps} moves accepted; final temperature {temperature:.2e}"
            )],
        };
        Ok(finish(request, prepared, Algorithm::SimulatedAnnealing, best, search))
    }
}

/// Apply one random move. `false` when the plan has nothing to move.
fn perturb(plan: &mut Plan, rng: &mut ChaCha8Rng) -> bool {
    let can_swap = plan.len() >= 2;
    let playable: Vec<usize> = (0..plan.len()).filter(|&r| !plan[r].is_empty()).collect();
    if !can_swap && playable.is_empty() {
        return false;
    }

    if can_swap && (playable.is_empty() || rng.random_bool(0.5)) {
        let i = rng.random_range(0..plan.len());
        let mut j = rng.random_range(0..plan.len() - 1);
        if j >= i {
            j += 1;
        }
        plan.swap(i, j);
    } else {
        let round = playable[rng.random_range(0..playable.len())];
        let slot = rng.random_range(0..plan[round].len());
        let (home, away) = plan[round][slot];
        plan[round][slot] = (away, home);
    }
    true
}
