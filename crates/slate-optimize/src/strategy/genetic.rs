//! Genetic search over round order.
//!
//! A chromosome is a permutation of the baseline's rounds. Tournament
//! selection, order crossover, swap mutation and elitism. The identity
//! permutation seeds the population, so the result never scores below the
//! baseline.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{finish, prepare, Algorithm, Plan, Search, Strategy, StrategyOutput, StrategyRequest};
use crate::error::OptimizeResult;

type Chromosome = Vec<usize>;

#[derive(Debug, Clone, Copy)]
pub struct GeneticStrategy {
    pub population: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub elites: usize,
}

impl Default for GeneticStrategy {
    fn default() -> Self {
        Self {
            population: 30,
            generations: 60,
            mutation_rate: 0.2,
            tournament_size: 3,
            elites: 2,
        }
    }
}

impl Strategy for GeneticStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Genetic
    }

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput> {
        let prepared = prepare(request)?;
        let rounds = prepared.baseline.len();
        if rounds < 2 {
            let plan = prepared.baseline.clone();
            let search = Search {
                seed: Some(request.seed),
                notes: vec!["fewer than two rounds; nothing to reorder".to_string()],
                ..Search::default()
            };
            return Ok(finish(request, prepared, Algorithm::Genetic, plan, search));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(request.seed);
        let size = self.population.max(2);
        let fitness = |c: &Chromosome| prepared.model.assess(&decode(&prepared.baseline, c)).score;

        let mut population: Vec<Chromosome> = Vec::with_capacity(size);
        population.push((0..rounds).collect());
        while population.len() < size {
            let mut c: Chromosome = (0..rounds).collect();
            c.shuffle(&mut rng);
            population.push(c);
        }
        let mut scores: Vec<f64> = population.iter().map(|c| fitness(c)).collect();
        let mut evaluations = size as u64;

        for _ in 0..self.generations {
            let mut ranked: Vec<usize> = (0..size).collect();
            ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

            let mut next: Vec<Chromosome> = ranked
                .iter()
                .take(self.elites.min(size))
                .map(|&i| population[i].clone())
                .collect();
            while next.len() < size {
                let a = self.tournament(&scores, &mut rng);
                let b = self.tournament(&scores, &mut rng);
                let mut child = order_crossover(&population[a], &population[b], &mut rng);
                if rng.random::<f64>() < self.mutation_rate {
                    let i = rng.random_range(0..rounds);
                    let j = rng.random_range(0..rounds);
                    child.swap(i, j);
                }
                next.push(child);
            }

            population = next;
            scores = population.iter().map(|c| fitness(c)).collect();
            evaluations += size as u64;
        }

        let best = (0..size)
            .max_by(|&a, &b| scores[a].total_cmp(&scores[b]))
            .unwrap_or(0);
        let plan = decode(&prepared.baseline, &population[best]);
        let search = Search {
            iterations: evaluations,
            seed: Some(request.seed),
            notes: vec![format!(
                "{} generations of {size}; best fitness {:.4}",
                self.generations, scores[best]
            )],
        };
        Ok(finish(request, prepared, Algorithm::Genetic, plan, search))
    }
}

impl GeneticStrategy {
    /// Index of the fittest of `tournament_size` random picks.
    fn tournament(&self, scores: &[f64], rng: &mut ChaCha8Rng) -> usize {
        let mut best = rng.random_range(0..scores.len());
        for _ in 1..self.tournament_size.max(1) {
            let pick = rng.random_range(0..scores.len());
            if scores[pick] > scores[best] {
                best = pick;
            }
        }
        best
    }
}

fn decode(baseline: &Plan, chromosome: &Chromosome) -> Plan {
    chromosome.iter().map(|&r| baseline[r].clone()).collect()
}

/// Copy a random slice of `a`, fill the remaining positions with `b`'s
/// genes in `b`'s order.
fn order_crossover(a: &Chromosome, b: &Chromosome, rng: &mut ChaCha8Rng) -> Chromosome {
    let n = a.len();
    let (mut lo, mut hi) = (rng.random_range(0..n), rng.random_range(0..n));
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }

    let mut taken = vec![false; n];
    for &gene in &a[lo..=hi] {
        taken[gene] = true;
    }
    let mut fill = b.iter().copied().filter(|&g| !taken[g]);
    (0..n)
        .map(|i| {
            if (lo..=hi).contains(&i) {
                a[i]
            } else {
                fill.next().unwrap_or(a[i])
            }
        })
        .collect()
}
