//! Schedule generation strategies.
//!
//! Every strategy starts from a round-robin baseline and returns a new list
//! of rounds; none of them touches the caller's schedule. The search
//! strategies work on a compact [`Plan`] of team indices and are seeded, so
//! equal requests give equal output.

mod annealing;
mod constrained;
mod genetic;
mod partial;
mod round_robin;
mod traveling;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use slate_core::{obs, Game, Schedule, Sport, Team};

use crate::constraints::{SchedulingConstraints, MIN_REST_DAYS};
use crate::error::{OptimizeError, OptimizeResult};
use crate::quality::QualityModel;

pub use annealing::SimulatedAnnealingStrategy;
pub use constrained::ConstrainedSchedulingStrategy;
pub use genetic::GeneticStrategy;
pub use partial::PartialRoundRobinStrategy;
pub use round_robin::{circle_plan, RoundRobinStrategy};
pub use traveling::TravelingTournamentStrategy;

pub const DEFAULT_DAYS_BETWEEN_ROUNDS: u32 = 7;
pub const DEFAULT_SEED: u64 = 0x5eed_51a7e;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RoundRobin,
    PartialRoundRobin,
    TravelingTournament,
    ConstrainedScheduling,
    SimulatedAnnealing,
    Genetic,
}

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::RoundRobin,
        Algorithm::PartialRoundRobin,
        Algorithm::TravelingTournament,
        Algorithm::ConstrainedScheduling,
        Algorithm::SimulatedAnnealing,
        Algorithm::Genetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::PartialRoundRobin => "partial_round_robin",
            Algorithm::TravelingTournament => "traveling_tournament",
            Algorithm::ConstrainedScheduling => "constrained_scheduling",
            Algorithm::SimulatedAnnealing => "simulated_annealing",
            Algorithm::Genetic => "genetic",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = OptimizeError;

    /// Accepts `snake_case` and `kebab-case` names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| OptimizeError::UnknownAlgorithm(s.to_string()))
    }
}

/// Home and away team indices into the request's team list.
pub type Fixture = (usize, usize);

/// Fixtures per round, in play order.
pub type Plan = Vec<Vec<Fixture>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub number: u32,
    pub date: NaiveDate,
    pub games: Vec<Game>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyMetadata {
    pub algorithm: Algorithm,
    pub travel_distance_total: f64,
    pub breaks: usize,
    pub iterations: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Score of the plan the strategy started from.
    pub baseline_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutput {
    pub rounds: Vec<Round>,
    /// Quality score in `[0, 1]`.
    pub score: f64,
    pub metadata: StrategyMetadata,
}

impl StrategyOutput {
    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.rounds.iter().flat_map(|r| r.games.iter())
    }

    pub fn into_schedule(self, sport: Sport, teams: Vec<Team>) -> Schedule {
        let games = self.rounds.into_iter().flat_map(|r| r.games).collect();
        Schedule::new(sport, teams).with_games(games)
    }
}

/// Inputs shared by every strategy.
#[derive(Debug, Clone)]
pub struct StrategyRequest {
    pub sport: Sport,
    pub teams: Vec<Team>,
    pub constraints: SchedulingConstraints,
    /// When its games all carry round numbers, the baseline is taken from here.
    pub existing: Option<Schedule>,
    pub start_date: NaiveDate,
    pub days_between_rounds: u32,
    pub seed: u64,
}

impl StrategyRequest {
    pub fn new(sport: Sport, teams: Vec<Team>) -> Self {
        Self {
            sport,
            teams,
            constraints: SchedulingConstraints::default(),
            existing: None,
            start_date: Utc::now().date_naive(),
            days_between_rounds: DEFAULT_DAYS_BETWEEN_ROUNDS,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_constraints(mut self, constraints: SchedulingConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_existing(mut self, existing: Schedule) -> Self {
        self.existing = Some(existing);
        self
    }

    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn with_days_between_rounds(mut self, days: u32) -> Self {
        self.days_between_rounds = days;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// At least two teams, no duplicate ids.
    pub fn validate(&self) -> OptimizeResult<()> {
        validate_teams(&self.teams)
    }

    /// Days between consecutive rounds: never below `minRestDays`, never zero.
    pub fn round_spacing_days(&self) -> u32 {
        self.days_between_rounds
            .max(self.constraints.u32(MIN_REST_DAYS).unwrap_or(0))
            .max(1)
    }
}

pub fn validate_teams(teams: &[Team]) -> OptimizeResult<()> {
    if teams.len() < 2 {
        return Err(OptimizeError::TooFewTeams(teams.len()));
    }
    let mut seen = HashSet::new();
    for team in teams {
        if !seen.insert(team.id.as_str()) {
            return Err(OptimizeError::DuplicateTeam(team.id.clone()));
        }
    }
    Ok(())
}

/// A schedule generation algorithm.
///
/// Strategies are synchronous and CPU-bound; async callers run them on the
/// blocking pool.
pub trait Strategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn optimize(&self, request: &StrategyRequest) -> OptimizeResult<StrategyOutput>;
}

/// The strategy for `algorithm` with default tuning.
pub fn strategy_for(algorithm: Algorithm) -> Box<dyn Strategy> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(RoundRobinStrategy),
        Algorithm::PartialRoundRobin => Box::new(PartialRoundRobinStrategy),
        Algorithm::TravelingTournament => Box::new(TravelingTournamentStrategy::default()),
        Algorithm::ConstrainedScheduling => Box::new(ConstrainedSchedulingStrategy),
        Algorithm::SimulatedAnnealing => Box::new(SimulatedAnnealingStrategy::default()),
        Algorithm::Genetic => Box::new(GeneticStrategy::default()),
    }
}

/// Score and date a plan built outside the strategies, such as an external
/// suggestion, exactly as a strategy's own output would be.
pub fn adopt_plan(
    request: &StrategyRequest,
    algorithm: Algorithm,
    plan: Plan,
    notes: Vec<String>,
) -> OptimizeResult<StrategyOutput> {
    let prepared = prepare(request)?;
    let search = Search {
        notes,
        ..Search::default()
    };
    Ok(finish(request, prepared, algorithm, plan, search))
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Starting point common to every strategy.
pub(crate) struct Prepared {
    pub model: QualityModel,
    pub baseline: Plan,
    pub baseline_score: f64,
    pub notes: Vec<String>,
}

pub(crate) fn prepare(request: &StrategyRequest) -> OptimizeResult<Prepared> {
    request.validate()?;
    let model = QualityModel::new(&request.teams);
    let mut notes = Vec::new();
    let baseline = match request
        .existing
        .as_ref()
        .and_then(|s| existing_plan(s, &model))
    {
        Some(plan) => {
            notes.push("baseline taken from the existing schedule's rounds".to_string());
            plan
        }
        None => circle_plan(model.team_count()),
    };
    let baseline_score = model.assess(&baseline).score;
    Ok(Prepared {
        model,
        baseline,
        baseline_score,
        notes,
    })
}

fn existing_plan(existing: &Schedule, model: &QualityModel) -> Option<Plan> {
    if existing.games.is_empty() {
        return None;
    }
    let mut rounds: BTreeMap<u32, Vec<Fixture>> = BTreeMap::new();
    for game in &existing.games {
        let home = model.index_of(&game.home_team_id)?;
        let away = model.index_of(&game.away_team_id)?;
        rounds.entry(game.round?).or_default().push((home, away));
    }
    Some(rounds.into_values().collect())
}

#[derive(Debug, Default)]
pub(crate) struct Search {
    pub iterations: u64,
    pub seed: Option<u64>,
    pub notes: Vec<String>,
}

pub(crate) fn finish(
    request: &StrategyRequest,
    prepared: Prepared,
    algorithm: Algorithm,
    plan: Plan,
    search: Search,
) -> StrategyOutput {
    let report = prepared.model.assess(&plan);
    let rounds = materialize(request, &prepared.model, &plan);
    obs::emit_strategy_completed(algorithm.as_str(), report.score, report.travel_km);

    let mut notes = prepared.notes;
    notes.extend(search.notes);
    StrategyOutput {
        rounds,
        score: report.score,
        metadata: StrategyMetadata {
            algorithm,
            travel_distance_total: report.travel_km,
            breaks: report.breaks,
            iterations: search.iterations,
            seed: search.seed,
            baseline_score: prepared.baseline_score,
            notes,
        },
    }
}

/// Turn a plan into dated rounds with stable game ids (`r{round}-g{slot}`).
fn materialize(request: &StrategyRequest, model: &QualityModel, plan: &[Vec<Fixture>]) -> Vec<Round> {
    let spacing = u64::from(request.round_spacing_days());
    plan.iter()
        .enumerate()
        .map(|(i, fixtures)| {
            let number = i as u32 + 1;
            let date = request
                .start_date
                .checked_add_days(Days::new(i as u64 * spacing))
                .unwrap_or(NaiveDate::MAX);
            let games = fixtures
                .iter()
                .enumerate()
                .map(|(slot, &(home, away))| Game {
                    id: format!("r{number}-g{}", slot + 1),
                    round: Some(number),
                    home_team_id: model.id(home).to_string(),
                    away_team_id: model.id(away).to_string(),
                    date,
                    venue_id: None,
                })
                .collect();
            Round {
                number,
                date,
                games,
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use slate_core::Location;

    #[test]
    fn test_algorithm_names_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert_eq!(
            "Traveling-Tournament".parse::<Algorithm>().unwrap(),
            Algorithm::TravelingTournament
        );
        assert!(matches!(
            "quantum".parse::<Algorithm>(),
            Err(OptimizeError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_team_lists() {
        let one = vec![Team::new("a", "A", Location::default())];
        assert!(matches!(validate_teams(&one), Err(OptimizeError::TooFewTeams(1))));

        let dup = vec![
            Team::new("a", "A", Location::default()),
            Team::new("a", "A again", Location::default()),
        ];
        assert!(matches!(validate_teams(&dup), Err(OptimizeError::DuplicateTeam(id)) if id == "a"));
    }

    #[test]
    fn test_round_spacing_respects_min_rest() {
        let request = fixtures::request(4).with_days_between_rounds(2).with_constraints(
            SchedulingConstraints::new().with(MIN_REST_DAYS, serde_json::json!(5)),
        );
        assert_eq!(request.round_spacing_days(), 5);
        assert_eq!(fixtures::request(4).with_days_between_rounds(0).round_spacing_days(), 1);
    }

    #[test]
    fn test_materialized_rounds_are_dated_and_numbered() {
        let request = fixtures::request(4).with_days_between_rounds(3);
        let output = strategy_for(Algorithm::RoundRobin).optimize(&request).unwrap();
        let dates: Vec<_> = output.rounds.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2026-11-01", "2026-11-04", "2026-11-07"]);
        for round in &output.rounds {
            assert!(round.games.iter().all(|g| g.round == Some(round.number)));
        }
        let ids: HashSet<_> = output.games().map(|g| g.id.as_str()).collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_existing_rounds_become_the_baseline() {
        let teams = fixtures::teams(2);
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut game = Game::new("t1", "t0", day);
        game.round = Some(4);
        let existing = Schedule::new(Sport::Soccer, teams.clone()).with_games(vec![game]);
        let request = fixtures::request(2).with_existing(existing);

        let output = strategy_for(Algorithm::TravelingTournament)
            .optimize(&request)
            .unwrap();
        let only = output.games().next().unwrap();
        assert_eq!((only.home_team_id.as_str(), only.away_team_id.as_str()), ("t1", "t0"));
        assert!(output.metadata.notes.iter().any(|n| n.contains("existing")));
    }
}
