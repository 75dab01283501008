//! Optimization orchestrator.
//!
//! One call to [`Orchestrator::optimize`]:
//!
//! 1. validates teams and builds rule constraints (the only fatal step),
//! 2. selects an algorithm, looks up historical insight and derives
//!    sport defaults concurrently,
//! 3. runs the candidate strategies on the blocking pool and keeps the best,
//! 4. applies the post-optimization passes, in parallel batches for large
//!    leagues and sequentially otherwise,
//! 5. computes final metrics concurrently and stamps them on the schedule.
//!
//! Insight and suggestion failures are logged and treated as absent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use slate_core::{
    obs, travel, Constraint, ConstraintDefinition, ConstraintEvaluator, EvaluationContext,
    OrchestratorConfig, RuleRegistry, Schedule, ScheduleEvaluation, ScheduleMetrics, Sport, Team,
};
use tracing::{debug, info, instrument, warn};

use crate::augment::augment_constraints;
use crate::constraints::SchedulingConstraints;
use crate::error::{OptimizeError, OptimizeResult};
use crate::insights::{HistoricalInsight, InsightProvider, SuggestionRequest, SuggestionService};
use crate::passes::{apply_patch, standard_passes, PassReport, PostPass};
use crate::quality::{max_home_away_imbalance, min_rest_days, QualityModel};
use crate::selector::select_algorithm;
use crate::strategy::{
    adopt_plan, strategy_for, validate_teams, Algorithm, StrategyOutput, StrategyRequest,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub sport: Sport,
    pub teams: Vec<Team>,
    #[serde(default)]
    pub constraints: SchedulingConstraints,
    /// Rule constraints scored on the final schedule.
    #[serde(default)]
    pub rules: Vec<ConstraintDefinition>,
    #[serde(default)]
    pub context: EvaluationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<Schedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl OptimizationRequest {
    pub fn new(sport: Sport, teams: Vec<Team>) -> Self {
        Self {
            sport,
            teams,
            constraints: SchedulingConstraints::default(),
            rules: Vec::new(),
            context: EvaluationContext::default(),
            existing: None,
            start_date: None,
            seed: None,
        }
    }

    pub fn with_constraints(mut self, constraints: SchedulingConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_rules(mut self, rules: Vec<ConstraintDefinition>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_context(mut self, context: EvaluationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_existing(mut self, existing: Schedule) -> Self {
        self.existing = Some(existing);
        self
    }

    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn strategy_request(&self, constraints: SchedulingConstraints) -> StrategyRequest {
        let mut request =
            StrategyRequest::new(self.sport, self.teams.clone()).with_constraints(constraints);
        if let Some(existing) = &self.existing {
            request = request.with_existing(existing.clone());
        }
        if let Some(start_date) = self.start_date {
            request = request.with_start_date(start_date);
        }
        if let Some(seed) = self.seed {
            request = request.with_seed(seed);
        }
        request
    }
}

/// One scored candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateReport {
    /// Algorithm name, or `suggestion:{source}` for an external suggestion.
    pub label: String,
    pub algorithm: Algorithm,
    pub score: f64,
    pub travel_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationOutcome {
    pub schedule: Schedule,
    pub algorithm: Algorithm,
    /// Label of the winning candidate.
    pub winner: String,
    pub score: f64,
    /// Every candidate that produced output, in the order they were tried.
    pub candidates: Vec<CandidateReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<HistoricalInsight>,
    /// Caller preferences layered over the sport defaults.
    pub constraints: SchedulingConstraints,
    pub passes: Vec<PassReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<ScheduleEvaluation>,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    evaluator: ConstraintEvaluator,
    registry: Arc<RuleRegistry>,
    insights: Option<Arc<dyn InsightProvider>>,
    suggestions: Option<Arc<dyn SuggestionService>>,
    passes: Vec<Arc<dyn PostPass>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("insights", &self.insights.is_some())
            .field("suggestions", &self.suggestions.is_some())
            .field("passes", &self.passes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            evaluator: ConstraintEvaluator::default(),
            registry: Arc::new(RuleRegistry::with_builtin_rules()),
            insights: None,
            suggestions: None,
            passes: standard_passes(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: ConstraintEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_insights(mut self, insights: Arc<dyn InsightProvider>) -> Self {
        self.insights = Some(insights);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Arc<dyn SuggestionService>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }

    pub fn with_passes(mut self, passes: Vec<Arc<dyn PostPass>>) -> Self {
        self.passes = passes;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &ConstraintEvaluator {
        &self.evaluator
    }

    #[instrument(skip_all, fields(sport = %request.sport, teams = request.teams.len()))]
    pub async fn optimize(&self, request: OptimizationRequest) -> OptimizeResult<OptimizationOutcome> {
        let start = Instant::now();
        validate_teams(&request.teams)?;
        let rules = request
            .rules
            .iter()
            .cloned()
            .map(|d| Constraint::from_definition(d, &self.registry).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let team_count = request.teams.len();
        let (selected, insight, augmented) = tokio::join!(
            async { select_algorithm(request.sport, team_count, &request.constraints) },
            self.lookup_insight(request.sport, team_count),
            async { augment_constraints(request.sport) },
        );
        let constraints = request.constraints.merged_over(&augmented);
        debug!(keys = constraints.len(), "constraints merged with sport defaults");

        let strategy_request = Arc::new(request.strategy_request(constraints.clone()));
        let mut candidates = self
            .run_candidates(&strategy_request, selected, insight.as_ref())
            .await?;
        if let Some(suggested) = self.suggested_candidate(&strategy_request).await {
            candidates.push(suggested);
        }

        let reports: Vec<CandidateReport> = candidates
            .iter()
            .map(|(label, output)| CandidateReport {
                label: label.clone(),
                algorithm: output.metadata.algorithm,
                score: output.score,
                travel_km: output.metadata.travel_distance_total,
            })
            .collect();

        // Highest score wins; ties keep the earlier candidate.
        let mut best: Option<(String, StrategyOutput)> = None;
        for (label, output) in candidates {
            if best.as_ref().map_or(true, |(_, b)| output.score > b.score) {
                best = Some((label, output));
            }
        }
        let (winner, output) =
            best.ok_or_else(|| OptimizeError::NoCandidate(selected.to_string()))?;
        let algorithm = output.metadata.algorithm;
        let score = output.score;
        info!(winner = %winner, score, candidates = reports.len(), "candidate chosen");

        let mut schedule = output.into_schedule(request.sport, request.teams.clone());
        if let Some(existing) = &request.existing {
            schedule.venues = existing.venues.clone();
        }

        let passes = self.run_passes(&mut schedule, &constraints, team_count).await;
        let evaluation = self
            .stamp_metrics(&mut schedule, &rules, &request.context, algorithm, score, &passes)
            .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_optimization_finished(&schedule.id, algorithm.as_str(), duration_ms, score);

        Ok(OptimizationOutcome {
            schedule,
            algorithm,
            winner,
            score,
            candidates: reports,
            insight,
            constraints,
            passes,
            evaluation,
            duration_ms,
        })
    }

    async fn lookup_insight(&self, sport: Sport, team_count: usize) -> Option<HistoricalInsight> {
        let provider = self.insights.as_ref()?;
        let lookup = provider.lookup(sport, team_count);
        let result = match self.collaborator_timeout() {
            None => lookup.await,
            Some(timeout) => match tokio::time::timeout(timeout, lookup).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.insight_timeout_ms,
                        "historical insight lookup timed out; continuing without"
                    );
                    return None;
                }
            },
        };
        match result {
            Ok(insight) => insight,
            Err(e) => {
                warn!(error = %e, "historical insight lookup failed; continuing without");
                None
            }
        }
    }

    fn collaborator_timeout(&self) -> Option<Duration> {
        (self.config.insight_timeout_ms > 0)
            .then(|| Duration::from_millis(self.config.insight_timeout_ms))
    }

    /// The selected algorithm, the round-robin baseline and the insight's
    /// recommendation, each at most once, run side by side on the blocking
    /// pool. Only a failure of the selected strategy is an error.
    async fn run_candidates(
        &self,
        request: &Arc<StrategyRequest>,
        selected: Algorithm,
        insight: Option<&HistoricalInsight>,
    ) -> OptimizeResult<Vec<(String, StrategyOutput)>> {
        let mut algorithms = vec![selected];
        if self.config.compare_baseline {
            algorithms.push(Algorithm::RoundRobin);
        }
        if let Some(recommended) = insight.and_then(|i| i.recommended_algorithm) {
            algorithms.push(recommended);
        }
        let mut seen = Vec::new();
        algorithms.retain(|a| {
            let fresh = !seen.contains(a);
            seen.push(*a);
            fresh
        });

        let handles: Vec<_> = algorithms
            .iter()
            .map(|&algorithm| {
                let request = Arc::clone(request);
                tokio::task::spawn_blocking(move || strategy_for(algorithm).optimize(&request))
            })
            .collect();

        let mut outputs = Vec::with_capacity(algorithms.len());
        for (i, (algorithm, joined)) in algorithms.iter().zip(join_all(handles).await).enumerate() {
            let failure = match joined {
                Ok(Ok(output)) => {
                    outputs.push((algorithm.to_string(), output));
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => OptimizeError::Task(format!("{algorithm}: {e}")),
            };
            if i == 0 {
                return Err(failure);
            }
            warn!(algorithm = %algorithm, error = %failure, "candidate strategy failed; skipped");
        }
        Ok(outputs)
    }

    async fn suggested_candidate(
        &self,
        request: &Arc<StrategyRequest>,
    ) -> Option<(String, StrategyOutput)> {
        if !self.config.use_suggestions {
            return None;
        }
        let service = self.suggestions.as_ref()?;
        let ask = SuggestionRequest {
            sport: request.sport,
            team_ids: request.teams.iter().map(|t| t.id.clone()).collect(),
            constraints: request.constraints.clone(),
        };

        let call = service.suggest(&ask);
        let answer = match self.collaborator_timeout() {
            None => call.await,
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(answer) => answer,
                Err(_) => {
                    warn!("suggestion service timed out; using built-in strategies only");
                    return None;
                }
            },
        };

        let adopted = answer
            .and_then(|s| {
                let plan = s.to_plan(&QualityModel::new(&request.teams))?;
                Ok((s, plan))
            })
            .map_err(|e| e.to_string())
            .and_then(|(s, plan)| {
                let note = format!("suggested by {}", s.source);
                adopt_plan(request, s.algorithm, plan, vec![note])
                    .map(|output| (format!("suggestion:{}", s.source), output))
                    .map_err(|e| e.to_string())
            });
        match adopted {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(error = %e, "suggestion unusable; using built-in strategies only");
                None
            }
        }
    }

    /// Parallel mode: batches of `pass_concurrency` passes read one snapshot
    /// and their patches are applied in pass order, with a pause between
    /// batches. Sequential mode: each pass sees the previous one's output.
    /// A pass that panics is logged and skipped.
    async fn run_passes(
        &self,
        schedule: &mut Schedule,
        constraints: &SchedulingConstraints,
        team_count: usize,
    ) -> Vec<PassReport> {
        let parallel = self.config.parallel_optimization && team_count >= self.config.parallel_min_teams;
        let batch_size = if parallel {
            self.config.pass_concurrency.max(1)
        } else {
            1
        };
        debug!(parallel, batch_size, passes = self.passes.len(), "running post-passes");

        let constraints = Arc::new(constraints.clone());
        let mut reports = Vec::with_capacity(self.passes.len());
        for (index, batch) in self.passes.chunks(batch_size).enumerate() {
            if parallel && index > 0 && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }

            let snapshot = Arc::new(schedule.clone());
            let handles: Vec<_> = batch
                .iter()
                .map(|pass| {
                    let pass = Arc::clone(pass);
                    let snapshot = Arc::clone(&snapshot);
                    let constraints = Arc::clone(&constraints);
                    tokio::task::spawn_blocking(move || pass.apply(&snapshot, &constraints))
                })
                .collect();

            for (pass, joined) in batch.iter().zip(join_all(handles).await) {
                match joined {
                    Ok(patch) => {
                        let changed_games = apply_patch(schedule, &patch);
                        debug!(pass = pass.name(), changed_games, "pass applied");
                        reports.push(PassReport {
                            name: pass.name().to_string(),
                            changed_games,
                            metrics: patch.metrics,
                        });
                    }
                    Err(e) => warn!(pass = pass.name(), error = %e, "post-pass failed; skipped"),
                }
            }
        }
        reports
    }

    async fn stamp_metrics(
        &self,
        schedule: &mut Schedule,
        rules: &[Arc<Constraint>],
        context: &EvaluationContext,
        algorithm: Algorithm,
        score: f64,
        passes: &[PassReport],
    ) -> OptimizeResult<Option<ScheduleEvaluation>> {
        let snapshot = Arc::new(schedule.clone());
        let travel_task = {
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || travel::travel_by_team(&snapshot))
        };
        let balance_task = {
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || {
                (max_home_away_imbalance(&snapshot), min_rest_days(&snapshot))
            })
        };
        let evaluation = async {
            if rules.is_empty() {
                None
            } else {
                Some(self.evaluator.evaluate_schedule(&snapshot, rules, context).await)
            }
        };

        let (travel_by_team, balance, evaluation) = tokio::join!(travel_task, balance_task, evaluation);
        let travel_by_team = travel_by_team.map_err(|e| OptimizeError::Task(e.to_string()))?;
        let (max_imbalance, min_rest) = balance.map_err(|e| OptimizeError::Task(e.to_string()))?;

        schedule.metrics = Some(ScheduleMetrics {
            total_travel_km: travel_by_team.values().sum(),
            travel_by_team,
            max_home_away_imbalance: max_imbalance,
            min_rest_days: min_rest,
            constraint_summary: evaluation.as_ref().map(|e| e.summary.clone()),
            algorithm: Some(algorithm.to_string()),
            score,
            pass_metrics: passes
                .iter()
                .map(|p| (p.name.clone(), p.metrics.clone()))
                .collect::<BTreeMap<_, _>>(),
        });
        schedule.completed_at = Some(Utc::now());
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::FailingInsights;
    use slate_core::Location;

    fn teams(n: usize) -> Vec<Team> {
        (0..n)
            .map(|i| {
                Team::new(
                    format!("t{i}"),
                    format!("Team {i}"),
                    Location::new(35.0 + i as f64, -90.0 - 2.0 * i as f64),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_too_few_teams_is_fatal() {
        let err = Orchestrator::default()
            .optimize(OptimizationRequest::new(Sport::Soccer, teams(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizeError::TooFewTeams(1)));
    }

    #[tokio::test]
    async fn test_unknown_rule_type_is_fatal() {
        let rules = vec![ConstraintDefinition::new(
            "x",
            "no_such_rule",
            slate_core::ConstraintScope::Schedule,
            slate_core::ConstraintCategory::Soft,
        )];
        let err = Orchestrator::default()
            .optimize(OptimizationRequest::new(Sport::Soccer, teams(4)).with_rules(rules))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Definition(_)));
    }

    #[tokio::test]
    async fn test_baseline_is_not_run_twice() {
        let outcome = Orchestrator::default()
            .with_insights(Arc::new(FailingInsights))
            .optimize(OptimizationRequest::new(Sport::Other, teams(4)))
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.winner, "round_robin");
        assert!(outcome.insight.is_none());
    }
}
