//! Best-effort external collaborators.
//!
//! [`InsightProvider`] looks up what worked before for leagues like this
//! one; [`SuggestionService`] proposes a complete set of rounds. Both are
//! optional. The orchestrator logs their failures and carries on with the
//! built-in strategies.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slate_core::Sport;

use crate::constraints::SchedulingConstraints;
use crate::quality::QualityModel;
use crate::strategy::{Algorithm, Plan};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator timed out after {0}ms")]
    Timeout(u64),

    #[error("collaborator returned unusable data: {0}")]
    Invalid(String),
}

/// What past seasons suggest for a `(sport, team count)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalInsight {
    pub recommended_algorithm: Option<Algorithm>,
    pub sample_size: u32,
    pub average_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// `Ok(None)` when there is no history for this league shape.
    async fn lookup(
        &self,
        sport: Sport,
        team_count: usize,
    ) -> Result<Option<HistoricalInsight>, CollaboratorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub sport: Sport,
    pub team_ids: Vec<String>,
    pub constraints: SchedulingConstraints,
}

/// A proposed schedule: rounds of `(home, away)` team ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub source: String,
    pub algorithm: Algorithm,
    pub rounds: Vec<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Suggestion {
    /// Resolve team ids against `model`. Rejects unknown teams, teams that
    /// play themselves, teams that appear twice in one round, and any
    /// suggestion that does not pair every two teams exactly once.
    pub fn to_plan(&self, model: &QualityModel) -> Result<Plan, CollaboratorError> {
        let plan = self
            .rounds
            .iter()
            .enumerate()
            .map(|(r, round)| {
                let mut busy = HashSet::new();
                round
                    .iter()
                    .map(|(home, away)| {
                        let resolve = |id: &str| {
                            model.index_of(id).ok_or_else(|| {
                                CollaboratorError::Invalid(format!("unknown team '{id}'"))
                            })
                        };
                        let (h, a) = (resolve(home)?, resolve(away)?);
                        if h == a || !busy.insert(h) || !busy.insert(a) {
                            return Err(CollaboratorError::Invalid(format!(
                                "round {} double-books {home} or {away}",
                                r + 1
                            )));
                        }
                        Ok((h, a))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Plan, _>>()?;

        check_every_pairing_once(&plan, model)?;
        Ok(plan)
    }
}

fn check_every_pairing_once(plan: &Plan, model: &QualityModel) -> Result<(), CollaboratorError> {
    let mut seen = HashSet::new();
    for &(home, away) in plan.iter().flatten() {
        let pair = (home.min(away), home.max(away));
        if !seen.insert(pair) {
            return Err(CollaboratorError::Invalid(format!(
                "{} and {} meet more than once",
                model.id(pair.0),
                model.id(pair.1)
            )));
        }
    }
    let n = model.team_count();
    let expected = n * n.saturating_sub(1) / 2;
    if seen.len() != expected {
        return Err(CollaboratorError::Invalid(format!(
            "covers {} of {expected} pairings",
            seen.len()
        )));
    }
    Ok(())
}

#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

/// Answers every lookup with the same insight (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticInsights {
    pub insight: Option<HistoricalInsight>,
}

impl StaticInsights {
    pub fn recommending(algorithm: Algorithm) -> Self {
        Self {
            insight: Some(HistoricalInsight {
                recommended_algorithm: Some(algorithm),
                sample_size: 1,
                average_score: None,
                notes: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl InsightProvider for StaticInsights {
    async fn lookup(
        &self,
        _sport: Sport,
        _team_count: usize,
    ) -> Result<Option<HistoricalInsight>, CollaboratorError> {
        Ok(self.insight.clone())
    }
}

/// Fails every lookup.
#[derive(Debug, Clone, Default)]
pub struct FailingInsights;

#[async_trait]
impl InsightProvider for FailingInsights {
    async fn lookup(
        &self,
        _sport: Sport,
        _team_count: usize,
    ) -> Result<Option<HistoricalInsight>, CollaboratorError> {
        Err(CollaboratorError::Unavailable("insight store offline".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct StaticSuggestions {
    pub suggestion: Suggestion,
}

#[async_trait]
impl SuggestionService for StaticSuggestions {
    async fn suggest(&self, _request: &SuggestionRequest) -> Result<Suggestion, CollaboratorError> {
        Ok(self.suggestion.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingSuggestions;

#[async_trait]
impl SuggestionService for FailingSuggestions {
    async fn suggest(&self, _request: &SuggestionRequest) -> Result<Suggestion, CollaboratorError> {
        Err(CollaboratorError::Unavailable("suggestion service offline".to_string()))
    }
}
