//! The rule capability every constraint type implements.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{EvaluationContext, Schedule};

/// Errors a rule may return while scoring. They never escape
/// [`crate::Constraint::evaluate`]; they become `ERROR` results.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{0}")]
    Failed(String),

    #[error("schedule is missing data: {0}")]
    MissingData(String),

    #[error("remote rule call failed: {0}")]
    Remote(String),
}

/// One concrete breach found by a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleViolation {
    /// The team, venue, game or date the violation is about.
    pub subject: String,
    pub message: String,
    pub severity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub game_ids: Vec<String>,
}

impl RuleViolation {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            severity: 1.0,
            game_ids: Vec::new(),
        }
    }

    pub fn with_severity(mut self, severity: f64) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_games(mut self, game_ids: Vec<String>) -> Self {
        self.game_ids = game_ids;
        self
    }
}

/// What a rule found: how many items it checked and which of them failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub checked: usize,
    pub violations: Vec<RuleViolation>,
    /// Set when the rule has nothing to check in this schedule.
    pub not_applicable: Option<String>,
    pub details: Value,
}

impl RuleOutcome {
    pub fn checked(checked: usize) -> Self {
        Self {
            checked,
            ..Self::default()
        }
    }

    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self {
            not_applicable: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_violations(mut self, violations: Vec<RuleViolation>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn total_severity(&self) -> f64 {
        self.violations.iter().map(|v| v.severity).sum()
    }
}

/// Rule-specific scoring logic, one implementation per constraint type.
///
/// Implementations are built from a validated definition by the
/// [`crate::RuleRegistry`], so they own their parsed parameters. The method
/// is async because a rule may delegate to a remote service.
#[async_trait]
pub trait Rule: Send + Sync + fmt::Debug {
    /// The registry key this rule was built for.
    fn kind(&self) -> &str;

    /// Whether the rule has anything to say in this context.
    fn applies_in_context(&self, _context: &EvaluationContext) -> bool {
        true
    }

    async fn evaluate(
        &self,
        schedule: &Schedule,
        context: &EvaluationContext,
    ) -> Result<RuleOutcome, RuleError>;
}
