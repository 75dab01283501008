//! Constraint definitions: identity, classification, tunables, relationships.
//!
//! A [`ConstraintDefinition`] is pure data (it is what travels over the
//! worker wire). Turning it into an evaluable [`crate::Constraint`] goes
//! through the rule registry, which is where definitions are validated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::context::EvaluationContext;
use crate::domain::error::DefinitionError;

/// What a constraint ranges over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintScope {
    Game,
    Team,
    Venue,
    Schedule,
    League,
}

/// Hard constraints decide validity; soft constraints only affect quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintCategory {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// How a violation is meant to be handled downstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    Reject,
    #[default]
    Penalize,
    Reschedule,
    Ignore,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
}

/// A guard evaluated against the [`EvaluationContext`]; a failing condition
/// makes the constraint not applicable for that evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Context field, dot-separated for nested objects (`season.phase`).
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn holds(&self, context: &EvaluationContext) -> bool {
        let actual = context.get(&self.field);
        match self.operator {
            ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
            ConditionOperator::Eq => actual == Some(&self.value),
            ConditionOperator::Ne => actual != Some(&self.value),
            ConditionOperator::In => match (&self.value, actual) {
                (Value::Array(options), Some(v)) => options.contains(v),
                _ => false,
            },
            ConditionOperator::Gt
            | ConditionOperator::Gte
            | ConditionOperator::Lt
            | ConditionOperator::Lte => match actual.and_then(|v| compare(v, &self.value)) {
                Some(ordering) => match self.operator {
                    ConditionOperator::Gt => ordering.is_gt(),
                    ConditionOperator::Gte => ordering.is_ge(),
                    ConditionOperator::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                },
                None => false,
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Serializable definition of a constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Rule type key, resolved through the rule registry.
    #[serde(rename = "type")]
    pub kind: String,
    pub scope: ConstraintScope,
    pub category: ConstraintCategory,
    #[serde(default)]
    pub priority: ConstraintPriority,
    #[serde(default = "default_one")]
    pub weight: f64,
    #[serde(default = "default_one")]
    pub penalty: f64,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub resolution_strategy: ResolutionStrategy,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub affects: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl ConstraintDefinition {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        scope: ConstraintScope,
        category: ConstraintCategory,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: default_version(),
            kind: kind.into(),
            scope,
            category,
            priority: ConstraintPriority::default(),
            weight: 1.0,
            penalty: 1.0,
            parameters: serde_json::Map::new(),
            conditions: Vec::new(),
            resolution_strategy: ResolutionStrategy::default(),
            is_active: true,
            depends_on: Vec::new(),
            affects: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_priority(mut self, priority: ConstraintPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Structural checks that do not depend on the rule type.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::MissingId);
        }
        for (field, value) in [("weight", self.weight), ("penalty", self.penalty)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DefinitionError::InvalidNumber {
                    id: self.id.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> DefinitionError {
        DefinitionError::InvalidParameter {
            id: self.id.clone(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Optional non-negative numeric parameter.
    pub fn param_f64(&self, name: &str) -> Result<Option<f64>, DefinitionError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => match v.as_f64() {
                Some(f) if f.is_finite() && f >= 0.0 => Ok(Some(f)),
                _ => Err(self.invalid(name, format!("expected a non-negative number, got {v}"))),
            },
        }
    }

    /// Optional non-negative integer parameter.
    pub fn param_u32(&self, name: &str) -> Result<Option<u32>, DefinitionError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(name, format!("expected a non-negative integer, got {v}"))),
        }
    }

    /// Optional list-of-strings parameter.
    pub fn param_strings(&self, name: &str) -> Result<Option<Vec<String>>, DefinitionError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(name, "expected a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(name, "expected a list of strings")),
        }
    }

    pub fn invalid_parameter(&self, name: &str, reason: impl Into<String>) -> DefinitionError {
        self.invalid(name, reason)
    }
}
