//! Scheduling preferences handed to strategies.
//!
//! These are not rule constraints (those are [`slate_core::ConstraintDefinition`]s
//! scored by the evaluator). This is the loose key/value map a caller uses
//! to steer generation: `minimizeTravel`, `minRestDays`,
//! `maxConsecutiveAway`, `gamesPerTeam` and so on. The strategy selector
//! counts its keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MINIMIZE_TRAVEL: &str = "minimizeTravel";
pub const MIN_REST_DAYS: &str = "minRestDays";
pub const MAX_CONSECUTIVE_HOME: &str = "maxConsecutiveHome";
pub const MAX_CONSECUTIVE_AWAY: &str = "maxConsecutiveAway";
pub const GAMES_PER_TEAM: &str = "gamesPerTeam";
pub const PREFERRED_DAYS: &str = "preferredDays";
pub const SERIES_LENGTH: &str = "seriesLength";
pub const ITERATIONS: &str = "iterations";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SchedulingConstraints(BTreeMap<String, Value>);

impl SchedulingConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// True only for an explicit JSON `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::Bool(true)))
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn strings(&self, key: &str) -> Option<Vec<String>> {
        let items = self.0.get(key)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    pub fn minimize_travel(&self) -> bool {
        self.flag(MINIMIZE_TRAVEL)
    }

    /// Layer `self` over `defaults`: keys present in `self` win.
    pub fn merged_over(&self, defaults: &SchedulingConstraints) -> Self {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// Parse a `KEY=VALUE` pair. The value is read as JSON when it parses
    /// (`true`, `3`, `["sat"]`) and kept as a plain string otherwise.
    pub fn parse_assignment(raw: &str) -> Option<(String, Value)> {
        let (key, value) = raw.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let value = value.trim();
        let parsed =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        Some((key.to_string(), parsed))
    }
}

impl FromIterator<(String, Value)> for SchedulingConstraints {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
