//! Bounded per-constraint evaluation history.

use std::collections::VecDeque;

use serde::Serialize;

use crate::domain::{EvaluationContext, EvaluationResult};

/// Default number of entries a constraint remembers.
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub result: EvaluationResult,
    pub context: EvaluationContext,
}

/// Fixed-capacity FIFO ring: pushing into a full history evicts the oldest.
#[derive(Debug)]
pub struct EvaluationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for EvaluationHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl EvaluationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConstraintCategory;

    fn entry(id: &str) -> HistoryEntry {
        HistoryEntry {
            result: EvaluationResult::not_applicable(id, ConstraintCategory::Soft, 1.0, "test"),
            context: EvaluationContext::new(),
        }
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = EvaluationHistory::with_capacity(3);
        for id in ["a", "b", "c", "d"] {
            history.push(entry(id));
        }
        assert_eq!(history.len(), 3);
        let ids: Vec<_> = history.iter().map(|e| e.result.constraint_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(history.latest().unwrap().result.constraint_id, "d");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = EvaluationHistory::with_capacity(0);
        history.push(entry("a"));
        history.push(entry("b"));
        assert_eq!(history.len(), 1);
    }
}
