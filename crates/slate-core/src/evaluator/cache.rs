//! LRU + TTL cache of evaluation results.
//!
//! Keys are content digests of the whole schedule value, id included, so
//! a clone or a re-deserialized copy of a schedule hits the same entries
//! while two separately built schedules never do. Recency is tracked with a
//! monotonically increasing tick; the smallest tick is evicted first.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::EvaluationResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub constraint_id: String,
    pub version: String,
    pub schedule_digest: String,
    pub context_digest: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

#[derive(Debug)]
struct Entry {
    result: EvaluationResult,
    stored_at: Instant,
    cached_at: DateTime<Utc>,
    tick: u64,
}

#[derive(Debug)]
pub struct EvaluationCache {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<CacheKey, Entry>,
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
}

impl EvaluationCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    /// Cached result for `key`, stamped with `cached_at`. Expired entries
    /// are dropped on access.
    pub fn get(&mut self, key: &CacheKey) -> Option<EvaluationResult> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<EvaluationResult> {
        let expired = {
            let entry = self.entries.get(key)?;
            self.ttl
                .is_some_and(|ttl| now.saturating_duration_since(entry.stored_at) >= ttl)
        };
        if expired {
            self.remove(key);
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.clone());

        let mut result = entry.result.clone();
        result.cached_at = Some(entry.cached_at);
        Some(result)
    }

    pub fn insert(&mut self, key: CacheKey, result: EvaluationResult) {
        self.insert_at(key, result, Instant::now());
    }

    fn insert_at(&mut self, key: CacheKey, result: EvaluationResult, now: Instant) {
        self.remove(&key);
        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }

        self.tick += 1;
        self.recency.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                result,
                stored_at: now,
                cached_at: Utc::now(),
                tick: self.tick,
            },
        );
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.tick);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.map_or(0, |t| t.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConstraintCategory, EvaluationStatus};
    use serde_json::Value;

    fn key(id: &str) -> CacheKey {
        CacheKey {
            constraint_id: id.to_string(),
            version: "1.0.0".to_string(),
            schedule_digest: "s".to_string(),
            context_digest: "c".to_string(),
        }
    }

    fn result(id: &str) -> EvaluationResult {
        EvaluationResult::new(
            id,
            ConstraintCategory::Soft,
            EvaluationStatus::Satisfied,
            0.0,
            1.0,
            "ok",
            Value::Null,
        )
    }

    #[test]
    fn test_hit_is_marked_cached() {
        let mut cache = EvaluationCache::new(4, None);
        cache.insert(key("a"), result("a"));
        let hit = cache.get(&key("a")).unwrap();
        assert!(hit.cached_at.is_some());
        assert_eq!(hit.status, EvaluationStatus::Satisfied);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let mut cache = EvaluationCache::new(2, None);
        cache.insert(key("a"), result("a"));
        cache.insert(key("b"), result("b"));
        // Touch a so b becomes the eviction candidate.
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), result("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let mut cache = EvaluationCache::new(4, Some(Duration::from_secs(10)));
        let start = Instant::now();
        cache.insert_at(key("a"), result("a"), start);
        assert!(cache.get_at(&key("a"), start + Duration::from_secs(9)).is_some());
        assert!(cache.get_at(&key("a"), start + Duration::from_secs(10)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_version_is_part_of_key() {
        let mut cache = EvaluationCache::new(4, None);
        cache.insert(key("a"), result("a"));
        let mut bumped = key("a");
        bumped.version = "2.0.0".to_string();
        assert!(cache.get(&bumped).is_none());
    }

    #[test]
    fn test_reinsert_replaces_without_growing() {
        let mut cache = EvaluationCache::new(2, None);
        cache.insert(key("a"), result("a"));
        cache.insert(key("a"), result("a"));
        assert_eq!(cache.stats().entries, 1);
    }
}
