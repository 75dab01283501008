//! Runtime configuration.
//!
//! Every section has serde defaults, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! [evaluator]
//! max_concurrency = 4
//! timeout_ms = 250
//!
//! [worker]
//! workers = 2
//!
//! [orchestrator]
//! pass_concurrency = 4
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Result, SlateError};

/// Constraint evaluator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Evaluate each batch concurrently instead of one constraint at a time.
    pub parallel: bool,
    /// Batch size for parallel evaluation.
    pub max_concurrency: usize,
    /// Per-constraint deadline. `0` disables the timeout.
    pub timeout_ms: u64,
    pub caching: bool,
    pub cache_capacity: usize,
    /// Entry lifetime in seconds. `0` keeps entries until evicted by LRU.
    pub cache_ttl_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_concurrency: 10,
            timeout_ms: 5000,
            caching: true,
            cache_capacity: 1000,
            cache_ttl_secs: 300,
        }
    }
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    /// Emit a `progress` message every N evaluated constraints.
    pub progress_interval: usize,
    /// Replace a worker whose transport has died before the next dispatch.
    pub respawn: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            progress_interval: 5,
            respawn: true,
        }
    }
}

/// Optimization orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub parallel_optimization: bool,
    /// Post-passes run together in one parallel batch.
    pub pass_concurrency: usize,
    /// Pause between parallel pass batches.
    pub batch_pause_ms: u64,
    /// Parallel passes only kick in at this many teams.
    pub parallel_min_teams: usize,
    pub insight_timeout_ms: u64,
    /// Also score the plain round-robin baseline as a candidate.
    pub compare_baseline: bool,
    /// Ask the external suggestion service for an extra candidate.
    pub use_suggestions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_optimization: true,
            pass_concurrency: 2,
            batch_pause_ms: 50,
            parallel_min_teams: 8,
            insight_timeout_ms: 2000,
            compare_baseline: true,
            use_suggestions: false,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SlateConfig {
    pub evaluator: EvaluatorConfig,
    pub worker: WorkerPoolConfig,
    pub orchestrator: OrchestratorConfig,
}

impl SlateConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: SlateConfig =
            toml::from_str(raw).map_err(|e| SlateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| SlateError::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<()> {
        if self.evaluator.max_concurrency == 0 {
            return Err(SlateError::Config(
                "evaluator.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.worker.workers == 0 {
            return Err(SlateError::Config("worker.workers must be at least 1".to_string()));
        }
        if self.orchestrator.pass_concurrency == 0 {
            return Err(SlateError::Config(
                "orchestrator.pass_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SlateConfig::default();
        assert!(config.evaluator.parallel);
        assert_eq!(config.evaluator.max_concurrency, 10);
        assert_eq!(config.evaluator.timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.worker.progress_interval, 5);
        assert_eq!(config.orchestrator.parallel_min_teams, 8);
        assert!(!config.orchestrator.use_suggestions);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SlateConfig::from_toml_str(
            r#"
            [evaluator]
            timeout_ms = 0
            cache_ttl_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluator.timeout(), None);
        assert_eq!(config.evaluator.cache_ttl(), None);
        assert_eq!(config.evaluator.max_concurrency, 10);
        assert_eq!(config.worker, WorkerPoolConfig::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = SlateConfig::from_toml_str("[evaluator]\nmax_concurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nworkers = 2\nrespawn = false").unwrap();
        let config = SlateConfig::load(file.path()).unwrap();
        assert_eq!(config.worker.workers, 2);
        assert!(!config.worker.respawn);
    }
}
