//! Runtime configuration.
//!
//! `ForestConfig` deserialises from JSON with every field optional:
//!
//! ```rust
//! use rake_compress::config::{ExecutionMode, ForestConfig};
//!
//! let cfg = ForestConfig::from_json_str(r#"{ "execution": "sequential", "max_degree": 3 }"#).unwrap();
//! assert_eq!(cfg.execution, ExecutionMode::Sequential);
//! assert_eq!(cfg.max_degree, Some(3));
//! assert_eq!(cfg.granularity, ForestConfig::default().granularity);
//! ```

use serde::{Deserialize, Serialize};

use crate::contraction::ContractionScheme;
use crate::parallel::Parallelism;

/// How the per-phase loops over active groups run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One thread, same phase order. The reference for the parallel mode.
    Sequential,
    /// Data-parallel loops over groups with a barrier between phases.
    #[default]
    Parallel,
}

/// Knobs for a [`ContractionForest`](crate::ContractionForest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Sequential or parallel phases.
    pub execution: ExecutionMode,
    /// Below this many groups a parallel loop runs sequentially.
    pub granularity: usize,
    /// Optional bound on children per vertex. `None` means unbounded.
    pub max_degree: Option<usize>,
    /// Vertices per ownership group during from-scratch construction.
    pub construction_block: usize,
    /// Contraction predicate used by `initialize`.
    pub scheme: ContractionScheme,
    /// Keep a log of every ownership mark and claim (test diagnostics).
    pub record_ownership: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Parallel,
            granularity: 8,
            max_degree: None,
            construction_block: 1024,
            scheme: ContractionScheme::default(),
            record_ownership: false,
        }
    }
}

impl ForestConfig {
    /// Same configuration with sequential phases.
    pub fn sequential() -> Self {
        Self {
            execution: ExecutionMode::Sequential,
            ..Self::default()
        }
    }

    /// Parses a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Builder-style execution mode override.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Builder-style scheme override.
    #[must_use]
    pub fn with_scheme(mut self, scheme: ContractionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Builder-style ownership logging toggle.
    #[must_use]
    pub fn with_ownership_log(mut self, enabled: bool) -> Self {
        self.record_ownership = enabled;
        self
    }

    /// Execution mode and granularity as consumed by the parallel primitives.
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::new(self.execution, self.granularity)
    }

    pub(crate) fn effective_block(&self) -> usize {
        self.construction_block.max(1)
    }
}
