//! Memory Subsystem Configuration
//!
//! `TigerStyle`: Explicit limits, validated before use.
//!
//! Every tunable the subsystem exposes lives here with its default pulled
//! from [`crate::constants`]. Construction is infallible; [`MemoryConfig::validate`]
//! is the gate components call before wiring themselves up.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONTEXT_TTL_SECS, EMBEDDING_MODEL_DEFAULT, INPUT_BUFFER_ENTRIES_COUNT_MAX,
    INPUT_BUFFER_TTL_SECS, PROMOTION_CONTEXT_ACCESS_COUNT_THRESHOLD,
    PROMOTION_WORKING_ACCESS_COUNT_THRESHOLD, SCORE_POPULARITY_EPSILON_DEFAULT,
    SCORE_WEIGHT_POPULARITY_DEFAULT, SCORE_WEIGHT_SEMANTIC_DEFAULT, SCORE_WEIGHT_SUM_TOLERANCE,
    SCORE_WEIGHT_TIME_DEFAULT, TASK_RETRY_COUNT_MAX_DEFAULT, WORKER_POLL_INTERVAL_SECS_DEFAULT,
};
use crate::scoring::ScoreWeights;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Score weights do not sum to 1.0
    #[error("score weights must sum to 1.0 (got {sum})")]
    InvalidWeights {
        /// Actual sum
        sum: f64,
    },

    /// Promotion thresholds are not strictly ordered
    #[error("promotion thresholds must satisfy 0 < context ({context}) < working ({working})")]
    InvalidThresholds {
        /// Buffer-to-context threshold
        context: u64,
        /// Context-to-working threshold
        working: u64,
    },

    /// A single field is out of range
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

// =============================================================================
// Memory Config
// =============================================================================

/// Tunables for the memory subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MemoryConfig {
    /// Weight of semantic similarity in the final score
    pub weight_semantic: f64,
    /// Weight of the popularity score in the final score
    pub weight_popularity: f64,
    /// Weight of the time score in the final score
    pub weight_time: f64,
    /// Popularity saturation rate
    pub popularity_epsilon: f64,
    /// Access count that promotes a buffered fragment into context
    pub context_threshold: u64,
    /// Access count that promotes a context fragment to working memory
    pub working_threshold: u64,
    /// Input buffer TTL in seconds
    pub input_buffer_ttl_secs: u64,
    /// Context snapshot TTL in seconds
    pub context_ttl_secs: u64,
    /// Max entries held per character input buffer
    pub input_buffer_capacity: usize,
    /// Worker poll interval in seconds
    pub worker_poll_interval_secs: u64,
    /// Retry budget for new tasks
    pub task_max_retries: u32,
    /// Embedding model name
    pub embedding_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            weight_semantic: SCORE_WEIGHT_SEMANTIC_DEFAULT,
            weight_popularity: SCORE_WEIGHT_POPULARITY_DEFAULT,
            weight_time: SCORE_WEIGHT_TIME_DEFAULT,
            popularity_epsilon: SCORE_POPULARITY_EPSILON_DEFAULT,
            context_threshold: PROMOTION_CONTEXT_ACCESS_COUNT_THRESHOLD,
            working_threshold: PROMOTION_WORKING_ACCESS_COUNT_THRESHOLD,
            input_buffer_ttl_secs: INPUT_BUFFER_TTL_SECS,
            context_ttl_secs: CONTEXT_TTL_SECS,
            input_buffer_capacity: INPUT_BUFFER_ENTRIES_COUNT_MAX,
            worker_poll_interval_secs: WORKER_POLL_INTERVAL_SECS_DEFAULT,
            task_max_retries: TASK_RETRY_COUNT_MAX_DEFAULT,
            embedding_model: EMBEDDING_MODEL_DEFAULT.to_string(),
        }
    }
}

impl MemoryConfig {
    /// Override the scoring weights.
    #[must_use]
    pub fn with_weights(mut self, semantic: f64, popularity: f64, time: f64) -> Self {
        self.weight_semantic = semantic;
        self.weight_popularity = popularity;
        self.weight_time = time;
        self
    }

    /// Override the promotion thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, context: u64, working: u64) -> Self {
        self.context_threshold = context;
        self.working_threshold = working;
        self
    }

    /// Override the worker poll interval.
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.worker_poll_interval_secs = secs;
        self
    }

    /// The scoring weights as the scorer consumes them.
    #[must_use]
    pub fn score_weights(&self) -> ScoreWeights {
        ScoreWeights {
            semantic: self.weight_semantic,
            popularity: self.weight_popularity,
            time: self.weight_time,
            epsilon: self.popularity_epsilon,
        }
    }

    /// Check every field before the config is used.
    ///
    /// # Errors
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.weight_semantic + self.weight_popularity + self.weight_time;
        if (sum - 1.0).abs() > SCORE_WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights { sum });
        }
        for (field, value) in [
            ("weight_semantic", self.weight_semantic),
            ("weight_popularity", self.weight_popularity),
            ("weight_time", self.weight_time),
        ] {
            if value < 0.0 {
                return Err(ConfigError::InvalidField {
                    field,
                    message: format!("must be non-negative (got {value})"),
                });
            }
        }
        if self.popularity_epsilon <= 0.0 {
            return Err(ConfigError::InvalidField {
                field: "popularity_epsilon",
                message: format!("must be positive (got {})", self.popularity_epsilon),
            });
        }
        if self.context_threshold == 0 || self.working_threshold <= self.context_threshold {
            return Err(ConfigError::InvalidThresholds {
                context: self.context_threshold,
                working: self.working_threshold,
            });
        }
        if self.input_buffer_ttl_secs == 0 {
            return Err(ConfigError::InvalidField {
                field: "input_buffer_ttl_secs",
                message: "must be positive".to_string(),
            });
        }
        if self.context_ttl_secs <= self.input_buffer_ttl_secs {
            return Err(ConfigError::InvalidField {
                field: "context_ttl_secs",
                message: "must exceed the input buffer TTL".to_string(),
            });
        }
        if self.input_buffer_capacity == 0 {
            return Err(ConfigError::InvalidField {
                field: "input_buffer_capacity",
                message: "must be positive".to_string(),
            });
        }
        if self.worker_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidField {
                field: "worker_poll_interval_secs",
                message: "must be positive".to_string(),
            });
        }
        if self.embedding_model.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "embedding_model",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
