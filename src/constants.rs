//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `INPUT_BUFFER_ENTRIES_COUNT_MAX` (not `MAX_BUFFER_SIZE`)
//!
//! Every constant includes units in the name:
//! - `_SECS` / `_MS` for time durations
//! - `_COUNT_MAX` for quantity limits
//! - `_BYTES_MAX` for size limits

// =============================================================================
// Scoring
// =============================================================================

/// Default weight for the semantic similarity component of the final score
pub const SCORE_WEIGHT_SEMANTIC_DEFAULT: f64 = 0.5;

/// Default weight for the popularity component of the final score
pub const SCORE_WEIGHT_POPULARITY_DEFAULT: f64 = 0.3;

/// Default weight for the recency (forgetting curve) component of the final score
pub const SCORE_WEIGHT_TIME_DEFAULT: f64 = 0.2;

/// Tolerance when validating that score weights sum to 1.0
pub const SCORE_WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Default steepness parameter for the popularity curve `1 - e^(-eps * count)`
pub const SCORE_POPULARITY_EPSILON_DEFAULT: f64 = 0.1;

/// Strength constant of the forgetting curve `1.84 / (ln(h)^1.25 + 1.84)`
pub const TIME_SCORE_CURVE_STRENGTH: f64 = 1.84;

/// Exponent of the forgetting curve
pub const TIME_SCORE_CURVE_EXPONENT: f64 = 1.25;

/// Floor for elapsed hours, avoids a non-positive logarithm argument
pub const TIME_SCORE_HOURS_MIN: f64 = 0.01;

// =============================================================================
// Memory Tiers
// =============================================================================

/// Access count at which an input-buffer fragment promotes to the context layer (T1)
pub const PROMOTION_CONTEXT_ACCESS_COUNT_THRESHOLD: u64 = 2;

/// Access count at which a context fragment promotes to the working layer (T2)
pub const PROMOTION_WORKING_ACCESS_COUNT_THRESHOLD: u64 = 5;

/// Time-to-live for input-buffer fragments
pub const INPUT_BUFFER_TTL_SECS: u64 = 10;

/// Time-to-live for context-layer fragments
pub const CONTEXT_TTL_SECS: u64 = 3600; // 1 hour

/// Maximum number of fragments held in a character's input buffer
pub const INPUT_BUFFER_ENTRIES_COUNT_MAX: usize = 50;

// =============================================================================
// Fragment Limits
// =============================================================================

/// Maximum size of fragment content
pub const FRAGMENT_CONTENT_BYTES_MAX: usize = 100_000; // 100KB

/// Maximum length of a character identifier
pub const CHARACTER_ID_BYTES_MAX: usize = 256;

// =============================================================================
// Retrieval
// =============================================================================

/// Over-fetch multiplier applied to the caller's limit before rescoring
pub const RETRIEVAL_OVERFETCH_FACTOR: usize = 3;

/// Maximum number of results a single retrieve call may return
pub const RETRIEVAL_RESULTS_COUNT_MAX: usize = 100;

/// Default number of retrieve results
pub const RETRIEVAL_RESULTS_COUNT_DEFAULT: usize = 10;

// =============================================================================
// Embeddings
// =============================================================================

/// Number of dimensions in dense embeddings
pub const EMBEDDING_DIMENSIONS_COUNT: usize = 768;

/// Vocabulary size for simulated sparse embeddings (token hashing bucket count)
pub const EMBEDDING_SPARSE_BUCKETS_COUNT: u32 = 30_000;

/// Default embedding model name
pub const EMBEDDING_MODEL_DEFAULT: &str = "bge-base";

// =============================================================================
// Task Queue & Worker
// =============================================================================

/// Default maximum retry attempts for a failed task
pub const TASK_RETRY_COUNT_MAX_DEFAULT: u32 = 3;

/// Default worker poll interval
pub const WORKER_POLL_INTERVAL_SECS_DEFAULT: u64 = 5;

/// Maximum tasks returned by a single list or pull call
pub const TASK_LIST_COUNT_MAX: usize = 100;

/// Maximum size of a task input payload when serialized
pub const TASK_PAYLOAD_BYTES_MAX: usize = 100_000;

// =============================================================================
// Sim Hybrid Search
// =============================================================================

/// Weight of the dense (cosine) component in simulated hybrid search
pub const SIM_HYBRID_DENSE_WEIGHT: f32 = 0.7;

/// Weight of the sparse (lexical overlap) component in simulated hybrid search
pub const SIM_HYBRID_SPARSE_WEIGHT: f32 = 0.3;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 86_400_000; // 24 hours

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 3_600_000;

// =============================================================================
// Tests
// =============================================================================
