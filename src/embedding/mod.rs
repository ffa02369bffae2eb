//! Embedding Provider - Text to Vector Generation
//!
//! `TigerStyle`: Trait seam with a deterministic simulation backend.
//!
//! Production deployments plug a real model server in behind
//! [`EmbeddingProvider`]; tests use [`SimEmbeddingProvider`], which derives
//! stable vectors from a seed and the input text so identical text always
//! embeds identically within a run.

mod sim;

pub use sim::SimEmbeddingProvider;

use async_trait::async_trait;

use crate::storage::SparseVector;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from embedding generation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Input text was empty
    #[error("cannot embed empty input")]
    EmptyInput,

    /// The provider did not answer in time
    #[error("embedding timed out after {duration_ms}ms")]
    Timeout {
        /// How long we waited
        duration_ms: u64,
    },

    /// The requested model is not served by this provider
    #[error("unknown embedding model: {model}")]
    UnknownModel {
        /// Requested model name
        model: String,
    },

    /// The provider failed
    #[error("embedding provider error: {message}")]
    Provider {
        /// Error message
        message: String,
    },
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Timeout { .. } | EmbeddingError::Provider { .. }
        )
    }
}

// =============================================================================
// Embedding
// =============================================================================

/// The vectors produced for one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Dense semantic vector, unit-normalized
    pub dense: Vec<f32>,
    /// Sparse lexical vector (bucketed token weights)
    pub sparse: Option<SparseVector>,
    /// Model that produced the vectors
    pub model: String,
    /// Tokens consumed by the model
    pub token_count: usize,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Embed `text` with the named model.
    ///
    /// Implementations must reject empty input with
    /// [`EmbeddingError::EmptyInput`].
    async fn generate(&self, text: &str, model: &str) -> Result<Embedding, EmbeddingError>;

    /// Dense dimensionality this provider produces.
    fn dimensions(&self) -> usize;
}
