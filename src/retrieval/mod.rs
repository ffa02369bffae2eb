//! Retrieval Engine - Hybrid Search with Rescoring
//!
//! `TigerStyle`: Sim-first, deterministic, fire-and-forget accounting.
//!
//! # Architecture
//!
//! ```text
//! RetrievalEngine<V: VectorStore, A: AccessStore>
//! ├── retrieve()  → hybrid search → batch access stats → rescore → rank
//! └── store()     → ensure namespace → upsert vectors → init access info
//! ```
//!
//! `retrieve` over-fetches `limit * 3` candidates so the behavioral rescoring
//! can reorder them before truncation, then fires a detached access-count
//! increment per returned fragment. Those increments never block or fail the
//! read; failures are logged and swallowed.

mod types;

pub use types::{QueryVectors, ScoredFragment};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::constants::{RETRIEVAL_OVERFETCH_FACTOR, RETRIEVAL_RESULTS_COUNT_MAX};
use crate::dst::SimClock;
use crate::scoring::HybridScorer;
use crate::storage::{
    AccessStore, FragmentBuilder, MemoryFragment, MemoryLayer, SparseVector, StorageError,
    VectorStore,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from retrieval operations.
///
/// Note: failures of the post-read access-count increment are swallowed by
/// design and never surface here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    /// Query dense vector is empty
    #[error("query vector is empty")]
    EmptyQueryVector,

    /// Invalid result limit
    #[error("invalid limit: {value} (must be 1-{max})")]
    InvalidLimit {
        /// Provided value
        value: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Request failed validation
    #[error("validation error: {message}")]
    Validation {
        /// What was invalid
        message: String,
    },

    /// Fragment or namespace not found
    #[error("not found: {id}")]
    NotFound {
        /// Identifier that was not found
        id: String,
    },

    /// A downstream store call failed
    #[error("storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },
}

impl From<StorageError> for RetrievalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => RetrievalError::NotFound { id },
            StorageError::Validation { message } => RetrievalError::Validation { message },
            other => RetrievalError::Storage {
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Store Request
// =============================================================================

/// A synchronous write through the durable storage path: the caller supplies
/// the vectors.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Owning character
    pub character_id: String,
    /// Fragment content
    pub content: String,
    /// Target layer (default `working`)
    pub layer: MemoryLayer,
    /// Dense embedding
    pub dense: Vec<f32>,
    /// Optional sparse lexical vector
    pub sparse: Option<SparseVector>,
    /// Open metadata
    pub metadata: Map<String, Value>,
    /// Explicit fragment id for idempotent re-stores
    pub fragment_id: Option<String>,
}

impl StoreRequest {
    /// Build a store request targeting the working layer.
    #[must_use]
    pub fn new(
        character_id: impl Into<String>,
        content: impl Into<String>,
        dense: Vec<f32>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            content: content.into(),
            layer: MemoryLayer::Working,
            dense,
            sparse: None,
            metadata: Map::new(),
            fragment_id: None,
        }
    }

    /// Set the target layer.
    #[must_use]
    pub fn layer(mut self, layer: MemoryLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Attach a sparse vector.
    #[must_use]
    pub fn sparse(mut self, sparse: SparseVector) -> Self {
        self.sparse = Some(sparse);
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Pin the fragment id.
    #[must_use]
    pub fn fragment_id(mut self, id: impl Into<String>) -> Self {
        self.fragment_id = Some(id.into());
        self
    }
}

// =============================================================================
// Retrieval Engine
// =============================================================================

/// Orchestrates hybrid search, behavioral rescoring, and access accounting.
#[derive(Debug)]
pub struct RetrievalEngine<V: VectorStore, A: AccessStore> {
    vector: Arc<V>,
    access: Arc<A>,
    scorer: HybridScorer,
    clock: SimClock,
}

impl<V: VectorStore, A: AccessStore> RetrievalEngine<V, A> {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(vector: Arc<V>, access: Arc<A>, scorer: HybridScorer, clock: SimClock) -> Self {
        Self {
            vector,
            access,
            scorer,
            clock,
        }
    }

    /// Retrieve up to `limit` fragments ranked by the blended final score.
    ///
    /// # Errors
    /// Returns `RetrievalError` on invalid input or when the vector store or
    /// the batch access lookup fails. Zero candidates is a success with an
    /// empty result; the access store is not consulted in that case.
    #[tracing::instrument(skip(self, query), fields(character_id, limit))]
    pub async fn retrieve(
        &self,
        character_id: &str,
        query: &QueryVectors,
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, RetrievalError> {
        // Preconditions
        if character_id.is_empty() {
            return Err(RetrievalError::Validation {
                message: "character_id must not be empty".to_string(),
            });
        }
        if query.dense.is_empty() {
            return Err(RetrievalError::EmptyQueryVector);
        }
        if limit == 0 || limit > RETRIEVAL_RESULTS_COUNT_MAX {
            return Err(RetrievalError::InvalidLimit {
                value: limit,
                max: RETRIEVAL_RESULTS_COUNT_MAX,
            });
        }

        // 1. Over-fetch so rescoring has room to reorder.
        let candidates = self
            .vector
            .hybrid_search(
                character_id,
                &query.dense,
                query.sparse.as_ref(),
                limit * RETRIEVAL_OVERFETCH_FACTOR,
            )
            .await?;

        // 2. Nothing found: no further collaborator calls.
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // 3. One batched access-stats lookup for every candidate.
        let fragment_ids: Vec<String> =
            candidates.iter().map(|c| c.fragment.id.clone()).collect();
        let access_info: HashMap<String, _> = self
            .access
            .get_batch_access_info(character_id, &fragment_ids)
            .await?;

        // 4. Rescore.
        let now = self.clock.now();
        let mut results: Vec<ScoredFragment> = candidates
            .into_iter()
            .map(|c| ScoredFragment::from_candidate(c.fragment, f64::from(c.semantic_score)))
            .collect();
        self.scorer.rescore(&mut results, &access_info, now);

        // 5. Rank: final score descending, fragment id ascending on ties.
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fragment.id.cmp(&b.fragment.id))
        });

        // 6. Truncate to the caller's limit.
        results.truncate(limit);

        // 7. Detached access accounting, decoupled from the read result.
        self.spawn_access_increments(character_id, &results, now);

        // Postcondition
        assert!(results.len() <= limit, "results must not exceed limit");
        Ok(results)
    }

    /// Persist a fragment with caller-supplied vectors.
    ///
    /// Ensures the character's namespace, upserts the vectors, and
    /// initializes access info. Failures surface as-is with no cleanup;
    /// a retried call with the same fragment id is idempotent at the vector
    /// store (upsert) but resets access counters (known gap, see crate docs).
    #[tracing::instrument(skip(self, request), fields(character_id = %request.character_id))]
    pub async fn store(&self, request: StoreRequest) -> Result<MemoryFragment, RetrievalError> {
        // Preconditions
        if request.character_id.is_empty() {
            return Err(RetrievalError::Validation {
                message: "character_id must not be empty".to_string(),
            });
        }
        if request.content.is_empty() {
            return Err(RetrievalError::Validation {
                message: "content must not be empty".to_string(),
            });
        }
        if request.dense.is_empty() {
            return Err(RetrievalError::EmptyQueryVector);
        }

        let now = self.clock.now();
        let mut builder = FragmentBuilder::new(&request.character_id, &request.content)
            .layer(request.layer)
            .metadata(request.metadata.clone());
        if let Some(id) = &request.fragment_id {
            builder = builder.id(id);
        }
        let fragment = builder.build_at(now);

        self.vector.ensure_namespace(&request.character_id).await?;
        self.vector
            .upsert(&fragment, &request.dense, request.sparse.as_ref())
            .await?;
        self.access
            .init_access_info(&request.character_id, &fragment.id, now)
            .await?;

        tracing::debug!(
            fragment_id = %fragment.id,
            layer = fragment.layer.as_str(),
            "stored fragment"
        );
        Ok(fragment)
    }

    /// Fire one detached increment per returned fragment. Errors are logged
    /// and swallowed; they must never affect the read path.
    fn spawn_access_increments(
        &self,
        character_id: &str,
        results: &[ScoredFragment],
        now: chrono::DateTime<chrono::Utc>,
    ) {
        for result in results {
            let access = Arc::clone(&self.access);
            let character_id = character_id.to_string();
            let fragment_id = result.fragment.id.clone();
            tokio::spawn(async move {
                if let Err(err) = access
                    .increment_access(&character_id, &fragment_id, now)
                    .await
                {
                    tracing::warn!(
                        character_id,
                        fragment_id,
                        error = %err,
                        "access-count increment failed; read unaffected"
                    );
                }
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
