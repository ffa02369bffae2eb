//! Vector Store - Per-Character Namespaces with Hybrid Search
//!
//! `TigerStyle`: Trait-based abstraction, simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     VectorStore Trait                        │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │ SimVectorStore  │           │ production ANN  │
//! │   (testing)     │           │ (out of scope)  │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! Hybrid search blends dense (cosine) similarity with sparse lexical
//! overlap. The sim backend scans every fragment in the namespace; a real
//! backend would delegate to an approximate nearest-neighbor index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::{
    EMBEDDING_DIMENSIONS_COUNT, SIM_HYBRID_DENSE_WEIGHT, SIM_HYBRID_SPARSE_WEIGHT,
};
use crate::dst::{FaultInjector, FaultType};
use crate::storage::{MemoryFragment, StorageError, StorageResult};

// =============================================================================
// Vector Types
// =============================================================================

/// A sparse lexical vector: parallel index/value arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Token bucket indices, strictly ascending
    pub indices: Vec<u32>,
    /// Per-index weights
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Create a sparse vector.
    ///
    /// # Panics
    /// Panics if the index and value arrays differ in length.
    #[must_use]
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        // Precondition
        assert_eq!(
            indices.len(),
            values.len(),
            "sparse indices and values must have the same length"
        );
        Self { indices, values }
    }

    /// Dot product with another sparse vector (merge-join over indices).
    #[must_use]
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// L2 norm of the values.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// One candidate from hybrid search: the stored fragment plus its
/// backend-reported semantic score.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    /// The stored fragment payload
    pub fragment: MemoryFragment,
    /// Semantic similarity in [0, 1], higher is more similar
    pub semantic_score: f32,
}

// =============================================================================
// Vector Store Trait
// =============================================================================

/// Trait for vector storage backends with per-character namespaces.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug + 'static {
    /// Create the character's namespace if it does not exist (idempotent).
    async fn ensure_namespace(&self, character_id: &str) -> StorageResult<()>;

    /// Insert or overwrite a fragment with its vectors.
    async fn upsert(
        &self,
        fragment: &MemoryFragment,
        dense: &[f32],
        sparse: Option<&SparseVector>,
    ) -> StorageResult<()>;

    /// Hybrid similarity search within the character's namespace.
    ///
    /// # Returns
    /// Up to `limit` candidates, best first. An absent namespace yields an
    /// empty result, not an error.
    async fn hybrid_search(
        &self,
        character_id: &str,
        dense: &[f32],
        sparse: Option<&SparseVector>,
        limit: usize,
    ) -> StorageResult<Vec<VectorCandidate>>;

    /// Delete the character's entire namespace.
    ///
    /// Deletion is always character-scoped: an empty character id is a
    /// validation error, never a silent global wipe.
    async fn delete_namespace(&self, character_id: &str) -> StorageResult<()>;
}

// =============================================================================
// Simulated Vector Store (for DST)
// =============================================================================

/// One stored entry in the sim backend.
#[derive(Debug, Clone)]
struct StoredVector {
    fragment: MemoryFragment,
    dense: Vec<f32>,
    sparse: Option<SparseVector>,
}

/// In-memory vector store for deterministic simulation testing.
#[derive(Debug, Clone, Default)]
pub struct SimVectorStore {
    /// character_id -> fragment_id -> stored entry
    namespaces: Arc<RwLock<HashMap<String, HashMap<String, StoredVector>>>>,
    /// Fault injector for testing error paths
    fault_injector: Option<Arc<FaultInjector>>,
}

impl SimVectorStore {
    /// Create an empty sim vector store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with fault injection enabled.
    #[must_use]
    pub fn with_faults(fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(HashMap::new())),
            fault_injector: Some(fault_injector),
        }
    }

    /// Number of fragments stored for a character.
    #[must_use]
    pub fn namespace_len(&self, character_id: &str) -> usize {
        self.namespaces
            .read()
            .unwrap()
            .get(character_id)
            .map_or(0, HashMap::len)
    }

    fn should_inject(&self, fault: FaultType) -> bool {
        self.fault_injector
            .as_ref()
            .is_some_and(|injector| injector.should_inject(fault))
    }

    /// Cosine similarity normalized from [-1, 1] to [0, 1].
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        // Preconditions
        assert_eq!(a.len(), b.len(), "vectors must have same length");
        assert!(!a.is_empty(), "vectors must not be empty");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (dot / (norm_a * norm_b) + 1.0) / 2.0
    }

    /// Blend dense cosine with sparse overlap when both sides carry a
    /// sparse vector; dense-only otherwise.
    fn hybrid_score(
        query_dense: &[f32],
        query_sparse: Option<&SparseVector>,
        stored: &StoredVector,
    ) -> f32 {
        let dense_score = Self::cosine_similarity(query_dense, &stored.dense);

        match (query_sparse, stored.sparse.as_ref()) {
            (Some(qs), Some(ss)) => {
                let denom = qs.norm() * ss.norm();
                let sparse_score = if denom > 0.0 {
                    (qs.dot(ss) / denom).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                SIM_HYBRID_DENSE_WEIGHT * dense_score + SIM_HYBRID_SPARSE_WEIGHT * sparse_score
            }
            _ => dense_score,
        }
    }
}

#[async_trait]
impl VectorStore for SimVectorStore {
    async fn ensure_namespace(&self, character_id: &str) -> StorageResult<()> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::VectorNamespaceFail) {
            return Err(StorageError::connection(
                "injected fault: namespace creation failed",
            ));
        }

        let mut namespaces = self.namespaces.write().unwrap();
        namespaces.entry(character_id.to_string()).or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        fragment: &MemoryFragment,
        dense: &[f32],
        sparse: Option<&SparseVector>,
    ) -> StorageResult<()> {
        // Preconditions
        assert!(!fragment.id.is_empty(), "fragment id must not be empty");
        assert_eq!(
            dense.len(),
            EMBEDDING_DIMENSIONS_COUNT,
            "dense vector must have {} dimensions, got {}",
            EMBEDDING_DIMENSIONS_COUNT,
            dense.len()
        );

        if self.should_inject(FaultType::VectorUpsertFail) {
            return Err(StorageError::write("injected fault: vector upsert failed"));
        }

        let mut namespaces = self.namespaces.write().unwrap();
        let Some(namespace) = namespaces.get_mut(&fragment.character_id) else {
            return Err(StorageError::not_found(&fragment.character_id));
        };
        namespace.insert(
            fragment.id.clone(),
            StoredVector {
                fragment: fragment.clone(),
                dense: dense.to_vec(),
                sparse: sparse.cloned(),
            },
        );
        Ok(())
    }

    async fn hybrid_search(
        &self,
        character_id: &str,
        dense: &[f32],
        sparse: Option<&SparseVector>,
        limit: usize,
    ) -> StorageResult<Vec<VectorCandidate>> {
        // Preconditions
        assert!(limit > 0, "limit must be positive");
        assert_eq!(
            dense.len(),
            EMBEDDING_DIMENSIONS_COUNT,
            "query vector must have {} dimensions, got {}",
            EMBEDDING_DIMENSIONS_COUNT,
            dense.len()
        );

        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::VectorSearchFail) {
            return Err(StorageError::read("injected fault: hybrid search failed"));
        }

        let namespaces = self.namespaces.read().unwrap();
        let Some(namespace) = namespaces.get(character_id) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<VectorCandidate> = namespace
            .values()
            .map(|stored| VectorCandidate {
                fragment: stored.fragment.clone(),
                semantic_score: Self::hybrid_score(dense, sparse, stored),
            })
            .collect();

        // Best first; ties broken by fragment id for determinism.
        results.sort_by(|a, b| {
            b.semantic_score
                .partial_cmp(&a.semantic_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fragment.id.cmp(&b.fragment.id))
        });
        results.truncate(limit);

        // Postcondition
        assert!(results.len() <= limit, "results must not exceed limit");
        Ok(results)
    }

    async fn delete_namespace(&self, character_id: &str) -> StorageResult<()> {
        if character_id.is_empty() {
            return Err(StorageError::validation(
                "delete requires a character id; global deletion is not allowed",
            ));
        }

        let mut namespaces = self.namespaces.write().unwrap();
        if namespaces.remove(character_id).is_none() {
            return Err(StorageError::not_found(character_id));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
