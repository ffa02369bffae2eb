//! Retrieval Types

use serde::{Deserialize, Serialize};

use crate::storage::{MemoryFragment, SparseVector};

/// Query vectors for a retrieve call: a dense embedding plus an optional
/// sparse lexical vector for hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVectors {
    /// Dense query embedding
    pub dense: Vec<f32>,
    /// Optional sparse lexical vector
    pub sparse: Option<SparseVector>,
}

impl QueryVectors {
    /// Dense-only query.
    #[must_use]
    pub fn dense(dense: Vec<f32>) -> Self {
        Self {
            dense,
            sparse: None,
        }
    }

    /// Hybrid query with a sparse component.
    #[must_use]
    pub fn hybrid(dense: Vec<f32>, sparse: SparseVector) -> Self {
        Self {
            dense,
            sparse: Some(sparse),
        }
    }
}

/// One ranked retrieval result: the fragment with its four scores.
///
/// Ephemeral; produced by the retrieval engine and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    /// The retrieved fragment
    pub fragment: MemoryFragment,
    /// Similarity score reported by the vector store, in [0, 1]
    pub semantic_score: f64,
    /// Popularity score from the access count, in [0, 1]
    pub popularity_score: f64,
    /// Recency score from the forgetting curve, in [0, 1]
    pub time_score: f64,
    /// Weighted blend of the three, in [0, 1]
    pub final_score: f64,
}

impl ScoredFragment {
    /// Wrap a vector-store candidate before rescoring; the popularity, time,
    /// and final scores start at zero.
    #[must_use]
    pub fn from_candidate(fragment: MemoryFragment, semantic_score: f64) -> Self {
        Self {
            fragment,
            semantic_score,
            popularity_score: 0.0,
            time_score: 0.0,
            final_score: 0.0,
        }
    }
}
