//! Simulated embedding provider for deterministic testing.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::constants::{
    EMBEDDING_DIMENSIONS_COUNT, EMBEDDING_MODEL_DEFAULT, EMBEDDING_SPARSE_BUCKETS_COUNT,
};
use crate::dst::{DeterministicRng, FaultInjector, FaultType};
use crate::embedding::{Embedding, EmbeddingError, EmbeddingProvider};
use crate::storage::SparseVector;

/// Deterministic embedding provider: vectors depend only on the seed and the
/// input text, so identical text embeds identically across a run. Semantic
/// similarity is crude (shared text hashes to shared vectors) but sufficient
/// for exercising the retrieval and queue pipelines.
#[derive(Debug)]
pub struct SimEmbeddingProvider {
    seed: u64,
    fault_injector: Option<std::sync::Arc<FaultInjector>>,
}

impl SimEmbeddingProvider {
    /// Create a provider with vectors derived from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fault_injector: None,
        }
    }

    /// Create with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, fault_injector: std::sync::Arc<FaultInjector>) -> Self {
        Self {
            seed,
            fault_injector: Some(fault_injector),
        }
    }

    fn should_inject(&self, fault: FaultType) -> bool {
        self.fault_injector
            .as_ref()
            .is_some_and(|injector| injector.should_inject(fault))
    }

    /// FNV-1a, stable across platforms unlike `DefaultHasher`.
    fn hash_text(text: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn dense_for(&self, text: &str) -> Vec<f32> {
        let mut rng = DeterministicRng::new(self.seed ^ Self::hash_text(text));
        let mut dense: Vec<f32> = (0..EMBEDDING_DIMENSIONS_COUNT)
            .map(|_| rng.next_signed_f32())
            .collect();

        // Unit-normalize, as real embedding models do.
        let norm: f32 = dense.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(norm > 0.0, "random vector must have positive norm");
        for v in &mut dense {
            *v /= norm;
        }
        dense
    }

    fn sparse_for(text: &str) -> Option<SparseVector> {
        // Bucketed term frequencies over lowercase whitespace tokens.
        let mut buckets: BTreeMap<u32, f32> = BTreeMap::new();
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let bucket =
                u32::try_from(Self::hash_text(&token) % EMBEDDING_SPARSE_BUCKETS_COUNT as u64)
                    .unwrap_or(0);
            *buckets.entry(bucket).or_insert(0.0) += 1.0;
        }
        if buckets.is_empty() {
            return None;
        }

        let (indices, mut values): (Vec<u32>, Vec<f32>) = buckets.into_iter().unzip();
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        for v in &mut values {
            *v /= norm;
        }
        Some(SparseVector::new(indices, values))
    }
}

#[async_trait]
impl EmbeddingProvider for SimEmbeddingProvider {
    async fn generate(&self, text: &str, model: &str) -> Result<Embedding, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        if model != EMBEDDING_MODEL_DEFAULT {
            return Err(EmbeddingError::UnknownModel {
                model: model.to_string(),
            });
        }
        if self.should_inject(FaultType::EmbeddingTimeout) {
            return Err(EmbeddingError::Timeout { duration_ms: 5000 });
        }
        if self.should_inject(FaultType::EmbeddingFail) {
            return Err(EmbeddingError::Provider {
                message: "injected fault: provider failed".to_string(),
            });
        }

        let dense = self.dense_for(text);
        let sparse = Self::sparse_for(text);
        let token_count = text.split_whitespace().count();

        // Postconditions
        assert_eq!(dense.len(), EMBEDDING_DIMENSIONS_COUNT, "fixed dimensions");
        assert!(token_count > 0, "non-empty text must have tokens");

        Ok(Embedding {
            dense,
            sparse,
            model: model.to_string(),
            token_count,
        })
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS_COUNT
    }
}
