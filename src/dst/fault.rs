//! `FaultInjector` - Probabilistic Fault Injection
//!
//! `TigerStyle`: Explicit fault injection for chaos testing.
//!
//! Every sim collaborator accepts an optional injector so tests can exercise
//! error paths (task retries, swallowed access-increment failures) without a
//! real backend to break.

use std::collections::HashMap;
use std::sync::Mutex;

use super::rng::DeterministicRng;
use crate::constants::DST_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected.
///
/// `TigerStyle`: Every fault type is explicit and documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    // =========================================================================
    // Vector Store Faults
    // =========================================================================
    /// Hybrid search fails
    VectorSearchFail,
    /// Upsert fails
    VectorUpsertFail,
    /// Namespace creation fails
    VectorNamespaceFail,

    // =========================================================================
    // Access Store Faults
    // =========================================================================
    /// Access-info read (single or batch) fails
    AccessReadFail,
    /// Access-count increment or init fails
    AccessWriteFail,

    // =========================================================================
    // Buffer / Context Faults
    // =========================================================================
    /// Input-buffer push fails
    BufferWriteFail,
    /// Context snapshot read fails
    ContextReadFail,
    /// Context snapshot save fails
    ContextWriteFail,

    // =========================================================================
    // Task Queue Faults
    // =========================================================================
    /// Enqueue fails
    QueueEnqueueFail,
    /// Dequeue fails
    QueueDequeueFail,
    /// Task update fails
    QueueUpdateFail,

    // =========================================================================
    // Embedding Generator Faults
    // =========================================================================
    /// Generation request times out
    EmbeddingTimeout,
    /// Generation returns a service error
    EmbeddingFail,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorSearchFail => "vector_search_fail",
            Self::VectorUpsertFail => "vector_upsert_fail",
            Self::VectorNamespaceFail => "vector_namespace_fail",
            Self::AccessReadFail => "access_read_fail",
            Self::AccessWriteFail => "access_write_fail",
            Self::BufferWriteFail => "buffer_write_fail",
            Self::ContextReadFail => "context_read_fail",
            Self::ContextWriteFail => "context_write_fail",
            Self::QueueEnqueueFail => "queue_enqueue_fail",
            Self::QueueDequeueFail => "queue_dequeue_fail",
            Self::QueueUpdateFail => "queue_update_fail",
            Self::EmbeddingTimeout => "embedding_timeout",
            Self::EmbeddingFail => "embedding_fail",
        }
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        // Precondition
        assert!(
            (0.0..=DST_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {}], got {}",
            DST_FAULT_PROBABILITY_MAX,
            probability
        );

        Self {
            fault_type,
            probability,
            max_injections: None,
        }
    }

    /// Limit the number of times this fault fires.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        self.max_injections = Some(max);
        self
    }
}

/// Probabilistic fault injector shared by sim collaborators.
///
/// Interior mutability keeps the injector usable behind `Arc` from the
/// immutable store traits.
#[derive(Debug)]
pub struct FaultInjector {
    configs: Vec<FaultConfig>,
    rng: Mutex<DeterministicRng>,
    injection_counts: Mutex<HashMap<FaultType, u64>>,
}

impl FaultInjector {
    /// Create an injector with the given seed and no configured faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            configs: Vec::new(),
            rng: Mutex::new(DeterministicRng::new(seed)),
            injection_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Decide whether the given fault fires now.
    ///
    /// Rolls the deterministic RNG against the configured probability and
    /// honors `max_injections`.
    pub fn should_inject(&self, fault_type: FaultType) -> bool {
        let Some(config) = self.configs.iter().find(|c| c.fault_type == fault_type) else {
            return false;
        };

        if let Some(max) = config.max_injections {
            let counts = self.injection_counts.lock().unwrap();
            if counts.get(&fault_type).copied().unwrap_or(0) >= max {
                return false;
            }
        }

        let fire = self.rng.lock().unwrap().next_bool(config.probability);
        if fire {
            let mut counts = self.injection_counts.lock().unwrap();
            *counts.entry(fault_type).or_insert(0) += 1;
            tracing::debug!(fault = fault_type.as_str(), "injected fault");
        }
        fire
    }

    /// Number of times the given fault has fired.
    #[must_use]
    pub fn injection_count(&self, fault_type: FaultType) -> u64 {
        self.injection_counts
            .lock()
            .unwrap()
            .get(&fault_type)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_fault_never_fires() {
        let injector = FaultInjector::new(42);
        for _ in 0..100 {
            assert!(!injector.should_inject(FaultType::VectorSearchFail));
        }
    }

    #[test]
    fn test_certain_fault_always_fires() {
        let injector =
            FaultInjector::new(42).with_fault(FaultConfig::new(FaultType::QueueDequeueFail, 1.0));
        for _ in 0..10 {
            assert!(injector.should_inject(FaultType::QueueDequeueFail));
        }
        assert_eq!(injector.injection_count(FaultType::QueueDequeueFail), 10);
    }

    #[test]
    fn test_max_injections_caps_fault() {
        let injector = FaultInjector::new(42).with_fault(
            FaultConfig::new(FaultType::EmbeddingFail, 1.0).with_max_injections(2),
        );

        assert!(injector.should_inject(FaultType::EmbeddingFail));
        assert!(injector.should_inject(FaultType::EmbeddingFail));
        assert!(!injector.should_inject(FaultType::EmbeddingFail));
        assert_eq!(injector.injection_count(FaultType::EmbeddingFail), 2);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let run = |seed: u64| -> Vec<bool> {
            let injector = FaultInjector::new(seed)
                .with_fault(FaultConfig::new(FaultType::AccessWriteFail, 0.5));
            (0..50)
                .map(|_| injector.should_inject(FaultType::AccessWriteFail))
                .collect()
        };

        assert_eq!(run(7), run(7));
    }

    #[test]
    #[should_panic(expected = "probability must be in")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::EmbeddingFail, 1.5);
    }
}
