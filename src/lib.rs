//! # Engram Memory
//!
//! A layered memory subsystem for AI characters with deterministic simulation
//! testing.
//!
//! ## Features
//!
//! - **Tiered memory**: sensory input buffer → context window → working
//!   memory, promoted by observed access frequency
//! - **Hybrid retrieval**: dense + sparse vector search rescored with
//!   popularity and a forgetting curve
//! - **Async embedding pipeline**: FIFO task queue with a polling worker,
//!   bounded retries, and a push/pull exchange protocol for external
//!   consumers
//! - **Deterministic testing**: every collaborator has a simulation
//!   implementation driven by a controlled clock, seeded randomness, and
//!   fault injection
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use engram_memory::dst::SimClock;
//! use engram_memory::storage::{SimAccessStore, SimContextStore, SimInputBufferStore};
//! use engram_memory::tiers::TierManager;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = SimClock::at_ms(1_000_000);
//! let tiers = TierManager::new(
//!     Arc::new(SimInputBufferStore::new(clock.clone())),
//!     Arc::new(SimContextStore::new(clock.clone())),
//!     Arc::new(SimAccessStore::new()),
//!     clock.clone(),
//! );
//!
//! // A new observation lands in the character's sensory buffer.
//! let fragment = tiers
//!     .add_to_input_buffer("alice", "the market opens at dawn", Default::default())
//!     .await?;
//!
//! // One use plus the sweep's own touch reaches the promotion threshold.
//! tiers.record_access("alice", &fragment.id).await?;
//! let report = tiers.process_input_buffer("alice").await?;
//! assert_eq!(report.promoted, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  TierManager          │ buffer → context → working       │
//! │  RetrievalEngine      │ hybrid search + rescoring        │
//! │  TaskWorker / Service │ async embedding, retries, FIFO   │
//! ├──────────────────────────────────────────────────────────┤
//! │  InputBufferStore │ ContextStore │ VectorStore │ Access  │
//! ├──────────────────────────────────────────────────────────┤
//! │  DST framework        │ SimClock, faults, seeded RNG     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation-First Philosophy
//!
//! Every storage trait ships a `Sim*` implementation. Tests drive a
//! [`SimClock`](dst::SimClock) instead of the wall clock and arm
//! [`FaultInjector`](dst::FaultInjector) to prove behavior under storage,
//! queue, and embedding failures — same seed, same faults, same bug.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod dst;
pub mod embedding;
pub mod retrieval;
pub mod scoring;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod tiers;

// Re-export common types
pub use config::{ConfigError, MemoryConfig};
pub use dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType, SimClock};
pub use embedding::{Embedding, EmbeddingError, EmbeddingProvider, SimEmbeddingProvider};
pub use retrieval::{QueryVectors, RetrievalEngine, RetrievalError, ScoredFragment, StoreRequest};
pub use scoring::{HybridScorer, ScoreWeights};
pub use storage::{
    AccessInfo, AccessStore, ContextSnapshot, ContextStore, FragmentBuilder, InputBufferStore,
    MemoryFragment, MemoryLayer, SimAccessStore, SimContextStore, SimInputBufferStore,
    SimVectorStore, SparseVector, StorageError, VectorCandidate, VectorStore,
};
pub use task::{
    EmbeddingPayload, ExchangePush, ExchangeRequest, ExchangeResponse, SimTaskQueue, Task,
    TaskError, TaskKind, TaskQueue, TaskService, TaskStatus, TaskWorker,
};
pub use tiers::{SweepReport, TierError, TierManager};
