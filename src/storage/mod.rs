//! Storage - Collaborator Traits and Sim Implementations
//!
//! `TigerStyle`: Abstract storage with simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────┬──────────────┐
//! │ VectorStore  │ AccessStore  │ InputBufferStore │ ContextStore │
//! └──────────────┴──────────────┴──────────────────┴──────────────┘
//!        ↑               ↑                ↑                ↑
//!   SimVectorStore  SimAccessStore  SimInputBuffer…  SimContextStore
//! ```
//!
//! The core only ever talks to these traits. The in-tree implementations are
//! deterministic sims with fault injection; production backends (an ANN
//! vector database, a KV server) live behind the same contracts and are out
//! of scope here.

mod access;
mod buffer;
mod context;
mod error;
mod fragment;
mod vector;

pub use access::{AccessStore, SimAccessStore};
pub use buffer::{InputBufferStore, SimInputBufferStore};
pub use context::{ContextStore, SimContextStore};
pub use error::{StorageError, StorageResult};
pub use fragment::{AccessInfo, ContextSnapshot, FragmentBuilder, MemoryFragment, MemoryLayer};
pub use vector::{SimVectorStore, SparseVector, VectorCandidate, VectorStore};
