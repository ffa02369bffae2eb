//! DST - Deterministic Simulation Testing Support
//!
//! `TigerStyle`: Simulation-first. Every collaborator has a sim implementation
//! driven by a shared [`SimClock`], a seeded [`DeterministicRng`], and an
//! optional [`FaultInjector`], so the whole memory pipeline can be tested with
//! reproducible time, randomness, and failures.

mod clock;
mod fault;
mod rng;

pub use clock::SimClock;
pub use fault::{FaultConfig, FaultInjector, FaultType};
pub use rng::DeterministicRng;
