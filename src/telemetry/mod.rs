//! Tracing setup.
//!
//! Call [`init`] once at process start. Filtering follows `RUST_LOG`, e.g.
//! `RUST_LOG=engram_memory=debug`.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "engram_memory=info";

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops (tests share one
/// process).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
