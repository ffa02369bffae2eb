//! Input Buffer Store - Bounded Sensory Buffer per Character
//!
//! `TigerStyle`: Trait-based abstraction, simulation-first testing.
//!
//! Semantics mirror a list under a refreshed expiry key: each push re-arms
//! the whole buffer's TTL, the buffer is trimmed to a fixed capacity from
//! the oldest end, and an expired buffer reads as empty.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::constants::{INPUT_BUFFER_ENTRIES_COUNT_MAX, INPUT_BUFFER_TTL_SECS, TIME_MS_PER_SEC};
use crate::dst::{FaultInjector, FaultType, SimClock};
use crate::storage::{MemoryFragment, StorageError, StorageResult};

// =============================================================================
// Input Buffer Store Trait
// =============================================================================

/// Trait for the short-lived input-buffer backend.
#[async_trait]
pub trait InputBufferStore: Send + Sync + std::fmt::Debug + 'static {
    /// Append a fragment to its character's buffer.
    ///
    /// Re-arms the buffer TTL and trims the oldest entries once the buffer
    /// exceeds its capacity.
    async fn push(&self, fragment: &MemoryFragment) -> StorageResult<()>;

    /// All current buffer entries, oldest first. Empty if the buffer expired.
    async fn get_all(&self, character_id: &str) -> StorageResult<Vec<MemoryFragment>>;

    /// The `n` most recent entries, oldest of those first.
    async fn get_recent(&self, character_id: &str, n: usize) -> StorageResult<Vec<MemoryFragment>>;

    /// Drop the character's buffer entirely.
    async fn clear(&self, character_id: &str) -> StorageResult<()>;
}

// =============================================================================
// Simulated Input Buffer Store (for DST)
// =============================================================================

/// One character's buffer with its refreshed expiry deadline.
#[derive(Debug, Clone)]
struct Buffer {
    entries: VecDeque<MemoryFragment>,
    /// Whole-buffer deadline in clock ms, re-armed on every push
    expires_at_ms: u64,
}

/// In-memory input buffer for deterministic simulation testing.
#[derive(Debug, Clone)]
pub struct SimInputBufferStore {
    buffers: Arc<RwLock<HashMap<String, Buffer>>>,
    clock: SimClock,
    max_entries: usize,
    ttl_ms: u64,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl SimInputBufferStore {
    /// Create a sim buffer store with default capacity and TTL.
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self::with_limits(
            clock,
            INPUT_BUFFER_ENTRIES_COUNT_MAX,
            INPUT_BUFFER_TTL_SECS * TIME_MS_PER_SEC,
        )
    }

    /// Create with explicit capacity and TTL.
    ///
    /// # Panics
    /// Panics if capacity or TTL are zero.
    #[must_use]
    pub fn with_limits(clock: SimClock, max_entries: usize, ttl_ms: u64) -> Self {
        // Preconditions
        assert!(max_entries > 0, "buffer capacity must be positive");
        assert!(ttl_ms > 0, "buffer TTL must be positive");

        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
            clock,
            max_entries,
            ttl_ms,
            fault_injector: None,
        }
    }

    /// Enable fault injection.
    #[must_use]
    pub fn with_faults(mut self, fault_injector: Arc<FaultInjector>) -> Self {
        self.fault_injector = Some(fault_injector);
        self
    }

    fn should_inject(&self, fault: FaultType) -> bool {
        self.fault_injector
            .as_ref()
            .is_some_and(|injector| injector.should_inject(fault))
    }

    fn live_entries(&self, character_id: &str) -> Vec<MemoryFragment> {
        let buffers = self.buffers.read().unwrap();
        match buffers.get(character_id) {
            Some(buffer) if buffer.expires_at_ms > self.clock.now_ms() => {
                buffer.entries.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl InputBufferStore for SimInputBufferStore {
    async fn push(&self, fragment: &MemoryFragment) -> StorageResult<()> {
        if fragment.character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::BufferWriteFail) {
            return Err(StorageError::write("injected fault: buffer push failed"));
        }

        let now_ms = self.clock.now_ms();
        let mut buffers = self.buffers.write().unwrap();
        let buffer = buffers
            .entry(fragment.character_id.clone())
            .or_insert_with(|| Buffer {
                entries: VecDeque::new(),
                expires_at_ms: 0,
            });

        // An expired buffer starts over rather than resurrecting old entries.
        if buffer.expires_at_ms <= now_ms {
            buffer.entries.clear();
        }

        buffer.entries.push_back(fragment.clone());
        buffer.expires_at_ms = now_ms + self.ttl_ms;
        while buffer.entries.len() > self.max_entries {
            buffer.entries.pop_front();
        }

        // Postcondition
        assert!(
            buffer.entries.len() <= self.max_entries,
            "buffer must stay within capacity"
        );
        Ok(())
    }

    async fn get_all(&self, character_id: &str) -> StorageResult<Vec<MemoryFragment>> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        Ok(self.live_entries(character_id))
    }

    async fn get_recent(&self, character_id: &str, n: usize) -> StorageResult<Vec<MemoryFragment>> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }

        let entries = self.live_entries(character_id);
        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }

    async fn clear(&self, character_id: &str) -> StorageResult<()> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }

        let mut buffers = self.buffers.write().unwrap();
        buffers.remove(character_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
