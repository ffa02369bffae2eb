//! Context Store - Per-Character Context Snapshots
//!
//! `TigerStyle`: Trait-based abstraction, simulation-first testing.
//!
//! The context store owns one [`ContextSnapshot`] per character. Reads purge
//! expired fragments before returning, so a snapshot handed to a caller never
//! contains dead entries; concurrent readers may briefly observe a snapshot
//! mid-purge (eventual consistency is acceptable here).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dst::{FaultInjector, FaultType, SimClock};
use crate::storage::{ContextSnapshot, StorageError, StorageResult};

// =============================================================================
// Context Store Trait
// =============================================================================

/// Trait for the context-snapshot backend.
#[async_trait]
pub trait ContextStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a whole snapshot, replacing any prior version.
    async fn save(&self, snapshot: &ContextSnapshot) -> StorageResult<()>;

    /// Fetch a character's snapshot, purging expired fragments first.
    async fn get(&self, character_id: &str) -> StorageResult<Option<ContextSnapshot>>;

    /// Patch the snapshot: only fields supplied as `Some` are overwritten.
    ///
    /// # Errors
    /// `StorageError::NotFound` if the character has no snapshot.
    async fn update(
        &self,
        character_id: &str,
        summary: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> StorageResult<ContextSnapshot>;

    /// Delete a character's snapshot.
    async fn delete(&self, character_id: &str) -> StorageResult<()>;
}

// =============================================================================
// Simulated Context Store (for DST)
// =============================================================================

/// In-memory context store for deterministic simulation testing.
#[derive(Debug, Clone)]
pub struct SimContextStore {
    snapshots: Arc<RwLock<HashMap<String, ContextSnapshot>>>,
    clock: SimClock,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl SimContextStore {
    /// Create an empty sim context store.
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            clock,
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
}

#[async_trait]
impl ContextStore for SimContextStore {
    async fn save(&self, snapshot: &ContextSnapshot) -> StorageResult<()> {
        if snapshot.character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::ContextWriteFail) {
            return Err(StorageError::write("injected fault: context save failed"));
        }

        let mut snapshots = self.snapshots.write().unwrap();
        snapshots.insert(snapshot.character_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get(&self, character_id: &str) -> StorageResult<Option<ContextSnapshot>> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::ContextReadFail) {
            return Err(StorageError::read("injected fault: context get failed"));
        }

        let now = self.clock.now();
        let mut snapshots = self.snapshots.write().unwrap();
        let Some(snapshot) = snapshots.get_mut(character_id) else {
            return Ok(None);
        };

        // Purge-on-read; the purged version is what stays persisted.
        let removed = snapshot.purge_expired(now);
        if removed > 0 {
            tracing::debug!(character_id, removed, "purged expired context fragments");
        }
        Ok(Some(snapshot.clone()))
    }

    async fn update(
        &self,
        character_id: &str,
        summary: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> StorageResult<ContextSnapshot> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::ContextWriteFail) {
            return Err(StorageError::write("injected fault: context update failed"));
        }

        let mut snapshots = self.snapshots.write().unwrap();
        let Some(snapshot) = snapshots.get_mut(character_id) else {
            return Err(StorageError::not_found(character_id));
        };

        if let Some(summary) = summary {
            snapshot.summary = Some(summary);
        }
        if let Some(metadata) = metadata {
            snapshot.metadata = metadata;
        }
        snapshot.updated_at = self.clock.now();
        Ok(snapshot.clone())
    }

    async fn delete(&self, character_id: &str) -> StorageResult<()> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }

        let mut snapshots = self.snapshots.write().unwrap();
        snapshots.remove(character_id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTEXT_TTL_SECS;
    use crate::storage::{FragmentBuilder, MemoryLayer};

    fn snapshot_with_fragment(clock: &SimClock, content: &str) -> ContextSnapshot {
        let mut fragment = FragmentBuilder::new("char-1", content).build_at(clock.now());
        fragment.advance_to(MemoryLayer::Context, clock.now());
        let mut snapshot = ContextSnapshot::new("char-1", clock.now());
        snapshot.fragments.push(fragment);
        snapshot
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        let snapshot = snapshot_with_fragment(&clock, "remembered");

        store.save(&snapshot).await.unwrap();
        let back = store.get("char-1").await.unwrap().unwrap();
        assert_eq!(back.fragments.len(), 1);
        assert_eq!(back.fragments[0].content, "remembered");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_purges_expired_fragments() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        store
            .save(&snapshot_with_fragment(&clock, "fades away"))
            .await
            .unwrap();

        clock.advance_secs(CONTEXT_TTL_SECS + 1);
        let back = store.get("char-1").await.unwrap().unwrap();
        assert!(back.fragments.is_empty());

        // The purge is persisted, not just applied to the returned copy.
        let again = store.get("char-1").await.unwrap().unwrap();
        assert!(again.fragments.is_empty());
    }

    #[tokio::test]
    async fn test_update_patches_only_supplied_fields() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        let mut snapshot = snapshot_with_fragment(&clock, "stable");
        snapshot.summary = Some("old summary".to_string());
        store.save(&snapshot).await.unwrap();

        clock.advance_secs(1);
        let updated = store
            .update("char-1", Some("new summary".to_string()), None)
            .await
            .unwrap();

        assert_eq!(updated.summary.as_deref(), Some("new summary"));
        assert_eq!(updated.fragments.len(), 1);
        assert!(updated.metadata.is_empty());
        assert_eq!(updated.updated_at, clock.now());
    }

    #[tokio::test]
    async fn test_update_missing_character_not_found() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        let err = store
            .update("nobody", Some("s".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let clock = SimClock::new();
        let store = SimContextStore::new(clock.clone());
        store
            .save(&snapshot_with_fragment(&clock, "doomed"))
            .await
            .unwrap();

        store.delete("char-1").await.unwrap();
        assert!(store.get("char-1").await.unwrap().is_none());
    }
}
