//! Access Store - Durable Access Statistics (KV-Backed)
//!
//! `TigerStyle`: Trait-based abstraction, simulation-first testing.
//!
//! Tracks per-(character, fragment) access counts and timestamps. The
//! retrieval engine reads these in batch during rescoring and increments
//! them fire-and-forget after every read.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dst::{FaultInjector, FaultType};
use crate::storage::{AccessInfo, StorageError, StorageResult};

// =============================================================================
// Access Store Trait
// =============================================================================

/// Trait for access-statistics backends.
#[async_trait]
pub trait AccessStore: Send + Sync + std::fmt::Debug + 'static {
    /// Increment the access count for a fragment, stamping `now` as the last
    /// access. Creates the record if it does not exist yet.
    async fn increment_access(
        &self,
        character_id: &str,
        fragment_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Fetch the access record for one fragment.
    async fn get_access_info(
        &self,
        character_id: &str,
        fragment_id: &str,
    ) -> StorageResult<Option<AccessInfo>>;

    /// Fetch access records for many fragments in one call.
    ///
    /// Missing fragments are simply absent from the returned map.
    async fn get_batch_access_info(
        &self,
        character_id: &str,
        fragment_ids: &[String],
    ) -> StorageResult<HashMap<String, AccessInfo>>;

    /// Initialize a fresh record (count zero, first/last access = `now`).
    ///
    /// Not idempotent: calling this again for the same fragment resets its
    /// counters. The retrieval engine only calls it on first persistence.
    async fn init_access_info(
        &self,
        character_id: &str,
        fragment_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;
}

// =============================================================================
// Simulated Access Store (for DST)
// =============================================================================

/// In-memory access store for deterministic simulation testing.
#[derive(Debug, Clone, Default)]
pub struct SimAccessStore {
    /// (character_id, fragment_id) -> record
    records: Arc<RwLock<HashMap<(String, String), AccessInfo>>>,
    fault_injector: Option<Arc<FaultInjector>>,
}

impl SimAccessStore {
    /// Create an empty sim access store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with fault injection enabled.
    #[must_use]
    pub fn with_faults(fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            fault_injector: Some(fault_injector),
        }
    }

    fn should_inject(&self, fault: FaultType) -> bool {
        self.fault_injector
            .as_ref()
            .is_some_and(|injector| injector.should_inject(fault))
    }

    fn validate_ids(character_id: &str, fragment_id: &str) -> StorageResult<()> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if fragment_id.is_empty() {
            return Err(StorageError::validation("fragment_id must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for SimAccessStore {
    async fn increment_access(
        &self,
        character_id: &str,
        fragment_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        Self::validate_ids(character_id, fragment_id)?;
        if self.should_inject(FaultType::AccessWriteFail) {
            return Err(StorageError::write("injected fault: increment failed"));
        }

        let mut records = self.records.write().unwrap();
        let key = (character_id.to_string(), fragment_id.to_string());
        records
            .entry(key)
            .or_insert_with(|| AccessInfo::new(character_id, fragment_id, now))
            .record(now);
        Ok(())
    }

    async fn get_access_info(
        &self,
        character_id: &str,
        fragment_id: &str,
    ) -> StorageResult<Option<AccessInfo>> {
        Self::validate_ids(character_id, fragment_id)?;
        if self.should_inject(FaultType::AccessReadFail) {
            return Err(StorageError::read("injected fault: access read failed"));
        }

        let records = self.records.read().unwrap();
        Ok(records
            .get(&(character_id.to_string(), fragment_id.to_string()))
            .cloned())
    }

    async fn get_batch_access_info(
        &self,
        character_id: &str,
        fragment_ids: &[String],
    ) -> StorageResult<HashMap<String, AccessInfo>> {
        if character_id.is_empty() {
            return Err(StorageError::validation("character_id must not be empty"));
        }
        if self.should_inject(FaultType::AccessReadFail) {
            return Err(StorageError::read("injected fault: batch read failed"));
        }

        let records = self.records.read().unwrap();
        let mut out = HashMap::new();
        for fragment_id in fragment_ids {
            let key = (character_id.to_string(), fragment_id.clone());
            if let Some(info) = records.get(&key) {
                out.insert(fragment_id.clone(), info.clone());
            }
        }

        // Postcondition
        assert!(out.len() <= fragment_ids.len(), "batch result bounded by input");
        Ok(out)
    }

    async fn init_access_info(
        &self,
        character_id: &str,
        fragment_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        Self::validate_ids(character_id, fragment_id)?;
        if self.should_inject(FaultType::AccessWriteFail) {
            return Err(StorageError::write("injected fault: init failed"));
        }

        let mut records = self.records.write().unwrap();
        records.insert(
            (character_id.to_string(), fragment_id.to_string()),
            AccessInfo::new(character_id, fragment_id, now),
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
