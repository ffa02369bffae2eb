//! Tier Manager - Layered Memory Promotion
//!
//! `TigerStyle`: Explicit thresholds, forward-only layer movement.
//!
//! # Memory tiers
//!
//! ```text
//! input_buffer (10s TTL)  --access >= 2-->  context (1h TTL)  --access >= 5-->  working (durable)
//! ```
//!
//! The tier manager owns the two volatile layers. New observations land in the
//! per-character input buffer; a periodic sweep touches every live entry (the
//! sweep is itself an access event) and promotes those past the context
//! threshold into the context snapshot, and a second check lifts hot context
//! fragments out toward durable storage. Promotion out of context only
//! relabels the fragment; the caller persists it through the retrieval
//! engine (or the embedding task queue) once vectors exist.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::constants::{
    PROMOTION_CONTEXT_ACCESS_COUNT_THRESHOLD, PROMOTION_WORKING_ACCESS_COUNT_THRESHOLD,
};
use crate::dst::SimClock;
use crate::storage::{
    AccessStore, ContextSnapshot, ContextStore, FragmentBuilder, InputBufferStore, MemoryFragment,
    MemoryLayer, StorageError,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from tier operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TierError {
    /// Input failed validation
    #[error("validation error: {message}")]
    Validation {
        /// What was invalid
        message: String,
    },

    /// Context snapshot (or other resource) not found
    #[error("not found: {id}")]
    NotFound {
        /// Identifier that was not found
        id: String,
    },

    /// A downstream store call failed
    #[error("storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },
}

impl From<StorageError> for TierError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => TierError::NotFound { id },
            StorageError::Validation { message } => TierError::Validation { message },
            other => TierError::Storage {
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Sweep Report
// =============================================================================

/// Outcome of one input-buffer sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Buffer entries examined
    pub processed: usize,
    /// Entries promoted into the context layer
    pub promoted: usize,
    /// Entries dropped because their TTL had elapsed
    pub expired: usize,
}

// =============================================================================
// Tier Manager
// =============================================================================

/// Manages the volatile memory tiers for all characters.
#[derive(Debug)]
pub struct TierManager<B: InputBufferStore, C: ContextStore, A: AccessStore> {
    buffer: Arc<B>,
    context: Arc<C>,
    access: Arc<A>,
    clock: SimClock,
    context_threshold: u64,
    working_threshold: u64,
}

impl<B: InputBufferStore, C: ContextStore, A: AccessStore> TierManager<B, C, A> {
    /// Create a tier manager with the default promotion thresholds.
    #[must_use]
    pub fn new(buffer: Arc<B>, context: Arc<C>, access: Arc<A>, clock: SimClock) -> Self {
        Self::with_thresholds(
            buffer,
            context,
            access,
            clock,
            PROMOTION_CONTEXT_ACCESS_COUNT_THRESHOLD,
            PROMOTION_WORKING_ACCESS_COUNT_THRESHOLD,
        )
    }

    /// Create a tier manager with explicit thresholds.
    ///
    /// # Panics
    /// Panics unless `0 < context_threshold < working_threshold`.
    #[must_use]
    pub fn with_thresholds(
        buffer: Arc<B>,
        context: Arc<C>,
        access: Arc<A>,
        clock: SimClock,
        context_threshold: u64,
        working_threshold: u64,
    ) -> Self {
        // Preconditions
        assert!(context_threshold > 0, "context threshold must be positive");
        assert!(
            working_threshold > context_threshold,
            "working threshold must exceed context threshold"
        );

        Self {
            buffer,
            context,
            access,
            clock,
            context_threshold,
            working_threshold,
        }
    }

    /// Record a new observation into the character's input buffer.
    ///
    /// The fragment starts at access count zero; it only survives the buffer
    /// TTL if something reads it often enough to cross the context threshold.
    ///
    /// # Errors
    /// Returns `TierError` on invalid input or buffer/access-store failure.
    #[tracing::instrument(skip(self, content, metadata), fields(character_id))]
    pub async fn add_to_input_buffer(
        &self,
        character_id: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<MemoryFragment, TierError> {
        if character_id.is_empty() {
            return Err(TierError::Validation {
                message: "character_id must not be empty".to_string(),
            });
        }
        if content.is_empty() {
            return Err(TierError::Validation {
                message: "content must not be empty".to_string(),
            });
        }

        let now = self.clock.now();
        let fragment = FragmentBuilder::new(character_id, content)
            .layer(MemoryLayer::InputBuffer)
            .metadata(metadata)
            .build_at(now);

        self.buffer.push(&fragment).await?;
        self.access
            .init_access_info(character_id, &fragment.id, now)
            .await?;

        tracing::debug!(fragment_id = %fragment.id, "buffered observation");
        Ok(fragment)
    }

    /// Record that a buffered or contextual fragment was used, returning the
    /// updated access count.
    ///
    /// # Errors
    /// Returns `TierError` on access-store failure.
    pub async fn record_access(
        &self,
        character_id: &str,
        fragment_id: &str,
    ) -> Result<u64, TierError> {
        let now = self.clock.now();
        self.access
            .increment_access(character_id, fragment_id, now)
            .await?;
        let info = self
            .access
            .get_access_info(character_id, fragment_id)
            .await?;
        Ok(info.map_or(0, |i| i.access_count))
    }

    /// Sweep the character's input buffer: drop expired entries, then touch
    /// every live entry (the sweep itself counts as one access event) and
    /// promote those whose new count reached the context threshold.
    ///
    /// Promoted fragments land in the context snapshot (created on first
    /// promotion). A fragment already present in the snapshot is not
    /// duplicated. The buffer is rewritten only when the sweep changed it.
    ///
    /// # Errors
    /// Returns `TierError` on any store failure; the sweep is not atomic
    /// across stores (a failure after the context save can leave the promoted
    /// fragment in both layers until the next sweep).
    #[tracing::instrument(skip(self), fields(character_id))]
    pub async fn process_input_buffer(
        &self,
        character_id: &str,
    ) -> Result<SweepReport, TierError> {
        if character_id.is_empty() {
            return Err(TierError::Validation {
                message: "character_id must not be empty".to_string(),
            });
        }

        let entries = self.buffer.get_all(character_id).await?;
        if entries.is_empty() {
            return Ok(SweepReport::default());
        }

        let now = self.clock.now();
        let processed = entries.len();
        let mut expired = 0_usize;
        let mut live: Vec<MemoryFragment> = Vec::new();

        for fragment in entries {
            if fragment.is_expired(now) {
                expired += 1;
                continue;
            }
            self.access
                .increment_access(character_id, &fragment.id, now)
                .await?;
            live.push(fragment);
        }

        let ids: Vec<String> = live.iter().map(|f| f.id.clone()).collect();
        let counts = self.access.get_batch_access_info(character_id, &ids).await?;

        let mut promoted: Vec<MemoryFragment> = Vec::new();
        let mut survivors: Vec<MemoryFragment> = Vec::new();

        for mut fragment in live {
            let info = counts.get(&fragment.id);
            let count = info.map_or(0, |i| i.access_count);
            // Carry the durable stats onto the in-memory copy.
            fragment.access_count = count;
            fragment.last_access = info.map(|i| i.last_accessed_at);
            if count >= self.context_threshold {
                fragment.advance_to(MemoryLayer::Context, now);
                promoted.push(fragment);
            } else {
                survivors.push(fragment);
            }
        }

        if !promoted.is_empty() {
            let mut snapshot = match self.context.get(character_id).await? {
                Some(snapshot) => snapshot,
                None => ContextSnapshot::new(character_id, now),
            };
            for fragment in promoted.drain(..) {
                if snapshot.fragments.iter().any(|f| f.id == fragment.id) {
                    continue;
                }
                snapshot.fragments.push(fragment);
            }
            snapshot.updated_at = now;
            self.context.save(&snapshot).await?;
        }

        let promoted_count = processed - expired - survivors.len();
        if promoted_count > 0 || expired > 0 {
            // Rewrite the buffer without the promoted and expired entries.
            self.buffer.clear(character_id).await?;
            for fragment in &survivors {
                self.buffer.push(fragment).await?;
            }
        }

        let report = SweepReport {
            processed,
            promoted: promoted_count,
            expired,
        };
        tracing::debug!(?report, "input buffer sweep");

        // Postcondition
        assert!(
            report.promoted + report.expired <= report.processed,
            "sweep buckets must not exceed processed entries"
        );
        Ok(report)
    }

    /// Lift context fragments whose access count reached the working threshold
    /// out of the snapshot, relabeled as `working`.
    ///
    /// Returns the promoted fragments; the caller is responsible for durable
    /// persistence (they have no vectors yet). An empty or missing snapshot
    /// yields an empty result.
    ///
    /// # Errors
    /// Returns `TierError` on store failure.
    #[tracing::instrument(skip(self), fields(character_id))]
    pub async fn promote_from_context(
        &self,
        character_id: &str,
    ) -> Result<Vec<MemoryFragment>, TierError> {
        if character_id.is_empty() {
            return Err(TierError::Validation {
                message: "character_id must not be empty".to_string(),
            });
        }

        let Some(mut snapshot) = self.context.get(character_id).await? else {
            return Ok(Vec::new());
        };
        if snapshot.fragments.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = snapshot.fragments.iter().map(|f| f.id.clone()).collect();
        let counts = self.access.get_batch_access_info(character_id, &ids).await?;
        let now = self.clock.now();

        let mut promoted = Vec::new();
        let mut remaining = Vec::new();
        for mut fragment in snapshot.fragments {
            let info = counts.get(&fragment.id);
            let count = info.map_or(0, |i| i.access_count);
            if count >= self.working_threshold {
                fragment.access_count = count;
                fragment.last_access = info.map(|i| i.last_accessed_at);
                fragment.advance_to(MemoryLayer::Working, now);
                promoted.push(fragment);
            } else {
                remaining.push(fragment);
            }
        }

        if !promoted.is_empty() {
            snapshot.fragments = remaining;
            snapshot.updated_at = now;
            self.context.save(&snapshot).await?;
            tracing::debug!(count = promoted.len(), "promoted context fragments");
        } else {
            snapshot.fragments = remaining;
        }

        // Postcondition: promoted fragments are durable-layer, no TTL
        assert!(
            promoted
                .iter()
                .all(|f| f.layer == MemoryLayer::Working && f.expires_at.is_none()),
            "promoted fragments must be durable"
        );
        Ok(promoted)
    }

    /// Apply the promotion rule to a single fragment.
    ///
    /// An `input_buffer` fragment whose access count reached the context
    /// threshold moves into the context snapshot; a `context` fragment whose
    /// count reached the working threshold is removed from the snapshot and
    /// relabeled `working` (durable persistence stays with the caller, the
    /// fragment has no vectors yet). Below threshold, or for any other layer,
    /// the fragment comes back unchanged.
    ///
    /// # Errors
    /// Returns `TierError` on access-store or context-store failure.
    #[tracing::instrument(skip(self, fragment), fields(fragment_id = %fragment.id))]
    pub async fn promote_if_eligible(
        &self,
        mut fragment: MemoryFragment,
    ) -> Result<MemoryFragment, TierError> {
        let info = self
            .access
            .get_access_info(&fragment.character_id, &fragment.id)
            .await?;
        let count = info.as_ref().map_or(0, |i| i.access_count);
        let now = self.clock.now();

        match fragment.layer {
            MemoryLayer::InputBuffer if count >= self.context_threshold => {
                fragment.access_count = count;
                fragment.last_access = info.map(|i| i.last_accessed_at);
                fragment.advance_to(MemoryLayer::Context, now);

                let mut snapshot = match self.context.get(&fragment.character_id).await? {
                    Some(snapshot) => snapshot,
                    None => ContextSnapshot::new(&fragment.character_id, now),
                };
                if !snapshot.fragments.iter().any(|f| f.id == fragment.id) {
                    snapshot.fragments.push(fragment.clone());
                }
                snapshot.updated_at = now;
                self.context.save(&snapshot).await?;
                tracing::debug!("promoted fragment into context");
            }
            MemoryLayer::Context if count >= self.working_threshold => {
                fragment.access_count = count;
                fragment.last_access = info.map(|i| i.last_accessed_at);
                fragment.advance_to(MemoryLayer::Working, now);

                if let Some(mut snapshot) = self.context.get(&fragment.character_id).await? {
                    let before = snapshot.fragments.len();
                    snapshot.fragments.retain(|f| f.id != fragment.id);
                    if snapshot.fragments.len() != before {
                        snapshot.updated_at = now;
                        self.context.save(&snapshot).await?;
                    }
                }
                tracing::debug!("promoted fragment toward working storage");
            }
            _ => {}
        }

        Ok(fragment)
    }

    /// Fetch the character's context snapshot (expired fragments purged).
    ///
    /// # Errors
    /// Returns `TierError::NotFound` if the character has no snapshot.
    pub async fn get_context(&self, character_id: &str) -> Result<ContextSnapshot, TierError> {
        self.context
            .get(character_id)
            .await?
            .ok_or_else(|| TierError::NotFound {
                id: character_id.to_string(),
            })
    }

    /// Patch the summary and/or metadata of an existing snapshot.
    ///
    /// # Errors
    /// Returns `TierError::NotFound` if the character has no snapshot.
    pub async fn update_context(
        &self,
        character_id: &str,
        summary: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<(), TierError> {
        self.context.update(character_id, summary, metadata).await?;
        Ok(())
    }

    /// Remove the character's context snapshot entirely.
    ///
    /// # Errors
    /// Returns `TierError` on store failure. Deleting a missing snapshot is
    /// a no-op.
    pub async fn delete_context(&self, character_id: &str) -> Result<(), TierError> {
        self.context.delete(character_id).await?;
        Ok(())
    }

    /// The `n` most recent input-buffer entries, oldest first.
    ///
    /// # Errors
    /// Returns `TierError` on store failure.
    pub async fn recent_buffer(
        &self,
        character_id: &str,
        n: usize,
    ) -> Result<Vec<MemoryFragment>, TierError> {
        Ok(self.buffer.get_recent(character_id, n).await?)
    }

    /// Drop every entry in the character's input buffer.
    ///
    /// # Errors
    /// Returns `TierError` on store failure.
    pub async fn clear_input_buffer(&self, character_id: &str) -> Result<(), TierError> {
        self.buffer.clear(character_id).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
