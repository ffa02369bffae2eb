//! Memory Fragments - The Unit of Remembered Content
//!
//! `TigerStyle`: Explicit lifecycle, forward-only layer transitions.
//!
//! A fragment is born in the input buffer, promotes forward through the tiers
//! as it accumulates accesses, and carries a TTL only while it lives in a
//! volatile layer (input buffer, context).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{
    CHARACTER_ID_BYTES_MAX, CONTEXT_TTL_SECS, FRAGMENT_CONTENT_BYTES_MAX, INPUT_BUFFER_TTL_SECS,
};

// =============================================================================
// Memory Layer
// =============================================================================

/// One stage in the memory lifecycle.
///
/// Fragments only ever move forward: `input_buffer → context → working`.
/// The `day` and `summary` layers hold consolidated content written through
/// the durable storage path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    /// Short-lived sensory buffer (TTL 10s)
    InputBuffer,
    /// Per-character context window (TTL 1h)
    Context,
    /// Durable, vector-indexed storage
    Working,
    /// Daily consolidation layer
    Day,
    /// Long-horizon summaries
    Summary,
}

impl MemoryLayer {
    /// TTL for fragments resident in this layer, if the layer is volatile.
    #[must_use]
    pub fn ttl_secs(&self) -> Option<u64> {
        match self {
            Self::InputBuffer => Some(INPUT_BUFFER_TTL_SECS),
            Self::Context => Some(CONTEXT_TTL_SECS),
            Self::Working | Self::Day | Self::Summary => None,
        }
    }

    /// Whether fragments in this layer expire.
    #[must_use]
    pub fn is_volatile(&self) -> bool {
        self.ttl_secs().is_some()
    }

    /// Ordering rank used to enforce forward-only transitions.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::InputBuffer => 0,
            Self::Context => 1,
            Self::Working => 2,
            Self::Day => 3,
            Self::Summary => 4,
        }
    }

    /// Layer name as stored in payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputBuffer => "input_buffer",
            Self::Context => "context",
            Self::Working => "working",
            Self::Day => "day",
            Self::Summary => "summary",
        }
    }
}

// =============================================================================
// Memory Fragment
// =============================================================================

/// A stored unit of memory content at a given layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    /// Opaque fragment identifier
    pub id: String,
    /// Owning character
    pub character_id: String,
    /// Current memory layer
    pub layer: MemoryLayer,
    /// Remembered text
    pub content: String,
    /// Open key/value metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Number of times this fragment has been accessed while resident
    pub access_count: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Most recent access, if ever accessed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access: Option<DateTime<Utc>>,
    /// Expiry timestamp; present iff the layer is volatile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryFragment {
    /// Whether the fragment's TTL has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Record one access: bump the count and stamp the access time.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_access = Some(now);

        // Postcondition
        assert!(self.access_count > 0, "access count must be positive");
    }

    /// Move the fragment forward to the given layer, recomputing its TTL.
    ///
    /// # Panics
    /// Panics if the target layer is not strictly ahead of the current one;
    /// layers never move backward.
    pub fn advance_to(&mut self, layer: MemoryLayer, now: DateTime<Utc>) {
        // Precondition: forward-only
        assert!(
            layer.rank() > self.layer.rank(),
            "layer must move forward: {} -> {}",
            self.layer.as_str(),
            layer.as_str()
        );

        self.layer = layer;
        self.expires_at = layer
            .ttl_secs()
            .map(|secs| now + Duration::seconds(secs as i64));

        // Postcondition: TTL invariant
        assert_eq!(
            self.expires_at.is_some(),
            layer.is_volatile(),
            "expires_at must be set iff layer is volatile"
        );
    }
}

// =============================================================================
// Fragment Builder
// =============================================================================

/// Builder for [`MemoryFragment`].
///
/// `build_at` takes the clock reading explicitly so construction is
/// deterministic under simulation.
#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    character_id: String,
    content: String,
    layer: MemoryLayer,
    metadata: Map<String, Value>,
    id: Option<String>,
}

impl FragmentBuilder {
    /// Start building a fragment for the given character.
    ///
    /// # Panics
    /// Panics if the character id or content exceed size limits or are empty.
    #[must_use]
    pub fn new(character_id: impl Into<String>, content: impl Into<String>) -> Self {
        let character_id = character_id.into();
        let content = content.into();

        // Preconditions
        assert!(!character_id.is_empty(), "character_id must not be empty");
        assert!(
            character_id.len() <= CHARACTER_ID_BYTES_MAX,
            "character_id exceeds {} bytes",
            CHARACTER_ID_BYTES_MAX
        );
        assert!(!content.is_empty(), "content must not be empty");
        assert!(
            content.len() <= FRAGMENT_CONTENT_BYTES_MAX,
            "content exceeds {} bytes",
            FRAGMENT_CONTENT_BYTES_MAX
        );

        Self {
            character_id,
            content,
            layer: MemoryLayer::InputBuffer,
            metadata: Map::new(),
            id: None,
        }
    }

    /// Set the initial layer (default: `input_buffer`).
    #[must_use]
    pub fn layer(mut self, layer: MemoryLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the generated id. Used for idempotent re-stores.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Build the fragment with `now` as its creation instant.
    #[must_use]
    pub fn build_at(self, now: DateTime<Utc>) -> MemoryFragment {
        let expires_at = self
            .layer
            .ttl_secs()
            .map(|secs| now + Duration::seconds(secs as i64));

        let fragment = MemoryFragment {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            character_id: self.character_id,
            layer: self.layer,
            content: self.content,
            metadata: self.metadata,
            access_count: 0,
            created_at: now,
            last_access: None,
            expires_at,
        };

        // Postcondition: TTL invariant
        assert_eq!(
            fragment.expires_at.is_some(),
            fragment.layer.is_volatile(),
            "expires_at must be set iff layer is volatile"
        );
        fragment
    }
}

// =============================================================================
// Context Snapshot
// =============================================================================

/// Per-character snapshot of the `context` layer.
///
/// Never contains expired fragments after a store read; the context store
/// purges on access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Owning character
    pub character_id: String,
    /// Fragments currently in the context layer, in promotion order
    pub fragments: Vec<MemoryFragment>,
    /// Optional free-text summary of the context window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Open key/value metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Create an empty snapshot for a character.
    #[must_use]
    pub fn new(character_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let character_id = character_id.into();
        assert!(!character_id.is_empty(), "character_id must not be empty");

        Self {
            character_id,
            fragments: Vec::new(),
            summary: None,
            metadata: Map::new(),
            updated_at: now,
        }
    }

    /// Drop expired fragments in place; returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.fragments.len();
        self.fragments.retain(|f| !f.is_expired(now));
        before - self.fragments.len()
    }
}

// =============================================================================
// Access Info
// =============================================================================

/// Durable access statistics for a (character, fragment) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    /// Owning character
    pub character_id: String,
    /// Fragment this record tracks
    pub fragment_id: String,
    /// Total recorded accesses; never decremented
    pub access_count: u64,
    /// First time the fragment was persisted or accessed
    pub first_accessed_at: DateTime<Utc>,
    /// Most recent access
    pub last_accessed_at: DateTime<Utc>,
}

impl AccessInfo {
    /// Fresh record for a newly persisted fragment (count starts at zero).
    #[must_use]
    pub fn new(
        character_id: impl Into<String>,
        fragment_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            fragment_id: fragment_id.into(),
            access_count: 0,
            first_accessed_at: now,
            last_accessed_at: now,
        }
    }

    /// Record one access.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }
}

// =============================================================================
// Tests
// =============================================================================
