//! Domain models shared between the library, the play queue and the player.

use bridge_traits::playback::CompositionContentSource;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Library composition identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionId(pub i64);

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Play queue entry identifier; distinct from the composition it plays, since
/// one composition may be queued several times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(pub i64);

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Compositions
// =============================================================================

/// Persisted reason why a composition could not be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionType {
    Unsupported,
    /// Local file is gone.
    NotFound,
    /// Remote copy is gone.
    SourceNotFound,
    TooLargeSource,
    FileIsCorrupted,
    FileReadTimeout,
    Unknown,
}

/// Library composition as seen by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub id: CompositionId,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Duration in milliseconds, 0 when unknown
    pub duration_ms: u64,
    /// File size in bytes
    pub size: u64,
    pub source: CompositionContentSource,
    /// Last modification of the underlying file (unix millis)
    pub date_modified: i64,
    pub corruption_type: Option<CorruptionType>,
}

impl Composition {
    pub fn new(id: i64, title: impl Into<String>, source: CompositionContentSource) -> Self {
        Self {
            id: CompositionId(id),
            title: title.into(),
            artist: None,
            album: None,
            duration_ms: 0,
            size: 0,
            source,
            date_modified: 0,
            corruption_type: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_corruption(mut self, corruption_type: Option<CorruptionType>) -> Self {
        self.corruption_type = corruption_type;
        self
    }

    /// Whether the file behind this composition differs from `other`'s.
    pub fn has_file_changes(&self, other: &Composition) -> bool {
        self.source != other.source
            || self.size != other.size
            || self.date_modified != other.date_modified
    }
}

/// Result of deleting a composition from the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedComposition {
    pub id: CompositionId,
    pub title: String,
    pub source: CompositionContentSource,
}

impl From<&Composition> for DeletedComposition {
    fn from(composition: &Composition) -> Self {
        Self {
            id: composition.id,
            title: composition.title.clone(),
            source: composition.source.clone(),
        }
    }
}

// =============================================================================
// Play Queue
// =============================================================================

/// Entry of the play queue.
///
/// Equality compares every field; use [`is_same_item`](Self::is_same_item)
/// to ask whether two snapshots describe the same queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayQueueItem {
    pub item_id: QueueItemId,
    pub composition: Composition,
}

impl PlayQueueItem {
    pub fn new(item_id: i64, composition: Composition) -> Self {
        Self {
            item_id: QueueItemId(item_id),
            composition,
        }
    }

    pub fn is_same_item(&self, other: &PlayQueueItem) -> bool {
        self.item_id == other.item_id
    }

    /// The playable file changed (moved, replaced, re-encoded).
    pub fn has_source_changes(&self, previous: &PlayQueueItem) -> bool {
        self.composition.has_file_changes(&previous.composition)
    }

    /// Every composition field is unchanged.
    pub fn is_same_source(&self, previous: &PlayQueueItem) -> bool {
        self.composition == previous.composition
    }
}

/// Emission of the current-queue-item stream; `item` is `None` for an empty queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayQueueEvent {
    pub item: Option<PlayQueueItem>,
}

impl PlayQueueEvent {
    pub fn new(item: Option<PlayQueueItem>) -> Self {
        Self { item }
    }
}

/// Current queue item combined with the library player's playing flag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurrentComposition {
    pub item: Option<PlayQueueItem>,
    pub is_playing: bool,
}

// =============================================================================
// External Files
// =============================================================================

/// A file handed to the app from outside the library ("open with").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalFileReference {
    pub source: CompositionContentSource,
}

impl ExternalFileReference {
    pub fn new(source: CompositionContentSource) -> Self {
        Self { source }
    }
}

/// Resolved external file: where to play it from plus whatever metadata could
/// be read in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCompositionSource {
    pub source: CompositionContentSource,
    pub display_name: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub size: u64,
}

impl ExternalCompositionSource {
    pub fn new(source: CompositionContentSource, display_name: impl Into<String>) -> Self {
        Self {
            source,
            display_name: display_name.into(),
            title: None,
            artist: None,
            album: None,
            duration_ms: 0,
            size: 0,
        }
    }
}
