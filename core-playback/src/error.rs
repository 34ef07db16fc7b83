//! # Playback Error Types
//!
//! Failures of the playback core, grouped by how the player reacts to them:
//!
//! - failover triggers (`UnsupportedSource`, `PlayerOutOfMemory`): the composite
//!   player retries with the next backend
//! - `RelaunchSource`: a backend swap is pending, prepare the same source again
//! - `NoReadPermission`: the external player re-resolves the source
//! - `Acceptable`: shown to the user, playback state is kept
//! - source classification errors: persisted as a [`CorruptionType`] against the
//!   composition, the queue advances past it
//!
//! The type is `Clone` because errors travel inside broadcast events.

use core_library::{CorruptionType, LibraryError};
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Backend Failover
    // ========================================================================
    /// The backend cannot decode the container or codec of the source.
    #[error("Unsupported audio source")]
    UnsupportedSource,

    /// The backend ran out of memory while decoding; treated like an unsupported source.
    #[error("Player ran out of memory")]
    PlayerOutOfMemory,

    /// The current backend failed at runtime and a swap is pending.
    #[error("Source relaunch required: {0}")]
    RelaunchSource(Box<PlaybackError>),

    // ========================================================================
    // Recoverable
    // ========================================================================
    /// The read grant for the source was revoked.
    #[error("No read permission: {0}")]
    NoReadPermission(String),

    /// Presented to the user without tearing down playback state.
    #[error("{0}")]
    Acceptable(Box<PlaybackError>),

    // ========================================================================
    // Source Classification
    // ========================================================================
    #[error("Local source not found: {0}")]
    LocalSourceNotFound(String),

    #[error("Remote source not found: {0}")]
    RemoteSourceNotFound(String),

    #[error("Source is too large")]
    TooLargeSource,

    #[error("Corrupted media file: {0}")]
    CorruptedFile(String),

    #[error("Timed out reading file")]
    FileReadTimeout,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unknown player error: {0}")]
    UnknownPlayer(String),

    // ========================================================================
    // Interactor State
    // ========================================================================
    #[error("No current queue item")]
    NoCurrentItem,

    #[error("No external file reference")]
    NoFileReference,

    /// Another file was opened before this one finished resolving.
    #[error("Source replaced by a newer one")]
    Superseded,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Library error: {0}")]
    Library(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if another backend may be able to play the source.
    pub fn is_unsupported_source(&self) -> bool {
        matches!(
            self,
            PlaybackError::UnsupportedSource | PlaybackError::PlayerOutOfMemory
        )
    }

    /// Returns `true` if the source should be prepared again.
    pub fn is_relaunch(&self) -> bool {
        matches!(self, PlaybackError::RelaunchSource(_))
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, PlaybackError::Acceptable(_))
    }

    /// Classification persisted against a composition that failed to play.
    pub fn corruption_type(&self) -> CorruptionType {
        match self {
            PlaybackError::UnsupportedSource | PlaybackError::PlayerOutOfMemory => {
                CorruptionType::Unsupported
            }
            PlaybackError::LocalSourceNotFound(_) => CorruptionType::NotFound,
            PlaybackError::RemoteSourceNotFound(_) => CorruptionType::SourceNotFound,
            PlaybackError::TooLargeSource => CorruptionType::TooLargeSource,
            PlaybackError::CorruptedFile(_) => CorruptionType::FileIsCorrupted,
            PlaybackError::FileReadTimeout => CorruptionType::FileReadTimeout,
            PlaybackError::RelaunchSource(cause) => cause.corruption_type(),
            _ => CorruptionType::Unknown,
        }
    }
}

impl From<LibraryError> for PlaybackError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::PermissionDenied(message) => PlaybackError::NoReadPermission(message),
            LibraryError::Timeout(_) => PlaybackError::FileReadTimeout,
            LibraryError::NotFound { entity_type, id } => {
                PlaybackError::LocalSourceNotFound(format!("{entity_type} {id}"))
            }
            other => PlaybackError::Library(other.to_string()),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
