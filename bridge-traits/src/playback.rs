//! Playback bridge: native decoder sessions.
//!
//! A [`PlatformDecoder`] is one session of a host audio decoder, the object a
//! playback backend in `core-playback` owns and drives. Hosts usually offer
//! several decoder implementations with different format coverage (platform
//! media player, a bundled software decoder); the core tries them in order.
//!
//! The trait is deliberately synchronous. Native decoders are blocking APIs with
//! callback-based completion; `core-playback` moves the blocking calls onto the
//! Tokio blocking pool and serializes access with a lock.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// What to play: a resolved location of audio content.
///
/// Two sources are the same source when they point at the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositionContentSource {
    /// File on a local file system.
    LocalFile { path: PathBuf },
    /// Content-provider URI (`content://...`) whose read grant may be revoked.
    ContentUri { uri: String },
    /// Remote HTTP(S) stream.
    RemoteStream { url: String },
}

impl CompositionContentSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    pub fn content_uri(uri: impl Into<String>) -> Self {
        Self::ContentUri { uri: uri.into() }
    }

    /// `true` when reading the source depends on a revocable permission grant.
    pub fn requires_read_grant(&self) -> bool {
        matches!(self, Self::ContentUri { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteStream { .. })
    }

    /// Short label for logs: the last path segment only.
    pub fn log_name(&self) -> String {
        let raw = match self {
            Self::LocalFile { path } => path.to_string_lossy().into_owned(),
            Self::ContentUri { uri } => uri.clone(),
            Self::RemoteStream { url } => url.clone(),
        };
        raw.rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Failure reported by a native decoder session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// The decoder does not support the container or codec.
    #[error("Unsupported media format")]
    Unsupported,

    /// The stream was recognized but its bitstream is malformed.
    #[error("Malformed media stream")]
    Malformed,

    #[error("Decoder ran out of memory")]
    OutOfMemory,

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Call issued in a state the native decoder rejects.
    #[error("Illegal decoder state: {0}")]
    IllegalState(String),

    /// Raw platform error codes that have no dedicated mapping.
    #[error("Platform decoder error (what: {what}, extra: {extra})")]
    Platform { what: i32, extra: i32 },
}

/// Asynchronous notification from a decoder session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// Playback reached the end of the stream.
    Completed,
    /// The session failed while playing.
    Failed(DecoderError),
}

/// Callback receiving decoder notifications; may be invoked on any thread.
pub type DecoderEventListener = Arc<dyn Fn(DecoderEvent) + Send + Sync>;

/// One native decoder session.
///
/// Positions and durations are milliseconds. After [`release`](Self::release)
/// the session must not be used again.
pub trait PlatformDecoder: Send + 'static {
    /// Install the listener for completion and runtime failures.
    fn set_event_listener(&mut self, listener: DecoderEventListener);

    /// Reset the session, attach `source`, and block until it is ready to play.
    fn open(&mut self, source: &CompositionContentSource) -> Result<(), DecoderError>;

    fn start(&mut self) -> Result<(), DecoderError>;

    fn pause(&mut self) -> Result<(), DecoderError>;

    fn is_playing(&self) -> bool;

    fn seek_to(&mut self, position_ms: u64) -> Result<(), DecoderError>;

    fn position_ms(&self) -> Result<u64, DecoderError>;

    fn duration_ms(&self) -> Result<u64, DecoderError>;

    /// Set per-channel output gain, each in `0.0..=1.0`.
    fn set_volume(&mut self, left: f32, right: f32) -> Result<(), DecoderError>;

    fn set_speed(&mut self, speed: f32) -> Result<(), DecoderError>;

    /// Whether [`set_speed`](Self::set_speed) has any effect on this platform.
    fn supports_speed_change(&self) -> bool {
        true
    }

    /// Whether the host still holds read access to `source`.
    fn has_read_permission(&self, _source: &CompositionContentSource) -> bool {
        true
    }

    fn release(&mut self);
}
