//! Playback-side value types shared by the players, the coordinator and the
//! interactors.

use crate::error::PlaybackError;
use bridge_traits::playback::CompositionContentSource;
use core_library::{ExternalCompositionSource, PlayQueueItem};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback context owning the shared audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerType {
    /// Play queue playback.
    Library,
    /// One-off playback of a file opened from outside the library.
    External,
}

impl PlayerType {
    pub const ALL: [PlayerType; 2] = [PlayerType::Library, PlayerType::External];

    pub(crate) fn index(self) -> usize {
        match self {
            PlayerType::Library => 0,
            PlayerType::External => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerType::Library => "library",
            PlayerType::External => "external",
        }
    }
}

impl fmt::Display for PlayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one playback context.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    /// Play was requested and the source is still being prepared.
    Loading,
    Play,
    Pause,
    Stop,
    /// Surfaced through [`PlayerCoordinator::error`](crate::PlayerCoordinator::error).
    Error(PlaybackError),
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Play)
    }
}

/// Lifecycle notification emitted by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPlayerEvent {
    Prepared,
    Finished,
    Error(PlaybackError),
}

/// What a playback context is playing.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionSource {
    Library(PlayQueueItem),
    External(ExternalCompositionSource),
}

impl CompositionSource {
    pub fn content_source(&self) -> &CompositionContentSource {
        match self {
            CompositionSource::Library(item) => &item.composition.source,
            CompositionSource::External(source) => &source.source,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            CompositionSource::Library(item) => item.composition.duration_ms,
            CompositionSource::External(source) => source.duration_ms,
        }
    }

    pub fn as_library_item(&self) -> Option<&PlayQueueItem> {
        match self {
            CompositionSource::Library(item) => Some(item),
            CompositionSource::External(_) => None,
        }
    }
}

/// Backend event attributed to the source of the context it happened in.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Prepared {
        source: CompositionSource,
    },
    Finished {
        source: CompositionSource,
    },
    Error {
        source: CompositionSource,
        error: PlaybackError,
    },
}

impl PlayerEvent {
    pub fn source(&self) -> &CompositionSource {
        match self {
            PlayerEvent::Prepared { source }
            | PlayerEvent::Finished { source }
            | PlayerEvent::Error { source, .. } => source,
        }
    }
}

/// Per-channel gain multiplier, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundBalance {
    pub left: f32,
    pub right: f32,
}

impl SoundBalance {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

impl Default for SoundBalance {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl From<(f32, f32)> for SoundBalance {
    fn from((left, right): (f32, f32)) -> Self {
        Self::new(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::Composition;

    #[test]
    fn test_source_accessors() {
        let composition = Composition::new(7, "Song", CompositionContentSource::local("/m/a.mp3"))
            .with_duration(180_000);
        let source = CompositionSource::Library(PlayQueueItem::new(1, composition));

        assert_eq!(
            source.content_source(),
            &CompositionContentSource::local("/m/a.mp3")
        );
        assert_eq!(source.duration_ms(), 180_000);
        assert!(source.as_library_item().is_some());

        let external = CompositionSource::External(ExternalCompositionSource::new(
            CompositionContentSource::content_uri("content://downloads/1"),
            "1.mp3",
        ));
        assert!(external.as_library_item().is_none());
    }

    #[test]
    fn test_player_type_display() {
        assert_eq!(PlayerType::Library.to_string(), "library");
        assert_eq!(PlayerType::External.as_str(), "external");
        assert_eq!(PlayerType::ALL.map(PlayerType::index), [0, 1]);
    }

    #[test]
    fn test_only_play_counts_as_playing() {
        assert!(PlayerState::Play.is_playing());
        assert!(!PlayerState::Loading.is_playing());
        assert!(!PlayerState::Error(PlaybackError::UnsupportedSource).is_playing());
    }
}
