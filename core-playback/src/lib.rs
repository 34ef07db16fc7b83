//! # Playback Coordination Module
//!
//! Drives a single audio output shared by the library player and the
//! external-file player.
//!
//! ## Overview
//!
//! This module handles:
//! - Backend failover: [`CompositeMediaPlayer`] walks an ordered list of
//!   [`MediaPlayer`] backends when a source cannot be decoded
//! - Player state per [`PlayerType`] and hand-over of the output between
//!   them ([`SharedPlayerCoordinator`])
//! - Use cases on top of the coordinator: queue playback with position
//!   persistence ([`LibraryPlayerInteractor`]), single-file playback
//!   ([`ExternalPlayerInteractor`]) and command routing
//!   ([`CommonPlayerInteractor`])
//!
//! ## Layering
//!
//! ```text
//! CommonPlayerInteractor
//!   ├── LibraryPlayerInteractor ──┐
//!   └── ExternalPlayerInteractor ─┴── PlayerCoordinator
//!                                        └── CompositeMediaPlayer
//!                                              └── DecoderMediaPlayer<D: PlatformDecoder> ...
//! ```

pub mod coordinator;
pub mod error;
pub mod interactor;
pub mod models;
pub mod player;
pub mod stream;

pub use coordinator::{CleanupCallback, PlayerCoordinator, SharedPlayerCoordinator};
pub use error::{PlaybackError, Result};
pub use interactor::{
    position_to_save, CommonPlayerInteractor, ExternalPlayerInteractor, LibraryPlayerInteractor,
};
pub use models::{
    CompositionSource, MediaPlayerEvent, PlayerEvent, PlayerState, PlayerType, SoundBalance,
};
pub use player::{CompositeMediaPlayer, DecoderMediaPlayer, MediaPlayer, MediaPlayerFactory};
