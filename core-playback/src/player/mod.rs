//! # Media Players
//!
//! The backend contract and its two implementations.
//!
//! - [`DecoderMediaPlayer`] drives a single native decoder session.
//! - [`CompositeMediaPlayer`] owns an ordered list of backend factories and
//!   fails over to the next backend when the current one cannot decode a source.
//!
//! ## Contract
//!
//! - `prepare_to_play` fails with [`PlaybackError::UnsupportedSource`] (or
//!   [`PlaybackError::PlayerOutOfMemory`]) when the backend cannot decode the
//!   source. Every other failure is final for that backend.
//! - `seek_to` issued before preparation completes is applied once it does.
//! - Commands are synchronous and never fail; failures surface as
//!   [`MediaPlayerEvent::Error`] on [`MediaPlayer::events`].
//!
//! [`PlaybackError::UnsupportedSource`]: crate::PlaybackError::UnsupportedSource
//! [`PlaybackError::PlayerOutOfMemory`]: crate::PlaybackError::PlayerOutOfMemory

mod composite;
mod decoder;

pub use composite::CompositeMediaPlayer;
pub use decoder::DecoderMediaPlayer;

use crate::error::{PlaybackError, Result};
use crate::models::{MediaPlayerEvent, SoundBalance};
use async_trait::async_trait;
use bridge_traits::playback::CompositionContentSource;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A playback backend bound to at most one source at a time.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Attach `source` and wait until it can be played.
    ///
    /// `previous_error` is the failure that made the caller switch to this
    /// backend for the same source, if any.
    async fn prepare_to_play(
        &self,
        source: &CompositionContentSource,
        previous_error: Option<PlaybackError>,
    ) -> Result<()>;

    fn resume(&self);

    fn pause(&self);

    /// Pause and rewind to the start.
    fn stop(&self);

    fn seek_to(&self, position_ms: u64);

    fn set_volume(&self, volume: f32);

    fn set_sound_balance(&self, balance: SoundBalance);

    fn set_playback_speed(&self, speed: f32);

    async fn track_position(&self) -> Result<u64>;

    async fn duration(&self) -> Result<u64>;

    /// Free the underlying decoder. The player must not be used afterwards.
    fn release(&self);

    fn events(&self) -> broadcast::Receiver<MediaPlayerEvent>;

    /// Periodic track position while the player is alive.
    fn track_position_stream(&self) -> BoxStream<'static, u64>;

    fn speed_change_available(&self) -> BoxStream<'static, bool>;
}

/// Builds a fresh backend instance.
pub type MediaPlayerFactory = Box<dyn Fn() -> Arc<dyn MediaPlayer> + Send + Sync>;
