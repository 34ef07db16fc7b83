//! Backend over a single [`PlatformDecoder`] session.

use super::MediaPlayer;
use crate::error::{PlaybackError, Result};
use crate::models::{MediaPlayerEvent, SoundBalance};
use async_trait::async_trait;
use bridge_traits::playback::{
    CompositionContentSource, DecoderError, DecoderEvent, DecoderEventListener, PlatformDecoder,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

struct DecoderState {
    source: Option<CompositionContentSource>,
    prepared: bool,
    playing: bool,
    postponed_position: Option<u64>,
    previous_error: Option<PlaybackError>,
    volume: f32,
    balance: SoundBalance,
    speed: f32,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            source: None,
            prepared: false,
            playing: false,
            postponed_position: None,
            previous_error: None,
            volume: 1.0,
            balance: SoundBalance::default(),
            speed: 1.0,
        }
    }
}

struct DecoderInner<D> {
    decoder: Mutex<D>,
    state: Arc<Mutex<DecoderState>>,
    events: broadcast::Sender<MediaPlayerEvent>,
    poll_interval: Duration,
    speed_change_supported: bool,
}

/// [`MediaPlayer`] driving one native decoder session.
///
/// Decoder access is serialized by a lock; `open` runs on the blocking pool
/// and holds that lock until it returns. Output settings changed meanwhile are
/// only recorded and pushed to the session once it is open, so callers never
/// wait on an open in flight. The state lock is never held while calling into
/// the decoder, because decoders may invoke their listener synchronously.
pub struct DecoderMediaPlayer<D: PlatformDecoder> {
    inner: Arc<DecoderInner<D>>,
}

impl<D: PlatformDecoder> Clone for DecoderMediaPlayer<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: PlatformDecoder> DecoderMediaPlayer<D> {
    pub fn new(mut decoder: D, poll_interval: Duration, event_buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer_size.max(1));
        let state = Arc::new(Mutex::new(DecoderState::default()));
        decoder.set_event_listener(event_listener(Arc::clone(&state), events.clone()));
        let speed_change_supported = decoder.supports_speed_change();

        Self {
            inner: Arc::new(DecoderInner {
                decoder: Mutex::new(decoder),
                state,
                events,
                poll_interval,
                speed_change_supported,
            }),
        }
    }

    fn emit(&self, event: MediaPlayerEvent) {
        let _ = self.inner.events.send(event);
    }

    fn apply_volume(&self) {
        let (left, right) = {
            let state = self.inner.state.lock();
            if !state.prepared {
                return;
            }
            (
                state.volume * state.balance.left,
                state.volume * state.balance.right,
            )
        };
        if let Err(e) = self.inner.decoder.lock().set_volume(left, right) {
            debug!(error = %e, "Decoder rejected volume");
        }
    }

    fn apply_speed(&self) {
        if !self.inner.speed_change_supported {
            return;
        }
        let speed = {
            let state = self.inner.state.lock();
            if !state.prepared {
                return;
            }
            state.speed
        };
        if let Err(e) = self.inner.decoder.lock().set_speed(speed) {
            debug!(error = %e, speed, "Decoder rejected playback speed");
        }
    }

    fn prepare_error(
        &self,
        error: DecoderError,
        source: &CompositionContentSource,
        previous_error: Option<PlaybackError>,
    ) -> PlaybackError {
        match error {
            DecoderError::Unsupported | DecoderError::Malformed => PlaybackError::UnsupportedSource,
            DecoderError::OutOfMemory => PlaybackError::PlayerOutOfMemory,
            DecoderError::PermissionDenied(message) => PlaybackError::NoReadPermission(message),
            DecoderError::NotFound(message) if source.is_remote() => {
                PlaybackError::RemoteSourceNotFound(message)
            }
            DecoderError::NotFound(message) => PlaybackError::LocalSourceNotFound(message),
            DecoderError::Io(message) => {
                if source.requires_read_grant()
                    && !self.inner.decoder.lock().has_read_permission(source)
                {
                    PlaybackError::NoReadPermission(message)
                } else if matches!(previous_error, Some(PlaybackError::UnsupportedSource)) {
                    // The previous backend already proved the format unreadable
                    PlaybackError::UnsupportedSource
                } else {
                    PlaybackError::Io(message)
                }
            }
            other => PlaybackError::UnknownPlayer(other.to_string()),
        }
    }
}

fn runtime_error(error: DecoderError) -> PlaybackError {
    match error {
        DecoderError::Unsupported | DecoderError::Malformed => PlaybackError::UnsupportedSource,
        DecoderError::OutOfMemory => PlaybackError::PlayerOutOfMemory,
        DecoderError::PermissionDenied(message) => PlaybackError::NoReadPermission(message),
        other => PlaybackError::UnknownPlayer(other.to_string()),
    }
}

fn event_listener(
    state: Arc<Mutex<DecoderState>>,
    events: broadcast::Sender<MediaPlayerEvent>,
) -> DecoderEventListener {
    Arc::new(move |event| {
        state.lock().playing = false;
        let event = match event {
            DecoderEvent::Completed => MediaPlayerEvent::Finished,
            DecoderEvent::Failed(error) => {
                let error = runtime_error(error);
                warn!(error = %error, "Decoder failed during playback");
                MediaPlayerEvent::Error(error)
            }
        };
        let _ = events.send(event);
    })
}

#[async_trait]
impl<D: PlatformDecoder> MediaPlayer for DecoderMediaPlayer<D> {
    async fn prepare_to_play(
        &self,
        source: &CompositionContentSource,
        previous_error: Option<PlaybackError>,
    ) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.source = Some(source.clone());
            state.prepared = false;
            state.playing = false;
            state.postponed_position = None;
            state.previous_error = previous_error;
        }
        debug!(source = %source.log_name(), "Opening decoder");

        let inner = Arc::clone(&self.inner);
        let open_source = source.clone();
        let opened = tokio::task::spawn_blocking(move || {
            let mut decoder = inner.decoder.lock();
            decoder.open(&open_source)
        })
        .await
        .map_err(|e| PlaybackError::Internal(format!("Decoder task failed: {}", e)))?;

        let previous_error = self.inner.state.lock().previous_error.take();
        if let Err(e) = opened {
            let error = self.prepare_error(e, source, previous_error);
            debug!(source = %source.log_name(), error = %error, "Decoder rejected source");
            return Err(error);
        }

        let postponed = {
            let mut state = self.inner.state.lock();
            state.prepared = true;
            state.postponed_position.take()
        };
        self.apply_volume();
        self.apply_speed();
        if let Some(position_ms) = postponed {
            self.seek_to(position_ms);
        }

        self.emit(MediaPlayerEvent::Prepared);
        Ok(())
    }

    fn resume(&self) {
        {
            let state = self.inner.state.lock();
            if state.playing || !state.prepared {
                return;
            }
        }
        if let Err(e) = self.inner.decoder.lock().start() {
            warn!(error = %e, "Decoder failed to start");
            self.emit(MediaPlayerEvent::Error(runtime_error(e)));
            return;
        }
        self.inner.state.lock().playing = true;
    }

    fn pause(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.playing {
                return;
            }
            state.playing = false;
        }
        if let Err(e) = self.inner.decoder.lock().pause() {
            debug!(error = %e, "Decoder failed to pause");
        }
    }

    fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.playing {
                return;
            }
            state.playing = false;
        }
        let mut decoder = self.inner.decoder.lock();
        if let Err(e) = decoder.seek_to(0).and_then(|_| decoder.pause()) {
            debug!(error = %e, "Decoder failed to stop");
        }
    }

    fn seek_to(&self, position_ms: u64) {
        {
            let mut state = self.inner.state.lock();
            if !state.prepared {
                if state.source.is_some() {
                    state.postponed_position = Some(position_ms);
                }
                return;
            }
        }

        let result = self.inner.decoder.lock().seek_to(position_ms);
        match result {
            Ok(()) => {}
            Err(DecoderError::PermissionDenied(message)) => {
                self.emit(MediaPlayerEvent::Error(PlaybackError::NoReadPermission(
                    message,
                )));
            }
            Err(e) => {
                warn!(error = %e, position_ms, "Seek failed, relaunch required");
                self.emit(MediaPlayerEvent::Error(PlaybackError::RelaunchSource(
                    Box::new(runtime_error(e)),
                )));
            }
        }
    }

    fn set_volume(&self, volume: f32) {
        self.inner.state.lock().volume = volume;
        self.apply_volume();
    }

    fn set_sound_balance(&self, balance: SoundBalance) {
        self.inner.state.lock().balance = balance;
        self.apply_volume();
    }

    fn set_playback_speed(&self, speed: f32) {
        self.inner.state.lock().speed = speed;
        self.apply_speed();
    }

    async fn track_position(&self) -> Result<u64> {
        Ok(self.inner.position())
    }

    async fn duration(&self) -> Result<u64> {
        if !self.inner.state.lock().prepared {
            return Ok(0);
        }
        Ok(self.inner.decoder.lock().duration_ms().unwrap_or(0))
    }

    fn release(&self) {
        {
            let mut state = self.inner.state.lock();
            state.source = None;
            state.prepared = false;
            state.playing = false;
            state.postponed_position = None;
        }
        self.inner.decoder.lock().release();
    }

    fn events(&self) -> broadcast::Receiver<MediaPlayerEvent> {
        self.inner.events.subscribe()
    }

    fn track_position_stream(&self) -> BoxStream<'static, u64> {
        let inner = Arc::clone(&self.inner);
        stream::unfold(
            (inner, None::<Interval>),
            |(inner, ticker)| async move {
                let mut ticker = ticker.unwrap_or_else(|| {
                    let mut ticker = interval(inner.poll_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker
                });
                ticker.tick().await;
                let position = inner.position();
                Some((position, (inner, Some(ticker))))
            },
        )
        .boxed()
    }

    fn speed_change_available(&self) -> BoxStream<'static, bool> {
        let available = self.inner.speed_change_supported;
        stream::once(async move { available }).boxed()
    }
}

impl<D: PlatformDecoder> DecoderInner<D> {
    fn position(&self) -> u64 {
        if !self.state.lock().prepared {
            return 0;
        }
        self.decoder.lock().position_ms().unwrap_or(0)
    }
}
