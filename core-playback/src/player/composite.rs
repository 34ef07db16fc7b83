//! Backend failover.
//!
//! [`CompositeMediaPlayer`] walks an ordered list of backend factories. When the
//! installed backend reports that it cannot decode a source, the failure is
//! recorded, the next index is scheduled, and preparation is retried on a fresh
//! backend. The walk stops at the last factory, so a source causes at most
//! `N - 1` swaps.

use super::{MediaPlayer, MediaPlayerFactory};
use crate::error::{PlaybackError, Result};
use crate::models::{MediaPlayerEvent, SoundBalance};
use crate::stream::{switch_map, watch_stream};
use async_trait::async_trait;
use bridge_traits::playback::CompositionContentSource;
use core_runtime::PlayerConfig;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct CompositeState {
    player: Arc<dyn MediaPlayer>,
    current_index: usize,
    next_index: usize,
    current_source: Option<CompositionContentSource>,
    previous_error: Option<PlaybackError>,
    speed: f32,
    balance: SoundBalance,
    volume: Option<f32>,
    forwarder: Option<JoinHandle<()>>,
}

struct CompositeInner {
    factories: Vec<MediaPlayerFactory>,
    state: Mutex<CompositeState>,
    events: broadcast::Sender<MediaPlayerEvent>,
    current_player: watch::Sender<Arc<dyn MediaPlayer>>,
}

/// [`MediaPlayer`] hiding backend failover from its caller.
///
/// Must be created inside a Tokio runtime: backend events are relayed by a
/// spawned task.
pub struct CompositeMediaPlayer {
    inner: Arc<CompositeInner>,
}

impl CompositeMediaPlayer {
    /// Install the first factory's backend with the given speed and balance.
    pub fn new(
        factories: Vec<MediaPlayerFactory>,
        playback_speed: f32,
        balance: SoundBalance,
        event_buffer_size: usize,
    ) -> Result<Self> {
        let player = match factories.first() {
            Some(factory) => factory(),
            None => {
                return Err(PlaybackError::Internal(
                    "Composite player needs at least one backend".to_string(),
                ))
            }
        };
        player.set_playback_speed(playback_speed);
        player.set_sound_balance(balance);

        let (events, _) = broadcast::channel(event_buffer_size.max(1));
        let inner = Arc::new(CompositeInner {
            factories,
            state: Mutex::new(CompositeState {
                player: Arc::clone(&player),
                current_index: 0,
                next_index: 0,
                current_source: None,
                previous_error: None,
                speed: playback_speed,
                balance,
                volume: None,
                forwarder: None,
            }),
            events,
            current_player: watch::Sender::new(Arc::clone(&player)),
        });

        let forwarder = spawn_forwarder(&inner, &player);
        inner.state.lock().forwarder = Some(forwarder);

        info!(backends = inner.factories.len(), "Composite media player ready");
        Ok(Self { inner })
    }

    pub fn from_config(factories: Vec<MediaPlayerFactory>, config: &PlayerConfig) -> Result<Self> {
        Self::new(
            factories,
            config.initial_playback_speed,
            config.initial_sound_balance.into(),
            config.event_buffer_size,
        )
    }

    /// Index of the installed backend.
    pub fn current_backend_index(&self) -> usize {
        self.inner.state.lock().current_index
    }

    fn current(&self) -> Arc<dyn MediaPlayer> {
        Arc::clone(&self.inner.state.lock().player)
    }
}

fn spawn_forwarder(inner: &Arc<CompositeInner>, player: &Arc<dyn MediaPlayer>) -> JoinHandle<()> {
    let weak: Weak<CompositeInner> = Arc::downgrade(inner);
    let mut events = player.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.on_backend_event(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Composite player fell behind backend events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

impl CompositeInner {
    fn on_backend_event(&self, event: MediaPlayerEvent) {
        let event = match event {
            MediaPlayerEvent::Error(error) => {
                if self.prepare_relaunch_on_error(&error) {
                    MediaPlayerEvent::Error(PlaybackError::RelaunchSource(Box::new(error)))
                } else {
                    MediaPlayerEvent::Error(error)
                }
            }
            other => other,
        };
        let _ = self.events.send(event);
    }

    /// Schedule the next backend if `error` is a failover trigger and one is left.
    fn prepare_relaunch_on_error(&self, error: &PlaybackError) -> bool {
        if !error.is_unsupported_source() {
            return false;
        }
        let mut state = self.state.lock();
        if state.current_index + 1 >= self.factories.len() {
            return false;
        }
        state.previous_error = Some(error.clone());
        state.next_index = state.current_index + 1;
        debug!(
            backend_index = state.current_index,
            next_index = state.next_index,
            error = %error,
            "Backend cannot play source, next backend scheduled"
        );
        true
    }

    fn install_backend(self: &Arc<Self>, state: &mut CompositeState, index: usize) {
        let Some(factory) = self.factories.get(index) else {
            warn!(backend_index = index, "No backend at index");
            return;
        };
        debug!(from = state.current_index, to = index, "Swapping backend");

        if let Some(forwarder) = state.forwarder.take() {
            forwarder.abort();
        }
        state.player.release();

        let player = factory();
        player.set_playback_speed(state.speed);
        player.set_sound_balance(state.balance);
        if let Some(volume) = state.volume {
            player.set_volume(volume);
        }

        state.forwarder = Some(spawn_forwarder(self, &player));
        state.player = Arc::clone(&player);
        state.current_index = index;
        self.current_player.send_replace(player);
    }
}

impl Drop for CompositeInner {
    fn drop(&mut self) {
        if let Some(forwarder) = self.state.get_mut().forwarder.take() {
            forwarder.abort();
        }
    }
}

#[async_trait]
impl MediaPlayer for CompositeMediaPlayer {
    async fn prepare_to_play(
        &self,
        source: &CompositionContentSource,
        previous_error: Option<PlaybackError>,
    ) -> Result<()> {
        loop {
            let (player, forwarded_error, backend_index) = {
                let mut state = self.inner.state.lock();
                let same_source = state.current_source.as_ref() == Some(source);
                if same_source {
                    if state.current_index != state.next_index {
                        let index = state.next_index;
                        self.inner.install_backend(&mut state, index);
                    }
                } else {
                    state.next_index = 0;
                    if state.current_index != 0 {
                        self.inner.install_backend(&mut state, 0);
                    }
                }

                let forwarded_error = if same_source {
                    state.previous_error.take()
                } else {
                    state.previous_error = None;
                    None
                };
                state.current_source = Some(source.clone());
                (Arc::clone(&state.player), forwarded_error, state.current_index)
            };

            let previous = forwarded_error.or_else(|| previous_error.clone());
            let error = match player.prepare_to_play(source, previous).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            if !self.inner.prepare_relaunch_on_error(&error) {
                debug!(backend_index, error = %error, "Preparation failed");
                return Err(error);
            }
        }
    }

    fn resume(&self) {
        self.current().resume();
    }

    fn pause(&self) {
        self.current().pause();
    }

    fn stop(&self) {
        let player = {
            let mut state = self.inner.state.lock();
            state.current_source = None;
            Arc::clone(&state.player)
        };
        player.stop();
    }

    fn seek_to(&self, position_ms: u64) {
        self.current().seek_to(position_ms);
    }

    fn set_volume(&self, volume: f32) {
        let player = {
            let mut state = self.inner.state.lock();
            state.volume = Some(volume);
            Arc::clone(&state.player)
        };
        player.set_volume(volume);
    }

    fn set_sound_balance(&self, balance: SoundBalance) {
        let player = {
            let mut state = self.inner.state.lock();
            state.balance = balance;
            Arc::clone(&state.player)
        };
        player.set_sound_balance(balance);
    }

    fn set_playback_speed(&self, speed: f32) {
        let player = {
            let mut state = self.inner.state.lock();
            state.speed = speed;
            Arc::clone(&state.player)
        };
        player.set_playback_speed(speed);
    }

    async fn track_position(&self) -> Result<u64> {
        self.current().track_position().await
    }

    async fn duration(&self) -> Result<u64> {
        self.current().duration().await
    }

    fn release(&self) {
        let player = {
            let mut state = self.inner.state.lock();
            state.current_source = None;
            if let Some(forwarder) = state.forwarder.take() {
                forwarder.abort();
            }
            Arc::clone(&state.player)
        };
        player.release();
    }

    fn events(&self) -> broadcast::Receiver<MediaPlayerEvent> {
        self.inner.events.subscribe()
    }

    fn track_position_stream(&self) -> BoxStream<'static, u64> {
        switch_map(watch_stream(self.inner.current_player.subscribe()), |player| {
            player.track_position_stream()
        })
    }

    fn speed_change_available(&self) -> BoxStream<'static, bool> {
        switch_map(watch_stream(self.inner.current_player.subscribe()), |player| {
            player.speed_change_available()
        })
    }
}
