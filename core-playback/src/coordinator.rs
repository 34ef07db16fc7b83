//! # Player Coordinator
//!
//! Arbitrates the shared [`MediaPlayer`] between the library and the external
//! playback contexts.
//!
//! ## Overview
//!
//! Each [`PlayerType`] has its own context: source, saved position, speed,
//! prepared and play-when-ready flags, and its own observable channels. Exactly
//! one type is active and bound to the player. Commands addressed to the
//! inactive type only update its context; they take effect when the type is
//! activated by `play`, `play_or_pause` or `play_after_prepare`.
//!
//! ## Preparation
//!
//! Preparations run in spawned tasks, one at a time. Every context carries a
//! generation counter that is bumped whenever its source is superseded or the
//! context is deactivated; a preparation whose generation is no longer current
//! when it finishes is dropped.
//!
//! Relaunch signals from the composite player never reach the interactors: the
//! coordinator prepares the same source again at the actual position, which
//! makes the composite install the next backend.

use crate::error::{PlaybackError, Result};
use crate::models::{CompositionSource, MediaPlayerEvent, PlayerEvent, PlayerState, PlayerType};
use crate::player::MediaPlayer;
use async_trait::async_trait;
use bridge_traits::settings::SettingsRepository;
use core_runtime::PlayerConfig;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Invoked when a context is reset completely.
pub type CleanupCallback = Box<dyn Fn() + Send + Sync>;

/// Commands and observables of the playback contexts.
///
/// Commands never fail and never block; a command addressed to an inactive
/// context is stored and applied on activation.
#[async_trait]
pub trait PlayerCoordinator: Send + Sync {
    /// Make `source` the context's source and prepare it from `start_position_ms`.
    fn prepare_to_play(
        &self,
        source: CompositionSource,
        player_type: PlayerType,
        start_position_ms: u64,
    );

    /// Activate the context and play, after `delay` if non-zero.
    fn play(&self, player_type: PlayerType, delay: Duration);

    fn play_or_pause(&self, player_type: PlayerType);

    fn pause(&self, player_type: PlayerType);

    fn stop(&self, player_type: PlayerType);

    /// Forget the context's source. With `clear_completely` the registered
    /// cleanup callbacks run.
    fn reset(&self, player_type: PlayerType, clear_completely: bool);

    fn play_after_prepare(&self, player_type: PlayerType);

    /// Replace the source model without preparing it again.
    fn update_source(&self, source: CompositionSource, player_type: PlayerType);

    fn on_seek_started(&self, player_type: PlayerType);

    fn on_seek_finished(&self, position_ms: u64, player_type: PlayerType);

    /// Seek forward by the rewind step; returns the new position.
    async fn fast_seek_forward(&self, player_type: PlayerType) -> Result<u64>;

    /// Seek backward by the rewind step; returns the new position.
    async fn fast_seek_backward(&self, player_type: PlayerType) -> Result<u64>;

    fn set_playback_speed(&self, speed: f32, player_type: PlayerType);

    /// Surface `error` to the UI and put the context into the error state.
    fn error(&self, player_type: PlayerType, error: PlaybackError);

    fn is_player_type_active(&self, player_type: PlayerType) -> bool;

    fn register_cleanup_callback(&self, player_type: PlayerType, callback: CleanupCallback);

    fn player_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlayerEvent>;

    fn player_state(&self, player_type: PlayerType) -> watch::Receiver<PlayerState>;

    fn is_playing(&self, player_type: PlayerType) -> watch::Receiver<bool>;

    fn track_position(&self, player_type: PlayerType) -> watch::Receiver<u64>;

    /// Position queried from the player when the context is active and prepared,
    /// the saved position otherwise.
    async fn actual_track_position(&self, player_type: PlayerType) -> Result<u64>;

    fn speed_change_available(&self) -> BoxStream<'static, bool>;

    fn active_player_type(&self) -> watch::Receiver<PlayerType>;

    /// Errors passed to [`error`](Self::error), the only errors meant for the UI.
    fn error_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlaybackError>;
}

struct ContextChannels {
    state: watch::Sender<PlayerState>,
    is_playing: watch::Sender<bool>,
    position: watch::Sender<u64>,
    events: broadcast::Sender<PlayerEvent>,
    errors: broadcast::Sender<PlaybackError>,
}

impl ContextChannels {
    fn new(event_buffer_size: usize) -> Self {
        Self {
            state: watch::Sender::new(PlayerState::Idle),
            is_playing: watch::Sender::new(false),
            position: watch::Sender::new(0),
            events: broadcast::channel(event_buffer_size).0,
            errors: broadcast::channel(event_buffer_size).0,
        }
    }

    fn set_state(&self, state: PlayerState) {
        let playing = state.is_playing();
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        self.is_playing.send_if_modified(|current| {
            let changed = *current != playing;
            *current = playing;
            changed
        });
    }

    fn current_state(&self) -> PlayerState {
        self.state.borrow().clone()
    }

    fn publish_position(&self, position_ms: u64) {
        self.position.send_if_modified(|current| {
            let changed = *current != position_ms;
            *current = position_ms;
            changed
        });
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

struct PlayerContext {
    source: Option<CompositionSource>,
    position_ms: u64,
    prepared: bool,
    preparing: bool,
    play_when_ready: bool,
    seeking: bool,
    speed: f32,
    generation: u64,
}

impl Default for PlayerContext {
    fn default() -> Self {
        Self {
            source: None,
            position_ms: 0,
            prepared: false,
            preparing: false,
            play_when_ready: false,
            seeking: false,
            speed: 1.0,
            generation: 0,
        }
    }
}

impl PlayerContext {
    fn invalidate(&mut self) {
        self.prepared = false;
        self.preparing = false;
        self.generation += 1;
    }
}

struct CoordinatorState {
    active: PlayerType,
    contexts: [PlayerContext; 2],
}

impl CoordinatorState {
    fn context(&self, player_type: PlayerType) -> &PlayerContext {
        &self.contexts[player_type.index()]
    }

    fn context_mut(&mut self, player_type: PlayerType) -> &mut PlayerContext {
        &mut self.contexts[player_type.index()]
    }
}

struct CoordinatorInner {
    player: Arc<dyn MediaPlayer>,
    settings: Arc<dyn SettingsRepository>,
    state: Mutex<CoordinatorState>,
    channels: [ContextChannels; 2],
    active: watch::Sender<PlayerType>,
    cleanup_callbacks: Mutex<HashMap<PlayerType, Vec<CleanupCallback>>>,
    prepare_lock: tokio::sync::Mutex<()>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// [`PlayerCoordinator`] over one shared player.
///
/// The library context is active initially. Must be created inside a Tokio
/// runtime.
pub struct SharedPlayerCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SharedPlayerCoordinator {
    pub fn new(
        player: Arc<dyn MediaPlayer>,
        settings: Arc<dyn SettingsRepository>,
        config: &PlayerConfig,
    ) -> Self {
        let buffer = config.event_buffer_size.max(1);
        let inner = Arc::new(CoordinatorInner {
            player,
            settings,
            state: Mutex::new(CoordinatorState {
                active: PlayerType::Library,
                contexts: [PlayerContext::default(), PlayerContext::default()],
            }),
            channels: [ContextChannels::new(buffer), ContextChannels::new(buffer)],
            active: watch::Sender::new(PlayerType::Library),
            cleanup_callbacks: Mutex::new(HashMap::new()),
            prepare_lock: tokio::sync::Mutex::new(()),
            pump: Mutex::new(None),
        });

        let pump = spawn_event_pump(&inner);
        *inner.pump.lock() = Some(pump);
        Self { inner }
    }

    /// Stop relaying player events and release the player.
    pub fn shutdown(&self) {
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        self.inner.player.release();
        info!("Player coordinator shut down");
    }
}

fn spawn_event_pump(inner: &Arc<CoordinatorInner>) -> JoinHandle<()> {
    let weak: Weak<CoordinatorInner> = Arc::downgrade(inner);
    let mut events = inner.player.events();
    let mut positions = inner.player.track_position_stream();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.on_media_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Coordinator fell behind player events");
                    }
                    Err(RecvError::Closed) => break,
                },
                position = positions.next() => match position {
                    Some(position_ms) => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.on_position(position_ms);
                    }
                    None => positions = stream::pending().boxed(),
                },
            }
        }
    })
}

impl CoordinatorInner {
    fn channels(&self, player_type: PlayerType) -> &ContextChannels {
        &self.channels[player_type.index()]
    }

    async fn on_media_event(self: &Arc<Self>, event: MediaPlayerEvent) {
        match event {
            MediaPlayerEvent::Prepared => {}
            MediaPlayerEvent::Error(error) if error.is_relaunch() => self.relaunch(error).await,
            MediaPlayerEvent::Finished => {
                let (player_type, source) = self.active_source();
                if let Some(source) = source {
                    debug!(player_type = %player_type, "Composition finished");
                    self.channels(player_type)
                        .emit(PlayerEvent::Finished { source });
                }
            }
            MediaPlayerEvent::Error(error) => {
                let (player_type, source) = self.active_source();
                warn!(player_type = %player_type, error = %error, "Player error");
                if let Some(source) = source {
                    self.channels(player_type)
                        .emit(PlayerEvent::Error { source, error });
                }
            }
        }
    }

    fn active_source(&self) -> (PlayerType, Option<CompositionSource>) {
        let state = self.state.lock();
        let player_type = state.active;
        (player_type, state.context(player_type).source.clone())
    }

    async fn relaunch(self: &Arc<Self>, error: PlaybackError) {
        let actual = self.player.track_position().await.ok();

        let mut state = self.state.lock();
        let player_type = state.active;
        let context = state.context_mut(player_type);
        if context.source.is_none() {
            return;
        }
        if let Some(position_ms) = actual.filter(|position| *position > 0) {
            context.position_ms = position_ms;
        }
        info!(
            player_type = %player_type,
            position_ms = context.position_ms,
            error = %error,
            "Relaunching source"
        );
        self.start_preparation(&mut state, player_type);
    }

    fn on_position(&self, position_ms: u64) {
        let mut state = self.state.lock();
        let player_type = state.active;
        let context = state.context_mut(player_type);
        if !context.prepared || context.seeking {
            return;
        }
        context.position_ms = position_ms;
        self.channels(player_type).publish_position(position_ms);
    }

    fn start_preparation(self: &Arc<Self>, state: &mut CoordinatorState, player_type: PlayerType) {
        let context = state.context_mut(player_type);
        let Some(source) = context.source.clone() else {
            return;
        };
        context.invalidate();
        context.preparing = true;
        let generation = context.generation;

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _serialized = inner.prepare_lock.lock().await;
            if !inner.is_current(player_type, generation) {
                debug!(player_type = %player_type, generation, "Skipping superseded preparation");
                return;
            }
            let result = inner
                .player
                .prepare_to_play(source.content_source(), None)
                .await;
            inner.on_prepare_finished(player_type, generation, source, result);
        });
    }

    fn is_current(&self, player_type: PlayerType, generation: u64) -> bool {
        let state = self.state.lock();
        state.active == player_type && state.context(player_type).generation == generation
    }

    fn on_prepare_finished(
        &self,
        player_type: PlayerType,
        generation: u64,
        source: CompositionSource,
        result: Result<()>,
    ) {
        let mut state = self.state.lock();
        if state.active != player_type || state.context(player_type).generation != generation {
            debug!(player_type = %player_type, generation, "Dropping superseded preparation result");
            return;
        }
        let channels = self.channels(player_type);
        let context = state.context_mut(player_type);
        context.preparing = false;

        match result {
            Ok(()) => {
                context.prepared = true;
                self.player.set_playback_speed(context.speed);
                if context.position_ms > 0 {
                    self.player.seek_to(context.position_ms);
                }
                channels.publish_position(context.position_ms);
                info!(
                    player_type = %player_type,
                    source = %source.content_source().log_name(),
                    position_ms = context.position_ms,
                    "Source prepared"
                );
                let play = context.play_when_ready;
                channels.emit(PlayerEvent::Prepared { source });
                if play {
                    self.player.resume();
                    channels.set_state(PlayerState::Play);
                }
            }
            Err(error) => {
                warn!(player_type = %player_type, error = %error, "Preparation failed");
                if channels.current_state() == PlayerState::Loading {
                    channels.set_state(PlayerState::Idle);
                }
                channels.emit(PlayerEvent::Error { source, error });
            }
        }
    }

    /// Bind `player_type` to the player, parking the previously active context.
    fn activate(self: &Arc<Self>, state: &mut CoordinatorState, player_type: PlayerType) {
        let previous = state.active;
        if previous == player_type {
            return;
        }
        self.player.pause();

        let parked = state.context_mut(previous);
        parked.play_when_ready = false;
        parked.seeking = false;
        parked.invalidate();
        let parked_channels = self.channels(previous);
        if matches!(
            parked_channels.current_state(),
            PlayerState::Play | PlayerState::Loading
        ) {
            parked_channels.set_state(PlayerState::Pause);
        }

        state.active = player_type;
        self.active.send_replace(player_type);
        info!(from = %previous, to = %player_type, "Active player switched");

        self.player
            .set_playback_speed(state.context(player_type).speed);
        self.start_preparation(state, player_type);
    }

    fn play_now(self: &Arc<Self>, player_type: PlayerType) {
        let mut state = self.state.lock();
        self.activate(&mut state, player_type);

        let needs_preparation = {
            let context = state.context_mut(player_type);
            context.play_when_ready = true;
            if context.prepared {
                self.player.resume();
                self.channels(player_type).set_state(PlayerState::Play);
                return;
            }
            if context.source.is_none() {
                debug!(player_type = %player_type, "Play requested without a source");
                return;
            }
            self.channels(player_type).set_state(PlayerState::Loading);
            !context.preparing
        };
        if needs_preparation {
            self.start_preparation(&mut state, player_type);
        }
    }

    fn pause_now(&self, player_type: PlayerType) {
        let mut state = self.state.lock();
        let active = state.active == player_type;
        state.context_mut(player_type).play_when_ready = false;
        if active {
            self.player.pause();
        }
        let channels = self.channels(player_type);
        if matches!(
            channels.current_state(),
            PlayerState::Play | PlayerState::Loading
        ) {
            channels.set_state(PlayerState::Pause);
        }
    }

    fn seek_finished(&self, position_ms: u64, player_type: PlayerType) {
        let mut state = self.state.lock();
        let active = state.active == player_type;
        let context = state.context_mut(player_type);
        context.seeking = false;
        context.position_ms = position_ms;
        let prepared = context.prepared;

        let channels = self.channels(player_type);
        channels.publish_position(position_ms);
        if active && prepared {
            self.player.seek_to(position_ms);
            if channels.current_state().is_playing() {
                self.player.resume();
            }
        }
    }

    async fn fast_seek(&self, player_type: PlayerType, forward: bool) -> Result<u64> {
        let rewind = self.settings.rewind_value_millis();
        let (live, saved_position, saved_duration) = {
            let state = self.state.lock();
            let context = state.context(player_type);
            (
                state.active == player_type && context.prepared,
                context.position_ms,
                context.source.as_ref().map_or(0, CompositionSource::duration_ms),
            )
        };

        let (position, duration) = if live {
            (
                self.player.track_position().await?,
                self.player.duration().await?,
            )
        } else {
            (saved_position, saved_duration)
        };

        let target = if forward {
            let target = position.saturating_add(rewind);
            if duration > 0 {
                target.min(duration)
            } else {
                target
            }
        } else {
            position.saturating_sub(rewind)
        };
        self.seek_finished(target, player_type);
        Ok(target)
    }

    fn run_cleanup_callbacks(&self, player_type: PlayerType) {
        let callbacks = self.cleanup_callbacks.lock();
        if let Some(callbacks) = callbacks.get(&player_type) {
            debug!(player_type = %player_type, count = callbacks.len(), "Running cleanup callbacks");
            for callback in callbacks {
                callback();
            }
        }
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

#[async_trait]
impl PlayerCoordinator for SharedPlayerCoordinator {
    fn prepare_to_play(
        &self,
        source: CompositionSource,
        player_type: PlayerType,
        start_position_ms: u64,
    ) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let context = state.context_mut(player_type);
        context.source = Some(source);
        context.position_ms = start_position_ms;
        context.seeking = false;
        inner.channels(player_type).publish_position(start_position_ms);

        if state.active == player_type {
            inner.start_preparation(&mut state, player_type);
        } else {
            debug!(player_type = %player_type, "Source stored for inactive player");
            state.context_mut(player_type).invalidate();
        }
    }

    fn play(&self, player_type: PlayerType, delay: Duration) {
        if delay.is_zero() {
            self.inner.play_now(player_type);
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.play_now(player_type);
        });
    }

    fn play_or_pause(&self, player_type: PlayerType) {
        let playing = {
            let state = self.inner.state.lock();
            state.active == player_type
                && matches!(
                    self.inner.channels(player_type).current_state(),
                    PlayerState::Play | PlayerState::Loading
                )
        };
        if playing {
            self.inner.pause_now(player_type);
        } else {
            self.inner.play_now(player_type);
        }
    }

    fn pause(&self, player_type: PlayerType) {
        self.inner.pause_now(player_type);
    }

    fn stop(&self, player_type: PlayerType) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let active = state.active == player_type;
        let context = state.context_mut(player_type);
        context.play_when_ready = false;
        context.position_ms = 0;
        if active && context.prepared {
            inner.player.stop();
            inner.player.seek_to(0);
        }
        let channels = inner.channels(player_type);
        channels.publish_position(0);
        channels.set_state(PlayerState::Stop);
    }

    fn reset(&self, player_type: PlayerType, clear_completely: bool) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            let active = state.active == player_type;
            if active {
                inner.player.stop();
            }

            let context = state.context_mut(player_type);
            let speed = context.speed;
            let generation = context.generation + 1;
            *context = PlayerContext {
                speed,
                generation,
                ..PlayerContext::default()
            };

            let channels = inner.channels(player_type);
            channels.publish_position(0);
            channels.set_state(PlayerState::Idle);
            info!(player_type = %player_type, clear_completely, "Player reset");

            if active && player_type == PlayerType::External {
                inner.activate(&mut state, PlayerType::Library);
            }
        }

        if clear_completely {
            inner.run_cleanup_callbacks(player_type);
        }
    }

    fn play_after_prepare(&self, player_type: PlayerType) {
        self.inner.play_now(player_type);
    }

    fn update_source(&self, source: CompositionSource, player_type: PlayerType) {
        let mut state = self.inner.state.lock();
        state.context_mut(player_type).source = Some(source);
    }

    fn on_seek_started(&self, player_type: PlayerType) {
        let mut state = self.inner.state.lock();
        state.context_mut(player_type).seeking = true;
    }

    fn on_seek_finished(&self, position_ms: u64, player_type: PlayerType) {
        self.inner.seek_finished(position_ms, player_type);
    }

    async fn fast_seek_forward(&self, player_type: PlayerType) -> Result<u64> {
        self.inner.fast_seek(player_type, true).await
    }

    async fn fast_seek_backward(&self, player_type: PlayerType) -> Result<u64> {
        self.inner.fast_seek(player_type, false).await
    }

    fn set_playback_speed(&self, speed: f32, player_type: PlayerType) {
        let mut state = self.inner.state.lock();
        state.context_mut(player_type).speed = speed;
        if state.active == player_type {
            self.inner.player.set_playback_speed(speed);
        }
    }

    fn error(&self, player_type: PlayerType, error: PlaybackError) {
        warn!(player_type = %player_type, error = %error, "Player error surfaced");
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            let active = state.active == player_type;
            state.context_mut(player_type).play_when_ready = false;
            if active {
                inner.player.pause();
            }
        }
        let channels = inner.channels(player_type);
        channels.set_state(PlayerState::Error(error.clone()));
        let _ = channels.errors.send(error);
    }

    fn is_player_type_active(&self, player_type: PlayerType) -> bool {
        self.inner.state.lock().active == player_type
    }

    fn register_cleanup_callback(&self, player_type: PlayerType, callback: CleanupCallback) {
        self.inner
            .cleanup_callbacks
            .lock()
            .entry(player_type)
            .or_default()
            .push(callback);
    }

    fn player_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlayerEvent> {
        self.inner.channels(player_type).events.subscribe()
    }

    fn player_state(&self, player_type: PlayerType) -> watch::Receiver<PlayerState> {
        self.inner.channels(player_type).state.subscribe()
    }

    fn is_playing(&self, player_type: PlayerType) -> watch::Receiver<bool> {
        self.inner.channels(player_type).is_playing.subscribe()
    }

    fn track_position(&self, player_type: PlayerType) -> watch::Receiver<u64> {
        self.inner.channels(player_type).position.subscribe()
    }

    async fn actual_track_position(&self, player_type: PlayerType) -> Result<u64> {
        let (live, saved) = {
            let state = self.inner.state.lock();
            let context = state.context(player_type);
            (
                state.active == player_type && context.prepared,
                context.position_ms,
            )
        };
        if live {
            self.inner.player.track_position().await
        } else {
            Ok(saved)
        }
    }

    fn speed_change_available(&self) -> BoxStream<'static, bool> {
        self.inner.player.speed_change_available()
    }

    fn active_player_type(&self) -> watch::Receiver<PlayerType> {
        self.inner.active.subscribe()
    }

    fn error_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlaybackError> {
        self.inner.channels(player_type).errors.subscribe()
    }
}
