//! Playback of a single file opened from outside the library.

use crate::coordinator::PlayerCoordinator;
use crate::error::{PlaybackError, Result};
use crate::models::{CompositionSource, PlayerEvent, PlayerState, PlayerType};
use bridge_traits::settings::{RepeatMode, SettingsRepository};
use core_library::{ExternalCompositionSource, ExternalFileReference, ExternalMediaSourceRepository};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PLAYER_TYPE: PlayerType = PlayerType::External;

type SharedPreparation = Shared<BoxFuture<'static, Result<()>>>;

struct ExternalInner {
    coordinator: Arc<dyn PlayerCoordinator>,
    settings: Arc<dyn SettingsRepository>,
    repository: Arc<dyn ExternalMediaSourceRepository>,
    file_ref: Mutex<Option<ExternalFileReference>>,
    is_any_source_prepared: AtomicBool,
    active_preparation: Mutex<Option<(u64, SharedPreparation)>>,
    preparation_ids: AtomicU64,
    current_source: watch::Sender<Option<ExternalCompositionSource>>,
    playback_speed: watch::Sender<f32>,
    track_position: watch::Sender<u64>,
    reset_events: broadcast::Sender<()>,
    player_events_task: Mutex<Option<JoinHandle<()>>>,
}

/// Resolves an external file lazily and plays it through the coordinator.
///
/// Concurrent callers of [`ensure_source_ready`](Self::ensure_source_ready)
/// share one resolution. A revoked read grant during playback is recovered by
/// resolving the file again and preparing it at the current position.
pub struct ExternalPlayerInteractor {
    inner: Arc<ExternalInner>,
}

impl ExternalPlayerInteractor {
    pub fn new(
        coordinator: Arc<dyn PlayerCoordinator>,
        settings: Arc<dyn SettingsRepository>,
        repository: Arc<dyn ExternalMediaSourceRepository>,
    ) -> Self {
        let (reset_events, _) = broadcast::channel(4);
        let inner = Arc::new(ExternalInner {
            coordinator,
            settings,
            repository,
            file_ref: Mutex::new(None),
            is_any_source_prepared: AtomicBool::new(false),
            active_preparation: Mutex::new(None),
            preparation_ids: AtomicU64::new(0),
            current_source: watch::Sender::new(None),
            playback_speed: watch::Sender::new(1.0),
            track_position: watch::Sender::new(0),
            reset_events,
            player_events_task: Mutex::new(None),
        });

        let weak: Weak<ExternalInner> = Arc::downgrade(&inner);
        inner.coordinator.register_cleanup_callback(
            PLAYER_TYPE,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.clear_state();
                }
            }),
        );

        Self { inner }
    }

    /// Forget the previous file, resolve `file_ref` and play it once prepared.
    pub async fn start_playing(&self, file_ref: ExternalFileReference) -> Result<()> {
        let inner = &self.inner;
        info!(source = %file_ref.source.log_name(), "Opening external file");
        inner.is_any_source_prepared.store(false, Ordering::SeqCst);
        *inner.active_preparation.lock() = None;
        *inner.file_ref.lock() = Some(file_ref);

        inner.ensure_source_ready().await?;
        inner.coordinator.play_after_prepare(PLAYER_TYPE);
        Ok(())
    }

    /// Resolve and prepare the current file unless that already happened.
    pub async fn ensure_source_ready(&self) -> Result<()> {
        self.inner.ensure_source_ready().await
    }

    pub async fn play(&self) {
        match self.inner.ensure_source_ready().await {
            Ok(()) => self.inner.coordinator.play(PLAYER_TYPE, std::time::Duration::ZERO),
            Err(e) => warn!(error = %e, "External source is not ready"),
        }
    }

    pub async fn play_or_pause(&self) {
        match self.inner.ensure_source_ready().await {
            Ok(()) => self.inner.coordinator.play_or_pause(PLAYER_TYPE),
            Err(e) => warn!(error = %e, "External source is not ready"),
        }
    }

    pub fn pause(&self) {
        self.inner.coordinator.pause(PLAYER_TYPE);
    }

    pub fn stop(&self) {
        self.inner.coordinator.stop(PLAYER_TYPE);
    }

    /// Tear the external context down and tell the UI to close the player.
    pub fn reset(&self) {
        self.inner.coordinator.reset(PLAYER_TYPE, true);
        let _ = self.inner.reset_events.send(());
    }

    /// Called when the hosting screen goes away.
    pub fn release(&self) {
        if !self.inner.settings.is_external_player_keep_in_background() {
            self.reset();
        }
    }

    pub fn on_seek_started(&self) {
        self.inner.coordinator.on_seek_started(PLAYER_TYPE);
    }

    pub fn on_seek_finished(&self, position_ms: u64) {
        self.inner.on_seek_finished(position_ms);
    }

    pub async fn fast_seek_forward(&self) -> Result<u64> {
        let position = self.inner.coordinator.fast_seek_forward(PLAYER_TYPE).await?;
        self.inner.track_position.send_replace(position);
        Ok(position)
    }

    pub async fn fast_seek_backward(&self) -> Result<u64> {
        let position = self.inner.coordinator.fast_seek_backward(PLAYER_TYPE).await?;
        self.inner.track_position.send_replace(position);
        Ok(position)
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.inner.settings.external_player_repeat_mode()
    }

    /// Only [`RepeatMode::None`] and [`RepeatMode::RepeatComposition`] apply to
    /// a single file; other modes are ignored.
    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        match mode {
            RepeatMode::None | RepeatMode::RepeatComposition => {
                self.inner.settings.set_external_player_repeat_mode(mode);
            }
            other => debug!(mode = ?other, "Repeat mode not applicable to external player"),
        }
    }

    pub fn change_repeat_mode(&self) {
        let next = match self.repeat_mode() {
            RepeatMode::None => RepeatMode::RepeatComposition,
            _ => RepeatMode::None,
        };
        self.set_repeat_mode(next);
    }

    pub fn repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.inner.settings.external_player_repeat_mode_updates()
    }

    pub fn is_keep_in_background(&self) -> bool {
        self.inner.settings.is_external_player_keep_in_background()
    }

    pub fn set_keep_in_background(&self, enabled: bool) {
        self.inner.settings.set_external_player_keep_in_background(enabled);
    }

    pub fn set_playback_speed(&self, speed: f32) {
        self.inner.set_playback_speed(speed);
    }

    pub fn playback_speed_updates(&self) -> watch::Receiver<f32> {
        self.inner.playback_speed.subscribe()
    }

    pub fn speed_change_available(&self) -> BoxStream<'static, bool> {
        self.inner.coordinator.speed_change_available()
    }

    pub fn player_state(&self) -> watch::Receiver<PlayerState> {
        self.inner.coordinator.player_state(PLAYER_TYPE)
    }

    pub fn is_playing(&self) -> watch::Receiver<bool> {
        self.inner.coordinator.is_playing(PLAYER_TYPE)
    }

    pub fn track_position(&self) -> watch::Receiver<u64> {
        self.inner.track_position.subscribe()
    }

    /// Resolved source of the current file, `None` until resolved or after a failure.
    pub fn current_source(&self) -> watch::Receiver<Option<ExternalCompositionSource>> {
        self.inner.current_source.subscribe()
    }

    /// Fires when the external player was reset and its screen should close.
    pub fn reset_events(&self) -> broadcast::Receiver<()> {
        self.inner.reset_events.subscribe()
    }

    /// Errors meant for the user.
    pub fn error_events(&self) -> broadcast::Receiver<PlaybackError> {
        self.inner.coordinator.error_events(PLAYER_TYPE)
    }
}

impl Drop for ExternalPlayerInteractor {
    fn drop(&mut self) {
        if let Some(task) = self.inner.player_events_task.lock().take() {
            task.abort();
        }
    }
}

impl ExternalInner {
    async fn ensure_source_ready(self: &Arc<Self>) -> Result<()> {
        let Some(file_ref) = self.file_ref.lock().clone() else {
            return Err(PlaybackError::NoFileReference);
        };

        let preparation = {
            let mut active = self.active_preparation.lock();
            match active.as_ref() {
                Some((_, preparation)) => preparation.clone(),
                None => {
                    if self.is_any_source_prepared.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    let id = self.preparation_ids.fetch_add(1, Ordering::SeqCst);
                    let inner = Arc::clone(self);
                    let preparation = async move { inner.resolve_and_prepare(id, file_ref).await }
                        .boxed()
                        .shared();
                    *active = Some((id, preparation.clone()));
                    preparation
                }
            }
        };
        preparation.await
    }

    async fn resolve_and_prepare(self: &Arc<Self>, id: u64, file_ref: ExternalFileReference) -> Result<()> {
        let resolved = self.repository.composition_source(&file_ref).await;

        // Held until committed so a newer file cannot slip in between
        let mut active = self.active_preparation.lock();
        if !active.as_ref().is_some_and(|(current, _)| *current == id) {
            debug!(source = %file_ref.source.log_name(), "Discarding resolution of a replaced file");
            return Err(PlaybackError::Superseded);
        }
        *active = None;

        match resolved {
            Ok(source) => {
                self.subscribe_on_player_events();
                self.current_source.send_replace(Some(source.clone()));
                self.set_playback_speed(1.0);
                info!(source = %source.source.log_name(), "External source resolved");
                self.coordinator
                    .prepare_to_play(CompositionSource::External(source), PLAYER_TYPE, 0);
                self.is_any_source_prepared.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                let error = PlaybackError::from(e);
                warn!(source = %file_ref.source.log_name(), error = %error, "Failed to resolve external file");
                self.is_any_source_prepared.store(false, Ordering::SeqCst);
                self.coordinator.pause(PLAYER_TYPE);
                self.current_source.send_replace(None);
                Err(error)
            }
        }
    }

    fn set_playback_speed(&self, speed: f32) {
        self.playback_speed.send_replace(speed);
        self.coordinator.set_playback_speed(speed, PLAYER_TYPE);
    }

    fn on_seek_finished(&self, position_ms: u64) {
        self.coordinator.on_seek_finished(position_ms, PLAYER_TYPE);
        self.track_position.send_replace(position_ms);
    }

    fn subscribe_on_player_events(self: &Arc<Self>) {
        let mut slot = self.player_events_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut events = self.coordinator.player_events(PLAYER_TYPE);
        let mut states = self.coordinator.player_state(PLAYER_TYPE);
        let mut positions = self.coordinator.track_position(PLAYER_TYPE);
        let inner = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => inner.on_player_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "External player fell behind player events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = states.borrow_and_update().clone();
                        if state == PlayerState::Stop {
                            inner.track_position.send_replace(0);
                        }
                    },
                    changed = positions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let position = *positions.borrow_and_update();
                        inner.track_position.send_replace(position);
                    },
                }
            }
        }));
    }

    async fn on_player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::Prepared { .. } => {}
            PlayerEvent::Finished { .. } => {
                self.on_seek_finished(0);
                if self.settings.external_player_repeat_mode() != RepeatMode::RepeatComposition {
                    self.coordinator.pause(PLAYER_TYPE);
                }
            }
            PlayerEvent::Error {
                error: PlaybackError::NoReadPermission(reason),
                ..
            } => {
                info!(reason = %reason, "Read permission lost, resolving external file again");
                self.re_prepare_source().await;
            }
            PlayerEvent::Error { error, .. } => self.coordinator.error(PLAYER_TYPE, error),
        }
    }

    async fn re_prepare_source(&self) {
        let Some(file_ref) = self.file_ref.lock().clone() else {
            return;
        };
        let source = match self.repository.composition_source(&file_ref).await {
            Ok(source) => source,
            Err(e) => {
                self.coordinator.error(PLAYER_TYPE, e.into());
                return;
            }
        };
        self.current_source.send_replace(Some(source.clone()));

        match self.coordinator.actual_track_position(PLAYER_TYPE).await {
            Ok(position) => {
                debug!(position_ms = position, "Preparing external file again");
                self.coordinator.prepare_to_play(
                    CompositionSource::External(source),
                    PLAYER_TYPE,
                    position,
                );
            }
            Err(e) => self.coordinator.error(PLAYER_TYPE, e),
        }
    }

    /// Cleanup callback of the external context.
    fn clear_state(&self) {
        info!("Clearing external player state");
        self.is_any_source_prepared.store(false, Ordering::SeqCst);
        *self.active_preparation.lock() = None;
        if let Some(task) = self.player_events_task.lock().take() {
            task.abort();
        }
        self.current_source.send_replace(None);

        let repository = Arc::clone(&self.repository);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = repository.delete_all_data().await {
                        warn!(error = %e, "Failed to delete cached external data");
                    }
                });
            }
            Err(_) => warn!("No runtime available to delete cached external data"),
        }
    }
}
