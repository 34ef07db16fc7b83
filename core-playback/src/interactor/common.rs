//! Commands that follow whichever player is active.

use super::{ExternalPlayerInteractor, LibraryPlayerInteractor};
use crate::coordinator::PlayerCoordinator;
use crate::models::{PlayerState, PlayerType};
use crate::stream::{switch_map, watch_stream};
use bridge_traits::settings::RepeatMode;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Routes session-level commands (media buttons, notification, widgets) to
/// the library or external interactor, depending on the active player type.
///
/// Queue-only commands such as skipping and random playing always go to the
/// library.
pub struct CommonPlayerInteractor {
    coordinator: Arc<dyn PlayerCoordinator>,
    library: Arc<LibraryPlayerInteractor>,
    external: Arc<ExternalPlayerInteractor>,
}

impl CommonPlayerInteractor {
    pub fn new(
        coordinator: Arc<dyn PlayerCoordinator>,
        library: Arc<LibraryPlayerInteractor>,
        external: Arc<ExternalPlayerInteractor>,
    ) -> Self {
        Self {
            coordinator,
            library,
            external,
        }
    }

    fn active_type(&self) -> PlayerType {
        *self.coordinator.active_player_type().borrow()
    }

    /// Prepare the library queue unless an external file is being played.
    pub async fn prepare(&self) {
        if self.coordinator.is_player_type_active(PlayerType::External) {
            debug!("External player active, library not prepared");
            return;
        }
        self.library.prepare().await;
    }

    /// Play the active player, or `force_type` when given.
    ///
    /// The delay only applies to library playback.
    pub async fn play(&self, delay: Duration, force_type: Option<PlayerType>) {
        match force_type.unwrap_or_else(|| self.active_type()) {
            PlayerType::Library => self.library.play(delay).await,
            PlayerType::External => self.external.play().await,
        }
    }

    pub async fn play_or_pause(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.play_or_pause().await,
            PlayerType::External => self.external.play_or_pause().await,
        }
    }

    pub fn pause(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.pause(),
            PlayerType::External => self.external.pause(),
        }
    }

    pub fn stop(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.stop(),
            PlayerType::External => self.external.stop(),
        }
    }

    pub fn reset(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.reset(),
            PlayerType::External => self.external.reset(),
        }
    }

    pub async fn skip_to_previous(&self) {
        self.library.skip_to_previous().await;
    }

    pub async fn skip_to_next(&self) {
        self.library.skip_to_next().await;
    }

    pub fn on_seek_started(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.on_seek_started(),
            PlayerType::External => self.external.on_seek_started(),
        }
    }

    pub async fn on_seek_finished(&self, position_ms: u64) {
        match self.active_type() {
            PlayerType::Library => self.library.on_seek_finished(position_ms).await,
            PlayerType::External => self.external.on_seek_finished(position_ms),
        }
    }

    pub async fn fast_seek_forward(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.fast_seek_forward().await,
            PlayerType::External => {
                if let Err(e) = self.external.fast_seek_forward().await {
                    debug!(error = %e, "Fast seek forward ignored");
                }
            }
        }
    }

    pub async fn fast_seek_backward(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.fast_seek_backward().await,
            PlayerType::External => {
                if let Err(e) = self.external.fast_seek_backward().await {
                    debug!(error = %e, "Fast seek backward ignored");
                }
            }
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        match self.active_type() {
            PlayerType::Library => self.library.repeat_mode(),
            PlayerType::External => self.external.repeat_mode(),
        }
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        match self.active_type() {
            PlayerType::Library => self.library.set_repeat_mode(mode),
            PlayerType::External => self.external.set_repeat_mode(mode),
        }
    }

    pub fn change_repeat_mode(&self) {
        match self.active_type() {
            PlayerType::Library => self.library.change_repeat_mode(),
            PlayerType::External => self.external.change_repeat_mode(),
        }
    }

    pub async fn set_random_playing_enabled(&self, enabled: bool) {
        self.library.set_random_playing_enabled(enabled).await;
    }

    pub async fn change_random_playing_mode(&self) {
        self.library.change_random_playing_mode().await;
    }

    pub fn set_playback_speed(&self, speed: f32) {
        match self.active_type() {
            PlayerType::Library => self.library.set_playback_speed(speed),
            PlayerType::External => self.external.set_playback_speed(speed),
        }
    }

    pub fn active_player_type(&self) -> watch::Receiver<PlayerType> {
        self.coordinator.active_player_type()
    }

    pub fn player_state(&self) -> BoxStream<'static, PlayerState> {
        let coordinator = Arc::clone(&self.coordinator);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            watch_stream(coordinator.player_state(player_type))
        })
    }

    pub fn is_playing(&self) -> BoxStream<'static, bool> {
        let coordinator = Arc::clone(&self.coordinator);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            watch_stream(coordinator.is_playing(player_type))
        })
    }

    pub fn track_position(&self) -> BoxStream<'static, u64> {
        let library = Arc::clone(&self.library);
        let external = Arc::clone(&self.external);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            match player_type {
                PlayerType::Library => watch_stream(library.track_position()),
                PlayerType::External => watch_stream(external.track_position()),
            }
        })
    }

    pub fn repeat_mode_updates(&self) -> BoxStream<'static, RepeatMode> {
        let library = Arc::clone(&self.library);
        let external = Arc::clone(&self.external);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            match player_type {
                PlayerType::Library => watch_stream(library.repeat_mode_updates()),
                PlayerType::External => watch_stream(external.repeat_mode_updates()),
            }
        })
    }

    /// Random playing of the library; always `false` while an external file plays.
    pub fn random_playing_updates(&self) -> BoxStream<'static, bool> {
        let library = Arc::clone(&self.library);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            match player_type {
                PlayerType::Library => watch_stream(library.random_playing_updates()),
                PlayerType::External => stream::once(async { false }).boxed(),
            }
        })
    }

    pub fn playback_speed_updates(&self) -> BoxStream<'static, f32> {
        let library = Arc::clone(&self.library);
        let external = Arc::clone(&self.external);
        switch_map(watch_stream(self.active_player_type()), move |player_type| {
            match player_type {
                PlayerType::Library => watch_stream(library.playback_speed_updates()),
                PlayerType::External => watch_stream(external.playback_speed_updates()),
            }
        })
    }

    pub fn speed_change_available(&self) -> BoxStream<'static, bool> {
        self.coordinator.speed_change_available()
    }
}
