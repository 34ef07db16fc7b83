//! Play queue playback.

use super::position_to_save;
use crate::coordinator::PlayerCoordinator;
use crate::error::{PlaybackError, Result};
use crate::models::{CompositionSource, PlayerEvent, PlayerState, PlayerType};
use crate::stream::{combine_latest, switch_map, watch_stream};
use bridge_traits::settings::{RepeatMode, SettingsRepository};
use core_library::{
    Composition, CompositionId, CurrentComposition, DeletedComposition, LibraryRepository,
    PlayQueueEvent, PlayQueueItem, PlayQueueRepository, QueueItemId,
};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PLAYER_TYPE: PlayerType = PlayerType::Library;

#[derive(Debug, Clone)]
enum PreparationOutcome {
    Prepared,
    NoCurrentItem,
    Failed(PlaybackError),
}

struct LibraryInner {
    coordinator: Arc<dyn PlayerCoordinator>,
    settings: Arc<dyn SettingsRepository>,
    queue: Arc<dyn PlayQueueRepository>,
    library: Arc<dyn LibraryRepository>,
    is_any_source_prepared: AtomicBool,
    outcomes: broadcast::Sender<PreparationOutcome>,
    source_task: Mutex<Option<JoinHandle<()>>>,
    player_events_task: Mutex<Option<JoinHandle<()>>>,
    current_item: Mutex<Option<PlayQueueItem>>,
    track_position: watch::Sender<u64>,
}

/// Keeps the current queue item prepared and its saved position consistent.
///
/// Preparation is lazy: the queue is only observed once something asks for a
/// ready source, and at most one queue subscription exists at a time.
pub struct LibraryPlayerInteractor {
    inner: Arc<LibraryInner>,
}

impl LibraryPlayerInteractor {
    pub fn new(
        coordinator: Arc<dyn PlayerCoordinator>,
        settings: Arc<dyn SettingsRepository>,
        queue: Arc<dyn PlayQueueRepository>,
        library: Arc<dyn LibraryRepository>,
    ) -> Self {
        coordinator.set_playback_speed(settings.playback_speed(), PLAYER_TYPE);
        let (outcomes, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(LibraryInner {
                coordinator,
                settings,
                queue,
                library,
                is_any_source_prepared: AtomicBool::new(false),
                outcomes,
                source_task: Mutex::new(None),
                player_events_task: Mutex::new(None),
                current_item: Mutex::new(None),
                track_position: watch::Sender::new(0),
            }),
        }
    }

    /// Wait until the current queue item is handed to the coordinator.
    ///
    /// # Returns
    /// `false` when the queue has no current item
    pub async fn ensure_source_ready(&self) -> Result<bool> {
        self.inner.ensure_source_ready().await
    }

    pub async fn prepare(&self) {
        if let Err(e) = self.inner.ensure_source_ready().await {
            debug!(error = %e, "Library source not prepared");
        }
    }

    pub async fn play(&self, delay: Duration) {
        if self.inner.ready_or_log().await {
            self.inner.coordinator.play(PLAYER_TYPE, delay);
        }
    }

    pub async fn play_or_pause(&self) {
        if self.inner.ready_or_log().await {
            self.inner.coordinator.play_or_pause(PLAYER_TYPE);
        }
    }

    /// Replace the queue and start playing from `start_position`.
    pub async fn set_queue_and_play(
        &self,
        composition_ids: &[CompositionId],
        start_position: Option<usize>,
    ) -> Result<()> {
        if composition_ids.is_empty() {
            return Ok(());
        }
        let previous_id = self.inner.current_item.lock().as_ref().map(|item| item.item_id);
        self.inner
            .queue
            .set_play_queue(composition_ids, start_position)
            .await?;

        let mut events = self.inner.queue.current_queue_item_events();
        while let Some(event) = events.next().await {
            let event = event?;
            let current_id = event.item.as_ref().map(|item| item.item_id);
            if current_id != previous_id {
                break;
            }
        }

        if self.inner.ensure_source_ready().await? {
            self.inner.coordinator.play_after_prepare(PLAYER_TYPE);
        }
        Ok(())
    }

    pub fn pause(&self) {
        self.inner.coordinator.pause(PLAYER_TYPE);
    }

    pub fn stop(&self) {
        self.inner.coordinator.stop(PLAYER_TYPE);
    }

    pub fn reset(&self) {
        self.inner.coordinator.reset(PLAYER_TYPE, false);
    }

    /// Restart the current composition if it played longer than the skip
    /// constraint, otherwise move to the previous item.
    pub async fn skip_to_previous(&self) {
        let inner = &self.inner;
        let position = inner.current_track_position().await;
        if position > inner.settings.skip_constraint_millis() {
            inner.on_seek_finished(0).await;
            return;
        }
        inner.save_current_item_track_position(0).await;
        if let Err(e) = inner.queue.skip_to_previous().await {
            warn!(error = %e, "Failed to skip to previous item");
        }
    }

    pub async fn skip_to_next(&self) {
        self.inner.save_checked_track_position().await;
        if let Err(e) = self.inner.queue.skip_to_next().await {
            warn!(error = %e, "Failed to skip to next item");
        }
    }

    pub async fn skip_to_item(&self, item_id: QueueItemId) {
        self.inner.save_checked_track_position().await;
        if let Err(e) = self.inner.queue.skip_to_item(item_id).await {
            warn!(item_id = %item_id, error = %e, "Failed to skip to item");
        }
    }

    pub fn on_seek_started(&self) {
        self.inner.coordinator.on_seek_started(PLAYER_TYPE);
    }

    pub async fn on_seek_finished(&self, position_ms: u64) {
        self.inner.on_seek_finished(position_ms).await;
    }

    pub async fn fast_seek_forward(&self) {
        self.inner.fast_seek(true).await;
    }

    pub async fn fast_seek_backward(&self) {
        self.inner.fast_seek(false).await;
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.inner.settings.repeat_mode()
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.inner.settings.set_repeat_mode(mode);
    }

    /// Cycle once → queue → composition → none.
    pub fn change_repeat_mode(&self) {
        let next = match self.repeat_mode() {
            RepeatMode::PlayCompositionOnce => RepeatMode::RepeatPlayQueue,
            RepeatMode::RepeatPlayQueue => RepeatMode::RepeatComposition,
            RepeatMode::RepeatComposition => RepeatMode::None,
            RepeatMode::None => RepeatMode::PlayCompositionOnce,
        };
        self.set_repeat_mode(next);
    }

    pub fn repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.inner.settings.repeat_mode_updates()
    }

    pub fn is_random_playing_enabled(&self) -> bool {
        self.inner.settings.is_random_playing_enabled()
    }

    pub async fn set_random_playing_enabled(&self, enabled: bool) {
        if let Err(e) = self.inner.queue.set_random_playing_enabled(enabled).await {
            warn!(enabled, error = %e, "Failed to change random playing");
        }
    }

    pub async fn change_random_playing_mode(&self) {
        let enabled = !self.is_random_playing_enabled();
        self.set_random_playing_enabled(enabled).await;
    }

    pub fn random_playing_updates(&self) -> watch::Receiver<bool> {
        self.inner.settings.random_playing_updates()
    }

    pub fn playback_speed(&self) -> f32 {
        self.inner.settings.playback_speed()
    }

    pub fn set_playback_speed(&self, speed: f32) {
        self.inner.coordinator.set_playback_speed(speed, PLAYER_TYPE);
        self.inner.settings.set_playback_speed(speed);
    }

    pub fn playback_speed_updates(&self) -> watch::Receiver<f32> {
        self.inner.settings.playback_speed_updates()
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

    pub async fn actual_track_position(&self) -> u64 {
        self.inner.current_track_position().await
    }

    pub fn current_queue_item_events(&self) -> BoxStream<'static, Result<PlayQueueEvent>> {
        self.inner
            .queue
            .current_queue_item_events()
            .map(|event| event.map_err(PlaybackError::from))
            .boxed()
    }

    /// Current item together with the library player's playing flag.
    pub fn current_composition_events(&self) -> BoxStream<'static, CurrentComposition> {
        let items = self
            .inner
            .queue
            .current_queue_item_events()
            .filter_map(|event| future::ready(event.ok()))
            .boxed();
        let playing = watch_stream(self.inner.coordinator.is_playing(PLAYER_TYPE));
        combine_latest(items, playing)
            .map(|(event, is_playing)| CurrentComposition {
                item: event.item,
                is_playing,
            })
            .boxed()
    }

    pub fn current_composition_lyrics(&self) -> BoxStream<'static, Option<String>> {
        let library = Arc::clone(&self.inner.library);
        let items = self
            .inner
            .queue
            .current_queue_item_events()
            .filter_map(|event| future::ready(event.ok()))
            .boxed();
        switch_map(items, move |event| match event.item {
            Some(item) => library.lyrics_events(item.composition.id),
            None => stream::once(future::ready(None)).boxed(),
        })
    }

    pub fn composition_events(&self, id: CompositionId) -> BoxStream<'static, Result<Composition>> {
        self.inner
            .library
            .composition_events(id)
            .map(|event| event.map_err(PlaybackError::from))
            .boxed()
    }

    pub fn current_item_position_events(&self) -> BoxStream<'static, Option<usize>> {
        self.inner.queue.current_item_position_events()
    }

    pub fn play_queue_events(&self) -> BoxStream<'static, Vec<PlayQueueItem>> {
        self.inner.queue.play_queue_events()
    }

    pub fn play_queue_size_events(&self) -> BoxStream<'static, usize> {
        self.inner.queue.play_queue_size_events()
    }

    pub async fn swap_items(&self, first: &PlayQueueItem, second: &PlayQueueItem) -> Result<()> {
        Ok(self.inner.queue.swap_items(first, second).await?)
    }

    pub async fn remove_queue_item(&self, item: &PlayQueueItem) -> Result<()> {
        Ok(self.inner.queue.remove_queue_item(item).await?)
    }

    pub async fn restore_deleted_item(&self) -> Result<()> {
        Ok(self.inner.queue.restore_deleted_item().await?)
    }

    pub async fn add_compositions_to_play_next(&self, compositions: &[Composition]) -> Result<()> {
        Ok(self
            .inner
            .queue
            .add_compositions_to_play_next(compositions)
            .await?)
    }

    pub async fn add_compositions_to_end(&self, compositions: &[Composition]) -> Result<()> {
        Ok(self.inner.queue.add_compositions_to_end(compositions).await?)
    }

    pub async fn clear_play_queue(&self) -> Result<()> {
        Ok(self.inner.queue.clear_play_queue().await?)
    }

    pub async fn delete_composition(&self, composition: &Composition) -> Result<DeletedComposition> {
        Ok(self.inner.library.delete_composition(composition).await?)
    }

    pub async fn delete_compositions(
        &self,
        compositions: &[Composition],
    ) -> Result<Vec<DeletedComposition>> {
        Ok(self.inner.library.delete_compositions(compositions).await?)
    }

    /// Stop observing the queue and the player.
    pub fn release(&self) {
        for slot in [&self.inner.source_task, &self.inner.player_events_task] {
            if let Some(task) = slot.lock().take() {
                task.abort();
            }
        }
        self.inner.is_any_source_prepared.store(false, Ordering::SeqCst);
    }
}

impl Drop for LibraryPlayerInteractor {
    fn drop(&mut self) {
        self.release();
    }
}

impl LibraryInner {
    async fn ensure_source_ready(self: &Arc<Self>) -> Result<bool> {
        if self.is_any_source_prepared.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let mut outcomes = self.outcomes.subscribe();
        if self.is_any_source_prepared.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.subscribe_on_current_source();

        loop {
            match outcomes.recv().await {
                Ok(PreparationOutcome::Prepared) => return Ok(true),
                Ok(PreparationOutcome::NoCurrentItem) => return Ok(false),
                Ok(PreparationOutcome::Failed(error)) => return Err(error),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(PlaybackError::Internal(
                        "Preparation outcome channel closed".to_string(),
                    ))
                }
            }
        }
    }

    async fn ready_or_log(self: &Arc<Self>) -> bool {
        match self.ensure_source_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Library source is not ready");
                false
            }
        }
    }

    fn subscribe_on_current_source(self: &Arc<Self>) {
        let mut slot = self.source_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        debug!("Subscribing to current queue item");

        let mut events = self.queue.current_queue_item_events();
        let inner = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let outcome = match event {
                    Ok(event) => match inner.on_queue_item_changed(event).await {
                        Ok(true) => PreparationOutcome::Prepared,
                        Ok(false) => PreparationOutcome::NoCurrentItem,
                        Err(e) => PreparationOutcome::Failed(e),
                    },
                    Err(e) => PreparationOutcome::Failed(e.into()),
                };

                if let PreparationOutcome::Prepared = outcome {
                    inner.subscribe_on_player_events();
                    inner.is_any_source_prepared.store(true, Ordering::SeqCst);
                    let _ = inner.outcomes.send(outcome);
                    continue;
                }

                inner.on_source_lost(&outcome);
                let _ = inner.outcomes.send(outcome);
                return;
            }

            let outcome = PreparationOutcome::NoCurrentItem;
            inner.on_source_lost(&outcome);
            let _ = inner.outcomes.send(outcome);
        }));
    }

    /// Runs on the queue observer task once it stops; the library context no
    /// longer has a source and stops reacting to player events.
    fn on_source_lost(&self, outcome: &PreparationOutcome) {
        self.is_any_source_prepared.store(false, Ordering::SeqCst);
        *self.source_task.lock() = None;
        if let Some(task) = self.player_events_task.lock().take() {
            task.abort();
        }
        match outcome {
            PreparationOutcome::NoCurrentItem => {
                info!("Play queue has no current item");
            }
            PreparationOutcome::Failed(error) => {
                warn!(error = %error, "Failed to prepare current queue item");
            }
            PreparationOutcome::Prepared => return,
        }
        self.coordinator.reset(PLAYER_TYPE, false);
    }

    /// # Returns
    /// `false` when the queue has no current item
    async fn on_queue_item_changed(&self, event: PlayQueueEvent) -> Result<bool> {
        let previous = self.current_item.lock().clone();
        *self.current_item.lock() = event.item.clone();
        let Some(current) = event.item else {
            return Ok(false);
        };

        if let Some(previous) = previous.filter(|previous| previous.is_same_item(&current)) {
            let file_changed = current.has_source_changes(&previous);
            if file_changed {
                let position = self.current_track_position().await;
                debug!(item_id = %current.item_id, position_ms = position, "Queue item file changed");
                self.coordinator.prepare_to_play(
                    CompositionSource::Library(current),
                    PLAYER_TYPE,
                    position,
                );
            } else if !current.is_same_source(&previous) {
                self.coordinator
                    .update_source(CompositionSource::Library(current), PLAYER_TYPE);
            }
            return Ok(true);
        }

        let position = self.queue.item_track_position(current.item_id).await?;
        self.track_position.send_replace(position);
        info!(item_id = %current.item_id, position_ms = position, "Preparing queue item");
        self.coordinator
            .prepare_to_play(CompositionSource::Library(current), PLAYER_TYPE, position);
        Ok(true)
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
                            warn!(skipped, "Library player fell behind player events");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = states.borrow_and_update().clone();
                        inner.on_player_state_changed(state).await;
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

    async fn on_player_event(self: &Arc<Self>, event: PlayerEvent) {
        let Some(item) = event.source().as_library_item().cloned() else {
            return;
        };
        match event {
            PlayerEvent::Prepared { .. } => {
                if item.composition.corruption_type.is_some() {
                    self.write_corruption(None, &item.composition).await;
                }
            }
            PlayerEvent::Finished { .. } => self.on_composition_play_finished().await,
            PlayerEvent::Error { error, .. } => {
                self.handle_error_with_composition(error, item).await;
            }
        }
    }

    async fn handle_error_with_composition(&self, error: PlaybackError, item: PlayQueueItem) {
        if let PlaybackError::Acceptable(cause) = error {
            self.coordinator.error(PLAYER_TYPE, *cause);
            return;
        }
        warn!(item_id = %item.item_id, error = %error, "Composition failed to play");

        match self.queue.is_current_composition_at_end_of_queue().await {
            Ok(true) => self.coordinator.stop(PLAYER_TYPE),
            Ok(false) => {
                if let Err(e) = self.queue.skip_to_next().await {
                    warn!(error = %e, "Failed to skip past broken composition");
                }
            }
            Err(e) => warn!(error = %e, "Failed to check end of queue"),
        }

        self.write_corruption(Some(error.corruption_type()), &item.composition)
            .await;
    }

    async fn write_corruption(
        &self,
        corruption_type: Option<core_library::CorruptionType>,
        composition: &Composition,
    ) {
        if let Err(e) = self
            .library
            .write_error_about_composition(corruption_type, composition)
            .await
        {
            warn!(composition_id = %composition.id, error = %e, "Failed to write composition error");
        }
    }

    async fn on_composition_play_finished(&self) {
        match self.settings.repeat_mode() {
            RepeatMode::PlayCompositionOnce => {
                self.on_seek_finished(0).await;
                self.coordinator.pause(PLAYER_TYPE);
            }
            RepeatMode::RepeatComposition => self.on_seek_finished(0).await,
            RepeatMode::None | RepeatMode::RepeatPlayQueue => {
                self.save_current_item_track_position(0).await;
                match self.queue.next_queue_item_id().await {
                    Ok(Some(next_id)) => {
                        if let Err(e) = self.queue.set_item_track_position(next_id, 0).await {
                            warn!(item_id = %next_id, error = %e, "Failed to reset next item position");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Failed to read next queue item"),
                }
                match self.queue.skip_to_next().await {
                    Ok(position) => self.on_auto_skip_next_finished(position).await,
                    Err(e) => warn!(error = %e, "Failed to advance queue"),
                }
            }
        }
    }

    /// The queue wrapped around after the last item.
    async fn on_auto_skip_next_finished(&self, queue_position: usize) {
        if queue_position != 0 {
            return;
        }
        match self.settings.repeat_mode() {
            RepeatMode::None => {
                self.coordinator.pause(PLAYER_TYPE);
                self.on_seek_finished(0).await;
            }
            RepeatMode::RepeatPlayQueue => self.on_seek_finished(0).await,
            _ => {}
        }
    }

    async fn on_player_state_changed(&self, state: PlayerState) {
        match state {
            PlayerState::Stop => {
                self.track_position.send_replace(0);
                self.save_current_item_track_position(0).await;
            }
            PlayerState::Pause => {
                match self.coordinator.actual_track_position(PLAYER_TYPE).await {
                    Ok(position) => self.save_current_item_track_position(position).await,
                    Err(e) => debug!(error = %e, "No position to save on pause"),
                }
            }
            _ => {}
        }
    }

    async fn on_seek_finished(&self, position_ms: u64) {
        self.coordinator.on_seek_finished(position_ms, PLAYER_TYPE);
        self.track_position.send_replace(position_ms);
        self.save_current_item_track_position(position_ms).await;
    }

    async fn fast_seek(&self, forward: bool) {
        if self.coordinator.is_player_type_active(PLAYER_TYPE) {
            let result = if forward {
                self.coordinator.fast_seek_forward(PLAYER_TYPE).await
            } else {
                self.coordinator.fast_seek_backward(PLAYER_TYPE).await
            };
            match result {
                Ok(position) => {
                    self.track_position.send_replace(position);
                    self.save_current_item_track_position(position).await;
                }
                Err(e) => warn!(error = %e, "Fast seek failed"),
            }
            return;
        }

        let rewind = self.settings.rewind_value_millis() as i64;
        self.seek_by(if forward { rewind } else { -rewind }).await;
    }

    /// Seek the inactive player relative to its last known position.
    async fn seek_by(&self, delta_ms: i64) {
        let Some(item) = self.current_item.lock().clone() else {
            return;
        };
        let position = self.current_track_position().await as i64;
        let target = (position + delta_ms).max(0) as u64;
        let duration = item.composition.duration_ms;
        if duration > 0 && target > duration {
            return;
        }
        self.on_seek_finished(target).await;
    }

    async fn current_track_position(&self) -> u64 {
        if self.coordinator.is_player_type_active(PLAYER_TYPE) {
            if let Ok(position) = self.coordinator.actual_track_position(PLAYER_TYPE).await {
                return position;
            }
        }
        *self.track_position.borrow()
    }

    async fn save_current_item_track_position(&self, position_ms: u64) {
        if let Err(e) = self
            .queue
            .set_current_item_track_position(position_ms)
            .await
        {
            warn!(position_ms, error = %e, "Failed to save track position");
        }
    }

    /// Save the current position, collapsing positions near either end to 0.
    async fn save_checked_track_position(&self) {
        let Some(item) = self.current_item.lock().clone() else {
            return;
        };
        let position = self.current_track_position().await;
        let to_save = position_to_save(
            position,
            item.composition.duration_ms,
            self.settings.skip_save_start_millis(),
            self.settings.skip_save_end_millis(),
        );
        self.save_current_item_track_position(to_save).await;
    }
}
