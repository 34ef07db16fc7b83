//! Fakes shared by the interactor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::playback::CompositionContentSource;
use core_library::stream::watch_stream;
use core_library::{
    Composition, CompositionId, CorruptionType, DeletedComposition, ExternalCompositionSource,
    ExternalFileReference, ExternalMediaSourceRepository, LibraryError, LibraryRepository,
    PlayQueueEvent, PlayQueueItem, PlayQueueRepository, QueueItemId,
};
use core_playback::{
    CleanupCallback, CompositionSource, PlaybackError, PlayerCoordinator, PlayerEvent,
    PlayerState, PlayerType, Result,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};

// =============================================================================
// Helpers
// =============================================================================

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn composition(id: i64) -> Composition {
    Composition::new(
        id,
        format!("Track {}", id),
        CompositionContentSource::local(format!("/music/{}.mp3", id)),
    )
    .with_duration(180_000)
}

pub fn queue_item(id: i64) -> PlayQueueItem {
    PlayQueueItem::new(id, composition(id))
}

pub fn library_source(id: i64) -> CompositionSource {
    CompositionSource::Library(queue_item(id))
}

pub fn external_file() -> ExternalFileReference {
    ExternalFileReference::new(CompositionContentSource::content_uri(
        "content://downloads/public/track.mp3",
    ))
}

pub fn external_source() -> CompositionSource {
    CompositionSource::External(ExternalCompositionSource::new(
        external_file().source,
        "track.mp3",
    ))
}

fn slot(player_type: PlayerType) -> usize {
    match player_type {
        PlayerType::Library => 0,
        PlayerType::External => 1,
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Prepare {
        player_type: PlayerType,
        source: CompositionSource,
        position_ms: u64,
    },
    Play(PlayerType),
    PlayOrPause(PlayerType),
    Pause(PlayerType),
    Stop(PlayerType),
    Reset(PlayerType, bool),
    PlayAfterPrepare(PlayerType),
    UpdateSource(PlayerType),
    SeekStarted(PlayerType),
    SeekFinished(PlayerType, u64),
    Speed(PlayerType, f32),
    Error(PlayerType, PlaybackError),
}

/// Coordinator that records commands and lets tests drive its observables.
pub struct RecordingCoordinator {
    calls: Mutex<Vec<Call>>,
    events: [broadcast::Sender<PlayerEvent>; 2],
    states: [watch::Sender<PlayerState>; 2],
    is_playing: [watch::Sender<bool>; 2],
    positions: [watch::Sender<u64>; 2],
    errors: [broadcast::Sender<PlaybackError>; 2],
    active: watch::Sender<PlayerType>,
    pub actual_position: AtomicU64,
    cleanup: Mutex<HashMap<PlayerType, Vec<CleanupCallback>>>,
}

impl Default for RecordingCoordinator {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events: [broadcast::channel(16).0, broadcast::channel(16).0],
            states: [watch::Sender::new(PlayerState::Idle), watch::Sender::new(PlayerState::Idle)],
            is_playing: [watch::Sender::new(false), watch::Sender::new(false)],
            positions: [watch::Sender::new(0), watch::Sender::new(0)],
            errors: [broadcast::channel(16).0, broadcast::channel(16).0],
            active: watch::Sender::new(PlayerType::Library),
            actual_position: AtomicU64::new(0),
            cleanup: Mutex::new(HashMap::new()),
        }
    }
}

impl RecordingCoordinator {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    pub fn has(&self, call: &Call) -> bool {
        self.calls.lock().contains(call)
    }

    pub fn prepares(&self, player_type: PlayerType) -> Vec<(CompositionSource, u64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Prepare {
                    player_type: t,
                    source,
                    position_ms,
                } if *t == player_type => Some((source.clone(), *position_ms)),
                _ => None,
            })
            .collect()
    }

    pub fn emit(&self, player_type: PlayerType, event: PlayerEvent) {
        self.events[slot(player_type)].send(event).unwrap();
    }

    pub fn set_state(&self, player_type: PlayerType, state: PlayerState) {
        self.states[slot(player_type)].send_replace(state);
    }

    pub fn set_position(&self, player_type: PlayerType, position_ms: u64) {
        self.positions[slot(player_type)].send_replace(position_ms);
    }

    pub fn set_active(&self, player_type: PlayerType) {
        self.active.send_replace(player_type);
    }

    pub fn event_subscribers(&self, player_type: PlayerType) -> usize {
        self.events[slot(player_type)].receiver_count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PlayerCoordinator for RecordingCoordinator {
    fn prepare_to_play(
        &self,
        source: CompositionSource,
        player_type: PlayerType,
        start_position_ms: u64,
    ) {
        self.record(Call::Prepare {
            player_type,
            source,
            position_ms: start_position_ms,
        });
    }

    fn play(&self, player_type: PlayerType, _delay: Duration) {
        self.record(Call::Play(player_type));
    }

    fn play_or_pause(&self, player_type: PlayerType) {
        self.record(Call::PlayOrPause(player_type));
    }

    fn pause(&self, player_type: PlayerType) {
        self.record(Call::Pause(player_type));
    }

    fn stop(&self, player_type: PlayerType) {
        self.record(Call::Stop(player_type));
    }

    fn reset(&self, player_type: PlayerType, clear_completely: bool) {
        self.record(Call::Reset(player_type, clear_completely));
        if clear_completely {
            if let Some(callbacks) = self.cleanup.lock().get(&player_type) {
                for callback in callbacks {
                    callback();
                }
            }
        }
    }

    fn play_after_prepare(&self, player_type: PlayerType) {
        self.record(Call::PlayAfterPrepare(player_type));
    }

    fn update_source(&self, _source: CompositionSource, player_type: PlayerType) {
        self.record(Call::UpdateSource(player_type));
    }

    fn on_seek_started(&self, player_type: PlayerType) {
        self.record(Call::SeekStarted(player_type));
    }

    fn on_seek_finished(&self, position_ms: u64, player_type: PlayerType) {
        self.record(Call::SeekFinished(player_type, position_ms));
    }

    async fn fast_seek_forward(&self, _player_type: PlayerType) -> Result<u64> {
        Ok(self.actual_position.load(Ordering::SeqCst) + 10_000)
    }

    async fn fast_seek_backward(&self, _player_type: PlayerType) -> Result<u64> {
        Ok(self
            .actual_position
            .load(Ordering::SeqCst)
            .saturating_sub(10_000))
    }

    fn set_playback_speed(&self, speed: f32, player_type: PlayerType) {
        self.record(Call::Speed(player_type, speed));
    }

    fn error(&self, player_type: PlayerType, error: PlaybackError) {
        self.record(Call::Error(player_type, error.clone()));
        let _ = self.errors[slot(player_type)].send(error);
    }

    fn is_player_type_active(&self, player_type: PlayerType) -> bool {
        *self.active.borrow() == player_type
    }

    fn register_cleanup_callback(&self, player_type: PlayerType, callback: CleanupCallback) {
        self.cleanup
            .lock()
            .entry(player_type)
            .or_default()
            .push(callback);
    }

    fn player_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlayerEvent> {
        self.events[slot(player_type)].subscribe()
    }

    fn player_state(&self, player_type: PlayerType) -> watch::Receiver<PlayerState> {
        self.states[slot(player_type)].subscribe()
    }

    fn is_playing(&self, player_type: PlayerType) -> watch::Receiver<bool> {
        self.is_playing[slot(player_type)].subscribe()
    }

    fn track_position(&self, player_type: PlayerType) -> watch::Receiver<u64> {
        self.positions[slot(player_type)].subscribe()
    }

    async fn actual_track_position(&self, _player_type: PlayerType) -> Result<u64> {
        Ok(self.actual_position.load(Ordering::SeqCst))
    }

    fn speed_change_available(&self) -> BoxStream<'static, bool> {
        stream::once(async { true }).boxed()
    }

    fn active_player_type(&self) -> watch::Receiver<PlayerType> {
        self.active.subscribe()
    }

    fn error_events(&self, player_type: PlayerType) -> broadcast::Receiver<PlaybackError> {
        self.errors[slot(player_type)].subscribe()
    }
}

// =============================================================================
// Play Queue
// =============================================================================

/// Queue whose current item is set by the test.
pub struct FakeQueue {
    current: watch::Sender<std::result::Result<Option<PlayQueueItem>, String>>,
    pub failure: Mutex<Option<String>>,
    pub subscriptions: AtomicUsize,
    pub skip_next_calls: AtomicUsize,
    pub skip_previous_calls: AtomicUsize,
    pub at_end: AtomicBool,
    pub skip_result: AtomicUsize,
    pub saved_positions: Mutex<Vec<u64>>,
    pub item_positions: Mutex<HashMap<QueueItemId, u64>>,
}

impl FakeQueue {
    pub fn with_current(item: Option<PlayQueueItem>) -> Self {
        Self {
            current: watch::Sender::new(Ok(item)),
            failure: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            skip_next_calls: AtomicUsize::new(0),
            skip_previous_calls: AtomicUsize::new(0),
            at_end: AtomicBool::new(false),
            skip_result: AtomicUsize::new(1),
            saved_positions: Mutex::new(Vec::new()),
            item_positions: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_current(&self, item: Option<PlayQueueItem>) {
        self.current.send_replace(Ok(item));
    }

    /// Make open subscriptions yield a storage error.
    pub fn break_stream(&self, message: &str) {
        self.current.send_replace(Err(message.to_string()));
    }

    pub fn last_saved_position(&self) -> Option<u64> {
        self.saved_positions.lock().last().copied()
    }
}

#[async_trait]
impl PlayQueueRepository for FakeQueue {
    fn current_queue_item_events(
        &self,
    ) -> BoxStream<'static, core_library::Result<PlayQueueEvent>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return stream::once(async move { Err(LibraryError::Storage(message)) }).boxed();
        }
        watch_stream(self.current.subscribe())
            .map(|current| match current {
                Ok(item) => Ok(PlayQueueEvent::new(item)),
                Err(message) => Err(LibraryError::Storage(message)),
            })
            .boxed()
    }

    async fn item_track_position(&self, item_id: QueueItemId) -> core_library::Result<u64> {
        Ok(self.item_positions.lock().get(&item_id).copied().unwrap_or(0))
    }

    async fn set_current_item_track_position(&self, position_ms: u64) -> core_library::Result<()> {
        self.saved_positions.lock().push(position_ms);
        Ok(())
    }

    async fn set_item_track_position(
        &self,
        item_id: QueueItemId,
        position_ms: u64,
    ) -> core_library::Result<()> {
        self.item_positions.lock().insert(item_id, position_ms);
        Ok(())
    }

    async fn skip_to_next(&self) -> core_library::Result<usize> {
        self.skip_next_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.skip_result.load(Ordering::SeqCst))
    }

    async fn skip_to_previous(&self) -> core_library::Result<usize> {
        self.skip_previous_calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn skip_to_item(&self, _item_id: QueueItemId) -> core_library::Result<()> {
        Ok(())
    }

    async fn next_queue_item_id(&self) -> core_library::Result<Option<QueueItemId>> {
        Ok(None)
    }

    async fn is_current_composition_at_end_of_queue(&self) -> core_library::Result<bool> {
        Ok(self.at_end.load(Ordering::SeqCst))
    }

    async fn set_random_playing_enabled(&self, _enabled: bool) -> core_library::Result<()> {
        Ok(())
    }

    fn play_queue_size_events(&self) -> BoxStream<'static, usize> {
        stream::empty().boxed()
    }

    fn current_item_position_events(&self) -> BoxStream<'static, Option<usize>> {
        stream::empty().boxed()
    }

    fn play_queue_events(&self) -> BoxStream<'static, Vec<PlayQueueItem>> {
        stream::empty().boxed()
    }

    async fn swap_items(
        &self,
        _first: &PlayQueueItem,
        _second: &PlayQueueItem,
    ) -> core_library::Result<()> {
        Ok(())
    }

    async fn remove_queue_item(&self, _item: &PlayQueueItem) -> core_library::Result<()> {
        Ok(())
    }

    async fn restore_deleted_item(&self) -> core_library::Result<()> {
        Ok(())
    }

    async fn add_compositions_to_play_next(
        &self,
        _compositions: &[Composition],
    ) -> core_library::Result<()> {
        Ok(())
    }

    async fn add_compositions_to_end(
        &self,
        _compositions: &[Composition],
    ) -> core_library::Result<()> {
        Ok(())
    }

    async fn clear_play_queue(&self) -> core_library::Result<()> {
        Ok(())
    }

    async fn set_play_queue(
        &self,
        _composition_ids: &[CompositionId],
        _start_position: Option<usize>,
    ) -> core_library::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Library
// =============================================================================

#[derive(Default)]
pub struct FakeLibrary {
    pub written_errors: Mutex<Vec<(CompositionId, Option<CorruptionType>)>>,
}

#[async_trait]
impl LibraryRepository for FakeLibrary {
    fn composition_events(
        &self,
        _id: CompositionId,
    ) -> BoxStream<'static, core_library::Result<Composition>> {
        stream::empty().boxed()
    }

    async fn delete_composition(
        &self,
        composition: &Composition,
    ) -> core_library::Result<DeletedComposition> {
        Ok(DeletedComposition::from(composition))
    }

    async fn delete_compositions(
        &self,
        compositions: &[Composition],
    ) -> core_library::Result<Vec<DeletedComposition>> {
        Ok(compositions.iter().map(DeletedComposition::from).collect())
    }

    async fn write_error_about_composition(
        &self,
        corruption_type: Option<CorruptionType>,
        composition: &Composition,
    ) -> core_library::Result<()> {
        self.written_errors
            .lock()
            .push((composition.id, corruption_type));
        Ok(())
    }

    fn lyrics_events(&self, _id: CompositionId) -> BoxStream<'static, Option<String>> {
        stream::once(async { None }).boxed()
    }
}

// =============================================================================
// External Files
// =============================================================================

/// Resolver that counts calls and can be held open by the test.
#[derive(Default)]
pub struct FakeExternalRepository {
    pub resolutions: AtomicUsize,
    pub deletions: AtomicUsize,
    pub hold: AtomicBool,
    pub gate: Notify,
    pub failure: Mutex<Option<String>>,
}

#[async_trait]
impl ExternalMediaSourceRepository for FakeExternalRepository {
    async fn composition_source(
        &self,
        file_ref: &ExternalFileReference,
    ) -> core_library::Result<ExternalCompositionSource> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(LibraryError::PermissionDenied(message));
        }
        Ok(ExternalCompositionSource::new(
            file_ref.source.clone(),
            "track.mp3",
        ))
    }

    async fn delete_all_data(&self) -> core_library::Result<()> {
        self.deletions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
