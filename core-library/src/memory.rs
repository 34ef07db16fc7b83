//! Volatile repository implementations.
//!
//! State lives in `watch` channels so every live query replays the latest value
//! to new subscribers. Nothing survives the process.

use crate::error::{LibraryError, Result};
use crate::models::{
    Composition, CompositionId, CorruptionType, DeletedComposition, PlayQueueEvent, PlayQueueItem,
    QueueItemId,
};
use crate::repositories::{LibraryRepository, PlayQueueRepository};
use crate::stream::watch_stream;
use async_trait::async_trait;
use bridge_traits::settings::SettingsRepository;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

type CompositionMap = BTreeMap<CompositionId, Composition>;

// =============================================================================
// Library
// =============================================================================

/// In-memory composition store.
pub struct InMemoryLibraryRepository {
    compositions: watch::Sender<CompositionMap>,
    lyrics: watch::Sender<BTreeMap<CompositionId, String>>,
}

impl InMemoryLibraryRepository {
    pub fn new() -> Self {
        Self {
            compositions: watch::Sender::new(CompositionMap::new()),
            lyrics: watch::Sender::new(BTreeMap::new()),
        }
    }

    pub fn with_compositions(compositions: impl IntoIterator<Item = Composition>) -> Self {
        let repository = Self::new();
        for composition in compositions {
            repository.upsert(composition);
        }
        repository
    }

    /// Insert or replace a composition.
    pub fn upsert(&self, composition: Composition) {
        self.compositions.send_if_modified(|all| {
            if all.get(&composition.id) == Some(&composition) {
                return false;
            }
            all.insert(composition.id, composition);
            true
        });
    }

    pub fn set_lyrics(&self, id: CompositionId, lyrics: impl Into<String>) {
        self.lyrics.send_modify(|all| {
            all.insert(id, lyrics.into());
        });
    }

    pub fn get(&self, id: CompositionId) -> Option<Composition> {
        self.compositions.borrow().get(&id).cloned()
    }

    fn subscribe(&self) -> watch::Receiver<CompositionMap> {
        self.compositions.subscribe()
    }

    fn remove(&self, composition: &Composition) -> Result<DeletedComposition> {
        let mut removed = None;
        self.compositions.send_if_modified(|all| {
            removed = all.remove(&composition.id);
            removed.is_some()
        });
        removed
            .as_ref()
            .map(DeletedComposition::from)
            .ok_or_else(|| LibraryError::not_found("Composition", composition.id))
    }
}

impl Default for InMemoryLibraryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryRepository for InMemoryLibraryRepository {
    fn composition_events(&self, id: CompositionId) -> BoxStream<'static, Result<Composition>> {
        watch_stream(self.subscribe())
            .map(move |all| all.get(&id).cloned())
            .take_while(|composition| future::ready(composition.is_some()))
            .filter_map(|composition| future::ready(composition.map(Ok)))
            .boxed()
    }

    async fn delete_composition(&self, composition: &Composition) -> Result<DeletedComposition> {
        self.remove(composition)
    }

    async fn delete_compositions(
        &self,
        compositions: &[Composition],
    ) -> Result<Vec<DeletedComposition>> {
        compositions
            .iter()
            .map(|composition| self.remove(composition))
            .collect()
    }

    async fn write_error_about_composition(
        &self,
        corruption_type: Option<CorruptionType>,
        composition: &Composition,
    ) -> Result<()> {
        let mut found = false;
        self.compositions.send_if_modified(|all| match all.get_mut(&composition.id) {
            Some(stored) => {
                found = true;
                if stored.corruption_type == corruption_type {
                    return false;
                }
                stored.corruption_type = corruption_type;
                true
            }
            None => false,
        });
        if !found {
            return Err(LibraryError::not_found("Composition", composition.id));
        }
        debug!(composition_id = %composition.id, ?corruption_type, "Stored corruption type");
        Ok(())
    }

    fn lyrics_events(&self, id: CompositionId) -> BoxStream<'static, Option<String>> {
        watch_stream(self.lyrics.subscribe())
            .map(move |all| all.get(&id).cloned())
            .boxed()
    }
}

// =============================================================================
// Play Queue
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct QueueEntry {
    item_id: QueueItemId,
    composition_id: CompositionId,
}

#[derive(Debug, Clone, Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    current: Option<QueueItemId>,
}

impl QueueState {
    fn current_index(&self) -> Option<usize> {
        let current = self.current?;
        self.entries.iter().position(|entry| entry.item_id == current)
    }

    fn index_of(&self, item_id: QueueItemId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.item_id == item_id)
    }

    fn resolve(entry: &QueueEntry, compositions: &CompositionMap) -> Option<PlayQueueItem> {
        compositions
            .get(&entry.composition_id)
            .map(|composition| PlayQueueItem {
                item_id: entry.item_id,
                composition: composition.clone(),
            })
    }

    fn current_event(&self, compositions: &CompositionMap) -> PlayQueueEvent {
        let item = self
            .current_index()
            .and_then(|index| Self::resolve(&self.entries[index], compositions));
        PlayQueueEvent::new(item)
    }

    fn items(&self, compositions: &CompositionMap) -> Vec<PlayQueueItem> {
        self.entries
            .iter()
            .filter_map(|entry| Self::resolve(entry, compositions))
            .collect()
    }
}

/// In-memory play queue over an [`InMemoryLibraryRepository`].
///
/// The random-playing flag is stored in settings; queue order is left as is.
pub struct InMemoryPlayQueueRepository {
    library: Arc<InMemoryLibraryRepository>,
    settings: Arc<dyn SettingsRepository>,
    state: watch::Sender<QueueState>,
    write_lock: Mutex<()>,
    positions: Mutex<HashMap<QueueItemId, u64>>,
    last_deleted: Mutex<Option<(usize, QueueEntry)>>,
    next_item_id: Mutex<i64>,
}

impl InMemoryPlayQueueRepository {
    pub fn new(
        library: Arc<InMemoryLibraryRepository>,
        settings: Arc<dyn SettingsRepository>,
    ) -> Self {
        Self {
            library,
            settings,
            state: watch::Sender::new(QueueState::default()),
            write_lock: Mutex::new(()),
            positions: Mutex::new(HashMap::new()),
            last_deleted: Mutex::new(None),
            next_item_id: Mutex::new(1),
        }
    }

    fn new_entries(&self, compositions: impl IntoIterator<Item = CompositionId>) -> Vec<QueueEntry> {
        let mut next_id = self.next_item_id.lock();
        compositions
            .into_iter()
            .map(|composition_id| {
                let item_id = QueueItemId(*next_id);
                *next_id += 1;
                QueueEntry {
                    item_id,
                    composition_id,
                }
            })
            .collect()
    }

    /// Apply `f` to a copy of the state and publish it; writers are serialized.
    fn mutate<R>(&self, f: impl FnOnce(&mut QueueState) -> R) -> R {
        let _guard = self.write_lock.lock();
        let mut state = self.state.borrow().clone();
        let output = f(&mut state);
        self.state.send_replace(state);
        output
    }

    fn skip_by(&self, forward: bool) -> usize {
        self.mutate(|state| {
            let len = state.entries.len();
            let Some(index) = state.current_index() else {
                return 0;
            };
            let target = if forward {
                (index + 1) % len
            } else {
                (index + len - 1) % len
            };
            state.current = Some(state.entries[target].item_id);
            target
        })
    }

    fn insert_at(&self, index: Option<usize>, compositions: &[Composition]) {
        let entries = self.new_entries(compositions.iter().map(|composition| composition.id));
        if entries.is_empty() {
            return;
        }
        self.mutate(|state| {
            let at = index
                .map(|at| at.min(state.entries.len()))
                .unwrap_or(state.entries.len());
            if state.current.is_none() {
                state.current = Some(entries[0].item_id);
            }
            state.entries.splice(at..at, entries);
        });
    }
}

#[async_trait]
impl PlayQueueRepository for InMemoryPlayQueueRepository {
    fn current_queue_item_events(&self) -> BoxStream<'static, Result<PlayQueueEvent>> {
        let queue_rx = self.state.subscribe();
        let library_rx = self.library.subscribe();
        stream::unfold(
            (queue_rx, library_rx, None::<PlayQueueEvent>),
            |(mut queue_rx, mut library_rx, last)| async move {
                loop {
                    if last.is_some() {
                        tokio::select! {
                            changed = queue_rx.changed() => changed.ok()?,
                            changed = library_rx.changed() => changed.ok()?,
                        }
                    }
                    let event = {
                        let compositions = library_rx.borrow_and_update();
                        queue_rx.borrow_and_update().current_event(&compositions)
                    };
                    if last.as_ref() != Some(&event) {
                        return Some((Ok(event.clone()), (queue_rx, library_rx, Some(event))));
                    }
                }
            },
        )
        .boxed()
    }

    async fn item_track_position(&self, item_id: QueueItemId) -> Result<u64> {
        Ok(self.positions.lock().get(&item_id).copied().unwrap_or(0))
    }

    async fn set_current_item_track_position(&self, position_ms: u64) -> Result<()> {
        let current = self.state.borrow().current;
        if let Some(item_id) = current {
            self.positions.lock().insert(item_id, position_ms);
        }
        Ok(())
    }

    async fn set_item_track_position(&self, item_id: QueueItemId, position_ms: u64) -> Result<()> {
        self.positions.lock().insert(item_id, position_ms);
        Ok(())
    }

    async fn skip_to_next(&self) -> Result<usize> {
        Ok(self.skip_by(true))
    }

    async fn skip_to_previous(&self) -> Result<usize> {
        Ok(self.skip_by(false))
    }

    async fn skip_to_item(&self, item_id: QueueItemId) -> Result<()> {
        self.mutate(|state| match state.index_of(item_id) {
            Some(_) => {
                state.current = Some(item_id);
                Ok(())
            }
            None => Err(LibraryError::not_found("PlayQueueItem", item_id)),
        })
    }

    async fn next_queue_item_id(&self) -> Result<Option<QueueItemId>> {
        let state = self.state.borrow();
        let len = state.entries.len();
        Ok(state
            .current_index()
            .map(|index| state.entries[(index + 1) % len].item_id))
    }

    async fn is_current_composition_at_end_of_queue(&self) -> Result<bool> {
        let state = self.state.borrow();
        Ok(match state.current_index() {
            Some(index) => index + 1 == state.entries.len(),
            None => true,
        })
    }

    async fn set_random_playing_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_random_playing_enabled(enabled);
        Ok(())
    }

    fn play_queue_size_events(&self) -> BoxStream<'static, usize> {
        watch_stream(self.state.subscribe())
            .map(|state| state.entries.len())
            .boxed()
    }

    fn current_item_position_events(&self) -> BoxStream<'static, Option<usize>> {
        watch_stream(self.state.subscribe())
            .map(|state| state.current_index())
            .boxed()
    }

    fn play_queue_events(&self) -> BoxStream<'static, Vec<PlayQueueItem>> {
        let library = Arc::clone(&self.library);
        watch_stream(self.state.subscribe())
            .map(move |state| state.items(&library.compositions.borrow()))
            .boxed()
    }

    async fn swap_items(&self, first: &PlayQueueItem, second: &PlayQueueItem) -> Result<()> {
        self.mutate(|state| {
            let a = state
                .index_of(first.item_id)
                .ok_or_else(|| LibraryError::not_found("PlayQueueItem", first.item_id))?;
            let b = state
                .index_of(second.item_id)
                .ok_or_else(|| LibraryError::not_found("PlayQueueItem", second.item_id))?;
            state.entries.swap(a, b);
            Ok(())
        })
    }

    async fn remove_queue_item(&self, item: &PlayQueueItem) -> Result<()> {
        let removed = self.mutate(|state| {
            let index = state.index_of(item.item_id)?;
            let entry = state.entries.remove(index);
            if state.current == Some(entry.item_id) {
                state.current = if state.entries.is_empty() {
                    None
                } else {
                    Some(state.entries[index.min(state.entries.len() - 1)].item_id)
                };
            }
            Some((index, entry))
        });
        match removed {
            Some(removed) => {
                *self.last_deleted.lock() = Some(removed);
                Ok(())
            }
            None => Err(LibraryError::not_found("PlayQueueItem", item.item_id)),
        }
    }

    async fn restore_deleted_item(&self) -> Result<()> {
        let Some((index, entry)) = self.last_deleted.lock().take() else {
            return Ok(());
        };
        self.mutate(|state| {
            let at = index.min(state.entries.len());
            state.entries.insert(at, entry);
            if state.current.is_none() {
                state.current = Some(entry.item_id);
            }
        });
        Ok(())
    }

    async fn add_compositions_to_play_next(&self, compositions: &[Composition]) -> Result<()> {
        let at = self.state.borrow().current_index().map(|index| index + 1);
        self.insert_at(at, compositions);
        Ok(())
    }

    async fn add_compositions_to_end(&self, compositions: &[Composition]) -> Result<()> {
        self.insert_at(None, compositions);
        Ok(())
    }

    async fn clear_play_queue(&self) -> Result<()> {
        self.mutate(|state| *state = QueueState::default());
        self.positions.lock().clear();
        Ok(())
    }

    async fn set_play_queue(
        &self,
        composition_ids: &[CompositionId],
        start_position: Option<usize>,
    ) -> Result<()> {
        let known: Vec<CompositionId> = composition_ids
            .iter()
            .copied()
            .filter(|id| self.library.get(*id).is_some())
            .collect();
        if known.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "composition_ids".to_string(),
                message: "no known compositions".to_string(),
            });
        }
        let entries = self.new_entries(known);
        let start = start_position.unwrap_or(0).min(entries.len() - 1);
        self.mutate(|state| {
            state.current = Some(entries[start].item_id);
            state.entries = entries;
        });
        debug!(start, "Play queue replaced");
        Ok(())
    }
}
