//! Play queue repository trait

use crate::error::Result;
use crate::models::{Composition, CompositionId, PlayQueueEvent, PlayQueueItem, QueueItemId};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Play queue interface: ordering, the current item and per-item track positions.
#[async_trait]
pub trait PlayQueueRepository: Send + Sync {
    /// Current queue item, replaying the latest value to new subscribers.
    ///
    /// Emits again whenever the current item changes or the composition
    /// behind it is modified.
    fn current_queue_item_events(&self) -> BoxStream<'static, Result<PlayQueueEvent>>;

    /// Saved track position of a queue item, 0 when nothing was saved.
    async fn item_track_position(&self, item_id: QueueItemId) -> Result<u64>;

    /// Save the track position of the current item, no-op on an empty queue.
    async fn set_current_item_track_position(&self, position_ms: u64) -> Result<()>;

    async fn set_item_track_position(&self, item_id: QueueItemId, position_ms: u64) -> Result<()>;

    /// Advance to the next item, wrapping at the end.
    ///
    /// # Returns
    /// Queue position of the new current item
    async fn skip_to_next(&self) -> Result<usize>;

    /// Move to the previous item, wrapping at the start.
    ///
    /// # Returns
    /// Queue position of the new current item
    async fn skip_to_previous(&self) -> Result<usize>;

    /// Make `item_id` the current item.
    ///
    /// # Errors
    /// Returns `NotFound` if the item is not queued
    async fn skip_to_item(&self, item_id: QueueItemId) -> Result<()>;

    /// Item that [`skip_to_next`](Self::skip_to_next) would select.
    async fn next_queue_item_id(&self) -> Result<Option<QueueItemId>>;

    async fn is_current_composition_at_end_of_queue(&self) -> Result<bool>;

    async fn set_random_playing_enabled(&self, enabled: bool) -> Result<()>;

    fn play_queue_size_events(&self) -> BoxStream<'static, usize>;

    /// Queue position of the current item, `None` for an empty queue.
    fn current_item_position_events(&self) -> BoxStream<'static, Option<usize>>;

    fn play_queue_events(&self) -> BoxStream<'static, Vec<PlayQueueItem>>;

    async fn swap_items(&self, first: &PlayQueueItem, second: &PlayQueueItem) -> Result<()>;

    /// Remove an item; it can be brought back once with
    /// [`restore_deleted_item`](Self::restore_deleted_item).
    async fn remove_queue_item(&self, item: &PlayQueueItem) -> Result<()>;

    async fn restore_deleted_item(&self) -> Result<()>;

    async fn add_compositions_to_play_next(&self, compositions: &[Composition]) -> Result<()>;

    async fn add_compositions_to_end(&self, compositions: &[Composition]) -> Result<()>;

    async fn clear_play_queue(&self) -> Result<()>;

    /// Replace the queue.
    ///
    /// # Arguments
    /// * `composition_ids` - New queue content, in order
    /// * `start_position` - Queue position of the first current item, `None` for the first one
    async fn set_play_queue(
        &self,
        composition_ids: &[CompositionId],
        start_position: Option<usize>,
    ) -> Result<()>;
}
