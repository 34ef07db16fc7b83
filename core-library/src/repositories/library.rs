//! Library repository trait

use crate::error::Result;
use crate::models::{Composition, CompositionId, CorruptionType, DeletedComposition};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Composition storage as used by the player.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Live view of one composition; ends when the composition is deleted.
    fn composition_events(&self, id: CompositionId) -> BoxStream<'static, Result<Composition>>;

    async fn delete_composition(&self, composition: &Composition) -> Result<DeletedComposition>;

    async fn delete_compositions(
        &self,
        compositions: &[Composition],
    ) -> Result<Vec<DeletedComposition>>;

    /// Persist why `composition` failed to play; `None` clears a stored error.
    async fn write_error_about_composition(
        &self,
        corruption_type: Option<CorruptionType>,
        composition: &Composition,
    ) -> Result<()>;

    fn lyrics_events(&self, id: CompositionId) -> BoxStream<'static, Option<String>>;
}
