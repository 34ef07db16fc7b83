//! External media source repository trait

use crate::error::Result;
use crate::models::{ExternalCompositionSource, ExternalFileReference};
use async_trait::async_trait;

/// Resolves files opened from outside the library into playable sources.
///
/// Implementations may copy the file into a local cache and read its tags;
/// both steps are bounded in time and fall back to partial metadata.
#[async_trait]
pub trait ExternalMediaSourceRepository: Send + Sync {
    async fn composition_source(
        &self,
        file_ref: &ExternalFileReference,
    ) -> Result<ExternalCompositionSource>;

    /// Drop every cached copy.
    async fn delete_all_data(&self) -> Result<()>;
}
