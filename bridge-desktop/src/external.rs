//! Resolution of externally opened files.

use crate::external_cache::ExternalAudioFileCache;
use async_trait::async_trait;
use bridge_traits::playback::CompositionContentSource;
use core_library::{
    error::{LibraryError, Result},
    models::{ExternalCompositionSource, ExternalFileReference},
    repositories::ExternalMediaSourceRepository,
};
use core_runtime::config::PlayerConfig;
use lofty::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const FILE_URI_SCHEME: &str = "file://";
const UNKNOWN_NAME: &str = "unknown name";

/// [`ExternalMediaSourceRepository`] over the local file system.
///
/// A source already present in the [`ExternalAudioFileCache`] is served from
/// the cached copy. Otherwise the file's name and size are read (bounded by
/// `external_metadata_timeout`) and a background copy into the cache starts.
/// Tags are then read with `lofty`, bounded by `external_tags_timeout`; a slow
/// or unreadable file yields a source with the partial metadata.
pub struct FileExternalMediaSourceRepository {
    cache: Arc<ExternalAudioFileCache>,
    metadata_timeout: Duration,
    tags_timeout: Duration,
}

impl FileExternalMediaSourceRepository {
    pub fn new(cache: Arc<ExternalAudioFileCache>, config: &PlayerConfig) -> Self {
        Self::with_timeouts(
            cache,
            config.external_metadata_timeout,
            config.external_tags_timeout,
        )
    }

    pub fn with_timeouts(
        cache: Arc<ExternalAudioFileCache>,
        metadata_timeout: Duration,
        tags_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            metadata_timeout,
            tags_timeout,
        }
    }

    async fn read_from_origin(
        &self,
        file_ref: &ExternalFileReference,
    ) -> Result<SourceBuilder> {
        let path = readable_path(&file_ref.source)?;
        let builder = tokio::time::timeout(self.metadata_timeout, read_file_info(&path))
            .await
            .map_err(|_| {
                LibraryError::Timeout(format!("reading {}", file_ref.source.log_name()))
            })??;

        self.cache
            .start_saving(&file_ref.source, &path, &builder.display_name);
        Ok(builder)
    }

    async fn read_tags(&self, builder: SourceBuilder) -> SourceBuilder {
        let fallback = builder.clone();
        let reading = tokio::task::spawn_blocking(move || read_tags_from_file(builder));

        match tokio::time::timeout(self.tags_timeout, reading).await {
            Ok(Ok(Ok(builder))) => builder,
            Ok(Ok(Err(error))) => {
                debug!(file = %fallback.path.display(), %error, "No tags read");
                fallback
            }
            Ok(Err(error)) => {
                warn!(%error, "Tag reader task failed");
                fallback
            }
            Err(_) => {
                debug!(file = %fallback.path.display(), "Tag reading timed out");
                fallback
            }
        }
    }
}

#[async_trait]
impl ExternalMediaSourceRepository for FileExternalMediaSourceRepository {
    async fn composition_source(
        &self,
        file_ref: &ExternalFileReference,
    ) -> Result<ExternalCompositionSource> {
        let builder = match self.cache.cached_file(&file_ref.source).await {
            Some(cached) => {
                debug!(file = %cached.path.display(), "Using cached external file");
                SourceBuilder::new(cached.path)
                    .display_name(cached.display_name)
                    .size(cached.size)
            }
            None => self.read_from_origin(file_ref).await?,
        };

        Ok(self.read_tags(builder).await.build())
    }

    async fn delete_all_data(&self) -> Result<()> {
        self.cache.clear().await;
        Ok(())
    }
}

/// Local path behind a source: plain paths and `file://` URIs.
fn readable_path(source: &CompositionContentSource) -> Result<PathBuf> {
    match source {
        CompositionContentSource::LocalFile { path } => Ok(path.clone()),
        CompositionContentSource::ContentUri { uri } if uri.starts_with(FILE_URI_SCHEME) => {
            Ok(PathBuf::from(&uri[FILE_URI_SCHEME.len()..]))
        }
        other => Err(LibraryError::InvalidInput {
            field: "source".to_string(),
            message: format!("{} is not readable on this platform", other.log_name()),
        }),
    }
}

/// Display name and size. Only a permission failure is fatal: without read
/// access there is nothing else to try.
async fn read_file_info(path: &Path) -> Result<SourceBuilder> {
    let fallback_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    let size = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == ErrorKind::PermissionDenied => {
            return Err(LibraryError::PermissionDenied(error.to_string()));
        }
        Err(error) => {
            debug!(file = %path.display(), %error, "File info unavailable");
            0
        }
    };

    Ok(SourceBuilder::new(path.to_path_buf())
        .display_name(fallback_name)
        .size(size))
}

fn read_tags_from_file(builder: SourceBuilder) -> std::result::Result<SourceBuilder, lofty::error::LoftyError> {
    let tagged_file = lofty::read_from_path(&builder.path)?;
    let duration_ms = tagged_file.properties().duration().as_millis() as u64;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let builder = builder.duration(duration_ms);
    Ok(match tag {
        Some(tag) => builder
            .title(tag.title().map(|value| value.into_owned()))
            .artist(tag.artist().map(|value| value.into_owned()))
            .album(tag.album().map(|value| value.into_owned())),
        None => builder,
    })
}

#[derive(Debug, Clone)]
struct SourceBuilder {
    path: PathBuf,
    display_name: String,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    duration_ms: u64,
    size: u64,
}

impl SourceBuilder {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            display_name: UNKNOWN_NAME.to_string(),
            title: None,
            artist: None,
            album: None,
            duration_ms: 0,
            size: 0,
        }
    }

    fn display_name(mut self, display_name: String) -> Self {
        self.display_name = display_name;
        self
    }

    fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    fn title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    fn artist(mut self, artist: Option<String>) -> Self {
        self.artist = artist;
        self
    }

    fn album(mut self, album: Option<String>) -> Self {
        self.album = album;
        self
    }

    fn duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    fn build(self) -> ExternalCompositionSource {
        let mut source =
            ExternalCompositionSource::new(CompositionContentSource::local(self.path), self.display_name);
        source.title = self.title;
        source.artist = self.artist;
        source.album = self.album;
        source.duration_ms = self.duration_ms;
        source.size = self.size;
        source
    }
}
