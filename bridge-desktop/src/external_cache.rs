//! Local copy of the last externally opened audio file.
//!
//! Files opened through "open with" are read through a grant that the host may
//! revoke while the track plays. The cache copies the file into a private
//! directory so a later re-resolution can fall back to the copy. Only one file
//! is kept: starting a new copy deletes every other file in the directory.
//!
//! Cache file names are `<sanitized last path segment>___<url-safe base64
//! display name>`, so a lookup by source needs no index and still recovers the
//! display name.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use bridge_traits::playback::CompositionContentSource;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const FILENAME_SEPARATOR: &str = "___";
const MAX_PART_LEN: usize = 100;
const UNKNOWN_FILE: &str = "unknown_file";
const UNDECODED_DISPLAY_NAME: &str = "undecoded_display_name";

/// A completed cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAudioFile {
    pub path: PathBuf,
    pub display_name: String,
    pub size: u64,
}

type WriteOperation = Shared<BoxFuture<'static, Option<CachedAudioFile>>>;

pub struct ExternalAudioFileCache {
    cache_dir: PathBuf,
    writes: Arc<Mutex<HashMap<String, WriteOperation>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ExternalAudioFileCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            writes: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Start copying `readable_path` (the file behind `source`) into the cache.
    ///
    /// Returns immediately. A copy already running for the same source is left
    /// alone. Must be called inside a Tokio runtime.
    pub fn start_saving(
        &self,
        source: &CompositionContentSource,
        readable_path: &Path,
        display_name: &str,
    ) {
        let key = source_key(source);
        let mut writes = self.writes.lock();
        if writes.contains_key(&key) {
            return;
        }

        let cache_dir = self.cache_dir.clone();
        let target = cache_dir.join(cache_file_name(source, display_name));
        let original = readable_path.to_path_buf();
        let display_name = display_name.to_string();
        let registry = Arc::downgrade(&self.writes);
        let write_key = key.clone();

        let operation = async move {
            delete_cached_files(&cache_dir).await;
            let result = copy_into_cache(&cache_dir, &original, &target).await;
            if let Some(registry) = registry.upgrade() {
                registry.lock().remove(&write_key);
            }
            match result {
                Ok(size) => {
                    debug!(file = %target.display(), size, "Cached external audio file");
                    Some(CachedAudioFile {
                        path: target,
                        display_name,
                        size,
                    })
                }
                Err(error) => {
                    warn!(file = %original.display(), %error, "Failed to cache external audio file");
                    if let Err(error) = tokio::fs::remove_file(&target).await {
                        if error.kind() != std::io::ErrorKind::NotFound {
                            warn!(file = %target.display(), %error, "Failed to delete partial cache file");
                        }
                    }
                    None
                }
            }
        }
        .boxed()
        .shared();

        writes.insert(key, operation.clone());
        drop(writes);

        let handle = tokio::spawn(async move {
            operation.await;
        });
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Cached copy of `source`, waiting for an in-flight copy if there is one.
    pub async fn cached_file(&self, source: &CompositionContentSource) -> Option<CachedAudioFile> {
        let pending = self.writes.lock().get(&source_key(source)).cloned();
        if let Some(operation) = pending {
            return operation.await;
        }
        self.find_cached_file(source).await
    }

    /// Cancel running copies and delete every cached file.
    pub async fn clear(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.writes.lock().clear();
        delete_cached_files(&self.cache_dir).await;
    }

    async fn find_cached_file(&self, source: &CompositionContentSource) -> Option<CachedAudioFile> {
        let prefix = format!("{}{}", sanitized_segment(source), FILENAME_SEPARATOR);
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(encoded) = name.strip_prefix(&prefix) else {
                continue;
            };
            let size = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata.len(),
                _ => continue,
            };
            return Some(CachedAudioFile {
                path: entry.path(),
                display_name: decode_display_name(encoded),
                size,
            });
        }
        None
    }
}

impl Drop for ExternalAudioFileCache {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn copy_into_cache(cache_dir: &Path, original: &Path, target: &Path) -> std::io::Result<u64> {
    tokio::fs::create_dir_all(cache_dir).await?;
    tokio::fs::copy(original, target).await
}

async fn delete_cached_files(cache_dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(cache_dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Err(error) = tokio::fs::remove_file(entry.path()).await {
            warn!(file = %entry.path().display(), %error, "Failed to delete cached file");
        }
    }
}

fn source_key(source: &CompositionContentSource) -> String {
    match source {
        CompositionContentSource::LocalFile { path } => path.to_string_lossy().into_owned(),
        CompositionContentSource::ContentUri { uri } => uri.clone(),
        CompositionContentSource::RemoteStream { url } => url.clone(),
    }
}

fn cache_file_name(source: &CompositionContentSource, display_name: &str) -> String {
    format!(
        "{}{}{}",
        sanitized_segment(source),
        FILENAME_SEPARATOR,
        encode_display_name(display_name)
    )
}

fn sanitized_segment(source: &CompositionContentSource) -> String {
    let key = source_key(source);
    let segment = key
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(UNKNOWN_FILE);
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_PART_LEN)
        .collect()
}

fn encode_display_name(display_name: &str) -> String {
    let truncated: String = display_name.chars().take(MAX_PART_LEN).collect();
    URL_SAFE.encode(truncated.as_bytes())
}

fn decode_display_name(encoded: &str) -> String {
    URL_SAFE
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| {
            warn!(encoded, "Cached file name carries an unreadable display name");
            UNDECODED_DISPLAY_NAME.to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_sanitizes_last_segment() {
        let source =
            CompositionContentSource::content_uri("content://media/external/audio/My Song (1).mp3");

        let name = cache_file_name(&source, "My Song (1).mp3");

        assert!(name.starts_with("My_Song__1_.mp3___"));
        assert_eq!(
            decode_display_name(name.trim_start_matches("My_Song__1_.mp3___")),
            "My Song (1).mp3"
        );
    }

    #[test]
    fn test_segment_falls_back_for_empty_path() {
        let source = CompositionContentSource::content_uri("");
        assert_eq!(sanitized_segment(&source), UNKNOWN_FILE);
    }

    #[test]
    fn test_display_name_is_url_safe() {
        let encoded = encode_display_name("??>>??.mp3");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
    }

    #[test]
    fn test_undecodable_display_name() {
        assert_eq!(decode_display_name("%%%"), UNDECODED_DISPLAY_NAME);
    }
}
