//! External file resolution against a temporary directory.

use bridge_desktop::{ExternalAudioFileCache, FileExternalMediaSourceRepository};
use bridge_traits::playback::CompositionContentSource;
use core_library::{ExternalFileReference, ExternalMediaSourceRepository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    files: TempDir,
    cache_dir: TempDir,
    cache: Arc<ExternalAudioFileCache>,
    repository: FileExternalMediaSourceRepository,
}

fn fixture() -> Fixture {
    let files = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ExternalAudioFileCache::new(cache_dir.path().join("external")));
    let repository = FileExternalMediaSourceRepository::with_timeouts(
        cache.clone(),
        Duration::from_secs(2),
        Duration::from_secs(2),
    );
    Fixture {
        files,
        cache_dir,
        cache,
        repository,
    }
}

impl Fixture {
    fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.files.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn cached_names(&self) -> Vec<String> {
        let dir = self.cache_dir.path().join("external");
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn file_uri(path: &Path) -> ExternalFileReference {
    ExternalFileReference::new(CompositionContentSource::content_uri(format!(
        "file://{}",
        path.display()
    )))
}

#[tokio::test]
async fn test_first_resolution_reads_original_file() {
    let fixture = fixture();
    let path = fixture.write_file("track.mp3", b"not really audio");

    let source = fixture
        .repository
        .composition_source(&file_uri(&path))
        .await
        .unwrap();

    assert_eq!(source.source, CompositionContentSource::local(&path));
    assert_eq!(source.display_name, "track.mp3");
    assert_eq!(source.size, 16);
    // Unreadable tags leave the partial metadata in place
    assert_eq!(source.title, None);
    assert_eq!(source.duration_ms, 0);
}

#[tokio::test]
async fn test_second_resolution_uses_cached_copy() {
    let fixture = fixture();
    let path = fixture.write_file("track.mp3", b"0123456789");
    let file_ref = file_uri(&path);

    fixture.repository.composition_source(&file_ref).await.unwrap();
    let source = fixture.repository.composition_source(&file_ref).await.unwrap();

    let CompositionContentSource::LocalFile { path: cached } = &source.source else {
        panic!("expected a local file, got {:?}", source.source);
    };
    assert!(cached.starts_with(fixture.cache_dir.path()));
    assert_eq!(source.display_name, "track.mp3");
    assert_eq!(source.size, 10);
    assert_eq!(std::fs::read(cached).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_lookup_waits_for_copy_in_progress() {
    let fixture = fixture();
    let path = fixture.write_file("song.flac", &[7u8; 64 * 1024]);
    let source = CompositionContentSource::local(&path);

    fixture.cache.start_saving(&source, &path, "Song");
    let cached = fixture.cache.cached_file(&source).await.unwrap();

    assert_eq!(cached.display_name, "Song");
    assert_eq!(cached.size, 64 * 1024);
    assert_eq!(std::fs::metadata(&cached.path).unwrap().len(), 64 * 1024);
}

#[tokio::test]
async fn test_only_latest_file_kept() {
    let fixture = fixture();
    let first = fixture.write_file("first.mp3", b"first");
    let second = fixture.write_file("second.mp3", b"second");

    fixture.repository.composition_source(&file_uri(&first)).await.unwrap();
    fixture.repository.composition_source(&file_uri(&first)).await.unwrap();
    fixture.repository.composition_source(&file_uri(&second)).await.unwrap();
    fixture.repository.composition_source(&file_uri(&second)).await.unwrap();

    let names = fixture.cached_names();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("second.mp3___"));
    assert!(fixture
        .cache
        .cached_file(&file_uri(&first).source)
        .await
        .is_none());
}

#[tokio::test]
async fn test_failed_copy_leaves_no_partial_file() {
    let fixture = fixture();
    let missing = fixture.files.path().join("gone.mp3");

    let source = fixture
        .repository
        .composition_source(&file_uri(&missing))
        .await
        .unwrap();
    assert_eq!(source.display_name, "gone.mp3");
    assert_eq!(source.size, 0);

    assert!(fixture
        .cache
        .cached_file(&file_uri(&missing).source)
        .await
        .is_none());
    assert!(fixture.cached_names().is_empty());
}

#[tokio::test]
async fn test_delete_all_data_clears_cache() {
    let fixture = fixture();
    let path = fixture.write_file("track.mp3", b"data");
    let file_ref = file_uri(&path);
    fixture.repository.composition_source(&file_ref).await.unwrap();
    assert!(fixture.cache.cached_file(&file_ref.source).await.is_some());

    fixture.repository.delete_all_data().await.unwrap();

    assert!(fixture.cached_names().is_empty());
    assert!(fixture.cache.cached_file(&file_ref.source).await.is_none());
}

#[tokio::test]
async fn test_remote_sources_rejected() {
    let fixture = fixture();
    let file_ref = ExternalFileReference::new(CompositionContentSource::RemoteStream {
        url: "https://example.com/stream.mp3".into(),
    });

    assert!(fixture.repository.composition_source(&file_ref).await.is_err());
}
