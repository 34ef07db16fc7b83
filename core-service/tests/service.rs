//! Service wiring over a silent decoder and in-memory repositories.

use bridge_traits::playback::{
    CompositionContentSource, DecoderError, DecoderEventListener, PlatformDecoder,
};
use bridge_traits::settings::{InMemorySettingsRepository, SettingsRepository};
use core_library::memory::{InMemoryLibraryRepository, InMemoryPlayQueueRepository};
use core_library::{Composition, CompositionId, ExternalFileReference};
use core_playback::{PlayerState, PlayerType};
use core_runtime::config::PlayerConfig;
use core_service::{
    decoder_backend, CoreError, ExternalAudioFileCache, FileExternalMediaSourceRepository,
    PlayerDependencies, PlayerService,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type OpenLog = Arc<Mutex<Vec<CompositionContentSource>>>;

/// Decoder that accepts every source and never produces sound.
struct SilentDecoder {
    opened: OpenLog,
    playing: bool,
    position_ms: u64,
}

impl PlatformDecoder for SilentDecoder {
    fn set_event_listener(&mut self, _listener: DecoderEventListener) {}

    fn open(&mut self, source: &CompositionContentSource) -> Result<(), DecoderError> {
        self.opened.lock().push(source.clone());
        self.playing = false;
        self.position_ms = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DecoderError> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DecoderError> {
        self.playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<(), DecoderError> {
        self.position_ms = position_ms;
        Ok(())
    }

    fn position_ms(&self) -> Result<u64, DecoderError> {
        Ok(self.position_ms)
    }

    fn duration_ms(&self) -> Result<u64, DecoderError> {
        Ok(180_000)
    }

    fn set_volume(&mut self, _left: f32, _right: f32) -> Result<(), DecoderError> {
        Ok(())
    }

    fn set_speed(&mut self, _speed: f32) -> Result<(), DecoderError> {
        Ok(())
    }

    fn release(&mut self) {
        self.playing = false;
    }
}

struct Fixture {
    files: TempDir,
    _cache: TempDir,
    opened: OpenLog,
    service: PlayerService,
}

fn dependencies(opened: &OpenLog, cache_dir: &TempDir, config: &PlayerConfig) -> PlayerDependencies {
    let settings: Arc<dyn SettingsRepository> = Arc::new(InMemorySettingsRepository::new());
    let library = Arc::new(InMemoryLibraryRepository::with_compositions([
        Composition::new(1, "First", CompositionContentSource::local("/music/first.mp3"))
            .with_duration(180_000),
        Composition::new(2, "Second", CompositionContentSource::local("/music/second.mp3"))
            .with_duration(180_000),
    ]));
    let queue = Arc::new(InMemoryPlayQueueRepository::new(
        Arc::clone(&library),
        Arc::clone(&settings),
    ));
    let cache = Arc::new(ExternalAudioFileCache::new(cache_dir.path()));

    let log = Arc::clone(opened);
    let backend = decoder_backend(
        move || SilentDecoder {
            opened: Arc::clone(&log),
            playing: false,
            position_ms: 0,
        },
        config,
    );

    PlayerDependencies::new(
        vec![backend],
        settings,
        queue,
        library,
        Arc::new(FileExternalMediaSourceRepository::new(cache, config)),
    )
}

fn fixture() -> Fixture {
    let files = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let opened = OpenLog::default();
    let config = PlayerConfig::default();
    let service = PlayerService::new(dependencies(&opened, &cache, &config), config).unwrap();
    Fixture {
        files,
        _cache: cache,
        opened,
        service,
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let cache = tempfile::tempdir().unwrap();
    let config = PlayerConfig {
        event_buffer_size: 0,
        ..PlayerConfig::default()
    };

    let result = PlayerService::new(
        dependencies(&OpenLog::default(), &cache, &PlayerConfig::default()),
        config,
    );

    assert!(matches!(result, Err(CoreError::Config(_))));
}

#[tokio::test]
async fn test_backends_required() {
    let cache = tempfile::tempdir().unwrap();
    let config = PlayerConfig::default();
    let mut deps = dependencies(&OpenLog::default(), &cache, &config);
    deps.backends.clear();

    let result = PlayerService::new(deps, config);

    assert!(matches!(result, Err(CoreError::CapabilityMissing { .. })));
}

#[tokio::test]
async fn test_queue_playback_through_decoder() {
    let fixture = fixture();
    let library_player = fixture.service.library_player();

    library_player
        .set_queue_and_play(&[CompositionId(1), CompositionId(2)], Some(1))
        .await
        .unwrap();

    let state = library_player.player_state();
    wait_until(|| *state.borrow() == PlayerState::Play).await;
    assert_eq!(
        fixture.opened.lock().as_slice(),
        [CompositionContentSource::local("/music/second.mp3")]
    );

    fixture.service.common_player().pause();
    wait_until(|| *state.borrow() == PlayerState::Pause).await;
}

#[tokio::test]
async fn test_external_file_takes_over_and_hands_back() {
    let fixture = fixture();
    let path = fixture.files.path().join("download.mp3");
    std::fs::write(&path, b"not really audio").unwrap();
    let file_ref = ExternalFileReference::new(CompositionContentSource::content_uri(format!(
        "file://{}",
        path.display()
    )));

    let external_player = fixture.service.external_player();
    external_player.start_playing(file_ref).await.unwrap();

    let coordinator = fixture.service.coordinator();
    let state = external_player.player_state();
    wait_until(|| *state.borrow() == PlayerState::Play).await;
    assert_eq!(*coordinator.active_player_type().borrow(), PlayerType::External);
    assert_eq!(
        external_player
            .current_source()
            .borrow()
            .as_ref()
            .map(|source| source.display_name.clone()),
        Some("download.mp3".to_string())
    );

    fixture.service.common_player().reset();
    assert_eq!(*coordinator.active_player_type().borrow(), PlayerType::Library);
}

#[tokio::test]
async fn test_shutdown_releases_players() {
    let fixture = fixture();
    let library_player = fixture.service.library_player();
    library_player
        .set_queue_and_play(&[CompositionId(1)], None)
        .await
        .unwrap();
    let state = library_player.player_state();
    wait_until(|| *state.borrow() == PlayerState::Play).await;

    fixture.service.shutdown();

    assert_eq!(fixture.opened.lock().len(), 1);
}
