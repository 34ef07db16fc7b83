//! External file player over a recording coordinator.

mod common;

use bridge_traits::playback::CompositionContentSource;
use bridge_traits::settings::{InMemorySettingsRepository, RepeatMode, SettingsRepository};
use common::{
    external_file, external_source, wait_until, Call, FakeExternalRepository,
    RecordingCoordinator,
};
use core_library::ExternalFileReference;
use core_playback::{
    ExternalPlayerInteractor, PlaybackError, PlayerEvent, PlayerState, PlayerType,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const EXTERNAL: PlayerType = PlayerType::External;

struct Fixture {
    coordinator: Arc<RecordingCoordinator>,
    settings: Arc<InMemorySettingsRepository>,
    repository: Arc<FakeExternalRepository>,
    interactor: Arc<ExternalPlayerInteractor>,
}

fn fixture() -> Fixture {
    let coordinator = Arc::new(RecordingCoordinator::default());
    let settings = Arc::new(InMemorySettingsRepository::new());
    let repository = Arc::new(FakeExternalRepository::default());
    let interactor = Arc::new(ExternalPlayerInteractor::new(
        coordinator.clone(),
        settings.clone(),
        repository.clone(),
    ));
    Fixture {
        coordinator,
        settings,
        repository,
        interactor,
    }
}

impl Fixture {
    fn resolutions(&self) -> usize {
        self.repository.resolutions.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_start_playing_resolves_prepares_and_plays() {
    let fixture = fixture();

    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();

    assert_eq!(fixture.resolutions(), 1);
    assert_eq!(
        fixture.coordinator.prepares(EXTERNAL),
        vec![(external_source(), 0)]
    );
    assert!(fixture.coordinator.has(&Call::Speed(EXTERNAL, 1.0)));
    assert!(fixture.coordinator.has(&Call::PlayAfterPrepare(EXTERNAL)));
    assert!(fixture.interactor.current_source().borrow().is_some());
}

#[tokio::test]
async fn test_concurrent_preparation_resolves_once() {
    let fixture = fixture();
    fixture.repository.hold.store(true, Ordering::SeqCst);

    let starting = {
        let interactor = Arc::clone(&fixture.interactor);
        tokio::spawn(async move { interactor.start_playing(external_file()).await })
    };
    wait_until(|| fixture.resolutions() == 1).await;
    let joining = {
        let interactor = Arc::clone(&fixture.interactor);
        tokio::spawn(async move { interactor.ensure_source_ready().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    fixture.repository.gate.notify_one();

    assert_eq!(starting.await.unwrap(), Ok(()));
    assert_eq!(joining.await.unwrap(), Ok(()));
    assert_eq!(fixture.resolutions(), 1);
    assert_eq!(fixture.coordinator.prepares(EXTERNAL).len(), 1);

    // Prepared: nothing left to do
    assert_eq!(fixture.interactor.ensure_source_ready().await, Ok(()));
    assert_eq!(fixture.resolutions(), 1);
}

#[tokio::test]
async fn test_replaced_file_resolution_discarded() {
    let fixture = fixture();
    let old = ExternalFileReference::new(CompositionContentSource::content_uri(
        "content://a/old.mp3",
    ));
    fixture.repository.hold.store(true, Ordering::SeqCst);

    let starting_old = {
        let interactor = Arc::clone(&fixture.interactor);
        tokio::spawn(async move { interactor.start_playing(old).await })
    };
    wait_until(|| fixture.resolutions() == 1).await;

    fixture.repository.hold.store(false, Ordering::SeqCst);
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();

    fixture.repository.gate.notify_one();
    assert_eq!(starting_old.await.unwrap(), Err(PlaybackError::Superseded));

    assert_eq!(
        fixture.coordinator.prepares(EXTERNAL),
        vec![(external_source(), 0)]
    );
    assert_eq!(
        fixture
            .interactor
            .current_source()
            .borrow()
            .as_ref()
            .map(|source| source.source.clone()),
        Some(external_file().source)
    );
    assert_eq!(
        fixture
            .coordinator
            .count(|call| *call == Call::PlayAfterPrepare(EXTERNAL)),
        1
    );
}

#[tokio::test]
async fn test_resolution_failure_pauses_and_allows_retry() {
    let fixture = fixture();
    *fixture.repository.failure.lock() = Some("grant revoked".into());

    let result = fixture.interactor.start_playing(external_file()).await;

    assert_eq!(
        result,
        Err(PlaybackError::NoReadPermission("grant revoked".into()))
    );
    assert!(fixture.coordinator.has(&Call::Pause(EXTERNAL)));
    assert!(fixture.coordinator.prepares(EXTERNAL).is_empty());
    assert!(fixture.interactor.current_source().borrow().is_none());

    *fixture.repository.failure.lock() = None;
    fixture.interactor.ensure_source_ready().await.unwrap();
    assert_eq!(fixture.resolutions(), 2);
    assert_eq!(fixture.coordinator.prepares(EXTERNAL).len(), 1);
}

#[tokio::test]
async fn test_ensure_without_file_fails() {
    let fixture = fixture();

    assert_eq!(
        fixture.interactor.ensure_source_ready().await,
        Err(PlaybackError::NoFileReference)
    );
    assert_eq!(fixture.resolutions(), 0);
}

#[tokio::test]
async fn test_permission_loss_reprepares_at_current_position() {
    let fixture = fixture();
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();
    let mut errors = fixture.interactor.error_events();
    fixture
        .coordinator
        .actual_position
        .store(42_000, Ordering::SeqCst);

    fixture.coordinator.emit(
        EXTERNAL,
        PlayerEvent::Error {
            source: external_source(),
            error: PlaybackError::NoReadPermission("revoked".into()),
        },
    );

    wait_until(|| fixture.coordinator.prepares(EXTERNAL).len() == 2).await;
    assert_eq!(
        fixture.coordinator.prepares(EXTERNAL)[1],
        (external_source(), 42_000)
    );
    assert_eq!(fixture.resolutions(), 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(errors.try_recv().is_err());
    assert_eq!(
        fixture
            .coordinator
            .count(|call| matches!(call, Call::Error(..))),
        0
    );
    assert_eq!(fixture.coordinator.prepares(EXTERNAL).len(), 2);
}

#[tokio::test]
async fn test_other_runtime_errors_surfaced() {
    let fixture = fixture();
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();
    let mut errors = fixture.interactor.error_events();

    fixture.coordinator.emit(
        EXTERNAL,
        PlayerEvent::Error {
            source: external_source(),
            error: PlaybackError::UnsupportedSource,
        },
    );

    let error = tokio::time::timeout(Duration::from_secs(1), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(error, PlaybackError::UnsupportedSource);
    assert_eq!(fixture.resolutions(), 1);
}

#[tokio::test]
async fn test_finished_pauses_unless_repeating() {
    let fixture = fixture();
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();

    fixture.coordinator.emit(
        EXTERNAL,
        PlayerEvent::Finished {
            source: external_source(),
        },
    );
    wait_until(|| fixture.coordinator.has(&Call::Pause(EXTERNAL))).await;
    assert!(fixture.coordinator.has(&Call::SeekFinished(EXTERNAL, 0)));

    fixture.interactor.set_repeat_mode(RepeatMode::RepeatComposition);
    fixture.coordinator.emit(
        EXTERNAL,
        PlayerEvent::Finished {
            source: external_source(),
        },
    );
    wait_until(|| {
        fixture
            .coordinator
            .count(|call| *call == Call::SeekFinished(EXTERNAL, 0))
            == 2
    })
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        fixture
            .coordinator
            .count(|call| *call == Call::Pause(EXTERNAL)),
        1
    );
}

#[tokio::test]
async fn test_stop_state_resets_position() {
    let fixture = fixture();
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();
    let interactor = &fixture.interactor;

    fixture.coordinator.set_position(EXTERNAL, 90_000);
    wait_until(|| *interactor.track_position().borrow() == 90_000).await;

    fixture.coordinator.set_state(EXTERNAL, PlayerState::Stop);
    wait_until(|| *interactor.track_position().borrow() == 0).await;
}

#[tokio::test]
async fn test_repeat_mode_limited_to_single_file_modes() {
    let fixture = fixture();
    fixture.interactor.set_repeat_mode(RepeatMode::None);

    fixture.interactor.set_repeat_mode(RepeatMode::RepeatPlayQueue);
    assert_eq!(fixture.interactor.repeat_mode(), RepeatMode::None);

    fixture.interactor.change_repeat_mode();
    assert_eq!(
        fixture.interactor.repeat_mode(),
        RepeatMode::RepeatComposition
    );
    fixture.interactor.change_repeat_mode();
    assert_eq!(fixture.interactor.repeat_mode(), RepeatMode::None);

    // The library repeat mode is a separate setting
    assert_eq!(fixture.settings.repeat_mode(), RepeatMode::default());
}

#[tokio::test]
async fn test_reset_signals_and_clears_state() {
    let fixture = fixture();
    fixture
        .interactor
        .start_playing(external_file())
        .await
        .unwrap();
    let mut resets = fixture.interactor.reset_events();

    fixture.interactor.reset();

    assert!(resets.try_recv().is_ok());
    assert!(fixture.coordinator.has(&Call::Reset(EXTERNAL, true)));
    assert!(fixture.interactor.current_source().borrow().is_none());
    wait_until(|| fixture.repository.deletions.load(Ordering::SeqCst) == 1).await;

    // Cleared: the next request resolves again
    fixture.interactor.ensure_source_ready().await.unwrap();
    assert_eq!(fixture.resolutions(), 2);
}

#[tokio::test]
async fn test_release_respects_keep_in_background() {
    let fixture = fixture();
    fixture.interactor.set_keep_in_background(true);

    fixture.interactor.release();
    assert!(!fixture.coordinator.has(&Call::Reset(EXTERNAL, true)));

    fixture.interactor.set_keep_in_background(false);
    fixture.interactor.release();
    assert!(fixture.coordinator.has(&Call::Reset(EXTERNAL, true)));
}

#[tokio::test]
async fn test_speed_applies_to_external_context() {
    let fixture = fixture();

    fixture.interactor.set_playback_speed(0.75);

    assert!(fixture.coordinator.has(&Call::Speed(EXTERNAL, 0.75)));
    assert_eq!(*fixture.interactor.playback_speed_updates().borrow(), 0.75);
    // The library speed setting is untouched
    assert_eq!(fixture.settings.playback_speed(), 1.0);
}

mod mocked_repository {
    use super::*;
    use async_trait::async_trait;
    use core_library::{
        ExternalCompositionSource, ExternalFileReference, ExternalMediaSourceRepository,
        LibraryError,
    };
    use mockall::mock;

    mock! {
        Sources {}

        #[async_trait]
        impl ExternalMediaSourceRepository for Sources {
            async fn composition_source(
                &self,
                file_ref: &ExternalFileReference,
            ) -> core_library::Result<ExternalCompositionSource>;
            async fn delete_all_data(&self) -> core_library::Result<()>;
        }
    }

    fn resolved(file_ref: &ExternalFileReference) -> ExternalCompositionSource {
        let mut source = ExternalCompositionSource::new(file_ref.source.clone(), "track.mp3");
        source.title = Some("Track".into());
        source.duration_ms = 200_000;
        source
    }

    #[tokio::test]
    async fn test_resolved_metadata_published() {
        let mut repository = MockSources::new();
        repository
            .expect_composition_source()
            .times(1)
            .returning(|file_ref| Ok(resolved(file_ref)));
        let coordinator = Arc::new(RecordingCoordinator::default());
        let interactor = ExternalPlayerInteractor::new(
            coordinator.clone(),
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(repository),
        );

        interactor.start_playing(external_file()).await.unwrap();

        let current = interactor.current_source().borrow().clone().unwrap();
        assert_eq!(current.title.as_deref(), Some("Track"));
        assert_eq!(current.duration_ms, 200_000);
    }

    #[tokio::test]
    async fn test_missing_file_reported_as_source_not_found() {
        let mut repository = MockSources::new();
        repository
            .expect_composition_source()
            .returning(|_| Err(LibraryError::not_found("file", "track.mp3")));
        let coordinator = Arc::new(RecordingCoordinator::default());
        let interactor = ExternalPlayerInteractor::new(
            coordinator.clone(),
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(repository),
        );

        let result = interactor.start_playing(external_file()).await;

        assert_eq!(
            result,
            Err(PlaybackError::LocalSourceNotFound("file track.mp3".into()))
        );
        assert!(coordinator.prepares(EXTERNAL).is_empty());
    }

    #[tokio::test]
    async fn test_cached_data_deleted_on_reset() {
        let mut repository = MockSources::new();
        repository
            .expect_composition_source()
            .returning(|file_ref| Ok(resolved(file_ref)));
        repository
            .expect_delete_all_data()
            .times(1)
            .returning(|| Ok(()));
        let coordinator = Arc::new(RecordingCoordinator::default());
        let interactor = ExternalPlayerInteractor::new(
            coordinator.clone(),
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(repository),
        );
        interactor.start_playing(external_file()).await.unwrap();

        interactor.reset();

        // Deletion runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(interactor.current_source().borrow().is_none());
    }
}
