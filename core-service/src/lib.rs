//! Player service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (decoders, settings,
//! the play queue, the library, external file resolution) into the player
//! core. Desktop apps typically enable the `desktop-shims` feature (which
//! depends on `bridge-desktop`) and call [`bootstrap_desktop`]; other hosts
//! assemble a [`PlayerDependencies`] bundle themselves.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{playback::PlatformDecoder, settings::SettingsRepository};
use core_library::repositories::{
    ExternalMediaSourceRepository, LibraryRepository, PlayQueueRepository,
};
use core_playback::{
    CommonPlayerInteractor, CompositeMediaPlayer, DecoderMediaPlayer, ExternalPlayerInteractor,
    LibraryPlayerInteractor, MediaPlayer, MediaPlayerFactory, PlayerCoordinator,
    SharedPlayerCoordinator,
};
use core_runtime::config::PlayerConfig;
use tracing::info;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{
    default_settings_path, ExternalAudioFileCache, FileExternalMediaSourceRepository,
    SqliteSettingsRepository,
};

/// Aggregated handle to all bridge dependencies the player requires.
pub struct PlayerDependencies {
    /// Backends in fallback order; the first one plays unless a source is
    /// unsupported by it.
    pub backends: Vec<MediaPlayerFactory>,
    pub settings: Arc<dyn SettingsRepository>,
    pub play_queue: Arc<dyn PlayQueueRepository>,
    pub library: Arc<dyn LibraryRepository>,
    pub external_sources: Arc<dyn ExternalMediaSourceRepository>,
}

impl PlayerDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        backends: Vec<MediaPlayerFactory>,
        settings: Arc<dyn SettingsRepository>,
        play_queue: Arc<dyn PlayQueueRepository>,
        library: Arc<dyn LibraryRepository>,
        external_sources: Arc<dyn ExternalMediaSourceRepository>,
    ) -> Self {
        Self {
            backends,
            settings,
            play_queue,
            library,
            external_sources,
        }
    }
}

/// Backend factory creating a [`DecoderMediaPlayer`] over a fresh decoder
/// session on every call.
pub fn decoder_backend<D, F>(make_decoder: F, config: &PlayerConfig) -> MediaPlayerFactory
where
    D: PlatformDecoder,
    F: Fn() -> D + Send + Sync + 'static,
{
    let poll_interval = config.position_poll_interval;
    let event_buffer_size = config.event_buffer_size;
    Box::new(move || {
        Arc::new(DecoderMediaPlayer::new(
            make_decoder(),
            poll_interval,
            event_buffer_size,
        )) as Arc<dyn MediaPlayer>
    })
}

struct ServiceInner {
    config: PlayerConfig,
    settings: Arc<dyn SettingsRepository>,
    coordinator: Arc<SharedPlayerCoordinator>,
    library_player: Arc<LibraryPlayerInteractor>,
    external_player: Arc<ExternalPlayerInteractor>,
    common_player: Arc<CommonPlayerInteractor>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct PlayerService {
    inner: Arc<ServiceInner>,
}

impl PlayerService {
    /// Build the composite player, the coordinator and the three interactors.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(deps: PlayerDependencies, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        if deps.backends.is_empty() {
            return Err(CoreError::CapabilityMissing {
                capability: "MediaPlayer".to_string(),
                message: "at least one playback backend is required".to_string(),
            });
        }

        let backend_count = deps.backends.len();
        let player = CompositeMediaPlayer::from_config(deps.backends, &config)?;

        let coordinator = Arc::new(SharedPlayerCoordinator::new(
            Arc::new(player),
            Arc::clone(&deps.settings),
            &config,
        ));
        let as_coordinator: Arc<dyn PlayerCoordinator> = coordinator.clone();

        let library_player = Arc::new(LibraryPlayerInteractor::new(
            Arc::clone(&as_coordinator),
            Arc::clone(&deps.settings),
            deps.play_queue,
            deps.library,
        ));
        let external_player = Arc::new(ExternalPlayerInteractor::new(
            Arc::clone(&as_coordinator),
            Arc::clone(&deps.settings),
            deps.external_sources,
        ));
        let common_player = Arc::new(CommonPlayerInteractor::new(
            as_coordinator,
            Arc::clone(&library_player),
            Arc::clone(&external_player),
        ));

        info!(backends = backend_count, "Player service initialized");
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                settings: deps.settings,
                coordinator,
                library_player,
                external_player,
                common_player,
            }),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> Arc<dyn SettingsRepository> {
        Arc::clone(&self.inner.settings)
    }

    pub fn coordinator(&self) -> Arc<dyn PlayerCoordinator> {
        self.inner.coordinator.clone()
    }

    pub fn library_player(&self) -> Arc<LibraryPlayerInteractor> {
        Arc::clone(&self.inner.library_player)
    }

    pub fn external_player(&self) -> Arc<ExternalPlayerInteractor> {
        Arc::clone(&self.inner.external_player)
    }

    /// Commands routed to whichever player is active.
    pub fn common_player(&self) -> Arc<CommonPlayerInteractor> {
        Arc::clone(&self.inner.common_player)
    }

    /// Stop observing repositories and release the playback backend.
    pub fn shutdown(&self) {
        self.inner.library_player.release();
        self.inner.external_player.release();
        self.inner.coordinator.shutdown();
        info!("Player service shut down");
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Preferences live in [`SqliteSettingsRepository`] at
/// [`default_settings_path`]; external files are resolved by
/// [`FileExternalMediaSourceRepository`] with the cache under
/// `config.external_cache_dir`.
///
/// ```no_run
/// # async fn example(
/// #     queue: std::sync::Arc<dyn core_library::PlayQueueRepository>,
/// #     library: std::sync::Arc<dyn core_library::LibraryRepository>,
/// #     backends: Vec<core_playback::MediaPlayerFactory>,
/// # ) -> core_service::Result<()> {
/// use core_runtime::config::PlayerConfig;
///
/// let service = core_service::bootstrap_desktop(backends, queue, library, PlayerConfig::default()).await?;
/// service.common_player().prepare().await;
/// # Ok(())
/// # }
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(
    backends: Vec<MediaPlayerFactory>,
    play_queue: Arc<dyn PlayQueueRepository>,
    library: Arc<dyn LibraryRepository>,
    config: PlayerConfig,
) -> Result<PlayerService> {
    let settings = SqliteSettingsRepository::open(default_settings_path())
        .await
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    let cache = Arc::new(ExternalAudioFileCache::new(&config.external_cache_dir));
    let external_sources = FileExternalMediaSourceRepository::new(cache, &config);

    PlayerService::new(
        PlayerDependencies::new(
            backends,
            Arc::new(settings),
            play_queue,
            library,
            Arc::new(external_sources),
        ),
        config,
    )
}
