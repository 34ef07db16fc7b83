//! Plays a small in-memory queue through a simulated decoder.
//!
//! The first backend rejects FLAC files, so the second composition shows the
//! player falling back to the next backend without the caller noticing.
//!
//! ```text
//! RUST_LOG=core_playback=debug cargo run -p core-service --example simulated_player
//! ```

use anyhow::Result;
use bridge_traits::playback::{
    CompositionContentSource, DecoderError, DecoderEvent, DecoderEventListener, PlatformDecoder,
};
use bridge_traits::settings::{InMemorySettingsRepository, SettingsRepository};
use core_library::memory::{InMemoryLibraryRepository, InMemoryPlayQueueRepository};
use core_library::{Composition, CompositionId};
use core_runtime::config::PlayerConfig;
use core_runtime::logging::{init_logging, LoggingConfig};
use core_service::{
    decoder_backend, ExternalAudioFileCache, FileExternalMediaSourceRepository,
    PlayerDependencies, PlayerService,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decoder whose clock is the wall clock; finishes after `duration_ms`.
struct SimulatedDecoder {
    name: &'static str,
    accepts_flac: bool,
    listener: Option<DecoderEventListener>,
    started_at: Option<Instant>,
    offset_ms: u64,
    duration_ms: u64,
}

impl SimulatedDecoder {
    fn new(name: &'static str, accepts_flac: bool) -> Self {
        Self {
            name,
            accepts_flac,
            listener: None,
            started_at: None,
            offset_ms: 0,
            duration_ms: 0,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        let running = self
            .started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
        (self.offset_ms + running).min(self.duration_ms)
    }
}

impl PlatformDecoder for SimulatedDecoder {
    fn set_event_listener(&mut self, listener: DecoderEventListener) {
        self.listener = Some(listener);
    }

    fn open(&mut self, source: &CompositionContentSource) -> Result<(), DecoderError> {
        let name = source.log_name();
        if name.ends_with(".flac") && !self.accepts_flac {
            println!("[{}] cannot decode {}", self.name, name);
            return Err(DecoderError::Unsupported);
        }
        println!("[{}] opened {}", self.name, name);
        self.started_at = None;
        self.offset_ms = 0;
        self.duration_ms = 3_000;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DecoderError> {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        if let Some(listener) = self.listener.clone() {
            let remaining = self.duration_ms.saturating_sub(self.elapsed_ms());
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(remaining));
                listener(DecoderEvent::Completed);
            });
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DecoderError> {
        self.offset_ms = self.elapsed_ms();
        self.started_at = None;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<(), DecoderError> {
        self.offset_ms = position_ms.min(self.duration_ms);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn position_ms(&self) -> Result<u64, DecoderError> {
        Ok(self.elapsed_ms())
    }

    fn duration_ms(&self) -> Result<u64, DecoderError> {
        Ok(self.duration_ms)
    }

    fn set_volume(&mut self, _left: f32, _right: f32) -> Result<(), DecoderError> {
        Ok(())
    }

    fn set_speed(&mut self, _speed: f32) -> Result<(), DecoderError> {
        Ok(())
    }

    fn release(&mut self) {
        self.started_at = None;
        self.listener = None;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default())?;

    let config = PlayerConfig::builder()
        .position_poll_interval(Duration::from_millis(500))
        .external_cache_dir(std::env::temp_dir().join("simulated_player_cache"))
        .build()?;

    let settings: Arc<dyn SettingsRepository> = Arc::new(InMemorySettingsRepository::new());
    let library = Arc::new(InMemoryLibraryRepository::with_compositions([
        Composition::new(1, "Intro", CompositionContentSource::local("/music/intro.mp3"))
            .with_duration(3_000),
        Composition::new(2, "Lossless", CompositionContentSource::local("/music/lossless.flac"))
            .with_duration(3_000),
    ]));
    let queue = Arc::new(InMemoryPlayQueueRepository::new(
        Arc::clone(&library),
        Arc::clone(&settings),
    ));
    let cache = Arc::new(ExternalAudioFileCache::new(&config.external_cache_dir));

    let backends = vec![
        decoder_backend(|| SimulatedDecoder::new("system", false), &config),
        decoder_backend(|| SimulatedDecoder::new("bundled", true), &config),
    ];
    let service = PlayerService::new(
        PlayerDependencies::new(
            backends,
            settings,
            queue,
            library,
            Arc::new(FileExternalMediaSourceRepository::new(cache, &config)),
        ),
        config,
    )?;

    let player = service.library_player();
    player
        .set_queue_and_play(&[CompositionId(1), CompositionId(2)], None)
        .await?;

    let mut position = player.track_position();
    let deadline = tokio::time::sleep(Duration::from_secs(8));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = position.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = player.player_state().borrow().clone();
                println!("{:?} at {} ms", state, *position.borrow_and_update());
            }
        }
    }

    service.shutdown();
    Ok(())
}
