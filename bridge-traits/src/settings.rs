//! User preferences consumed by the player.
//!
//! Getters are synchronous: the player reads preferences in the middle of event
//! handling (e.g. the repeat mode when a track finishes) and must not await a
//! storage round trip there. Implementations keep values in memory and persist
//! writes in the background. Observable preferences are exposed as
//! `tokio::sync::watch` receivers, so a new observer sees the current value
//! immediately.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Tracks shorter than this (played time) restart instead of moving back.
pub const DEFAULT_SKIP_CONSTRAINT_MILLIS: u64 = 15_000;
/// Fast-seek step.
pub const DEFAULT_REWIND_VALUE_MILLIS: u64 = 10_000;
/// Positions closer than this to the start are persisted as 0.
pub const DEFAULT_SKIP_SAVE_START_MILLIS: u64 = 5_000;
/// Positions closer than this to the end are persisted as 0.
pub const DEFAULT_SKIP_SAVE_END_MILLIS: u64 = 5_000;

/// Repeat behaviour applied when a composition finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Advance through the queue and stop at its end.
    #[default]
    None,
    /// Wrap around to the start of the queue.
    RepeatPlayQueue,
    /// Loop the current composition.
    RepeatComposition,
    /// Play the current composition once, then pause.
    PlayCompositionOnce,
}

impl RepeatMode {
    /// Stable integer code used for persistence.
    pub fn code(&self) -> i64 {
        match self {
            RepeatMode::None => 0,
            RepeatMode::RepeatPlayQueue => 1,
            RepeatMode::RepeatComposition => 2,
            RepeatMode::PlayCompositionOnce => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RepeatMode::None),
            1 => Some(RepeatMode::RepeatPlayQueue),
            2 => Some(RepeatMode::RepeatComposition),
            3 => Some(RepeatMode::PlayCompositionOnce),
            _ => None,
        }
    }
}

/// Plain copy of every preference, used to seed and persist repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub repeat_mode: RepeatMode,
    pub random_playing_enabled: bool,
    pub skip_constraint_millis: u64,
    pub rewind_value_millis: u64,
    pub skip_save_start_millis: u64,
    pub skip_save_end_millis: u64,
    pub external_player_repeat_mode: RepeatMode,
    pub external_player_keep_in_background: bool,
    pub playback_speed: f32,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            repeat_mode: RepeatMode::None,
            random_playing_enabled: false,
            skip_constraint_millis: DEFAULT_SKIP_CONSTRAINT_MILLIS,
            rewind_value_millis: DEFAULT_REWIND_VALUE_MILLIS,
            skip_save_start_millis: DEFAULT_SKIP_SAVE_START_MILLIS,
            skip_save_end_millis: DEFAULT_SKIP_SAVE_END_MILLIS,
            external_player_repeat_mode: RepeatMode::None,
            external_player_keep_in_background: false,
            playback_speed: 1.0,
        }
    }
}

/// Preferences read and written by the player.
pub trait SettingsRepository: Send + Sync {
    fn repeat_mode(&self) -> RepeatMode;
    fn set_repeat_mode(&self, mode: RepeatMode);
    fn repeat_mode_updates(&self) -> watch::Receiver<RepeatMode>;

    fn is_random_playing_enabled(&self) -> bool;
    fn set_random_playing_enabled(&self, enabled: bool);
    fn random_playing_updates(&self) -> watch::Receiver<bool>;

    fn skip_constraint_millis(&self) -> u64;
    fn set_skip_constraint_millis(&self, millis: u64);

    fn rewind_value_millis(&self) -> u64;
    fn set_rewind_value_millis(&self, millis: u64);

    fn skip_save_start_millis(&self) -> u64;
    fn set_skip_save_start_millis(&self, millis: u64);

    fn skip_save_end_millis(&self) -> u64;
    fn set_skip_save_end_millis(&self, millis: u64);

    fn external_player_repeat_mode(&self) -> RepeatMode;
    fn set_external_player_repeat_mode(&self, mode: RepeatMode);
    fn external_player_repeat_mode_updates(&self) -> watch::Receiver<RepeatMode>;

    fn is_external_player_keep_in_background(&self) -> bool;
    fn set_external_player_keep_in_background(&self, enabled: bool);

    /// Library playback speed, remembered across sessions.
    fn playback_speed(&self) -> f32;
    fn set_playback_speed(&self, speed: f32);
    fn playback_speed_updates(&self) -> watch::Receiver<f32>;
}

/// Volatile [`SettingsRepository`]; also the cache layer of persistent stores.
pub struct InMemorySettingsRepository {
    repeat_mode: watch::Sender<RepeatMode>,
    random_playing: watch::Sender<bool>,
    skip_constraint_millis: watch::Sender<u64>,
    rewind_value_millis: watch::Sender<u64>,
    skip_save_start_millis: watch::Sender<u64>,
    skip_save_end_millis: watch::Sender<u64>,
    external_repeat_mode: watch::Sender<RepeatMode>,
    external_keep_in_background: watch::Sender<bool>,
    playback_speed: watch::Sender<f32>,
}

impl Default for InMemorySettingsRepository {
    fn default() -> Self {
        Self::from_snapshot(SettingsSnapshot::default())
    }
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SettingsSnapshot) -> Self {
        Self {
            repeat_mode: watch::Sender::new(snapshot.repeat_mode),
            random_playing: watch::Sender::new(snapshot.random_playing_enabled),
            skip_constraint_millis: watch::Sender::new(snapshot.skip_constraint_millis),
            rewind_value_millis: watch::Sender::new(snapshot.rewind_value_millis),
            skip_save_start_millis: watch::Sender::new(snapshot.skip_save_start_millis),
            skip_save_end_millis: watch::Sender::new(snapshot.skip_save_end_millis),
            external_repeat_mode: watch::Sender::new(snapshot.external_player_repeat_mode),
            external_keep_in_background: watch::Sender::new(
                snapshot.external_player_keep_in_background,
            ),
            playback_speed: watch::Sender::new(snapshot.playback_speed),
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            repeat_mode: *self.repeat_mode.borrow(),
            random_playing_enabled: *self.random_playing.borrow(),
            skip_constraint_millis: *self.skip_constraint_millis.borrow(),
            rewind_value_millis: *self.rewind_value_millis.borrow(),
            skip_save_start_millis: *self.skip_save_start_millis.borrow(),
            skip_save_end_millis: *self.skip_save_end_millis.borrow(),
            external_player_repeat_mode: *self.external_repeat_mode.borrow(),
            external_player_keep_in_background: *self.external_keep_in_background.borrow(),
            playback_speed: *self.playback_speed.borrow(),
        }
    }
}

fn update<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
    sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

impl SettingsRepository for InMemorySettingsRepository {
    fn repeat_mode(&self) -> RepeatMode {
        *self.repeat_mode.borrow()
    }

    fn set_repeat_mode(&self, mode: RepeatMode) {
        update(&self.repeat_mode, mode);
    }

    fn repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.repeat_mode.subscribe()
    }

    fn is_random_playing_enabled(&self) -> bool {
        *self.random_playing.borrow()
    }

    fn set_random_playing_enabled(&self, enabled: bool) {
        update(&self.random_playing, enabled);
    }

    fn random_playing_updates(&self) -> watch::Receiver<bool> {
        self.random_playing.subscribe()
    }

    fn skip_constraint_millis(&self) -> u64 {
        *self.skip_constraint_millis.borrow()
    }

    fn set_skip_constraint_millis(&self, millis: u64) {
        update(&self.skip_constraint_millis, millis);
    }

    fn rewind_value_millis(&self) -> u64 {
        *self.rewind_value_millis.borrow()
    }

    fn set_rewind_value_millis(&self, millis: u64) {
        update(&self.rewind_value_millis, millis);
    }

    fn skip_save_start_millis(&self) -> u64 {
        *self.skip_save_start_millis.borrow()
    }

    fn set_skip_save_start_millis(&self, millis: u64) {
        update(&self.skip_save_start_millis, millis);
    }

    fn skip_save_end_millis(&self) -> u64 {
        *self.skip_save_end_millis.borrow()
    }

    fn set_skip_save_end_millis(&self, millis: u64) {
        update(&self.skip_save_end_millis, millis);
    }

    fn external_player_repeat_mode(&self) -> RepeatMode {
        *self.external_repeat_mode.borrow()
    }

    fn set_external_player_repeat_mode(&self, mode: RepeatMode) {
        update(&self.external_repeat_mode, mode);
    }

    fn external_player_repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.external_repeat_mode.subscribe()
    }

    fn is_external_player_keep_in_background(&self) -> bool {
        *self.external_keep_in_background.borrow()
    }

    fn set_external_player_keep_in_background(&self, enabled: bool) {
        update(&self.external_keep_in_background, enabled);
    }

    fn playback_speed(&self) -> f32 {
        *self.playback_speed.borrow()
    }

    fn set_playback_speed(&self, speed: f32) {
        update(&self.playback_speed, speed);
    }

    fn playback_speed_updates(&self) -> watch::Receiver<f32> {
        self.playback_speed.subscribe()
    }
}
