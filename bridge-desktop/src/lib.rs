//! # Desktop Bridge Implementations
//!
//! Default host adapters for desktop platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`SqliteSettingsRepository`] - player preferences in a SQLite key-value
//!   table, served synchronously from an in-memory cache
//! - [`ExternalAudioFileCache`] - single-file local copy of the last file
//!   opened from outside the library
//! - [`FileExternalMediaSourceRepository`] - resolves externally opened files
//!   into playable sources, reading tags with `lofty`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ExternalAudioFileCache, FileExternalMediaSourceRepository};
//! use bridge_desktop::SqliteSettingsRepository;
//! use core_runtime::config::PlayerConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PlayerConfig::default();
//!     let settings = SqliteSettingsRepository::open(default_settings_path()).await?;
//!     let cache = Arc::new(ExternalAudioFileCache::new(&config.external_cache_dir));
//!     let external = FileExternalMediaSourceRepository::new(cache, &config);
//!
//!     // Hand both to the player service
//! }
//! ```

mod external;
mod external_cache;
mod settings;

pub use external::FileExternalMediaSourceRepository;
pub use external_cache::{CachedAudioFile, ExternalAudioFileCache};
pub use settings::{default_settings_path, SqliteSettingsRepository};
