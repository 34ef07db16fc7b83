//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the player core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Playback
//! - [`PlatformDecoder`](playback::PlatformDecoder) - A single native decoder session
//!   (Android `MediaPlayer`, ExoPlayer, AVPlayer, a desktop audio engine)
//!
//! ### Preferences
//! - [`SettingsRepository`](settings::SettingsRepository) - Repeat mode, skip thresholds
//!   and the other user preferences the player reads synchronously
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! Bridge operations report [`BridgeError`](error::BridgeError). Decoder sessions
//! report the narrower [`DecoderError`](playback::DecoderError) because the
//! player has to distinguish "cannot decode this format" from ordinary I/O
//! failures in order to fall back to another decoder.
//!
//! ## Thread Safety
//!
//! Settings and logging bridges require `Send + Sync`. Decoder sessions are
//! only required to be `Send`: the playback core wraps every session in its own
//! lock, because native decoders deliver completion callbacks on threads the
//! core does not control.
//!
//! ## Examples
//!
//! ### Implementing PlatformDecoder
//!
//! ```ignore
//! use bridge_traits::playback::{
//!     CompositionContentSource, DecoderError, DecoderEventListener, PlatformDecoder,
//! };
//!
//! pub struct NativeDecoder {
//!     handle: native::Player,
//! }
//!
//! impl PlatformDecoder for NativeDecoder {
//!     fn open(&mut self, source: &CompositionContentSource) -> Result<(), DecoderError> {
//!         self.handle.reset();
//!         self.handle.set_source(source)?;
//!         self.handle.prepare_blocking()
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod logging;
pub mod playback;
pub mod settings;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use playback::{
    CompositionContentSource, DecoderError, DecoderEvent, DecoderEventListener, PlatformDecoder,
};
pub use settings::{
    InMemorySettingsRepository, RepeatMode, SettingsRepository, SettingsSnapshot, DEFAULT_REWIND_VALUE_MILLIS,
    DEFAULT_SKIP_CONSTRAINT_MILLIS, DEFAULT_SKIP_SAVE_END_MILLIS, DEFAULT_SKIP_SAVE_START_MILLIS,
};
