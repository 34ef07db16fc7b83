//! # Player Interactors
//!
//! Use-case layer between the UI/session and the [`PlayerCoordinator`](crate::PlayerCoordinator).
//!
//! - [`LibraryPlayerInteractor`] - play queue playback, position persistence,
//!   corruption bookkeeping
//! - [`ExternalPlayerInteractor`] - playback of a single file opened from outside
//!   the library
//! - [`CommonPlayerInteractor`] - routes session commands to whichever of the two
//!   owns the active player

mod common;
mod external;
mod library;

pub use common::CommonPlayerInteractor;
pub use external::ExternalPlayerInteractor;
pub use library::LibraryPlayerInteractor;

/// Position to persist for a composition of `duration_ms`.
///
/// Positions within `skip_start_ms` of the start or `skip_end_ms` of the end
/// are saved as 0, so playback never resumes a second before the end.
pub fn position_to_save(
    position_ms: u64,
    duration_ms: u64,
    skip_start_ms: u64,
    skip_end_ms: u64,
) -> u64 {
    let end_boundary = duration_ms.saturating_sub(skip_end_ms);
    if position_ms < skip_start_ms || position_ms > end_boundary {
        0
    } else {
        position_ms
    }
}
