//! # Library & Play Queue Contracts
//!
//! Domain models and repository interfaces the player consumes.
//!
//! ## Overview
//!
//! The player does not own the music database. It talks to three repositories:
//! - [`PlayQueueRepository`](repositories::PlayQueueRepository) - ordered queue,
//!   current item, persisted per-item track position
//! - [`LibraryRepository`](repositories::LibraryRepository) - composition lookups,
//!   deletion, corruption bookkeeping, lyrics
//! - [`ExternalMediaSourceRepository`](repositories::ExternalMediaSourceRepository) -
//!   resolves a file handed to the app from outside the library
//!
//! Storage-backed implementations live with the host. [`memory`] provides
//! volatile implementations of the queue and library repositories for hosts
//! without a database and for tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod stream;

pub use error::{LibraryError, Result};
pub use models::{
    Composition, CompositionId, CorruptionType, CurrentComposition, DeletedComposition,
    ExternalCompositionSource, ExternalFileReference, PlayQueueEvent, PlayQueueItem, QueueItemId,
};
pub use repositories::{ExternalMediaSourceRepository, LibraryRepository, PlayQueueRepository};
