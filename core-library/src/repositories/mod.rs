//! # Repository Contracts
//!
//! Interfaces of the data sources the player depends on.
//!
//! ## Architecture
//!
//! - Traits are `async_trait` objects shared as `Arc<dyn ...>`
//! - Live queries return `BoxStream`s with "latest value first" semantics:
//!   a new subscriber immediately receives the current value, then every change
//! - All one-shot operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `PlayQueueRepository` - queue order, current item, persisted item positions
//! - `LibraryRepository` - composition lookups, deletion, corruption bookkeeping, lyrics
//! - `ExternalMediaSourceRepository` - resolves externally opened files

pub mod external;
pub mod library;
pub mod queue;

pub use external::ExternalMediaSourceRepository;
pub use library::LibraryRepository;
pub use queue::PlayQueueRepository;
