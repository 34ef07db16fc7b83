//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback core:
//! - Logging and tracing infrastructure
//! - Player configuration
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions and the tunables shared by the
//! playback crate and the service façade.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{PlayerConfig, PlayerConfigBuilder};
pub use error::{Error, Result};
