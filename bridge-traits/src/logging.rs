//! Host Logging Bridge
//!
//! The player core logs through `tracing`. Hosts that want those events in
//! their own pipeline (Logcat, os_log, a desktop log file) implement
//! [`LoggerSink`]; `core-runtime` mirrors every filtered event into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Log level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Upper-case label used by console output and `EnvFilter` directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Lower-case directive accepted by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Structured log entry handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_playback::player::composite`
    pub target: String,
    pub message: String,
    /// Structured fields recorded on the event (`player_type`, `backend_index`, ...)
    pub fields: BTreeMap<String, String>,
    /// Name of the innermost span the event was recorded in
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// Render fields as `key=value` pairs separated by spaces.
    pub fn fields_display(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Logger sink trait
///
/// Forwards structured logs from the core to host logging pipelines:
/// - **Android**: Logcat
/// - **iOS**: OSLog
/// - **Desktop**: stderr or a log file
///
/// Implementations must not block: the forwarding layer calls `log` from a
/// spawned task whenever a Tokio runtime is available.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::logging::{LoggerSink, LogEntry, LogLevel};
///
/// async fn report(logger: &dyn LoggerSink) {
///     let entry = LogEntry::new(LogLevel::Warn, "core_playback", "decoder fallback")
///         .with_field("backend_index", "1");
///     logger.log(entry).await.ok();
/// }
/// ```
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    /// Forward a log entry to the host logging system
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Flush any buffered logs
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Entries below this level are dropped before reaching the sink.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Sink printing entries to stderr, used by the desktop shell and in tests.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

impl ConsoleLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    fn format(entry: &LogEntry) -> String {
        let mut line = format!(
            "[{}] {:<5} {}: {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.level.as_str(),
            entry.target,
            entry.message
        );
        if !entry.fields.is_empty() {
            line.push(' ');
            line.push_str(&entry.fields_display());
        }
        line
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            eprintln!("{}", Self::format(&entry));
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Warn, "core_playback", "fallback")
            .with_field("backend_index", "1")
            .with_field("player_type", "library")
            .with_span("prepare");

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_playback");
        assert_eq!(entry.fields.get("backend_index"), Some(&"1".to_string()));
        assert_eq!(entry.span.as_deref(), Some("prepare"));
        assert_eq!(entry.fields_display(), "backend_index=1 player_type=library");
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
    }

    #[test]
    fn test_console_format_includes_fields() {
        let entry = LogEntry::new(LogLevel::Info, "core", "prepared").with_field("item_id", "7");
        let line = ConsoleLogger::format(&entry);
        assert!(line.contains("INFO"));
        assert!(line.ends_with("prepared item_id=7"));
    }

    #[tokio::test]
    async fn test_console_logger() {
        let logger = ConsoleLogger::new(LogLevel::Debug);
        let entry = LogEntry::new(LogLevel::Info, "test", "Test log");

        logger.log(entry).await.unwrap();
        assert_eq!(logger.min_level(), LogLevel::Debug);
    }
}
