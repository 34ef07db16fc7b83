//! Settings Storage using SQLite

use bridge_traits::{
    error::{BridgeError, Result},
    settings::{InMemorySettingsRepository, RepeatMode, SettingsRepository, SettingsSnapshot},
};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

const REPEAT_MODE: &str = "repeat_mode";
const RANDOM_PLAYING_ENABLED: &str = "random_playing_enabled";
const SKIP_CONSTRAINT_MILLIS: &str = "skip_constraint_millis";
const REWIND_VALUE_MILLIS: &str = "rewind_value_millis";
const SKIP_SAVE_START_MILLIS: &str = "skip_save_start_millis";
const SKIP_SAVE_END_MILLIS: &str = "skip_save_end_millis";
const EXTERNAL_PLAYER_REPEAT_MODE: &str = "external_player_repeat_mode";
const EXTERNAL_PLAYER_KEEP_IN_BACKGROUND: &str = "external_player_keep_in_background";
const PLAYBACK_SPEED: &str = "playback_speed";

/// `<data dir>/music-player-core/settings.db`
pub fn default_settings_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("music-player-core")
        .join("settings.db")
}

enum WriteCommand {
    Store { key: &'static str, value: String },
    Flush(oneshot::Sender<()>),
}

/// SQLite-backed [`SettingsRepository`].
///
/// Values are loaded once when the repository is opened and then served from
/// an [`InMemorySettingsRepository`], so getters never touch the database.
/// Every write updates the cache first and is persisted by a background task in
/// submission order. A failed write is logged and otherwise ignored: the
/// in-memory value stays authoritative for this session.
pub struct SqliteSettingsRepository {
    cache: InMemorySettingsRepository,
    writes: mpsc::UnboundedSender<WriteCommand>,
}

impl SqliteSettingsRepository {
    /// Open (or create) the settings database at `db_path`.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        debug!(path = ?db_path, "Opened settings database");
        Self::with_pool(pool).await
    }

    /// Create an in-memory settings repository (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A private memory database exists per connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| BridgeError::SettingsError(format!("Failed to create table: {}", e)))?;

        let snapshot = load_snapshot(&pool).await?;
        let (writes, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(pool, commands));

        Ok(Self {
            cache: InMemorySettingsRepository::from_snapshot(snapshot),
            writes,
        })
    }

    /// Current values of every preference.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.cache.snapshot()
    }

    /// Wait until every write submitted so far has reached the database.
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.writes
            .send(WriteCommand::Flush(done))
            .map_err(|_| BridgeError::SettingsError("settings writer stopped".to_string()))?;
        wait.await
            .map_err(|_| BridgeError::SettingsError("settings writer stopped".to_string()))
    }

    fn persist<T: Serialize>(&self, key: &'static str, value: T) {
        let value = match serde_json::to_string(&value) {
            Ok(value) => value,
            Err(error) => {
                warn!(key, %error, "Failed to encode setting");
                return;
            }
        };
        if self.writes.send(WriteCommand::Store { key, value }).is_err() {
            warn!(key, "Settings writer stopped, value kept in memory only");
        }
    }
}

async fn load_snapshot(pool: &SqlitePool) -> Result<SettingsSnapshot> {
    let rows = sqlx::query("SELECT key, value FROM player_settings")
        .fetch_all(pool)
        .await
        .map_err(|e| BridgeError::SettingsError(format!("Failed to load settings: {}", e)))?;

    let defaults = SettingsSnapshot::default();
    let mut values = match serde_json::to_value(&defaults) {
        Ok(Value::Object(values)) => values,
        _ => Map::new(),
    };

    for row in rows {
        let key: String = row.get(0);
        let raw: String = row.get(1);
        let Some(default) = values.get(&key).cloned() else {
            debug!(key = %key, "Ignoring unknown setting");
            continue;
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if is_valid(&key, &value, &default) => {
                values.insert(key, value);
            }
            _ => warn!(key = %key, value = %raw, "Ignoring malformed setting"),
        }
    }

    Ok(serde_json::from_value(Value::Object(values)).unwrap_or_else(|error| {
        warn!(%error, "Stored settings unreadable, using defaults");
        defaults
    }))
}

/// A stored value must deserialize into the same shape as its default.
fn is_valid(key: &str, value: &Value, default: &Value) -> bool {
    let mut probe = Map::new();
    probe.insert(key.to_string(), value.clone());
    match (value, default) {
        (Value::Number(_), Value::Number(_)) | (Value::Bool(_), Value::Bool(_)) => {
            serde_json::from_value::<SettingsSnapshot>(Value::Object(probe)).is_ok()
        }
        (Value::String(_), Value::String(_)) => {
            serde_json::from_value::<RepeatMode>(value.clone()).is_ok()
        }
        _ => false,
    }
}

async fn run_writer(pool: SqlitePool, mut commands: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Store { key, value } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO player_settings (key, value)
                    VALUES (?, ?)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value
                    "#,
                )
                .bind(key)
                .bind(&value)
                .execute(&pool)
                .await;

                match result {
                    Ok(_) => debug!(key, "Stored setting"),
                    Err(error) => warn!(key, %error, "Failed to persist setting"),
                }
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    pool.close().await;
}

impl SettingsRepository for SqliteSettingsRepository {
    fn repeat_mode(&self) -> RepeatMode {
        self.cache.repeat_mode()
    }

    fn set_repeat_mode(&self, mode: RepeatMode) {
        self.cache.set_repeat_mode(mode);
        self.persist(REPEAT_MODE, mode);
    }

    fn repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.cache.repeat_mode_updates()
    }

    fn is_random_playing_enabled(&self) -> bool {
        self.cache.is_random_playing_enabled()
    }

    fn set_random_playing_enabled(&self, enabled: bool) {
        self.cache.set_random_playing_enabled(enabled);
        self.persist(RANDOM_PLAYING_ENABLED, enabled);
    }

    fn random_playing_updates(&self) -> watch::Receiver<bool> {
        self.cache.random_playing_updates()
    }

    fn skip_constraint_millis(&self) -> u64 {
        self.cache.skip_constraint_millis()
    }

    fn set_skip_constraint_millis(&self, millis: u64) {
        self.cache.set_skip_constraint_millis(millis);
        self.persist(SKIP_CONSTRAINT_MILLIS, millis);
    }

    fn rewind_value_millis(&self) -> u64 {
        self.cache.rewind_value_millis()
    }

    fn set_rewind_value_millis(&self, millis: u64) {
        self.cache.set_rewind_value_millis(millis);
        self.persist(REWIND_VALUE_MILLIS, millis);
    }

    fn skip_save_start_millis(&self) -> u64 {
        self.cache.skip_save_start_millis()
    }

    fn set_skip_save_start_millis(&self, millis: u64) {
        self.cache.set_skip_save_start_millis(millis);
        self.persist(SKIP_SAVE_START_MILLIS, millis);
    }

    fn skip_save_end_millis(&self) -> u64 {
        self.cache.skip_save_end_millis()
    }

    fn set_skip_save_end_millis(&self, millis: u64) {
        self.cache.set_skip_save_end_millis(millis);
        self.persist(SKIP_SAVE_END_MILLIS, millis);
    }

    fn external_player_repeat_mode(&self) -> RepeatMode {
        self.cache.external_player_repeat_mode()
    }

    fn set_external_player_repeat_mode(&self, mode: RepeatMode) {
        self.cache.set_external_player_repeat_mode(mode);
        self.persist(EXTERNAL_PLAYER_REPEAT_MODE, mode);
    }

    fn external_player_repeat_mode_updates(&self) -> watch::Receiver<RepeatMode> {
        self.cache.external_player_repeat_mode_updates()
    }

    fn is_external_player_keep_in_background(&self) -> bool {
        self.cache.is_external_player_keep_in_background()
    }

    fn set_external_player_keep_in_background(&self, enabled: bool) {
        self.cache.set_external_player_keep_in_background(enabled);
        self.persist(EXTERNAL_PLAYER_KEEP_IN_BACKGROUND, enabled);
    }

    fn playback_speed(&self) -> f32 {
        self.cache.playback_speed()
    }

    fn set_playback_speed(&self, speed: f32) {
        self.cache.set_playback_speed(speed);
        self.persist(PLAYBACK_SPEED, speed);
    }

    fn playback_speed_updates(&self) -> watch::Receiver<f32> {
        self.cache.playback_speed_updates()
    }
}
