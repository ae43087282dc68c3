//! SQLite-backed store.
//!
//! One pool serves every collaborator trait. The schema is created on
//! connect if missing; timestamps are stored as Unix epoch milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    InstrumentRegistry, LogSink, NotificationSink, RecordClass, RetentionStore, SettingsStore,
    StoreError,
};
use crate::types::{
    LogEntry, LogLevel, Notification, OperationalSettings, TradableInstrument,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS settings(
        id INTEGER PRIMARY KEY CHECK (id = 1),
        trading_enabled INTEGER NOT NULL DEFAULT 0,
        ai_enabled INTEGER NOT NULL DEFAULT 0,
        emergency_stop INTEGER NOT NULL DEFAULT 0,
        spot_trading_enabled INTEGER NOT NULL DEFAULT 1,
        futures_trading_enabled INTEGER NOT NULL DEFAULT 0,
        max_risk_per_trade REAL NOT NULL DEFAULT 0.02,
        min_confidence REAL NOT NULL DEFAULT 0.7,
        max_open_positions INTEGER NOT NULL DEFAULT 5,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS trading_pairs(
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        symbol TEXT NOT NULL UNIQUE,
        trading_type TEXT NOT NULL DEFAULT 'SPOT',
        enabled INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS notifications(
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        type TEXT NOT NULL,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        priority TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        read_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_notifications_read_created ON notifications(read_at, created_at);

    CREATE TABLE IF NOT EXISTS system_logs(
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        level TEXT NOT NULL,
        category TEXT NOT NULL,
        message TEXT NOT NULL,
        context TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_system_logs_level_created ON system_logs(level, created_at);

    CREATE TABLE IF NOT EXISTS api_cache(
        cache_key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_api_cache_expires ON api_cache(expires_at);
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "Store connected");
        Ok(store)
    }

    /// A private in-memory database. Kept on a single connection that is
    /// never recycled, otherwise the data would vanish.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        debug!("Schema ensured");
        Ok(())
    }

    // -- Administrative writes (seeding, admin tooling, tests) -------------

    /// Insert or replace the singleton settings record.
    pub async fn save_settings(&self, settings: &OperationalSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
                INSERT INTO settings (
                    id, trading_enabled, ai_enabled, emergency_stop, spot_trading_enabled,
                    futures_trading_enabled, max_risk_per_trade, min_confidence,
                    max_open_positions, updated_at
                ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    trading_enabled = excluded.trading_enabled,
                    ai_enabled = excluded.ai_enabled,
                    emergency_stop = excluded.emergency_stop,
                    spot_trading_enabled = excluded.spot_trading_enabled,
                    futures_trading_enabled = excluded.futures_trading_enabled,
                    max_risk_per_trade = excluded.max_risk_per_trade,
                    min_confidence = excluded.min_confidence,
                    max_open_positions = excluded.max_open_positions,
                    updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.trading_enabled)
        .bind(settings.ai_enabled)
        .bind(settings.emergency_stop)
        .bind(settings.spot_trading_enabled)
        .bind(settings.futures_trading_enabled)
        .bind(settings.max_risk_per_trade)
        .bind(settings.min_confidence)
        .bind(i64::from(settings.max_open_positions))
        .bind(settings.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register an instrument; registry order is insertion order.
    pub async fn add_instrument(&self, instrument: &TradableInstrument) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO trading_pairs (symbol, trading_type, enabled) VALUES (?, ?, ?)",
        )
        .bind(&instrument.symbol)
        .bind(instrument.trading_type.as_str())
        .bind(instrument.enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn mark_notification_read(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn put_cache(
        &self,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
                INSERT INTO api_cache (cache_key, value, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(cache_key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Reads used by admin tooling and tests ------------------------------

    /// All notifications, oldest first, with their ids.
    pub async fn notifications(&self) -> Result<Vec<(i64, Notification)>, StoreError> {
        let rows = sqlx::query(
            r#"
                SELECT id, type, category, title, message, priority, data, created_at, read_at
                FROM notifications ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("id")?, notification_from_row(row)?)))
            .collect()
    }

    /// All persisted log entries, oldest first.
    pub async fn log_entries(&self) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT level, category, message, context, created_at FROM system_logs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_entry_from_row).collect()
    }

    pub async fn cache_keys(&self) -> Result<Vec<String>, StoreError> {
        let keys = sqlx::query_scalar::<_, String>("SELECT cache_key FROM api_cache ORDER BY cache_key")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn millis_to_datetime(table: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Invalid {
        table,
        message: format!("timestamp out of range: {millis}"),
    })
}

fn parse_column<T>(table: &'static str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = anyhow::Error>,
{
    raw.parse().map_err(|e: anyhow::Error| StoreError::Invalid {
        table,
        message: e.to_string(),
    })
}

fn settings_from_row(row: &SqliteRow) -> Result<OperationalSettings, StoreError> {
    let max_open_positions: i64 = row.try_get("max_open_positions")?;
    Ok(OperationalSettings {
        trading_enabled: row.try_get("trading_enabled")?,
        ai_enabled: row.try_get("ai_enabled")?,
        emergency_stop: row.try_get("emergency_stop")?,
        spot_trading_enabled: row.try_get("spot_trading_enabled")?,
        futures_trading_enabled: row.try_get("futures_trading_enabled")?,
        max_risk_per_trade: row.try_get("max_risk_per_trade")?,
        min_confidence: row.try_get("min_confidence")?,
        max_open_positions: u32::try_from(max_open_positions).map_err(|_| StoreError::Invalid {
            table: "settings",
            message: format!("max_open_positions out of range: {max_open_positions}"),
        })?,
        updated_at: millis_to_datetime("settings", row.try_get("updated_at")?)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StoreError> {
    let kind: String = row.try_get("type")?;
    let category: String = row.try_get("category")?;
    let priority: String = row.try_get("priority")?;
    let data: String = row.try_get("data")?;
    let read_at: Option<i64> = row.try_get("read_at")?;
    Ok(Notification {
        kind: parse_column("notifications", &kind)?,
        category: parse_column("notifications", &category)?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        priority: parse_column("notifications", &priority)?,
        data: serde_json::from_str(&data).map_err(|e| StoreError::Invalid {
            table: "notifications",
            message: e.to_string(),
        })?,
        created_at: millis_to_datetime("notifications", row.try_get("created_at")?)?,
        read_at: read_at
            .map(|ms| millis_to_datetime("notifications", ms))
            .transpose()?,
    })
}

fn log_entry_from_row(row: &SqliteRow) -> Result<LogEntry, StoreError> {
    let level: String = row.try_get("level")?;
    let context: String = row.try_get("context")?;
    Ok(LogEntry {
        level: parse_column("system_logs", &level)?,
        category: row.try_get("category")?,
        message: row.try_get("message")?,
        context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
        created_at: millis_to_datetime("system_logs", row.try_get("created_at")?)?,
    })
}

/// `'ERROR','CRITICAL'` for use in SQL `IN (...)` clauses.
fn critical_levels_sql() -> String {
    LogLevel::CRITICAL
        .iter()
        .map(|l| format!("'{}'", l.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Collaborator implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<OperationalSettings>, StoreError> {
        let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(settings_from_row).transpose()
    }
}

#[async_trait]
impl InstrumentRegistry for SqliteStore {
    async fn list_enabled_instruments(&self) -> Result<Vec<TradableInstrument>, StoreError> {
        let rows = sqlx::query(
            "SELECT symbol, trading_type, enabled FROM trading_pairs WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let trading_type: String = row.try_get("trading_type")?;
                Ok(TradableInstrument {
                    symbol: row.try_get("symbol")?,
                    trading_type: parse_column("trading_pairs", &trading_type)?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for SqliteStore {
    async fn create(&self, notification: &Notification) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
                INSERT INTO notifications (
                    type, category, title, message, priority, data, created_at, read_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.kind.as_str())
        .bind(notification.category.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .bind(notification.data.to_string())
        .bind(notification.created_at.timestamp_millis())
        .bind(notification.read_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl LogSink for SqliteStore {
    async fn append(&self, entry: &LogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_logs (level, category, message, context, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.category)
        .bind(&entry.message)
        .bind(entry.context.to_string())
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RetentionStore for SqliteStore {
    async fn delete_expired(
        &self,
        class: RecordClass,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = match class {
            RecordClass::ExpiredCache => "DELETE FROM api_cache WHERE expires_at < ?",
            other => return Err(StoreError::UnsupportedRule(other)),
        };
        let result = sqlx::query(sql)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(
        &self,
        class: RecordClass,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = match class {
            RecordClass::ReadNotifications => {
                "DELETE FROM notifications WHERE read_at IS NOT NULL AND created_at < ?".to_string()
            }
            RecordClass::RoutineLogs => format!(
                "DELETE FROM system_logs WHERE level NOT IN ({}) AND created_at < ?",
                critical_levels_sql()
            ),
            RecordClass::CriticalLogs => format!(
                "DELETE FROM system_logs WHERE level IN ({}) AND created_at < ?",
                critical_levels_sql()
            ),
            RecordClass::ExpiredCache => return Err(StoreError::UnsupportedRule(class)),
        };
        let result = sqlx::query(&sql)
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
