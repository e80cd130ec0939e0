use std::path::Path;

use log::info;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;
use crate::event::{ClientInfo, EventPayload, clean, day_from_timestamp, now_utc_iso, today_utc};

const SCHEMA: [&str; 5] = [
    r"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_time_utc TEXT NOT NULL,
        day_utc TEXT NOT NULL,
        event TEXT NOT NULL,
        channel TEXT,
        launcher_version TEXT,
        app_version TEXT,
        local_version TEXT,
        device_id TEXT,
        install_id TEXT,
        update_ok INTEGER,
        update_source TEXT,
        update_error TEXT,
        ip TEXT,
        user_agent TEXT,
        payload_json TEXT
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_events_day ON events(day_utc)",
    "CREATE INDEX IF NOT EXISTS idx_events_event ON events(event)",
    "CREATE INDEX IF NOT EXISTS idx_events_day_event_channel ON events(day_utc, event, channel)",
    "CREATE INDEX IF NOT EXISTS idx_events_day_device ON events(day_utc, device_id)",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyMetrics {
    pub total_events: i64,
    pub launcher_start_total: i64,
    pub app_launch_total: i64,
    pub version_check_total: i64,
    pub update_ok_total: i64,
    pub dau_unique_device: i64,
    pub dau_unique_install: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub date_utc: String,
    pub channel: String,
    pub metrics: DailyMetrics,
}

/// SQLite-backed event log.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Open or create the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns an error when the parent directory cannot be created or the
    /// database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::io("failed to create database directory", error))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|error| StoreError::database("failed to open event database", error))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|error| StoreError::database("failed to create event schema", error))?;
        }

        info!("Event store ready at {}", path.display());
        Ok(Self { pool })
    }

    /// Append one event. Events with an empty name are dropped.
    ///
    /// Returns whether a row was written.
    ///
    /// # Errors
    /// Returns an error when the payload cannot be encoded or the insert fails.
    pub async fn insert(
        &self,
        payload: &EventPayload,
        client: &ClientInfo,
    ) -> Result<bool, StoreError> {
        let event = payload.event.trim();
        if event.is_empty() {
            return Ok(false);
        }

        let event_time = Some(clean(payload.event_time_utc.as_ref()))
            .filter(|time| !time.is_empty())
            .unwrap_or_else(now_utc_iso);
        let day = day_from_timestamp(&event_time);
        let payload_json = serde_json::to_string(payload)?;

        sqlx::query(
            r"
            INSERT INTO events (
                event_time_utc, day_utc, event, channel, launcher_version, app_version, local_version,
                device_id, install_id, update_ok, update_source, update_error, ip, user_agent, payload_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&event_time)
        .bind(&day)
        .bind(event)
        .bind(clean(payload.channel.as_ref()))
        .bind(clean(payload.launcher_version.as_ref()))
        .bind(clean(payload.app_version.as_ref()))
        .bind(clean(payload.local_version.as_ref()))
        .bind(clean(payload.device_id.as_ref()))
        .bind(clean(payload.install_id.as_ref()))
        .bind(payload.update_ok.map(i64::from))
        .bind(clean(payload.update_source.as_ref()))
        .bind(clean(payload.update_error.as_ref()))
        .bind(&client.ip)
        .bind(&client.user_agent)
        .bind(payload_json)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::database("failed to insert event", error))?;

        Ok(true)
    }

    /// Aggregate one UTC day, optionally restricted to a channel.
    ///
    /// `date` defaults to today.
    ///
    /// # Errors
    /// Returns an error when a count query fails.
    pub async fn daily_stats(
        &self,
        date: Option<&str>,
        channel: Option<&str>,
    ) -> Result<DailyStats, StoreError> {
        let day = date
            .map(str::trim)
            .filter(|date| !date.is_empty())
            .map_or_else(today_utc, str::to_string);
        let channel = channel.filter(|channel| !channel.is_empty());
        let scope = DayScope { day: &day, channel };

        let metrics = DailyMetrics {
            total_events: self.count(&scope, "COUNT(1)", "").await?,
            launcher_start_total: self
                .count(&scope, "COUNT(1)", "event = 'launcher_start'")
                .await?,
            app_launch_total: self.count(&scope, "COUNT(1)", "event = 'app_launch'").await?,
            version_check_total: self
                .count(&scope, "COUNT(1)", "event = 'version_check'")
                .await?,
            update_ok_total: self
                .count(&scope, "COUNT(1)", "event = 'update_result' AND update_ok = 1")
                .await?,
            dau_unique_device: self
                .count(
                    &scope,
                    "COUNT(DISTINCT device_id)",
                    "event = 'version_check' AND device_id <> ''",
                )
                .await?,
            dau_unique_install: self
                .count(
                    &scope,
                    "COUNT(DISTINCT install_id)",
                    "event = 'version_check' AND install_id <> ''",
                )
                .await?,
        };

        Ok(DailyStats {
            channel: channel.unwrap_or("ALL").to_string(),
            date_utc: day,
            metrics,
        })
    }

    async fn count(
        &self,
        scope: &DayScope<'_>,
        aggregate: &str,
        condition: &str,
    ) -> Result<i64, StoreError> {
        let mut sql = format!("SELECT {aggregate} FROM events WHERE day_utc = ?");
        if scope.channel.is_some() {
            sql.push_str(" AND channel = ?");
        }
        if !condition.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(condition);
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(scope.day);
        if let Some(channel) = scope.channel {
            query = query.bind(channel);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|error| StoreError::database("failed to count events", error))
    }
}

struct DayScope<'a> {
    day: &'a str,
    channel: Option<&'a str>,
}
