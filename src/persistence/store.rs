//! SQLite-based persistence store

use crate::persistence::{PersistenceBackend, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

/// SQLite state store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open state database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flags (
                name TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                event TEXT NOT NULL,
                state_before TEXT NOT NULL,
                state_after TEXT NOT NULL,
                ok INTEGER NOT NULL,
                message TEXT NOT NULL,
                failed_step TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize state database")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn run_from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            event: row.get::<String, _>("event").parse()?,
            state_before: row.get::<String, _>("state_before").parse()?,
            state_after: row.get::<String, _>("state_after").parse()?,
            ok: row.get::<i64, _>("ok") != 0,
            message: row.get("message"),
            failed_step: row.get("failed_step"),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: Self::from_naive(row.get("completed_at")),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteStore {
    async fn flag(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT name FROM flags WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read flag")?;
        Ok(row.is_some())
    }

    async fn set_flag(&self, name: &str, value: bool) -> Result<()> {
        let sql = if value {
            "INSERT OR IGNORE INTO flags (name) VALUES (?1)"
        } else {
            "DELETE FROM flags WHERE name = ?1"
        };
        sqlx::query(sql)
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update flag {}", name))?;
        Ok(())
    }

    async fn value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read value")?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_value(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => {
                sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")
                    .bind(key)
                    .bind(v)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM kv WHERE key = ?1")
                    .bind(key)
                    .execute(&self.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to update value {}", key))?;
        Ok(())
    }

    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, event, state_before, state_after, ok, message, failed_step, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(run.event.as_str())
        .bind(run.state_before.as_str())
        .bind(run.state_after.as_str())
        .bind(run.ok as i64)
        .bind(&run.message)
        .bind(&run.failed_step)
        .bind(Self::to_naive(run.started_at))
        .bind(Self::to_naive(run.completed_at))
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, event, state_before, state_after, ok, message, failed_step, started_at, completed_at
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event, state_before, state_after, ok, message, failed_step, started_at, completed_at
            FROM runs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::run_from_row).collect()
    }
}
