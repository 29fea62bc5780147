//! Daily rollup persistence.

use std::path::Path;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{DailyStats, StatsError};

/// Storage for daily statistics rollups, keyed by date.
pub trait StatsStore: Send + Sync {
    /// Insert or replace the rollup for `stats.date`.
    fn upsert_daily(&self, stats: &DailyStats) -> Result<(), StatsError>;

    fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyStats>, StatsError>;

    /// Rollups with `from <= date <= to`, oldest first.
    fn list_daily(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStats>, StatsError>;
}

/// SQLite-backed rollup store.
pub struct SqliteStatsStore {
    conn: Mutex<Connection>,
}

impl SqliteStatsStore {
    /// Open (or create) the database file and tables.
    pub fn new(path: &Path) -> Result<Self, StatsError> {
        let conn = Connection::open(path).map_err(|e| StatsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StatsError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StatsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StatsError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StatsError> {
        self.conn
            .lock()
            .map_err(|e| StatsError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn decode(payload: &str) -> Result<DailyStats, StatsError> {
        serde_json::from_str(payload).map_err(|e| StatsError::Serialization(e.to_string()))
    }
}

impl StatsStore for SqliteStatsStore {
    fn upsert_daily(&self, stats: &DailyStats) -> Result<(), StatsError> {
        let payload =
            serde_json::to_string(stats).map_err(|e| StatsError::Serialization(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO daily_stats (date, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![stats.date.to_string(), payload, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StatsError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyStats>, StatsError> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM daily_stats WHERE date = ?1",
                params![date.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StatsError::Database(e.to_string()))?;
        payload.as_deref().map(Self::decode).transpose()
    }

    fn list_daily(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStats>, StatsError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM daily_stats WHERE date >= ?1 AND date <= ?2 ORDER BY date",
            )
            .map_err(|e| StatsError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![from.to_string(), to.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| StatsError::Database(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| StatsError::Database(e.to_string()))?;
            result.push(Self::decode(&payload)?);
        }
        Ok(result)
    }
}
