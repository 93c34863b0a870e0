//! SQLite-based durable store for the budget engine.
//!
//! Provides persistent storage for:
//! - The current timer snapshot (kv table, JSON)
//! - One accounting record per calendar day
//! - The cumulative score and the per-date processed markers that keep
//!   carryover crediting exactly-once

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use super::data_dir;
use crate::budget::TimerSnapshot;
use crate::error::DatabaseError;
use crate::rollover::DayRecord;

const SNAPSHOT_KEY: &str = "timer_snapshot";
const SCORE_KEY: &str = "total_score";

/// Handle to the SQLite database.
///
/// Cheap to clone; all clones share one connection behind a mutex, so every
/// read-modify-write of a logical record goes through a single entry point.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at `~/.config/quizscreen/quizscreen.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        Self::open_at(data_dir()?.join("quizscreen.db"))
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|source| DatabaseError::OpenFailed { path, source })?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS day_records (
                    date                      TEXT PRIMARY KEY,
                    remaining_minutes         INTEGER NOT NULL,
                    overtime_minutes          INTEGER NOT NULL,
                    used_minutes              INTEGER NOT NULL DEFAULT 0,
                    potential_carryover_score INTEGER NOT NULL,
                    applied_carryover_score   INTEGER NOT NULL,
                    is_positive               INTEGER NOT NULL,
                    sealed                    INTEGER NOT NULL DEFAULT 0,
                    sealed_at                 TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_day_records_sealed ON day_records(sealed);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── kv ───────────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        kv_get(&self.lock(), key)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        kv_set(&self.lock(), key, value)
    }

    // ── Timer snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, snapshot: &TimerSnapshot) -> Result<(), DatabaseError> {
        let json =
            serde_json::to_string(snapshot).map_err(|e| DatabaseError::Encode(e.to_string()))?;
        self.kv_set(SNAPSHOT_KEY, &json)
    }

    pub fn load_snapshot(&self) -> Result<Option<TimerSnapshot>, DatabaseError> {
        match self.kv_get(SNAPSHOT_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| DatabaseError::Encode(e.to_string())),
            None => Ok(None),
        }
    }

    // ── Day records ──────────────────────────────────────────────────

    pub fn upsert_day_record(&self, record: &DayRecord) -> Result<(), DatabaseError> {
        upsert_day_record(&self.lock(), record)
    }

    pub fn get_day_record(&self, date: NaiveDate) -> Result<Option<DayRecord>, DatabaseError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT date, remaining_minutes, overtime_minutes, used_minutes,
                    potential_carryover_score, applied_carryover_score,
                    is_positive, sealed, sealed_at
             FROM day_records WHERE date = ?1",
        )?;
        let row = stmt
            .query_row(params![date.to_string()], row_to_raw)
            .optional()?;
        row.map(raw_to_record).transpose()
    }

    /// Day records, most recent first.
    pub fn list_day_records(&self, limit: usize) -> Result<Vec<DayRecord>, DatabaseError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT date, remaining_minutes, overtime_minutes, used_minutes,
                    potential_carryover_score, applied_carryover_score,
                    is_positive, sealed, sealed_at
             FROM day_records ORDER BY date DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_raw)?;
        let mut records = Vec::new();
        for raw in rows {
            records.push(raw_to_record(raw?)?);
        }
        Ok(records)
    }

    /// Seconds of recorded usage over `[from, to)`, for rolling-window
    /// weekly accounting.
    pub fn usage_secs_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, DatabaseError> {
        let conn = self.lock();
        let minutes: u64 = conn.query_row(
            "SELECT COALESCE(SUM(used_minutes), 0) FROM day_records
             WHERE date >= ?1 AND date < ?2",
            params![from.to_string(), to.to_string()],
            |row| row.get(0),
        )?;
        Ok(minutes * 60)
    }

    // ── Score and markers ────────────────────────────────────────────

    pub fn total_score(&self) -> Result<i64, DatabaseError> {
        total_score(&self.lock())
    }

    pub fn marker_exists(&self, key: &str) -> Result<bool, DatabaseError> {
        Ok(kv_get(&self.lock(), key)?.is_some())
    }

    /// Commit a day rollover in one transaction: the sealed record, the
    /// processed marker, the score adjustment, and the fresh snapshot all
    /// land together or not at all.
    ///
    /// If the marker for this date already exists the record and score are
    /// left untouched (a retry after a half-observed crash) and only the
    /// snapshot is written. Returns whether the carryover was applied now.
    pub fn commit_rollover(
        &self,
        record: &DayRecord,
        marker_key: &str,
        snapshot: &TimerSnapshot,
    ) -> Result<bool, DatabaseError> {
        let snapshot_json =
            serde_json::to_string(snapshot).map_err(|e| DatabaseError::Encode(e.to_string()))?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let already = kv_get(&tx, marker_key)?.is_some();
        if !already {
            upsert_day_record(&tx, record)?;
            kv_set(&tx, marker_key, &Utc::now().to_rfc3339())?;
            let score = total_score(&tx)?.saturating_add(record.applied_carryover_score);
            kv_set(&tx, SCORE_KEY, &score.to_string())?;
        }
        kv_set(&tx, SNAPSHOT_KEY, &snapshot_json)?;

        tx.commit()?;
        Ok(!already)
    }
}

// ── Row plumbing ─────────────────────────────────────────────────────

type RawDayRecord = (
    String,
    u64,
    u64,
    u64,
    i64,
    i64,
    bool,
    bool,
    Option<String>,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDayRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn raw_to_record(raw: RawDayRecord) -> Result<DayRecord, DatabaseError> {
    let (date, remaining, overtime, used, potential, applied, is_positive, sealed, sealed_at) = raw;
    Ok(DayRecord {
        date: date
            .parse()
            .map_err(|e| DatabaseError::QueryFailed(format!("bad date '{date}': {e}")))?,
        remaining_minutes: remaining,
        overtime_minutes: overtime,
        used_minutes: used,
        potential_carryover_score: potential,
        applied_carryover_score: applied,
        is_positive,
        sealed,
        sealed_at: sealed_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{s}': {e}")))
            })
            .transpose()?,
    })
}

fn kv_get(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
    Ok(stmt
        .query_row(params![key], |row| row.get::<_, String>(0))
        .optional()?)
}

fn kv_set(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn total_score(conn: &Connection) -> Result<i64, DatabaseError> {
    let stored = kv_get(conn, SCORE_KEY)?;
    match stored {
        Some(s) => s
            .parse()
            .map_err(|e| DatabaseError::QueryFailed(format!("bad score '{s}': {e}"))),
        None => Ok(0),
    }
}

fn upsert_day_record(conn: &Connection, record: &DayRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO day_records
            (date, remaining_minutes, overtime_minutes, used_minutes,
             potential_carryover_score, applied_carryover_score,
             is_positive, sealed, sealed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.date.to_string(),
            record.remaining_minutes,
            record.overtime_minutes,
            record.used_minutes,
            record.potential_carryover_score,
            record.applied_carryover_score,
            record.is_positive,
            record.sealed,
            record.sealed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}
