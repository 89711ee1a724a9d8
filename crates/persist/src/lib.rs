//! Runboard persistence: SQLite table of per-experiment view state.
//! One JSON row per experiment; writes replace the previous row.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;
use tracing::debug;

use runboard_store::ViewState;

pub trait ViewStateRepo {
    fn put(&self, experiment: &str, state: &ViewState) -> Result<()>;
    fn get(&self, experiment: &str) -> Result<Option<ViewState>>;
    fn delete(&self, experiment: &str) -> Result<bool>;
    /// Experiment ids with a stored state, most recently written first.
    fn list(&self) -> Result<Vec<String>>;

    /// Write `after` only if it differs from `before`, so read-only commands
    /// leave the stored row and its recency untouched.
    fn put_if_changed(&self, experiment: &str, before: &ViewState, after: &ViewState) -> Result<bool> {
        if before == after {
            debug!(experiment = %experiment, "persist: view state unchanged, skipping write");
            return Ok(false);
        }
        self.put(experiment, after)?;
        Ok(true)
    }
}

/// SQLite-backed repo. Simple and synchronous; view state is small and written on user action only.
pub struct SqliteStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("RUNBOARD_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS view_state (
                experiment_id TEXT PRIMARY KEY,
                ts            INTEGER NOT NULL,
                state         TEXT NOT NULL
            )",
            [],
        )
        .context("creating view_state table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: std::sync::Mutex::new(db) })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ViewStateRepo for SqliteStore {
    fn put(&self, experiment: &str, state: &ViewState) -> Result<()> {
        let started = std::time::Instant::now();
        let json = serde_json::to_string(state).context("encoding view state")?;
        self.conn()
            .execute(
                "INSERT INTO view_state(experiment_id, ts, state) VALUES (?1, ?2, ?3)
                 ON CONFLICT(experiment_id) DO UPDATE SET ts = excluded.ts, state = excluded.state",
                (experiment, now_ts(), &json),
            )
            .with_context(|| format!("writing view state for {}", experiment))?;
        debug!(experiment = %experiment, bytes = json.len(), "persist: view state saved");
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn get(&self, experiment: &str) -> Result<Option<ViewState>> {
        let started = std::time::Instant::now();
        let raw: Option<String> = self
            .conn()
            .query_row("SELECT state FROM view_state WHERE experiment_id = ?1", [experiment], |row| row.get(0))
            .optional()?;
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        raw.map(|s| serde_json::from_str(&s).with_context(|| format!("decoding view state for {}", experiment)))
            .transpose()
    }

    fn delete(&self, experiment: &str) -> Result<bool> {
        let n = self.conn().execute("DELETE FROM view_state WHERE experiment_id = ?1", [experiment])?;
        Ok(n > 0)
    }

    fn list(&self) -> Result<Vec<String>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT experiment_id FROM view_state ORDER BY ts DESC, rowid DESC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get(0)?);
        }
        Ok(out)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".runboard");
        let _ = std::fs::create_dir_all(&p);
        p.push("runboard.db");
        return p.to_string_lossy().to_string();
    }
    "runboard.db".to_string()
}

pub fn now_ts() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}
