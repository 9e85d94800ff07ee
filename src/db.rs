use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::recovered;
use crate::models::{FlagsRecord, JobFlags, JobListing};

pub(crate) const ACTIVE_JOB_KEY: &str = "active_job_id";
pub(crate) const JOB_CACHE_KEY: &str = "job_results_cache";
pub(crate) const FLAGS_KEY: &str = "job_flags";

pub const DB_FILE_NAME: &str = "joblens.db";

/// Local persisted state. Plays the role of browser local storage: a flat
/// key/value table that outlives any single view.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResults {
    job_id: String,
    jobs: Vec<JobListing>,
}

impl Database {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let path = data_dir.join(DB_FILE_NAME);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Self { conn, path };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS local_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    // --- Raw key/value access ---

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM local_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read '{}'", key)),
        }
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO local_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .with_context(|| format!("Failed to write '{}'", key))?;
        Ok(())
    }

    fn remove_value(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM local_state WHERE key = ?1", [key])
            .with_context(|| format!("Failed to remove '{}'", key))?;
        Ok(())
    }

    // --- Active job ---

    /// The job identifier of the last successful submission. Unreadable
    /// state counts as "no job has ever run".
    pub fn active_job_id(&self) -> Option<String> {
        recovered("read active job id", self.get_value(ACTIVE_JOB_KEY))
            .flatten()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn set_active_job_id(&self, job_id: &str) -> Result<()> {
        self.set_value(ACTIVE_JOB_KEY, job_id)
    }

    pub fn clear_active_job_id(&self) -> Result<()> {
        self.remove_value(ACTIVE_JOB_KEY)
    }

    // --- Job cache ---

    /// Cached listings for `job_id`. A corrupt payload is discarded and a
    /// payload written for another job counts as absent.
    pub fn load_cached_jobs(&self, job_id: &str) -> Option<Vec<JobListing>> {
        let raw = recovered("read job cache", self.get_value(JOB_CACHE_KEY)).flatten()?;
        match recovered("parse job cache", serde_json::from_str::<CachedResults>(&raw)) {
            Some(cached) if cached.job_id == job_id => Some(cached.jobs),
            Some(cached) => {
                tracing::debug!(cached = %cached.job_id, active = %job_id, "Ignoring cache for another job");
                None
            }
            None => {
                recovered("discard corrupt job cache", self.remove_value(JOB_CACHE_KEY));
                None
            }
        }
    }

    pub fn store_cached_jobs(&self, job_id: &str, jobs: &[JobListing]) -> Result<()> {
        let payload = serde_json::to_string(&CachedResults {
            job_id: job_id.to_string(),
            jobs: jobs.to_vec(),
        })
        .context("Failed to serialize job cache")?;
        self.set_value(JOB_CACHE_KEY, &payload)
    }

    pub fn clear_cached_jobs(&self) -> Result<()> {
        self.remove_value(JOB_CACHE_KEY)
    }

    // --- Flags ---

    /// The full flag mapping. Missing or corrupt state loads as empty.
    pub fn load_flags(&self) -> FlagsRecord {
        let Some(raw) = recovered("read flags", self.get_value(FLAGS_KEY)).flatten() else {
            return FlagsRecord::new();
        };
        recovered("parse flags", serde_json::from_str::<FlagsRecord>(&raw)).unwrap_or_default()
    }

    pub fn save_flags(&self, flags: &FlagsRecord) -> Result<()> {
        let payload = serde_json::to_string(flags).context("Failed to serialize flags")?;
        self.set_value(FLAGS_KEY, &payload)
    }

    pub fn put_flags(&self, id: &str, flags: JobFlags) -> Result<()> {
        let mut record = self.load_flags();
        record.insert(id.to_string(), flags);
        self.save_flags(&record)
    }

    #[cfg(test)]
    pub fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value)
    }
}
