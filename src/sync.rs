use anyhow::Result;

use crate::client::JobBackend;
use crate::db::Database;
use crate::logging::recovered;
use crate::models::{FlagsRecord, JobFlags, JobListing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// No job has ever run; nothing was loaded.
    NoJob,
    Cache,
    Remote,
    /// The remote fetch failed; the view is loaded but empty.
    Unavailable,
}

/// One view's in-memory copy of the listings, merged with the persisted
/// flags. Each view activates its own; they only share the database.
pub struct JobSynchronizer<'a> {
    db: &'a Database,
    job_id: Option<String>,
    jobs: Vec<JobListing>,
    source: Source,
}

impl<'a> JobSynchronizer<'a> {
    /// Resolves the active job and loads its listings, cache first.
    /// Never fails: fetch and parse problems settle into an empty view.
    pub fn activate(db: &'a Database, backend: &dyn JobBackend) -> Self {
        let Some(job_id) = db.active_job_id() else {
            return Self {
                db,
                job_id: None,
                jobs: Vec::new(),
                source: Source::NoJob,
            };
        };

        let (jobs, source) = if let Some(cached) = db.load_cached_jobs(&job_id) {
            tracing::debug!(%job_id, count = cached.len(), "Loaded listings from cache");
            (cached, Source::Cache)
        } else {
            match recovered("fetch results", backend.fetch_results(&job_id)) {
                Some(fetched) => {
                    tracing::debug!(%job_id, count = fetched.len(), "Fetched listings");
                    recovered("store job cache", db.store_cached_jobs(&job_id, &fetched));
                    (fetched, Source::Remote)
                }
                None => (Vec::new(), Source::Unavailable),
            }
        };

        let flags = db.load_flags();
        Self {
            db,
            job_id: Some(job_id),
            jobs: merge_flags(jobs, &flags),
            source,
        }
    }

    pub fn jobs(&self) -> &[JobListing] {
        &self.jobs
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn has_job(&self) -> bool {
        self.job_id.is_some()
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn get(&self, id: &str) -> Option<&JobListing> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn toggle_save(&mut self, id: &str) -> Result<bool> {
        self.update(id, |flags| flags.saved = !flags.saved)
    }

    /// Sets `applied`; there is no way back.
    pub fn mark_applied(&mut self, id: &str) -> Result<bool> {
        self.update(id, |flags| flags.applied = true)
    }

    // Persist first, then commit in memory, so a failed write never leaves
    // this view ahead of what the next activation will see.
    fn update(&mut self, id: &str, change: impl FnOnce(&mut JobFlags)) -> Result<bool> {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        let mut flags = job.flags();
        change(&mut flags);

        self.db.put_flags(id, flags)?;
        job.saved = flags.saved;
        job.applied = flags.applied;
        tracing::debug!(id, saved = flags.saved, applied = flags.applied, "Flags updated");
        Ok(true)
    }
}

/// Persisted flags win; otherwise keep what the listing carries.
pub fn merge_flags(jobs: Vec<JobListing>, flags: &FlagsRecord) -> Vec<JobListing> {
    jobs.into_iter()
        .map(|mut job| {
            if let Some(stored) = flags.get(&job.id) {
                job.saved = stored.saved;
                job.applied = stored.applied;
            }
            job
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::db::JOB_CACHE_KEY;
    use crate::testing::{listing, FakeBackend};

    fn db_with_job(job_id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.set_active_job_id(job_id).unwrap();
        db
    }

    #[test]
    fn test_no_active_job_yields_empty_without_fetch() {
        let db = Database::open_in_memory().unwrap();
        let backend = FakeBackend::new().with_results(Ok(vec![listing("1", 90.0)]));

        let view = JobSynchronizer::activate(&db, &backend);

        assert!(!view.has_job());
        assert!(view.jobs().is_empty());
        assert_eq!(view.source(), Source::NoJob);
        assert_eq!(backend.fetches(), 0);
    }

    #[test]
    fn test_cache_first_skips_remote_fetch() {
        let db = db_with_job("job-1");
        db.store_cached_jobs("job-1", &[listing("1", 90.0), listing("2", 80.0)])
            .unwrap();
        db.put_flags("2", JobFlags { saved: true, applied: false }).unwrap();
        let backend = FakeBackend::new();

        let view = JobSynchronizer::activate(&db, &backend);

        assert_eq!(view.source(), Source::Cache);
        assert_eq!(view.jobs().len(), 2);
        assert!(view.get("2").unwrap().saved);
        assert_eq!(backend.fetches(), 0);
    }

    #[test]
    fn test_missing_cache_fetches_and_populates() {
        let db = db_with_job("job-1");
        let backend = FakeBackend::new().with_results(Ok(vec![listing("1", 90.0)]));

        let view = JobSynchronizer::activate(&db, &backend);
        assert_eq!(view.source(), Source::Remote);
        assert_eq!(backend.fetches(), 1);

        let again = JobSynchronizer::activate(&db, &backend);
        assert_eq!(again.source(), Source::Cache);
        assert_eq!(backend.fetches(), 1);
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_fetch_and_repopulates() {
        let db = db_with_job("job-1");
        db.write_raw(JOB_CACHE_KEY, "[{\"id\": ").unwrap();
        let backend = FakeBackend::new().with_results(Ok(vec![listing("1", 90.0)]));

        let view = JobSynchronizer::activate(&db, &backend);

        assert_eq!(view.source(), Source::Remote);
        assert_eq!(view.jobs().len(), 1);
        assert_eq!(db.load_cached_jobs("job-1").map(|j| j.len()), Some(1));
    }

    #[test]
    fn test_fetch_failure_settles_into_empty_loaded_view() {
        let db = db_with_job("job-1");
        let backend = FakeBackend::new().with_results(Err(ClientError::Results {
            status: 202,
            detail: "Workflow not yet complete".to_string(),
        }));

        let view = JobSynchronizer::activate(&db, &backend);

        assert!(view.has_job());
        assert!(view.jobs().is_empty());
        assert_eq!(view.source(), Source::Unavailable);
        assert!(db.load_cached_jobs("job-1").is_none());
    }

    #[test]
    fn test_stored_flags_override_embedded_flags() {
        let mut embedded = listing("X", 70.0);
        embedded.saved = false;
        embedded.applied = true;
        let mut flags = FlagsRecord::new();
        flags.insert("X".to_string(), JobFlags { saved: true, applied: false });

        let merged = merge_flags(vec![embedded, listing("Y", 60.0)], &flags);

        assert!(merged[0].saved);
        assert!(!merged[0].applied);
        assert!(!merged[1].saved);
    }

    #[test]
    fn test_embedded_flags_kept_without_stored_entry() {
        let mut embedded = listing("X", 70.0);
        embedded.saved = true;

        let merged = merge_flags(vec![embedded], &FlagsRecord::new());

        assert!(merged[0].saved);
        assert!(!merged[0].applied);
    }

    #[test]
    fn test_toggle_save_persists_and_flips() {
        let db = db_with_job("job-1");
        db.store_cached_jobs("job-1", &[listing("job-1", 90.0)]).unwrap();
        let backend = FakeBackend::new();
        let mut view = JobSynchronizer::activate(&db, &backend);

        assert!(view.toggle_save("job-1").unwrap());
        assert!(view.get("job-1").unwrap().saved);
        assert!(db.load_flags()["job-1"].saved);

        assert!(view.toggle_save("job-1").unwrap());
        assert!(!view.get("job-1").unwrap().saved);
        assert!(!db.load_flags()["job-1"].saved);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let db = db_with_job("job-1");
        db.store_cached_jobs("job-1", &[listing("1", 90.0)]).unwrap();
        let backend = FakeBackend::new();
        let mut view = JobSynchronizer::activate(&db, &backend);

        assert!(!view.toggle_save("missing").unwrap());
        assert!(!view.mark_applied("missing").unwrap());
        assert!(db.load_flags().is_empty());
    }

    #[test]
    fn test_applied_never_reverts() {
        let db = db_with_job("job-1");
        db.store_cached_jobs("job-1", &[listing("1", 90.0)]).unwrap();
        let backend = FakeBackend::new();
        let mut view = JobSynchronizer::activate(&db, &backend);

        view.mark_applied("1").unwrap();
        view.toggle_save("1").unwrap();
        view.toggle_save("1").unwrap();
        view.mark_applied("1").unwrap();

        assert!(view.get("1").unwrap().applied);
        let remounted = JobSynchronizer::activate(&db, &backend);
        assert!(remounted.get("1").unwrap().applied);
    }

    #[test]
    fn test_independent_views_share_flags_through_store() {
        let db = db_with_job("run-1");
        db.store_cached_jobs("run-1", &[listing("job-1", 90.0), listing("job-2", 80.0)])
            .unwrap();
        let backend = FakeBackend::new();

        let mut all_jobs = JobSynchronizer::activate(&db, &backend);
        all_jobs.toggle_save("job-1").unwrap();

        let saved_view = JobSynchronizer::activate(&db, &backend);
        assert!(saved_view.get("job-1").unwrap().saved);
        assert!(!saved_view.get("job-2").unwrap().saved);
        assert_eq!(backend.fetches(), 0);
    }

    #[test]
    fn test_stale_flags_for_unknown_ids_are_ignored() {
        let db = db_with_job("job-1");
        db.store_cached_jobs("job-1", &[listing("1", 90.0)]).unwrap();
        db.put_flags("gone", JobFlags { saved: true, applied: true }).unwrap();
        let backend = FakeBackend::new();

        let view = JobSynchronizer::activate(&db, &backend);

        assert_eq!(view.jobs().len(), 1);
        assert!(!view.jobs()[0].saved);
    }
}
