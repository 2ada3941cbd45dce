//! The active-jobs map: a single exclusive lock disciplines every read and
//! write, and the janitor copies candidate ids before releasing the lock so
//! removal never holds it across iteration.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use ragcore::{Error, Job, JobStatus, Result};
use std::sync::Arc;

#[derive(Default)]
pub struct JobStore {
    jobs: Arc<DashMap<String, Job>>,
    lock: Mutex<()>,
}

impl JobStore {
    pub fn new() -> Self {
        JobStore::default()
    }

    pub fn insert(&self, job: Job) {
        let _guard = self.lock.lock();
        self.jobs.insert(job.job_id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Result<Job> {
        let _guard = self.lock.lock();
        self.jobs
            .get(job_id)
            .map(|j| j.clone())
            .ok_or_else(|| Error::NotFound(format!("job '{job_id}' not found")))
    }

    /// Apply `f` to the job under the single exclusive lock, returning its
    /// updated snapshot. No I/O may happen inside `f`.
    pub fn update<F>(&self, job_id: &str, f: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.lock.lock();
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::NotFound(format!("job '{job_id}' not found")))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    pub fn list_active(&self) -> Vec<Job> {
        let _guard = self.lock.lock();
        self.jobs
            .iter()
            .filter(|e| !e.value().status.is_terminal())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Remove every terminal job whose retention window has elapsed.
    /// Acquires the lock once to snapshot candidates, releases it, then
    /// acquires it again to remove — so no I/O-free but long iteration ever
    /// holds the lock.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let candidates: Vec<String> = {
            let _guard = self.lock.lock();
            self.jobs
                .iter()
                .filter(|e| e.value().is_expired(now))
                .map(|e| e.key().clone())
                .collect()
        };
        let mut removed = 0;
        for id in candidates {
            let _guard = self.lock.lock();
            if self.jobs.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Mark every non-terminal job as failed with a shutdown error, for
    /// orderly process shutdown.
    pub fn fail_all_in_flight(&self, reason: &str) {
        let _guard = self.lock.lock();
        for mut entry in self.jobs.iter_mut() {
            if !entry.status.is_terminal() {
                entry.status = JobStatus::Failed;
                entry.error = Some(reason.to_string());
                entry.finished_at = Some(Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sweep_removes_only_expired_terminal_jobs() {
        let store = JobStore::new();
        let mut finished = Job::new("j1".into(), "c1".into());
        finished.status = JobStatus::Completed;
        finished.finished_at = Some(Utc::now() - Duration::seconds(4000));
        store.insert(finished);

        let mut fresh = Job::new("j2".into(), "c1".into());
        fresh.status = JobStatus::Completed;
        fresh.finished_at = Some(Utc::now());
        store.insert(fresh);

        let active = Job::new("j3".into(), "c1".into());
        store.insert(active);

        let removed = store.sweep_expired();
        assert_eq!(removed, 1);
        assert!(store.get("j1").is_err());
        assert!(store.get("j2").is_ok());
        assert!(store.get("j3").is_ok());
    }

    #[test]
    fn fail_all_in_flight_only_touches_non_terminal_jobs() {
        let store = JobStore::new();
        let mut done = Job::new("j1".into(), "c1".into());
        done.status = JobStatus::Completed;
        store.insert(done);
        store.insert(Job::new("j2".into(), "c1".into()));

        store.fail_all_in_flight("shutdown");

        assert_eq!(store.get("j1").unwrap().status, JobStatus::Completed);
        let j2 = store.get("j2").unwrap();
        assert_eq!(j2.status, JobStatus::Failed);
        assert_eq!(j2.error.as_deref(), Some("shutdown"));
    }

    #[test]
    fn update_mutates_under_the_lock_and_returns_snapshot() {
        let store = JobStore::new();
        store.insert(Job::new("j1".into(), "c1".into()));
        let updated = store
            .update("j1", |job| job.status = JobStatus::InProgress)
            .unwrap();
        assert_eq!(updated.status, JobStatus::InProgress);
    }
}
