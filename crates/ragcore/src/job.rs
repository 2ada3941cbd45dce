//! Job entity — in-memory lifecycle record for a discovery run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::SchemaStatus;

/// States of the job lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Accepted,
    InProgress,
    Retrying,
    Vectorizing,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    /// Whether this status is terminal (eligible for janitor retention tracking).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout
        )
    }

    /// The [`SchemaStatus`] this job status mirrors onto its Schema.
    pub fn mirrored_schema_status(&self) -> SchemaStatus {
        match self {
            JobStatus::Accepted => SchemaStatus::Pending,
            JobStatus::InProgress | JobStatus::Retrying | JobStatus::Vectorizing => {
                SchemaStatus::InProgress
            }
            JobStatus::Completed => SchemaStatus::Completed,
            JobStatus::Failed | JobStatus::Timeout => SchemaStatus::Failed,
        }
    }
}

/// An in-memory record of a schema discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub connection_id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub initial_memory: Option<u64>,
    #[serde(default)]
    pub final_memory: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the job reaches a terminal state; drives janitor retention.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_id: String, connection_id: String) -> Self {
        Job {
            job_id,
            connection_id,
            status: JobStatus::Accepted,
            started_at: Utc::now(),
            estimated_completion: None,
            retry_count: 0,
            initial_memory: None,
            final_memory: None,
            error: None,
            finished_at: None,
        }
    }

    /// Retention window in seconds for a terminal job.
    pub fn retention_secs(&self) -> i64 {
        if self.retry_count > 0 {
            7200
        } else if let (Some(finished), started) = (self.finished_at, self.started_at) {
            let exec_secs = (finished - started).num_seconds();
            if exec_secs > 300 {
                600
            } else {
                3600
            }
        } else {
            3600
        }
    }

    /// Whether the janitor should remove this job right now.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.finished_at {
            Some(finished) => (now - finished).num_seconds() >= self.retention_secs(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn retention_is_longer_after_retries() {
        let mut job = Job::new("j1".into(), "c1".into());
        job.retry_count = 2;
        job.status = JobStatus::Completed;
        job.finished_at = Some(job.started_at + Duration::seconds(10));
        assert_eq!(job.retention_secs(), 7200);
    }

    #[test]
    fn retention_is_shorter_for_long_running_jobs() {
        let mut job = Job::new("j1".into(), "c1".into());
        job.status = JobStatus::Completed;
        job.finished_at = Some(job.started_at + Duration::seconds(301));
        assert_eq!(job.retention_secs(), 600);
    }

    #[test]
    fn retention_is_default_for_quick_successful_jobs() {
        let mut job = Job::new("j1".into(), "c1".into());
        job.status = JobStatus::Completed;
        job.finished_at = Some(job.started_at + Duration::seconds(5));
        assert_eq!(job.retention_secs(), 3600);
    }

    #[test]
    fn unfinished_job_never_expires() {
        let job = Job::new("j1".into(), "c1".into());
        assert!(!job.is_expired(Utc::now() + Duration::days(1)));
    }

    #[test]
    fn finished_job_expires_after_retention_window() {
        let mut job = Job::new("j1".into(), "c1".into());
        job.status = JobStatus::Completed;
        job.finished_at = Some(Utc::now());
        assert!(!job.is_expired(Utc::now() + Duration::seconds(100)));
        assert!(job.is_expired(Utc::now() + Duration::seconds(3700)));
    }
}
