use crate::utils::generate_job_id;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Downloading,
    Finalizing,
    Completed,
    Error,
    /// Read-side sentinel for ids that were never created or have been
    /// evicted; never stored in the registry
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Position along the lifecycle; transitions only ever move forward
    fn phase(&self) -> u8 {
        match self {
            JobStatus::Unknown | JobStatus::Queued => 0,
            JobStatus::Starting => 1,
            JobStatus::Downloading => 2,
            JobStatus::Finalizing => 3,
            JobStatus::Completed | JobStatus::Error => 4,
        }
    }
}

/// Point-in-time state of a job as observed by pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub percent: f32,
    pub speed: String,
    pub eta: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn unknown(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Unknown,
            percent: 0.0,
            speed: String::new(),
            eta: "Unknown".to_string(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// One normalized state change, applied to the registry as a whole
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUpdate {
    pub status: JobStatus,
    pub percent: f32,
    pub speed: String,
    pub eta: String,
    pub error: Option<String>,
}

impl SnapshotUpdate {
    pub fn status_only(status: JobStatus, eta: &str) -> Self {
        Self {
            status,
            percent: 0.0,
            speed: String::new(),
            eta: eta.to_string(),
            error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: JobStatus::Completed,
            percent: 100.0,
            speed: String::new(),
            eta: "Completed!".to_string(),
            error: None,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            status: JobStatus::Error,
            percent: 0.0,
            speed: String::new(),
            eta: format!("Error: {}", message),
            error: Some(message),
        }
    }
}

/// Keyed job registry with single-writer-per-key, many-reader semantics.
///
/// Each job's sole writer is its own background unit; pollers read
/// concurrently through `get_snapshot`. Records are replaced wholesale under
/// the write lock, so a reader never observes a half-applied update.
pub struct JobManager {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new job in `queued` state and returns its id
    pub async fn create_job(&self) -> String {
        let id = generate_job_id();
        let mut jobs = self.jobs.write().await;
        jobs.insert(id.clone(), JobRecord::new(id.clone()));
        debug!("Created job {}", id);
        id
    }

    /// Overwrites the stored record for `id` with the new snapshot.
    ///
    /// A snapshot for an unknown id is dropped with a log line, a terminal
    /// record is never overwritten, and the lifecycle invariants hold even
    /// against a misbehaving event stream: a status that would move the job
    /// backwards (e.g. finalizing -> downloading when the engine starts its
    /// second file) is dropped, and percent never regresses below the stored
    /// value until a terminal update lands.
    pub async fn apply_snapshot(&self, id: &str, update: SnapshotUpdate) {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(id) else {
            warn!("Dropping snapshot for unknown job {}", id);
            return;
        };

        if record.status.is_terminal() {
            debug!(
                "Ignoring {:?} update for job {} already in {:?}",
                update.status, id, record.status
            );
            return;
        }

        if update.status.phase() < record.status.phase() {
            debug!(
                "Ignoring {:?} update for job {} already in {:?}",
                update.status, id, record.status
            );
            return;
        }

        if record.started_at.is_none() && update.status != JobStatus::Queued {
            record.started_at = Some(Utc::now());
        }
        if update.status.is_terminal() {
            record.completed_at = Some(Utc::now());
        }

        record.status = update.status;
        record.percent = if update.status.is_terminal() {
            update.percent
        } else {
            update.percent.max(record.percent)
        };
        record.speed = update.speed;
        record.eta = update.eta;
        record.error = update.error;
    }

    /// Returns the current record for `id`, or the `unknown` sentinel.
    /// Polling a nonexistent id is not an error.
    pub async fn get_snapshot(&self, id: &str) -> JobRecord {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .cloned()
            .unwrap_or_else(|| JobRecord::unknown(id.to_string()))
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}
