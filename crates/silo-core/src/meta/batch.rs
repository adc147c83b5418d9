//! Batch-job ledger: persistence and status machine.
//!
//! Jobs are JSON documents under `<root>/.silo/jobs/`. The ledger owns the
//! status machine and rejects illegal transitions; job *execution* is an
//! external concern.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::meta::store::{MetadataStore, scan_dir};
use crate::paths::PathResolver;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted, not yet being prepared.
    Pending,
    /// Manifest is being read.
    Preparing,
    /// Ready to run.
    Ready,
    /// Running.
    Active,
    /// Temporarily suspended.
    Paused,
    /// Cancellation requested, still winding down.
    Cancelling,
    /// Finished successfully.
    Complete,
    /// Finished with failure.
    Failed,
    /// Cancelled.
    Cancelled,
}

impl JobStatus {
    /// Whether a job may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::{
            Active, Cancelled, Cancelling, Complete, Failed, Paused, Pending, Preparing, Ready,
        };
        matches!(
            (self, next),
            (Pending, Preparing)
                | (Preparing, Ready)
                | (Ready, Active)
                | (Active, Complete | Failed | Cancelled | Paused | Cancelling)
                | (Paused, Active)
                | (Cancelling, Cancelled)
        )
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Preparing => "Preparing",
            Self::Ready => "Ready",
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Cancelling => "Cancelling",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// BatchJob
// ---------------------------------------------------------------------------

/// Progress counters of a batch job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Total items in the manifest.
    pub total: u64,
    /// Items processed so far.
    pub processed: u64,
    /// Items that failed.
    pub failed: u64,
}

/// A persisted batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    /// Unique job ID.
    pub id: String,
    /// Operation the job performs (e.g. `S3PutObjectCopy`).
    pub operation_type: String,
    /// Location of the manifest listing target objects.
    pub manifest_location: String,
    /// Scheduling priority; higher runs earlier.
    pub priority: i32,
    /// Current status.
    pub status: JobStatus,
    /// Progress counters.
    #[serde(default)]
    pub progress: JobProgress,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
    /// Reasons for failures, most recent last.
    #[serde(default)]
    pub failure_reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// BatchJobLedger
// ---------------------------------------------------------------------------

/// CRUD and status transitions for batch jobs.
#[derive(Debug, Clone)]
pub struct BatchJobLedger {
    resolver: PathResolver,
}

impl BatchJobLedger {
    /// Create a ledger over the given resolver.
    #[must_use]
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Create a new job in `Pending` state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn create(
        &self,
        operation_type: impl Into<String>,
        manifest_location: impl Into<String>,
        priority: i32,
    ) -> StorageResult<BatchJob> {
        let now = crate::utils::now_millis();
        let job = BatchJob {
            id: Uuid::new_v4().to_string(),
            operation_type: operation_type.into(),
            manifest_location: manifest_location.into(),
            priority,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            created_at: now,
            updated_at: now,
            failure_reasons: Vec::new(),
        };

        MetadataStore::write_json_atomic(&self.resolver.job_path(&job.id), &job).await?;
        debug!(job_id = %job.id, operation = %job.operation_type, "batch job created");
        Ok(job)
    }

    /// Fetch a job by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for an unknown job ID.
    pub async fn get(&self, job_id: &str) -> StorageResult<BatchJob> {
        MetadataStore::read_json(&self.resolver.job_path(job_id))
            .await?
            .ok_or_else(|| StorageError::InvalidArgument {
                message: format!("No such job: {job_id}"),
            })
    }

    /// List all jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn list(&self) -> StorageResult<Vec<BatchJob>> {
        let dir = self.resolver.jobs_dir();
        let mut jobs = Vec::new();
        for entry in scan_dir(&dir).await? {
            if entry.is_dir || !entry.name.ends_with(".json") {
                continue;
            }
            match MetadataStore::read_json::<BatchJob>(&dir.join(&entry.name)).await {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => warn!(file = %entry.name, error = %e, "skipping unreadable job document"),
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    /// Move a job to a new status, enforcing the legal transitions.
    ///
    /// An optional `failure_reason` is recorded alongside the transition.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for illegal transitions or
    /// unknown jobs.
    pub async fn update_status(
        &self,
        job_id: &str,
        next: JobStatus,
        failure_reason: Option<String>,
    ) -> StorageResult<BatchJob> {
        let mut job = self.get(job_id).await?;

        if !job.status.can_transition_to(next) {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "Illegal job transition {} -> {} for {job_id}",
                    job.status, next
                ),
            });
        }

        job.status = next;
        job.updated_at = crate::utils::now_millis();
        if let Some(reason) = failure_reason {
            job.failure_reasons.push(reason);
        }

        MetadataStore::write_json_atomic(&self.resolver.job_path(job_id), &job).await?;
        debug!(job_id, status = %job.status, "batch job transitioned");
        Ok(job)
    }

    /// Replace a job's progress counters.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for unknown jobs.
    pub async fn update_progress(
        &self,
        job_id: &str,
        progress: JobProgress,
    ) -> StorageResult<BatchJob> {
        let mut job = self.get(job_id).await?;
        job.progress = progress;
        job.updated_at = crate::utils::now_millis();
        MetadataStore::write_json_atomic(&self.resolver.job_path(job_id), &job).await?;
        Ok(job)
    }

    /// Delete a terminal job.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when the job is unknown or
    /// not in a terminal state.
    pub async fn delete(&self, job_id: &str) -> StorageResult<()> {
        let job = self.get(job_id).await?;
        if !job.status.is_terminal() {
            return Err(StorageError::InvalidArgument {
                message: format!("Job {job_id} is {} and cannot be deleted", job.status),
            });
        }
        MetadataStore::remove_if_exists(&self.resolver.job_path(job_id)).await?;
        debug!(job_id, "batch job deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
