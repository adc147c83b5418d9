//! The storage façade.
//!
//! [`SiloStore`] is the single concurrent-safe entry point bundling the
//! path resolver, I/O engine, metadata store, listing engine, multipart
//! coordinator, event dispatcher, and ledgers behind one public contract.
//! Individual operations are implemented in the [`crate::ops`] submodules
//! as `impl SiloStore` blocks.
//!
//! Every write operation follows the same shape: precondition checks →
//! data write (if any) → metadata write → event hand-off, with the event
//! dispatched only after all locks are released.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::configs::NotificationConfiguration;
use crate::error::{StorageError, StorageResult};
use crate::events::{EventDispatcher, EventType, make_record};
use crate::io::IoEngine;
use crate::locks::LockTable;
use crate::meta::MetadataStore;
use crate::meta::audit::{AuditEvent, AuditLedger, AuditPage, AuditQuery};
use crate::meta::batch::{BatchJob, BatchJobLedger, JobProgress, JobStatus};
use crate::paths::{self, PathResolver};

/// Source IP recorded for events originating inside the process.
const LOCAL_SOURCE_IP: &str = "127.0.0.1";

/// The storage core behind the request router.
///
/// Cheap to share: wrap in an [`Arc`] and clone the handle across tasks.
///
/// # Examples
///
/// ```
/// use silo_core::{SiloStore, StorageConfig};
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir().unwrap();
/// let config = StorageConfig::builder()
///     .root_path(dir.path().into())
///     .test_mode(true)
///     .build();
/// let store = SiloStore::open(config).await.unwrap();
/// assert!(store.list_buckets().await.unwrap().is_empty());
/// # });
/// ```
#[derive(Debug)]
pub struct SiloStore {
    /// Store configuration.
    pub(crate) config: StorageConfig,
    /// Sidecar metadata index.
    pub(crate) meta: MetadataStore,
    /// Chunked streaming reader/writer.
    pub(crate) io: IoEngine,
    /// Per-bucket / per-key serialization.
    pub(crate) locks: LockTable,
    /// Fire-and-forget event fan-out.
    pub(crate) events: EventDispatcher,
    /// Append-only audit log.
    pub(crate) audit: AuditLedger,
    /// Batch-job ledger.
    pub(crate) jobs: BatchJobLedger,
}

impl SiloStore {
    /// Open a store over `config.root_path`, creating the root and
    /// bookkeeping directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] when the root cannot be created.
    pub async fn open(mut config: StorageConfig) -> StorageResult<Self> {
        config.clamp();

        let resolver = PathResolver::new(config.root_path.clone());
        tokio::fs::create_dir_all(resolver.root())
            .await
            .map_err(|e| StorageError::io(format!("creating {}", resolver.root().display()), e))?;
        tokio::fs::create_dir_all(resolver.silo_dir())
            .await
            .map_err(|e| {
                StorageError::io(format!("creating {}", resolver.silo_dir().display()), e)
            })?;

        info!(root = %resolver.root().display(), test_mode = config.test_mode, "opening store");

        Ok(Self {
            meta: MetadataStore::new(resolver.clone()),
            io: IoEngine::new(config.chunk_size),
            locks: LockTable::new(),
            events: EventDispatcher::new(config.test_mode),
            audit: AuditLedger::new(resolver.audit_log_path()),
            jobs: BatchJobLedger::new(resolver),
            config,
        })
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The metadata store.
    #[must_use]
    pub fn metadata(&self) -> &MetadataStore {
        &self.meta
    }

    /// The event dispatcher.
    #[must_use]
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Emit an event for an internal state change. Best-effort: failures to
    /// load the notification configuration are logged and swallowed, and
    /// delivery never blocks the caller.
    ///
    /// Callers release all locks before invoking this.
    pub(crate) async fn emit(
        &self,
        event: EventType,
        bucket: &str,
        key: &str,
        size: u64,
        etag: &str,
        version_id: Option<String>,
        principal: &str,
    ) {
        let config = match self.notification_config(bucket).await {
            Ok(Some(config)) if !config.rules.is_empty() => config,
            Ok(_) => return,
            Err(e) => {
                warn!(bucket, error = %e, "skipping event emission, notification config unreadable");
                return;
            }
        };

        let owner_id = match self.meta.read_bucket_info(bucket).await {
            Ok(info) => info.owner.id,
            Err(_) => String::new(),
        };

        let record = make_record(
            event,
            bucket,
            &owner_id,
            key,
            size,
            etag,
            version_id,
            principal,
            LOCAL_SOURCE_IP,
        );
        self.events.dispatch(&record, &config);
    }

    /// Publish an event on behalf of an external trigger (restore
    /// completion, replication bookkeeping).
    ///
    /// When `key` resolves to a current version its size, ETag, and version
    /// ID are attached to the record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn publish_event(
        &self,
        bucket: &str,
        event_type: EventType,
        key: Option<&str>,
        principal: Option<&str>,
        source_ip: Option<&str>,
    ) -> StorageResult<()> {
        self.meta.require_bucket(bucket).await?;

        let Some(config) = self.notification_config(bucket).await? else {
            return Ok(());
        };

        let key = key.unwrap_or_default();
        let (size, etag, version_id) = match self.meta.get_metadata(bucket, key, None).await {
            Ok(record) => {
                let vid = if record.is_null_version() {
                    None
                } else {
                    Some(record.version_id)
                };
                (record.size, record.etag, vid)
            }
            Err(_) => (0, String::new(), None),
        };

        let owner_id = self.meta.read_bucket_info(bucket).await?.owner.id;
        let record = make_record(
            event_type,
            bucket,
            &owner_id,
            key,
            size,
            &etag,
            version_id,
            principal.unwrap_or("anonymous"),
            source_ip.unwrap_or(LOCAL_SOURCE_IP),
        );
        self.events.dispatch(&record, &config);
        Ok(())
    }

    /// Load the bucket's notification configuration, if any.
    pub(crate) async fn notification_config(
        &self,
        bucket: &str,
    ) -> StorageResult<Option<NotificationConfiguration>> {
        MetadataStore::read_json(
            &self
                .meta
                .resolver()
                .bucket_file(bucket, paths::BUCKET_NOTIFICATIONS_FILE),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Audit ledger
    // -----------------------------------------------------------------------

    /// Append an audit event.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn append_audit_event(&self, event: &AuditEvent) -> StorageResult<()> {
        self.audit.append(event).await
    }

    /// Query audit events with filters and pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for a malformed cursor.
    pub async fn query_audit_events(&self, query: &AuditQuery) -> StorageResult<AuditPage> {
        self.audit.query(query).await
    }

    /// Purge audit events older than `cutoff`; returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn purge_audit_events(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<usize> {
        self.audit.purge_older_than(cutoff).await
    }

    // -----------------------------------------------------------------------
    // Batch jobs
    // -----------------------------------------------------------------------

    /// Create a batch job in `Pending` state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn create_batch_job(
        &self,
        operation_type: impl Into<String>,
        manifest_location: impl Into<String>,
        priority: i32,
    ) -> StorageResult<BatchJob> {
        self.jobs.create(operation_type, manifest_location, priority).await
    }

    /// Fetch a batch job.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for an unknown job.
    pub async fn get_batch_job(&self, job_id: &str) -> StorageResult<BatchJob> {
        self.jobs.get(job_id).await
    }

    /// List batch jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn list_batch_jobs(&self) -> StorageResult<Vec<BatchJob>> {
        self.jobs.list().await
    }

    /// Transition a batch job's status (legal transitions only).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for illegal transitions.
    pub async fn update_batch_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> StorageResult<BatchJob> {
        self.jobs.update_status(job_id, status, failure_reason).await
    }

    /// Replace a batch job's progress counters.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for an unknown job.
    pub async fn update_batch_job_progress(
        &self,
        job_id: &str,
        progress: JobProgress,
    ) -> StorageResult<BatchJob> {
        self.jobs.update_progress(job_id, progress).await
    }

    /// Delete a terminal batch job.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when the job is not
    /// terminal.
    pub async fn delete_batch_job(&self, job_id: &str) -> StorageResult<()> {
        self.jobs.delete(job_id).await
    }

    // -----------------------------------------------------------------------
    // Background sweeper
    // -----------------------------------------------------------------------

    /// Spawn the periodic orphaned-upload sweeper.
    ///
    /// Runs [`SiloStore::sweep_orphaned_uploads`] every `interval` until
    /// the task is aborted or every other handle to the store is dropped.
    pub fn spawn_orphan_sweeper(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                if let Err(e) = store.sweep_orphaned_uploads().await {
                    warn!(error = %e, "orphan sweep failed");
                }
            }
        })
    }
}
