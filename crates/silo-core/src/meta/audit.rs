//! Append-only audit ledger.
//!
//! Events are appended as JSON lines to `<root>/.silo/audit.log`. Queries
//! stream the file line by line, applying filters over bucket, principal,
//! event type, and time range, with pagination via an opaque cursor.
//! Corrupt lines are skipped with a warning rather than failing the query.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::utils::{decode_cursor, encode_cursor, generate_request_id};

/// Default page size for audit queries.
const DEFAULT_QUERY_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event ID.
    pub id: String,
    /// When the event occurred.
    pub time: DateTime<Utc>,
    /// Operation name (e.g. `PutObject`, `DeleteBucket`).
    pub event_type: String,
    /// Principal that performed the operation.
    pub principal: String,
    /// Bucket involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Key involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Free-form detail message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Create an event stamped now with a generated ID.
    #[must_use]
    pub fn new(event_type: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            id: generate_request_id(),
            time: crate::utils::now_millis(),
            event_type: event_type.into(),
            principal: principal.into(),
            bucket: None,
            key: None,
            detail: None,
        }
    }

    /// Attach a bucket name.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Attach an object key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Filters and pagination for an audit query.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Only events for this bucket.
    pub bucket: Option<String>,
    /// Only events by this principal.
    pub principal: Option<String>,
    /// Only events of this type.
    pub event_type: Option<String>,
    /// Only events at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only events at or before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Opaque cursor from a previous page.
    pub continuation_token: Option<String>,
    /// Maximum events per page (default 100).
    pub max_results: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref bucket) = self.bucket {
            if event.bucket.as_deref() != Some(bucket.as_str()) {
                return false;
            }
        }
        if let Some(ref principal) = self.principal {
            if event.principal != *principal {
                return false;
            }
        }
        if let Some(ref event_type) = self.event_type {
            if event.event_type != *event_type {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.time < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.time > to {
                return false;
            }
        }
        true
    }
}

/// One page of audit query results.
#[derive(Debug, Clone)]
pub struct AuditPage {
    /// Matching events in append order.
    pub events: Vec<AuditEvent>,
    /// Whether more results remain.
    pub is_truncated: bool,
    /// Cursor for the next page.
    pub next_continuation_token: Option<String>,
}

// ---------------------------------------------------------------------------
// AuditLedger
// ---------------------------------------------------------------------------

/// Append-only audit log with filtered queries.
#[derive(Debug)]
pub struct AuditLedger {
    path: PathBuf,
    /// Serializes appends and purges; queries read a consistent snapshot
    /// of complete lines and need no lock.
    write_lock: Mutex<()>,
}

impl AuditLedger {
    /// Create a ledger persisting to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one event.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn append(&self, event: &AuditEvent) -> StorageResult<()> {
        let mut line = serde_json::to_vec(event).map_err(|e| {
            StorageError::Internal(anyhow::Error::new(e).context("serializing audit event"))
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StorageError::io(format!("opening {}", self.path.display()), e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StorageError::io(format!("appending {}", self.path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io(format!("flushing {}", self.path.display()), e))?;

        debug!(event_type = %event.event_type, principal = %event.principal, "audit event appended");
        Ok(())
    }

    /// Query events matching the filters, in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for a malformed cursor and
    /// [`StorageError::Internal`] on I/O failure.
    pub async fn query(&self, query: &AuditQuery) -> StorageResult<AuditPage> {
        let skip = match &query.continuation_token {
            Some(token) => usize::try_from(decode_cursor(token)?).unwrap_or(usize::MAX),
            None => 0,
        };
        let limit = query.max_results.unwrap_or(DEFAULT_QUERY_LIMIT).max(1);

        let file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuditPage {
                    events: Vec::new(),
                    is_truncated: false,
                    next_continuation_token: None,
                });
            }
            Err(e) => return Err(StorageError::io(format!("opening {}", self.path.display()), e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_no: usize = 0;
        let mut is_truncated = false;
        let mut next_token = None;

        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| StorageError::io(format!("reading {}", self.path.display()), e))?;
            let Some(line) = line else { break };
            let current = line_no;
            line_no += 1;

            if current < skip || line.trim().is_empty() {
                continue;
            }

            let event: AuditEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line = current, error = %e, "skipping corrupt audit line");
                    continue;
                }
            };

            if !query.matches(&event) {
                continue;
            }

            if events.len() >= limit {
                is_truncated = true;
                next_token = Some(encode_cursor(current as u64));
                break;
            }
            events.push(event);
        }

        Ok(AuditPage {
            events,
            is_truncated,
            next_continuation_token: next_token,
        })
    }

    /// Remove events older than `cutoff`, returning how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().await;

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(format!("reading {}", self.path.display()), e)),
        };

        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0usize;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) if event.time < cutoff => removed += 1,
                // Unparseable lines are dropped along with expired events.
                Err(e) => {
                    warn!(error = %e, "dropping corrupt audit line during purge");
                    removed += 1;
                }
                Ok(_) => {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        super::store::MetadataStore::write_json_atomic_raw(&self.path, kept.as_bytes()).await?;
        debug!(removed, "purged audit events");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
