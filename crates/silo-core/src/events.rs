//! Event dispatch: typed records fanned out to configured sinks.
//!
//! Qualifying state changes produce an [`EventRecord`] which is matched
//! against the bucket's notification rules and queued for delivery on a
//! background task, so the originating operation never waits on network
//! I/O. The queue is bounded; overflow drops the oldest pending delivery
//! with a warning. Delivery failures are logged per sink and never surface
//! to the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::configs::{NotificationConfiguration, SinkKind};

/// Default per-emission timeout for network sinks.
const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded in-memory queue capacity.
const QUEUE_CAPACITY: usize = 10_000;

/// Delivery attempts per sink before giving up.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Typed S3 event names, including the `*` wildcard forms used in
/// notification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Any object-created event.
    #[serde(rename = "s3:ObjectCreated:*")]
    ObjectCreatedAll,
    /// A put created an object version.
    #[serde(rename = "s3:ObjectCreated:Put")]
    ObjectCreatedPut,
    /// A copy created an object version.
    #[serde(rename = "s3:ObjectCreated:Copy")]
    ObjectCreatedCopy,
    /// A multipart completion created an object version.
    #[serde(rename = "s3:ObjectCreated:CompleteMultipartUpload")]
    ObjectCreatedCompleteMultipartUpload,
    /// Any object-removed event.
    #[serde(rename = "s3:ObjectRemoved:*")]
    ObjectRemovedAll,
    /// A version was permanently deleted.
    #[serde(rename = "s3:ObjectRemoved:Delete")]
    ObjectRemovedDelete,
    /// A delete marker was created.
    #[serde(rename = "s3:ObjectRemoved:DeleteMarkerCreated")]
    ObjectRemovedDeleteMarkerCreated,
    /// Any restore event.
    #[serde(rename = "s3:ObjectRestore:*")]
    ObjectRestoreAll,
    /// A restore was initiated.
    #[serde(rename = "s3:ObjectRestore:Post")]
    ObjectRestorePost,
    /// A restore completed.
    #[serde(rename = "s3:ObjectRestore:Completed")]
    ObjectRestoreCompleted,
    /// Any replication event.
    #[serde(rename = "s3:Replication:*")]
    ReplicationAll,
    /// Replication of an object failed.
    #[serde(rename = "s3:Replication:OperationFailedReplication")]
    ReplicationOperationFailed,
}

impl EventType {
    /// The wire event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectCreatedAll => "s3:ObjectCreated:*",
            Self::ObjectCreatedPut => "s3:ObjectCreated:Put",
            Self::ObjectCreatedCopy => "s3:ObjectCreated:Copy",
            Self::ObjectCreatedCompleteMultipartUpload => {
                "s3:ObjectCreated:CompleteMultipartUpload"
            }
            Self::ObjectRemovedAll => "s3:ObjectRemoved:*",
            Self::ObjectRemovedDelete => "s3:ObjectRemoved:Delete",
            Self::ObjectRemovedDeleteMarkerCreated => "s3:ObjectRemoved:DeleteMarkerCreated",
            Self::ObjectRestoreAll => "s3:ObjectRestore:*",
            Self::ObjectRestorePost => "s3:ObjectRestore:Post",
            Self::ObjectRestoreCompleted => "s3:ObjectRestore:Completed",
            Self::ReplicationAll => "s3:Replication:*",
            Self::ReplicationOperationFailed => "s3:Replication:OperationFailedReplication",
        }
    }

    /// Whether this (possibly wildcard) subscription matches a concrete
    /// event.
    #[must_use]
    pub fn matches(&self, other: EventType) -> bool {
        if *self == other {
            return true;
        }
        match self {
            Self::ObjectCreatedAll => matches!(
                other,
                Self::ObjectCreatedPut
                    | Self::ObjectCreatedCopy
                    | Self::ObjectCreatedCompleteMultipartUpload
            ),
            Self::ObjectRemovedAll => matches!(
                other,
                Self::ObjectRemovedDelete | Self::ObjectRemovedDeleteMarkerCreated
            ),
            Self::ObjectRestoreAll => {
                matches!(other, Self::ObjectRestorePost | Self::ObjectRestoreCompleted)
            }
            Self::ReplicationAll => matches!(other, Self::ReplicationOperationFailed),
            _ => false,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// The bucket portion of an event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBucket {
    /// Bucket name.
    pub name: String,
    /// Canonical ID of the bucket owner.
    pub owner_id: String,
    /// Bucket ARN.
    pub arn: String,
}

/// The object portion of an event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventObject {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Object ETag.
    pub e_tag: String,
    /// Version ID, when versioning applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Monotonic ordering hint for events on the same key.
    pub sequencer: String,
}

/// A typed event record delivered to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// The concrete event name.
    pub event_name: EventType,
    /// When the event occurred.
    pub event_time: DateTime<Utc>,
    /// Request ID of the originating operation.
    pub request_id: String,
    /// Principal that triggered the operation.
    pub principal_id: String,
    /// Source IP of the originating request.
    pub source_ip: String,
    /// The bucket involved.
    pub bucket: EventBucket,
    /// The object involved.
    pub object: EventObject,
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// A queued delivery of one record to one sink.
#[derive(Debug)]
struct DeliveryTask {
    record: EventRecord,
    sink: SinkKind,
    rule_id: String,
}

/// Shared queue state between the dispatcher handle and its worker task.
#[derive(Debug)]
struct EventQueue {
    tasks: parking_lot::Mutex<VecDeque<DeliveryTask>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Fire-and-forget event dispatcher.
///
/// Matching and enqueueing are synchronous and non-blocking; delivery runs
/// on a dedicated background task. Dropping the dispatcher drains nothing:
/// the worker exits once the queue is empty.
#[derive(Debug)]
pub struct EventDispatcher {
    queue: Arc<EventQueue>,
    test_mode: bool,
}

impl EventDispatcher {
    /// Create a dispatcher and spawn its delivery worker.
    ///
    /// When `test_mode` is true all network emission is suppressed;
    /// deliveries are logged and counted as successful.
    #[must_use]
    pub fn new(test_mode: bool) -> Self {
        Self::with_timeout(test_mode, DEFAULT_SINK_TIMEOUT)
    }

    /// Create a dispatcher with a custom per-emission timeout.
    #[must_use]
    pub fn with_timeout(test_mode: bool, timeout: Duration) -> Self {
        let queue = Arc::new(EventQueue {
            tasks: parking_lot::Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        tokio::spawn(delivery_worker(Arc::clone(&queue), client, test_mode));

        Self { queue, test_mode }
    }

    /// Whether network emission is suppressed.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Match `record` against `config` and queue one delivery per matching
    /// rule. Never blocks; overflow drops the oldest pending delivery.
    pub fn dispatch(&self, record: &EventRecord, config: &NotificationConfiguration) {
        let rules = config.matching_rules(record.event_name, &record.object.key);
        if rules.is_empty() {
            return;
        }

        debug!(
            event = %record.event_name,
            bucket = %record.bucket.name,
            key = %record.object.key,
            sinks = rules.len(),
            "queueing event deliveries"
        );

        let mut tasks = self.queue.tasks.lock();
        for rule in rules {
            if tasks.len() >= QUEUE_CAPACITY {
                let dropped = tasks.pop_front();
                warn!(
                    dropped_rule = dropped.as_ref().map_or("", |t| t.rule_id.as_str()),
                    "event queue full, dropping oldest delivery"
                );
            }
            tasks.push_back(DeliveryTask {
                record: record.clone(),
                sink: rule.sink.clone(),
                rule_id: rule.id.clone(),
            });
        }
        drop(tasks);
        self.queue.notify.notify_one();
    }

    /// Number of deliveries waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.tasks.lock().len()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.queue.closed.store(true, Ordering::SeqCst);
        self.queue.notify.notify_waiters();
    }
}

/// Background delivery loop: pop tasks, deliver with bounded retries, log
/// outcomes. Exits when the dispatcher is dropped and the queue is drained.
async fn delivery_worker(queue: Arc<EventQueue>, client: reqwest::Client, test_mode: bool) {
    loop {
        let notified = queue.notify.notified();
        let task = queue.tasks.lock().pop_front();

        if let Some(task) = task {
            deliver_with_retry(&client, &task, test_mode).await;
            continue;
        }

        if queue.closed.load(Ordering::SeqCst) {
            break;
        }
        notified.await;
    }
    debug!("event delivery worker stopped");
}

/// Deliver one task, retrying transient failures a bounded number of times.
async fn deliver_with_retry(client: &reqwest::Client, task: &DeliveryTask, test_mode: bool) {
    for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
        match deliver(client, &task.sink, &task.record, test_mode).await {
            Ok(()) => {
                debug!(rule = %task.rule_id, sink = task.sink.label(), attempt, "event delivered");
                return;
            }
            Err(e) if attempt < MAX_DELIVERY_ATTEMPTS => {
                warn!(rule = %task.rule_id, sink = task.sink.label(), attempt, error = %e, "event delivery failed, retrying");
            }
            Err(e) => {
                error!(rule = %task.rule_id, sink = task.sink.label(), error = %e, "giving up on event delivery");
            }
        }
    }
}

/// Deliver one record to one sink.
async fn deliver(
    client: &reqwest::Client,
    sink: &SinkKind,
    record: &EventRecord,
    test_mode: bool,
) -> Result<(), String> {
    match sink {
        SinkKind::Webhook { url } => {
            if test_mode {
                debug!(url = %url, "test mode, webhook emission suppressed");
                return Ok(());
            }
            let response = client
                .post(url)
                .json(&record)
                .send()
                .await
                .map_err(|e| format!("webhook request failed: {e}"))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(format!("webhook returned status {}", response.status()))
            }
        }
        // Reserved interfaces: broker transports live outside the storage
        // core, so these deliveries are recorded and considered done.
        SinkKind::Topic { arn } | SinkKind::Queue { arn } | SinkKind::Function { arn } => {
            debug!(arn = %arn, kind = sink.label(), event = %record.event_name, "sink delivery recorded");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Record construction
// ---------------------------------------------------------------------------

/// Builder-free constructor for event records.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn make_record(
    event_name: EventType,
    bucket: &str,
    bucket_owner_id: &str,
    key: &str,
    size: u64,
    etag: &str,
    version_id: Option<String>,
    principal_id: &str,
    source_ip: &str,
) -> EventRecord {
    let now = crate::utils::now_millis();
    EventRecord {
        event_name,
        event_time: now,
        request_id: crate::utils::generate_request_id(),
        principal_id: principal_id.to_owned(),
        source_ip: source_ip.to_owned(),
        bucket: EventBucket {
            name: bucket.to_owned(),
            owner_id: bucket_owner_id.to_owned(),
            arn: format!("arn:aws:s3:::{bucket}"),
        },
        object: EventObject {
            key: key.to_owned(),
            size,
            e_tag: etag.to_owned(),
            version_id,
            sequencer: crate::utils::sequencer(now),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::NotificationRule;

    fn record(event: EventType, key: &str) -> EventRecord {
        make_record(
            event,
            "test-bucket",
            "owner-1",
            key,
            42,
            "etag",
            None,
            "principal-1",
            "127.0.0.1",
        )
    }

    fn webhook_config(prefix: &str) -> NotificationConfiguration {
        NotificationConfiguration {
            rules: vec![NotificationRule {
                id: "r1".to_owned(),
                events: vec![EventType::ObjectCreatedAll],
                prefix: prefix.to_owned(),
                suffix: String::new(),
                sink: SinkKind::Webhook {
                    url: "http://localhost:1/unreachable".to_owned(),
                },
            }],
        }
    }

    // -----------------------------------------------------------------------
    // EventType matching
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_match_exact_event_type() {
        assert!(EventType::ObjectCreatedPut.matches(EventType::ObjectCreatedPut));
        assert!(!EventType::ObjectCreatedPut.matches(EventType::ObjectCreatedCopy));
    }

    #[test]
    fn test_should_match_wildcard_event_types() {
        assert!(EventType::ObjectCreatedAll.matches(EventType::ObjectCreatedPut));
        assert!(EventType::ObjectCreatedAll.matches(EventType::ObjectCreatedCompleteMultipartUpload));
        assert!(EventType::ObjectRemovedAll.matches(EventType::ObjectRemovedDeleteMarkerCreated));
        assert!(EventType::ObjectRestoreAll.matches(EventType::ObjectRestoreCompleted));
        assert!(EventType::ReplicationAll.matches(EventType::ReplicationOperationFailed));
        assert!(!EventType::ObjectCreatedAll.matches(EventType::ObjectRemovedDelete));
    }

    #[test]
    fn test_should_serialize_event_type_as_wire_name() {
        let json = serde_json::to_string(&EventType::ObjectRemovedDeleteMarkerCreated)
            .expect("test serialization");
        assert_eq!(json, "\"s3:ObjectRemoved:DeleteMarkerCreated\"");
        assert_eq!(
            EventType::ObjectCreatedPut.to_string(),
            "s3:ObjectCreated:Put"
        );
    }

    // -----------------------------------------------------------------------
    // Record construction
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_build_record_with_arn_and_sequencer() {
        let r = record(EventType::ObjectCreatedPut, "a/b.txt");
        assert_eq!(r.bucket.arn, "arn:aws:s3:::test-bucket");
        assert_eq!(r.object.key, "a/b.txt");
        assert!(!r.object.sequencer.is_empty());
        assert_eq!(r.request_id.len(), 32);
    }

    #[test]
    fn test_should_serialize_record_as_camel_case() {
        let r = record(EventType::ObjectCreatedPut, "k");
        let json = serde_json::to_string(&r).expect("test serialization");
        assert!(json.contains("eventName"));
        assert!(json.contains("eventTime"));
        assert!(json.contains("principalId"));
        assert!(json.contains("sourceIp"));
        assert!(json.contains("ownerId"));
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_skip_dispatch_without_matching_rules() {
        let dispatcher = EventDispatcher::new(true);
        let r = record(EventType::ObjectRemovedDelete, "k");
        // The only rule subscribes to creates.
        dispatcher.dispatch(&r, &webhook_config(""));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_should_filter_dispatch_by_prefix() {
        let dispatcher = EventDispatcher::new(true);
        let r = record(EventType::ObjectCreatedPut, "docs/readme");
        dispatcher.dispatch(&r, &webhook_config("photos/"));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_should_drain_queue_in_test_mode() {
        let dispatcher = EventDispatcher::new(true);
        let r = record(EventType::ObjectCreatedPut, "k");
        dispatcher.dispatch(&r, &webhook_config(""));

        // The worker drains the queue without performing network I/O.
        for _ in 0..50 {
            if dispatcher.pending() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue was not drained in test mode");
    }

    #[tokio::test]
    async fn test_should_deliver_reserved_sinks_without_network() {
        let dispatcher = EventDispatcher::new(false);
        let config = NotificationConfiguration {
            rules: vec![NotificationRule {
                id: "q".to_owned(),
                events: vec![EventType::ObjectCreatedAll],
                prefix: String::new(),
                suffix: String::new(),
                sink: SinkKind::Queue {
                    arn: "arn:aws:sqs:::jobs".to_owned(),
                },
            }],
        };
        let r = record(EventType::ObjectCreatedPut, "k");
        dispatcher.dispatch(&r, &config);

        for _ in 0..50 {
            if dispatcher.pending() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue sink delivery did not complete");
    }
}
