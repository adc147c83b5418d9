//! Bucket-level configuration documents.
//!
//! Each configuration is a JSON document persisted under the bucket
//! directory (reserved dot-prefixed names plus `versioning.json` /
//! `policy.json`). Absence of a document means the configuration was never
//! set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EventType;
use crate::types::{LockMode, Owner};

// ---------------------------------------------------------------------------
// Bucket info
// ---------------------------------------------------------------------------

/// The `.bucket_metadata` document: identity of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// The bucket owner.
    pub owner: Owner,
    /// When the bucket was created.
    pub created: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Bucket versioning status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been enabled on this bucket.
    #[default]
    Disabled,
    /// Versioning is currently enabled.
    Enabled,
    /// Versioning was previously enabled but is now suspended.
    Suspended,
}

impl VersioningStatus {
    /// Return the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for VersioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`VersioningStatus`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown versioning status: {0}")]
pub struct ParseVersioningStatusError(String);

impl FromStr for VersioningStatus {
    type Err = ParseVersioningStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Disabled" => Ok(Self::Disabled),
            "Enabled" => Ok(Self::Enabled),
            "Suspended" => Ok(Self::Suspended),
            _ => Err(ParseVersioningStatusError(s.to_owned())),
        }
    }
}

/// The `versioning.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersioningConfig {
    /// Current versioning status.
    pub status: VersioningStatus,
    /// Whether MFA delete is enabled (persist-only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_delete: Option<bool>,
}

impl VersioningConfig {
    /// Whether new puts should receive generated version IDs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.status == VersioningStatus::Enabled
    }

    /// Whether this bucket has ever been versioned (enabled or suspended).
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.status != VersioningStatus::Disabled
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Whether a lifecycle or replication rule is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleStatus {
    /// The rule applies.
    Enabled,
    /// The rule is present but dormant.
    Disabled,
}

/// The `.bucket_lifecycle` document.
///
/// Persistence and validation only; rule execution is the responsibility of
/// an external sweeper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfiguration {
    /// The lifecycle rules, at most 1000.
    pub rules: Vec<LifecycleRule>,
}

/// A single lifecycle rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    /// Unique identifier for the rule (1-255 characters).
    pub id: String,
    /// Whether the rule is in effect.
    pub status: RuleStatus,
    /// Key prefix selecting the objects this rule applies to.
    #[serde(default)]
    pub prefix: String,
    /// Days after creation at which current versions expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_days: Option<u32>,
    /// Days after becoming noncurrent at which old versions expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noncurrent_expiration_days: Option<u32>,
    /// Days after initiation at which incomplete multipart uploads are
    /// aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_incomplete_multipart_days: Option<u32>,
}

impl LifecycleConfiguration {
    /// Validate the rule set: unique non-empty IDs, at least one action per
    /// rule, at most 1000 rules.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.rules.len() > 1000 {
            return Err("at most 1000 lifecycle rules per bucket".to_owned());
        }
        for rule in &self.rules {
            if rule.id.is_empty() || rule.id.len() > 255 {
                return Err(format!("rule id must be 1-255 characters: {:?}", rule.id));
            }
            if rule.expiration_days.is_none()
                && rule.noncurrent_expiration_days.is_none()
                && rule.abort_incomplete_multipart_days.is_none()
            {
                return Err(format!("rule {} has no action", rule.id));
            }
            if self.rules.iter().filter(|r| r.id == rule.id).count() > 1 {
                return Err(format!("duplicate rule id: {}", rule.id));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// The `.bucket_replication` document.
///
/// Bookkeeping only; the replication transport is external.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfiguration {
    /// Role identifier assumed by the replication agent.
    pub role: String,
    /// The replication rules.
    pub rules: Vec<ReplicationRule>,
}

/// A single replication rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRule {
    /// Unique identifier for the rule.
    pub id: String,
    /// Whether the rule is in effect.
    pub status: RuleStatus,
    /// Key prefix selecting the objects this rule applies to.
    #[serde(default)]
    pub prefix: String,
    /// Destination bucket identifier (ARN or name).
    pub destination_bucket: String,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// The kind of sink a notification rule delivers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SinkKind {
    /// An SNS-compatible topic (reserved interface; delivery is logged).
    Topic {
        /// Topic identifier (ARN).
        arn: String,
    },
    /// An SQS-compatible queue (reserved interface; delivery is logged).
    Queue {
        /// Queue identifier (ARN).
        arn: String,
    },
    /// A serverless function (reserved interface; delivery is logged).
    Function {
        /// Function identifier (ARN).
        arn: String,
    },
    /// An HTTP webhook receiving the event record as a JSON POST.
    Webhook {
        /// Destination URL.
        url: String,
    },
}

impl SinkKind {
    /// A short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Topic { .. } => "topic",
            Self::Queue { .. } => "queue",
            Self::Function { .. } => "function",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// A single notification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    /// Unique identifier for the rule.
    pub id: String,
    /// Event types (including wildcards) this rule subscribes to.
    pub events: Vec<EventType>,
    /// Key prefix filter; empty matches every key.
    #[serde(default)]
    pub prefix: String,
    /// Key suffix filter; empty matches every key.
    #[serde(default)]
    pub suffix: String,
    /// Where matching events are delivered.
    pub sink: SinkKind,
}

impl NotificationRule {
    /// Whether this rule matches an event of `event_type` for `key`.
    #[must_use]
    pub fn matches(&self, event_type: EventType, key: &str) -> bool {
        self.events.iter().any(|e| e.matches(event_type))
            && key.starts_with(&self.prefix)
            && key.ends_with(&self.suffix)
    }
}

/// The `.bucket_notifications` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfiguration {
    /// The notification rules.
    pub rules: Vec<NotificationRule>,
}

impl NotificationConfiguration {
    /// Return the sinks of every rule matching `event_type` for `key`.
    #[must_use]
    pub fn matching_rules(&self, event_type: EventType, key: &str) -> Vec<&NotificationRule> {
        self.rules
            .iter()
            .filter(|r| r.matches(event_type, key))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// VPC allow-list
// ---------------------------------------------------------------------------

/// The `.bucket_vpc` document: CIDR blocks allowed to reach this bucket.
///
/// Enforcement happens in the request front-end; the storage core only
/// persists and validates the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfiguration {
    /// Allowed CIDR blocks, e.g. `10.0.0.0/16`.
    pub allowed_cidrs: Vec<String>,
}

impl VpcConfiguration {
    /// Validate that each entry parses as `a.b.c.d/len`.
    ///
    /// # Errors
    ///
    /// Returns the first malformed entry.
    pub fn validate(&self) -> Result<(), String> {
        for cidr in &self.allowed_cidrs {
            let Some((addr, len)) = cidr.split_once('/') else {
                return Err(format!("malformed CIDR: {cidr}"));
            };
            if addr.parse::<std::net::Ipv4Addr>().is_err() {
                return Err(format!("malformed CIDR address: {cidr}"));
            }
            match len.parse::<u8>() {
                Ok(bits) if bits <= 32 => {}
                _ => return Err(format!("malformed CIDR prefix length: {cidr}")),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object-lock defaults
// ---------------------------------------------------------------------------

/// The `.bucket_object_lock` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLockConfiguration {
    /// Whether object lock is enabled for the bucket.
    pub enabled: bool,
    /// Default retention applied to new versions when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_retention: Option<DefaultRetention>,
}

/// Default retention settings for new object versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRetention {
    /// The retention mode.
    pub mode: LockMode,
    /// Number of days to retain new versions.
    pub days: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
