//! Core object model: owners, ACL grants, object metadata, and the
//! per-version sidecar record.
//!
//! A [`VersionRecord`] is the JSON document persisted in a `.metadata`
//! sidecar next to each data file. Delete markers are records with
//! `is_delete_marker = true` and no data file.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksums::ChecksumAlgorithm;

/// The version ID sentinel used when versioning is not enabled.
pub const NULL_VERSION_ID: &str = "null";

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The owner of a bucket or an object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// The canonical user ID of the owner.
    pub id: String,
    /// The display name of the owner.
    pub display_name: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            id: "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a".to_owned(),
            display_name: "silo".to_owned(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name, self.id)
    }
}

// ---------------------------------------------------------------------------
// StorageClass
// ---------------------------------------------------------------------------

/// Storage class of an object version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// Frequent-access storage (default).
    #[default]
    #[serde(rename = "STANDARD")]
    Standard,
    /// Infrequent-access storage.
    #[serde(rename = "STANDARD_IA")]
    StandardIa,
    /// Single-zone infrequent-access storage.
    #[serde(rename = "ONEZONE_IA")]
    OnezoneIa,
    /// Automatic tiering.
    #[serde(rename = "INTELLIGENT_TIERING")]
    IntelligentTiering,
    /// Archival storage.
    #[serde(rename = "GLACIER")]
    Glacier,
    /// Deep archival storage.
    #[serde(rename = "DEEP_ARCHIVE")]
    DeepArchive,
}

impl StorageClass {
    /// Return the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::StandardIa => "STANDARD_IA",
            Self::OnezoneIa => "ONEZONE_IA",
            Self::IntelligentTiering => "INTELLIGENT_TIERING",
            Self::Glacier => "GLACIER",
            Self::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`StorageClass`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown storage class: {0}")]
pub struct ParseStorageClassError(String);

impl FromStr for StorageClass {
    type Err = ParseStorageClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(Self::Standard),
            "STANDARD_IA" => Ok(Self::StandardIa),
            "ONEZONE_IA" => Ok(Self::OnezoneIa),
            "INTELLIGENT_TIERING" => Ok(Self::IntelligentTiering),
            "GLACIER" => Ok(Self::Glacier),
            "DEEP_ARCHIVE" => Ok(Self::DeepArchive),
            _ => Err(ParseStorageClassError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// ACL types
// ---------------------------------------------------------------------------

/// Predefined (canned) ACL grants for buckets and objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CannedAcl {
    /// Owner gets `FULL_CONTROL`. No one else has access rights (default).
    #[default]
    Private,
    /// Owner gets `FULL_CONTROL`. The `AllUsers` group gets `READ` access.
    PublicRead,
    /// Owner gets `FULL_CONTROL`. The `AllUsers` group gets `READ` and `WRITE` access.
    PublicReadWrite,
    /// Owner gets `FULL_CONTROL`. The `AuthenticatedUsers` group gets `READ` access.
    AuthenticatedRead,
    /// Object owner gets `FULL_CONTROL`. Bucket owner gets `READ` access.
    BucketOwnerRead,
    /// Both the object owner and the bucket owner get `FULL_CONTROL`.
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Return the string representation of the canned ACL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`CannedAcl`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown canned ACL: {0}")]
pub struct ParseCannedAclError(String);

impl FromStr for CannedAcl {
    type Err = ParseCannedAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            "bucket-owner-read" => Ok(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(Self::BucketOwnerFullControl),
            _ => Err(ParseCannedAclError(s.to_owned())),
        }
    }
}

/// An ACL grant pairing a grantee with a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// The entity receiving the permission.
    pub grantee: Grantee,
    /// The permission granted.
    pub permission: Permission,
}

/// A grantee in an ACL grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Grantee {
    /// A canonical user identified by an account ID.
    CanonicalUser {
        /// The canonical user ID.
        id: String,
        /// The display name for the user.
        display_name: String,
    },
    /// A predefined group identified by URI.
    Group {
        /// The URI of the group.
        uri: String,
    },
}

/// A permission that can be granted to a grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Grants full control (READ, WRITE, READ_ACP, WRITE_ACP).
    FullControl,
    /// Allows the grantee to list the bucket or read the object data.
    Read,
    /// Allows the grantee to create objects in the bucket.
    Write,
    /// Allows the grantee to read the ACL.
    ReadAcp,
    /// Allows the grantee to write the ACL.
    WriteAcp,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FullControl => "FULL_CONTROL",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ReadAcp => "READ_ACP",
            Self::WriteAcp => "WRITE_ACP",
        };
        f.write_str(s)
    }
}

/// An access-control policy document (bucket or per-version sidecar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicy {
    /// The resource owner.
    pub owner: Owner,
    /// The grants in effect.
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// The policy produced by a canned ACL for the given owner.
    #[must_use]
    pub fn from_canned(owner: Owner, acl: CannedAcl) -> Self {
        let mut grants = vec![Grant {
            grantee: Grantee::CanonicalUser {
                id: owner.id.clone(),
                display_name: owner.display_name.clone(),
            },
            permission: Permission::FullControl,
        }];

        let all_users = "http://acs.amazonaws.com/groups/global/AllUsers";
        let authenticated = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
        match acl {
            CannedAcl::PublicRead => grants.push(Grant {
                grantee: Grantee::Group {
                    uri: all_users.to_owned(),
                },
                permission: Permission::Read,
            }),
            CannedAcl::PublicReadWrite => {
                for permission in [Permission::Read, Permission::Write] {
                    grants.push(Grant {
                        grantee: Grantee::Group {
                            uri: all_users.to_owned(),
                        },
                        permission,
                    });
                }
            }
            CannedAcl::AuthenticatedRead => grants.push(Grant {
                grantee: Grantee::Group {
                    uri: authenticated.to_owned(),
                },
                permission: Permission::Read,
            }),
            CannedAcl::Private
            | CannedAcl::BucketOwnerRead
            | CannedAcl::BucketOwnerFullControl => {}
        }

        Self { owner, grants }
    }
}

// ---------------------------------------------------------------------------
// Object lock
// ---------------------------------------------------------------------------

/// Object-lock retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    /// Retention can be bypassed by callers holding the bypass capability.
    #[serde(rename = "GOVERNANCE")]
    Governance,
    /// Retention cannot be bypassed by any principal.
    #[serde(rename = "COMPLIANCE")]
    Compliance,
}

impl LockMode {
    /// Return the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal-hold status of an object version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegalHoldStatus {
    /// A legal hold is in effect; the version cannot be deleted.
    #[serde(rename = "ON")]
    On,
    /// No legal hold.
    #[serde(rename = "OFF")]
    Off,
}

/// Retention settings applied to an object version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    /// The retention mode.
    pub mode: LockMode,
    /// The instant until which the version is retained.
    pub retain_until: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Encryption / checksum descriptors
// ---------------------------------------------------------------------------

/// Server-side-encryption descriptor persisted with a version.
///
/// Persist-only: no encryption is performed by the storage core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseDescriptor {
    /// The encryption algorithm (`AES256`, `aws:kms`, `aws:kms:dsse`).
    pub algorithm: String,
    /// KMS key ID when the algorithm is KMS-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// Checksum data attached to an object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumData {
    /// The checksum algorithm.
    pub algorithm: ChecksumAlgorithm,
    /// The base64-encoded checksum value.
    pub value: String,
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// Metadata associated with an object version.
///
/// Includes content headers, the user-defined metadata map (keys are
/// normalized to lowercase), tags, the SSE descriptor, and the mutable
/// object-lock fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// The MIME type of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content encoding (e.g. `gzip`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Content disposition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Content language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Cache control directives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// User-defined metadata entries (case-insensitive keys, stored
    /// lowercase).
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    /// Object tags as key-value pairs.
    #[serde(default)]
    pub tags: Vec<(String, String)>,
    /// Server-side encryption descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse: Option<SseDescriptor>,
    /// Object-lock retention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
    /// Legal-hold status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_hold: Option<LegalHoldStatus>,
}

impl ObjectMetadata {
    /// Normalize user-metadata keys to lowercase.
    pub fn normalize(&mut self) {
        if self.user_metadata.keys().any(|k| k.chars().any(char::is_uppercase)) {
            let normalized = self
                .user_metadata
                .drain()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();
            self.user_metadata = normalized;
        }
    }
}

// ---------------------------------------------------------------------------
// VersionRecord
// ---------------------------------------------------------------------------

/// The sidecar document describing one object version or delete marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// The object key.
    pub key: String,
    /// The version ID (`"null"` when versioning is not enabled).
    pub version_id: String,
    /// Unquoted lowercase-hex SHA-256 ETag (`<hex>-<N>` for multipart).
    pub etag: String,
    /// Object size in bytes (0 for delete markers).
    pub size: u64,
    /// When this version was created.
    pub last_modified: DateTime<Utc>,
    /// Whether this is the current version for its key.
    pub is_latest: bool,
    /// Whether this version is a delete marker.
    #[serde(default)]
    pub is_delete_marker: bool,
    /// The storage class.
    #[serde(default)]
    pub storage_class: StorageClass,
    /// The owner of this version.
    pub owner: Owner,
    /// Content headers, user metadata, tags, SSE, and lock fields.
    #[serde(default)]
    pub metadata: ObjectMetadata,
    /// Optional additional checksum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumData>,
    /// Number of parts when created by multipart assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts_count: Option<u32>,
}

impl VersionRecord {
    /// Construct a delete-marker record for a key.
    #[must_use]
    pub fn delete_marker(
        key: String,
        version_id: String,
        owner: Owner,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            version_id,
            etag: String::new(),
            size: 0,
            last_modified,
            is_latest: true,
            is_delete_marker: true,
            storage_class: StorageClass::default(),
            owner,
            metadata: ObjectMetadata::default(),
            checksum: None,
            parts_count: None,
        }
    }

    /// Whether this record is the `"null"` version.
    #[must_use]
    pub fn is_null_version(&self) -> bool {
        self.version_id == NULL_VERSION_ID
    }

    /// Whether deletion (or non-versioned overwrite) of this version is
    /// blocked at `now`.
    ///
    /// Compliance retention and legal holds block every caller; Governance
    /// retention yields to an explicit bypass capability.
    #[must_use]
    pub fn deletion_blocked(&self, now: DateTime<Utc>, bypass_governance: bool) -> bool {
        if self.metadata.legal_hold == Some(LegalHoldStatus::On) {
            return true;
        }
        match self.metadata.retention {
            Some(retention) if retention.retain_until > now => {
                retention.mode == LockMode::Compliance || !bypass_governance
            }
            _ => false,
        }
    }
}

/// Identifies one object (optionally a specific version) in a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectIdentifier {
    /// The object key.
    pub key: String,
    /// Specific version to remove; `None` applies delete-marker semantics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
