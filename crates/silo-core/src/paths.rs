//! Path resolution: maps (bucket, key, version) to deterministic locations
//! under the storage root.
//!
//! The `"null"` version lives at `<root>/<bucket>/<key>`; any other version
//! lives at `<root>/<bucket>/<dirname(key)>/<basename(key)>@<versionId>`.
//! Sidecars append `.metadata` / `.acl` to the data file name. Keys are
//! validated before resolution (see [`crate::validation::validate_object_key`]),
//! so embedded `/` separators translate directly into the on-disk hierarchy.

use std::path::{Path, PathBuf};

use crate::types::NULL_VERSION_ID;

/// Bucket-level sidecar: `{owner, created}`.
pub const BUCKET_METADATA_FILE: &str = ".bucket_metadata";
/// Bucket-level ACL document.
pub const BUCKET_ACL_FILE: &str = ".bucket_acl";
/// Bucket policy document.
pub const BUCKET_POLICY_FILE: &str = ".bucket_policy";
/// Alternate policy path kept in sync with [`BUCKET_POLICY_FILE`].
pub const POLICY_JSON_FILE: &str = "policy.json";
/// Versioning configuration.
pub const VERSIONING_FILE: &str = "versioning.json";
/// Lifecycle configuration.
pub const BUCKET_LIFECYCLE_FILE: &str = ".bucket_lifecycle";
/// Replication configuration.
pub const BUCKET_REPLICATION_FILE: &str = ".bucket_replication";
/// Notification configuration.
pub const BUCKET_NOTIFICATIONS_FILE: &str = ".bucket_notifications";
/// Object-lock defaults.
pub const BUCKET_OBJECT_LOCK_FILE: &str = ".bucket_object_lock";
/// Bucket tag set.
pub const BUCKET_TAGS_FILE: &str = ".bucket_tags";
/// VPC CIDR allow-list.
pub const BUCKET_VPC_FILE: &str = ".bucket_vpc";
/// Directory of in-progress multipart uploads.
pub const UPLOADS_DIR: &str = ".uploads";
/// Multipart upload descriptor file name.
pub const UPLOAD_INFO_FILE: &str = "info.json";
/// Suffix of per-version metadata sidecars.
pub const METADATA_SUFFIX: &str = ".metadata";
/// Suffix of per-version ACL sidecars.
pub const ACL_SUFFIX: &str = ".acl";
/// Root-level bookkeeping directory (audit log, batch jobs).
pub const SILO_DIR: &str = ".silo";

/// Length of a generated version ID in hex characters.
const VERSION_ID_HEX_LEN: usize = 32;

/// Resolves locations under a fixed storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a bucket.
    #[must_use]
    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// A bucket-level configuration file.
    #[must_use]
    pub fn bucket_file(&self, bucket: &str, file_name: &str) -> PathBuf {
        self.bucket_dir(bucket).join(file_name)
    }

    /// Data file of an object version.
    ///
    /// # Examples
    ///
    /// ```
    /// use silo_core::paths::PathResolver;
    ///
    /// let resolver = PathResolver::new("/data");
    /// let path = resolver.data_path("b", "a/b/c.txt", "null");
    /// assert_eq!(path, std::path::PathBuf::from("/data/b/a/b/c.txt"));
    ///
    /// let path = resolver.data_path("b", "a/b/c.txt", "0123");
    /// assert_eq!(path, std::path::PathBuf::from("/data/b/a/b/c.txt@0123"));
    /// ```
    #[must_use]
    pub fn data_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        let mut path = self.bucket_dir(bucket);
        if version_id == NULL_VERSION_ID {
            push_key(&mut path, key);
        } else {
            let (dir, base) = split_key(key);
            if !dir.is_empty() {
                push_key(&mut path, dir);
            }
            path.push(format!("{base}@{version_id}"));
        }
        path
    }

    /// Metadata sidecar of an object version.
    #[must_use]
    pub fn metadata_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        sidecar_path(&self.data_path(bucket, key, version_id), METADATA_SUFFIX)
    }

    /// ACL sidecar of an object version.
    #[must_use]
    pub fn acl_path(&self, bucket: &str, key: &str, version_id: &str) -> PathBuf {
        sidecar_path(&self.data_path(bucket, key, version_id), ACL_SUFFIX)
    }

    /// Directory containing the sidecars of a key's versions.
    #[must_use]
    pub fn key_dir(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.bucket_dir(bucket);
        let (dir, _) = split_key(key);
        if !dir.is_empty() {
            push_key(&mut path, dir);
        }
        path
    }

    /// The `.uploads` directory of a bucket.
    #[must_use]
    pub fn uploads_dir(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join(UPLOADS_DIR)
    }

    /// Directory of one multipart upload.
    #[must_use]
    pub fn upload_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.uploads_dir(bucket).join(upload_id)
    }

    /// The `info.json` descriptor of a multipart upload.
    #[must_use]
    pub fn upload_info_path(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.upload_dir(bucket, upload_id).join(UPLOAD_INFO_FILE)
    }

    /// Data file of one uploaded part.
    #[must_use]
    pub fn part_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(bucket, upload_id)
            .join(part_number.to_string())
    }

    /// Record sidecar of one uploaded part.
    #[must_use]
    pub fn part_record_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(bucket, upload_id)
            .join(format!("{part_number}.part"))
    }

    /// The root-level bookkeeping directory.
    #[must_use]
    pub fn silo_dir(&self) -> PathBuf {
        self.root.join(SILO_DIR)
    }

    /// The append-only audit log.
    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.silo_dir().join("audit.log")
    }

    /// Directory of batch-job documents.
    #[must_use]
    pub fn jobs_dir(&self) -> PathBuf {
        self.silo_dir().join("jobs")
    }

    /// Document of one batch job.
    #[must_use]
    pub fn job_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(format!("{job_id}.json"))
    }
}

/// Append the slash-separated components of `key` to `path`.
fn push_key(path: &mut PathBuf, key: &str) {
    for segment in key.split('/') {
        path.push(segment);
    }
}

/// Split a key into `(dirname, basename)`; `dirname` is empty for
/// single-segment keys.
#[must_use]
pub fn split_key(key: &str) -> (&str, &str) {
    match key.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", key),
    }
}

/// Append a sidecar suffix to a data path's file name.
fn sidecar_path(data_path: &Path, suffix: &str) -> PathBuf {
    let mut name = data_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    data_path.with_file_name(name)
}

/// Interpret a sidecar stem (`<file name>` minus `.metadata`) as either a
/// versioned file name or a `"null"`-version basename.
///
/// Returns `(basename, version_id)`. A stem counts as versioned only when
/// it ends in `@` followed by exactly 32 hex characters, which generated
/// version IDs always are; anything else (including keys that merely
/// contain `@`) is the `"null"` version.
#[must_use]
pub fn parse_version_stem(stem: &str) -> (&str, &str) {
    if let Some((base, vid)) = stem.rsplit_once('@') {
        if vid.len() == VERSION_ID_HEX_LEN
            && vid.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
            && !base.is_empty()
        {
            return (base, vid);
        }
    }
    (stem, NULL_VERSION_ID)
}

/// Whether a bucket-directory entry name is reserved (never an object).
#[must_use]
pub fn is_reserved_entry(name: &str) -> bool {
    name.starts_with('.') || name == VERSIONING_FILE || name == POLICY_JSON_FILE
}

/// Whether a file name is a sidecar (`.metadata` / `.acl`).
#[must_use]
pub fn is_sidecar_name(name: &str) -> bool {
    name.ends_with(METADATA_SUFFIX) || name.ends_with(ACL_SUFFIX)
}
