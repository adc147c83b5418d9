//! Listing operation handlers.
//!
//! Thin entry points over [`crate::meta::list`]: resolve pagination
//! cursors and `max_keys`, then delegate to the listing engine.

use tracing::debug;

use crate::error::StorageResult;
use crate::meta::list::{self, ListObjectsPage, VersionListPage};
use crate::store::SiloStore;

/// Input to [`SiloStore::list_objects`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInput {
    /// The bucket to list.
    pub bucket: String,
    /// Only keys beginning with this prefix.
    pub prefix: Option<String>,
    /// Collapse keys at the first occurrence of this delimiter after the
    /// prefix.
    pub delimiter: Option<String>,
    /// Start strictly after this key.
    pub marker: Option<String>,
    /// Continuation token from a previous page (wins over `marker`).
    pub continuation_token: Option<String>,
    /// Maximum items per page (capped at 1000).
    pub max_keys: Option<usize>,
}

impl ListObjectsInput {
    /// List everything in a bucket.
    #[must_use]
    pub fn all(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }
}

/// Input to [`SiloStore::list_object_versions`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectVersionsInput {
    /// The bucket to list.
    pub bucket: String,
    /// Only keys beginning with this prefix.
    pub prefix: Option<String>,
    /// Collapse keys at the first occurrence of this delimiter after the
    /// prefix.
    pub delimiter: Option<String>,
    /// Resume at this key.
    pub key_marker: Option<String>,
    /// Resume after this version of the marker key.
    pub version_id_marker: Option<String>,
    /// Maximum items per page (capped at 1000).
    pub max_keys: Option<usize>,
}

impl ListObjectVersionsInput {
    /// List every version in a bucket.
    #[must_use]
    pub fn all(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }
}

impl SiloStore {
    /// List the current objects of a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::NoSuchBucket`] when the bucket
    /// is unknown.
    pub async fn list_objects(&self, input: ListObjectsInput) -> StorageResult<ListObjectsPage> {
        self.meta.require_bucket(&input.bucket).await?;

        let start_after = input
            .continuation_token
            .as_deref()
            .or(input.marker.as_deref())
            .unwrap_or("");
        let max_keys = self.config.effective_max_keys(input.max_keys);

        let page = list::list_objects(
            &self.meta,
            &input.bucket,
            input.prefix.as_deref().unwrap_or(""),
            input.delimiter.as_deref().unwrap_or(""),
            start_after,
            max_keys,
        )
        .await?;

        debug!(
            bucket = %input.bucket,
            objects = page.objects.len(),
            common_prefixes = page.common_prefixes.len(),
            is_truncated = page.is_truncated,
            "list_objects completed"
        );
        Ok(page)
    }

    /// List all versions (objects and delete markers) of a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::NoSuchBucket`] when the bucket
    /// is unknown.
    pub async fn list_object_versions(
        &self,
        input: ListObjectVersionsInput,
    ) -> StorageResult<VersionListPage> {
        self.meta.require_bucket(&input.bucket).await?;

        let max_keys = self.config.effective_max_keys(input.max_keys);
        let page = list::list_object_versions(
            &self.meta,
            &input.bucket,
            input.prefix.as_deref().unwrap_or(""),
            input.delimiter.as_deref().unwrap_or(""),
            input.key_marker.as_deref().unwrap_or(""),
            input.version_id_marker.as_deref().unwrap_or(""),
            max_keys,
        )
        .await?;

        debug!(
            bucket = %input.bucket,
            versions = page.versions.len(),
            is_truncated = page.is_truncated,
            "list_object_versions completed"
        );
        Ok(page)
    }
}
