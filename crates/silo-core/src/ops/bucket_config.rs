//! Bucket configuration handlers: policy, ACL, versioning, lifecycle,
//! tags, replication, notifications, VPC allow-list, and object-lock
//! defaults.
//!
//! Setters take the exclusive bucket-config lock; object operations hold
//! it shared for their duration.

use tracing::debug;

use crate::configs::{
    LifecycleConfiguration, NotificationConfiguration, ObjectLockConfiguration,
    ReplicationConfiguration, VersioningConfig, VersioningStatus, VpcConfiguration,
};
use crate::error::{StorageError, StorageResult};
use crate::meta::MetadataStore;
use crate::paths;
use crate::store::SiloStore;
use crate::types::AccessControlPolicy;
use crate::validation::validate_tags;

impl SiloStore {
    // -----------------------------------------------------------------------
    // Versioning
    // -----------------------------------------------------------------------

    /// Read the bucket's versioning configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_versioning(&self, bucket: &str) -> StorageResult<VersioningConfig> {
        self.meta.require_bucket(bucket).await?;
        self.meta.versioning(bucket).await
    }

    /// Set the bucket's versioning status.
    ///
    /// Only `Enabled` and `Suspended` may be requested; a bucket never
    /// returns to the never-versioned state.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] when requesting `Disabled`.
    pub async fn put_bucket_versioning(
        &self,
        bucket: &str,
        config: VersioningConfig,
    ) -> StorageResult<()> {
        if config.status == VersioningStatus::Disabled {
            return Err(StorageError::InvalidArgument {
                message: "Versioning status must be Enabled or Suspended".to_owned(),
            });
        }

        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;

        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::VERSIONING_FILE),
            &config,
        )
        .await?;
        debug!(bucket, status = %config.status, "bucket versioning updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Policy
    // -----------------------------------------------------------------------

    /// Store the bucket policy document (mirrored to `policy.json`).
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] when the document is not JSON.
    pub async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        let document: serde_json::Value =
            serde_json::from_str(policy).map_err(|e| StorageError::InvalidArgument {
                message: format!("Bucket policy is not valid JSON: {e}"),
            })?;

        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;

        let resolver = self.meta.resolver();
        MetadataStore::write_json_atomic(
            &resolver.bucket_file(bucket, paths::BUCKET_POLICY_FILE),
            &document,
        )
        .await?;
        MetadataStore::write_json_atomic(
            &resolver.bucket_file(bucket, paths::POLICY_JSON_FILE),
            &document,
        )
        .await?;
        debug!(bucket, "bucket policy updated");
        Ok(())
    }

    /// Read the bucket policy document.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::NoSuchBucketPolicy`] when no policy was set.
    pub async fn get_bucket_policy(&self, bucket: &str) -> StorageResult<String> {
        self.meta.require_bucket(bucket).await?;
        let document: Option<serde_json::Value> = MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_POLICY_FILE),
        )
        .await?;
        match document {
            Some(value) => Ok(value.to_string()),
            None => Err(StorageError::NoSuchBucketPolicy),
        }
    }

    /// Remove the bucket policy. Removing an absent policy succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn delete_bucket_policy(&self, bucket: &str) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;

        let resolver = self.meta.resolver();
        MetadataStore::remove_if_exists(&resolver.bucket_file(bucket, paths::BUCKET_POLICY_FILE))
            .await?;
        MetadataStore::remove_if_exists(&resolver.bucket_file(bucket, paths::POLICY_JSON_FILE))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // ACL
    // -----------------------------------------------------------------------

    /// Replace the bucket ACL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn put_bucket_acl(
        &self,
        bucket: &str,
        acl: AccessControlPolicy,
    ) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_ACL_FILE),
            &acl,
        )
        .await
    }

    /// Read the bucket ACL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_acl(&self, bucket: &str) -> StorageResult<AccessControlPolicy> {
        let info = self.meta.read_bucket_info(bucket).await?;
        let acl: Option<AccessControlPolicy> = MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_ACL_FILE),
        )
        .await?;
        Ok(acl.unwrap_or_else(|| {
            AccessControlPolicy::from_canned(info.owner, crate::types::CannedAcl::Private)
        }))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Replace the lifecycle configuration after validating it.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] for an invalid rule set.
    pub async fn put_bucket_lifecycle(
        &self,
        bucket: &str,
        config: LifecycleConfiguration,
    ) -> StorageResult<()> {
        config
            .validate()
            .map_err(|message| StorageError::InvalidArgument { message })?;

        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_LIFECYCLE_FILE),
            &config,
        )
        .await
    }

    /// Read the lifecycle configuration, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_lifecycle(
        &self,
        bucket: &str,
    ) -> StorageResult<Option<LifecycleConfiguration>> {
        self.meta.require_bucket(bucket).await?;
        MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_LIFECYCLE_FILE),
        )
        .await
    }

    /// Remove the lifecycle configuration (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn delete_bucket_lifecycle(&self, bucket: &str) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::remove_if_exists(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_LIFECYCLE_FILE),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Replace the bucket tag set.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] for an invalid tag set.
    pub async fn put_bucket_tags(
        &self,
        bucket: &str,
        tags: Vec<(String, String)>,
    ) -> StorageResult<()> {
        validate_tags(&tags)?;
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_TAGS_FILE),
            &tags,
        )
        .await
    }

    /// Read the bucket tag set (empty when never set).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_tags(&self, bucket: &str) -> StorageResult<Vec<(String, String)>> {
        self.meta.require_bucket(bucket).await?;
        Ok(MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_TAGS_FILE),
        )
        .await?
        .unwrap_or_default())
    }

    /// Remove the bucket tag set (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn delete_bucket_tags(&self, bucket: &str) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::remove_if_exists(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_TAGS_FILE),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Replication
    // -----------------------------------------------------------------------

    /// Replace the replication configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn put_bucket_replication(
        &self,
        bucket: &str,
        config: ReplicationConfiguration,
    ) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_REPLICATION_FILE),
            &config,
        )
        .await
    }

    /// Read the replication configuration, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_replication(
        &self,
        bucket: &str,
    ) -> StorageResult<Option<ReplicationConfiguration>> {
        self.meta.require_bucket(bucket).await?;
        MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_REPLICATION_FILE),
        )
        .await
    }

    /// Remove the replication configuration (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn delete_bucket_replication(&self, bucket: &str) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::remove_if_exists(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_REPLICATION_FILE),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    /// Replace the notification configuration.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] for duplicate rule IDs.
    pub async fn put_bucket_notifications(
        &self,
        bucket: &str,
        config: NotificationConfiguration,
    ) -> StorageResult<()> {
        for rule in &config.rules {
            if config.rules.iter().filter(|r| r.id == rule.id).count() > 1 {
                return Err(StorageError::InvalidArgument {
                    message: format!("Duplicate notification rule id: {}", rule.id),
                });
            }
        }

        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_NOTIFICATIONS_FILE),
            &config,
        )
        .await
    }

    /// Read the notification configuration (empty when never set).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_notifications(
        &self,
        bucket: &str,
    ) -> StorageResult<NotificationConfiguration> {
        self.meta.require_bucket(bucket).await?;
        Ok(self.notification_config(bucket).await?.unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // VPC allow-list
    // -----------------------------------------------------------------------

    /// Replace the VPC CIDR allow-list.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidArgument`] for malformed CIDR entries.
    pub async fn put_bucket_vpc(&self, bucket: &str, config: VpcConfiguration) -> StorageResult<()> {
        config
            .validate()
            .map_err(|message| StorageError::InvalidArgument { message })?;

        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_VPC_FILE),
            &config,
        )
        .await
    }

    /// Read the VPC CIDR allow-list, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_vpc(&self, bucket: &str) -> StorageResult<Option<VpcConfiguration>> {
        self.meta.require_bucket(bucket).await?;
        MetadataStore::read_json(&self.meta.resolver().bucket_file(bucket, paths::BUCKET_VPC_FILE))
            .await
    }

    /// Remove the VPC CIDR allow-list (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn delete_bucket_vpc(&self, bucket: &str) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::remove_if_exists(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_VPC_FILE),
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Object-lock defaults
    // -----------------------------------------------------------------------

    /// Replace the bucket's object-lock configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn put_bucket_object_lock(
        &self,
        bucket: &str,
        config: ObjectLockConfiguration,
    ) -> StorageResult<()> {
        let _guard = self.locks.lock_bucket_config(bucket).await;
        self.meta.require_bucket(bucket).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_OBJECT_LOCK_FILE),
            &config,
        )
        .await
    }

    /// Read the bucket's object-lock configuration, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn get_bucket_object_lock(
        &self,
        bucket: &str,
    ) -> StorageResult<Option<ObjectLockConfiguration>> {
        self.meta.require_bucket(bucket).await?;
        MetadataStore::read_json(
            &self.meta.resolver().bucket_file(bucket, paths::BUCKET_OBJECT_LOCK_FILE),
        )
        .await
    }
}
