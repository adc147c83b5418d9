//! Per-object configuration handlers: ACL, tags, retention, legal hold,
//! and storage class.
//!
//! Versions are immutable except for exactly these fields; each mutation
//! rewrites the version's sidecar under the key's write lock.

use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::meta::MetadataStore;
use crate::store::SiloStore;
use crate::types::{
    AccessControlPolicy, CannedAcl, LegalHoldStatus, LockMode, Retention, StorageClass,
    VersionRecord,
};
use crate::validation::validate_tags;

impl SiloStore {
    // -----------------------------------------------------------------------
    // ACL
    // -----------------------------------------------------------------------

    /// Read an object version's ACL, defaulting to owner-full-control when
    /// none was ever set.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn get_object_acl(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<AccessControlPolicy> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;
        let acl: Option<AccessControlPolicy> = MetadataStore::read_json(
            &self.meta.resolver().acl_path(bucket, key, &record.version_id),
        )
        .await?;
        Ok(acl.unwrap_or_else(|| {
            AccessControlPolicy::from_canned(record.owner, CannedAcl::Private)
        }))
    }

    /// Replace an object version's ACL.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        acl: AccessControlPolicy,
    ) -> StorageResult<()> {
        let _guard = self.locks.lock_key(bucket, key).await;
        let record = self.resolve_for_read(bucket, key, version_id).await?;
        MetadataStore::write_json_atomic(
            &self.meta.resolver().acl_path(bucket, key, &record.version_id),
            &acl,
        )
        .await?;
        debug!(bucket, key, version_id = %record.version_id, "object ACL updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Read an object version's tag set.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn get_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Vec<(String, String)>> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;
        Ok(record.metadata.tags)
    }

    /// Replace an object version's tag set.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidArgument`] for an invalid tag set.
    /// - Resolution follows [`SiloStore::head_object`].
    pub async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        tags: Vec<(String, String)>,
    ) -> StorageResult<()> {
        validate_tags(&tags)?;
        self.mutate_record(bucket, key, version_id, move |record| {
            record.metadata.tags = tags;
            Ok(())
        })
        .await
    }

    /// Remove an object version's tags.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn delete_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<()> {
        self.mutate_record(bucket, key, version_id, |record| {
            record.metadata.tags.clear();
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Retention / legal hold
    // -----------------------------------------------------------------------

    /// Read an object version's retention, if any.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn get_object_retention(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Option<Retention>> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;
        Ok(record.metadata.retention)
    }

    /// Set or extend an object version's retention.
    ///
    /// Compliance retention can only be extended. Shortening or loosening
    /// Governance retention requires the bypass capability.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AccessDenied`] for forbidden retention changes.
    /// - Resolution follows [`SiloStore::head_object`].
    pub async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        retention: Retention,
        bypass_governance: bool,
    ) -> StorageResult<()> {
        let now = crate::utils::now_millis();
        self.mutate_record(bucket, key, version_id, move |record| {
            if let Some(existing) = record.metadata.retention {
                if existing.retain_until > now {
                    let shortening = retention.retain_until < existing.retain_until
                        || (existing.mode == LockMode::Compliance
                            && retention.mode == LockMode::Governance);
                    let allowed = match existing.mode {
                        LockMode::Compliance => !shortening,
                        LockMode::Governance => !shortening || bypass_governance,
                    };
                    if !allowed {
                        return Err(StorageError::AccessDenied);
                    }
                }
            }
            record.metadata.retention = Some(retention);
            Ok(())
        })
        .await
    }

    /// Read an object version's legal-hold status (`Off` when never set).
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn get_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<LegalHoldStatus> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;
        Ok(record.metadata.legal_hold.unwrap_or(LegalHoldStatus::Off))
    }

    /// Set an object version's legal-hold status.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        status: LegalHoldStatus,
    ) -> StorageResult<()> {
        self.mutate_record(bucket, key, version_id, move |record| {
            record.metadata.legal_hold = Some(status);
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Storage class
    // -----------------------------------------------------------------------

    /// Change an object version's storage class.
    ///
    /// # Errors
    ///
    /// Resolution follows [`SiloStore::head_object`].
    pub async fn set_storage_class(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        storage_class: StorageClass,
    ) -> StorageResult<()> {
        self.mutate_record(bucket, key, version_id, move |record| {
            record.storage_class = storage_class;
            Ok(())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Shared helper
    // -----------------------------------------------------------------------

    /// Apply a mutation to a resolved version record and persist it, under
    /// the key's write lock.
    async fn mutate_record<F>(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        mutate: F,
    ) -> StorageResult<()>
    where
        F: FnOnce(&mut VersionRecord) -> StorageResult<()>,
    {
        let _guard = self.locks.lock_key(bucket, key).await;
        let mut record = self.resolve_for_read(bucket, key, version_id).await?;
        mutate(&mut record)?;
        self.meta.save_metadata(bucket, &record).await?;
        debug!(bucket, key, version_id = %record.version_id, "object config updated");
        Ok(())
    }
}
