//! Object CRUD operation handlers.
//!
//! Implements `put_object`, `get_object`, `head_object`, `delete_object`,
//! `delete_objects`, `copy_object`, and `verify_object_integrity`.

use tracing::debug;

use crate::checksums::{ChecksumAlgorithm, multipart_etag};
use crate::error::{StorageError, StorageResult};
use crate::events::EventType;
use crate::io::BodyStream;
use crate::store::SiloStore;
use crate::types::{
    ChecksumData, NULL_VERSION_ID, ObjectIdentifier, ObjectMetadata, Owner, StorageClass,
    VersionRecord,
};
use crate::utils::ByteRange;
use crate::validation::{validate_metadata, validate_object_key, validate_sse, validate_tags};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Input to [`SiloStore::put_object`].
pub struct PutObjectInput {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// The object bytes, streamed.
    pub body: BodyStream,
    /// Content headers, user metadata, tags, SSE, and lock fields.
    pub metadata: ObjectMetadata,
    /// The writing principal.
    pub owner: Owner,
    /// Storage class of the new version.
    pub storage_class: StorageClass,
    /// Additional checksum to compute and persist alongside the ETag.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl std::fmt::Debug for PutObjectInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjectInput")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("storage_class", &self.storage_class)
            .finish_non_exhaustive()
    }
}

impl PutObjectInput {
    /// Minimal input: private object with default metadata.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: BodyStream) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body,
            metadata: ObjectMetadata::default(),
            owner: Owner::default(),
            storage_class: StorageClass::default(),
            checksum_algorithm: None,
        }
    }
}

/// Output of [`SiloStore::put_object`].
#[derive(Debug, Clone)]
pub struct PutObjectOutput {
    /// ETag of the stored bytes.
    pub etag: String,
    /// Generated version ID; `None` when versioning is not enabled.
    pub version_id: Option<String>,
    /// Stored size in bytes.
    pub size: u64,
}

/// Output of [`SiloStore::get_object`].
pub struct GetObjectOutput {
    /// The resolved version record.
    pub record: VersionRecord,
    /// The body stream (full object or the requested range).
    pub body: BodyStream,
    /// The resolved range when one was requested.
    pub range: Option<ByteRange>,
}

impl std::fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("record", &self.record)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Output of [`SiloStore::delete_object`].
#[derive(Debug, Clone)]
pub struct DeleteObjectOutput {
    /// Whether the operation produced (or removed) a delete marker.
    pub delete_marker: bool,
    /// Version ID affected (the new marker's ID, or the removed version).
    pub version_id: Option<String>,
}

/// Per-item error in a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Per-item result of [`SiloStore::delete_objects`].
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// The requested key.
    pub key: String,
    /// The affected version ID, when known.
    pub version_id: Option<String>,
    /// Whether a delete marker was produced.
    pub delete_marker: bool,
    /// The failure, if this item failed.
    pub error: Option<DeleteError>,
}

/// Input to [`SiloStore::copy_object`].
#[derive(Debug, Clone)]
pub struct CopyObjectInput {
    /// Source bucket.
    pub src_bucket: String,
    /// Source key.
    pub src_key: String,
    /// Specific source version; `None` copies the current version.
    pub src_version_id: Option<String>,
    /// Destination bucket.
    pub dst_bucket: String,
    /// Destination key.
    pub dst_key: String,
    /// Replacement metadata; `None` copies the source metadata.
    pub metadata: Option<ObjectMetadata>,
    /// Storage class of the destination; `None` keeps the source's.
    pub storage_class: Option<StorageClass>,
    /// The copying principal.
    pub owner: Owner,
}

/// Output of [`SiloStore::copy_object`].
#[derive(Debug, Clone)]
pub struct CopyObjectOutput {
    /// Recomputed ETag of the destination bytes.
    pub etag: String,
    /// Destination version ID; `None` when versioning is not enabled.
    pub version_id: Option<String>,
    /// When the destination version was created.
    pub last_modified: chrono::DateTime<chrono::Utc>,
    /// Copied size in bytes.
    pub size: u64,
}

/// Result of [`SiloStore::verify_object_integrity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Whether the stored bytes match the recorded digests and size.
    pub is_valid: bool,
    /// Whether a content mismatch (bitrot) was detected. Repair is not
    /// supported unless replication yields an alternate copy.
    pub bitrot_detected: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl SiloStore {
    /// Store an object version.
    ///
    /// With versioning enabled a fresh version ID is generated; otherwise
    /// the `"null"` version is replaced in place. A failed write never
    /// leaves a partial data file or metadata behind.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidKey`] / [`StorageError::InvalidArgument`]
    ///   for invalid keys, tags, or metadata.
    /// - [`StorageError::AccessDenied`] when a locked `"null"` version
    ///   would be overwritten.
    pub async fn put_object(&self, mut input: PutObjectInput) -> StorageResult<PutObjectOutput> {
        validate_object_key(&input.key)?;
        validate_metadata(&input.metadata.user_metadata)?;
        validate_tags(&input.metadata.tags)?;
        if let Some(ref sse) = input.metadata.sse {
            validate_sse(sse)?;
        }
        input.metadata.normalize();

        self.meta.require_bucket(&input.bucket).await?;

        let guard = self.locks.lock_key(&input.bucket, &input.key).await;

        let versioning = self.meta.versioning(&input.bucket).await?;
        let version_id = if versioning.is_enabled() {
            crate::utils::generate_version_id()
        } else {
            NULL_VERSION_ID.to_owned()
        };

        // Replacing the "null" version destroys its bytes, which a lock or
        // legal hold forbids.
        if version_id == NULL_VERSION_ID {
            if let Ok(existing) = self
                .meta
                .get_version(&input.bucket, &input.key, NULL_VERSION_ID)
                .await
            {
                if !existing.is_delete_marker
                    && existing.deletion_blocked(crate::utils::now_millis(), false)
                {
                    return Err(StorageError::AccessDenied);
                }
            }
        }

        self.apply_default_retention(&input.bucket, &mut input.metadata)
            .await?;

        let path = self
            .meta
            .resolver()
            .data_path(&input.bucket, &input.key, &version_id);
        let write = self
            .io
            .write_stream(&path, input.body, input.checksum_algorithm)
            .await?;

        let record = VersionRecord {
            key: input.key.clone(),
            version_id: version_id.clone(),
            etag: write.etag.clone(),
            size: write.size,
            last_modified: crate::utils::now_millis(),
            is_latest: true,
            is_delete_marker: false,
            storage_class: input.storage_class,
            owner: input.owner.clone(),
            metadata: input.metadata,
            checksum: input.checksum_algorithm.zip(write.checksum).map(
                |(algorithm, value)| ChecksumData { algorithm, value },
            ),
            parts_count: None,
        };

        // The metadata step is never retried; its failure rolls back the
        // data write.
        if let Err(e) = self.meta.save_metadata(&input.bucket, &record).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        drop(guard);

        debug!(
            bucket = %input.bucket,
            key = %input.key,
            version_id = %version_id,
            size = write.size,
            "put_object completed"
        );

        let real_version_id = (version_id != NULL_VERSION_ID).then_some(version_id);
        self.emit(
            EventType::ObjectCreatedPut,
            &input.bucket,
            &input.key,
            write.size,
            &write.etag,
            real_version_id.clone(),
            &input.owner.id,
        )
        .await;

        Ok(PutObjectOutput {
            etag: write.etag,
            version_id: real_version_id,
            size: write.size,
        })
    }

    /// Fetch an object's bytes and record, optionally range-limited.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchKey`] when the key is unknown or its current
    ///   version is a delete marker.
    /// - [`StorageError::MethodNotAllowed`] when a delete-marker version is
    ///   requested explicitly.
    /// - [`StorageError::InvalidRange`] for an unsatisfiable range.
    /// - [`StorageError::Internal`] when metadata exists but the data file
    ///   is missing.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: Option<ByteRange>,
    ) -> StorageResult<GetObjectOutput> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;

        let resolved = match range {
            Some(r) => Some(r.resolve(record.size)?),
            None => None,
        };

        let path = self
            .meta
            .resolver()
            .data_path(bucket, key, &record.version_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::Internal(anyhow::anyhow!(
                "metadata present but data file missing for {bucket}/{key}@{}",
                record.version_id
            )));
        }

        let body = self.io.read_stream(&path, resolved).await?;
        Ok(GetObjectOutput {
            record,
            body,
            range: resolved,
        })
    }

    /// Fetch an object's record without the body.
    ///
    /// # Errors
    ///
    /// Same resolution rules as [`SiloStore::get_object`].
    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<VersionRecord> {
        self.resolve_for_read(bucket, key, version_id).await
    }

    /// Delete an object or a specific version.
    ///
    /// Without a version ID, versioned buckets receive a delete marker and
    /// never lose data; never-versioned buckets unlink the `"null"`
    /// version (a no-op when the key does not exist). With a version ID
    /// the version is removed permanently, subject to lock checks.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchVersion`] for an unknown explicit version.
    /// - [`StorageError::AccessDenied`] for lock or legal-hold violations.
    pub async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        bypass_governance: bool,
        owner: &Owner,
    ) -> StorageResult<DeleteObjectOutput> {
        self.meta.require_bucket(bucket).await?;

        let guard = self.locks.lock_key(bucket, key).await;

        let output = if let Some(vid) = version_id {
            let removed = self
                .remove_version_locked(bucket, key, vid, bypass_governance)
                .await?;
            DeleteObjectOutput {
                delete_marker: removed.is_delete_marker,
                version_id: Some(vid.to_owned()),
            }
        } else if self.meta.versioning(bucket).await?.is_versioned() {
            let marker = VersionRecord::delete_marker(
                key.to_owned(),
                crate::utils::generate_version_id(),
                owner.clone(),
                crate::utils::now_millis(),
            );
            self.meta.save_metadata(bucket, &marker).await?;
            DeleteObjectOutput {
                delete_marker: true,
                version_id: Some(marker.version_id),
            }
        } else {
            match self.meta.get_version(bucket, key, NULL_VERSION_ID).await {
                Ok(_) => {
                    self.remove_version_locked(bucket, key, NULL_VERSION_ID, bypass_governance)
                        .await?;
                    DeleteObjectOutput {
                        delete_marker: false,
                        version_id: None,
                    }
                }
                // Deleting an absent key succeeds without effect.
                Err(StorageError::NoSuchVersion { .. }) => DeleteObjectOutput {
                    delete_marker: false,
                    version_id: None,
                },
                Err(e) => return Err(e),
            }
        };

        drop(guard);

        debug!(bucket, key, ?version_id, delete_marker = output.delete_marker, "delete_object completed");

        let event = if output.delete_marker && version_id.is_none() {
            EventType::ObjectRemovedDeleteMarkerCreated
        } else {
            EventType::ObjectRemovedDelete
        };
        self.emit(event, bucket, key, 0, "", output.version_id.clone(), &owner.id)
            .await;

        Ok(output)
    }

    /// Bulk delete. Each item is processed independently and failures are
    /// reported per item; the batch never aborts early.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown;
    /// per-item failures live in the returned outcomes.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        items: Vec<ObjectIdentifier>,
        bypass_governance: bool,
        owner: &Owner,
    ) -> StorageResult<Vec<DeleteOutcome>> {
        self.meta.require_bucket(bucket).await?;

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let result = self
                .delete_object(
                    bucket,
                    &item.key,
                    item.version_id.as_deref(),
                    bypass_governance,
                    owner,
                )
                .await;

            outcomes.push(match result {
                Ok(output) => DeleteOutcome {
                    key: item.key,
                    version_id: output.version_id,
                    delete_marker: output.delete_marker,
                    error: None,
                },
                Err(e) => DeleteOutcome {
                    key: item.key,
                    version_id: item.version_id,
                    delete_marker: false,
                    error: Some(DeleteError {
                        code: e.code().to_owned(),
                        message: e.to_string(),
                    }),
                },
            });
        }
        Ok(outcomes)
    }

    /// Copy an object to a new location, re-streaming (and re-hashing) the
    /// source bytes under the destination's versioning policy.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchKey`] / [`StorageError::NoSuchVersion`] when
    ///   the source does not resolve.
    /// - [`StorageError::NoSuchBucket`] when either bucket is unknown.
    pub async fn copy_object(&self, input: CopyObjectInput) -> StorageResult<CopyObjectOutput> {
        validate_object_key(&input.dst_key)?;
        self.meta.require_bucket(&input.src_bucket).await?;
        self.meta.require_bucket(&input.dst_bucket).await?;

        let src = self
            .resolve_for_read(&input.src_bucket, &input.src_key, input.src_version_id.as_deref())
            .await?;

        let guard = self.locks.lock_key(&input.dst_bucket, &input.dst_key).await;

        let versioning = self.meta.versioning(&input.dst_bucket).await?;
        let dst_version_id = if versioning.is_enabled() {
            crate::utils::generate_version_id()
        } else {
            NULL_VERSION_ID.to_owned()
        };

        if dst_version_id == NULL_VERSION_ID {
            if let Ok(existing) = self
                .meta
                .get_version(&input.dst_bucket, &input.dst_key, NULL_VERSION_ID)
                .await
            {
                if !existing.is_delete_marker
                    && existing.deletion_blocked(crate::utils::now_millis(), false)
                {
                    return Err(StorageError::AccessDenied);
                }
            }
        }

        let src_path = self
            .meta
            .resolver()
            .data_path(&input.src_bucket, &input.src_key, &src.version_id);
        if !tokio::fs::try_exists(&src_path).await.unwrap_or(false) {
            return Err(StorageError::Internal(anyhow::anyhow!(
                "metadata present but data file missing for {}/{}@{}",
                input.src_bucket,
                input.src_key,
                src.version_id
            )));
        }

        let dst_path = self
            .meta
            .resolver()
            .data_path(&input.dst_bucket, &input.dst_key, &dst_version_id);
        let body = self.io.read_stream(&src_path, None).await?;
        let write = self.io.write_stream(&dst_path, body, None).await?;

        let mut metadata = input.metadata.unwrap_or_else(|| src.metadata.clone());
        metadata.normalize();
        validate_metadata(&metadata.user_metadata)?;
        validate_tags(&metadata.tags)?;

        let now = crate::utils::now_millis();
        let record = VersionRecord {
            key: input.dst_key.clone(),
            version_id: dst_version_id.clone(),
            etag: write.etag.clone(),
            size: write.size,
            last_modified: now,
            is_latest: true,
            is_delete_marker: false,
            storage_class: input.storage_class.unwrap_or(src.storage_class),
            owner: input.owner.clone(),
            metadata,
            checksum: None,
            parts_count: None,
        };

        if let Err(e) = self.meta.save_metadata(&input.dst_bucket, &record).await {
            let _ = tokio::fs::remove_file(&dst_path).await;
            return Err(e);
        }

        drop(guard);

        debug!(
            src_bucket = %input.src_bucket,
            src_key = %input.src_key,
            dst_bucket = %input.dst_bucket,
            dst_key = %input.dst_key,
            "copy_object completed"
        );

        let real_version_id = (dst_version_id != NULL_VERSION_ID).then_some(dst_version_id);
        self.emit(
            EventType::ObjectCreatedCopy,
            &input.dst_bucket,
            &input.dst_key,
            write.size,
            &write.etag,
            real_version_id.clone(),
            &input.owner.id,
        )
        .await;

        Ok(CopyObjectOutput {
            etag: write.etag,
            version_id: real_version_id,
            last_modified: now,
            size: write.size,
        })
    }

    /// Re-read an object's bytes and compare against its recorded size,
    /// ETag, and optional checksum.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchKey`] / [`StorageError::NoSuchVersion`] when
    ///   the version does not resolve.
    /// - [`StorageError::Internal`] when the data file cannot be read.
    pub async fn verify_object_integrity(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<IntegrityReport> {
        let record = self.resolve_for_read(bucket, key, version_id).await?;

        let path = self
            .meta
            .resolver()
            .data_path(bucket, key, &record.version_id);
        let algorithm = record.checksum.as_ref().map(|c| c.algorithm);
        let computed = self.io.hash_file(&path, algorithm).await?;

        let expected_etag = match record.parts_count {
            Some(n) => multipart_etag(&computed.etag, n as usize),
            None => computed.etag.clone(),
        };

        let mut is_valid = computed.size == record.size && expected_etag == record.etag;
        if let (Some(recorded), Some(actual)) = (record.checksum.as_ref(), computed.checksum) {
            is_valid = is_valid && recorded.value == actual;
        }

        Ok(IntegrityReport {
            is_valid,
            bitrot_detected: !is_valid,
        })
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// Resolve the record for a read: latest by default (hidden behind a
    /// delete marker), or the explicit version (a delete marker fails
    /// `MethodNotAllowed`).
    pub(crate) async fn resolve_for_read(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<VersionRecord> {
        self.meta.require_bucket(bucket).await?;
        let record = self.meta.get_metadata(bucket, key, version_id).await?;
        if record.is_delete_marker {
            return Err(StorageError::MethodNotAllowed);
        }
        Ok(record)
    }

    /// Permanently remove one version (data + metadata), subject to lock
    /// checks. Caller holds the key's write guard.
    async fn remove_version_locked(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
        bypass_governance: bool,
    ) -> StorageResult<VersionRecord> {
        let record = self.meta.get_version(bucket, key, version_id).await?;

        if !record.is_delete_marker
            && record.deletion_blocked(crate::utils::now_millis(), bypass_governance)
        {
            return Err(StorageError::AccessDenied);
        }

        let removed = self.meta.delete_metadata(bucket, key, version_id).await?;
        if !removed.is_delete_marker {
            let path = self.meta.resolver().data_path(bucket, key, version_id);
            crate::meta::MetadataStore::remove_if_exists(&path).await?;
        }
        Ok(removed)
    }

    /// Apply the bucket's default retention to a new version that carries
    /// no retention of its own.
    async fn apply_default_retention(
        &self,
        bucket: &str,
        metadata: &mut ObjectMetadata,
    ) -> StorageResult<()> {
        if metadata.retention.is_some() {
            return Ok(());
        }
        let config: Option<crate::configs::ObjectLockConfiguration> =
            crate::meta::MetadataStore::read_json(
                &self
                    .meta
                    .resolver()
                    .bucket_file(bucket, crate::paths::BUCKET_OBJECT_LOCK_FILE),
            )
            .await?;
        if let Some(config) = config {
            if config.enabled {
                if let Some(default) = config.default_retention {
                    metadata.retention = Some(crate::types::Retention {
                        mode: default.mode,
                        retain_until: crate::utils::now_millis()
                            + chrono::Duration::days(i64::from(default.days)),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
