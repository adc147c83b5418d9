//! Multipart upload coordinator.
//!
//! An upload lives entirely under `.uploads/<uploadId>/` in its bucket:
//! `info.json` is the descriptor (its presence defines the OPEN state),
//! `<n>` holds part data, `<n>.part` the part record. Completion assembles
//! the parts into a staging file inside the upload directory and renames
//! it into the final object path, so a failed assembly leaves the upload
//! OPEN and no partial object visible. Abort removes the directory
//! unconditionally and is idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksums::multipart_etag;
use crate::error::{StorageError, StorageResult};
use crate::events::EventType;
use crate::io::BodyStream;
use crate::meta::MetadataStore;
use crate::meta::store::scan_dir;
use crate::store::SiloStore;
use crate::types::{NULL_VERSION_ID, ObjectMetadata, Owner, StorageClass, VersionRecord};
use crate::validation::{validate_metadata, validate_object_key, validate_tags};

/// Highest allowed part number.
const MAX_PART_NUMBER: u32 = 10_000;

/// Staging file name used during assembly.
const ASSEMBLY_FILE: &str = ".assembly";

// ---------------------------------------------------------------------------
// Persistent documents
// ---------------------------------------------------------------------------

/// The `info.json` descriptor of an in-progress upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    /// Target object key.
    pub key: String,
    /// Metadata captured at creation, applied to the final object.
    pub metadata: ObjectMetadata,
    /// The initiating principal.
    pub owner: Owner,
    /// When the upload was initiated. The orphan sweeper ages uploads by
    /// this field, never by file timestamps.
    pub created_at: DateTime<Utc>,
    /// Storage class of the final object.
    #[serde(default)]
    pub storage_class: StorageClass,
}

/// The `<n>.part` record of one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// The part number (1-based).
    pub part_number: u32,
    /// ETag of the part bytes.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
    /// When the part was last uploaded.
    pub last_modified: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// One entry of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// The part number being referenced.
    pub part_number: u32,
    /// The ETag returned when the part was uploaded.
    pub etag: String,
}

/// Output of [`SiloStore::complete_multipart_upload`].
#[derive(Debug, Clone)]
pub struct CompleteMultipartOutput {
    /// Final composite ETag (`<hex>-<partCount>`).
    pub etag: String,
    /// Version ID of the assembled object, when versioning applies.
    pub version_id: Option<String>,
    /// Total assembled size in bytes.
    pub size: u64,
}

/// Output of [`SiloStore::list_parts`].
#[derive(Debug, Clone)]
pub struct ListPartsOutput {
    /// Part records in ascending part-number order.
    pub parts: Vec<PartRecord>,
    /// Whether more parts remain.
    pub is_truncated: bool,
    /// Marker for the next page.
    pub next_part_number_marker: Option<u32>,
}

/// One entry of [`SiloStore::list_multipart_uploads`].
#[derive(Debug, Clone)]
pub struct MultipartUploadInfo {
    /// The upload ID.
    pub upload_id: String,
    /// Target object key.
    pub key: String,
    /// The initiating principal.
    pub owner: Owner,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Storage class of the final object.
    pub storage_class: StorageClass,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

impl SiloStore {
    /// Initiate a multipart upload, returning its upload ID.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::InvalidKey`] / [`StorageError::InvalidArgument`]
    ///   for invalid keys, tags, or metadata.
    pub async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        mut metadata: ObjectMetadata,
        owner: Owner,
        storage_class: StorageClass,
    ) -> StorageResult<String> {
        validate_object_key(key)?;
        validate_metadata(&metadata.user_metadata)?;
        validate_tags(&metadata.tags)?;
        metadata.normalize();

        self.meta.require_bucket(bucket).await?;

        let upload_id = crate::utils::generate_upload_id();
        let info = UploadInfo {
            key: key.to_owned(),
            metadata,
            owner,
            created_at: crate::utils::now_millis(),
            storage_class,
        };
        MetadataStore::write_json_atomic(
            &self.meta.resolver().upload_info_path(bucket, &upload_id),
            &info,
        )
        .await?;

        debug!(bucket, key, upload_id = %upload_id, "create_multipart_upload completed");
        Ok(upload_id)
    }

    /// Upload one part. Re-uploading a part number overwrites it.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchUpload`] when the upload is unknown.
    /// - [`StorageError::InvalidArgument`] for an out-of-range part number.
    pub async fn upload_part(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
    ) -> StorageResult<String> {
        validate_part_number(part_number)?;
        self.meta.require_bucket(bucket).await?;
        self.require_upload(bucket, upload_id).await?;

        let _guard = self.locks.lock_bucket_shared(bucket).await;

        let path = self.meta.resolver().part_path(bucket, upload_id, part_number);
        let write = self.io.write_stream(&path, body, None).await?;

        let record = PartRecord {
            part_number,
            etag: write.etag.clone(),
            size: write.size,
            last_modified: crate::utils::now_millis(),
        };
        MetadataStore::write_json_atomic(
            &self
                .meta
                .resolver()
                .part_record_path(bucket, upload_id, part_number),
            &record,
        )
        .await?;

        debug!(bucket, upload_id, part_number, size = write.size, "upload_part completed");
        Ok(write.etag)
    }

    /// Upload a part by copying an existing object's bytes.
    ///
    /// # Errors
    ///
    /// Source resolution follows [`SiloStore::get_object`]; the upload must
    /// exist.
    pub async fn upload_part_copy(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        src_version_id: Option<&str>,
    ) -> StorageResult<String> {
        validate_part_number(part_number)?;
        self.meta.require_bucket(bucket).await?;
        self.require_upload(bucket, upload_id).await?;

        let src = self
            .resolve_for_read(src_bucket, src_key, src_version_id)
            .await?;
        let src_path = self
            .meta
            .resolver()
            .data_path(src_bucket, src_key, &src.version_id);
        let body = self.io.read_stream(&src_path, None).await?;

        self.upload_part(bucket, upload_id, part_number, body).await
    }

    /// Assemble the listed parts into the final object.
    ///
    /// Validates the request (key match, strictly ascending unique part
    /// numbers, stored parts present, client ETags matching), concatenates
    /// part data with a rolling hash, and publishes the result under the
    /// bucket's versioning policy. A failure during assembly leaves the
    /// upload OPEN with no object visible.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchUpload`] when the upload is unknown.
    /// - [`StorageError::InvalidArgument`] for key mismatch, an empty part
    ///   list, or mis-ordered part numbers.
    /// - [`StorageError::InvalidPart`] for missing parts or ETag
    ///   mismatches.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<CompleteMultipartOutput> {
        self.meta.require_bucket(bucket).await?;
        let info = self.require_upload(bucket, upload_id).await?;

        if info.key != key {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "Upload {upload_id} targets key {:?}, not {key:?}",
                    info.key
                ),
            });
        }
        if parts.is_empty() {
            return Err(StorageError::InvalidArgument {
                message: "Completion requires at least one part".to_owned(),
            });
        }

        let mut last_number = 0u32;
        let mut sources = Vec::with_capacity(parts.len());
        for part in parts {
            validate_part_number(part.part_number)?;
            if part.part_number <= last_number {
                return Err(StorageError::InvalidArgument {
                    message: "Part numbers must be strictly ascending and unique".to_owned(),
                });
            }
            last_number = part.part_number;

            let record: PartRecord = MetadataStore::read_json(
                &self
                    .meta
                    .resolver()
                    .part_record_path(bucket, upload_id, part.part_number),
            )
            .await?
            .ok_or_else(|| StorageError::InvalidPart {
                message: format!("part {} was never uploaded", part.part_number),
            })?;

            if record.etag != part.etag {
                return Err(StorageError::InvalidPart {
                    message: format!("part {} ETag does not match", part.part_number),
                });
            }

            sources.push(
                self.meta
                    .resolver()
                    .part_path(bucket, upload_id, part.part_number),
            );
        }

        let guard = self.locks.lock_key(bucket, key).await;

        let versioning = self.meta.versioning(bucket).await?;
        let version_id = if versioning.is_enabled() {
            crate::utils::generate_version_id()
        } else {
            NULL_VERSION_ID.to_owned()
        };

        if version_id == NULL_VERSION_ID {
            if let Ok(existing) = self.meta.get_version(bucket, key, NULL_VERSION_ID).await {
                if !existing.is_delete_marker
                    && existing.deletion_blocked(crate::utils::now_millis(), false)
                {
                    return Err(StorageError::AccessDenied);
                }
            }
        }

        // Assemble into a staging file inside the upload directory so a
        // mid-assembly failure never exposes a partial object.
        let staging = self.meta.resolver().upload_dir(bucket, upload_id).join(ASSEMBLY_FILE);
        let write = self.io.concat_files(&staging, &sources).await?;

        let final_path = self.meta.resolver().data_path(bucket, key, &version_id);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;
        }
        tokio::fs::rename(&staging, &final_path)
            .await
            .map_err(|e| StorageError::io(format!("publishing {}", final_path.display()), e))?;

        let etag = multipart_etag(&write.etag, parts.len());
        let record = VersionRecord {
            key: key.to_owned(),
            version_id: version_id.clone(),
            etag: etag.clone(),
            size: write.size,
            last_modified: crate::utils::now_millis(),
            is_latest: true,
            is_delete_marker: false,
            storage_class: info.storage_class,
            owner: info.owner.clone(),
            metadata: info.metadata.clone(),
            checksum: None,
            parts_count: Some(u32::try_from(parts.len()).unwrap_or(u32::MAX)),
        };

        if let Err(e) = self.meta.save_metadata(bucket, &record).await {
            let _ = tokio::fs::remove_file(&final_path).await;
            return Err(e);
        }

        // The upload leaves OPEN only now that the object is fully visible.
        let upload_dir = self.meta.resolver().upload_dir(bucket, upload_id);
        remove_dir_idempotent(&upload_dir).await?;

        drop(guard);

        debug!(
            bucket,
            key,
            upload_id,
            parts = parts.len(),
            size = write.size,
            "complete_multipart_upload completed"
        );

        let real_version_id = (version_id != NULL_VERSION_ID).then_some(version_id);
        self.emit(
            EventType::ObjectCreatedCompleteMultipartUpload,
            bucket,
            key,
            write.size,
            &etag,
            real_version_id.clone(),
            &info.owner.id,
        )
        .await;

        Ok(CompleteMultipartOutput {
            etag,
            version_id: real_version_id,
            size: write.size,
        })
    }

    /// Abort a multipart upload, removing all of its state. Idempotent:
    /// aborting an unknown or already-aborted upload succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn abort_multipart_upload(&self, bucket: &str, upload_id: &str) -> StorageResult<()> {
        self.meta.require_bucket(bucket).await?;
        // An ID this store never minted has nothing to remove.
        if !crate::validation::is_well_formed_upload_id(upload_id) {
            return Ok(());
        }
        let _guard = self.locks.lock_bucket_shared(bucket).await;

        let dir = self.meta.resolver().upload_dir(bucket, upload_id);
        remove_dir_idempotent(&dir).await?;
        debug!(bucket, upload_id, "abort_multipart_upload completed");
        Ok(())
    }

    /// List parts uploaded so far, ascending by part number.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchUpload`] when the upload is unknown.
    pub async fn list_parts(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number_marker: Option<u32>,
        max_parts: Option<usize>,
    ) -> StorageResult<ListPartsOutput> {
        self.meta.require_bucket(bucket).await?;
        self.require_upload(bucket, upload_id).await?;

        let dir = self.meta.resolver().upload_dir(bucket, upload_id);
        let marker = part_number_marker.unwrap_or(0);
        let limit = self.config.effective_max_keys(max_parts);

        let mut parts = Vec::new();
        for entry in scan_dir(&dir).await? {
            if entry.is_dir || !entry.name.ends_with(".part") {
                continue;
            }
            if let Some(record) =
                MetadataStore::read_json::<PartRecord>(&dir.join(&entry.name)).await?
            {
                if record.part_number > marker {
                    parts.push(record);
                }
            }
        }
        parts.sort_by_key(|p| p.part_number);

        let is_truncated = parts.len() > limit;
        parts.truncate(limit);
        let next_marker = is_truncated.then(|| parts.last().map(|p| p.part_number)).flatten();

        Ok(ListPartsOutput {
            parts,
            is_truncated,
            next_part_number_marker: next_marker,
        })
    }

    /// List in-progress uploads of a bucket, sorted by key then initiation
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_uploads: Option<usize>,
    ) -> StorageResult<Vec<MultipartUploadInfo>> {
        self.meta.require_bucket(bucket).await?;

        let uploads_dir = self.meta.resolver().uploads_dir(bucket);
        let prefix = prefix.unwrap_or("");
        let limit = self.config.effective_max_keys(max_uploads);

        let mut uploads = Vec::new();
        for entry in scan_dir(&uploads_dir).await? {
            if !entry.is_dir {
                continue;
            }
            let info_path = self.meta.resolver().upload_info_path(bucket, &entry.name);
            match MetadataStore::read_json::<UploadInfo>(&info_path).await {
                Ok(Some(info)) if info.key.starts_with(prefix) => {
                    uploads.push(MultipartUploadInfo {
                        upload_id: entry.name,
                        key: info.key,
                        owner: info.owner,
                        initiated: info.created_at,
                        storage_class: info.storage_class,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(bucket, upload_id = %entry.name, error = %e, "skipping unreadable upload descriptor");
                }
            }
        }

        uploads.sort_by(|a, b| a.key.cmp(&b.key).then(a.initiated.cmp(&b.initiated)));
        uploads.truncate(limit);
        Ok(uploads)
    }

    /// Remove uploads older than the configured cutoff across all buckets,
    /// along with uploads whose descriptor is corrupt or missing. Returns
    /// how many upload directories were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure enumerating the
    /// root.
    pub async fn sweep_orphaned_uploads(&self) -> StorageResult<usize> {
        let cutoff = crate::utils::now_millis()
            - chrono::Duration::from_std(self.config.orphan_upload_age)
                .unwrap_or_else(|_| chrono::Duration::days(7));

        let mut removed = 0usize;
        for bucket_entry in scan_dir(self.meta.resolver().root()).await? {
            if !bucket_entry.is_dir || bucket_entry.name.starts_with('.') {
                continue;
            }
            let bucket = bucket_entry.name.as_str();

            for upload_entry in scan_dir(&self.meta.resolver().uploads_dir(bucket)).await? {
                if !upload_entry.is_dir {
                    continue;
                }
                let upload_id = upload_entry.name.as_str();
                let info_path = self.meta.resolver().upload_info_path(bucket, upload_id);

                let expired = match MetadataStore::read_json::<UploadInfo>(&info_path).await {
                    Ok(Some(info)) => info.created_at < cutoff,
                    // Missing or corrupt descriptors are swept regardless
                    // of age.
                    Ok(None) => true,
                    Err(e) => {
                        warn!(bucket, upload_id, error = %e, "removing upload with corrupt descriptor");
                        true
                    }
                };

                if expired {
                    let dir = self.meta.resolver().upload_dir(bucket, upload_id);
                    remove_dir_idempotent(&dir).await?;
                    warn!(bucket, upload_id, "swept orphaned upload");
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!(removed, "orphan sweep finished");
        }
        Ok(removed)
    }

    /// Read an upload descriptor, failing `NoSuchUpload` when absent or
    /// when the ID is not one this store could have minted (keeping
    /// client-supplied IDs out of path construction).
    async fn require_upload(&self, bucket: &str, upload_id: &str) -> StorageResult<UploadInfo> {
        if !crate::validation::is_well_formed_upload_id(upload_id) {
            return Err(StorageError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            });
        }
        MetadataStore::read_json(&self.meta.resolver().upload_info_path(bucket, upload_id))
            .await?
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }
}

/// Bounds check for part numbers.
fn validate_part_number(part_number: u32) -> StorageResult<()> {
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(StorageError::InvalidArgument {
            message: format!("Part number must be between 1 and {MAX_PART_NUMBER}"),
        });
    }
    Ok(())
}

/// Remove a directory tree, succeeding when it is already gone.
async fn remove_dir_idempotent(dir: &std::path::Path) -> StorageResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(format!("removing {}", dir.display()), e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
