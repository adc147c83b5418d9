//! Sidecar-backed metadata store.
//!
//! Per-version metadata lives in a `.metadata` JSON sidecar next to the
//! data file; bucket configurations are named JSON documents under the
//! bucket directory. All document writes go through a temp-file-and-rename
//! so readers never observe a torn JSON document.
//!
//! "Latest" bookkeeping: each key's current version carries
//! `is_latest = true` in its sidecar. [`MetadataStore::save_metadata`]
//! writes the new record before demoting the prior latest, and
//! [`resolve_latest`] prefers the newest marked record, so a crash between
//! the two writes resolves to the correct version on recovery.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::configs::{BucketInfo, VersioningConfig};
use crate::error::{StorageError, StorageResult};
use crate::paths::{self, PathResolver};
use crate::types::VersionRecord;

/// Metadata store rooted at the resolver's root path.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    resolver: PathResolver,
}

/// One entry of a sorted directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanEntry {
    /// File or directory name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl MetadataStore {
    /// Create a store over the given resolver.
    #[must_use]
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// The path resolver in use.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    // -----------------------------------------------------------------------
    // Generic JSON documents
    // -----------------------------------------------------------------------

    /// Read a JSON document; `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure or corrupt JSON.
    pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::Internal(
                        anyhow::Error::new(e).context(format!("corrupt document {}", path.display())),
                    )
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Atomically write a JSON document: serialize into a temp file in the
    /// target directory, then rename over the destination.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
            StorageError::Internal(
                anyhow::Error::new(e).context(format!("serializing {}", path.display())),
            )
        })?;

        Self::write_json_atomic_raw(path, &bytes).await?;
        trace!(path = %path.display(), "wrote document");
        Ok(())
    }

    /// Atomically replace a file with raw bytes (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub(crate) async fn write_json_atomic_raw(path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::Internal(anyhow::anyhow!("document path has no parent")))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;

        let dest = path.to_path_buf();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            std::io::Write::write_all(&mut tmp, &bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Internal(anyhow::anyhow!("document write task failed: {e}")))?
        .map_err(|e| StorageError::io(format!("writing {}", path.display()), e))?;
        Ok(())
    }

    /// Remove a file, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure other than
    /// not-found.
    pub async fn remove_if_exists(path: &Path) -> StorageResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(format!("removing {}", path.display()), e)),
        }
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Whether a bucket directory with its identity sidecar exists.
    pub async fn bucket_exists(&self, bucket: &str) -> bool {
        tokio::fs::try_exists(self.resolver.bucket_file(bucket, paths::BUCKET_METADATA_FILE))
            .await
            .unwrap_or(false)
    }

    /// Fail with [`StorageError::NoSuchBucket`] unless the bucket exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when absent.
    pub async fn require_bucket(&self, bucket: &str) -> StorageResult<()> {
        if self.bucket_exists(bucket).await {
            Ok(())
        } else {
            Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }

    /// Read a bucket's identity document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when absent.
    pub async fn read_bucket_info(&self, bucket: &str) -> StorageResult<BucketInfo> {
        Self::read_json(&self.resolver.bucket_file(bucket, paths::BUCKET_METADATA_FILE))
            .await?
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
    }

    /// Read the bucket's versioning configuration (default when never set).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn versioning(&self, bucket: &str) -> StorageResult<VersioningConfig> {
        Ok(
            Self::read_json(&self.resolver.bucket_file(bucket, paths::VERSIONING_FILE))
                .await?
                .unwrap_or_default(),
        )
    }

    // -----------------------------------------------------------------------
    // Version records
    // -----------------------------------------------------------------------

    /// All version records of a key, sorted newest first
    /// (`last_modified` descending, then `version_id` ascending).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure; an absent key
    /// yields an empty list.
    pub async fn list_key_versions(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<Vec<VersionRecord>> {
        let dir = self.resolver.key_dir(bucket, key);
        let (_, base) = paths::split_key(key);

        let mut records = Vec::new();
        for entry in scan_dir(&dir).await? {
            if entry.is_dir || !entry.name.ends_with(paths::METADATA_SUFFIX) {
                continue;
            }
            let stem = &entry.name[..entry.name.len() - paths::METADATA_SUFFIX.len()];
            let (stem_base, _) = paths::parse_version_stem(stem);
            if stem_base != base {
                continue;
            }
            if let Some(record) =
                Self::read_json::<VersionRecord>(&dir.join(&entry.name)).await?
            {
                if record.key == key {
                    records.push(record);
                }
            }
        }

        sort_versions(&mut records);
        Ok(records)
    }

    /// The current version record of a key (delete markers included).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchKey`] when the key has no records.
    pub async fn get_latest(&self, bucket: &str, key: &str) -> StorageResult<VersionRecord> {
        let records = self.list_key_versions(bucket, key).await?;
        resolve_latest(&records)
            .cloned()
            .ok_or_else(|| StorageError::NoSuchKey {
                key: key.to_owned(),
            })
    }

    /// A specific version record of a key (delete markers included).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchVersion`] when the version is unknown.
    pub async fn get_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> StorageResult<VersionRecord> {
        // Malformed IDs never resolve; checking first also keeps
        // client-supplied IDs out of path construction.
        if !crate::validation::is_well_formed_version_id(version_id) {
            return Err(StorageError::NoSuchVersion {
                key: key.to_owned(),
                version_id: version_id.to_owned(),
            });
        }
        let path = self.resolver.metadata_path(bucket, key, version_id);
        Self::read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NoSuchVersion {
                key: key.to_owned(),
                version_id: version_id.to_owned(),
            })
    }

    /// Resolve metadata for a read: a specific version when requested,
    /// otherwise the current version, which fails [`StorageError::NoSuchKey`]
    /// when it is a delete marker.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchKey`] / [`StorageError::NoSuchVersion`]
    /// per the resolution rules above.
    pub async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<VersionRecord> {
        match version_id {
            Some(vid) => self.get_version(bucket, key, vid).await,
            None => {
                let latest = self.get_latest(bucket, key).await?;
                if latest.is_delete_marker {
                    return Err(StorageError::NoSuchKey {
                        key: key.to_owned(),
                    });
                }
                Ok(latest)
            }
        }
    }

    /// Persist a version record, demoting the prior latest of the same key
    /// when this record is the new latest.
    ///
    /// The caller holds the key's write lock, making this the critical
    /// section required by the latest-pointer invariant.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure.
    pub async fn save_metadata(&self, bucket: &str, record: &VersionRecord) -> StorageResult<()> {
        let path = self
            .resolver
            .metadata_path(bucket, &record.key, &record.version_id);

        // Prior records are read before the new sidecar lands so the new
        // record never shows up in its own demotion pass.
        let prior = if record.is_latest {
            self.list_key_versions(bucket, &record.key).await?
        } else {
            Vec::new()
        };

        Self::write_json_atomic(&path, record).await?;

        for mut old in prior {
            if old.version_id != record.version_id && old.is_latest {
                old.is_latest = false;
                let old_path = self
                    .resolver
                    .metadata_path(bucket, &old.key, &old.version_id);
                Self::write_json_atomic(&old_path, &old).await?;
                trace!(key = %old.key, version_id = %old.version_id, "demoted prior latest");
            }
        }

        debug!(
            bucket,
            key = %record.key,
            version_id = %record.version_id,
            is_latest = record.is_latest,
            "saved version record"
        );
        Ok(())
    }

    /// Remove a version's metadata (and ACL sidecar), promoting the newest
    /// remaining version when the removed record was the latest.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchVersion`] when the version is unknown.
    pub async fn delete_metadata(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> StorageResult<VersionRecord> {
        let removed = self.get_version(bucket, key, version_id).await?;

        let meta_path = self.resolver.metadata_path(bucket, key, version_id);
        Self::remove_if_exists(&meta_path).await?;
        Self::remove_if_exists(&self.resolver.acl_path(bucket, key, version_id)).await?;

        if removed.is_latest {
            let remaining = self.list_key_versions(bucket, key).await?;
            if let Some(newest) = remaining.first() {
                if !newest.is_latest {
                    let mut promoted = newest.clone();
                    promoted.is_latest = true;
                    let path = self
                        .resolver
                        .metadata_path(bucket, key, &promoted.version_id);
                    Self::write_json_atomic(&path, &promoted).await?;
                    trace!(key, version_id = %promoted.version_id, "promoted new latest");
                }
            }
        }

        debug!(bucket, key, version_id, "deleted version record");
        Ok(removed)
    }
}

/// Sort records newest first: `last_modified` descending, then
/// `version_id` ascending as the tie-break.
pub(crate) fn sort_versions(records: &mut [VersionRecord]) {
    records.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.version_id.cmp(&b.version_id))
    });
}

/// Resolve the current version among a key's records (sorted newest
/// first): the newest record marked `is_latest`, falling back to the
/// newest record when no marks survived a crash.
pub(crate) fn resolve_latest(records: &[VersionRecord]) -> Option<&VersionRecord> {
    records.iter().find(|r| r.is_latest).or_else(|| records.first())
}

/// Read a directory's entries sorted for lexicographic key traversal:
/// directories sort with a virtual trailing `/` so `a!b` precedes `a/x`.
/// A missing directory yields an empty list.
pub(crate) async fn scan_dir(dir: &Path) -> StorageResult<Vec<ScanEntry>> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(format!("reading {}", dir.display()), e)),
    };

    let mut entries = Vec::new();
    loop {
        let entry = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("reading {}", dir.display()), e))?;
        let Some(entry) = entry else { break };

        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry
            .file_type()
            .await
            .map_err(|e| StorageError::io(format!("reading {}", dir.display()), e))?
            .is_dir();
        entries.push(ScanEntry { name, is_dir });
    }

    entries.sort_by(|a, b| sort_name(a).cmp(&sort_name(b)));
    Ok(entries)
}

/// Sort key for directory entries: directories get a virtual trailing `/`.
fn sort_name(entry: &ScanEntry) -> String {
    if entry.is_dir {
        format!("{}/", entry.name)
    } else {
        entry.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
