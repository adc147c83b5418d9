//! Bucket CRUD operation handlers.
//!
//! Implements `create_bucket`, `delete_bucket`, `head_bucket`, and
//! `list_buckets`.

use tracing::{info, warn};

use crate::configs::BucketInfo;
use crate::error::{StorageError, StorageResult};
use crate::meta::MetadataStore;
use crate::meta::list::has_any_record;
use crate::meta::store::scan_dir;
use crate::paths;
use crate::store::SiloStore;
use crate::types::{AccessControlPolicy, CannedAcl, Owner};
use crate::validation::validate_bucket_name;

impl SiloStore {
    /// Create a bucket owned by `owner`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidArgument`] for an invalid name.
    /// - [`StorageError::BucketAlreadyExists`] when the name is taken.
    pub async fn create_bucket(&self, name: &str, owner: Owner) -> StorageResult<BucketInfo> {
        validate_bucket_name(name)?;

        let _guard = self.locks.lock_bucket_config(name).await;

        if self.meta.bucket_exists(name).await {
            return Err(StorageError::BucketAlreadyExists {
                bucket: name.to_owned(),
            });
        }

        let dir = self.meta.resolver().bucket_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", dir.display()), e))?;

        let info = BucketInfo {
            name: name.to_owned(),
            owner: owner.clone(),
            created: crate::utils::now_millis(),
        };
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(name, paths::BUCKET_METADATA_FILE),
            &info,
        )
        .await?;

        let acl = AccessControlPolicy::from_canned(owner, CannedAcl::Private);
        MetadataStore::write_json_atomic(
            &self.meta.resolver().bucket_file(name, paths::BUCKET_ACL_FILE),
            &acl,
        )
        .await?;

        info!(bucket = %name, "bucket created");
        Ok(info)
    }

    /// Delete an empty bucket.
    ///
    /// A bucket counts as non-empty while any version record (delete
    /// markers included) or in-progress multipart upload remains.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoSuchBucket`] when the bucket is unknown.
    /// - [`StorageError::BucketNotEmpty`] when objects or uploads remain.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let guard = self.locks.lock_bucket_config(name).await;

        self.meta.require_bucket(name).await?;

        if has_any_record(&self.meta, name).await? || self.has_open_uploads(name).await? {
            return Err(StorageError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }

        let dir = self.meta.resolver().bucket_dir(name);
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(format!("removing {}", dir.display()), e))?;

        drop(guard);
        self.locks.forget_bucket(name);

        info!(bucket = %name, "bucket deleted");
        Ok(())
    }

    /// Fetch a bucket's identity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchBucket`] when the bucket is unknown.
    pub async fn head_bucket(&self, name: &str) -> StorageResult<BucketInfo> {
        self.meta.read_bucket_info(name).await
    }

    /// List all buckets sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] on I/O failure; buckets whose
    /// identity document is unreadable are skipped with a warning.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        for entry in scan_dir(self.meta.resolver().root()).await? {
            if !entry.is_dir || entry.name.starts_with('.') {
                continue;
            }
            match self.meta.read_bucket_info(&entry.name).await {
                Ok(info) => buckets.push(info),
                Err(e) => {
                    warn!(bucket = %entry.name, error = %e, "skipping bucket with unreadable identity");
                }
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Whether any multipart upload directory with a descriptor remains.
    pub(crate) async fn has_open_uploads(&self, bucket: &str) -> StorageResult<bool> {
        let uploads = self.meta.resolver().uploads_dir(bucket);
        for entry in scan_dir(&uploads).await? {
            if entry.is_dir {
                let info = self.meta.resolver().upload_info_path(bucket, &entry.name);
                if tokio::fs::try_exists(&info).await.unwrap_or(false) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    async fn open_store(dir: &tempfile::TempDir) -> SiloStore {
        let config = StorageConfig::builder()
            .root_path(dir.path().into())
            .test_mode(true)
            .build();
        SiloStore::open(config).await.expect("open store")
    }

    #[tokio::test]
    async fn test_should_create_and_head_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        let info = store
            .create_bucket("my-bucket", Owner::default())
            .await
            .expect("test create");
        assert_eq!(info.name, "my-bucket");

        let head = store.head_bucket("my-bucket").await.expect("test head");
        assert_eq!(head, info);
        assert!(dir.path().join("my-bucket/.bucket_metadata").is_file());
        assert!(dir.path().join("my-bucket/.bucket_acl").is_file());
    }

    #[tokio::test]
    async fn test_should_reject_invalid_bucket_name() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        assert!(matches!(
            store.create_bucket("BAD", Owner::default()).await,
            Err(StorageError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        store
            .create_bucket("dup", Owner::default())
            .await
            .expect("test create");
        assert!(matches!(
            store.create_bucket("dup", Owner::default()).await,
            Err(StorageError::BucketAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_delete_empty_bucket_and_allow_recreate() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        store
            .create_bucket("reuse", Owner::default())
            .await
            .expect("test create");
        store.delete_bucket("reuse").await.expect("test delete");
        assert!(matches!(
            store.head_bucket("reuse").await,
            Err(StorageError::NoSuchBucket { .. })
        ));

        store
            .create_bucket("reuse", Owner::default())
            .await
            .expect("test recreate");
    }

    #[tokio::test]
    async fn test_should_fail_delete_of_missing_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        assert!(matches!(
            store.delete_bucket("ghost").await,
            Err(StorageError::NoSuchBucket { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_list_buckets_sorted() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;

        for name in ["charlie", "alpha", "bravo"] {
            store
                .create_bucket(name, Owner::default())
                .await
                .unwrap_or_else(|e| panic!("create {name} failed: {e}"));
        }

        let names: Vec<String> = store
            .list_buckets()
            .await
            .expect("test list")
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[tokio::test]
    async fn test_should_skip_bookkeeping_dir_in_listing() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir).await;
        store
            .create_bucket("only", Owner::default())
            .await
            .expect("test create");

        let buckets = store.list_buckets().await.expect("test list");
        assert_eq!(buckets.len(), 1);
    }
}
