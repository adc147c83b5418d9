//! Bucket lifecycle integration tests.

#[cfg(test)]
mod tests {
    use silo_core::StorageError;
    use silo_core::types::Owner;

    use crate::{create_test_bucket, put_bytes, test_store};

    #[tokio::test]
    async fn test_should_create_head_and_list_buckets() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "crud").await;

        let info = store.head_bucket(&bucket).await.expect("head bucket");
        assert_eq!(info.name, bucket);
        assert_eq!(info.owner, Owner::default());

        let names: Vec<String> = store
            .list_buckets()
            .await
            .expect("list buckets")
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert!(names.contains(&bucket));
    }

    #[tokio::test]
    async fn test_should_reject_delete_of_non_empty_bucket() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "nonempty").await;

        put_bytes(&store, &bucket, "blocker", "x").await;

        // A populated bucket cannot be deleted.
        assert!(matches!(
            store.delete_bucket(&bucket).await,
            Err(StorageError::BucketNotEmpty { .. })
        ));

        // Removing the object unblocks deletion.
        store
            .delete_object(&bucket, "blocker", None, false, &Owner::default())
            .await
            .expect("delete object");
        store.delete_bucket(&bucket).await.expect("delete bucket");

        assert!(matches!(
            store.head_bucket(&bucket).await,
            Err(StorageError::NoSuchBucket { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_count_open_uploads_as_non_empty() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "uploads").await;

        let upload_id = store
            .create_multipart_upload(
                &bucket,
                "pending",
                silo_core::types::ObjectMetadata::default(),
                Owner::default(),
                silo_core::types::StorageClass::default(),
            )
            .await
            .expect("create upload");

        assert!(matches!(
            store.delete_bucket(&bucket).await,
            Err(StorageError::BucketNotEmpty { .. })
        ));

        store
            .abort_multipart_upload(&bucket, &upload_id)
            .await
            .expect("abort upload");
        store.delete_bucket(&bucket).await.expect("delete bucket");
    }

    #[tokio::test]
    async fn test_should_isolate_buckets() {
        let store = test_store().await;
        let first = create_test_bucket(&store, "iso-a").await;
        let second = create_test_bucket(&store, "iso-b").await;

        put_bytes(&store, &first, "shared-key", "from-first").await;
        put_bytes(&store, &second, "shared-key", "from-second").await;

        assert_eq!(
            crate::get_bytes(&store, &first, "shared-key").await.as_ref(),
            b"from-first"
        );
        assert_eq!(
            crate::get_bytes(&store, &second, "shared-key").await.as_ref(),
            b"from-second"
        );
    }
}
