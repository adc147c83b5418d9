//! Versioning and delete-marker integration tests.

#[cfg(test)]
mod tests {
    use silo_core::configs::{VersioningConfig, VersioningStatus};
    use silo_core::io::body_from_bytes;
    use silo_core::types::Owner;
    use silo_core::{ListObjectVersionsInput, PutObjectInput, SiloStore, StorageError};

    use crate::{create_test_bucket, drain, test_store};

    async fn enable_versioning(store: &SiloStore, bucket: &str) {
        store
            .put_bucket_versioning(
                bucket,
                VersioningConfig {
                    status: VersioningStatus::Enabled,
                    mfa_delete: None,
                },
            )
            .await
            .expect("enable versioning");
    }

    async fn put_version(store: &SiloStore, bucket: &str, key: &str, data: &'static str) -> String {
        store
            .put_object(PutObjectInput::new(bucket, key, body_from_bytes(data)))
            .await
            .expect("put version")
            .version_id
            .expect("versioned put returns an id")
    }

    async fn get_version_bytes(
        store: &SiloStore,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> bytes::Bytes {
        let got = store
            .get_object(bucket, key, version_id, None)
            .await
            .expect("get version");
        drain(got.body).await
    }

    #[tokio::test]
    async fn test_should_stack_versions_on_overwrite() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "ver").await;
        enable_versioning(&store, &bucket).await;

        let v1 = put_version(&store, &bucket, "k", "A").await;
        let v2 = put_version(&store, &bucket, "k", "BB").await;
        assert_ne!(v1, v2);

        // Latest get returns the second write.
        assert_eq!(get_version_bytes(&store, &bucket, "k", None).await.as_ref(), b"BB");
        // The first version stays reachable by ID.
        assert_eq!(
            get_version_bytes(&store, &bucket, "k", Some(&v1)).await.as_ref(),
            b"A"
        );

        let page = store
            .list_object_versions(ListObjectVersionsInput::all(&bucket))
            .await
            .expect("list versions");
        assert_eq!(page.versions.len(), 2);

        // Newest first, with is_latest only on the newest.
        assert_eq!(page.versions[0].version_id, v2);
        assert!(page.versions[0].is_latest);
        assert_eq!(page.versions[0].size, 2);
        assert_eq!(page.versions[1].version_id, v1);
        assert!(!page.versions[1].is_latest);
        assert_eq!(page.versions[1].size, 1);
    }

    #[tokio::test]
    async fn test_should_keep_exactly_one_latest_across_writes() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "latest").await;
        enable_versioning(&store, &bucket).await;

        for data in ["one", "two", "three", "four"] {
            store
                .put_object(PutObjectInput::new(&bucket, "k", body_from_bytes(data)))
                .await
                .expect("put");

            let page = store
                .list_object_versions(ListObjectVersionsInput::all(&bucket))
                .await
                .expect("list versions");
            let latest_count = page.versions.iter().filter(|v| v.is_latest).count();
            assert_eq!(latest_count, 1, "exactly one latest after every put");
        }
    }

    #[tokio::test]
    async fn test_should_hide_and_expose_around_delete_marker() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "marker").await;
        enable_versioning(&store, &bucket).await;

        put_version(&store, &bucket, "k", "A").await;
        let v2 = put_version(&store, &bucket, "k", "BB").await;

        let deleted = store
            .delete_object(&bucket, "k", None, false, &Owner::default())
            .await
            .expect("delete");
        assert!(deleted.delete_marker);
        let marker = deleted.version_id.expect("marker id");

        // The key looks gone.
        assert!(matches!(
            store.get_object(&bucket, "k", None, None).await,
            Err(StorageError::NoSuchKey { .. })
        ));

        // Requesting the marker explicitly is refused.
        assert!(matches!(
            store.get_object(&bucket, "k", Some(&marker), None).await,
            Err(StorageError::MethodNotAllowed)
        ));

        // The newest real version remains reachable.
        assert_eq!(
            get_version_bytes(&store, &bucket, "k", Some(&v2)).await.as_ref(),
            b"BB"
        );

        // The marker appears in the version listing as the latest entry.
        let page = store
            .list_object_versions(ListObjectVersionsInput::all(&bucket))
            .await
            .expect("list versions");
        assert_eq!(page.versions.len(), 3);
        assert!(page.versions[0].is_delete_marker);
        assert!(page.versions[0].is_latest);
        assert_eq!(page.versions[0].size, 0);
    }

    #[tokio::test]
    async fn test_should_restore_visibility_when_marker_removed() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "undelete").await;
        enable_versioning(&store, &bucket).await;

        put_version(&store, &bucket, "k", "payload").await;
        let deleted = store
            .delete_object(&bucket, "k", None, false, &Owner::default())
            .await
            .expect("delete");
        let marker = deleted.version_id.expect("marker id");

        // Permanently removing the marker undeletes the object.
        store
            .delete_object(&bucket, "k", Some(&marker), false, &Owner::default())
            .await
            .expect("remove marker");

        assert_eq!(
            get_version_bytes(&store, &bucket, "k", None).await.as_ref(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn test_should_replace_null_version_while_suspended() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "suspend").await;
        enable_versioning(&store, &bucket).await;

        let v1 = put_version(&store, &bucket, "k", "versioned").await;

        store
            .put_bucket_versioning(
                &bucket,
                VersioningConfig {
                    status: VersioningStatus::Suspended,
                    mfa_delete: None,
                },
            )
            .await
            .expect("suspend");

        // Suspended puts land on the "null" version.
        let put = store
            .put_object(PutObjectInput::new(&bucket, "k", body_from_bytes("null-1")))
            .await
            .expect("suspended put");
        assert!(put.version_id.is_none());

        // And replace it in place on the next put.
        store
            .put_object(PutObjectInput::new(&bucket, "k", body_from_bytes("null-2")))
            .await
            .expect("suspended re-put");

        assert_eq!(get_version_bytes(&store, &bucket, "k", None).await.as_ref(), b"null-2");

        // The pre-suspension version survives.
        assert_eq!(
            get_version_bytes(&store, &bucket, "k", Some(&v1)).await.as_ref(),
            b"versioned"
        );

        let page = store
            .list_object_versions(ListObjectVersionsInput::all(&bucket))
            .await
            .expect("list versions");
        assert_eq!(page.versions.len(), 2, "null version replaced, not stacked");
    }
}
