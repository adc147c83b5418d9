//! Listing integration tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use silo_core::ListObjectsInput;

    use crate::{create_test_bucket, put_bytes, test_store};

    #[tokio::test]
    async fn test_should_collapse_keys_at_delimiter() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "delim").await;

        for key in ["a/1", "a/2", "b/1", "c"] {
            put_bytes(&store, &bucket, key, "x").await;
        }

        let page = store
            .list_objects(ListObjectsInput {
                bucket: bucket.clone(),
                delimiter: Some("/".to_owned()),
                ..ListObjectsInput::default()
            })
            .await
            .expect("list");

        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c"]);
        assert_eq!(page.common_prefixes, vec!["a/", "b/"]);
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn test_should_return_strictly_increasing_keys() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "sorted").await;

        for key in ["zeta", "alpha", "nested/inner", "mid"] {
            put_bytes(&store, &bucket, key, "x").await;
        }

        let page = store
            .list_objects(ListObjectsInput::all(&bucket))
            .await
            .expect("list");
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted, "keys must be in byte-wise order");
    }

    #[tokio::test]
    async fn test_should_cover_full_set_across_pages() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "pages").await;

        let expected: BTreeSet<String> = (0..23).map(|i| format!("obj-{i:03}")).collect();
        for key in &expected {
            put_bytes(&store, &bucket, key, "x").await;
        }

        let mut collected = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store
                .list_objects(ListObjectsInput {
                    bucket: bucket.clone(),
                    continuation_token: token.take(),
                    max_keys: Some(7),
                    ..ListObjectsInput::default()
                })
                .await
                .expect("list page");

            assert!(page.objects.len() <= 7);
            collected.extend(page.objects.iter().map(|o| o.key.clone()));

            if page.is_truncated {
                token = page.next_continuation_token;
                assert!(token.is_some(), "truncated page carries a token");
            } else {
                break;
            }
        }

        // The union over pages equals the unpaginated set, with no
        // duplicates and in order.
        let union: BTreeSet<String> = collected.iter().cloned().collect();
        assert_eq!(union, expected);
        assert_eq!(collected.len(), expected.len());
    }

    #[tokio::test]
    async fn test_should_scope_listing_by_prefix() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "prefix").await;

        for key in [
            "logs/2024/jan",
            "logs/2024/feb",
            "logs/2025/jan",
            "data/other",
        ] {
            put_bytes(&store, &bucket, key, "x").await;
        }

        let page = store
            .list_objects(ListObjectsInput {
                bucket: bucket.clone(),
                prefix: Some("logs/2024/".to_owned()),
                ..ListObjectsInput::default()
            })
            .await
            .expect("list");
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/2024/feb", "logs/2024/jan"]);

        let page = store
            .list_objects(ListObjectsInput {
                bucket: bucket.clone(),
                prefix: Some("logs/".to_owned()),
                delimiter: Some("/".to_owned()),
                ..ListObjectsInput::default()
            })
            .await
            .expect("list");
        assert!(page.objects.is_empty());
        assert_eq!(page.common_prefixes, vec!["logs/2024/", "logs/2025/"]);
    }

    #[tokio::test]
    async fn test_should_exclude_sidecars_and_upload_state_from_listing() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "clean").await;
        put_bytes(&store, &bucket, "visible", "x").await;

        // Leave an in-progress upload and bucket config around.
        store
            .create_multipart_upload(
                &bucket,
                "pending",
                silo_core::types::ObjectMetadata::default(),
                silo_core::types::Owner::default(),
                silo_core::types::StorageClass::default(),
            )
            .await
            .expect("create upload");
        store
            .put_bucket_tags(&bucket, vec![("k".to_owned(), "v".to_owned())])
            .await
            .expect("put tags");

        let page = store
            .list_objects(ListObjectsInput::all(&bucket))
            .await
            .expect("list");
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["visible"]);
    }
}
