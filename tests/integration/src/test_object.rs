//! Object CRUD integration tests.

#[cfg(test)]
mod tests {
    use silo_core::checksums::compute_etag;
    use silo_core::io::body_from_bytes;
    use silo_core::types::{ObjectIdentifier, Owner};
    use silo_core::utils::ByteRange;
    use silo_core::{CopyObjectInput, PutObjectInput, StorageError};

    use crate::{create_test_bucket, drain, get_bytes, put_bytes, test_store};

    #[tokio::test]
    async fn test_should_roundtrip_bytes_etag_and_size() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "roundtrip").await;

        let payload = b"the quick brown fox".to_vec();
        let put = store
            .put_object(PutObjectInput::new(
                &bucket,
                "fox.txt",
                body_from_bytes(payload.clone()),
            ))
            .await
            .expect("put object");

        assert_eq!(put.etag, compute_etag(&payload));
        assert_eq!(put.size, payload.len() as u64);

        let head = store
            .head_object(&bucket, "fox.txt", None)
            .await
            .expect("head object");
        assert_eq!(head.size, payload.len() as u64);
        assert_eq!(head.etag, put.etag);

        assert_eq!(get_bytes(&store, &bucket, "fox.txt").await, payload);
    }

    #[tokio::test]
    async fn test_should_return_exact_range_bytes() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "range").await;
        put_bytes(&store, &bucket, "digits", "0123456789").await;

        let got = store
            .get_object(&bucket, "digits", None, Some(ByteRange::new(2, 5)))
            .await
            .expect("range get");
        let body = drain(got.body).await;
        assert_eq!(body.as_ref(), b"2345");
        assert_eq!(body.len(), 4, "range [2,5] covers exactly 4 bytes");

        // A range reaching past the end clamps to the final byte.
        let got = store
            .get_object(&bucket, "digits", None, Some(ByteRange::new(8, 500)))
            .await
            .expect("clamped get");
        assert_eq!(drain(got.body).await.as_ref(), b"89");
    }

    #[tokio::test]
    async fn test_should_stream_large_objects_chunkwise() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "large").await;

        // Several multiples of the 64 KiB chunk size plus a ragged tail.
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        put_bytes(&store, &bucket, "big", data.clone()).await;

        let read = get_bytes(&store, &bucket, "big").await;
        assert_eq!(read.len(), data.len());
        assert_eq!(read.as_ref(), data.as_slice());

        let got = store
            .get_object(&bucket, "big", None, Some(ByteRange::new(65_000, 200_000)))
            .await
            .expect("range get");
        assert_eq!(drain(got.body).await.as_ref(), &data[65_000..=200_000]);
    }

    #[tokio::test]
    async fn test_should_copy_then_read_identical_content() {
        let store = test_store().await;
        let src_bucket = create_test_bucket(&store, "copy-src").await;
        let dst_bucket = create_test_bucket(&store, "copy-dst").await;
        put_bytes(&store, &src_bucket, "original", "copy me exactly").await;

        let src_head = store
            .head_object(&src_bucket, "original", None)
            .await
            .expect("head source");

        let copied = store
            .copy_object(CopyObjectInput {
                src_bucket: src_bucket.clone(),
                src_key: "original".to_owned(),
                src_version_id: None,
                dst_bucket: dst_bucket.clone(),
                dst_key: "duplicate".to_owned(),
                metadata: None,
                storage_class: None,
                owner: Owner::default(),
            })
            .await
            .expect("copy object");

        assert_eq!(copied.etag, src_head.etag, "ETag recomputed over identical bytes");
        assert!(copied.last_modified >= src_head.last_modified);
        assert_eq!(
            get_bytes(&store, &dst_bucket, "duplicate").await.as_ref(),
            b"copy me exactly"
        );
    }

    #[tokio::test]
    async fn test_should_report_mixed_outcomes_in_bulk_delete() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "bulk").await;
        put_bytes(&store, &bucket, "a", "1").await;
        put_bytes(&store, &bucket, "b", "2").await;

        let outcomes = store
            .delete_objects(
                &bucket,
                vec![
                    ObjectIdentifier {
                        key: "a".to_owned(),
                        version_id: None,
                    },
                    ObjectIdentifier {
                        key: "missing".to_owned(),
                        version_id: Some("00000000000000000000000000000000".to_owned()),
                    },
                    ObjectIdentifier {
                        key: "b".to_owned(),
                        version_id: None,
                    },
                ],
                false,
                &Owner::default(),
            )
            .await
            .expect("bulk delete");

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].error.is_none());
        assert_eq!(
            outcomes[1].error.as_ref().map(|e| e.code.as_str()),
            Some("NoSuchVersion")
        );
        assert!(outcomes[2].error.is_none());

        assert!(matches!(
            store.get_object(&bucket, "a", None, None).await,
            Err(StorageError::NoSuchKey { .. })
        ));
        assert!(matches!(
            store.get_object(&bucket, "b", None, None).await,
            Err(StorageError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_verify_integrity_end_to_end() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "verify").await;
        put_bytes(&store, &bucket, "sealed", "unchanging bytes").await;

        let report = store
            .verify_object_integrity(&bucket, "sealed", None)
            .await
            .expect("verify");
        assert!(report.is_valid);
        assert!(!report.bitrot_detected);
    }
}
