//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use silo_core::checksums::compute_etag;
    use silo_core::io::body_from_bytes;
    use silo_core::types::{ObjectMetadata, Owner, StorageClass};
    use silo_core::{CompletedPart, SiloStore, StorageError};

    use crate::{create_test_bucket, drain, test_store};

    async fn start_upload(store: &SiloStore, bucket: &str, key: &str) -> String {
        store
            .create_multipart_upload(
                bucket,
                key,
                ObjectMetadata::default(),
                Owner::default(),
                StorageClass::default(),
            )
            .await
            .expect("create upload")
    }

    #[tokio::test]
    async fn test_should_assemble_multi_mebibyte_upload() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "mp").await;
        let upload_id = start_upload(&store, &bucket, "blob").await;

        let part1 = vec![b'a'; 5 * 1024 * 1024];
        let part2 = vec![b'b'; 1024 * 1024];

        let etag1 = store
            .upload_part(&bucket, &upload_id, 1, body_from_bytes(part1.clone()))
            .await
            .expect("upload part 1");
        let etag2 = store
            .upload_part(&bucket, &upload_id, 2, body_from_bytes(part2.clone()))
            .await
            .expect("upload part 2");

        let done = store
            .complete_multipart_upload(
                &bucket,
                "blob",
                &upload_id,
                &[
                    CompletedPart {
                        part_number: 1,
                        etag: etag1,
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: etag2,
                    },
                ],
            )
            .await
            .expect("complete upload");

        assert_eq!(done.size, (part1.len() + part2.len()) as u64);
        assert!(done.etag.ends_with("-2"), "multipart ETag suffix: {}", done.etag);

        // The upload directory is removed on completion.
        assert!(!store
            .root
            .path()
            .join(format!("{bucket}/.uploads/{upload_id}"))
            .exists());

        // 6 MiB of a's followed by b's.
        let got = store
            .get_object(&bucket, "blob", None, None)
            .await
            .expect("get assembled");
        let body = drain(got.body).await;
        assert_eq!(body.len(), part1.len() + part2.len());
        assert!(body[..part1.len()].iter().all(|&b| b == b'a'));
        assert!(body[part1.len()..].iter().all(|&b| b == b'b'));

        // The composite ETag is the rolling hash of the assembled bytes.
        let mut assembled = part1;
        assembled.extend_from_slice(&part2);
        assert_eq!(done.etag, format!("{}-2", compute_etag(&assembled)));
    }

    #[tokio::test]
    async fn test_should_abort_idempotently_and_reject_further_parts() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "abort").await;
        let upload_id = start_upload(&store, &bucket, "gone").await;

        store
            .upload_part(&bucket, &upload_id, 1, body_from_bytes("data"))
            .await
            .expect("upload part");

        store
            .abort_multipart_upload(&bucket, &upload_id)
            .await
            .expect("first abort");
        // Aborting twice yields the same post-state.
        store
            .abort_multipart_upload(&bucket, &upload_id)
            .await
            .expect("second abort");

        assert!(matches!(
            store
                .upload_part(&bucket, &upload_id, 2, body_from_bytes("more"))
                .await,
            Err(StorageError::NoSuchUpload { .. })
        ));
        assert!(!store
            .root
            .path()
            .join(format!("{bucket}/.uploads/{upload_id}"))
            .exists());
    }

    #[tokio::test]
    async fn test_should_leave_upload_open_after_failed_completion() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "retry").await;
        let upload_id = start_upload(&store, &bucket, "staged").await;

        let etag = store
            .upload_part(&bucket, &upload_id, 1, body_from_bytes("payload"))
            .await
            .expect("upload part");

        // Reference a part that does not exist.
        let result = store
            .complete_multipart_upload(
                &bucket,
                "staged",
                &upload_id,
                &[
                    CompletedPart {
                        part_number: 1,
                        etag: etag.clone(),
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: "bogus".to_owned(),
                    },
                ],
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvalidPart { .. })));

        // No object became visible and the client may retry.
        assert!(matches!(
            store.get_object(&bucket, "staged", None, None).await,
            Err(StorageError::NoSuchKey { .. })
        ));
        let done = store
            .complete_multipart_upload(
                &bucket,
                "staged",
                &upload_id,
                &[CompletedPart {
                    part_number: 1,
                    etag,
                }],
            )
            .await
            .expect("retried completion");
        assert!(done.etag.ends_with("-1"));
    }

    #[tokio::test]
    async fn test_should_list_open_uploads_until_terminated() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "inventory").await;

        let keep = start_upload(&store, &bucket, "keep").await;
        let drop_id = start_upload(&store, &bucket, "drop").await;

        let uploads = store
            .list_multipart_uploads(&bucket, None, None)
            .await
            .expect("list uploads");
        assert_eq!(uploads.len(), 2);

        store
            .abort_multipart_upload(&bucket, &drop_id)
            .await
            .expect("abort");

        let uploads = store
            .list_multipart_uploads(&bucket, None, None)
            .await
            .expect("list uploads");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].upload_id, keep);
        assert_eq!(uploads[0].key, "keep");
    }

    #[tokio::test]
    async fn test_should_create_new_version_from_completion() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "mp-ver").await;
        store
            .put_bucket_versioning(
                &bucket,
                silo_core::configs::VersioningConfig {
                    status: silo_core::configs::VersioningStatus::Enabled,
                    mfa_delete: None,
                },
            )
            .await
            .expect("enable versioning");

        let upload_id = start_upload(&store, &bucket, "versioned").await;
        let etag = store
            .upload_part(&bucket, &upload_id, 1, body_from_bytes("v-body"))
            .await
            .expect("upload part");

        let done = store
            .complete_multipart_upload(
                &bucket,
                "versioned",
                &upload_id,
                &[CompletedPart {
                    part_number: 1,
                    etag,
                }],
            )
            .await
            .expect("complete");
        assert!(done.version_id.is_some(), "versioned completion mints an id");

        let head = store
            .head_object(&bucket, "versioned", None)
            .await
            .expect("head");
        assert_eq!(head.parts_count, Some(1));
    }
}
