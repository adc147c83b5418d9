//! Bucket and object configuration integration tests.

#[cfg(test)]
mod tests {
    use silo_core::configs::{
        NotificationConfiguration, NotificationRule, SinkKind, VpcConfiguration,
    };
    use silo_core::events::EventType;
    use silo_core::types::{LegalHoldStatus, LockMode, Owner, Retention, StorageClass};
    use silo_core::StorageError;

    use crate::{create_test_bucket, put_bytes, test_store};

    #[tokio::test]
    async fn test_should_treat_policy_delete_as_idempotent() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "policy").await;

        // No policy yet: get fails, delete succeeds as a no-op.
        assert!(matches!(
            store.get_bucket_policy(&bucket).await,
            Err(StorageError::NoSuchBucketPolicy)
        ));
        store
            .delete_bucket_policy(&bucket)
            .await
            .expect("idempotent delete");

        store
            .put_bucket_policy(&bucket, r#"{"Version":"2012-10-17","Statement":[]}"#)
            .await
            .expect("put policy");
        assert!(store.get_bucket_policy(&bucket).await.is_ok());

        store.delete_bucket_policy(&bucket).await.expect("delete");
        assert!(matches!(
            store.get_bucket_policy(&bucket).await,
            Err(StorageError::NoSuchBucketPolicy)
        ));
    }

    #[tokio::test]
    async fn test_should_queue_event_for_matching_notification_rule() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "notify").await;

        store
            .put_bucket_notifications(
                &bucket,
                NotificationConfiguration {
                    rules: vec![NotificationRule {
                        id: "created".to_owned(),
                        events: vec![EventType::ObjectCreatedAll],
                        prefix: "inbox/".to_owned(),
                        suffix: String::new(),
                        sink: SinkKind::Queue {
                            arn: "arn:aws:sqs:::ingest".to_owned(),
                        },
                    }],
                },
            )
            .await
            .expect("put notifications");

        // A put under the watched prefix flows through the dispatcher
        // without blocking; the queue drains on the worker task.
        put_bytes(&store, &bucket, "inbox/mail-1", "hello").await;
        for _ in 0..100 {
            if store.events().pending() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(store.events().pending(), 0);

        // Manual publication works for externally-triggered events.
        store
            .publish_event(
                &bucket,
                EventType::ObjectRestoreCompleted,
                Some("inbox/mail-1"),
                Some("restore-agent"),
                None,
            )
            .await
            .expect("publish event");
    }

    #[tokio::test]
    async fn test_should_enforce_retention_through_facade() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "retain").await;
        put_bytes(&store, &bucket, "contract", "binding").await;

        store
            .put_object_retention(
                &bucket,
                "contract",
                None,
                Retention {
                    mode: LockMode::Governance,
                    retain_until: chrono::Utc::now() + chrono::Duration::days(1),
                },
                false,
            )
            .await
            .expect("set retention");

        // Plain delete of the locked version fails; bypass succeeds.
        assert!(matches!(
            store
                .delete_object(&bucket, "contract", Some("null"), false, &Owner::default())
                .await,
            Err(StorageError::AccessDenied)
        ));
        store
            .delete_object(&bucket, "contract", Some("null"), true, &Owner::default())
            .await
            .expect("bypass delete");
    }

    #[tokio::test]
    async fn test_should_toggle_legal_hold_through_facade() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "hold").await;
        put_bytes(&store, &bucket, "evidence", "keep").await;

        store
            .put_object_legal_hold(&bucket, "evidence", None, LegalHoldStatus::On)
            .await
            .expect("set hold");
        assert!(matches!(
            store
                .delete_object(&bucket, "evidence", Some("null"), true, &Owner::default())
                .await,
            Err(StorageError::AccessDenied)
        ));

        store
            .put_object_legal_hold(&bucket, "evidence", None, LegalHoldStatus::Off)
            .await
            .expect("release hold");
        store
            .delete_object(&bucket, "evidence", Some("null"), false, &Owner::default())
            .await
            .expect("delete after release");
    }

    #[tokio::test]
    async fn test_should_persist_vpc_and_storage_class_settings() {
        let store = test_store().await;
        let bucket = create_test_bucket(&store, "misc").await;
        put_bytes(&store, &bucket, "archive-me", "cold data").await;

        store
            .put_bucket_vpc(
                &bucket,
                VpcConfiguration {
                    allowed_cidrs: vec!["10.1.0.0/16".to_owned()],
                },
            )
            .await
            .expect("put vpc");
        assert!(store.get_bucket_vpc(&bucket).await.expect("get vpc").is_some());

        store
            .set_storage_class(&bucket, "archive-me", None, StorageClass::DeepArchive)
            .await
            .expect("set class");
        assert_eq!(
            store
                .head_object(&bucket, "archive-me", None)
                .await
                .expect("head")
                .storage_class,
            StorageClass::DeepArchive
        );
    }
}
