//! Audit-log and batch-job integration tests.

#[cfg(test)]
mod tests {
    use silo_core::meta::audit::{AuditEvent, AuditQuery};
    use silo_core::meta::batch::{JobProgress, JobStatus};

    use crate::test_store;

    #[tokio::test]
    async fn test_should_filter_and_paginate_audit_trail() {
        let store = test_store().await;

        for i in 0..8 {
            let principal = if i % 2 == 0 { "alice" } else { "bob" };
            store
                .append_audit_event(
                    &AuditEvent::new("PutObject", principal)
                        .with_bucket("photos")
                        .with_key(format!("img-{i}")),
                )
                .await
                .expect("append");
        }

        let page = store
            .query_audit_events(&AuditQuery {
                principal: Some("alice".to_owned()),
                max_results: Some(3),
                ..AuditQuery::default()
            })
            .await
            .expect("query");
        assert_eq!(page.events.len(), 3);
        assert!(page.is_truncated);

        let rest = store
            .query_audit_events(&AuditQuery {
                principal: Some("alice".to_owned()),
                continuation_token: page.next_continuation_token,
                ..AuditQuery::default()
            })
            .await
            .expect("query rest");
        assert_eq!(rest.events.len(), 1);
        assert!(!rest.is_truncated);
        assert!(
            page.events
                .iter()
                .chain(rest.events.iter())
                .all(|e| e.principal == "alice")
        );
    }

    #[tokio::test]
    async fn test_should_purge_expired_audit_events() {
        let store = test_store().await;

        let mut stale = AuditEvent::new("DeleteObject", "janitor");
        stale.time = chrono::Utc::now() - chrono::Duration::days(90);
        store.append_audit_event(&stale).await.expect("append stale");
        store
            .append_audit_event(&AuditEvent::new("PutObject", "alice"))
            .await
            .expect("append fresh");

        let removed = store
            .purge_audit_events(chrono::Utc::now() - chrono::Duration::days(30))
            .await
            .expect("purge");
        assert_eq!(removed, 1);

        let page = store
            .query_audit_events(&AuditQuery::default())
            .await
            .expect("query");
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].principal, "alice");
    }

    #[tokio::test]
    async fn test_should_drive_batch_job_to_completion() {
        let store = test_store().await;

        let job = store
            .create_batch_job("S3PutObjectCopy", "manifests/copy.csv", 5)
            .await
            .expect("create job");
        assert_eq!(job.status, JobStatus::Pending);

        for status in [JobStatus::Preparing, JobStatus::Ready, JobStatus::Active] {
            store
                .update_batch_job_status(&job.id, status, None)
                .await
                .unwrap_or_else(|e| panic!("transition to {status} failed: {e}"));
        }

        store
            .update_batch_job_progress(
                &job.id,
                JobProgress {
                    total: 10,
                    processed: 10,
                    failed: 0,
                },
            )
            .await
            .expect("progress");

        let done = store
            .update_batch_job_status(&job.id, JobStatus::Complete, None)
            .await
            .expect("complete");
        assert_eq!(done.status, JobStatus::Complete);
        assert_eq!(done.progress.processed, 10);

        store.delete_batch_job(&job.id).await.expect("delete job");
        assert!(store.get_batch_job(&job.id).await.is_err());
    }

    #[tokio::test]
    async fn test_should_reject_illegal_job_shortcut() {
        let store = test_store().await;
        let job = store
            .create_batch_job("S3DeleteObjectTagging", "m.csv", 0)
            .await
            .expect("create job");

        // Pending jobs cannot jump straight to Active or Complete.
        assert!(store
            .update_batch_job_status(&job.id, JobStatus::Active, None)
            .await
            .is_err());
        assert!(store
            .update_batch_job_status(&job.id, JobStatus::Complete, None)
            .await
            .is_err());

        let unchanged = store.get_batch_job(&job.id).await.expect("get job");
        assert_eq!(unchanged.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_should_pause_resume_and_cancel_jobs() {
        let store = test_store().await;
        let job = store
            .create_batch_job("S3ReplicateObject", "m.csv", 1)
            .await
            .expect("create job");

        for status in [
            JobStatus::Preparing,
            JobStatus::Ready,
            JobStatus::Active,
            JobStatus::Paused,
            JobStatus::Active,
            JobStatus::Cancelling,
        ] {
            store
                .update_batch_job_status(&job.id, status, None)
                .await
                .unwrap_or_else(|e| panic!("transition to {status} failed: {e}"));
        }

        let cancelled = store
            .update_batch_job_status(
                &job.id,
                JobStatus::Cancelled,
                Some("operator requested cancellation".to_owned()),
            )
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.failure_reasons.len(), 1);
    }
}
