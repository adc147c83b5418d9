//! Integration tests for the Silo storage core.
//!
//! These tests drive the public [`SiloStore`] façade end-to-end against
//! disposable temp-dir roots, so they run as part of a normal
//! `cargo test`.

use std::sync::Once;

use silo_core::io::{BodyStream, body_from_bytes, collect_body};
use silo_core::types::Owner;
use silo_core::{PutObjectInput, SiloStore, StorageConfig};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A store rooted in a temp directory that lives as long as the handle.
pub struct TestStore {
    /// The store under test.
    pub store: SiloStore,
    /// Keeps the root directory alive for the duration of the test.
    pub root: tempfile::TempDir,
}

impl std::fmt::Debug for TestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("root", &self.root.path())
            .finish_non_exhaustive()
    }
}

impl std::ops::Deref for TestStore {
    type Target = SiloStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Open a store over a fresh temp root (network sinks suppressed).
pub async fn test_store() -> TestStore {
    init_tracing();

    let root = tempfile::tempdir().expect("create temp root");
    let config = StorageConfig::builder()
        .root_path(root.path().into())
        .test_mode(true)
        .build();
    let store = SiloStore::open(config).await.expect("open store");
    TestStore { store, root }
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket with the default owner and return its name.
pub async fn create_test_bucket(store: &SiloStore, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    store
        .create_bucket(&name, Owner::default())
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Put an object from an in-memory buffer.
pub async fn put_bytes(store: &SiloStore, bucket: &str, key: &str, data: impl Into<bytes::Bytes>) {
    store
        .put_object(PutObjectInput::new(bucket, key, body_from_bytes(data.into())))
        .await
        .unwrap_or_else(|e| panic!("failed to put {bucket}/{key}: {e}"));
}

/// Get an object's full body as a buffer.
pub async fn get_bytes(store: &SiloStore, bucket: &str, key: &str) -> bytes::Bytes {
    let got = store
        .get_object(bucket, key, None, None)
        .await
        .unwrap_or_else(|e| panic!("failed to get {bucket}/{key}: {e}"));
    drain(got.body).await
}

/// Collect a body stream.
pub async fn drain(body: BodyStream) -> bytes::Bytes {
    collect_body(body).await.expect("collect body")
}

mod test_bucket;
mod test_config;
mod test_ledger;
mod test_list;
mod test_multipart;
mod test_object;
mod test_versioning;
