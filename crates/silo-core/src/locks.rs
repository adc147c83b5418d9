//! Per-bucket and per-key serialization primitives.
//!
//! The façade takes a shared bucket-config lock plus an exclusive per-key
//! lock for every mutating object operation, so writers to one key never
//! block operations on unrelated resources. Configuration changes take the
//! bucket lock exclusively. Guards are `tokio` locks because they are held
//! across I/O suspension points.
//!
//! Readers do not lock: sidecar documents are replaced atomically, so a
//! concurrent reader observes either the pre-write or post-write metadata.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Lock tables shared by all operations of one store.
#[derive(Debug, Default)]
pub struct LockTable {
    /// Per-bucket configuration locks.
    buckets: DashMap<String, Arc<RwLock<()>>>,
    /// Per-(bucket, key) writer-exclusion locks.
    keys: DashMap<(String, String), Arc<Mutex<()>>>,
}

/// Guard pair held by a mutating object operation: shared bucket access
/// plus exclusive key access.
#[derive(Debug)]
pub struct WriteGuard {
    _bucket: OwnedRwLockReadGuard<()>,
    _key: OwnedMutexGuard<()>,
}

impl LockTable {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guards for a mutating operation on `(bucket, key)`.
    ///
    /// At most one such guard exists per key at any instant; holders of the
    /// exclusive bucket-config lock are excluded for the duration.
    pub async fn lock_key(&self, bucket: &str, key: &str) -> WriteGuard {
        let bucket_lock = self.bucket_lock(bucket);
        let key_lock = self
            .keys
            .entry((bucket.to_owned(), key.to_owned()))
            .or_default()
            .clone();

        let bucket_guard = bucket_lock.read_owned().await;
        let key_guard = key_lock.lock_owned().await;
        WriteGuard {
            _bucket: bucket_guard,
            _key: key_guard,
        }
    }

    /// Acquire the exclusive bucket-config lock.
    ///
    /// Excludes every object operation on the bucket for the duration.
    pub async fn lock_bucket_config(&self, bucket: &str) -> OwnedRwLockWriteGuard<()> {
        self.bucket_lock(bucket).write_owned().await
    }

    /// Acquire the shared bucket lock without key exclusion (bucket-scoped
    /// mutations that touch no single key, e.g. multipart bookkeeping).
    pub async fn lock_bucket_shared(&self, bucket: &str) -> OwnedRwLockReadGuard<()> {
        self.bucket_lock(bucket).read_owned().await
    }

    /// Drop lock entries for a deleted bucket.
    pub fn forget_bucket(&self, bucket: &str) {
        self.buckets.remove(bucket);
        self.keys.retain(|(b, _), _| b != bucket);
    }

    fn bucket_lock(&self, bucket: &str) -> Arc<RwLock<()>> {
        self.buckets.entry(bucket.to_owned()).or_default().clone()
    }
}
