//! Storage configuration.
//!
//! Provides [`StorageConfig`] for configuring a [`crate::SiloStore`].
//! Configuration values can be loaded from environment variables via
//! [`StorageConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Hard upper bound on `max_keys` for any listing request.
pub const MAX_KEYS_CEILING: usize = 1000;

/// Default age after which an incomplete multipart upload is swept: 7 days.
const DEFAULT_ORPHAN_UPLOAD_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Default streaming chunk size: 64 KiB.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Storage core configuration.
///
/// Only `root_path` is required; every other field has a default matching
/// the documented contract.
///
/// # Examples
///
/// ```
/// use silo_core::config::StorageConfig;
///
/// let config = StorageConfig::builder().root_path("/tmp/silo".into()).build();
/// assert_eq!(config.chunk_size, 64 * 1024);
/// assert_eq!(config.default_max_keys, 1000);
/// assert!(!config.test_mode);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Directory holding all persisted state (bucket directories plus the
    /// `.silo` bookkeeping directory).
    pub root_path: PathBuf,

    /// When true, all network sink emission is suppressed.
    #[builder(default = false)]
    #[serde(default)]
    pub test_mode: bool,

    /// Cutoff age for the orphaned-upload sweeper.
    #[builder(default = Duration::from_secs(DEFAULT_ORPHAN_UPLOAD_AGE_SECS))]
    #[serde(with = "duration_secs", default = "default_orphan_age")]
    pub orphan_upload_age: Duration,

    /// Default `max_keys` for listing requests (capped at
    /// [`MAX_KEYS_CEILING`]).
    #[builder(default = MAX_KEYS_CEILING)]
    #[serde(default = "default_max_keys")]
    pub default_max_keys: usize,

    /// Chunk size for streaming reads and writes.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_orphan_age() -> Duration {
    Duration::from_secs(DEFAULT_ORPHAN_UPLOAD_AGE_SECS)
}

fn default_max_keys() -> usize {
    MAX_KEYS_CEILING
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Serialize `orphan_upload_age` as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl StorageConfig {
    /// Create a configuration with defaults for the given root path.
    #[must_use]
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self::builder().root_path(root_path.into()).build()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SILO_ROOT_PATH` | `./silo-data` |
    /// | `SILO_TEST_MODE` | `false` |
    /// | `SILO_ORPHAN_UPLOAD_AGE_SECS` | `604800` (7 days) |
    /// | `SILO_DEFAULT_MAX_KEYS` | `1000` |
    /// | `SILO_CHUNK_SIZE` | `65536` |
    #[must_use]
    pub fn from_env() -> Self {
        let root = std::env::var("SILO_ROOT_PATH").unwrap_or_else(|_| "./silo-data".to_owned());
        let mut config = Self::new(root);

        if let Ok(v) = std::env::var("SILO_TEST_MODE") {
            config.test_mode = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SILO_ORPHAN_UPLOAD_AGE_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.orphan_upload_age = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("SILO_DEFAULT_MAX_KEYS") {
            if let Ok(n) = v.parse::<usize>() {
                config.default_max_keys = n;
            }
        }
        if let Ok(v) = std::env::var("SILO_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                config.chunk_size = n;
            }
        }

        config.clamp();
        config
    }

    /// Clamp tunables to their documented bounds.
    ///
    /// `default_max_keys` is capped at [`MAX_KEYS_CEILING`]; a zero
    /// `chunk_size` is replaced with the default.
    pub fn clamp(&mut self) {
        if self.default_max_keys == 0 || self.default_max_keys > MAX_KEYS_CEILING {
            self.default_max_keys = MAX_KEYS_CEILING;
        }
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
    }

    /// Resolve a listing request's `max_keys` against the configured
    /// default and the hard ceiling.
    #[must_use]
    pub fn effective_max_keys(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_max_keys)
            .min(MAX_KEYS_CEILING)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
