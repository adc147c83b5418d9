//! Shared utilities for the storage core.
//!
//! Provides ID generation, timestamp helpers, byte-range validation, and
//! the opaque cursor encoding used by audit-log pagination.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::StorageError;

// ---------------------------------------------------------------------------
// ID generation
// ---------------------------------------------------------------------------

/// Generate a random version ID for versioned objects and delete markers.
///
/// Produces the lowercase-hex form of 128 random bits (32 characters).
///
/// # Examples
///
/// ```
/// use silo_core::utils::generate_version_id;
///
/// let id = generate_version_id();
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_version_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 16];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// Generate a random upload ID for multipart uploads.
///
/// Produces a hex string of 64 characters.
///
/// # Examples
///
/// ```
/// use silo_core::utils::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert_eq!(id.len(), 64);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// Generate a unique request ID (UUID v4 without dashes).
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Format a timestamp as ISO-8601 UTC with millisecond resolution, the
/// format used by every persisted sidecar field.
///
/// # Examples
///
/// ```
/// use silo_core::utils::format_timestamp;
///
/// let ts = format_timestamp(chrono::Utc::now());
/// assert!(ts.ends_with('Z'));
/// ```
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Return the current time truncated to millisecond resolution.
///
/// Sidecar timestamps round-trip through their serialized form, so
/// sub-millisecond precision is dropped up front.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Event sequencer value: hex of the current epoch milliseconds, so later
/// events for a key compare greater.
#[must_use]
pub fn sequencer(ts: DateTime<Utc>) -> String {
    format!("{:016X}", ts.timestamp_millis().max(0))
}

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// An inclusive byte range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range; callers validate against an object size with
    /// [`ByteRange::resolve`].
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Validate this range against an object of `size` bytes.
    ///
    /// An `end` beyond the last byte is clamped to `size - 1`; a `start`
    /// past the end of the object or past `end` is unsatisfiable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRange`] if the range cannot be
    /// satisfied.
    ///
    /// # Examples
    ///
    /// ```
    /// use silo_core::utils::ByteRange;
    ///
    /// let resolved = ByteRange::new(2, 999).resolve(10).unwrap();
    /// assert_eq!((resolved.start, resolved.end), (2, 9));
    /// assert!(ByteRange::new(5, 2).resolve(10).is_err());
    /// ```
    pub fn resolve(self, size: u64) -> Result<Self, StorageError> {
        if size == 0 || self.start > self.end || self.start >= size {
            return Err(StorageError::InvalidRange);
        }
        Ok(Self {
            start: self.start,
            end: self.end.min(size - 1),
        })
    }

    /// Number of bytes covered by this (resolved) range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Opaque cursors
// ---------------------------------------------------------------------------

/// Encode an audit-log offset as an opaque base64 cursor.
#[must_use]
pub fn encode_cursor(offset: u64) -> String {
    BASE64_STANDARD.encode(offset.to_string())
}

/// Decode an opaque base64 cursor back to an offset.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if the cursor is not valid
/// base64 or does not decode to an integer.
pub fn decode_cursor(cursor: &str) -> Result<u64, StorageError> {
    let bytes = BASE64_STANDARD
        .decode(cursor)
        .map_err(|_| StorageError::InvalidArgument {
            message: "Invalid continuation token".to_owned(),
        })?;
    String::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::InvalidArgument {
            message: "Invalid continuation token".to_owned(),
        })
}
