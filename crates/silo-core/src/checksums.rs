//! Checksum computation for stored objects.
//!
//! ETags are the unquoted lowercase-hex SHA-256 digest of the stored bytes;
//! multipart assembly appends a `-<part_count>` suffix to the digest of the
//! concatenated stream. The additional checksum algorithms (CRC32, CRC32C,
//! SHA-1, SHA-256) carry base64-encoded values in object metadata.
//!
//! # Streaming Hashing
//!
//! Bodies are never buffered whole; use [`StreamingHasher`] to feed chunks
//! incrementally and obtain the final [`HasherResult`].

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

// ---------------------------------------------------------------------------
// ChecksumAlgorithm
// ---------------------------------------------------------------------------

/// Supported additional checksum algorithms (the SHA-256 ETag is always
/// computed regardless).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE 802.3).
    #[serde(rename = "CRC32")]
    Crc32,
    /// CRC-32C (Castagnoli).
    #[serde(rename = "CRC32C")]
    Crc32c,
    /// SHA-1.
    #[serde(rename = "SHA1")]
    Sha1,
    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Return the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`ChecksumAlgorithm`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown checksum algorithm: {0}")]
pub struct ParseChecksumAlgorithmError(String);

impl FromStr for ChecksumAlgorithm {
    type Err = ParseChecksumAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            _ => Err(ParseChecksumAlgorithmError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Standalone digest functions
// ---------------------------------------------------------------------------

/// Compute the unquoted lowercase-hex SHA-256 digest of `data`.
///
/// This is the ETag format for single-part objects.
///
/// # Examples
///
/// ```
/// use silo_core::checksums::compute_etag;
///
/// let etag = compute_etag(b"");
/// assert_eq!(
///     etag,
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(data))
}

/// Format a multipart ETag from the digest of the assembled bytes.
///
/// The assembled object's ETag is `<hex digest>-<part_count>`; the suffix is
/// the wire-level indicator that the object was assembled from parts.
///
/// # Examples
///
/// ```
/// use silo_core::checksums::{compute_etag, multipart_etag};
///
/// let digest = compute_etag(b"ab");
/// let etag = multipart_etag(&digest, 2);
/// assert!(etag.ends_with("-2"));
/// ```
#[must_use]
pub fn multipart_etag(assembled_hex: &str, part_count: usize) -> String {
    format!("{assembled_hex}-{part_count}")
}

/// Whether an ETag carries the multipart `-<N>` suffix.
#[must_use]
pub fn is_multipart_etag(etag: &str) -> bool {
    etag.rsplit_once('-')
        .is_some_and(|(_, n)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Compute a base64-encoded checksum for the given algorithm.
///
/// # Examples
///
/// ```
/// use silo_core::checksums::{ChecksumAlgorithm, compute_checksum};
///
/// let b64 = compute_checksum(ChecksumAlgorithm::Crc32, b"hello");
/// assert!(!b64.is_empty());
/// ```
#[must_use]
pub fn compute_checksum(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data);
            BASE64_STANDARD.encode(hasher.finalize().to_be_bytes())
        }
        ChecksumAlgorithm::Crc32c => {
            BASE64_STANDARD.encode(crc32c::crc32c(data).to_be_bytes())
        }
        ChecksumAlgorithm::Sha1 => BASE64_STANDARD.encode(sha1::Sha1::digest(data)),
        ChecksumAlgorithm::Sha256 => BASE64_STANDARD.encode(sha2::Sha256::digest(data)),
    }
}

/// Compute the hex-encoded MD5 digest of `data`.
///
/// Kept for interoperability checks (e.g. `Content-MD5` validation by a
/// request front-end); ETags never use MD5.
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

// ---------------------------------------------------------------------------
// StreamingHasher
// ---------------------------------------------------------------------------

/// Result produced by [`StreamingHasher::finish`].
#[derive(Debug, Clone)]
pub struct HasherResult {
    /// Unquoted lowercase-hex SHA-256 digest (the ETag of the bytes).
    pub sha256_hex: String,
    /// The base64-encoded checksum for the requested algorithm, if any.
    pub checksum: Option<String>,
}

/// Incremental hasher computing SHA-256 and optionally one additional
/// checksum over a stream of chunks.
///
/// # Examples
///
/// ```
/// use silo_core::checksums::{StreamingHasher, compute_etag};
///
/// let mut hasher = StreamingHasher::new(None);
/// hasher.update(b"hello ");
/// hasher.update(b"world");
/// let result = hasher.finish();
/// assert_eq!(result.sha256_hex, compute_etag(b"hello world"));
/// assert!(result.checksum.is_none());
/// ```
#[derive(Debug)]
pub struct StreamingHasher {
    sha256: sha2::Sha256,
    extra: Option<ExtraHasher>,
}

/// State for the optional additional checksum.
#[derive(Debug)]
enum ExtraHasher {
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl StreamingHasher {
    /// Create a new streaming hasher.
    ///
    /// SHA-256 is always computed. Pass an algorithm to compute one
    /// additional checksum alongside it.
    #[must_use]
    pub fn new(algorithm: Option<ChecksumAlgorithm>) -> Self {
        let extra = algorithm.map(|algo| match algo {
            ChecksumAlgorithm::Crc32 => ExtraHasher::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => ExtraHasher::Crc32c(0),
            ChecksumAlgorithm::Sha1 => ExtraHasher::Sha1(<sha1::Sha1 as Digest>::new()),
            ChecksumAlgorithm::Sha256 => ExtraHasher::Sha256(<sha2::Sha256 as Digest>::new()),
        });

        Self {
            sha256: <sha2::Sha256 as Digest>::new(),
            extra,
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.sha256, data);

        match &mut self.extra {
            Some(ExtraHasher::Crc32(h)) => h.update(data),
            Some(ExtraHasher::Crc32c(val)) => *val = crc32c::crc32c_append(*val, data),
            Some(ExtraHasher::Sha1(h)) => Digest::update(h, data),
            Some(ExtraHasher::Sha256(h)) => Digest::update(h, data),
            None => {}
        }
    }

    /// Finalize the hasher and return the results.
    ///
    /// This consumes the hasher.
    #[must_use]
    pub fn finish(self) -> HasherResult {
        let sha256_hex = hex::encode(Digest::finalize(self.sha256));

        let checksum = self.extra.map(|extra| match extra {
            ExtraHasher::Crc32(h) => BASE64_STANDARD.encode(h.finalize().to_be_bytes()),
            ExtraHasher::Crc32c(val) => BASE64_STANDARD.encode(val.to_be_bytes()),
            ExtraHasher::Sha1(h) => BASE64_STANDARD.encode(Digest::finalize(h)),
            ExtraHasher::Sha256(h) => BASE64_STANDARD.encode(Digest::finalize(h)),
        });

        HasherResult {
            sha256_hex,
            checksum,
        }
    }
}
