//! Validation for storage requests.
//!
//! Provides validation functions for bucket names, object keys (including
//! the reserved sidecar namespace), tags, user-defined metadata, and
//! server-side-encryption descriptors.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::net::Ipv4Addr;

use crate::error::StorageError;
use crate::types::SseDescriptor;

/// Maximum number of tags allowed on a single object or bucket.
const MAX_TAGS: usize = 10;

/// Maximum length of a tag key in characters.
const MAX_TAG_KEY_LEN: usize = 128;

/// Maximum length of a tag value in characters.
const MAX_TAG_VALUE_LEN: usize = 256;

/// Maximum total size (in bytes) of all user-defined metadata keys and values.
const MAX_METADATA_SIZE: usize = 2048;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Bucket-level file names that an object key's first path segment may
/// never claim (dot-prefixed names are rejected wholesale).
const RESERVED_TOP_LEVEL: &[&str] = &["versioning.json", "policy.json"];

/// Sidecar suffixes that no key segment may carry.
const RESERVED_SUFFIXES: &[&str] = &[".metadata", ".acl"];

/// Validate a bucket name.
///
/// Rules (DNS-safe, per the S3 naming contract):
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and dots
/// - Must start and end with a letter or number
/// - No consecutive dots (`..`)
/// - Not formatted as an IPv4 address (e.g. `192.168.0.1`)
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if any rule is violated.
///
/// # Examples
///
/// ```
/// use silo_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    let invalid = |reason: String| StorageError::InvalidArgument {
        message: format!("Invalid bucket name {name:?}: {reason}"),
    };

    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(invalid(format!(
            "bucket name must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid(
            "bucket name must only contain lowercase letters, numbers, hyphens, and dots"
                .to_owned(),
        ));
    }

    let first = name.as_bytes()[0];
    let last = name.as_bytes()[len - 1];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit())
        || !(last.is_ascii_lowercase() || last.is_ascii_digit())
    {
        return Err(invalid(
            "bucket name must start and end with a letter or number".to_owned(),
        ));
    }

    if name.contains("..") {
        return Err(invalid(
            "bucket name must not contain consecutive dots".to_owned(),
        ));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid(
            "bucket name must not be formatted as an IP address".to_owned(),
        ));
    }

    Ok(())
}

/// Validate an object key.
///
/// Rules:
/// - 1-1024 bytes, valid UTF-8 (enforced by `&str`)
/// - No empty path segments (no leading, trailing, or doubled `/`)
/// - No `.` or `..` segments
/// - Must not collide with the reserved sidecar namespace: no dot-prefixed
///   first segment, no `versioning.json` / `policy.json` first segment, and
///   no segment ending in `.metadata` or `.acl`
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] for structural violations and
/// [`StorageError::InvalidKey`] for reserved-name collisions.
///
/// # Examples
///
/// ```
/// use silo_core::validation::validate_object_key;
///
/// assert!(validate_object_key("photos/2024/image.jpg").is_ok());
/// assert!(validate_object_key(".uploads/x").is_err());
/// assert!(validate_object_key("notes.metadata").is_err());
/// ```
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument {
            message: "Object key must not be empty".to_owned(),
        });
    }

    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::InvalidArgument {
            message: format!("Object key must not exceed {MAX_KEY_BYTES} bytes"),
        });
    }

    let reserved = || StorageError::InvalidKey {
        key: key.to_owned(),
    };

    for (idx, segment) in key.split('/').enumerate() {
        if segment.is_empty() {
            return Err(StorageError::InvalidArgument {
                message: "Object key must not contain empty path segments".to_owned(),
            });
        }
        if segment == "." || segment == ".." {
            return Err(StorageError::InvalidArgument {
                message: "Object key must not contain '.' or '..' segments".to_owned(),
            });
        }
        if idx == 0 && (segment.starts_with('.') || RESERVED_TOP_LEVEL.contains(&segment)) {
            return Err(reserved());
        }
        if RESERVED_SUFFIXES.iter().any(|s| segment.ends_with(s)) {
            return Err(reserved());
        }
    }

    Ok(())
}

/// Whether a version ID has the shape this store ever mints: the `"null"`
/// sentinel or 32 lowercase hex characters.
///
/// IDs arrive from clients and participate in path resolution, so anything
/// else is rejected before it can address the file system.
#[must_use]
pub fn is_well_formed_version_id(version_id: &str) -> bool {
    version_id == crate::types::NULL_VERSION_ID
        || (version_id.len() == 32
            && version_id
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
}

/// Whether an upload ID has the shape this store ever mints: 64 lowercase
/// hex characters.
#[must_use]
pub fn is_well_formed_upload_id(upload_id: &str) -> bool {
    upload_id.len() == 64
        && upload_id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validate a tag key.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if the key is empty or exceeds
/// 128 characters.
pub fn validate_tag_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument {
            message: "Tag key must not be empty".to_owned(),
        });
    }
    if key.chars().count() > MAX_TAG_KEY_LEN {
        return Err(StorageError::InvalidArgument {
            message: format!("Tag key must not exceed {MAX_TAG_KEY_LEN} characters"),
        });
    }
    Ok(())
}

/// Validate a tag value (empty values are allowed).
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if the value exceeds 256
/// characters.
pub fn validate_tag_value(value: &str) -> Result<(), StorageError> {
    if value.chars().count() > MAX_TAG_VALUE_LEN {
        return Err(StorageError::InvalidArgument {
            message: format!("Tag value must not exceed {MAX_TAG_VALUE_LEN} characters"),
        });
    }
    Ok(())
}

/// Validate a set of tags: at most 10, each key 1-128 characters, each
/// value 0-256 characters.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if any rule is violated.
pub fn validate_tags(tags: &[(String, String)]) -> Result<(), StorageError> {
    if tags.len() > MAX_TAGS {
        return Err(StorageError::InvalidArgument {
            message: format!("Object tags cannot be greater than {MAX_TAGS}, got {}", tags.len()),
        });
    }

    for (key, value) in tags {
        validate_tag_key(key)?;
        validate_tag_value(value)?;
    }

    Ok(())
}

/// Validate user-defined metadata: total size of keys plus values must not
/// exceed 2 KiB (advisory limit enforced here).
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] if the total size exceeds the
/// limit.
pub fn validate_metadata<S: BuildHasher>(
    metadata: &HashMap<String, String, S>,
) -> Result<(), StorageError> {
    let total_size: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

    if total_size > MAX_METADATA_SIZE {
        return Err(StorageError::InvalidArgument {
            message: format!(
                "User-defined metadata must not exceed {MAX_METADATA_SIZE} bytes, got {total_size}"
            ),
        });
    }

    Ok(())
}

/// Validate a server-side-encryption descriptor.
///
/// Only the algorithm names `AES256`, `aws:kms`, and `aws:kms:dsse` are
/// recognized; KMS algorithms require a key ID.
///
/// # Errors
///
/// Returns [`StorageError::InvalidEncryption`] for unknown algorithms or a
/// missing KMS key.
pub fn validate_sse(sse: &SseDescriptor) -> Result<(), StorageError> {
    match sse.algorithm.as_str() {
        "AES256" => Ok(()),
        "aws:kms" | "aws:kms:dsse" => {
            if sse.kms_key_id.as_deref().is_none_or(str::is_empty) {
                return Err(StorageError::InvalidEncryption {
                    message: format!("{} requires a KMS key id", sse.algorithm),
                });
            }
            Ok(())
        }
        other => Err(StorageError::InvalidEncryption {
            message: format!("unknown encryption algorithm: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Bucket name validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_accept_valid_bucket_names() {
        let long_name = "a".repeat(63);
        let valid = [
            "my-bucket",
            "abc",
            "bucket.with.dots",
            "123bucket",
            long_name.as_str(),
        ];
        for name in valid {
            assert!(validate_bucket_name(name).is_ok(), "expected valid: {name}");
        }
    }

    #[test]
    fn test_should_reject_short_or_long_bucket_names() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_should_reject_uppercase_bucket_name() {
        assert!(validate_bucket_name("MyBucket").is_err());
    }

    #[test]
    fn test_should_reject_bucket_name_edges() {
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
        assert!(validate_bucket_name(".bucket").is_err());
    }

    #[test]
    fn test_should_reject_consecutive_dots_in_bucket_name() {
        assert!(validate_bucket_name("my..bucket").is_err());
    }

    #[test]
    fn test_should_reject_ip_address_bucket_name() {
        assert!(validate_bucket_name("192.168.1.1").is_err());
    }

    // -----------------------------------------------------------------------
    // Object key validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_accept_valid_object_keys() {
        assert!(validate_object_key("a").is_ok());
        assert!(validate_object_key("photos/2024/image.jpg").is_ok());
        assert!(validate_object_key("docs/read@me.txt").is_ok());
        assert!(validate_object_key(&"k".repeat(1024)).is_ok());
    }

    #[test]
    fn test_should_reject_empty_or_too_long_keys() {
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
    }

    #[test]
    fn test_should_reject_empty_path_segments() {
        assert!(validate_object_key("/leading").is_err());
        assert!(validate_object_key("trailing/").is_err());
        assert!(validate_object_key("a//b").is_err());
    }

    #[test]
    fn test_should_reject_dot_segments() {
        assert!(validate_object_key("a/./b").is_err());
        assert!(validate_object_key("../escape").is_err());
    }

    #[test]
    fn test_should_reject_reserved_top_level_names() {
        for key in [
            ".bucket_metadata",
            ".bucket_acl",
            ".bucket_policy",
            ".uploads/u1/1",
            ".hidden",
            "versioning.json",
            "policy.json",
            "versioning.json/nested",
        ] {
            assert!(
                matches!(
                    validate_object_key(key),
                    Err(StorageError::InvalidKey { .. })
                ),
                "expected InvalidKey for {key}"
            );
        }
    }

    #[test]
    fn test_should_allow_reserved_names_in_subdirectories() {
        // Dot-prefixed names are only reserved at the bucket root.
        assert!(validate_object_key("data/.hidden").is_ok());
        assert!(validate_object_key("data/versioning.json").is_ok());
    }

    #[test]
    fn test_should_reject_sidecar_suffix_collisions() {
        assert!(validate_object_key("notes.metadata").is_err());
        assert!(validate_object_key("notes.acl").is_err());
        assert!(validate_object_key("a.metadata/b").is_err());
        assert!(validate_object_key("deep/dir/file.acl").is_err());
    }

    // -----------------------------------------------------------------------
    // ID shapes
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_accept_well_formed_ids() {
        assert!(is_well_formed_version_id("null"));
        assert!(is_well_formed_version_id(&crate::utils::generate_version_id()));
        assert!(is_well_formed_upload_id(&crate::utils::generate_upload_id()));
    }

    #[test]
    fn test_should_reject_malformed_ids() {
        for bad in ["", "short", "../../../etc/passwd", &"A".repeat(32), &"g".repeat(32)] {
            assert!(!is_well_formed_version_id(bad), "expected rejection: {bad}");
        }
        for bad in ["", "null", "../escape", &"f".repeat(63)] {
            assert!(!is_well_formed_upload_id(bad), "expected rejection: {bad}");
        }
    }

    // -----------------------------------------------------------------------
    // Tag validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_validate_tag_keys_and_values() {
        assert!(validate_tag_key("environment").is_ok());
        assert!(validate_tag_key("").is_err());
        assert!(validate_tag_key(&"k".repeat(129)).is_err());

        assert!(validate_tag_value("").is_ok());
        assert!(validate_tag_value(&"v".repeat(256)).is_ok());
        assert!(validate_tag_value(&"v".repeat(257)).is_err());
    }

    #[test]
    fn test_should_validate_tag_sets() {
        let ok: Vec<(String, String)> = (0..10)
            .map(|i| (format!("key{i}"), format!("val{i}")))
            .collect();
        assert!(validate_tags(&ok).is_ok());

        let too_many: Vec<(String, String)> = (0..11)
            .map(|i| (format!("key{i}"), format!("val{i}")))
            .collect();
        assert!(validate_tags(&too_many).is_err());

        let bad_key = vec![(String::new(), "value".to_owned())];
        assert!(validate_tags(&bad_key).is_err());
    }

    // -----------------------------------------------------------------------
    // Metadata validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_validate_metadata_size() {
        let mut meta = HashMap::new();
        meta.insert("color".to_owned(), "blue".to_owned());
        assert!(validate_metadata(&meta).is_ok());

        meta.insert("key".to_owned(), "v".repeat(2048));
        assert!(validate_metadata(&meta).is_err());
    }

    #[test]
    fn test_should_accept_metadata_at_limit() {
        let mut meta = HashMap::new();
        // key (3 bytes) + value (2045 bytes) = 2048
        meta.insert("key".to_owned(), "v".repeat(2045));
        assert!(validate_metadata(&meta).is_ok());
    }

    // -----------------------------------------------------------------------
    // SSE validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_should_accept_aes256_descriptor() {
        let sse = SseDescriptor {
            algorithm: "AES256".to_owned(),
            kms_key_id: None,
        };
        assert!(validate_sse(&sse).is_ok());
    }

    #[test]
    fn test_should_require_kms_key_for_kms_algorithms() {
        let sse = SseDescriptor {
            algorithm: "aws:kms".to_owned(),
            kms_key_id: None,
        };
        assert!(matches!(
            validate_sse(&sse),
            Err(StorageError::InvalidEncryption { .. })
        ));

        let sse = SseDescriptor {
            algorithm: "aws:kms".to_owned(),
            kms_key_id: Some("key-1".to_owned()),
        };
        assert!(validate_sse(&sse).is_ok());
    }

    #[test]
    fn test_should_reject_unknown_encryption_algorithm() {
        let sse = SseDescriptor {
            algorithm: "ROT13".to_owned(),
            kms_key_id: None,
        };
        assert!(matches!(
            validate_sse(&sse),
            Err(StorageError::InvalidEncryption { .. })
        ));
    }
}
