//! Storage error types.
//!
//! Defines [`StorageError`], a domain-specific error enum covering every
//! error kind the storage core may surface to its caller. Each variant maps
//! to a stable S3-style error code string via [`StorageError::code`], which
//! a request router can use when marshalling wire responses.
//!
//! # Usage
//!
//! ```
//! use silo_core::error::StorageError;
//!
//! let err = StorageError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! assert_eq!(err.code(), "NoSuchBucket");
//! ```

/// Storage error type.
///
/// Variants follow the four classes of the error-handling design:
/// precondition violations (client-visible, never retried), integrity
/// failures and fatal I/O (both surfaced as [`StorageError::Internal`]),
/// while transient I/O is retried at the edge and never reaches this enum.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The requested bucket name is not available.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket is not empty and cannot be deleted.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    /// The bucket has no policy document.
    #[error("The bucket policy does not exist")]
    NoSuchBucketPolicy,

    // -----------------------------------------------------------------------
    // Object / key errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified version does not exist.
    #[error("The specified version does not exist: key={key}, version_id={version_id}")]
    NoSuchVersion {
        /// The key for the version.
        key: String,
        /// The version ID that was not found.
        version_id: String,
    },

    /// The key collides with a reserved sidecar or configuration file name.
    #[error("The specified key is reserved and cannot be used: {key}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    // -----------------------------------------------------------------------
    // Multipart upload errors
    // -----------------------------------------------------------------------
    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// One or more of the specified parts could not be found, or a part's
    /// ETag did not match.
    #[error("One or more of the specified parts could not be found: {message}")]
    InvalidPart {
        /// Description of the offending part.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------
    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The requested range is not satisfiable.
    #[error("The requested range is not satisfiable")]
    InvalidRange,

    /// The server-side-encryption descriptor is not valid.
    #[error("Invalid encryption configuration: {message}")]
    InvalidEncryption {
        /// Description of the encryption error.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Authorization / method errors
    // -----------------------------------------------------------------------
    /// Access denied (object-lock or legal-hold violation).
    #[error("Access Denied")]
    AccessDenied,

    /// The operation is not allowed against this resource (e.g. fetching a
    /// delete marker's body).
    #[error("The specified method is not allowed against this resource")]
    MethodNotAllowed,

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context (integrity failures, fatal I/O).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Return the stable S3-style error code string for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            Self::BucketNotEmpty { .. } => "BucketNotEmpty",
            Self::NoSuchBucketPolicy => "NoSuchBucketPolicy",
            Self::NoSuchKey { .. } => "NoSuchKey",
            Self::NoSuchVersion { .. } => "NoSuchVersion",
            Self::InvalidKey { .. } => "InvalidKey",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InvalidRange => "InvalidRange",
            Self::InvalidEncryption { .. } => "InvalidEncryption",
            Self::AccessDenied => "AccessDenied",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Wrap an I/O error with context as an internal error.
    pub(crate) fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        let context = context.into();
        Self::Internal(anyhow::Error::new(err).context(context))
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
