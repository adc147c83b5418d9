//! Storage core of an S3-compatible object store.
//!
//! Silo turns bucket/key operations into durable bytes under a root
//! directory while maintaining the sidecar metadata that preserves S3
//! semantics: versioning and delete markers, two-phase multipart assembly,
//! prefix/delimiter listing with stable pagination, object locks and legal
//! holds, event fan-out, and the audit / batch-job ledgers.
//!
//! # Architecture
//!
//! ```text
//! request router (out of scope)
//!        |
//!        v
//!   SiloStore (façade, per-bucket / per-key locks)
//!     |        |         |          |
//!     v        v         v          v
//!  IoEngine  MetadataStore  EventDispatcher  ledgers
//!  (chunked   (sidecar JSON   (bounded queue   (audit log,
//!   streams)   + listing)      + sinks)         batch jobs)
//! ```
//!
//! All state lives below `StorageConfig::root_path`; every durable write
//! is either streamed-then-fsynced (data) or written to a temp file and
//! renamed into place (metadata), so readers never observe torn documents.

pub mod checksums;
pub mod config;
pub mod configs;
pub mod error;
pub mod events;
pub mod io;
pub mod locks;
pub mod meta;
mod ops;
pub mod paths;
pub mod store;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use ops::{
    CompleteMultipartOutput, CompletedPart, CopyObjectInput, CopyObjectOutput, DeleteError,
    DeleteObjectOutput, DeleteOutcome, GetObjectOutput, IntegrityReport, ListObjectVersionsInput,
    ListObjectsInput, ListPartsOutput, MultipartUploadInfo, PartRecord, PutObjectInput,
    PutObjectOutput, UploadInfo,
};
pub use store::SiloStore;
