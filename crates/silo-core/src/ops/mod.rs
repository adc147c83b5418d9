//! Operation handlers, grouped by area, implemented as `impl` blocks on
//! [`crate::SiloStore`].

mod bucket;
mod bucket_config;
mod list;
mod multipart;
mod object;
mod object_config;

pub use list::{ListObjectVersionsInput, ListObjectsInput};
pub use multipart::{
    CompletedPart, CompleteMultipartOutput, ListPartsOutput, MultipartUploadInfo, PartRecord,
    UploadInfo,
};
pub use object::{
    CopyObjectInput, CopyObjectOutput, DeleteError, DeleteObjectOutput, DeleteOutcome,
    GetObjectOutput, IntegrityReport, PutObjectInput, PutObjectOutput,
};
