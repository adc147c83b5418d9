//! Streaming I/O engine: durable chunked reads and writes.
//!
//! Writes stream chunks to a freshly-created file while updating a rolling
//! SHA-256, then flush + fsync before the result is reported; any failure
//! (or cancellation of the writing task) unlinks the partial file via
//! [`PartialFileGuard`] before the error propagates. Reads are lazy chunked
//! [`BodyStream`]s bounded to one chunk of memory per request; a short read
//! terminates the stream with an error rather than silently yielding fewer
//! bytes than requested.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{trace, warn};

use crate::checksums::{ChecksumAlgorithm, StreamingHasher};
use crate::error::{StorageError, StorageResult};
use crate::utils::ByteRange;

/// A lazy stream of body chunks.
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Bounded retries for interrupted chunk reads.
const MAX_READ_RETRIES: u32 = 3;

/// Wrap an in-memory buffer as a single-chunk [`BodyStream`].
#[must_use]
pub fn body_from_bytes(data: impl Into<Bytes> + Send + 'static) -> BodyStream {
    futures::stream::once(async move { Ok(data.into()) }).boxed()
}

/// Collect a [`BodyStream`] into one buffer. Test and small-document helper;
/// object bodies stay streamed.
///
/// # Errors
///
/// Propagates the first chunk error from the stream.
pub async fn collect_body(mut body: BodyStream) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

// ---------------------------------------------------------------------------
// WriteResult
// ---------------------------------------------------------------------------

/// Result of writing a stream to storage.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Unquoted lowercase-hex SHA-256 of the written bytes.
    pub etag: String,
    /// The size in bytes.
    pub size: u64,
    /// Base64 value of the requested additional checksum, if any.
    pub checksum: Option<String>,
}

// ---------------------------------------------------------------------------
// PartialFileGuard
// ---------------------------------------------------------------------------

/// Unlinks a partially-written file unless disarmed.
///
/// Covers both the error path and cancellation: if the writing future is
/// dropped mid-write, the guard's `Drop` removes the partial file.
#[derive(Debug)]
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// The write completed; keep the file.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial file");
            }
        } else {
            trace!(path = %self.path.display(), "removed partial file");
        }
    }
}

// ---------------------------------------------------------------------------
// IoEngine
// ---------------------------------------------------------------------------

/// Chunked streaming reader/writer over the local file system.
///
/// # Examples
///
/// ```
/// use silo_core::io::{IoEngine, body_from_bytes, collect_body};
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir().unwrap();
/// let engine = IoEngine::new(64 * 1024);
/// let path = dir.path().join("obj");
///
/// let result = engine
///     .write_stream(&path, body_from_bytes("hello"), None)
///     .await
///     .unwrap();
/// assert_eq!(result.size, 5);
///
/// let body = engine.read_stream(&path, None).await.unwrap();
/// assert_eq!(collect_body(body).await.unwrap().as_ref(), b"hello");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct IoEngine {
    /// Chunk size for streaming reads.
    chunk_size: usize,
}

impl IoEngine {
    /// Create an engine with the given read chunk size.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// The configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Stream `body` into a new file at `path`, computing the rolling
    /// SHA-256 (and optionally one additional checksum) as chunks arrive.
    ///
    /// The file is created (parent directories included) and truncated,
    /// written sequentially from offset 0, then flushed and fsynced. On any
    /// failure the partial file is unlinked before the error propagates.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] for any I/O failure, including
    /// chunk errors surfaced by the body stream itself.
    pub async fn write_stream(
        &self,
        path: &Path,
        mut body: BodyStream,
        algorithm: Option<ChecksumAlgorithm>,
    ) -> StorageResult<WriteResult> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut guard = PartialFileGuard::new(path.to_path_buf());
        let mut file = File::create(path)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", path.display()), e))?;

        let mut hasher = StreamingHasher::new(algorithm);
        let mut size: u64 = 0;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::io(format!("reading body for {}", path.display()), e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(format!("writing {}", path.display()), e))?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| StorageError::io(format!("flushing {}", path.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(format!("syncing {}", path.display()), e))?;
        drop(file);

        guard.disarm();

        let result = hasher.finish();
        trace!(path = %path.display(), size, "wrote data file");

        Ok(WriteResult {
            etag: result.sha256_hex,
            size,
            checksum: result.checksum,
        })
    }

    /// Open a lazy chunked stream over `path`, optionally limited to a
    /// resolved byte range.
    ///
    /// The returned stream yields exactly the requested bytes in
    /// `chunk_size` pieces, or fails; a file that ends early produces an
    /// `UnexpectedEof` error, never a silently short result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the file cannot be opened or
    /// its length read.
    pub async fn read_stream(
        &self,
        path: &Path,
        range: Option<ByteRange>,
    ) -> StorageResult<BodyStream> {
        let mut file = File::open(path)
            .await
            .map_err(|e| StorageError::io(format!("opening {}", path.display()), e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(format!("reading length of {}", path.display()), e))?
            .len();

        let (start, remaining) = match range {
            Some(r) => (r.start, r.len()),
            None => (0, len),
        };

        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| StorageError::io(format!("seeking {}", path.display()), e))?;
        }

        let chunk_size = self.chunk_size;
        let stream = futures::stream::try_unfold(
            (file, remaining),
            move |(mut file, remaining)| async move {
                if remaining == 0 {
                    return Ok(None);
                }
                let want = usize::try_from(remaining.min(chunk_size as u64)).unwrap_or(chunk_size);
                let mut buf = BytesMut::zeroed(want);
                let mut filled = 0;
                let mut retries = 0;
                while filled < want {
                    match file.read(&mut buf[filled..]).await {
                        Ok(0) => {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "data file shorter than recorded size",
                            ));
                        }
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                            retries += 1;
                            if retries > MAX_READ_RETRIES {
                                return Err(e);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(Some((buf.freeze(), (file, remaining - want as u64))))
            },
        );

        Ok(stream.boxed())
    }

    /// Concatenate `sources` into a new file at `dest`, hashing the
    /// assembled stream.
    ///
    /// Used by multipart assembly; the destination follows the same
    /// create/fsync/unlink-on-error protocol as [`IoEngine::write_stream`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] for any I/O failure.
    pub async fn concat_files(&self, dest: &Path, sources: &[PathBuf]) -> StorageResult<WriteResult> {
        // Sources open lazily, one at a time, as the previous one drains.
        let engine = self.clone();
        let body = futures::stream::iter(sources.to_vec())
            .then(move |source| {
                let engine = engine.clone();
                async move {
                    engine
                        .read_stream(&source, None)
                        .await
                        .map_err(|e| std::io::Error::other(e.to_string()))
                }
            })
            .try_flatten()
            .boxed();
        self.write_stream(dest, body, None).await
    }

    /// Re-read a file and recompute its digests.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] for any I/O failure.
    pub async fn hash_file(
        &self,
        path: &Path,
        algorithm: Option<ChecksumAlgorithm>,
    ) -> StorageResult<WriteResult> {
        let mut body = self.read_stream(path, None).await?;
        let mut hasher = StreamingHasher::new(algorithm);
        let mut size: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::io(format!("hashing {}", path.display()), e))?
        {
            hasher.update(&chunk);
            size += chunk.len() as u64;
        }
        let result = hasher.finish();
        Ok(WriteResult {
            etag: result.sha256_hex,
            size,
            checksum: result.checksum,
        })
    }

    /// The size of a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the metadata cannot be read.
    pub async fn file_size(&self, path: &Path) -> StorageResult<u64> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::io(format!("reading length of {}", path.display()), e))?;
        Ok(meta.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
