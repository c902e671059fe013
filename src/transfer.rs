//! Streaming transfer plumbing: payload sources, progress reporting, downloads
//!
//! Uploads consume a [`PayloadSource`] so a retried attempt can reopen the
//! stream and restart from zero. Progress is pushed synchronously into a
//! [`ProgressSink`] at every chunk boundary; reported percentages are
//! non-decreasing and reach exactly 100 only once the transport has
//! confirmed completion.

use crate::error::{classify, ErrorKind, GatewayError, GatewayResult};
use crate::types::PREFIX_DELIMITER;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Read size used when forwarding payload bytes to the transport
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

/// Payloads at or above this size upload as multipart
pub const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Multipart part size (5 MiB is the S3 minimum)
pub const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Snapshot of a transfer in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    /// Bytes moved so far
    pub bytes_transferred: u64,

    /// Total bytes in the transfer
    pub total_bytes: u64,

    /// Completion percentage, 0-100
    pub percentage: u8,
}

impl TransferProgress {
    /// Progress for an in-flight transfer; percentage saturates at 100
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            0
        } else {
            (bytes_transferred.saturating_mul(100) / total_bytes).min(100) as u8
        };
        Self {
            bytes_transferred,
            total_bytes,
            percentage,
        }
    }

    /// Terminal progress event for a confirmed completed transfer
    pub fn completed(total_bytes: u64) -> Self {
        Self {
            bytes_transferred: total_bytes,
            total_bytes,
            percentage: 100,
        }
    }
}

/// Sink invoked synchronously at each observable chunk boundary
pub trait ProgressSink: Send + Sync {
    /// Receive one progress snapshot
    fn report(&self, progress: TransferProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(TransferProgress) + Send + Sync,
{
    fn report(&self, progress: TransferProgress) {
        self(progress)
    }
}

/// Progress sink publishing the latest snapshot on a `watch` channel
///
/// The channel holds exactly the most recent value, so a polling consumer
/// (a UI) never lags the transfer and nothing queues unboundedly.
pub struct WatchProgress {
    tx: watch::Sender<TransferProgress>,
}

impl WatchProgress {
    /// Create the sink and the receiver half handed to the consumer
    pub fn new() -> (Self, watch::Receiver<TransferProgress>) {
        let (tx, rx) = watch::channel(TransferProgress::new(0, 0));
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgress {
    fn report(&self, progress: TransferProgress) {
        // A dropped receiver just means nobody is watching
        let _ = self.tx.send(progress);
    }
}

/// Per-attempt progress accounting
///
/// Clamps in-flight percentages to 99; the transport confirming completion
/// is what moves the needle to 100, via `finish`.
pub(crate) struct ProgressTracker<'a> {
    sink: Option<&'a dyn ProgressSink>,
    total: u64,
    sent: u64,
    last_percentage: u8,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: Option<&'a dyn ProgressSink>, total: u64) -> Self {
        Self {
            sink,
            total,
            sent: 0,
            last_percentage: 0,
        }
    }

    /// Record `bytes` more bytes forwarded and emit a snapshot
    pub(crate) fn advance(&mut self, bytes: u64) {
        self.sent = self.sent.saturating_add(bytes);
        let pct = TransferProgress::new(self.sent, self.total)
            .percentage
            .min(99)
            .max(self.last_percentage);
        self.last_percentage = pct;

        if let Some(sink) = self.sink {
            sink.report(TransferProgress {
                bytes_transferred: self.sent,
                total_bytes: self.total,
                percentage: pct,
            });
        }
    }

    /// Emit the terminal 100% snapshot after confirmed completion
    pub(crate) fn finish(&mut self) {
        self.last_percentage = 100;
        if let Some(sink) = self.sink {
            sink.report(TransferProgress::completed(self.total.max(self.sent)));
        }
    }
}

/// Replayable source of upload bytes
///
/// `open` returns a fresh reader positioned at the start; the retry
/// executor calls it once per attempt, so a transfer that fails mid-stream
/// restarts from zero rather than resuming.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Total payload size in bytes
    fn len(&self) -> u64;

    /// Whether the payload is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a fresh reader over the whole payload
    async fn open(&self) -> GatewayResult<Box<dyn AsyncRead + Send + Unpin>>;
}

/// In-memory payload
#[derive(Debug, Clone)]
pub struct BytesPayload {
    data: Bytes,
}

impl From<Bytes> for BytesPayload {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl From<Vec<u8>> for BytesPayload {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl PayloadSource for BytesPayload {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open(&self) -> GatewayResult<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// Payload read from the local filesystem
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
    size: u64,
}

impl FilePayload {
    /// Stat the file and capture its size for progress totals
    pub async fn open_path(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl PayloadSource for FilePayload {
    fn len(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> GatewayResult<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// Map a mid-stream body failure to the taxonomy
///
/// A drop while reading the response body is a connection problem unless
/// the text says otherwise; it never falls through to `UNKNOWN`, keeping
/// the failure retryable at the operation level.
pub(crate) fn stream_failure(err: &(dyn std::error::Error + 'static)) -> GatewayError {
    let classified = classify(err);
    if classified.kind == ErrorKind::Unknown {
        GatewayError::with_status(
            ErrorKind::Network,
            format!("Connection lost while streaming object data: {err}"),
            0,
        )
    } else {
        classified
    }
}

/// Streaming handle over a downloaded object
///
/// Wraps the transport's body stream without re-buffering it; consumers
/// either pull chunks through (`next_chunk`, `write_to`, `into_stream`) or
/// materialize the whole payload with `into_bytes`.
pub struct ObjectDownload {
    key: String,
    size_bytes: Option<u64>,
    content_type: String,
    body: aws_sdk_s3::primitives::ByteStream,
}

impl ObjectDownload {
    pub(crate) fn new(
        key: impl Into<String>,
        size_bytes: Option<u64>,
        content_type: Option<String>,
        body: aws_sdk_s3::primitives::ByteStream,
    ) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            content_type: content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            body,
        }
    }

    /// Full object key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Object size as reported by the transport
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Content type, `application/octet-stream` when the transport is silent
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Filename to suggest at the download boundary: the key's base name
    pub fn suggested_filename(&self) -> &str {
        self.key
            .trim_end_matches(PREFIX_DELIMITER)
            .rsplit(PREFIX_DELIMITER)
            .next()
            .unwrap_or(&self.key)
    }

    /// Pull the next chunk; `None` once the stream is drained
    pub async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        self.body
            .try_next()
            .await
            .map_err(|e| stream_failure(&e))
    }

    /// Adapt the download into a `Stream` of chunks for pass-through callers
    pub fn into_stream(self) -> impl Stream<Item = GatewayResult<Bytes>> {
        futures::stream::try_unfold(self, |mut download| async move {
            match download.next_chunk().await? {
                Some(chunk) => Ok(Some((chunk, download))),
                None => Ok(None),
            }
        })
    }

    /// Stream the payload into `writer`, reporting progress per chunk
    pub async fn write_to<W>(
        mut self,
        writer: &mut W,
        progress: Option<&dyn ProgressSink>,
    ) -> GatewayResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut tracker = ProgressTracker::new(progress, self.size_bytes.unwrap_or(0));
        let mut written: u64 = 0;

        while let Some(chunk) = self.next_chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            tracker.advance(chunk.len() as u64);
        }
        writer.flush().await?;
        tracker.finish();

        Ok(written)
    }

    /// Materialize the whole payload in memory
    ///
    /// Suitable for the HTTP response boundary at administration scale;
    /// prefer the streaming consumers for large objects.
    pub async fn into_bytes(mut self) -> GatewayResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size_bytes.unwrap_or(0) as usize);
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("key", &self.key)
            .field("size_bytes", &self.size_bytes)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
