//! The storage collaborator interface consumed by the bridge.
//!
//! The bridge does not care how ranges are fetched; it needs exactly
//! three capabilities: construct a client with a pluggable retry
//! predicate, open a range-capable reader for a bucket/object pair, and
//! register a byte-range read whose completion is delivered through a
//! [`CompletionSink`](crate::CompletionSink). Everything else
//! (authentication, transport, request scheduling) is the
//! implementation's business.

pub mod backend;

use std::sync::Arc;

use crate::bridge::buffer::IoBuffer;
use crate::bridge::session::CompletionSink;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{object}")]
    NotFound { bucket: String, object: String },
    #[error("range at offset {offset} starts beyond object end ({size} bytes)")]
    OutOfRange { offset: u64, size: u64 },
    #[error("client construction failed: {0}")]
    Connect(String),
    #[error(transparent)]
    Backend(#[from] object_store::Error),
}

/// Decides whether a failed range read should be retried.
///
/// Applied by the client between attempts; the final error a
/// [`CompletionRecord`](crate::CompletionRecord) carries is the one the
/// predicate declined to retry (or the last attempt's).
pub type RetryPredicate = Arc<dyn Fn(&StorageError) -> bool + Send + Sync>;

/// The default classification: transient transport failures retry,
/// categorical failures do not.
pub fn default_retry_predicate() -> RetryPredicate {
    Arc::new(|err| {
        let retry = match err {
            StorageError::NotFound { .. }
            | StorageError::OutOfRange { .. }
            | StorageError::Connect(_) => false,
            StorageError::Backend(e) => !matches!(
                e,
                object_store::Error::NotFound { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::AlreadyExists { .. }
                    | object_store::Error::Precondition { .. }
                    | object_store::Error::NotModified { .. }
            ),
        };
        tracing::trace!(error = %err, retry, "retry classification");
        retry
    })
}

/// A storage client capable of opening range readers.
///
/// One client per session; constructed at engine init with the session's
/// retry predicate.
pub trait StorageClient: Send + Sync + 'static {
    /// Opens a range-capable reader against `bucket`/`object`.
    ///
    /// Fails if the object cannot be opened (missing, permission,
    /// transport); the bridge surfaces that as a failed `open`, before
    /// any read is queued.
    fn open_reader(&self, bucket: &str, object: &str)
        -> Result<Arc<dyn RangeReader>, StorageError>;
}

/// An open range-read context for a single object.
pub trait RangeReader: Send + Sync + 'static {
    /// Registers a read of `buffer.len()` bytes at `offset` and returns
    /// immediately. The implementation's own execution eventually fills
    /// the buffer and consumes `sink` with the outcome, exactly once,
    /// whether the read succeeds or fails.
    fn submit_range(&self, offset: u64, buffer: IoBuffer, sink: CompletionSink);

    /// Closes the context. Errors are reported for logging; the bridge
    /// swallows them.
    fn close(&self) -> Result<(), StorageError>;
}
