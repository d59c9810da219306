//! Long-lived per-object handle that accepts concurrent range reads.

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::storage::RangeReader;

use super::buffer::IoBuffer;
use super::session::CompletionSink;

/// One downloader per open file, bound to a specific bucket/object pair.
///
/// Created by `open`, destroyed by `close`. The host guarantees ordering:
/// no queue operation arrives after close, so the downloader outlives
/// every read issued against it.
pub struct Downloader {
    bucket: String,
    object: String,
    reader: Arc<dyn RangeReader>,
}

impl Downloader {
    pub(crate) fn new(bucket: String, object: String, reader: Arc<dyn RangeReader>) -> Self {
        Downloader {
            bucket,
            object,
            reader,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// Registers a byte-range read of `buffer.len()` bytes at `offset`.
    ///
    /// Non-blocking: returns immediately after registration. Once the
    /// storage client has filled (or failed) the range, it delivers a
    /// completion record through `sink`.
    pub fn queue(&self, offset: u64, buffer: IoBuffer, sink: CompletionSink) {
        trace!(
            bucket = self.bucket,
            object = self.object,
            offset,
            length = buffer.len(),
            "queueing range read"
        );
        self.reader.submit_range(offset, buffer, sink);
    }

    /// Closes the underlying range context.
    ///
    /// Close errors are logged and swallowed; the engine has no recovery
    /// path for a failed teardown.
    pub fn close(&self) {
        debug!(bucket = self.bucket, object = self.object, "closing downloader");
        if let Err(err) = self.reader.close() {
            error!(
                bucket = self.bucket,
                object = self.object,
                error = %err,
                "downloader close failed (swallowing)"
            );
        }
    }
}
