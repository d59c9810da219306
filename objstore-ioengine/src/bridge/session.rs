//! Per-worker session: the single synchronization point between the
//! worker thread and the storage client's completion delivery.
//!
//! Two concurrency domains meet here. The worker thread calls
//! `open`/`queue`/`await_completions`/`next_event` synchronously and never
//! concurrently with itself. The storage client invokes completion
//! callbacks from its own execution context, potentially many in parallel
//! and in an order unrelated to submission order. The only state shared
//! between the domains is the bounded completion channel: callbacks push
//! through a [`CompletionSink`], the worker pulls in
//! [`Session::await_completions`]. There is no other locking in the
//! bridge.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::storage::{StorageClient, StorageError};

use super::downloader::Downloader;

/// The outcome of one queued range read.
///
/// Produced exactly once per queued read, whether the storage client
/// reports success or error. Consumed exactly once by
/// [`Session::next_event`].
#[derive(Debug)]
pub struct CompletionRecord {
    /// The caller-supplied token identifying the original request.
    pub token: u64,
    /// Bytes filled on success, the final (post-retry) error otherwise.
    pub result: Result<usize, StorageError>,
}

/// Single-use delivery side of a session's completion channel.
///
/// One sink is minted per queued read and travels with the read into the
/// storage client's execution context. Delivering consumes the sink, which
/// is what makes "exactly one record per read" structural rather than a
/// convention.
pub struct CompletionSink {
    token: u64,
    tx: mpsc::Sender<CompletionRecord>,
}

impl CompletionSink {
    /// Delivers the outcome from an async context.
    ///
    /// If the channel is at capacity this suspends the delivery context.
    /// The channel's capacity equals the session's queue depth, and the
    /// host never has more than queue-depth requests outstanding, so in
    /// correct usage there is always room and this never suspends.
    pub async fn deliver(self, result: Result<usize, StorageError>) {
        let record = CompletionRecord {
            token: self.token,
            result,
        };
        trace!(token = record.token, "delivering completion");
        if self.tx.send(record).await.is_err() {
            // Session already cleaned up. The host only tears down after
            // reaping everything outstanding, so this is a caller bug.
            warn!(token = self.token, "completion dropped, session is gone");
        }
    }

    /// Delivers the outcome from a plain (non-runtime) thread.
    pub fn deliver_blocking(self, result: Result<usize, StorageError>) {
        let record = CompletionRecord {
            token: self.token,
            result,
        };
        if self.tx.blocking_send(record).is_err() {
            warn!(token = self.token, "completion dropped, session is gone");
        }
    }
}

/// One session per I/O-engine worker thread, for the worker's lifetime.
pub struct Session {
    completions_tx: mpsc::Sender<CompletionRecord>,
    completions_rx: mpsc::Receiver<CompletionRecord>,
    /// Records already moved out of the channel by
    /// [`Self::await_completions`] and not yet handed out by
    /// [`Self::next_event`].
    reaped: Vec<CompletionRecord>,
    client: Arc<dyn StorageClient>,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("object name {0:?} has no bucket/object separator")]
    InvalidName(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReapError {
    #[error("no reaped completion to return, await_completions must run first")]
    Empty,
}

impl Session {
    /// `iodepth` is the host's queue depth: the maximum number of requests
    /// concurrently outstanding against this session. The completion
    /// channel is sized to exactly this value; see [`CompletionSink`].
    pub fn new(iodepth: usize, client: Arc<dyn StorageClient>) -> Self {
        assert!(iodepth >= 1, "queue depth must be positive");
        let (completions_tx, completions_rx) = mpsc::channel(iodepth);
        Session {
            completions_tx,
            completions_rx,
            reaped: Vec::with_capacity(iodepth),
            client,
        }
    }

    /// Opens a range downloader for `"bucket/object"`.
    ///
    /// A name without the separator is rejected locally; no network call
    /// is attempted. The downloader's lifetime is tracked by the engine's
    /// per-file handle, independently of this session.
    pub fn open(&self, name: &str) -> Result<Downloader, OpenError> {
        let (bucket, object) = name
            .split_once('/')
            .ok_or_else(|| OpenError::InvalidName(name.to_string()))?;
        debug!(bucket, object, "opening range downloader");
        let reader = self.client.open_reader(bucket, object)?;
        Ok(Downloader::new(
            bucket.to_string(),
            object.to_string(),
            reader,
        ))
    }

    /// Mints the delivery sink for a read tagged with `token`.
    pub fn sink(&self, token: u64) -> CompletionSink {
        CompletionSink {
            token,
            tx: self.completions_tx.clone(),
        }
    }

    /// Blocks until at least `min` records sit in the reaped list, then
    /// drains more without blocking, up to `max` total. Returns the reaped
    /// count.
    ///
    /// `min == 0` makes the call non-blocking. There is no deadline: the
    /// host engine owns timeout enforcement, and this call waits for `min`
    /// unconditionally.
    pub fn await_completions(&mut self, min: usize, max: usize) -> usize {
        while self.reaped.len() < min {
            trace!(
                remaining = min - self.reaped.len(),
                "blocking for minimum completions"
            );
            match self.completions_rx.blocking_recv() {
                Some(record) => self.reaped.push(record),
                None => {
                    // Unreachable while the session holds its own sender;
                    // bail rather than spin if that invariant ever breaks.
                    warn!("completion channel closed while awaiting");
                    break;
                }
            }
        }
        while self.reaped.len() < max {
            match self.completions_rx.try_recv() {
                Ok(record) => self.reaped.push(record),
                Err(_) => break,
            }
        }
        debug!(count = self.reaped.len(), min, max, "reaped completions");
        self.reaped.len()
    }

    /// Removes and returns one reaped record.
    ///
    /// Retrieval order is most-recently-reaped first across a drained
    /// batch; callers must not assume issue order or arrival order.
    pub fn next_event(&mut self) -> Result<CompletionRecord, ReapError> {
        self.reaped.pop().ok_or(ReapError::Empty)
    }

    #[cfg(test)]
    pub(crate) fn reaped_len(&self) -> usize {
        self.reaped.len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("capacity", &self.completions_tx.max_capacity())
            .field("reaped", &self.reaped.len())
            .finish()
    }
}
