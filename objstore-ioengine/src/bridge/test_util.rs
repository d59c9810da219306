//! Scripted storage client for bridge tests: reads stay pending until the
//! test explicitly completes them, so blocking behavior is deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::storage::{RangeReader, StorageClient, StorageError};

use super::buffer::IoBuffer;
use super::session::CompletionSink;

pub(crate) struct PendingRead {
    #[allow(dead_code)]
    pub offset: u64,
    pub buffer: IoBuffer,
    pub sink: CompletionSink,
}

#[derive(Default)]
pub(crate) struct MockReader {
    pending: Mutex<VecDeque<PendingRead>>,
    close_error: bool,
    closed: AtomicBool,
}

impl MockReader {
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Completes the oldest pending read from the test thread.
    pub(crate) fn complete_next(&self, result: Result<Vec<u8>, StorageError>) {
        let mut read = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending read to complete");
        match result {
            Ok(data) => {
                let n = read.buffer.copy_from(&data);
                read.sink.deliver_blocking(Ok(n));
            }
            Err(err) => read.sink.deliver_blocking(Err(err)),
        }
    }

    pub(crate) fn complete_all(&self, fill: u8) {
        while self.pending_count() > 0 {
            let len = self.pending.lock().unwrap().front().unwrap().buffer.len();
            self.complete_next(Ok(vec![fill; len]));
        }
    }
}

impl RangeReader for MockReader {
    fn submit_range(&self, offset: u64, buffer: IoBuffer, sink: CompletionSink) {
        self.pending.lock().unwrap().push_back(PendingRead {
            offset,
            buffer,
            sink,
        });
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_error {
            Err(StorageError::Connect("scripted close failure".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub(crate) struct MockClient {
    opens: Mutex<Vec<(String, String)>>,
    readers: Mutex<Vec<Arc<MockReader>>>,
    fail_open: bool,
    close_error: bool,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        MockClient::default()
    }

    pub(crate) fn failing_open() -> Self {
        MockClient {
            fail_open: true,
            ..MockClient::default()
        }
    }

    pub(crate) fn with_close_error() -> Self {
        MockClient {
            close_error: true,
            ..MockClient::default()
        }
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// The reader minted by the `idx`-th successful open.
    pub(crate) fn reader(&self, idx: usize) -> Arc<MockReader> {
        Arc::clone(&self.readers.lock().unwrap()[idx])
    }

    /// A detached reader, for tests that build a downloader directly.
    pub(crate) fn open_reader_for_test(&self) -> Arc<dyn RangeReader> {
        Arc::new(MockReader::default())
    }
}

impl StorageClient for MockClient {
    fn open_reader(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<Arc<dyn RangeReader>, StorageError> {
        if self.fail_open {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        self.opens
            .lock()
            .unwrap()
            .push((bucket.to_string(), object.to_string()));
        let reader = Arc::new(MockReader {
            close_error: self.close_error,
            ..MockReader::default()
        });
        self.readers.lock().unwrap().push(Arc::clone(&reader));
        Ok(reader)
    }
}
