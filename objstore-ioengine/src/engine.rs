//! The boundary surface exposed to the host I/O engine.
//!
//! The host drives these seven operations in a fixed order per worker:
//! `init` → `open` → `queue`* → `getevents`/`event`* → `close` →
//! `cleanup`. Failures cross this boundary as sentinel values (handle 0,
//! negative counts) rather than `Result`s, because the host's contract is
//! C-shaped; the typed errors live one layer down and are logged here
//! before being flattened.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::bridge::handle_table::{HandleTable, RawHandle};
use crate::bridge::session::Session;
use crate::storage::{default_retry_predicate, RetryPredicate, StorageClient, StorageError};
use crate::IoBuffer;

/// Request direction, as reported by the host's per-request descriptor.
///
/// This engine is read-only: everything except [`Direction::Read`] is
/// rejected synchronously and never queued.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Read,
    Write,
    Trim,
    Sync,
}

/// Outcome of one completed request, as returned by [`Engine::event`].
#[derive(Clone, Copy, Debug)]
pub struct Event {
    /// The caller-supplied request token, 0 if the call itself failed.
    pub token: u64,
    /// 0 on success, negative on request error, invalid handle, or an
    /// empty reaped list.
    pub code: i32,
}

impl Event {
    const FAILED: Event = Event { token: 0, code: -1 };
}

/// Builds one storage client per session, configured with the session's
/// retry predicate.
pub type ClientConnector =
    Box<dyn Fn(RetryPredicate) -> Result<Arc<dyn StorageClient>, StorageError> + Send + Sync>;

/// The engine adapter: a handle table plus a way to construct storage
/// clients.
///
/// Handles are plain integers so that an FFI shim can park them in the
/// host's `void*` slots; every operation re-validates its handles through
/// the kind-checked table.
pub struct Engine {
    table: Mutex<HandleTable>,
    connect: ClientConnector,
}

impl Engine {
    pub fn new(connect: ClientConnector) -> Self {
        Engine {
            table: Mutex::new(HandleTable::new()),
            connect,
        }
    }

    /// Creates a session for the calling worker. Returns the invalid
    /// handle on a zero depth or failed client construction.
    pub fn init(&self, iodepth: u32) -> RawHandle {
        info!(iodepth, "engine init");
        if iodepth == 0 {
            error!("queue depth must be positive");
            return RawHandle::INVALID;
        }
        let client = match (self.connect)(default_retry_predicate()) {
            Ok(client) => client,
            Err(err) => {
                error!(error = %err, "storage client construction failed");
                return RawHandle::INVALID;
            }
        };
        let session = Session::new(iodepth as usize, client);
        self.table.lock().unwrap().insert_session(session)
    }

    /// Releases the session. Undrained completions are discarded; the
    /// host only calls this after reaping everything outstanding.
    pub fn cleanup(&self, session: RawHandle) {
        info!(session = %session, "engine cleanup");
        scopeguard::defer_on_success! { debug!(session = %session, "engine cleanup done") };
        match self.table.lock().unwrap().release_session(session) {
            Ok(released) => drop(released),
            Err(err) => error!(error = %err, "cleanup skipped"),
        }
    }

    /// Opens a downloader for `"bucket/object"`. Returns the invalid
    /// handle on a malformed name, a bad session handle, or open failure.
    pub fn open(&self, session: RawHandle, name: &str) -> RawHandle {
        debug!(session = %session, name, "engine open");
        let session = match self.table.lock().unwrap().session(session) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "open failed");
                return RawHandle::INVALID;
            }
        };
        // Table lock released above; the open may hit the network.
        let downloader = match session.lock().unwrap().open(name) {
            Ok(d) => d,
            Err(err) => {
                error!(name, error = %err, "open failed");
                return RawHandle::INVALID;
            }
        };
        self.table.lock().unwrap().insert_downloader(downloader)
    }

    /// Closes and releases the downloader. Returns 0, or negative on an
    /// unknown handle. Underlying close errors are logged and swallowed.
    pub fn close(&self, downloader: RawHandle) -> i32 {
        debug!(downloader = %downloader, "engine close");
        match self.table.lock().unwrap().release_downloader(downloader) {
            Ok(released) => {
                released.close();
                0
            }
            Err(err) => {
                error!(error = %err, "close failed");
                -1
            }
        }
    }

    /// Submits one range read tagged with `token`. Returns 0 once the
    /// read is registered; the call never waits for data.
    ///
    /// Non-read directions and bad handles fail immediately with a
    /// negative value and never touch the completion channel.
    pub fn queue(
        &self,
        session: RawHandle,
        downloader: RawHandle,
        token: u64,
        offset: u64,
        buffer: IoBuffer,
        direction: Direction,
    ) -> i32 {
        if direction != Direction::Read {
            error!(?direction, token, "rejecting non-read request");
            return -1;
        }
        let (session, downloader) = {
            let table = self.table.lock().unwrap();
            let session = match table.session(session) {
                Ok(s) => s,
                Err(err) => {
                    error!(error = %err, "queue failed");
                    return -1;
                }
            };
            let downloader = match table.downloader(downloader) {
                Ok(d) => d,
                Err(err) => {
                    error!(error = %err, "queue failed");
                    return -1;
                }
            };
            (session, downloader)
        };
        let sink = session.lock().unwrap().sink(token);
        downloader.queue(offset, buffer, sink);
        0
    }

    /// Blocks until at least `min` completions are reaped, then drains up
    /// to `max` without blocking. Returns the reaped count, negative on a
    /// bad handle.
    pub fn getevents(&self, session: RawHandle, min: u32, max: u32) -> i32 {
        let session = match self.table.lock().unwrap().session(session) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "getevents failed");
                return -1;
            }
        };
        // Table lock is dropped before the blocking wait so other workers
        // can keep using their own sessions.
        let count = session
            .lock()
            .unwrap()
            .await_completions(min as usize, max as usize);
        i32::try_from(count).expect("reaped count bounded by iodepth")
    }

    /// Pops one reaped completion. `code` is 0 for success, negative for
    /// a request error; a bad handle or empty reaped list yields a failed
    /// event.
    pub fn event(&self, session: RawHandle) -> Event {
        let session = match self.table.lock().unwrap().session(session) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "event failed");
                return Event::FAILED;
            }
        };
        let record = match session.lock().unwrap().next_event() {
            Ok(record) => record,
            Err(err) => {
                error!(error = %err, "event failed");
                return Event::FAILED;
            }
        };
        match record.result {
            Ok(_) => Event {
                token: record.token,
                code: 0,
            },
            Err(err) => {
                error!(token = record.token, error = %err, "request completed with error");
                Event {
                    token: record.token,
                    code: -1,
                }
            }
        }
    }
}
