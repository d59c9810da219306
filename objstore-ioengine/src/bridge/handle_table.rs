//! Registry mapping opaque non-zero integers to live bridge objects.
//!
//! The host engine stores per-thread and per-file state as `void*`-sized
//! slots. Instead of smuggling pointers through those slots, the bridge
//! hands out integer handles and keeps the real objects here. Lookups are
//! kind-checked: a session handle fed to a downloader operation (or vice
//! versa) fails cleanly even if the two kinds happen to share a number
//! space.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::downloader::Downloader;
use super::session::Session;

/// Opaque identifier for one live [`Session`] or [`Downloader`].
///
/// Zero is reserved for "invalid/absent"; the table never allocates it.
/// A handle is valid from the moment its creating operation returns until
/// its matching release; lookups after release fail explicitly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RawHandle(u64);

impl RawHandle {
    pub const INVALID: RawHandle = RawHandle(0);

    /// Reconstructs a handle from its integer value, e.g. after a round
    /// trip through a host engine slot.
    pub fn from_raw(raw: u64) -> Self {
        RawHandle(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum HandleKind {
    Session,
    Downloader,
}

enum Entry {
    Session(Arc<Mutex<Session>>),
    Downloader(Arc<Downloader>),
}

impl Entry {
    fn kind(&self) -> HandleKind {
        match self {
            Entry::Session(_) => HandleKind::Session,
            Entry::Downloader(_) => HandleKind::Downloader,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HandleError {
    #[error("handle {0} is not live")]
    NotLive(RawHandle),
    #[error("handle {handle} holds a {actual:?}, wanted a {wanted:?}")]
    KindMismatch {
        handle: RawHandle,
        wanted: HandleKind,
        actual: HandleKind,
    },
}

pub(crate) struct HandleTable {
    next: u64,
    entries: HashMap<u64, Entry>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        HandleTable {
            // 0 is the invalid handle
            next: 1,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, entry: Entry) -> RawHandle {
        let handle = RawHandle(self.next);
        self.next += 1;
        let prev = self.entries.insert(handle.0, entry);
        assert!(prev.is_none(), "monotonic counter never reuses a handle");
        handle
    }

    pub(crate) fn insert_session(&mut self, session: Session) -> RawHandle {
        self.insert(Entry::Session(Arc::new(Mutex::new(session))))
    }

    pub(crate) fn insert_downloader(&mut self, downloader: Downloader) -> RawHandle {
        self.insert(Entry::Downloader(Arc::new(downloader)))
    }

    fn lookup(&self, handle: RawHandle, wanted: HandleKind) -> Result<&Entry, HandleError> {
        let entry = self
            .entries
            .get(&handle.0)
            .ok_or(HandleError::NotLive(handle))?;
        if entry.kind() != wanted {
            return Err(HandleError::KindMismatch {
                handle,
                wanted,
                actual: entry.kind(),
            });
        }
        Ok(entry)
    }

    pub(crate) fn session(&self, handle: RawHandle) -> Result<Arc<Mutex<Session>>, HandleError> {
        match self.lookup(handle, HandleKind::Session)? {
            Entry::Session(s) => Ok(Arc::clone(s)),
            Entry::Downloader(_) => unreachable!("lookup is kind-checked"),
        }
    }

    pub(crate) fn downloader(&self, handle: RawHandle) -> Result<Arc<Downloader>, HandleError> {
        match self.lookup(handle, HandleKind::Downloader)? {
            Entry::Downloader(d) => Ok(Arc::clone(d)),
            Entry::Session(_) => unreachable!("lookup is kind-checked"),
        }
    }

    fn release(&mut self, handle: RawHandle, wanted: HandleKind) -> Result<Entry, HandleError> {
        // Kind-check before removal so a mismatched release doesn't
        // destroy a live entry of the other kind.
        self.lookup(handle, wanted)?;
        Ok(self
            .entries
            .remove(&handle.0)
            .expect("entry was just looked up"))
    }

    /// Removes the session and relinquishes ownership to the caller.
    pub(crate) fn release_session(
        &mut self,
        handle: RawHandle,
    ) -> Result<Arc<Mutex<Session>>, HandleError> {
        match self.release(handle, HandleKind::Session)? {
            Entry::Session(s) => Ok(s),
            Entry::Downloader(_) => unreachable!("release is kind-checked"),
        }
    }

    /// Removes the downloader and relinquishes ownership to the caller.
    pub(crate) fn release_downloader(
        &mut self,
        handle: RawHandle,
    ) -> Result<Arc<Downloader>, HandleError> {
        match self.release(handle, HandleKind::Downloader)? {
            Entry::Downloader(d) => Ok(d),
            Entry::Session(_) => unreachable!("release is kind-checked"),
        }
    }
}
