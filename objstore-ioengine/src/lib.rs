//! This crate bridges a synchronous, poll-based I/O engine contract onto an
//! asynchronous, range-read object-storage API.
//!
//! The host engine drives the classic submit/reap cycle: queue a request,
//! later ask "are at least N requests done?", then retrieve completed
//! requests one at a time. The storage side completes range reads from its
//! own background execution and reports them through callbacks. The bridge
//! between the two worlds is a per-worker [`Session`] that owns a bounded
//! completion channel sized to the configured queue depth, a kind-checked
//! handle table that lets opaque integers stand in for live sessions and
//! downloaders across a call boundary, and the reaping algorithm that turns
//! "block until `min`, drain up to `max`" polling into channel receives.
//!
//! # Usage
//!
//! 1. Build an [`Engine`] with a storage-client connector.
//! 2. `init` a session per worker thread, `open` a downloader per
//!    `"bucket/object"` name.
//! 3. `queue` range reads, then alternate `getevents` / `event` to reap them.
//! 4. `close` downloaders and `cleanup` the session when the worker exits.
//!
//! Handles returned by `init` and `open` are plain non-zero integers, so a
//! foreign-function shim can store them in the host engine's `void*` slots
//! without any pointer-as-integer tricks.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use object_store::ObjectStore;
//! use objstore_ioengine::storage::backend::{BucketResolver, ObjectStoreClient};
//! use objstore_ioengine::storage::StorageClient;
//! use objstore_ioengine::{Direction, Engine, IoBuffer};
//!
//! // An in-memory store seeded with one 8 KiB object.
//! let store = Arc::new(object_store::memory::InMemory::new());
//! tokio::runtime::Runtime::new().unwrap().block_on(async {
//!     let payload = bytes::Bytes::from(vec![7u8; 8192]);
//!     store
//!         .put(&object_store::path::Path::from("obj.bin"), payload.into())
//!         .await
//!         .unwrap();
//! });
//!
//! let engine = Engine::new(Box::new(move |retry| {
//!     let store = Arc::clone(&store);
//!     let resolver: BucketResolver = Box::new(move |_bucket| Ok(store.clone()));
//!     let client: Arc<dyn StorageClient> = Arc::new(ObjectStoreClient::new(resolver, retry)?);
//!     Ok(client)
//! }));
//!
//! let session = engine.init(4);
//! assert!(session.is_valid());
//! let downloader = engine.open(session, "bucket1/obj.bin");
//! assert!(downloader.is_valid());
//!
//! let mut data = vec![0u8; 4096];
//! // SAFETY: `data` outlives the request; we don't touch it until reaped.
//! let buf = unsafe { IoBuffer::from_raw_parts(data.as_mut_ptr(), data.len()) };
//! assert_eq!(engine.queue(session, downloader, 1, 0, buf, Direction::Read), 0);
//!
//! assert_eq!(engine.getevents(session, 1, 1), 1);
//! let event = engine.event(session);
//! assert_eq!((event.token, event.code), (1, 0));
//! assert_eq!(&data[..], &[7u8; 4096][..]);
//!
//! assert_eq!(engine.close(downloader), 0);
//! engine.cleanup(session);
//! ```
//!
//! # Logging
//!
//! The library logs through [`tracing`] and never installs a subscriber;
//! that is process-wide state and belongs to the embedding binary.

mod bridge;
pub mod engine;
pub mod storage;

pub use bridge::buffer::IoBuffer;
pub use bridge::downloader::Downloader;
pub use bridge::handle_table::RawHandle;
pub use bridge::session::{CompletionRecord, CompletionSink, OpenError, ReapError, Session};
pub use engine::{Direction, Engine, Event};

#[doc(hidden)]
pub mod env_tunables {
    /// Per-request attempt ceiling for the retry loop in
    /// [`crate::storage::backend`].
    pub(crate) static RETRY_ATTEMPTS: once_cell::sync::Lazy<u32> =
        once_cell::sync::Lazy::new(|| {
            std::env::var("OBJSTORE_IOENGINE_RETRY_ATTEMPTS")
                .map(|v| {
                    v.parse()
                        .expect("OBJSTORE_IOENGINE_RETRY_ATTEMPTS must be an integer")
                })
                .unwrap_or(3)
        });
    pub(crate) static RETRY_BACKOFF_MS: once_cell::sync::Lazy<u64> =
        once_cell::sync::Lazy::new(|| {
            std::env::var("OBJSTORE_IOENGINE_RETRY_BACKOFF_MS")
                .map(|v| {
                    v.parse()
                        .expect("OBJSTORE_IOENGINE_RETRY_BACKOFF_MS must be an integer")
                })
                .unwrap_or(50)
        });
}
