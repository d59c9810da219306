//! Production [`StorageClient`] over the `object_store` crate.
//!
//! The client owns a small tokio runtime; that runtime is "the storage
//! client's own background execution" from the bridge's point of view.
//! Range reads are spawned onto it, and completion delivery happens from
//! its tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, info, warn};

use crate::bridge::buffer::IoBuffer;
use crate::bridge::session::CompletionSink;
use crate::env_tunables::{RETRY_ATTEMPTS, RETRY_BACKOFF_MS};

use super::{RangeReader, RetryPredicate, StorageClient, StorageError};

/// Maps a bucket name to a store rooted at that bucket.
///
/// `object_store` instances are constructed per bucket URL, so the caller
/// decides how names resolve: a cloud builder in production, a shared
/// in-memory store in tests. Resolutions are cached per client.
pub type BucketResolver =
    Box<dyn Fn(&str) -> Result<Arc<dyn ObjectStore>, StorageError> + Send + Sync>;

pub struct ObjectStoreClient {
    resolver: BucketResolver,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    runtime: tokio::runtime::Runtime,
    retry: RetryPredicate,
}

impl ObjectStoreClient {
    pub fn new(resolver: BucketResolver, retry: RetryPredicate) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("objstore-client")
            .enable_all()
            .build()
            .map_err(|e| StorageError::Connect(e.to_string()))?;
        info!("storage client runtime started");
        Ok(ObjectStoreClient {
            resolver,
            stores: Mutex::new(HashMap::new()),
            runtime,
            retry,
        })
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut stores = self.stores.lock().unwrap();
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }
        let store = (self.resolver)(bucket)?;
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }
}

impl StorageClient for ObjectStoreClient {
    fn open_reader(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<Arc<dyn RangeReader>, StorageError> {
        let store = self.store_for(bucket)?;
        let location = Path::from(object);
        // Verify the object exists up front, so open fails here instead of
        // every queued read failing later.
        let meta = self
            .runtime
            .block_on(store.head(&location))
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => StorageError::NotFound {
                    bucket: bucket.to_string(),
                    object: object.to_string(),
                },
                other => StorageError::Backend(other),
            })?;
        debug!(bucket, object, size = meta.size, "opened range reader");
        Ok(Arc::new(ObjectStoreReader {
            location,
            size: meta.size as u64,
            store,
            runtime: self.runtime.handle().clone(),
            retry: Arc::clone(&self.retry),
        }))
    }
}

struct ObjectStoreReader {
    location: Path,
    size: u64,
    store: Arc<dyn ObjectStore>,
    runtime: tokio::runtime::Handle,
    retry: RetryPredicate,
}

impl RangeReader for ObjectStoreReader {
    fn submit_range(&self, offset: u64, buffer: IoBuffer, sink: CompletionSink) {
        let store = Arc::clone(&self.store);
        let location = self.location.clone();
        let size = self.size;
        let retry = Arc::clone(&self.retry);
        self.runtime.spawn(async move {
            let mut buffer = buffer;
            let result = match read_range(&*store, &location, size, offset, buffer.len(), &retry)
                .await
            {
                Ok(bytes) => Ok(buffer.copy_from(&bytes)),
                Err(err) => Err(err),
            };
            sink.deliver(result).await;
        });
    }

    fn close(&self) -> Result<(), StorageError> {
        // The reader holds no connection state of its own; the runtime and
        // store belong to the client.
        Ok(())
    }
}

async fn read_range(
    store: &dyn ObjectStore,
    location: &Path,
    size: u64,
    offset: u64,
    length: usize,
    retry: &RetryPredicate,
) -> Result<bytes::Bytes, StorageError> {
    if offset >= size {
        return Err(StorageError::OutOfRange { offset, size });
    }
    // Reads past end-of-object are clamped; the record carries the bytes
    // actually filled.
    let start = offset as usize;
    let end = std::cmp::min(offset + length as u64, size) as usize;

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match store.get_range(location, start..end).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                let err = StorageError::Backend(e);
                if attempt >= *RETRY_ATTEMPTS || !retry(&err) {
                    return Err(err);
                }
                warn!(
                    %location,
                    offset,
                    attempt,
                    error = %err,
                    "range read failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(*RETRY_BACKOFF_MS * attempt as u64))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use object_store::memory::InMemory;
    use object_store::path::Path;
    use object_store::ObjectStore;

    use crate::storage::{default_retry_predicate, StorageClient, StorageError};
    use crate::{CompletionRecord, IoBuffer, Session};

    use super::{BucketResolver, ObjectStoreClient};

    fn seeded_store(name: &str, contents: Vec<u8>) -> Arc<InMemory> {
        let store = Arc::new(InMemory::new());
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            store
                .put(&Path::from(name), bytes::Bytes::from(contents).into())
                .await
                .unwrap();
        });
        store
    }

    fn client_for(store: Arc<InMemory>) -> ObjectStoreClient {
        let resolver: BucketResolver = Box::new(move |_bucket| Ok(store.clone()));
        ObjectStoreClient::new(resolver, default_retry_predicate()).unwrap()
    }

    #[test]
    fn open_missing_object_fails_before_any_read() {
        let client = client_for(seeded_store("obj.bin", vec![0u8; 64]));
        assert!(matches!(
            client.open_reader("bucket1", "nope.bin"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn range_read_fills_buffer_through_session_channel() {
        let data: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        let client = Arc::new(client_for(seeded_store("obj.bin", data.clone())));
        let mut session = Session::new(2, client);
        let downloader = session.open("bucket1/obj.bin").unwrap();

        let mut backing = vec![0u8; 4096];
        let buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        downloader.queue(4096, buf, session.sink(7));

        assert_eq!(session.await_completions(1, 2), 1);
        let CompletionRecord { token, result } = session.next_event().unwrap();
        assert_eq!(token, 7);
        assert_eq!(result.unwrap(), 4096);
        assert_eq!(backing, data[4096..8192]);
    }

    #[test]
    fn read_past_end_is_clamped() {
        let client = Arc::new(client_for(seeded_store("obj.bin", vec![3u8; 100])));
        let mut session = Session::new(1, client);
        let downloader = session.open("bucket1/obj.bin").unwrap();

        let mut backing = vec![0u8; 64];
        let buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        downloader.queue(80, buf, session.sink(1));

        session.await_completions(1, 1);
        let record = session.next_event().unwrap();
        assert_eq!(record.result.unwrap(), 20);
        assert_eq!(&backing[..20], &[3u8; 20][..]);
    }

    #[test]
    fn read_beyond_object_end_surfaces_an_error_record() {
        let client = Arc::new(client_for(seeded_store("obj.bin", vec![0u8; 100])));
        let mut session = Session::new(1, client);
        let downloader = session.open("bucket1/obj.bin").unwrap();

        let mut backing = vec![0u8; 64];
        let buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        downloader.queue(4096, buf, session.sink(9));

        session.await_completions(1, 1);
        let record = session.next_event().unwrap();
        assert_eq!(record.token, 9);
        assert!(matches!(
            record.result,
            Err(StorageError::OutOfRange { offset: 4096, .. })
        ));
    }

    #[test]
    fn resolver_failure_fails_open() {
        let resolver: BucketResolver = Box::new(|bucket| {
            Err(StorageError::Connect(format!("no such bucket {bucket}")))
        });
        let client = ObjectStoreClient::new(resolver, default_retry_predicate()).unwrap();
        assert!(client.open_reader("ghost", "obj").is_err());
    }
}
