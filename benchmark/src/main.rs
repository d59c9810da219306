//! Random-range read benchmark for the poll-based engine surface.
//!
//! Seeds an in-memory object store, then runs the host engine's
//! submit/reap cycle at a fixed queue depth and reports per-request
//! latency percentiles as JSON.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use objstore_ioengine::storage::backend::{BucketResolver, ObjectStoreClient};
use objstore_ioengine::storage::StorageClient;
use objstore_ioengine::{Direction, Engine, IoBuffer};
use rand::Rng;
use tracing::info;

#[derive(serde::Serialize, clap::Parser, Clone)]
struct Args {
    #[clap(long, default_value = "4")]
    iodepth: u32,
    /// Block size is `1 << block_size_shift` bytes.
    #[clap(long, default_value = "12")]
    block_size_shift: u32,
    #[clap(long, default_value = "8")]
    object_size_mib: NonZeroU64,
    #[clap(long, default_value = "100000")]
    reads: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let block_size = 1usize << args.block_size_shift;
    let object_size = args.object_size_mib.get() as usize * 1024 * 1024;
    let iodepth = args.iodepth as usize;
    assert!(iodepth >= 1);
    assert!(object_size >= block_size);

    info!(object_size, "seeding in-memory store");
    let store = Arc::new(InMemory::new());
    {
        let mut data = vec![0u8; object_size];
        rand::thread_rng().fill(&mut data[..]);
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                store
                    .put(&Path::from("bench.bin"), bytes::Bytes::from(data).into())
                    .await
                    .unwrap();
            });
    }

    let engine = Engine::new(Box::new(move |retry| {
        let store = Arc::clone(&store);
        let resolver: BucketResolver = Box::new(move |_bucket| Ok(store.clone()));
        let client: Arc<dyn StorageClient> = Arc::new(ObjectStoreClient::new(resolver, retry)?);
        Ok(client)
    }));

    let session = engine.init(args.iodepth);
    assert!(session.is_valid(), "init failed");
    let downloader = engine.open(session, "bench/bench.bin");
    assert!(downloader.is_valid(), "open failed");

    let mut slots: Vec<Vec<u8>> = (0..iodepth).map(|_| vec![0u8; block_size]).collect();
    let mut free_slots: Vec<usize> = (0..iodepth).collect();
    let mut slot_of_token: HashMap<u64, usize> = HashMap::with_capacity(iodepth);
    let mut issued_at: HashMap<u64, Instant> = HashMap::with_capacity(iodepth);
    let mut latencies_us =
        hdrhistogram::Histogram::<u64>::new_with_bounds(1, 10_000_000, 3).unwrap();

    let max_offset = (object_size - block_size) as u64;
    let mut rng = rand::thread_rng();
    let mut issued = 0u64;
    let mut completed = 0u64;
    let mut failed = 0u64;

    info!(iodepth = args.iodepth, reads = args.reads, "starting");
    let start = Instant::now();
    while completed < args.reads {
        while issued < args.reads && !free_slots.is_empty() {
            let slot = free_slots.pop().unwrap();
            let token = issued;
            let offset = rng.gen_range(0..=max_offset) & !(block_size as u64 - 1);
            let backing = &mut slots[slot];
            // SAFETY: the slot is not reused until this token is reaped.
            let buf = unsafe { IoBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
            slot_of_token.insert(token, slot);
            issued_at.insert(token, Instant::now());
            assert_eq!(
                engine.queue(session, downloader, token, offset, buf, Direction::Read),
                0
            );
            issued += 1;
        }

        let reaped = engine.getevents(session, 1, args.iodepth);
        assert!(reaped >= 1);
        for _ in 0..reaped {
            let event = engine.event(session);
            if event.code != 0 {
                failed += 1;
            }
            let elapsed = issued_at.remove(&event.token).unwrap().elapsed();
            latencies_us.record(elapsed.as_micros() as u64).unwrap();
            free_slots.push(slot_of_token.remove(&event.token).unwrap());
            completed += 1;
        }
    }
    let elapsed = start.elapsed();

    assert_eq!(engine.close(downloader), 0);
    engine.cleanup(session);

    let output = serde_json::json!({
        "args": args,
        "elapsed_secs": elapsed.as_secs_f64(),
        "iops": completed as f64 / elapsed.as_secs_f64(),
        "failed": failed,
        "latency_us": {
            "p50": latencies_us.value_at_quantile(0.50),
            "p90": latencies_us.value_at_quantile(0.90),
            "p99": latencies_us.value_at_quantile(0.99),
            "max": latencies_us.max(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}
