use std::thread;

use bcache::{
    device::{MemDevice, TracingDevice},
    BlockCache, BlockId, CacheConfig, Result,
};
use once_cell::sync::OnceCell;

type Device = TracingDevice<MemDevice>;

const DEV: u32 = 1;
const THREADS: u32 = 4;
const ROUNDS: u32 = 200;
const BLOCKS: u32 = 64;

static CACHE: OnceCell<BlockCache<Device>> = OnceCell::new();

fn cache() -> &'static BlockCache<Device> {
    CACHE.get().expect("cache is not initialized")
}

fn init() -> Result<()> {
    let config = CacheConfig::default();
    let device = TracingDevice::new(MemDevice::new(config.block_size.get()), "mem0");
    let cache = config.build(device)?;
    // Only the first call installs a cache.
    let _ = CACHE.set(cache);
    Ok(())
}

/// Bump the counter kept in the first bytes of a block.
fn bump(blockno: u32) -> Result<u64> {
    let mut guard = cache().acquire(DEV, blockno)?;
    let count = u64::from_le_bytes(guard[..8].try_into().unwrap_or([0; 8])) + 1;
    guard[..8].copy_from_slice(&count.to_le_bytes());
    guard.persist()?;
    Ok(count)
}

fn main() -> Result<()> {
    init()?;

    // The superblock stays resident for the whole run.
    let superblock = cache().acquire(DEV, 0)?.pin();

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            thread::spawn(move || -> Result<()> {
                for round in 0..ROUNDS {
                    let blockno = 1 + (round * 7 + t * 13) % BLOCKS;
                    bump(blockno)?;
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    let total: u64 = (1..=BLOCKS)
        .map(|n| {
            let block = cache().device().inner().block(BlockId::new(DEV, n));
            block.map_or(0, |b| {
                u64::from_le_bytes(b[..8].try_into().unwrap_or([0; 8]))
            })
        })
        .sum();
    assert_eq!(total, u64::from(THREADS * ROUNDS));

    println!(
        "superblock {} is still resident: {}",
        superblock.id(),
        cache().is_resident(superblock.id())
    );
    drop(superblock);

    let stats = cache().stats();
    println!("{:#?}", stats);
    println!("hit rate: {:.1}%", stats.hit_rate() * 100.0);
    Ok(())
}
