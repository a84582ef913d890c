//! Partitioned Block Cache
//!
//! ## Locking
//!
//! Two tiers of locks protect the cache:
//!
//! 1. Every partition has a *structural lock* guarding its recency list and the
//! bookkeeping of the slots on it (block key, reference count, generation). These
//! are only held for a short scan and never across blocking operations.
//! 2. Every slot has a *content lock* guarding its bytes and validity. It is
//! acquired only after the structural lock has been dropped, and device I/O
//! happens only while it is held.
//!
//! A block always lives in its home partition, `blockno % partitions`. When the
//! home partition has no unreferenced slot, one is stolen from the next partition
//! (cyclically) that has one. At most one structural lock is held at any time, so
//! concurrent steals cannot deadlock.

use std::{
    fmt::{self, Debug},
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
};

use cache_padded::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::{
    config::CacheConfig,
    device::BlockDevice,
    types::{BlockId, SlotId},
    util::{SleepLock, SleepLockGuard},
    ErrorKind, Result,
};

use self::partition::{Entry, Partition};

mod partition;

/// A concurrent cache of device blocks with a fixed number of slots.
///
/// Blocks are accessed through [BlockGuard]s, which hold the block's content lock.
/// Only one guard for a given block exists at a time; other callers block in
/// [acquire](BlockCache::acquire) until it is released. As with any mutex, a thread
/// that acquires a block it already holds will deadlock.
///
/// ## Writes
///
/// Modifying a guard's bytes only changes the cached copy. Call
/// [persist](BlockGuard::persist) to write it to the device. Once the last
/// reference to a slot is released the slot may be reused for another block at any
/// time, and unpersisted changes are discarded without being written back.
///
/// ## Exhaustion
///
/// Every acquired or pinned block occupies a slot. Acquiring a new block while
/// every slot is referenced is a fatal error and panics.
pub struct BlockCache<D> {
    slots: Box<[Slot]>,
    partitions: Box<[CachePadded<Mutex<Partition>>]>,
    block_size: usize,
    device: D,
    stats: Stats,
}

struct Slot {
    contents: SleepLock<Contents>,
}

struct Contents {
    /// The slot generation `valid` and `data` belong to.
    generation: u64,
    valid: bool,
    data: Box<[u8]>,
}

impl<D> BlockCache<D>
where
    D: BlockDevice,
{
    /// Create a cache with every slot in the first partition. Prefer
    /// [CacheConfig::build], which checks the device block size.
    pub fn new(config: CacheConfig, device: D) -> Self {
        let block_size = config.block_size.get();

        let slots = (0..config.slots.get())
            .map(|_| Slot {
                contents: SleepLock::new(
                    Contents {
                        generation: 0,
                        valid: false,
                        data: vec![0; block_size].into_boxed_slice(),
                    },
                    "block",
                ),
            })
            .collect();

        let partitions: Box<[_]> = (0..config.partitions.get())
            .map(|_| CachePadded::new(Mutex::new(Partition::default())))
            .collect();

        {
            let mut first = partitions[0].lock();
            for i in 0..config.slots.get() {
                first.push_back(Entry::new(SlotId::new(i)));
            }
        }

        debug!(
            "block cache: {} slots of {} bytes in {} partitions",
            config.slots, block_size, config.partitions
        );

        Self {
            slots,
            partitions,
            block_size,
            device,
            stats: Stats::default(),
        }
    }

    /// Get the contents of block `blockno` on device `dev`, locked for exclusive
    /// use. The block is read from the device unless a valid copy is cached.
    ///
    /// # Panics
    /// If the block is not cached and every slot is referenced.
    pub fn acquire(&self, dev: u32, blockno: u32) -> Result<BlockGuard<'_, D>> {
        let id = BlockId::new(dev, blockno);
        let mut guard = self.get(id);

        if !guard.contents.valid {
            // On error the guard is dropped, releasing the slot with `valid` unset.
            self.device.read_block(id, &mut guard.contents.data)?;
            guard.contents.valid = true;
            self.stats.reads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(guard)
    }

    /// Keep `id` resident without locking it. Fails with
    /// [ErrorKind::NotResident] if no slot holds the block.
    pub fn pin(&self, id: BlockId) -> Result<()> {
        let mut part = self.partition(id);
        let entry = part.find(id).ok_or(ErrorKind::NotResident)?;
        entry.refs += 1;
        Ok(())
    }

    /// Undo one [pin](BlockCache::pin).
    ///
    /// # Panics
    /// If the block is not resident or is not referenced.
    pub fn unpin(&self, id: BlockId) {
        let mut part = self.partition(id);
        let entry = match part.find(id) {
            Some(entry) => entry,
            None => panic!("unpin: block {} is not resident", id),
        };
        assert!(entry.refs > 0, "unpin: reference count underflow");
        entry.refs -= 1;
    }

    /// The number of holders of `id`, or `None` if it is not cached.
    pub fn references(&self, id: BlockId) -> Option<usize> {
        self.partition(id).find(id).map(|e| e.refs)
    }

    pub fn is_resident(&self, id: BlockId) -> bool {
        self.partition(id).find(id).is_some()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Find or allocate the slot for `id` and lock it, without any device I/O.
    fn get(&self, id: BlockId) -> BlockGuard<'_, D> {
        let home = self.home(id);
        let mut part = self.partitions[home].lock();

        if let Some(entry) = part.find(id) {
            entry.refs += 1;
            let (slot, generation) = (entry.slot, entry.generation);
            drop(part);

            trace!("acquire {}: hit slot {}", id, slot.index());
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return self.lock_slot(id, slot, generation);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        if let Some(pos) = part.victim() {
            let entry = part.get_mut(pos);
            self.debug_check_victim(entry);
            entry.claim(id);
            let (slot, generation) = (entry.slot, entry.generation);
            drop(part);

            debug!("acquire {}: reusing slot {}", id, slot.index());
            return self.lock_slot(id, slot, generation);
        }
        drop(part);

        let (slot, generation) = self.steal(id, home);
        self.lock_slot(id, slot, generation)
    }

    /// Move an unreferenced slot from another partition into `home` and claim it
    /// for `id`. Partitions are visited once each, in order, starting after `home`.
    fn steal(&self, id: BlockId, home: usize) -> (SlotId, u64) {
        let count = self.partitions.len();

        for offset in 1..count {
            let from = (home + offset) % count;

            let stolen = {
                let mut part = self.partitions[from].lock();
                part.victim().map(|pos| part.remove(pos))
            };
            let Some(mut entry) = stolen else {
                continue;
            };
            self.debug_check_victim(&entry);

            let mut part = self.partitions[home].lock();

            // The home lock was dropped while scanning, so another caller may have
            // cached the block in the meantime.
            if let Some(existing) = part.find(id) {
                existing.refs += 1;
                let found = (existing.slot, existing.generation);
                entry.key = None;
                part.push_back(entry);
                drop(part);

                trace!("acquire {}: hit slot {} after race", id, found.0.index());
                self.stats.late_hit();
                return found;
            }

            entry.claim(id);
            let claimed = (entry.slot, entry.generation);
            part.push_front(entry);
            drop(part);

            self.stats.steals.fetch_add(1, Ordering::Relaxed);
            debug!(
                "acquire {}: stole slot {} from partition {} into {}",
                id,
                claimed.0.index(),
                from,
                home
            );
            return claimed;
        }

        // Slots may have been released at home while the others were scanned.
        let mut part = self.partitions[home].lock();
        if let Some(entry) = part.find(id) {
            entry.refs += 1;
            let found = (entry.slot, entry.generation);
            drop(part);

            trace!("acquire {}: hit slot {} after scan", id, found.0.index());
            self.stats.late_hit();
            return found;
        }
        if let Some(pos) = part.victim() {
            let entry = part.get_mut(pos);
            self.debug_check_victim(entry);
            entry.claim(id);
            let claimed = (entry.slot, entry.generation);
            drop(part);

            debug!("acquire {}: reusing slot {} after scan", id, claimed.0.index());
            return claimed;
        }
        drop(part);

        panic!("acquire {}: no free slots", id);
    }

    fn lock_slot(&self, id: BlockId, slot: SlotId, generation: u64) -> BlockGuard<'_, D> {
        // Take the reference first so it is released if locking unwinds.
        let reference = Reference {
            cache: self,
            id,
            slot,
        };
        let mut contents = self.slots[slot.index()].contents.lock();

        // A newer generation means the slot was handed to a new block since these
        // contents were loaded.
        if contents.generation != generation {
            contents.generation = generation;
            contents.valid = false;
        }

        BlockGuard {
            contents,
            reference,
        }
    }

    /// Drop one holder's reference to `slot`. The last one moves the slot to the
    /// most recently used end of its partition.
    fn release_slot(&self, id: BlockId, slot: SlotId) {
        let mut part = self.partition(id);
        let entry = part
            .find_slot(slot)
            .expect("released slot is not in its home partition");
        assert!(entry.refs > 0, "release: reference count underflow");
        entry.refs -= 1;
        if entry.refs == 0 {
            part.touch(slot);
        }
    }

    fn unpin_slot(&self, id: BlockId, slot: SlotId) {
        let mut part = self.partition(id);
        let entry = part
            .find_slot(slot)
            .expect("pinned slot is not in its home partition");
        assert!(entry.refs > 0, "unpin: reference count underflow");
        entry.refs -= 1;
    }

    fn pin_slot(&self, id: BlockId, slot: SlotId) {
        let mut part = self.partition(id);
        let entry = part
            .find_slot(slot)
            .expect("held slot is not in its home partition");
        entry.refs += 1;
    }

    fn debug_check_victim(&self, entry: &Entry) {
        // Unreferenced slots are never locked: guards unlock before releasing.
        debug_assert!(!self.slots[entry.slot.index()].contents.is_locked());
    }

    #[inline]
    fn home(&self, id: BlockId) -> usize {
        id.blockno as usize % self.partitions.len()
    }

    fn partition(&self, id: BlockId) -> MutexGuard<'_, Partition> {
        self.partitions[self.home(id)].lock()
    }
}

impl<D> Debug for BlockCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("slots", &self.slots.len())
            .field("partitions", &self.partitions.len())
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a cached block.
///
/// Dropping the guard releases the block, as does [release](BlockGuard::release).
pub struct BlockGuard<'a, D>
where
    D: BlockDevice,
{
    // Field order matters: the content lock is dropped before the reference.
    contents: SleepLockGuard<'a, Contents>,
    reference: Reference<'a, D>,
}

impl<'a, D> BlockGuard<'a, D>
where
    D: BlockDevice,
{
    pub fn id(&self) -> BlockId {
        self.reference.id
    }

    pub fn slot(&self) -> SlotId {
        self.reference.slot
    }

    /// Write the cached contents through to the device.
    pub fn persist(&self) -> Result<()> {
        // Guards never leave their thread, so this only fails if holder
        // tracking itself is broken.
        assert!(
            self.contents.lock().holding(),
            "persist: content lock not held"
        );
        let cache = self.reference.cache;
        cache.device.write_block(self.id(), &self.contents.data)?;
        cache.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Unlock the block and drop this holder's reference to it.
    pub fn release(self) {
        // Guards never leave their thread, so this only fails if holder
        // tracking itself is broken.
        assert!(
            self.contents.lock().holding(),
            "release: content lock not held"
        );
        drop(self);
    }

    /// Keep the block resident after this guard is released, until the returned
    /// handle is dropped.
    pub fn pin(&self) -> Pinned<'a, D> {
        let (cache, id, slot) = (self.reference.cache, self.id(), self.slot());
        cache.pin_slot(id, slot);
        Pinned { cache, id, slot }
    }
}

impl<'a, D> Deref for BlockGuard<'a, D>
where
    D: BlockDevice,
{
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.contents.data
    }
}

impl<'a, D> DerefMut for BlockGuard<'a, D>
where
    D: BlockDevice,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.contents.data
    }
}

impl<'a, D> Debug for BlockGuard<'a, D>
where
    D: BlockDevice,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGuard")
            .field("id", &self.id())
            .field("slot", &self.slot())
            .finish_non_exhaustive()
    }
}

/// One counted reference to a slot, held by a [BlockGuard].
struct Reference<'a, D>
where
    D: BlockDevice,
{
    cache: &'a BlockCache<D>,
    id: BlockId,
    slot: SlotId,
}

impl<'a, D> Drop for Reference<'a, D>
where
    D: BlockDevice,
{
    fn drop(&mut self) {
        self.cache.release_slot(self.id, self.slot);
    }
}

/// A block kept resident without being locked. Dropping the handle unpins it.
pub struct Pinned<'a, D>
where
    D: BlockDevice,
{
    cache: &'a BlockCache<D>,
    id: BlockId,
    slot: SlotId,
}

impl<'a, D> Pinned<'a, D>
where
    D: BlockDevice,
{
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Lock the pinned block. It is still resident, so this never evicts.
    pub fn acquire(&self) -> Result<BlockGuard<'a, D>> {
        self.cache.acquire(self.id.dev, self.id.blockno)
    }
}

impl<'a, D> Drop for Pinned<'a, D>
where
    D: BlockDevice,
{
    fn drop(&mut self) {
        self.cache.unpin_slot(self.id, self.slot);
    }
}

impl<'a, D> Debug for Pinned<'a, D>
where
    D: BlockDevice,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pinned")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .finish()
    }
}

#[derive(Debug, Default)]
struct Stats {
    hits: AtomicU64,
    misses: AtomicU64,
    steals: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Stats {
    /// A lookup counted as a miss found the block after all.
    fn late_hit(&self) {
        self.misses.fetch_sub(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// Counters collected since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found the block already cached.
    pub hits: u64,
    /// Lookups that had to claim a slot for the block.
    pub misses: u64,
    /// Misses served by moving a slot from another partition.
    pub steals: u64,
    /// Blocks read from the device.
    pub reads: u64,
    /// Blocks written to the device.
    pub writes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
