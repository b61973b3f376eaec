use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AllocError;

/// Class index used by [`BlockRef`] for large, individually tracked blocks.
const LARGE_CLASS: u8 = 0xFF;

/// Smallest pooled chunk size in bytes.
const MIN_CHUNK: usize = 8;

/// Allocator configuration.
#[derive(Debug, Clone)]
pub struct AllocConfig {
    /// Requests above this many bytes bypass the pools and are tracked
    /// individually.
    pub large_threshold: usize,
    /// Upper bound on chunks carved per pool. Exhaustion beyond this fails
    /// with `OutOfMemory` rather than wrapping around.
    pub max_chunks_per_pool: usize,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            large_threshold: 4096,
            max_chunks_per_pool: 1024,
        }
    }
}

/// Opaque handle to an allocation. Handles replace raw pointers: a stale or
/// foreign handle is a detectable error, never undefined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    class: u8,
    slot: u32,
}

/// Allocator usage statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub alloc_count: u64,
    pub free_count: u64,
    pub realloc_count: u64,
    pub oom_count: u32,
    pub double_free_count: u32,
    pub live_blocks: usize,
}

/// One fixed-size pool: a contiguous byte arena carved into chunks, with a
/// free-list stack and per-slot occupancy for O(1) liveness checks.
struct Pool {
    chunk_size: usize,
    max_chunks: usize,
    storage: Vec<u8>,
    live: Vec<bool>,
    logical: Vec<u32>,
    free: Vec<u32>,
}

impl Pool {
    fn new(chunk_size: usize, max_chunks: usize) -> Self {
        Self {
            chunk_size,
            max_chunks,
            storage: Vec::new(),
            live: Vec::new(),
            logical: Vec::new(),
            free: Vec::new(),
        }
    }

    fn alloc(&mut self, logical: usize) -> Option<u32> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.live.len() >= self.max_chunks {
                    return None;
                }
                let slot = self.live.len() as u32;
                self.storage.resize(self.storage.len() + self.chunk_size, 0);
                self.live.push(false);
                self.logical.push(0);
                slot
            }
        };
        self.live[slot as usize] = true;
        self.logical[slot as usize] = logical as u32;
        Some(slot)
    }

    fn free(&mut self, slot: u32) -> Result<(), AllocError> {
        let idx = slot as usize;
        if idx >= self.live.len() {
            return Err(AllocError::InvalidBlock);
        }
        if !self.live[idx] {
            return Err(AllocError::DoubleFree);
        }
        self.live[idx] = false;
        self.logical[idx] = 0;
        self.free.push(slot);
        Ok(())
    }

    fn is_live(&self, slot: u32) -> bool {
        self.live.get(slot as usize).copied().unwrap_or(false)
    }

    fn free_count(&self) -> usize {
        self.free.len() + (self.max_chunks - self.live.len())
    }

    fn span(&self, slot: u32) -> (usize, usize) {
        let start = slot as usize * self.chunk_size;
        let len = self.logical[slot as usize] as usize;
        (start, len)
    }
}

/// Pooled block allocator. Small requests round up to a power-of-two size
/// class served from a free list; large requests are tracked individually.
pub struct BlockAllocator {
    config: AllocConfig,
    pools: Vec<Pool>,
    large: HashMap<u32, Vec<u8>>,
    next_large: u32,
    stats: MemoryStats,
    #[cfg(debug_assertions)]
    labels: HashMap<BlockRef, &'static str>,
}

/// Mutex-guarded allocator handle for background work (asset decoding). The
/// tree, state, and event structures stay confined to the driver thread; only
/// the allocator is sharable.
pub type SharedAllocator = Arc<Mutex<BlockAllocator>>;

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new(AllocConfig::default())
    }
}

impl BlockAllocator {
    pub fn new(config: AllocConfig) -> Self {
        let mut pools = Vec::new();
        let mut size = MIN_CHUNK;
        while size <= config.large_threshold {
            pools.push(Pool::new(size, config.max_chunks_per_pool));
            size *= 2;
        }
        Self {
            config,
            pools,
            large: HashMap::new(),
            next_large: 1,
            stats: MemoryStats::default(),
            #[cfg(debug_assertions)]
            labels: HashMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedAllocator {
        Arc::new(Mutex::new(self))
    }

    /// Allocate `size` bytes at the given alignment (0 = default). Pooled
    /// chunks are power-of-two sized, so any alignment up to the chunk size
    /// is satisfied by construction.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<BlockRef, AllocError> {
        if align != 0 && !align.is_power_of_two() {
            return Err(AllocError::BadAlignment(align));
        }
        let effective = size.max(align).max(1);

        let block = if effective > self.config.large_threshold {
            let id = self.next_large;
            self.next_large = self.next_large.wrapping_add(1).max(1);
            self.large.insert(id, vec![0u8; size]);
            BlockRef {
                class: LARGE_CLASS,
                slot: id,
            }
        } else {
            let class = self.class_for(effective);
            let slot = self.pools[class].alloc(size).ok_or_else(|| {
                self.stats.oom_count += 1;
                AllocError::OutOfMemory { size }
            })?;
            BlockRef {
                class: class as u8,
                slot,
            }
        };

        self.stats.alloc_count += 1;
        self.stats.live_blocks += 1;
        self.stats.current_bytes += self.capacity_of(block);
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.current_bytes);
        Ok(block)
    }

    /// Allocate with a debug-build origin label for leak triage.
    pub fn alloc_labeled(
        &mut self,
        size: usize,
        align: usize,
        label: &'static str,
    ) -> Result<BlockRef, AllocError> {
        let block = self.alloc(size, align)?;
        #[cfg(debug_assertions)]
        self.labels.insert(block, label);
        #[cfg(not(debug_assertions))]
        let _ = label;
        Ok(block)
    }

    pub fn free(&mut self, block: BlockRef) -> Result<(), AllocError> {
        let capacity = self.capacity_of(block);
        let result = if block.class == LARGE_CLASS {
            if self.large.remove(&block.slot).is_some() {
                Ok(())
            } else {
                Err(AllocError::DoubleFree)
            }
        } else {
            match self.pools.get_mut(block.class as usize) {
                Some(pool) => pool.free(block.slot),
                None => Err(AllocError::InvalidBlock),
            }
        };

        match result {
            Ok(()) => {
                self.stats.free_count += 1;
                self.stats.live_blocks -= 1;
                self.stats.current_bytes -= capacity;
                #[cfg(debug_assertions)]
                self.labels.remove(&block);
                Ok(())
            }
            Err(AllocError::DoubleFree) => {
                self.stats.double_free_count += 1;
                Err(AllocError::DoubleFree)
            }
            Err(err) => Err(err),
        }
    }

    /// Resize a block, preserving `min(old, new)` bytes. Returns a new
    /// handle; the old one is freed and becomes invalid.
    pub fn realloc(&mut self, block: BlockRef, new_size: usize) -> Result<BlockRef, AllocError> {
        let old = self.bytes(block)?.to_vec();
        let new_block = self.alloc(new_size, 0)?;
        let keep = old.len().min(new_size);
        self.bytes_mut(new_block)?[..keep].copy_from_slice(&old[..keep]);
        self.free(block)?;
        self.stats.realloc_count += 1;
        // alloc+free above each bumped their counters; realloc is its own op.
        self.stats.alloc_count -= 1;
        self.stats.free_count -= 1;
        Ok(new_block)
    }

    pub fn bytes(&self, block: BlockRef) -> Result<&[u8], AllocError> {
        if block.class == LARGE_CLASS {
            return self
                .large
                .get(&block.slot)
                .map(|v| v.as_slice())
                .ok_or(AllocError::InvalidBlock);
        }
        let pool = self
            .pools
            .get(block.class as usize)
            .ok_or(AllocError::InvalidBlock)?;
        if !pool.is_live(block.slot) {
            return Err(AllocError::InvalidBlock);
        }
        let (start, len) = pool.span(block.slot);
        Ok(&pool.storage[start..start + len])
    }

    pub fn bytes_mut(&mut self, block: BlockRef) -> Result<&mut [u8], AllocError> {
        if block.class == LARGE_CLASS {
            return self
                .large
                .get_mut(&block.slot)
                .map(|v| v.as_mut_slice())
                .ok_or(AllocError::InvalidBlock);
        }
        let pool = self
            .pools
            .get_mut(block.class as usize)
            .ok_or(AllocError::InvalidBlock)?;
        if !pool.is_live(block.slot) {
            return Err(AllocError::InvalidBlock);
        }
        let (start, len) = pool.span(block.slot);
        Ok(&mut pool.storage[start..start + len])
    }

    /// O(1) liveness probe.
    pub fn is_live(&self, block: BlockRef) -> bool {
        if block.class == LARGE_CLASS {
            self.large.contains_key(&block.slot)
        } else {
            self.pools
                .get(block.class as usize)
                .map(|p| p.is_live(block.slot))
                .unwrap_or(false)
        }
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Blocks still live; nonzero at shutdown means a leak.
    pub fn live_blocks(&self) -> usize {
        self.stats.live_blocks
    }

    /// Remaining capacity of the pool serving `size`, in chunks.
    pub fn pool_free_count(&self, size: usize) -> usize {
        let class = self.class_for(size.max(1).min(self.config.large_threshold));
        self.pools[class].free_count()
    }

    fn class_for(&self, size: usize) -> usize {
        let rounded = size.next_power_of_two().max(MIN_CHUNK);
        (rounded.trailing_zeros() - MIN_CHUNK.trailing_zeros()) as usize
    }

    fn capacity_of(&self, block: BlockRef) -> usize {
        if block.class == LARGE_CLASS {
            self.large.get(&block.slot).map(|v| v.len()).unwrap_or(0)
        } else {
            self.pools
                .get(block.class as usize)
                .map(|p| p.chunk_size)
                .unwrap_or(0)
        }
    }
}
