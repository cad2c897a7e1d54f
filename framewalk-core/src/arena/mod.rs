//! Buffer arena.
//!
//! Sub-allocates byte ranges from coarse memory blocks. A range is handed
//! out as `BytesMut` for filling and is usually frozen into `Bytes`, whose
//! clones are cheap shared views onto the same block. The block stays alive
//! until the last view is dropped (the reference count is atomic, so views
//! may be dropped on any thread).
//!
//! There is no compaction: space inside a block is never reused piecemeal.
//! When the current block runs out, it is retired; retired blocks whose
//! views are all gone are rewound and parked on a size-sorted free list for
//! whole-block reuse.

mod block;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::ArenaError;
use block::Block;

/// Default block size (10 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 10 * 1024;

/// Default total byte budget (256 MiB).
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

/// Configuration for a [`Arena`].
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Capacity of a freshly allocated block, unless a request is larger.
    pub block_size: usize,
    /// Upper bound on bytes held by live, retired, and free blocks.
    pub max_bytes: usize,
    /// Number of rewound blocks kept for reuse.
    pub max_free_blocks: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            max_free_blocks: 16,
        }
    }
}

/// Arena counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of range allocations served
    pub allocations: u64,
    /// Bytes handed out across all allocations
    pub bytes_allocated: u64,
    /// Blocks obtained from the system allocator
    pub blocks_created: u64,
    /// Blocks taken back off the free list
    pub blocks_reused: u64,
    /// Blocks returned to the system allocator
    pub blocks_released: u64,
}

/// Block-based sub-allocator.
///
/// Single-threaded: allocation takes `&mut self`. The views it hands out
/// are `Send + Sync`.
#[derive(Debug)]
pub struct Arena {
    config: ArenaConfig,
    current: Block,
    /// Blocks that still have outstanding views.
    retired: Vec<Block>,
    /// Rewound blocks, ascending by capacity.
    free: Vec<Block>,
    reserved: usize,
    next_block_id: u64,
    stats: ArenaStats,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            current: Block::new(0, 0),
            retired: Vec::new(),
            free: Vec::new(),
            reserved: 0,
            next_block_id: 0,
            stats: ArenaStats::default(),
        }
    }

    /// Allocate `size` zeroed bytes.
    ///
    /// Fails only when a new block would push the arena past its byte
    /// budget.
    pub fn allocate(&mut self, size: usize) -> Result<BytesMut, ArenaError> {
        if size == 0 {
            return Ok(BytesMut::new());
        }

        if self.current.remaining() < size {
            let fresh = self.acquire_block(size)?;
            let old = std::mem::replace(&mut self.current, fresh);
            if old.capacity() > 0 {
                trace!(block = old.id(), "retiring arena block");
                self.retired.push(old);
            }
        }

        self.stats.allocations += 1;
        self.stats.bytes_allocated += size as u64;
        Ok(self.current.carve(size))
    }

    /// Allocate a range and fill it with `data`, returning a frozen view.
    pub fn copy_from(&mut self, data: &[u8]) -> Result<Bytes, ArenaError> {
        let mut buf = self.allocate(data.len())?;
        buf.copy_from_slice(data);
        Ok(buf.freeze())
    }

    /// Rewind retired blocks whose views have all been dropped.
    ///
    /// Returns the number of blocks that became reusable (or were released
    /// because the free list was full).
    pub fn collect(&mut self) -> usize {
        let mut reclaimed = 0;
        let mut i = 0;
        while i < self.retired.len() {
            if self.retired[i].try_rewind() {
                let block = self.retired.swap_remove(i);
                self.park(block);
                reclaimed += 1;
            } else {
                i += 1;
            }
        }
        reclaimed
    }

    /// Bytes currently held in blocks (live, retired, or free).
    pub fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    /// Number of retired blocks still referenced by views.
    pub fn retired_blocks(&self) -> usize {
        self.retired.len()
    }

    /// Number of rewound blocks waiting for reuse.
    pub fn free_blocks(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    fn acquire_block(&mut self, size: usize) -> Result<Block, ArenaError> {
        self.collect();

        // Smallest free block that fits.
        if let Some(pos) = self.free.iter().position(|b| b.capacity() >= size) {
            self.stats.blocks_reused += 1;
            return Ok(self.free.remove(pos));
        }

        let capacity = size.max(self.config.block_size);
        if self.reserved + capacity > self.config.max_bytes {
            // Free blocks are too small for this request; give their bytes
            // back before deciding.
            while let Some(block) = self.free.pop() {
                self.release(block);
            }
            if self.reserved + capacity > self.config.max_bytes {
                return Err(ArenaError::Exhausted {
                    requested: size,
                    in_use: self.reserved,
                    limit: self.config.max_bytes,
                });
            }
        }

        self.next_block_id += 1;
        let block = Block::new(self.next_block_id, capacity);
        self.reserved += block.capacity();
        self.stats.blocks_created += 1;
        debug!(
            block = block.id(),
            capacity = block.capacity(),
            reserved = self.reserved,
            "allocated arena block"
        );
        Ok(block)
    }

    fn park(&mut self, block: Block) {
        if self.free.len() >= self.config.max_free_blocks {
            self.release(block);
            return;
        }
        let pos = self
            .free
            .partition_point(|b| b.capacity() <= block.capacity());
        self.free.insert(pos, block);
    }

    fn release(&mut self, block: Block) {
        self.reserved -= block.capacity();
        self.stats.blocks_released += 1;
        trace!(block = block.id(), "released arena block");
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> Arena {
        Arena::new(ArenaConfig {
            block_size: 64,
            max_bytes: 1024,
            max_free_blocks: 4,
        })
    }

    #[test]
    fn test_allocate_zeroed() {
        let mut arena = small_arena();
        let buf = arena.allocate(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(arena.stats().blocks_created, 1);
    }

    #[test]
    fn test_allocations_share_block() {
        let mut arena = small_arena();
        let _a = arena.allocate(16).unwrap();
        let _b = arena.allocate(16).unwrap();
        assert_eq!(arena.stats().blocks_created, 1);
        assert_eq!(arena.retired_blocks(), 0);
    }

    #[test]
    fn test_oversized_request_gets_own_block() {
        let mut arena = small_arena();
        let buf = arena.allocate(200).unwrap();
        assert_eq!(buf.len(), 200);
        assert!(arena.reserved_bytes() >= 200);
    }

    #[test]
    fn test_block_reused_after_views_dropped() {
        let mut arena = small_arena();
        let first = arena.copy_from(&[1u8; 48]).unwrap();
        // Does not fit the remainder of the first block
        let second = arena.copy_from(&[2u8; 48]).unwrap();
        assert_eq!(arena.retired_blocks(), 1);

        // A clone keeps the retired block alive
        let view = first.slice(0..4);
        drop(first);
        assert_eq!(arena.collect(), 0);

        drop(view);
        assert_eq!(arena.collect(), 1);
        assert_eq!(arena.free_blocks(), 1);

        // Next overflow takes the free block instead of a new one
        let _third = arena.copy_from(&[3u8; 48]).unwrap();
        assert_eq!(arena.stats().blocks_reused, 1);
        assert_eq!(arena.stats().blocks_created, 2);
        assert_eq!(&second[..], &[2u8; 48][..]);
    }

    #[test]
    fn test_exhaustion_surfaces_error() {
        let mut arena = small_arena();
        let _held = arena.allocate(1000).unwrap();
        let err = arena.allocate(100).unwrap_err();
        assert!(matches!(err, ArenaError::Exhausted { requested: 100, .. }));
    }

    #[test]
    fn test_zero_size_allocation() {
        let mut arena = small_arena();
        assert!(arena.allocate(0).unwrap().is_empty());
        assert_eq!(arena.stats().blocks_created, 0);
    }

    #[test]
    fn test_views_dropped_on_other_thread() {
        let mut arena = small_arena();
        let view = arena.copy_from(b"shared").unwrap();
        let handle = std::thread::spawn(move || view.len());
        assert_eq!(handle.join().unwrap(), 6);

        // Forces the first block into retirement
        let _next = arena.allocate(64).unwrap();
        assert_eq!(arena.collect(), 1);
        assert_eq!(arena.free_blocks(), 1);
    }
}
