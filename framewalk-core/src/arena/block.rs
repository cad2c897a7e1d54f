//! Memory blocks carved by the arena.

use bytes::BytesMut;

/// One fixed-capacity allocation.
///
/// The unconsumed tail of the block is held as a `BytesMut`; every range
/// carved from it shares the same reference-counted storage, so the block
/// can only be rewound once every carved view has been dropped.
#[derive(Debug)]
pub(crate) struct Block {
    id: u64,
    capacity: usize,
    tail: BytesMut,
}

impl Block {
    pub(crate) fn new(id: u64, capacity: usize) -> Self {
        let tail = BytesMut::with_capacity(capacity);
        Self {
            id,
            capacity: tail.capacity(),
            tail,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Total capacity the block was created with.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available past the cursor.
    pub(crate) fn remaining(&self) -> usize {
        self.tail.capacity() - self.tail.len()
    }

    /// Carve `size` zeroed bytes off the front of the tail.
    ///
    /// The caller checks `remaining()` first; `resize` never reallocates
    /// when the capacity is already there.
    pub(crate) fn carve(&mut self, size: usize) -> BytesMut {
        debug_assert!(size <= self.remaining());
        self.tail.resize(size, 0);
        self.tail.split()
    }

    /// Rewind the cursor to the start of the block.
    ///
    /// Succeeds only when no carved range is still alive.
    pub(crate) fn try_rewind(&mut self) -> bool {
        self.tail.clear();
        self.tail.try_reclaim(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carve_advances_cursor() {
        let mut block = Block::new(1, 64);
        let a = block.carve(10);
        let b = block.carve(20);
        assert_eq!(a.len(), 10);
        assert_eq!(b.len(), 20);
        assert!(block.remaining() >= 34);
        assert_eq!(block.remaining(), block.capacity() - 30);
    }

    #[test]
    fn test_rewind_blocked_by_live_view() {
        let mut block = Block::new(1, 64);
        let view = block.carve(16).freeze();
        let dup = view.clone();
        drop(view);
        assert!(!block.try_rewind());

        drop(dup);
        assert!(block.try_rewind());
        assert_eq!(block.remaining(), block.capacity());
    }
}
