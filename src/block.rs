//! Pool of library-owned fixed-size blocks for copying outbound data.
//!
//! Producer buffers are copied into leased blocks before the output lock is
//! taken, so the critical section does no allocation-heavy work. A block is
//! pinned while an in-flight write request holds a raw pointer into it and
//! must be unpinned exactly once before it returns to the pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::metrics;

/// Capacity of a single pooled block in bytes.
pub const BLOCK_CAPACITY: usize = 2048;

/// A fixed-capacity byte buffer leased from a [`BlockPool`].
///
/// The populated region is `[start, end)`. The backing memory is heap-owned,
/// so [`BufView`]s derived from it stay valid while the block is alive, even
/// if the `Block` value itself moves.
pub struct Block {
    data: Box<[u8]>,
    start: usize,
    end: usize,
    pins: u32,
}

impl Block {
    fn new(data: Box<[u8]>) -> Self {
        debug_assert_eq!(data.len(), BLOCK_CAPACITY);
        Block {
            data,
            start: 0,
            end: 0,
            pins: 0,
        }
    }

    /// Number of populated bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if no bytes have been copied in.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Remaining writable capacity.
    #[inline]
    pub fn available(&self) -> usize {
        self.data.len() - self.end
    }

    /// Copy bytes in at the end cursor, up to the remaining capacity.
    /// Returns the number of bytes copied.
    pub fn copy_in(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.available());
        self.data[self.end..self.end + n].copy_from_slice(&src[..n]);
        self.end += n;
        n
    }

    /// Pin the block for an in-flight request.
    pub fn pin(&mut self) {
        self.pins += 1;
    }

    /// Release one pin.
    ///
    /// # Panics (debug)
    /// Panics if the block is not pinned.
    pub fn unpin(&mut self) {
        debug_assert!(self.pins > 0, "unpin of unpinned block");
        self.pins -= 1;
    }

    /// Whether any in-flight request still references the block.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// Raw view of the populated region, for the async write primitive.
    #[inline]
    pub fn view(&self) -> BufView {
        BufView {
            ptr: self.data[self.start..].as_ptr(),
            len: self.len(),
        }
    }
}

/// Raw (pointer, length) view of a block's populated bytes.
///
/// Valid while the originating [`Block`] is alive; the pin count is what
/// keeps the block from returning to the pool while a view is in flight.
#[derive(Clone, Copy, Debug)]
pub struct BufView {
    ptr: *const u8,
    len: usize,
}

// Safety: BufView is a read-only view into heap memory owned by a Block; the
// pin discipline guarantees the block outlives every in-flight view.
unsafe impl Send for BufView {}
unsafe impl Sync for BufView {}

impl BufView {
    /// Length of the viewed region.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the view covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the viewed bytes.
    ///
    /// # Safety
    /// The caller must ensure the originating block is still alive (pinned
    /// for the duration of the in-flight request).
    #[inline]
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// Pool of fixed-size blocks, safe for lease/return from any thread.
pub struct BlockPool {
    free: Mutex<Vec<Box<[u8]>>>,
    max_free: usize,
    outstanding: AtomicUsize,
}

impl BlockPool {
    /// Create a pool with `config.initial_blocks` pre-allocated blocks.
    pub fn new(config: &Config) -> Self {
        let mut free = Vec::with_capacity(config.initial_blocks);
        for _ in 0..config.initial_blocks {
            free.push(vec![0u8; BLOCK_CAPACITY].into_boxed_slice());
        }
        BlockPool {
            free: Mutex::new(free),
            max_free: config.max_free_blocks,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Lease a block. Grows the pool when the free list is empty.
    pub fn lease(&self) -> Block {
        let backing = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; BLOCK_CAPACITY].into_boxed_slice());
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        metrics::BLOCKS_LEASED.increment();
        metrics::BLOCKS_IN_USE.increment();
        Block::new(backing)
    }

    /// Return a block to the pool.
    ///
    /// # Panics (debug)
    /// Panics if the block is still pinned.
    pub fn release(&self, block: Block) {
        debug_assert!(!block.is_pinned(), "release of pinned block");
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        metrics::BLOCKS_RETURNED.increment();
        metrics::BLOCKS_IN_USE.decrement();
        let mut free = self.free.lock();
        if free.len() < self.max_free {
            free.push(block.data);
        }
    }

    /// Unpin and return a batch of in-flight blocks (rollback paths).
    pub(crate) fn reclaim(&self, blocks: Vec<Block>) {
        for mut block in blocks {
            block.unpin();
            self.release(block);
        }
    }

    /// Split `src` into `ceil(len / BLOCK_CAPACITY)` pinned blocks.
    /// An empty buffer produces no blocks.
    pub fn copy_into_blocks(&self, mut src: &[u8]) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(src.len().div_ceil(BLOCK_CAPACITY));
        while !src.is_empty() {
            let mut block = self.lease();
            let n = block.copy_in(src);
            block.pin();
            blocks.push(block);
            src = &src[n..];
        }
        blocks
    }

    /// Number of blocks currently leased out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Number of blocks on the free list.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}
