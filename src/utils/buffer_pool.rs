//! Power-of-two buffer pool.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// The largest size exponent served by a [`BufferPool`] (buffers of up to `2^30` elements).
pub const MAX_POOL_EXPONENT: usize = 30;

/// The smallest exponent `p` such that `2^p >= max(1, count)`.
///
/// Doubling minus one turns the ceiling log into a floor log, so a single
/// branchless bit-scan suffices.
#[inline]
pub fn pool_index(count: usize) -> usize {
    ((count.max(1) << 1) - 1).ilog2() as usize
}

/// A cache of power-of-two-sized buffers, keyed by size exponent.
///
/// Returned buffers are stacked per exponent and handed back most-recently-returned
/// first. The pool is not thread-safe. In debug builds the pool tracks how many
/// buffers of each exponent are outstanding.
#[derive(Debug)]
pub struct BufferPool<T> {
    stacks: Vec<Vec<Box<[T]>>>,
    #[cfg(debug_assertions)]
    outstanding: Vec<usize>,
}

impl<T: Default + Clone> BufferPool<T> {
    /// An empty pool.
    pub fn new() -> Self {
        Self {
            stacks: alloc::vec![Vec::new(); MAX_POOL_EXPONENT + 1],
            #[cfg(debug_assertions)]
            outstanding: alloc::vec![0; MAX_POOL_EXPONENT + 1],
        }
    }

    fn fresh(exponent: usize) -> Box<[T]> {
        alloc::vec![T::default(); 1usize << exponent].into_boxed_slice()
    }

    /// Pops a cached buffer of length `2^exponent`, or allocates a fresh one.
    pub fn take(&mut self, exponent: usize) -> Box<[T]> {
        assert!(
            exponent <= MAX_POOL_EXPONENT,
            "pool exponent {exponent} out of range"
        );
        #[cfg(debug_assertions)]
        {
            self.outstanding[exponent] += 1;
        }
        self.stacks[exponent]
            .pop()
            .unwrap_or_else(|| Self::fresh(exponent))
    }

    /// Hands `buffer` back to the stack for `exponent`.
    pub fn return_buffer(&mut self, buffer: Box<[T]>, exponent: usize) {
        assert!(
            exponent <= MAX_POOL_EXPONENT,
            "pool exponent {exponent} out of range"
        );
        debug_assert_eq!(buffer.len(), 1 << exponent);
        #[cfg(debug_assertions)]
        {
            self.outstanding[exponent] = self.outstanding[exponent].saturating_sub(1);
        }
        self.stacks[exponent].push(buffer);
    }

    /// Allocates fresh buffers until the stack for `exponent` holds at least `count` entries.
    pub fn ensure_count(&mut self, exponent: usize, count: usize) {
        assert!(
            exponent <= MAX_POOL_EXPONENT,
            "pool exponent {exponent} out of range"
        );
        while self.stacks[exponent].len() < count {
            self.stacks[exponent].push(Self::fresh(exponent));
        }
    }

    /// The number of buffers currently cached for `exponent`.
    pub fn cached_count(&self, exponent: usize) -> usize {
        self.stacks[exponent].len()
    }

    /// Drops every cached buffer. Outstanding buffers are unaffected.
    pub fn clear(&mut self) {
        for stack in &mut self.stacks {
            stack.clear();
        }
    }

    /// The number of buffers of this exponent taken but not yet returned.
    #[cfg(debug_assertions)]
    pub fn outstanding_count(&self, exponent: usize) -> usize {
        self.outstanding[exponent]
    }
}

impl<T: Default + Clone> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
