//! The shared allocator contract and construction options.
//!
//! Every strategy implements [`Allocator`], and the trait is object-safe on
//! purpose: a `&dyn Allocator` is how one allocator serves as the backing
//! store for another, so any strategy can nest inside any other to any
//! depth. All methods take `&self` because the mutable state lives in the
//! arena bytes, not in the handle.
//!
//! Callers keep raw payload pointers, exactly as with `malloc`. The
//! releasing operations are `unsafe fn`s: nothing in the arena records
//! which payloads are outstanding, so a double free or a foreign pointer
//! cannot be detected and the obligation sits with the caller.

use std::ptr::NonNull;

use quarry_log::Logger;

use crate::error::Result;
use crate::fit::FitMode;

/// A block allocator over a fixed arena.
///
/// # Examples
///
/// ```
/// use quarry_alloc::{Allocator, FitMode, SortedListAllocator};
///
/// let alloc = SortedListAllocator::new(256, FitMode::FirstFit)?;
///
/// let block = alloc.allocate(40)?;
/// // SAFETY: block came from this allocator and is released once.
/// unsafe { alloc.deallocate(block) };
///
/// assert_eq!(alloc.dump_blocks(), "avl 256");
/// # Ok::<(), quarry_alloc::Error>(())
/// ```
pub trait Allocator {
    /// Allocates a block with room for at least `size` payload bytes.
    ///
    /// The payload is word-aligned. A `size` of zero is served as the
    /// strategy's minimum payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`](crate::Error::MemoryExhausted)
    /// when no free block is large enough; the arena is left unchanged.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>>;

    /// Releases a block, coalescing it with any adjacent free neighbors.
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by `allocate` or `reallocate` on
    /// this allocator and must not have been released since.
    unsafe fn deallocate(&self, payload: NonNull<u8>);

    /// Resizes a block, moving it when it cannot be resized in place.
    ///
    /// When the new size fits the current block and the spare room is too
    /// small to carve off as a free block, the payload address is returned
    /// unchanged. Otherwise the contents are copied into a fresh block, up
    /// to the smaller of the old and new payload sizes, and the old block
    /// is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`](crate::Error::MemoryExhausted)
    /// when no block can serve the new size; the original block is intact
    /// and `payload` remains valid.
    ///
    /// # Safety
    ///
    /// Same obligations as [`deallocate`](Allocator::deallocate). On
    /// success the old payload pointer must no longer be used unless it was
    /// returned back.
    unsafe fn reallocate(&self, payload: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>>;

    /// Resizes a block through an in-out slot, reporting failure as `false`.
    ///
    /// On success the slot holds the (possibly moved) payload address. On
    /// failure the slot is untouched and still valid.
    ///
    /// # Safety
    ///
    /// Same obligations as [`reallocate`](Allocator::reallocate) for the
    /// pointer in the slot.
    unsafe fn try_reallocate(&self, slot: &mut NonNull<u8>, new_size: usize) -> bool {
        // SAFETY: forwarded; the caller upholds the reallocate contract.
        match unsafe { self.reallocate(*slot, new_size) } {
            Ok(moved) => {
                *slot = moved;
                true
            }
            Err(_) => false,
        }
    }

    /// Switches the fit policy for subsequent allocations.
    ///
    /// Existing blocks are unaffected.
    fn set_fit_mode(&self, mode: FitMode);

    /// The fit policy currently in effect.
    #[must_use]
    fn fit_mode(&self) -> FitMode;

    /// Usable capacity in bytes, control header excluded.
    #[must_use]
    fn capacity(&self) -> usize;

    /// Renders the block partition as `"<kind> <extent>"` runs joined by
    /// `|`, with `avl` for free blocks and `occ` for occupied blocks.
    ///
    /// Extents include each block's own metadata, so the extents always sum
    /// to the capacity.
    #[must_use]
    fn dump_blocks(&self) -> String;
}

/// Construction options shared by every strategy.
///
/// # Examples
///
/// ```
/// use quarry_alloc::{AllocOptions, Allocator, BoundaryTagAllocator, FitMode, SortedListAllocator};
///
/// let outer = SortedListAllocator::new(512, FitMode::FirstFit)?;
///
/// // A boundary-tag allocator whose arena is carved out of `outer`.
/// let inner = BoundaryTagAllocator::with_options(
///     AllocOptions::new(128).fit_mode(FitMode::BestFit).backing(&outer),
/// )?;
///
/// let block = inner.allocate(32)?;
/// // SAFETY: block belongs to `inner` and is released once.
/// unsafe { inner.deallocate(block) };
/// drop(inner);
///
/// // Dropping the inner allocator returned its arena to the outer one.
/// assert_eq!(outer.dump_blocks(), "avl 512");
/// # Ok::<(), quarry_alloc::Error>(())
/// ```
pub struct AllocOptions<'a> {
    /// Usable capacity in bytes; rounded up to a word multiple.
    pub capacity: usize,
    /// Fit policy to start with.
    pub fit_mode: FitMode,
    /// Allocator to obtain the arena from; `None` means the system.
    pub backing: Option<&'a dyn Allocator>,
    /// Sink for diagnostic records; `None` disables logging.
    pub logger: Option<&'a Logger>,
}

impl<'a> AllocOptions<'a> {
    /// Options for a system-backed, unlogged, first-fit allocator.
    pub fn new(capacity: usize) -> Self {
        AllocOptions {
            capacity,
            fit_mode: FitMode::FirstFit,
            backing: None,
            logger: None,
        }
    }

    /// Sets the initial fit policy.
    #[must_use]
    pub fn fit_mode(mut self, mode: FitMode) -> Self {
        self.fit_mode = mode;
        self
    }

    /// Obtains the arena from `outer` instead of the system allocator.
    #[must_use]
    pub fn backing(mut self, outer: &'a dyn Allocator) -> Self {
        self.backing = Some(outer);
        self
    }

    /// Attaches a diagnostic logger.
    #[must_use]
    pub fn logger(mut self, logger: &'a Logger) -> Self {
        self.logger = Some(logger);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_tag::BoundaryTagAllocator;
    use crate::sorted_list::SortedListAllocator;

    #[test]
    fn test_options_defaults() {
        let options = AllocOptions::new(64);

        assert_eq!(options.capacity, 64);
        assert_eq!(options.fit_mode, FitMode::FirstFit);
        assert!(options.backing.is_none());
        assert!(options.logger.is_none());
    }

    #[test]
    fn test_options_setters() {
        let outer = SortedListAllocator::new(512, FitMode::FirstFit).unwrap();
        let options = AllocOptions::new(128)
            .fit_mode(FitMode::WorstFit)
            .backing(&outer);

        assert_eq!(options.capacity, 128);
        assert_eq!(options.fit_mode, FitMode::WorstFit);
        assert!(options.backing.is_some());
        assert!(options.logger.is_none());
    }

    #[test]
    fn test_trait_object_dispatch() {
        let allocators: Vec<Box<dyn Allocator>> = vec![
            Box::new(SortedListAllocator::new(256, FitMode::FirstFit).unwrap()),
            Box::new(BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap()),
        ];

        for alloc in &allocators {
            let block = alloc.allocate(40).unwrap();
            unsafe { alloc.deallocate(block) };
            assert_eq!(alloc.dump_blocks(), "avl 256");
            assert_eq!(alloc.capacity(), 256);
        }
    }

    #[test]
    fn test_try_reallocate_updates_slot_on_success() {
        let alloc = SortedListAllocator::new(256, FitMode::FirstFit).unwrap();

        let mut slot = alloc.allocate(16).unwrap();
        let grown = unsafe { alloc.try_reallocate(&mut slot, 64) };

        assert!(grown);
        unsafe { alloc.deallocate(slot) };
        assert_eq!(alloc.dump_blocks(), "avl 256");
    }
}
