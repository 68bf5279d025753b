//! Boundary-tag allocation with constant-time coalescing.
//!
//! Every block, free or occupied, carries an identical tag word at both
//! ends encoding its extent and occupancy. The trailing tag is what makes
//! the lower neighbor reachable by pure arithmetic (read the word just
//! below a block to land on that neighbor's footer), and the leading tag
//! does the same for the upper neighbor, so a released block can inspect
//! and absorb both sides without walking anything.
//!
//! Free blocks additionally hold `next` and `prev` links in their first
//! two interior words, forming a doubly linked list in no particular
//! address order. The double link is the other half of the O(1) story:
//! absorbing a neighbor unlinks it from the list through its own link
//! words, no search required. Allocation pushes and pops at the list head,
//! so the list order is recency of release, not address order.
//!
//! The price is a two-word overhead on every occupied block where the
//! sorted list pays one.

use std::ptr::{self, NonNull};

use quarry_log::Logger;

use crate::allocator::{AllocOptions, Allocator};
use crate::arena::Arena;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::fit::{Candidate, FitMode};
use crate::layout::{self, HEADER_SIZE, NIL, WORD};

/// Tag words at both ends of each occupied block.
const OCCUPIED_OVERHEAD: usize = 2 * WORD;

/// Smallest payload ever granted; two words so a released block can host
/// both free-list links.
const MIN_PAYLOAD: usize = 2 * WORD;

/// Smallest extent a free block can have: two tags plus two links.
const MIN_FREE_EXTENT: usize = 4 * WORD;

/// Allocator with size+flag tags at both block ends.
///
/// Deallocation cost does not depend on how many blocks exist: neighbor
/// inspection goes through the tags and list surgery through the double
/// links, so release and coalescing are O(1).
///
/// # Examples
///
/// ```
/// use quarry_alloc::{Allocator, BoundaryTagAllocator, FitMode};
///
/// let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit)?;
///
/// let a = alloc.allocate(24)?;
/// let b = alloc.allocate(24)?;
/// assert_eq!(alloc.dump_blocks(), "occ 40|occ 40|avl 176");
///
/// // Freeing in any order coalesces through the boundary tags.
/// // SAFETY: both blocks belong to this allocator, each released once.
/// unsafe {
///     alloc.deallocate(a);
///     alloc.deallocate(b);
/// }
/// assert_eq!(alloc.dump_blocks(), "avl 256");
/// # Ok::<(), quarry_alloc::Error>(())
/// ```
pub struct BoundaryTagAllocator<'a> {
    arena: Arena<'a>,
    logger: Option<&'a Logger>,
}

impl std::fmt::Debug for BoundaryTagAllocator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryTagAllocator").finish_non_exhaustive()
    }
}

impl<'a> BoundaryTagAllocator<'a> {
    /// Creates a system-backed, unlogged allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstructionFailed`] when `capacity` cannot hold
    /// one minimal free block, or [`Error::MemoryExhausted`] when the
    /// region cannot be obtained.
    pub fn new(capacity: usize, fit_mode: FitMode) -> Result<Self> {
        Self::with_options(AllocOptions::new(capacity).fit_mode(fit_mode))
    }

    /// Creates an allocator from explicit options.
    ///
    /// The capacity is rounded up to a word multiple. With a backing
    /// allocator in the options, the arena is carved out of it and returned
    /// to it on drop; otherwise the system allocator supplies the arena.
    ///
    /// # Errors
    ///
    /// Same conditions as [`new`](BoundaryTagAllocator::new), with backing
    /// exhaustion also reported as [`Error::MemoryExhausted`].
    pub fn with_options(options: AllocOptions<'a>) -> Result<Self> {
        if let Some(log) = options.logger {
            log.trace("boundary tag allocator: construction started")
                .debug(&format!("requested capacity: {} bytes", options.capacity));
        }

        if options.capacity < MIN_FREE_EXTENT {
            if let Some(log) = options.logger {
                log.error(&format!(
                    "boundary tag allocator: capacity {} is below the {MIN_FREE_EXTENT} byte minimum",
                    options.capacity
                ));
            }
            return Err(Error::ConstructionFailed {
                requested: options.capacity,
                minimum: MIN_FREE_EXTENT,
            });
        }

        let capacity = layout::align_up(options.capacity)
            .ok_or(Error::MemoryExhausted { requested: options.capacity })?;
        let total = capacity
            .checked_add(HEADER_SIZE)
            .ok_or(Error::MemoryExhausted { requested: options.capacity })?;

        let arena = match options.backing {
            Some(outer) => Arena::from_backing(outer, total)?,
            None => Arena::from_system(total)?,
        };

        layout::write_capacity(&arena, capacity);
        layout::write_fit_mode(&arena, options.fit_mode);
        layout::write_free_head(&arena, HEADER_SIZE);

        // The whole usable region starts as one free block.
        let tag = layout::encode_tag(capacity, false);
        arena.write_word(HEADER_SIZE, tag);
        arena.write_word(HEADER_SIZE + capacity - WORD, tag);
        arena.write_word(HEADER_SIZE + WORD, NIL);
        arena.write_word(HEADER_SIZE + 2 * WORD, NIL);

        if let Some(log) = options.logger {
            log.trace("boundary tag allocator: construction finished");
        }

        Ok(BoundaryTagAllocator {
            arena,
            logger: options.logger,
        })
    }

    /// Free blocks in list order, the shape the fit selector consumes.
    fn free_blocks(&self) -> FreeBlocks<'_, 'a> {
        FreeBlocks {
            arena: &self.arena,
            cursor: layout::read_free_head(&self.arena),
        }
    }

    /// Writes matching tags at both ends of a block.
    fn write_tags(&self, offset: usize, extent: usize, occupied: bool) {
        let tag = layout::encode_tag(extent, occupied);
        self.arena.write_word(offset, tag);
        self.arena.write_word(offset + extent - WORD, tag);
    }

    /// Removes a free block from the list through its own link words.
    fn unlink(&self, node: usize) {
        let next = self.arena.read_word(node + WORD);
        let prev = self.arena.read_word(node + 2 * WORD);

        if prev == NIL {
            layout::write_free_head(&self.arena, next);
        } else {
            self.arena.write_word(prev + WORD, next);
        }
        if next != NIL {
            self.arena.write_word(next + 2 * WORD, prev);
        }
    }

    /// Pushes a free block onto the list head.
    fn push_free(&self, offset: usize) {
        let head = layout::read_free_head(&self.arena);

        self.arena.write_word(offset + WORD, head);
        self.arena.write_word(offset + 2 * WORD, NIL);
        if head != NIL {
            self.arena.write_word(head + 2 * WORD, offset);
        }
        layout::write_free_head(&self.arena, offset);
    }

    /// Total extent an occupied block needs for `size` payload bytes, or
    /// `None` when the arithmetic overflows.
    fn request_extent(size: usize) -> Option<usize> {
        let payload = layout::align_up(size.max(MIN_PAYLOAD))?;
        payload.checked_add(OCCUPIED_OVERHEAD)
    }
}

impl Allocator for BoundaryTagAllocator<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if let Some(log) = self.logger {
            log.trace("boundary tag allocator: allocation started")
                .debug(&format!("requested {size} bytes"));
        }

        let Some(needed) = Self::request_extent(size) else {
            if let Some(log) = self.logger {
                log.warning(&format!(
                    "boundary tag allocator: no free block can serve {size} bytes"
                ));
            }
            return Err(Error::MemoryExhausted { requested: size });
        };

        if let Some(log) = self.logger {
            let payload = needed - OCCUPIED_OVERHEAD;
            if payload != size {
                log.trace(&format!(
                    "request rounded up from {size} to {payload} payload bytes"
                ));
            }
        }

        let mode = layout::read_fit_mode(&self.arena);
        let Some(chosen) = mode.select(self.free_blocks(), needed) else {
            if let Some(log) = self.logger {
                log.warning(&format!(
                    "boundary tag allocator: no free block can serve {size} bytes"
                ));
            }
            return Err(Error::MemoryExhausted { requested: size });
        };

        self.unlink(chosen.offset);

        if chosen.extent - needed < MIN_FREE_EXTENT {
            // Too small to split: grant the whole block.
            self.write_tags(chosen.offset, chosen.extent, true);
        } else {
            self.write_tags(chosen.offset, needed, true);
            let rest = chosen.offset + needed;
            self.write_tags(rest, chosen.extent - needed, false);
            self.push_free(rest);
        }

        let payload = self.arena.ptr_at(chosen.offset + WORD);

        if let Some(log) = self.logger {
            let (granted, _) = layout::decode_tag(self.arena.read_word(chosen.offset));
            log.trace(&format!("granted {granted} bytes at offset {}", chosen.offset))
                .debug(&format!("blocks: {}", self.dump_blocks()));
        }

        Ok(payload)
    }

    unsafe fn deallocate(&self, payload: NonNull<u8>) {
        if let Some(log) = self.logger {
            log.trace("boundary tag allocator: deallocation started");
        }

        let offset = self.arena.offset_of(payload) - WORD;
        let (extent, _) = layout::decode_tag(self.arena.read_word(offset));
        let limit = HEADER_SIZE + layout::read_capacity(&self.arena);

        // Neighbor occupancy via the adjacent tag words, guarded at the
        // arena edges where no neighbor exists.
        let right = offset + extent;
        let right_free = right < limit && !layout::decode_tag(self.arena.read_word(right)).1;
        let left_free =
            offset > HEADER_SIZE && !layout::decode_tag(self.arena.read_word(offset - WORD)).1;

        match (left_free, right_free) {
            (true, true) => {
                let (left_extent, _) = layout::decode_tag(self.arena.read_word(offset - WORD));
                let left = offset - left_extent;
                let (right_extent, _) = layout::decode_tag(self.arena.read_word(right));

                // The left neighbor's list entry survives; only its extent
                // grows. The right neighbor leaves the list.
                self.unlink(right);
                self.write_tags(left, left_extent + extent + right_extent, false);
            }
            (true, false) => {
                let (left_extent, _) = layout::decode_tag(self.arena.read_word(offset - WORD));
                let left = offset - left_extent;

                self.write_tags(left, left_extent + extent, false);
            }
            (false, true) => {
                let (right_extent, _) = layout::decode_tag(self.arena.read_word(right));

                self.unlink(right);
                self.write_tags(offset, extent + right_extent, false);
                self.push_free(offset);
            }
            (false, false) => {
                self.write_tags(offset, extent, false);
                self.push_free(offset);
            }
        }

        if let Some(log) = self.logger {
            log.trace(&format!("freed {extent} bytes at offset {offset}"))
                .debug(&format!("blocks: {}", self.dump_blocks()));
        }
    }

    unsafe fn reallocate(&self, payload: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>> {
        let offset = self.arena.offset_of(payload) - WORD;
        let (current, _) = layout::decode_tag(self.arena.read_word(offset));

        let Some(needed) = Self::request_extent(new_size) else {
            return Err(Error::MemoryExhausted { requested: new_size });
        };

        // In place when the block already fits and the spare room is too
        // small to carve off as a free block.
        if needed <= current && current - needed < MIN_FREE_EXTENT {
            return Ok(payload);
        }

        let fresh = self.allocate(new_size)?;
        let copy_len = (current - OCCUPIED_OVERHEAD).min(needed - OCCUPIED_OVERHEAD);

        // SAFETY: source and destination are distinct live blocks with at
        // least copy_len payload bytes each; the caller guarantees the old
        // payload is still allocated, and it is released exactly once here.
        unsafe {
            ptr::copy_nonoverlapping(payload.as_ptr(), fresh.as_ptr(), copy_len);
            self.deallocate(payload);
        }

        Ok(fresh)
    }

    fn set_fit_mode(&self, mode: FitMode) {
        layout::write_fit_mode(&self.arena, mode);
    }

    fn fit_mode(&self) -> FitMode {
        layout::read_fit_mode(&self.arena)
    }

    fn capacity(&self) -> usize {
        layout::read_capacity(&self.arena)
    }

    fn dump_blocks(&self) -> String {
        diagnostics::dump_boundary_tags(&self.arena)
    }
}

impl Drop for BoundaryTagAllocator<'_> {
    fn drop(&mut self) {
        if let Some(log) = self.logger {
            log.trace("boundary tag allocator: dropped");
        }
    }
}

/// Lazy walk of the free list in list order.
struct FreeBlocks<'r, 'a> {
    arena: &'r Arena<'a>,
    cursor: usize,
}

impl Iterator for FreeBlocks<'_, '_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if self.cursor == NIL {
            return None;
        }
        let offset = self.cursor;
        let (extent, _) = layout::decode_tag(self.arena.read_word(offset));
        self.cursor = self.arena.read_word(offset + WORD);
        Some(Candidate { offset, extent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorted_list::SortedListAllocator;

    /// Four occupied blocks in a 192-byte arena, each 40 bytes of extent,
    /// with a 32-byte free tail.
    fn four_blocks() -> (
        BoundaryTagAllocator<'static>,
        NonNull<u8>,
        NonNull<u8>,
        NonNull<u8>,
    ) {
        let alloc = BoundaryTagAllocator::new(192, FitMode::FirstFit).unwrap();

        let a = alloc.allocate(24).unwrap();
        let b = alloc.allocate(24).unwrap();
        let c = alloc.allocate(24).unwrap();
        let _d = alloc.allocate(24).unwrap();
        assert_eq!(alloc.dump_blocks(), "occ 40|occ 40|occ 40|occ 40|avl 32");

        (alloc, a, b, c)
    }

    #[test]
    fn test_first_allocation_is_usable() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        let p = alloc.allocate(40).unwrap();
        unsafe {
            ptr::write_bytes(p.as_ptr(), 0xCD, 40);
            assert_eq!(p.as_ptr().read(), 0xCD);
            assert_eq!(p.as_ptr().add(39).read(), 0xCD);
        }

        assert_eq!(alloc.dump_blocks(), "occ 56|avl 200");
    }

    #[test]
    fn test_zero_size_allocation_gets_minimum_payload() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        alloc.allocate(0).unwrap();
        assert_eq!(alloc.dump_blocks(), "occ 32|avl 224");
    }

    #[test]
    fn test_free_with_both_neighbors_free() {
        let (alloc, a, b, c) = four_blocks();

        unsafe {
            alloc.deallocate(a);
            alloc.deallocate(c);
            alloc.deallocate(b);
        }
        assert_eq!(alloc.dump_blocks(), "avl 120|occ 40|avl 32");

        // The merged block serves a request none of the three could alone.
        assert_eq!(alloc.allocate(104).unwrap(), a);
    }

    #[test]
    fn test_free_with_left_neighbor_free() {
        let (alloc, a, b, _c) = four_blocks();

        unsafe {
            alloc.deallocate(a);
            alloc.deallocate(b);
        }

        assert_eq!(alloc.dump_blocks(), "avl 80|occ 40|occ 40|avl 32");
    }

    #[test]
    fn test_free_with_right_neighbor_free() {
        let (alloc, a, b, _c) = four_blocks();

        unsafe {
            alloc.deallocate(b);
            alloc.deallocate(a);
        }

        assert_eq!(alloc.dump_blocks(), "avl 80|occ 40|occ 40|avl 32");
    }

    #[test]
    fn test_free_against_arena_edges() {
        let alloc = BoundaryTagAllocator::new(64, FitMode::FirstFit).unwrap();

        // One block spanning the whole capacity touches both edges.
        let p = alloc.allocate(48).unwrap();
        assert_eq!(alloc.dump_blocks(), "occ 64");

        unsafe { alloc.deallocate(p) };
        assert_eq!(alloc.dump_blocks(), "avl 64");
    }

    #[test]
    fn test_full_free_restores_single_block() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        let a = alloc.allocate(40).unwrap();
        let b = alloc.allocate(40).unwrap();
        let c = alloc.allocate(40).unwrap();

        unsafe {
            alloc.deallocate(b);
            alloc.deallocate(c);
            alloc.deallocate(a);
        }

        assert_eq!(alloc.dump_blocks(), "avl 256");
    }

    #[test]
    fn test_allocate_after_free_reuses_address() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        let first = alloc.allocate(40).unwrap();
        let dump = alloc.dump_blocks();
        unsafe { alloc.deallocate(first) };

        let second = alloc.allocate(40).unwrap();
        assert_eq!(first, second);
        assert_eq!(alloc.dump_blocks(), dump);
    }

    #[test]
    fn test_exhaustion_leaves_state_unchanged() {
        let alloc = BoundaryTagAllocator::new(64, FitMode::FirstFit).unwrap();

        let before = alloc.dump_blocks();
        let err = alloc.allocate(64).unwrap_err();

        assert_eq!(err, Error::MemoryExhausted { requested: 64 });
        assert_eq!(alloc.dump_blocks(), before);
        assert_eq!(before, "avl 64");
    }

    #[test]
    fn test_shrink_in_place_keeps_address() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        let p = alloc.allocate(40).unwrap();
        let dump = alloc.dump_blocks();

        let shrunk = unsafe { alloc.reallocate(p, 20).unwrap() };
        assert_eq!(shrunk, p);
        assert_eq!(alloc.dump_blocks(), dump);
    }

    #[test]
    fn test_grow_moves_and_copies_payload() {
        let alloc = BoundaryTagAllocator::new(256, FitMode::FirstFit).unwrap();

        let p = alloc.allocate(16).unwrap();
        unsafe {
            for i in 0..16u8 {
                p.as_ptr().add(i as usize).write(i);
            }
        }

        let grown = unsafe { alloc.reallocate(p, 64).unwrap() };
        assert_ne!(grown, p);
        unsafe {
            for i in 0..16u8 {
                assert_eq!(grown.as_ptr().add(i as usize).read(), i);
            }
        }

        assert_eq!(alloc.dump_blocks(), "avl 32|occ 80|avl 144");
    }

    #[test]
    fn test_try_reallocate_failure_keeps_slot() {
        let alloc = BoundaryTagAllocator::new(64, FitMode::FirstFit).unwrap();

        let p = alloc.allocate(8).unwrap();
        let mut slot = p;

        let ok = unsafe { alloc.try_reallocate(&mut slot, 1000) };
        assert!(!ok);
        assert_eq!(slot, p);
        assert_eq!(alloc.dump_blocks(), "occ 32|avl 32");
    }

    #[test]
    fn test_first_fit_follows_list_order_not_address_order() {
        let alloc = BoundaryTagAllocator::new(320, FitMode::FirstFit).unwrap();

        let a = alloc.allocate(56).unwrap();
        let _sep1 = alloc.allocate(8).unwrap();
        let c = alloc.allocate(40).unwrap();
        let _sep2 = alloc.allocate(8).unwrap();

        // c is released last, so it sits at the list head.
        unsafe {
            alloc.deallocate(a);
            alloc.deallocate(c);
        }

        let p = alloc.allocate(40).unwrap();
        assert_eq!(p, c);
        assert_ne!(p, a);
    }

    #[test]
    fn test_best_fit_takes_tightest_hole() {
        let alloc = BoundaryTagAllocator::new(320, FitMode::BestFit).unwrap();

        let a = alloc.allocate(56).unwrap();
        let _sep1 = alloc.allocate(8).unwrap();
        let c = alloc.allocate(40).unwrap();
        let _sep2 = alloc.allocate(8).unwrap();

        unsafe {
            alloc.deallocate(c);
            alloc.deallocate(a);
        }
        assert_eq!(alloc.dump_blocks(), "avl 72|occ 32|avl 56|occ 32|avl 128");

        // The 72-byte hole is at the list head, but 56 fits tighter.
        let p = alloc.allocate(40).unwrap();
        assert_eq!(p, c);
    }

    #[test]
    fn test_worst_fit_takes_largest_hole() {
        let alloc = BoundaryTagAllocator::new(320, FitMode::WorstFit).unwrap();

        let a = alloc.allocate(56).unwrap();
        let _sep1 = alloc.allocate(8).unwrap();
        let c = alloc.allocate(40).unwrap();
        let _sep2 = alloc.allocate(8).unwrap();

        unsafe {
            alloc.deallocate(c);
            alloc.deallocate(a);
        }

        let p = alloc.allocate(40).unwrap();
        assert_ne!(p, a);
        assert_ne!(p, c);
        assert_eq!(
            alloc.dump_blocks(),
            "avl 72|occ 32|avl 56|occ 32|occ 56|avl 72"
        );
    }

    #[test]
    fn test_set_fit_mode_round_trip() {
        let alloc = BoundaryTagAllocator::new(64, FitMode::BestFit).unwrap();
        assert_eq!(alloc.fit_mode(), FitMode::BestFit);

        alloc.set_fit_mode(FitMode::FirstFit);
        assert_eq!(alloc.fit_mode(), FitMode::FirstFit);
    }

    #[test]
    fn test_construction_below_minimum_fails() {
        let err = BoundaryTagAllocator::new(24, FitMode::FirstFit).unwrap_err();
        assert_eq!(
            err,
            Error::ConstructionFailed { requested: 24, minimum: 32 }
        );

        let alloc = BoundaryTagAllocator::new(32, FitMode::FirstFit).unwrap();
        assert_eq!(alloc.capacity(), 32);
    }

    #[test]
    fn test_layered_backing_releases_region() {
        let outer = BoundaryTagAllocator::new(512, FitMode::FirstFit).unwrap();

        {
            let inner = SortedListAllocator::with_options(
                AllocOptions::new(128).backing(&outer),
            )
            .unwrap();
            assert_eq!(outer.dump_blocks(), "occ 168|avl 344");
            assert_eq!(inner.dump_blocks(), "avl 128");

            let p = inner.allocate(32).unwrap();
            unsafe { inner.deallocate(p) };
        }

        assert_eq!(outer.dump_blocks(), "avl 512");
    }
}
