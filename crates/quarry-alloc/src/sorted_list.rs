//! Address-ordered free-list allocation.
//!
//! The strategy threads a singly linked list through the free blocks
//! themselves, kept strictly sorted by address. A free block spends two
//! words on metadata (its extent and the link to the next free block); an
//! occupied block spends one (its extent), so the per-allocation overhead
//! is a single word and payloads start one word past the block.
//!
//! Keeping the list in address order is what makes reclamation simple: a
//! released block is spliced in at its address position and merged with
//! whichever of its list neighbors it touches, so free space never stays
//! fragmented across an idle boundary. The price is O(n) list walks in
//! both allocate and deallocate, where n is the number of free blocks.

use std::ptr::{self, NonNull};

use quarry_log::Logger;

use crate::allocator::{AllocOptions, Allocator};
use crate::arena::Arena;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::fit::{Candidate, FitMode};
use crate::layout::{self, HEADER_SIZE, NIL, WORD};

/// Extent word in front of each occupied block's payload.
const OCCUPIED_OVERHEAD: usize = WORD;

/// Smallest payload ever granted; one word so a released block can host
/// its free-list link.
const MIN_PAYLOAD: usize = WORD;

/// Smallest extent a free block can have: extent word plus link word.
const MIN_FREE_EXTENT: usize = 2 * WORD;

/// Allocator backed by an address-ordered free list.
///
/// Cheapest per-block overhead of the strategies (one word per occupied
/// block), at the cost of list walks that grow with fragmentation.
///
/// # Examples
///
/// ```
/// use quarry_alloc::{Allocator, FitMode, SortedListAllocator};
///
/// let alloc = SortedListAllocator::new(192, FitMode::BestFit)?;
///
/// let a = alloc.allocate(40)?;
/// let b = alloc.allocate(40)?;
/// assert_eq!(alloc.dump_blocks(), "occ 48|occ 48|avl 96");
///
/// // SAFETY: both blocks belong to this allocator, each released once.
/// unsafe {
///     alloc.deallocate(a);
///     alloc.deallocate(b);
/// }
/// assert_eq!(alloc.dump_blocks(), "avl 192");
/// # Ok::<(), quarry_alloc::Error>(())
/// ```
pub struct SortedListAllocator<'a> {
    arena: Arena<'a>,
    logger: Option<&'a Logger>,
}

impl std::fmt::Debug for SortedListAllocator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedListAllocator").finish_non_exhaustive()
    }
}

impl<'a> SortedListAllocator<'a> {
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
    /// Same conditions as [`new`](SortedListAllocator::new), with backing
    /// exhaustion also reported as [`Error::MemoryExhausted`].
    pub fn with_options(options: AllocOptions<'a>) -> Result<Self> {
        if let Some(log) = options.logger {
            log.trace("sorted list allocator: construction started")
                .debug(&format!("requested capacity: {} bytes", options.capacity));
        }

        if options.capacity < MIN_FREE_EXTENT {
            if let Some(log) = options.logger {
                log.error(&format!(
                    "sorted list allocator: capacity {} is below the {MIN_FREE_EXTENT} byte minimum",
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
        arena.write_word(HEADER_SIZE, capacity);
        arena.write_word(HEADER_SIZE + WORD, NIL);

        if let Some(log) = options.logger {
            log.trace("sorted list allocator: construction finished");
        }

        Ok(SortedListAllocator {
            arena,
            logger: options.logger,
        })
    }

    /// Free blocks in address order, the shape the fit selector consumes.
    fn free_blocks(&self) -> FreeBlocks<'_, 'a> {
        FreeBlocks {
            arena: &self.arena,
            cursor: layout::read_free_head(&self.arena),
        }
    }

    fn next_of(&self, block: usize) -> usize {
        self.arena.read_word(block + WORD)
    }

    /// Repoints the link that leads to `node`; a `NIL` predecessor means
    /// the list root in the arena header.
    fn relink(&self, prev: usize, node: usize) {
        if prev == NIL {
            layout::write_free_head(&self.arena, node);
        } else {
            self.arena.write_word(prev + WORD, node);
        }
    }

    /// The free block whose link points at `target`.
    fn predecessor_of(&self, target: usize) -> usize {
        let mut prev = NIL;
        let mut cursor = layout::read_free_head(&self.arena);
        while cursor != NIL && cursor != target {
            prev = cursor;
            cursor = self.next_of(cursor);
        }
        debug_assert_eq!(cursor, target, "block missing from the free list");
        prev
    }

    /// Total extent an occupied block needs for `size` payload bytes, or
    /// `None` when the arithmetic overflows.
    fn request_extent(size: usize) -> Option<usize> {
        let payload = layout::align_up(size.max(MIN_PAYLOAD))?;
        payload.checked_add(OCCUPIED_OVERHEAD)
    }
}

impl Allocator for SortedListAllocator<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if let Some(log) = self.logger {
            log.trace("sorted list allocator: allocation started")
                .debug(&format!("requested {size} bytes"));
        }

        let Some(needed) = Self::request_extent(size) else {
            if let Some(log) = self.logger {
                log.warning(&format!(
                    "sorted list allocator: no free block can serve {size} bytes"
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
                    "sorted list allocator: no free block can serve {size} bytes"
                ));
            }
            return Err(Error::MemoryExhausted { requested: size });
        };

        let prev = self.predecessor_of(chosen.offset);
        let next = self.next_of(chosen.offset);

        if chosen.extent - needed < MIN_FREE_EXTENT {
            // Too small to split: grant the whole block.
            self.relink(prev, next);
        } else {
            // Split; the tail keeps the chosen block's place in address
            // order, so the list stays sorted without a walk.
            let rest = chosen.offset + needed;
            self.arena.write_word(rest, chosen.extent - needed);
            self.arena.write_word(rest + WORD, next);
            self.relink(prev, rest);
            self.arena.write_word(chosen.offset, needed);
        }

        let payload = self.arena.ptr_at(chosen.offset + OCCUPIED_OVERHEAD);

        if let Some(log) = self.logger {
            log.trace(&format!(
                "granted {} bytes at offset {}",
                self.arena.read_word(chosen.offset),
                chosen.offset
            ))
            .debug(&format!("blocks: {}", self.dump_blocks()));
        }

        Ok(payload)
    }

    unsafe fn deallocate(&self, payload: NonNull<u8>) {
        if let Some(log) = self.logger {
            log.trace("sorted list allocator: deallocation started");
        }

        let offset = self.arena.offset_of(payload) - OCCUPIED_OVERHEAD;
        let extent = self.arena.read_word(offset);

        // Nearest free neighbors in address order.
        let mut prev = NIL;
        let mut next = layout::read_free_head(&self.arena);
        while next != NIL && next < offset {
            prev = next;
            next = self.next_of(next);
        }

        // Splice the block back in at its address position.
        self.arena.write_word(offset + WORD, next);
        self.relink(prev, offset);

        // Absorb the higher neighbor when exactly adjacent.
        if next != NIL && offset + extent == next {
            self.arena
                .write_word(offset, extent + self.arena.read_word(next));
            self.arena.write_word(offset + WORD, self.next_of(next));
        }

        // Collapse into the lower neighbor when exactly adjacent.
        if prev != NIL && prev + self.arena.read_word(prev) == offset {
            let combined = self.arena.read_word(prev) + self.arena.read_word(offset);
            self.arena.write_word(prev, combined);
            self.arena.write_word(prev + WORD, self.next_of(offset));
        }

        if let Some(log) = self.logger {
            log.trace(&format!("freed {extent} bytes at offset {offset}"))
                .debug(&format!("blocks: {}", self.dump_blocks()));
        }
    }

    unsafe fn reallocate(&self, payload: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>> {
        let offset = self.arena.offset_of(payload) - OCCUPIED_OVERHEAD;
        let current = self.arena.read_word(offset);

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
        diagnostics::dump_sorted_list(&self.arena)
    }
}

impl Drop for SortedListAllocator<'_> {
    fn drop(&mut self) {
        if let Some(log) = self.logger {
            log.trace("sorted list allocator: dropped");
        }
    }
}

/// Lazy walk of the free list; first fit stops it at the first match.
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
        let extent = self.arena.read_word(offset);
        self.cursor = self.arena.read_word(offset + WORD);
        Some(Candidate { offset, extent })
    }
}
