//! Exclusively owned byte regions with bounds-checked word access.
//!
//! An [`Arena`] is the one place in this crate that performs raw pointer
//! arithmetic. It acquires a contiguous region either from the system
//! allocator or from a backing [`Allocator`], exposes word-granular reads
//! and writes at integer offsets with every access checked against the
//! region bounds, and releases the region to whichever source supplied it
//! when dropped.
//!
//! All allocator bookkeeping lives in the arena bytes themselves. The
//! `Arena` value only carries the base pointer, the region size and the
//! optional backing reference, none of which change after construction,
//! which is what lets the strategies mutate block state through `&self`.
//!
//! # Safety
//!
//! The region is exclusively owned and no shared references into its bytes
//! are ever created, so writing through the base pointer behind `&self` is
//! sound. An out-of-bounds or misaligned offset is a bug in this crate and
//! panics instead of touching memory outside the region.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::layout::{HEADER_SIZE, WORD};

/// A contiguous, exclusively owned byte region.
///
/// The lifetime ties the arena to its backing allocator, when one exists.
pub(crate) struct Arena<'a> {
    /// Start of the region.
    base: NonNull<u8>,
    /// Region size in bytes, header included.
    size: usize,
    /// Where the region came from; `None` means the system allocator.
    backing: Option<&'a dyn Allocator>,
}

impl<'a> Arena<'a> {
    /// Acquires a region of `size` bytes from the system allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] when the system cannot provide
    /// the region or when `size` is not representable as an allocation.
    pub(crate) fn from_system(size: usize) -> Result<Self> {
        assert!(size >= HEADER_SIZE, "arena smaller than its control header");

        let layout = Layout::from_size_align(size, WORD)
            .map_err(|_| Error::MemoryExhausted { requested: size })?;

        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(ptr).ok_or(Error::MemoryExhausted { requested: size })?;

        Ok(Arena {
            base,
            size,
            backing: None,
        })
    }

    /// Acquires a region of `size` bytes from a backing allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryExhausted`] when the backing allocator has no
    /// block large enough.
    pub(crate) fn from_backing(outer: &'a dyn Allocator, size: usize) -> Result<Self> {
        assert!(size >= HEADER_SIZE, "arena smaller than its control header");

        let base = outer.allocate(size)?;

        Ok(Arena {
            base,
            size,
            backing: Some(outer),
        })
    }

    /// Region size in bytes, control header included.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Reads the word at a byte offset.
    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> usize {
        self.check_word(offset);
        // SAFETY: check_word proved the word lies inside the region and is
        // aligned; the region is valid for reads for the arena's lifetime.
        unsafe { self.base.as_ptr().add(offset).cast::<usize>().read() }
    }

    /// Writes the word at a byte offset.
    #[inline]
    pub(crate) fn write_word(&self, offset: usize, value: usize) {
        self.check_word(offset);
        // SAFETY: same bounds as read_word; the region is exclusively owned,
        // so no reference aliases the bytes being written.
        unsafe { self.base.as_ptr().add(offset).cast::<usize>().write(value) }
    }

    /// Real address of the byte at `offset`.
    #[inline]
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(
            offset < self.size,
            "offset {offset} outside arena of {} bytes",
            self.size
        );
        // SAFETY: offset is within the allocated region.
        unsafe { self.base.add(offset) }
    }

    /// Byte offset of a pointer into this arena.
    ///
    /// Panics when the pointer does not lie inside the region; a foreign
    /// pointer can never silently decode as a block.
    #[inline]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        let addr = ptr.addr().get();
        let base = self.base.addr().get();
        assert!(
            addr >= base && addr - base < self.size,
            "pointer outside arena"
        );
        addr - base
    }

    #[inline]
    fn check_word(&self, offset: usize) {
        assert!(offset % WORD == 0, "misaligned word access at offset {offset}");
        // size >= HEADER_SIZE, so the subtraction cannot underflow.
        assert!(
            offset <= self.size - WORD,
            "word access out of bounds: offset {offset}, arena {} bytes",
            self.size
        );
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        match self.backing {
            // SAFETY: base is exactly the payload pointer the backing
            // allocator returned at construction, deallocated once here.
            Some(outer) => unsafe { outer.deallocate(self.base) },
            None => {
                // SAFETY: base came from alloc::alloc with this exact layout.
                let layout = unsafe { Layout::from_size_align_unchecked(self.size, WORD) };
                unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
            }
        }
    }
}
