//! In-arena control header codec and block tag helpers.
//!
//! Every managed region starts with a three-word control header at fixed
//! byte offsets:
//!
//! ```text
//! offset 0     capacity of the usable region in bytes
//! offset W     fit mode (0 first, 1 best, 2 worst)
//! offset 2W    offset of the first free block, NIL when the arena is full
//! ```
//!
//! where `W` is the machine word size. Blocks start at [`HEADER_SIZE`].
//! Block metadata stores arena offsets, never raw addresses, so the region
//! stays valid wherever the backing memory happens to live.
//!
//! Block extents are always word multiples, which keeps every metadata word
//! aligned and leaves the low bit of a stored extent free. The boundary-tag
//! strategy packs its occupied flag there; [`encode_tag`] and [`decode_tag`]
//! are the only places that bit is written or examined.

use crate::arena::Arena;
use crate::fit::FitMode;

/// Machine word size in bytes. Block extents and metadata offsets are all
/// multiples of this.
pub(crate) const WORD: usize = size_of::<usize>();

/// Byte offset of the capacity field.
pub(crate) const HDR_CAPACITY: usize = 0;

/// Byte offset of the fit-mode field.
pub(crate) const HDR_FIT_MODE: usize = WORD;

/// Byte offset of the free-list root field.
pub(crate) const HDR_FREE_HEAD: usize = 2 * WORD;

/// Total size of the control header; the first block starts here.
pub(crate) const HEADER_SIZE: usize = 3 * WORD;

/// Null link offset. Unambiguous because no block can start below
/// [`HEADER_SIZE`].
pub(crate) const NIL: usize = 0;

/// Rounds `n` up to the next word multiple, or `None` when that overflows.
#[inline]
pub(crate) const fn align_up(n: usize) -> Option<usize> {
    match n.checked_add(WORD - 1) {
        Some(padded) => Some(padded & !(WORD - 1)),
        None => None,
    }
}

/// Packs a block extent and its occupied flag into one tag word.
#[inline]
pub(crate) const fn encode_tag(extent: usize, occupied: bool) -> usize {
    extent | occupied as usize
}

/// Splits a tag word into `(extent, occupied)`.
#[inline]
pub(crate) const fn decode_tag(tag: usize) -> (usize, bool) {
    (tag & !1, tag & 1 == 1)
}

#[inline]
pub(crate) fn read_capacity(arena: &Arena<'_>) -> usize {
    arena.read_word(HDR_CAPACITY)
}

#[inline]
pub(crate) fn write_capacity(arena: &Arena<'_>, capacity: usize) {
    arena.write_word(HDR_CAPACITY, capacity);
}

#[inline]
pub(crate) fn read_fit_mode(arena: &Arena<'_>) -> FitMode {
    FitMode::decode(arena.read_word(HDR_FIT_MODE))
}

#[inline]
pub(crate) fn write_fit_mode(arena: &Arena<'_>, mode: FitMode) {
    arena.write_word(HDR_FIT_MODE, mode.encode());
}

#[inline]
pub(crate) fn read_free_head(arena: &Arena<'_>) -> usize {
    arena.read_word(HDR_FREE_HEAD)
}

#[inline]
pub(crate) fn write_free_head(arena: &Arena<'_>, offset: usize) {
    arena.write_word(HDR_FREE_HEAD, offset);
}
