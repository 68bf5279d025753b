//! Block partition rendering for tracing and tests.
//!
//! A dump walks the arena from the first block to the capacity limit and
//! renders one `"<kind> <extent>"` run per block, joined by `|`, with `avl`
//! for free and `occ` for occupied. Extents include each block's metadata,
//! so the runs always sum to the capacity; a fully coalesced arena of 256
//! bytes dumps as `"avl 256"`.
//!
//! Each strategy needs its own walker because occupancy is recovered
//! differently: boundary tags carry the flag in every block's tag word,
//! while the sorted list infers it by advancing a cursor through the
//! address-ordered free list during the walk.

use crate::arena::Arena;
use crate::layout::{self, HEADER_SIZE, WORD};

/// One block as seen by a partition walk.
pub(crate) struct BlockInfo {
    pub(crate) extent: usize,
    pub(crate) occupied: bool,
}

/// Renders a walked partition.
pub(crate) fn render(blocks: &[BlockInfo]) -> String {
    let mut runs = Vec::with_capacity(blocks.len());
    for block in blocks {
        let kind = if block.occupied { "occ" } else { "avl" };
        runs.push(format!("{} {}", kind, block.extent));
    }
    runs.join("|")
}

/// Walks a sorted-list arena. A block is free exactly when it is the next
/// entry of the address-ordered free list.
pub(crate) fn dump_sorted_list(arena: &Arena<'_>) -> String {
    let limit = HEADER_SIZE + layout::read_capacity(arena);
    let mut free_cursor = layout::read_free_head(arena);

    let mut blocks = Vec::new();
    let mut cursor = HEADER_SIZE;
    while cursor < limit {
        let extent = arena.read_word(cursor);
        let occupied = cursor != free_cursor;
        if !occupied {
            free_cursor = arena.read_word(cursor + WORD);
        }
        blocks.push(BlockInfo { extent, occupied });
        cursor += extent;
    }

    render(&blocks)
}

/// Walks a boundary-tag arena; occupancy comes straight from the tags.
pub(crate) fn dump_boundary_tags(arena: &Arena<'_>) -> String {
    let limit = HEADER_SIZE + layout::read_capacity(arena);

    let mut blocks = Vec::new();
    let mut cursor = HEADER_SIZE;
    while cursor < limit {
        let (extent, occupied) = layout::decode_tag(arena.read_word(cursor));
        blocks.push(BlockInfo { extent, occupied });
        cursor += extent;
    }

    render(&blocks)
}
