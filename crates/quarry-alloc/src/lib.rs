//! Quarry: composable fixed-arena allocators.
//!
//! Quarry manages a fixed byte arena, owned directly or carved out of
//! another allocator, and hands out variable-sized blocks from it. It
//! provides:
//!
//! - **Two bookkeeping strategies**: an address-ordered free list with
//!   one word of per-block overhead, and boundary tags with O(1)
//!   coalescing
//! - **Three fit policies** (first, best, worst), switchable at runtime
//!   per allocator
//! - **Arbitrary nesting**: any allocator can serve as the backing store
//!   for another through the object-safe [`Allocator`] trait
//! - **Best-effort diagnostics**: an optional `quarry_log` logger and a
//!   block-partition dump for tracing and tests
//!
//! # Architecture
//!
//! All bookkeeping lives inside the arena itself: the handle holds only
//! the region pointer and the optional borrowed collaborators, so every
//! operation works through `&self`. Block metadata stores arena offsets,
//! never addresses, and all offset arithmetic funnels through one
//! bounds-checked region abstraction.
//!
//! - [`SortedListAllocator`]: singly linked free list in address order
//! - [`BoundaryTagAllocator`]: size+flag tags at both block ends
//! - [`FitMode`]: the shared block-selection policies
//! - [`AllocOptions`]: capacity, fit policy, backing, logger
//!
//! # Example
//!
//! ```rust
//! use quarry_alloc::{Allocator, FitMode, SortedListAllocator};
//!
//! let alloc = SortedListAllocator::new(512, FitMode::BestFit)?;
//!
//! let block = alloc.allocate(100)?;
//! let bigger = unsafe { alloc.reallocate(block, 180)? };
//! unsafe { alloc.deallocate(bigger) };
//!
//! assert_eq!(alloc.dump_blocks(), "avl 512");
//! # Ok::<(), quarry_alloc::Error>(())
//! ```

pub mod allocator;
mod arena;
pub mod boundary_tag;
mod diagnostics;
pub mod error;
pub mod fit;
mod layout;
pub mod sorted_list;

// Re-export commonly used types
pub use allocator::{AllocOptions, Allocator};
pub use boundary_tag::BoundaryTagAllocator;
pub use error::{Error, Result};
pub use fit::{Candidate, FitMode};
pub use sorted_list::SortedListAllocator;
