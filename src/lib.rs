//! # segalloc - A Segment Tree Arena Allocator
//!
//! This crate provides a fixed-arena allocator that tracks free and used
//! blocks with a **segment tree with lazy propagation**. Finding the
//! lowest-addressed free run of `N` bytes and marking a range used or free
//! both take `O(log n)` instead of a linear free-list scan.
//!
//! ## Overview
//!
//! The arena is split into equal blocks (8 bytes by default). Every tree node
//! covers a span of blocks and caches three numbers about it:
//!
//! ```text
//!   Node over blocks [0, 7]:
//!
//!   ┌────┬────┬────┬────┬────┬────┬────┬────┐
//!   │free│free│used│free│free│free│used│free│
//!   └────┴────┴────┴────┴────┴────┴────┴────┘
//!   ◄─ left ─►          ◄──── max ───►      ◄right►
//!     = 16                  = 24            = 8
//!
//!   max   - largest free run anywhere in the span
//!   left  - free run starting at the span's first byte
//!   right - free run ending at the span's last byte
//! ```
//!
//! A parent's numbers follow from its two children, so the root always knows
//! the largest free run of the whole arena. Updates covering a whole span
//! stop at that node and leave a lazy tag (`AllUsed` / `AllFree`) that is
//! pushed to the children only when a later operation descends through it.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Block rounding (align_to!, round_up)
//!   ├── arena      - Backing buffer from malloc(3)
//!   ├── block      - Block status, lazy tags and block ranges
//!   ├── config     - AllocatorConfig (block size)
//!   ├── error      - Build / malloc / dealloc errors
//!   ├── tree       - SegmentTree index
//!   └── seg_tree   - SegTreeAllocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::SegTreeAllocator;
//!
//! let mut allocator = SegTreeAllocator::new();
//! allocator.build(80).unwrap();
//!
//! let first = allocator.malloc(16).unwrap();
//! let second = allocator.malloc(4).unwrap(); // rounded up to 8
//!
//! unsafe { second.cast::<u32>().as_ptr().write(42) };
//!
//! // the caller supplies the size again on release
//! allocator.dealloc(first, 16).unwrap();
//! assert_eq!(allocator.malloc(16).unwrap(), first);
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: one mutator per instance, no internal locking
//! - **Fixed arena**: the arena never grows; `build` replaces it wholesale
//! - **Caller-tracked sizes**: nothing records how large an allocation was
//! - **Unix-only**: the arena comes from `libc::malloc`

pub mod align;
mod arena;
mod block;
mod config;
mod error;
mod seg_tree;
mod tree;

pub use block::{BlockRange, BlockStatus, LazyTag};
pub use config::{AllocatorConfig, DEFAULT_BLOCK_SIZE};
pub use error::{BuildError, ConfigError, DeallocError, MallocError};
pub use seg_tree::SegTreeAllocator;
pub use tree::{NodeRecord, SegmentTree};
