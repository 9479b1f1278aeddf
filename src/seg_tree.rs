use std::{mem, ops::Range, ptr::NonNull};

use tracing::{debug, debug_span, info, warn};

use crate::{
  align::round_up,
  arena::Arena,
  block::{BlockRange, BlockStatus},
  config::AllocatorConfig,
  error::{BuildError, DeallocError, MallocError},
  tree::{NodeRecord, SegmentTree},
};

/// Fixed-arena allocator backed by a lazy segment tree.
///
/// Allocation is first-fit: the lowest-addressed free run large enough for
/// the rounded request is returned. No per-allocation size is kept, so the
/// caller hands the same size back on release.
pub struct SegTreeAllocator {
  config: AllocatorConfig,
  // Dropped before `arena`.
  tree: Option<SegmentTree>,
  arena: Option<Arena>,
}

impl Default for SegTreeAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl SegTreeAllocator {
  /// Creates an allocator with the default block size and no arena.
  /// Call [`build`](Self::build) before allocating.
  pub fn new() -> Self {
    Self::with_config(AllocatorConfig::default())
  }

  pub fn with_config(config: AllocatorConfig) -> Self {
    Self {
      config,
      tree: None,
      arena: None,
    }
  }

  /// (Re)creates the arena with room for `requested_bytes`, rounded up to a
  /// whole number of blocks. Any previous arena is released first, and if
  /// acquiring the new one fails the allocator is left without one.
  ///
  /// A zero size is rejected with [`BuildError::InvalidSize`] before anything
  /// is released, so an existing arena and its allocations stay usable.
  pub fn build(
    &mut self,
    requested_bytes: usize,
  ) -> Result<(), BuildError> {
    if requested_bytes == 0 {
      warn!("build size is 0");
      return Err(BuildError::InvalidSize);
    }

    self.tree = None;
    self.arena = None;

    let block_size = self.block_size();
    let Some(size) = round_up(requested_bytes, block_size) else {
      warn!(requested_bytes, "arena size overflows");
      return Err(BuildError::AllocationExhausted {
        bytes: requested_bytes,
      });
    };

    let Some(arena) = Arena::acquire(size) else {
      warn!(size, "failed to acquire arena");
      return Err(BuildError::AllocationExhausted { bytes: size });
    };

    let block_count = size / block_size;
    let tree = SegmentTree::new(block_count, block_size).inspect_err(|error| {
      warn!(%error, block_count, "failed to build segment tree");
    })?;

    info!(size, block_count, block_size, base = ?arena.base(), "build success");

    self.arena = Some(arena);
    self.tree = Some(tree);
    Ok(())
  }

  /// Allocates `size` bytes, rounded up to the block size, at the lowest
  /// address that fits.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, MallocError> {
    if size == 0 {
      warn!("malloc size is 0");
      return Err(MallocError::InvalidSize);
    }

    let block_size = self.block_size();
    let (Some(arena), Some(tree)) = (self.arena.as_ref(), self.tree.as_mut()) else {
      return Err(MallocError::NoArena);
    };

    // Anything that overflows cannot fit either.
    let requested = round_up(size, block_size).unwrap_or(usize::MAX);
    debug!(size, requested, "malloc");

    let Some(offset) = tree.find_lowest_fit(requested) else {
      let largest_free = tree.largest_free();
      warn!(requested, largest_free, "malloc failed, no free run large enough");
      return Err(MallocError::OutOfSpace {
        requested,
        largest_free,
      });
    };

    let range = BlockRange::from_bytes(offset, requested, block_size);
    tree.update_range(range, BlockStatus::Used);
    debug!(offset, left = range.left, right = range.right, "blocks marked used");

    Ok(arena.address_at(offset))
  }

  /// Releases `size` bytes at `address`.
  ///
  /// `size` must be the value passed to the matching [`malloc`](Self::malloc)
  /// (anything rounding to the same block count works). A range falling
  /// outside the arena, or a zero `size`, is rejected without touching the
  /// tree.
  pub fn dealloc(
    &mut self,
    address: NonNull<u8>,
    size: usize,
  ) -> Result<(), DeallocError> {
    let block_size = self.block_size();
    let (Some(arena), Some(tree)) = (self.arena.as_ref(), self.tree.as_mut()) else {
      return Err(DeallocError::NoArena);
    };

    let block_count = tree.block_count();
    let offset = arena.offset_of(address);
    let blocks = (round_up(size, block_size).unwrap_or(usize::MAX) / block_size) as isize;
    let left = offset.div_euclid(block_size as isize);
    let right = left.saturating_add(blocks).saturating_sub(1);

    if blocks == 0 || left < 0 || right < left || right as usize >= block_count {
      warn!(left, right, block_count, "invalid dealloc range");
      return Err(DeallocError::InvalidFree {
        left,
        right,
        block_count,
      });
    }

    let range = BlockRange::new(left as usize, right as usize);
    debug!(size, left = range.left, right = range.right, "dealloc");
    tree.update_range(range, BlockStatus::Free);

    Ok(())
  }

  /// Releases a value previously allocated with `size_of::<T>()` bytes.
  pub fn dealloc_value<T>(
    &mut self,
    value: NonNull<T>,
  ) -> Result<(), DeallocError> {
    self.dealloc(value.cast(), mem::size_of::<T>())
  }

  pub fn block_size(&self) -> usize {
    self.config.block_size()
  }

  pub fn base(&self) -> Option<NonNull<u8>> {
    self.arena.as_ref().map(Arena::base)
  }

  /// Arena size in bytes, zero without an arena.
  pub fn capacity(&self) -> usize {
    self.arena.as_ref().map_or(0, Arena::size)
  }

  pub fn block_count(&self) -> usize {
    self.tree.as_ref().map_or(0, SegmentTree::block_count)
  }

  /// Largest contiguous free run in bytes.
  pub fn largest_free(&self) -> usize {
    self.tree.as_ref().map_or(0, SegmentTree::largest_free)
  }

  /// Free byte ranges as offsets from the arena base, ascending.
  pub fn free_regions(&self) -> Vec<Range<usize>> {
    self
      .tree
      .as_ref()
      .map(SegmentTree::free_regions)
      .unwrap_or_default()
  }

  pub fn free_bytes(&self) -> usize {
    self.free_regions().iter().map(|region| region.len()).sum()
  }

  /// Pre-order snapshot of every tree node with absolute addresses.
  pub fn dump_state(&self) -> Vec<NodeRecord> {
    match (self.arena.as_ref(), self.tree.as_ref()) {
      (Some(arena), Some(tree)) => tree.dump(arena.base().as_ptr() as usize),
      _ => Vec::new(),
    }
  }

  /// Emits every tree node as a `debug` event.
  pub fn show_seg_tree(&self) {
    let _span = debug_span!("seg_tree", block_count = self.block_count()).entered();
    for record in self.dump_state() {
      debug!("{record}");
    }
  }
}
