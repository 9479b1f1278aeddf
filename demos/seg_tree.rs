use std::mem;

use segalloc::SegTreeAllocator;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Offset of `address` from the arena base, for readable output.
fn offset_of(
  allocator: &SegTreeAllocator,
  address: std::ptr::NonNull<u8>,
) -> usize {
  let base = allocator.base().map_or(0, |base| base.as_ptr() as usize);
  address.as_ptr() as usize - base
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  // RUST_LOG=debug shows every tree node after each step.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut allocator = SegTreeAllocator::new();
  let block_size = allocator.block_size();

  // --------------------------------------------------------------------
  // 1) Ten blocks, all free.
  // --------------------------------------------------------------------
  allocator.build(10 * block_size)?;
  allocator.show_seg_tree();

  // --------------------------------------------------------------------
  // 2) Fill the front of the arena: 16 bytes, 4 bytes (one block), 16 bytes.
  // --------------------------------------------------------------------
  let two = allocator.malloc(mem::size_of::<u64>() << 1)?;
  info!(offset = offset_of(&allocator, two), "[2] two u64");
  let one = allocator.malloc(mem::size_of::<u32>())?;
  info!(offset = offset_of(&allocator, one), "[2] one u32");
  let three = allocator.malloc(mem::size_of::<u64>() << 1)?;
  info!(offset = offset_of(&allocator, three), "[2] two u64 again");
  allocator.show_seg_tree();

  // --------------------------------------------------------------------
  // 3) Free the first allocation and take it back: lowest fit wins.
  // --------------------------------------------------------------------
  allocator.dealloc(two, mem::size_of::<u64>() << 1)?;
  let two = allocator.malloc(mem::size_of::<u64>() << 1)?;
  info!(offset = offset_of(&allocator, two), "[3] reused the freed run");
  let four = allocator.malloc(mem::size_of::<u32>())?;
  info!(offset = offset_of(&allocator, four), "[3] next free block");
  allocator.show_seg_tree();

  // --------------------------------------------------------------------
  // 4) A one-block hole is too small for 16 bytes, so the run after it is used.
  // --------------------------------------------------------------------
  allocator.dealloc(one, mem::size_of::<u64>())?;
  let five = allocator.malloc(mem::size_of::<u64>() << 1)?;
  info!(
    offset = offset_of(&allocator, five),
    largest_free = allocator.largest_free(),
    "[4] skipped the hole"
  );
  allocator.show_seg_tree();

  // --------------------------------------------------------------------
  // 5) Release everything; the root reports the whole arena free again.
  // --------------------------------------------------------------------
  allocator.dealloc(three, mem::size_of::<u64>() << 1)?;
  allocator.dealloc_value(four.cast::<u32>())?;
  allocator.dealloc(five, mem::size_of::<u64>() << 1)?;
  allocator.dealloc(two, mem::size_of::<u64>() << 1)?;
  info!(free_bytes = allocator.free_bytes(), "[5] all released");
  allocator.show_seg_tree();

  if let Err(error) = allocator.malloc(11 * block_size) {
    info!(%error, "[5] larger than the arena");
  }

  Ok(())
}
