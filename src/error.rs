use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
  #[error("arena size must be greater than zero")]
  InvalidSize,
  #[error("failed to acquire {bytes} bytes for the arena")]
  AllocationExhausted { bytes: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MallocError {
  #[error("allocation size must be greater than zero")]
  InvalidSize,
  #[error("no free run of {requested} bytes, largest is {largest_free}")]
  OutOfSpace { requested: usize, largest_free: usize },
  #[error("allocator has no usable arena")]
  NoArena,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeallocError {
  /// The released range does not map into `[0, block_count - 1]`, or it is
  /// empty because the size was zero (`right < left`).
  #[error("invalid free of blocks [{left}, {right}], arena holds {block_count} blocks")]
  InvalidFree {
    left: isize,
    right: isize,
    block_count: usize,
  },
  #[error("allocator has no usable arena")]
  NoArena,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("block size {0} is not a power of two")]
  InvalidBlockSize(usize),
  #[error("failed to parse allocator config: {0}")]
  Parse(#[from] toml::de::Error),
}
