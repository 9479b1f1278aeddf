/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use segalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(0, 8), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds a byte count up to a whole number of blocks.
///
/// Returns `None` when the rounded value does not fit in a `usize`.
/// `block_size` must be a power of two.
pub fn round_up(
  bytes: usize,
  block_size: usize,
) -> Option<usize> {
  bytes
    .checked_add(block_size - 1)
    .map(|value| value & !(block_size - 1))
}
