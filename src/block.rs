use std::fmt;

/// Target status of a range update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
  Used,
  Free,
}

/// Deferred status of a whole subtree.
///
/// When not `None`, every block under the node has the tagged status and the
/// children's cached aggregates are stale until pushed down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LazyTag {
  #[default]
  None,
  AllUsed,
  AllFree,
}

impl From<BlockStatus> for LazyTag {
  fn from(status: BlockStatus) -> Self {
    match status {
      BlockStatus::Used => LazyTag::AllUsed,
      BlockStatus::Free => LazyTag::AllFree,
    }
  }
}

impl fmt::Display for LazyTag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let name = match self {
      LazyTag::None => "none",
      LazyTag::AllUsed => "used",
      LazyTag::AllFree => "free",
    };
    f.write_str(name)
  }
}

/// Inclusive interval of block indices `[left, right]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
  pub left: usize,
  pub right: usize,
}

impl BlockRange {
  pub fn new(
    left: usize,
    right: usize,
  ) -> Self {
    Self { left, right }
  }

  /// Block range covering `bytes` bytes starting at byte `offset`.
  ///
  /// `offset` is truncated to its block, `bytes` must already be a nonzero
  /// block multiple.
  pub fn from_bytes(
    offset: usize,
    bytes: usize,
    block_size: usize,
  ) -> Self {
    let left = offset / block_size;
    Self::new(left, left + bytes / block_size - 1)
  }
}
