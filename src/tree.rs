use std::{fmt, ops::Range};

use crate::{
  block::{BlockRange, BlockStatus, LazyTag},
  error::BuildError,
};

const ROOT_ID: usize = 0;

#[inline]
const fn left_child(node: usize) -> usize {
  (node << 1) + 1
}

#[inline]
const fn right_child(node: usize) -> usize {
  (node << 1) + 2
}

#[inline]
const fn mid(
  start: usize,
  end: usize,
) -> usize {
  start + (end - start) / 2
}

/// Cached free-run statistics for one block span.
///
/// Offsets are bytes from the arena base, `end` is exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Node {
  start: usize,
  end: usize,
  max_free: usize,
  left_free: usize,
  right_free: usize,
  lazy: LazyTag,
}

impl Node {
  fn len(&self) -> usize {
    self.end - self.start
  }

  fn fill(
    &mut self,
    bytes: usize,
  ) {
    self.max_free = bytes;
    self.left_free = bytes;
    self.right_free = bytes;
  }
}

/// Snapshot of one tree node, as produced by [`SegmentTree::dump`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRecord {
  pub node_id: usize,
  pub start_block: usize,
  pub end_block: usize,
  pub start_addr: usize,
  pub end_addr: usize,
  pub max_free: usize,
  pub left_free: usize,
  pub right_free: usize,
  pub lazy: LazyTag,
}

impl fmt::Display for NodeRecord {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "nodeid[{}],startid[{}],endid[{}],startaddr[{:#x}],endaddr[{:#x}],max[{}],leftmax[{}],rightmax[{}],lazy[{}]",
      self.node_id,
      self.start_block,
      self.end_block,
      self.start_addr,
      self.end_addr,
      self.max_free,
      self.left_free,
      self.right_free,
      self.lazy
    )
  }
}

/// Segment tree over the block indices `[0, block_count - 1]` of an arena.
///
/// Stored as an implicit heap: node `i` has children `2i + 1` and `2i + 2`,
/// in a flat vector of `4 * block_count` nodes.
///
/// ```text
///   blocks 0..=9, after allocating blocks 0..=1
///
///                    [0,9] max=64 left=0 right=64
///                   /                          \
///     [0,4] max=24 left=0 right=24     [5,9] max=40 (all free)
///        /            \
///   [0,2] left=0     [3,4] free
///    /      \
///  [0,1]   [2]
///  used    free
/// ```
#[derive(Debug)]
pub struct SegmentTree {
  nodes: Vec<Node>,
  block_count: usize,
  block_size: usize,
}

impl SegmentTree {
  /// Builds a fully free tree over `block_count` blocks of `block_size` bytes.
  pub fn new(
    block_count: usize,
    block_size: usize,
  ) -> Result<Self, BuildError> {
    if block_count == 0 {
      return Err(BuildError::InvalidSize);
    }

    let node_count = block_count
      .checked_mul(4)
      .ok_or(BuildError::AllocationExhausted { bytes: usize::MAX })?;

    let mut nodes = Vec::new();
    nodes
      .try_reserve_exact(node_count)
      .map_err(|_| BuildError::AllocationExhausted {
        bytes: node_count.saturating_mul(std::mem::size_of::<Node>()),
      })?;
    nodes.resize(node_count, Node::default());

    let mut tree = Self {
      nodes,
      block_count,
      block_size,
    };
    tree.build(ROOT_ID, 0, block_count - 1);

    Ok(tree)
  }

  pub fn block_count(&self) -> usize {
    self.block_count
  }

  pub fn block_size(&self) -> usize {
    self.block_size
  }

  /// Span of the whole tree in bytes.
  pub fn capacity(&self) -> usize {
    self.block_count * self.block_size
  }

  /// Size of the largest contiguous free run in the arena.
  pub fn largest_free(&self) -> usize {
    self.nodes[ROOT_ID].max_free
  }

  /// Byte offset of the lowest-addressed free run of at least `size` bytes.
  pub fn find_lowest_fit(
    &mut self,
    size: usize,
  ) -> Option<usize> {
    self.find(ROOT_ID, 0, self.block_count - 1, size)
  }

  /// Marks every block in `range` with `status`.
  ///
  /// `range` must lie within `[0, block_count - 1]`.
  pub fn update_range(
    &mut self,
    range: BlockRange,
    status: BlockStatus,
  ) {
    debug_assert!(range.left <= range.right && range.right < self.block_count);
    self.update(ROOT_ID, 0, self.block_count - 1, range, status);
  }

  /// Pre-order snapshot of every node, addresses offset by `base`.
  pub fn dump(
    &self,
    base: usize,
  ) -> Vec<NodeRecord> {
    let mut records = Vec::new();
    self.dump_node(ROOT_ID, 0, self.block_count - 1, base, &mut records);
    records
  }

  /// Disjoint free byte ranges in ascending order, read without resolving
  /// pending tags.
  pub fn free_regions(&self) -> Vec<Range<usize>> {
    let mut regions: Vec<Range<usize>> = Vec::new();
    self.collect_free(ROOT_ID, 0, self.block_count - 1, &mut regions);
    regions
  }

  fn build(
    &mut self,
    node: usize,
    start: usize,
    end: usize,
  ) {
    if start == end {
      let offset = start * self.block_size;
      self.nodes[node] = Node {
        start: offset,
        end: offset + self.block_size,
        max_free: self.block_size,
        left_free: self.block_size,
        right_free: self.block_size,
        lazy: LazyTag::None,
      };
      return;
    }

    let mid = mid(start, end);
    self.build(left_child(node), start, mid);
    self.build(right_child(node), mid + 1, end);
    self.maintain(node);
  }

  fn maintain(
    &mut self,
    node: usize,
  ) {
    let left = self.nodes[left_child(node)];
    let right = self.nodes[right_child(node)];

    let max_free = left
      .max_free
      .max(right.max_free)
      .max(left.right_free + right.left_free);

    // A run from the left edge continues into the right child only when it
    // already covers the whole left child.
    let mut left_free = left.left_free;
    if left.left_free == left.len() {
      left_free += right.left_free;
    }

    let mut right_free = right.right_free;
    if right.right_free == right.len() {
      right_free += left.right_free;
    }

    self.nodes[node] = Node {
      start: left.start,
      end: right.end,
      max_free,
      left_free,
      right_free,
      lazy: LazyTag::None,
    };
  }

  fn push_down(
    &mut self,
    node: usize,
    start: usize,
    end: usize,
  ) {
    if start == end {
      return;
    }

    let lazy = self.nodes[node].lazy;
    if lazy == LazyTag::None {
      return;
    }

    let mid = mid(start, end);
    let spans = [
      (left_child(node), (mid - start + 1) * self.block_size),
      (right_child(node), (end - mid) * self.block_size),
    ];

    for (child, span) in spans {
      let child = &mut self.nodes[child];
      match lazy {
        LazyTag::AllUsed => child.fill(0),
        LazyTag::AllFree => child.fill(span),
        LazyTag::None => {}
      }
      child.lazy = lazy;
    }

    self.nodes[node].lazy = LazyTag::None;
  }

  fn find(
    &mut self,
    node: usize,
    start: usize,
    end: usize,
    size: usize,
  ) -> Option<usize> {
    let current = self.nodes[node];

    if current.max_free < size {
      return None;
    }

    if current.left_free >= size {
      return Some(current.start);
    }

    // A leaf with enough room would have returned above.
    if start == end {
      return None;
    }

    self.push_down(node, start, end);

    let mid = mid(start, end);
    let left = self.nodes[left_child(node)];
    let right = self.nodes[right_child(node)];

    if left.max_free >= size {
      self.find(left_child(node), start, mid, size)
    } else if left.right_free + right.left_free >= size {
      Some(left.end - left.right_free)
    } else {
      self.find(right_child(node), mid + 1, end, size)
    }
  }

  fn update(
    &mut self,
    node: usize,
    start: usize,
    end: usize,
    range: BlockRange,
    status: BlockStatus,
  ) {
    if start > range.right || end < range.left {
      return;
    }

    if start >= range.left && end <= range.right {
      let current = &mut self.nodes[node];
      match status {
        BlockStatus::Used => current.fill(0),
        BlockStatus::Free => current.fill((end - start + 1) * self.block_size),
      }
      current.lazy = status.into();
      return;
    }

    self.push_down(node, start, end);

    let mid = mid(start, end);
    self.update(left_child(node), start, mid, range, status);
    self.update(right_child(node), mid + 1, end, range, status);
    self.maintain(node);
  }

  fn dump_node(
    &self,
    node: usize,
    start: usize,
    end: usize,
    base: usize,
    records: &mut Vec<NodeRecord>,
  ) {
    let current = &self.nodes[node];
    records.push(NodeRecord {
      node_id: node,
      start_block: start,
      end_block: end,
      start_addr: base + current.start,
      end_addr: base + current.end,
      max_free: current.max_free,
      left_free: current.left_free,
      right_free: current.right_free,
      lazy: current.lazy,
    });

    if start == end {
      return;
    }

    let mid = mid(start, end);
    self.dump_node(left_child(node), start, mid, base, records);
    self.dump_node(right_child(node), mid + 1, end, base, records);
  }

  fn collect_free(
    &self,
    node: usize,
    start: usize,
    end: usize,
    regions: &mut Vec<Range<usize>>,
  ) {
    let current = &self.nodes[node];

    let uniform = match current.lazy {
      LazyTag::AllFree => Some(true),
      LazyTag::AllUsed => Some(false),
      LazyTag::None if start == end => Some(current.max_free > 0),
      LazyTag::None if current.max_free == 0 => Some(false),
      LazyTag::None if current.max_free == current.len() => Some(true),
      LazyTag::None => None,
    };

    match uniform {
      Some(true) => match regions.last_mut() {
        Some(last) if last.end == current.start => last.end = current.end,
        _ => regions.push(current.start..current.end),
      },
      Some(false) => {}
      None => {
        let mid = mid(start, end);
        self.collect_free(left_child(node), start, mid, regions);
        self.collect_free(right_child(node), mid + 1, end, regions);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn aggregates(
    tree: &SegmentTree,
    node: usize,
  ) -> (usize, usize, usize) {
    let node = &tree.nodes[node];
    (node.max_free, node.left_free, node.right_free)
  }

  #[test]
  fn test_build_fully_free() {
    let tree = SegmentTree::new(10, 8).unwrap();

    assert_eq!(aggregates(&tree, ROOT_ID), (80, 80, 80));
    assert_eq!(tree.free_regions(), vec![0..80]);
    assert!(tree.nodes.iter().all(|node| node.lazy == LazyTag::None));
  }

  #[test]
  fn test_build_single_block() {
    let mut tree = SegmentTree::new(1, 8).unwrap();

    assert_eq!(aggregates(&tree, ROOT_ID), (8, 8, 8));
    assert_eq!(tree.find_lowest_fit(8), Some(0));
    assert_eq!(tree.find_lowest_fit(9), None);

    tree.update_range(BlockRange::new(0, 0), BlockStatus::Used);
    assert_eq!(aggregates(&tree, ROOT_ID), (0, 0, 0));
    assert_eq!(tree.find_lowest_fit(1), None);
  }

  #[test]
  fn test_build_zero_blocks() {
    assert_eq!(SegmentTree::new(0, 8).unwrap_err(), BuildError::InvalidSize);
  }

  #[test]
  fn test_node_spans() {
    let tree = SegmentTree::new(10, 8).unwrap();
    let records = tree.dump(0);

    // pre-order: root, [0,4], [0,2], [0,1], [0], [1], [2], [3,4], ...
    assert_eq!(records.len(), 19);
    assert_eq!((records[0].start_block, records[0].end_block), (0, 9));
    assert_eq!((records[1].start_block, records[1].end_block), (0, 4));
    assert_eq!((records[2].start_block, records[2].end_block), (0, 2));
    assert_eq!((records[3].start_block, records[3].end_block), (0, 1));
    assert_eq!((records[1].start_addr, records[1].end_addr), (0, 40));
    assert_eq!(records[1].node_id, 1);
    assert_eq!(records[2].node_id, 3);
  }

  #[test]
  fn test_maintain_extends_across_boundary() {
    let mut tree = SegmentTree::new(8, 8).unwrap();

    // used: [2], free elsewhere
    tree.update_range(BlockRange::new(2, 2), BlockStatus::Used);
    assert_eq!(aggregates(&tree, ROOT_ID), (40, 16, 40));

    // used: [2], [5]
    tree.update_range(BlockRange::new(5, 5), BlockStatus::Used);
    assert_eq!(aggregates(&tree, ROOT_ID), (16, 16, 16));
    assert_eq!(tree.free_regions(), vec![0..16, 24..40, 48..64]);
  }

  #[test]
  fn test_find_prefers_lowest_address() {
    let mut tree = SegmentTree::new(8, 8).unwrap();
    tree.update_range(BlockRange::new(0, 0), BlockStatus::Used);
    tree.update_range(BlockRange::new(3, 3), BlockStatus::Used);

    assert_eq!(tree.find_lowest_fit(8), Some(8));
    assert_eq!(tree.find_lowest_fit(16), Some(8));
    assert_eq!(tree.find_lowest_fit(24), Some(32));
    assert_eq!(tree.find_lowest_fit(32), Some(32));
    assert_eq!(tree.find_lowest_fit(40), None);
  }

  #[test]
  fn test_find_straddling_run() {
    let mut tree = SegmentTree::new(8, 8).unwrap();
    // free run [2,5] straddles the root boundary between blocks 3 and 4
    tree.update_range(BlockRange::new(0, 1), BlockStatus::Used);
    tree.update_range(BlockRange::new(6, 7), BlockStatus::Used);

    assert_eq!(tree.find_lowest_fit(32), Some(16));
    assert_eq!(tree.find_lowest_fit(24), Some(16));
  }

  #[test]
  fn test_full_cover_sets_lazy_tag() {
    let mut tree = SegmentTree::new(8, 8).unwrap();
    tree.update_range(BlockRange::new(0, 7), BlockStatus::Used);

    assert_eq!(tree.nodes[ROOT_ID].lazy, LazyTag::AllUsed);
    assert_eq!(aggregates(&tree, ROOT_ID), (0, 0, 0));
    // children keep their stale aggregates until pushed down
    assert_eq!(aggregates(&tree, left_child(ROOT_ID)), (32, 32, 32));
    assert!(tree.free_regions().is_empty());
  }

  #[test]
  fn test_push_down_hands_tag_to_children() {
    let mut tree = SegmentTree::new(8, 8).unwrap();
    tree.update_range(BlockRange::new(0, 7), BlockStatus::Used);
    tree.update_range(BlockRange::new(6, 7), BlockStatus::Free);

    let root = ROOT_ID;
    let left = left_child(root);
    assert_eq!(tree.nodes[root].lazy, LazyTag::None);
    assert_eq!(tree.nodes[left].lazy, LazyTag::AllUsed);
    assert_eq!(aggregates(&tree, left), (0, 0, 0));
    assert_eq!(aggregates(&tree, root), (16, 0, 16));
    assert_eq!(tree.free_regions(), vec![48..64]);
  }

  #[test]
  fn test_push_down_free_uses_child_spans() {
    let mut tree = SegmentTree::new(5, 8).unwrap();
    tree.update_range(BlockRange::new(0, 4), BlockStatus::Used);
    tree.update_range(BlockRange::new(0, 4), BlockStatus::Free);
    tree.update_range(BlockRange::new(0, 0), BlockStatus::Used);

    // root [0,4] splits into [0,2] and [3,4]
    let right = right_child(ROOT_ID);
    assert_eq!(tree.nodes[right].lazy, LazyTag::AllFree);
    assert_eq!(aggregates(&tree, right), (16, 16, 16));
    assert_eq!(aggregates(&tree, ROOT_ID), (32, 0, 32));
  }

  #[test]
  fn test_find_through_stale_children() {
    let mut tree = SegmentTree::new(8, 8).unwrap();
    tree.update_range(BlockRange::new(0, 7), BlockStatus::Used);
    tree.update_range(BlockRange::new(0, 7), BlockStatus::Free);
    tree.update_range(BlockRange::new(0, 2), BlockStatus::Used);

    assert_eq!(tree.find_lowest_fit(8), Some(24));
    assert_eq!(tree.find_lowest_fit(40), Some(24));
  }

  #[test]
  fn test_record_display() {
    let tree = SegmentTree::new(2, 8).unwrap();
    let records = tree.dump(0x1000);

    assert_eq!(
      records[0].to_string(),
      "nodeid[0],startid[0],endid[1],startaddr[0x1000],endaddr[0x1010],max[16],leftmax[16],rightmax[16],lazy[none]"
    );
  }
}
