//! Segregated free lists.
//!
//! ```text
//!   class   holds                       links
//!   ─────   ─────────────────────────   ───────────────
//!     0     size >= C                   doubly linked
//!    1-6    size >= C >> class          doubly linked
//!     7     size == C >> 7              doubly linked
//!     8     everything else             doubly linked
//!     9     48 bytes                    doubly linked
//!    10     32 bytes                    doubly linked
//!    11     16 bytes (minimum)          singly linked
//!
//!   C = chunk size (heap growth increment)
//! ```
//!
//! New blocks go in at the head. Fit search starts from the block's own
//! class and walks toward class 0, visiting each doubly linked class from
//! tail to head so the oldest block is tried first.

use crate::{block::Block, tag::MIN_BLOCK_SIZE};

pub const CLASS_COUNT: usize = 12;

/// The singly linked class reserved for minimum-sized blocks.
pub const MIN_CLASS: usize = CLASS_COUNT - 1;

/// The largest class index that is still picked by a `>=` threshold.
const GEOMETRIC_CLASSES: usize = 6;

/// Where free-list links live. Implemented by the heap itself; tests use a
/// map.
pub(crate) trait LinkStore {
  fn block_size(
    &self,
    block: Block,
  ) -> usize;

  fn next_free(
    &self,
    block: Block,
  ) -> Option<Block>;

  fn set_next_free(
    &mut self,
    block: Block,
    next: Option<Block>,
  );

  /// Never called for minimum-sized blocks.
  fn prev_free(
    &self,
    block: Block,
  ) -> Option<Block>;

  /// Never called for minimum-sized blocks.
  fn set_prev_free(
    &mut self,
    block: Block,
    prev: Option<Block>,
  );
}

pub(crate) struct SegregatedLists {
  chunk_size: usize,
  heads: [Option<Block>; CLASS_COUNT],
  tails: [Option<Block>; CLASS_COUNT],
}

impl SegregatedLists {
  pub fn new(chunk_size: usize) -> Self {
    Self {
      chunk_size,
      heads: [None; CLASS_COUNT],
      tails: [None; CLASS_COUNT],
    }
  }

  /// Size class for a block of `size` bytes. Total over every valid size.
  pub fn classify(
    &self,
    size: usize,
  ) -> usize {
    match size {
      MIN_BLOCK_SIZE => MIN_CLASS,
      s if s == 2 * MIN_BLOCK_SIZE => MIN_CLASS - 1,
      s if s == 3 * MIN_BLOCK_SIZE => MIN_CLASS - 2,
      s => (0..=GEOMETRIC_CLASSES)
        .find(|&class| s >= self.chunk_size >> class)
        .unwrap_or(if s == self.chunk_size >> 7 { 7 } else { 8 }),
    }
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<Block> {
    self.heads[class]
  }

  pub fn tail(
    &self,
    class: usize,
  ) -> Option<Block> {
    self.tails[class]
  }

  pub fn insert<S: LinkStore>(
    &mut self,
    store: &mut S,
    block: Block,
  ) {
    let class = self.classify(store.block_size(block));
    let head = self.heads[class];

    store.set_next_free(block, head);
    if class != MIN_CLASS {
      store.set_prev_free(block, None);
      match head {
        Some(head) => store.set_prev_free(head, Some(block)),
        None => self.tails[class] = Some(block),
      }
    }
    self.heads[class] = Some(block);
  }

  pub fn remove<S: LinkStore>(
    &mut self,
    store: &mut S,
    block: Block,
  ) {
    let class = self.classify(store.block_size(block));

    if class == MIN_CLASS {
      self.remove_minimum(store, block);
      return;
    }

    let next = store.next_free(block);
    let prev = store.prev_free(block);

    match prev {
      Some(prev) => store.set_next_free(prev, next),
      None => self.heads[class] = next,
    }
    match next {
      Some(next) => store.set_prev_free(next, prev),
      None => self.tails[class] = prev,
    }
  }

  fn remove_minimum<S: LinkStore>(
    &mut self,
    store: &mut S,
    block: Block,
  ) {
    let mut prev: Option<Block> = None;
    let mut current = self.heads[MIN_CLASS];

    while let Some(candidate) = current {
      let next = store.next_free(candidate);

      if candidate == block {
        match prev {
          Some(prev) => store.set_next_free(prev, next),
          None => self.heads[MIN_CLASS] = next,
        }
        return;
      }

      prev = Some(candidate);
      current = next;
    }

    panic!("free block at offset {} missing from the minimum class", block.offset());
  }

  /// First block of at least `size` bytes, searching from `size`'s class
  /// toward larger classes.
  pub fn find_fit<S: LinkStore>(
    &self,
    store: &S,
    size: usize,
  ) -> Option<Block> {
    (0..=self.classify(size)).rev().find_map(|class| {
      if class == MIN_CLASS {
        return self.heads[MIN_CLASS];
      }

      let mut current = self.tails[class];
      while let Some(block) = current {
        if store.block_size(block) >= size {
          return Some(block);
        }
        current = store.prev_free(block);
      }
      None
    })
  }

  /// Blocks of one class from head to tail.
  #[cfg(test)]
  pub fn members<'a, S: LinkStore>(
    &'a self,
    store: &'a S,
    class: usize,
  ) -> impl Iterator<Item = Block> + 'a {
    std::iter::successors(self.heads[class], move |&block| store.next_free(block))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  const CHUNK: usize = 1 << 14;

  #[derive(Default)]
  struct MapStore {
    sizes: HashMap<Block, usize>,
    next: HashMap<Block, Option<Block>>,
    prev: HashMap<Block, Option<Block>>,
  }

  impl MapStore {
    fn block(
      &mut self,
      offset: usize,
      size: usize,
    ) -> Block {
      let block = Block::at(offset);
      self.sizes.insert(block, size);
      block
    }
  }

  impl LinkStore for MapStore {
    fn block_size(
      &self,
      block: Block,
    ) -> usize {
      self.sizes[&block]
    }

    fn next_free(
      &self,
      block: Block,
    ) -> Option<Block> {
      self.next[&block]
    }

    fn set_next_free(
      &mut self,
      block: Block,
      next: Option<Block>,
    ) {
      self.next.insert(block, next);
    }

    fn prev_free(
      &self,
      block: Block,
    ) -> Option<Block> {
      assert!(self.sizes[&block] > MIN_BLOCK_SIZE, "backward link on minimum block");
      self.prev[&block]
    }

    fn set_prev_free(
      &mut self,
      block: Block,
      prev: Option<Block>,
    ) {
      assert!(self.sizes[&block] > MIN_BLOCK_SIZE, "backward link on minimum block");
      self.prev.insert(block, prev);
    }
  }

  #[test]
  fn test_classify_reference_ladder() {
    let lists = SegregatedLists::new(CHUNK);

    assert_eq!(lists.classify(16), MIN_CLASS);
    assert_eq!(lists.classify(32), 10);
    assert_eq!(lists.classify(48), 9);
    assert_eq!(lists.classify(64), 8);
    assert_eq!(lists.classify(112), 8);
    assert_eq!(lists.classify(128), 7);
    assert_eq!(lists.classify(144), 8);
    assert_eq!(lists.classify(240), 8);
    assert_eq!(lists.classify(256), 6);
    assert_eq!(lists.classify(511), 6);
    assert_eq!(lists.classify(512), 5);
    assert_eq!(lists.classify(8192), 1);
    assert_eq!(lists.classify(16384), 0);
    assert_eq!(lists.classify(1 << 30), 0);
  }

  #[test]
  fn test_classify_is_total_for_any_chunk() {
    for chunk in [1 << 10, 1 << 12, 1 << 14, 1 << 20] {
      let lists = SegregatedLists::new(chunk);
      for size in (MIN_BLOCK_SIZE..4 * chunk).step_by(MIN_BLOCK_SIZE) {
        assert!(lists.classify(size) < CLASS_COUNT, "size {size}, chunk {chunk}");
      }
    }
  }

  #[test]
  fn test_insert_at_head_and_fit_oldest_first() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let first = store.block(1000, 600);
    let second = store.block(2000, 700);
    let third = store.block(3000, 520);
    for block in [first, second, third] {
      lists.insert(&mut store, block);
    }

    assert_eq!(lists.head(5), Some(third));
    assert_eq!(lists.tail(5), Some(first));
    assert_eq!(lists.members(&store, 5).collect::<Vec<_>>(), vec![third, second, first]);

    assert_eq!(lists.find_fit(&store, 512), Some(first));
    assert_eq!(lists.find_fit(&store, 608), Some(second));
    assert_eq!(lists.find_fit(&store, 720), None);
  }

  #[test]
  fn test_fit_widens_toward_larger_classes() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let big = store.block(100, 4096);
    let huge = store.block(9000, CHUNK);
    lists.insert(&mut store, huge);
    lists.insert(&mut store, big);

    assert_eq!(lists.find_fit(&store, 16), Some(big));
    assert_eq!(lists.find_fit(&store, 200), Some(big));
    assert_eq!(lists.find_fit(&store, 4112), Some(huge));
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let blocks: Vec<_> = (0..4).map(|i| store.block(1000 * (i + 1), 300)).collect();
    for &block in &blocks {
      lists.insert(&mut store, block);
    }

    lists.remove(&mut store, blocks[2]);
    assert_eq!(lists.members(&store, 6).collect::<Vec<_>>(), vec![blocks[3], blocks[1], blocks[0]]);

    lists.remove(&mut store, blocks[3]);
    lists.remove(&mut store, blocks[0]);
    assert_eq!(lists.head(6), Some(blocks[1]));
    assert_eq!(lists.tail(6), Some(blocks[1]));
    assert_eq!(store.prev_free(blocks[1]), None);
    assert_eq!(store.next_free(blocks[1]), None);

    lists.remove(&mut store, blocks[1]);
    assert_eq!(lists.head(6), None);
    assert_eq!(lists.tail(6), None);
  }

  #[test]
  fn test_minimum_class_is_singly_linked() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let blocks: Vec<_> = (0..3).map(|i| store.block(16 * (2 * i + 1), MIN_BLOCK_SIZE)).collect();
    for &block in &blocks {
      lists.insert(&mut store, block);
    }
    assert!(store.prev.is_empty());
    assert_eq!(lists.find_fit(&store, MIN_BLOCK_SIZE), Some(blocks[2]));

    lists.remove(&mut store, blocks[1]);
    assert_eq!(lists.members(&store, MIN_CLASS).collect::<Vec<_>>(), vec![blocks[2], blocks[0]]);

    lists.remove(&mut store, blocks[2]);
    lists.remove(&mut store, blocks[0]);
    assert_eq!(lists.head(MIN_CLASS), None);
    assert_eq!(lists.find_fit(&store, MIN_BLOCK_SIZE), None);
  }

  #[test]
  fn test_minimum_fit_falls_through_to_larger_classes() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let pair = store.block(64, 32);
    lists.insert(&mut store, pair);

    assert_eq!(lists.find_fit(&store, MIN_BLOCK_SIZE), Some(pair));
  }

  #[test]
  #[should_panic(expected = "missing from the minimum class")]
  fn test_removing_unknown_minimum_block_panics() {
    let mut store = MapStore::default();
    let mut lists = SegregatedLists::new(CHUNK);

    let listed = store.block(16, MIN_BLOCK_SIZE);
    let stray = store.block(48, MIN_BLOCK_SIZE);
    lists.insert(&mut store, listed);
    lists.remove(&mut store, stray);
  }
}
