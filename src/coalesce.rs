use crate::{
  allocator::Allocator,
  arena::Arena,
  block::Block,
  tag::Tag,
};

impl<A: Arena> Allocator<A> {
  /// Merges a free block with whichever of its neighbours are free and
  /// returns the surviving block, which is back on its free list.
  ///
  /// `block` must be free and already on a free list.
  ///
  /// ```text
  ///   prev   block   next          result
  ///   ────   ─────   ────          ─────────────────────────
  ///   used   free    used    →     block unchanged
  ///   used   free    free    →     block + next
  ///   free   free    used    →     prev + block
  ///   free   free    free    →     prev + block + next
  /// ```
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let tag = self.mem.tag(block);
    debug_assert!(!tag.is_allocated());

    let size = tag.size();
    let next = block.next(size);
    let next_tag = self.mem.tag(next);

    match (tag.is_prev_allocated(), next_tag.is_allocated()) {
      (true, true) => block,
      (true, false) => {
        let after = next.next(next_tag.size());

        self.lists.remove(&mut self.mem, block);
        self.lists.remove(&mut self.mem, next);

        self.merge_into(block, tag, size + next_tag.size(), after)
      }
      (false, true) => {
        let prev = self.mem.prev(block);
        let prev_tag = self.mem.tag(prev);

        self.lists.remove(&mut self.mem, block);
        self.lists.remove(&mut self.mem, prev);

        self.merge_into(prev, prev_tag, prev_tag.size() + size, next)
      }
      (false, false) => {
        let prev = self.mem.prev(block);
        let prev_tag = self.mem.tag(prev);
        let after = next.next(next_tag.size());

        self.lists.remove(&mut self.mem, prev);
        self.lists.remove(&mut self.mem, block);
        self.lists.remove(&mut self.mem, next);

        self.merge_into(prev, prev_tag, prev_tag.size() + size + next_tag.size(), after)
      }
    }
  }

  /// Rewrites `first` as one free block of `size` bytes, lists it, and clears
  /// the stale minimum-predecessor bit on `after`, the block that now follows.
  fn merge_into(
    &mut self,
    first: Block,
    first_tag: Tag,
    size: usize,
    after: Block,
  ) -> Block {
    self.mem.write_tags(first, first_tag.with_size(size).with_allocated(false));
    self.lists.insert(&mut self.mem, first);

    debug_assert!(self.mem.tag(after).is_allocated());
    self.mem.update_tags(after, |t| t.with_prev_minimum(false));

    first
  }
}
