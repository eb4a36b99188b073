use crate::tag::{MIN_BLOCK_SIZE, WSIZE};

/// A block, identified by the arena offset of its header word.
///
/// ```text
///   allocated:  ┌────────┬──────────────────────────────┐
///               │ header │ payload ...                  │
///               └────────┴──────────────────────────────┘
///   free:       ┌────────┬────────┬────────┬─────┬────────┐
///               │ header │  next  │  prev  │ ... │ footer │
///               └────────┴────────┴────────┴─────┴────────┘
///   minimum:    ┌────────┬────────┐
///               │ header │  next  │
///               └────────┴────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
  pub const fn at(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn offset(self) -> usize {
    self.0
  }

  pub const fn from_payload(payload: usize) -> Self {
    Self(payload - WSIZE)
  }

  pub const fn payload(self) -> usize {
    self.0 + WSIZE
  }

  /// Forward free-list link; overlays the first payload word.
  pub const fn next_link(self) -> usize {
    self.payload()
  }

  /// Backward free-list link; absent in minimum blocks.
  pub const fn prev_link(self) -> usize {
    self.payload() + WSIZE
  }

  /// Footer word of a block of `size` bytes. Only meaningful while the block
  /// is free and larger than the minimum.
  pub const fn footer(
    self,
    size: usize,
  ) -> usize {
    self.payload() + size - 2 * WSIZE
  }

  pub const fn next(
    self,
    size: usize,
  ) -> Self {
    debug_assert!(size != 0);
    Self(self.0 + size)
  }

  /// Footer word of the block that precedes this one.
  pub const fn prev_footer(self) -> usize {
    self.0 - WSIZE
  }

  pub const fn prev(
    self,
    prev_size: usize,
  ) -> Self {
    Self(self.0 - prev_size)
  }

  /// The preceding block when it is known to be exactly minimum-sized.
  pub const fn prev_minimum(self) -> Self {
    Self(self.0 - MIN_BLOCK_SIZE)
  }
}
