//! Boundary tags.
//!
//! Every block starts with a one-word header; free blocks larger than the
//! minimum also end with a footer holding the same word.
//!
//! ```text
//!   63                                      4   3   2   1   0
//!   ┌────────────────────────────────────────┬───┬───┬───┬───┐
//!   │              size >> 4                 │ - │ M │ P │ A │
//!   └────────────────────────────────────────┴───┴───┴───┴───┘
//!
//!   A = this block is allocated
//!   P = the previous block is allocated
//!   M = the previous block is exactly MIN_BLOCK_SIZE bytes
//! ```

use std::fmt;

/// The on-heap word used for headers, footers and free-list links.
pub type Word = u64;

/// Word size in bytes.
pub const WSIZE: usize = size_of::<Word>();

/// Double word size in bytes.
pub const DSIZE: usize = 2 * WSIZE;

/// Granularity of block sizes and payload addresses.
pub const ALIGNMENT: usize = DSIZE;

/// One header word plus one link word.
pub const MIN_BLOCK_SIZE: usize = DSIZE;

const ALLOC_BIT: Word = 0x1;
const PREV_ALLOC_BIT: Word = 0x2;
const PREV_MIN_BIT: Word = 0x4;
const SIZE_MASK: Word = !0xF;

/// A packed `(size, prev_is_minimum, prev_allocated, allocated)` word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(Word);

impl Tag {
  /// Prologue and initial epilogue: zero-sized, allocated, previous allocated.
  pub const SENTINEL: Tag = Tag::new(0, false, true, true);

  /// Packs a tag. `size` must be a multiple of [`ALIGNMENT`].
  pub const fn new(
    size: usize,
    prev_is_minimum: bool,
    prev_allocated: bool,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0);

    let mut word = size as Word;
    if prev_is_minimum {
      word |= PREV_MIN_BIT;
    }
    if prev_allocated {
      word |= PREV_ALLOC_BIT;
    }
    if allocated {
      word |= ALLOC_BIT;
    }
    Self(word)
  }

  pub const fn from_bits(word: Word) -> Self {
    Self(word)
  }

  pub const fn bits(self) -> Word {
    self.0
  }

  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }

  pub const fn is_prev_allocated(self) -> bool {
    self.0 & PREV_ALLOC_BIT != 0
  }

  pub const fn is_prev_minimum(self) -> bool {
    self.0 & PREV_MIN_BIT != 0
  }

  /// True for the zero-sized prologue and epilogue words.
  pub const fn is_sentinel(self) -> bool {
    self.size() == 0
  }

  pub const fn with_size(
    self,
    size: usize,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0);
    Self((self.0 & !SIZE_MASK) | size as Word)
  }

  pub const fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Self::set(self.0, ALLOC_BIT, allocated)
  }

  pub const fn with_prev_allocated(
    self,
    prev_allocated: bool,
  ) -> Self {
    Self::set(self.0, PREV_ALLOC_BIT, prev_allocated)
  }

  pub const fn with_prev_minimum(
    self,
    prev_is_minimum: bool,
  ) -> Self {
    Self::set(self.0, PREV_MIN_BIT, prev_is_minimum)
  }

  const fn set(
    word: Word,
    bit: Word,
    on: bool,
  ) -> Self {
    if on { Self(word | bit) } else { Self(word & !bit) }
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Tag")
      .field("size", &self.size())
      .field("allocated", &self.is_allocated())
      .field("prev_allocated", &self.is_prev_allocated())
      .field("prev_is_minimum", &self.is_prev_minimum())
      .finish()
  }
}
