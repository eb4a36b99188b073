use std::ptr::NonNull;

use crate::{
  block::Block,
  free_list::LinkStore,
  tag::{ALIGNMENT, MIN_BLOCK_SIZE, Tag, WSIZE, Word},
};

/// Word-granular view over the owned part of the arena.
///
/// All heap reads and writes go through here, addressed by offset from the
/// arena's low watermark and bounds-checked against the current heap size.
pub(crate) struct Memory {
  base: NonNull<u8>,
  len: usize,
}

impl Memory {
  /// # Safety
  ///
  /// `base..base + len` must be readable and writable for as long as this
  /// view (and any later [`Memory::grow_to`] length) is in use.
  pub unsafe fn new(
    base: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self { base, len }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// # Safety
  ///
  /// The arena must now own at least `len` bytes from `base`.
  pub unsafe fn grow_to(
    &mut self,
    len: usize,
  ) {
    debug_assert!(len >= self.len);
    self.len = len;
  }

  pub fn word(
    &self,
    offset: usize,
  ) -> Word {
    self.check(offset);
    unsafe { self.base.as_ptr().add(offset).cast::<Word>().read() }
  }

  pub fn set_word(
    &mut self,
    offset: usize,
    value: Word,
  ) {
    self.check(offset);
    unsafe { self.base.as_ptr().add(offset).cast::<Word>().write(value) }
  }

  fn check(
    &self,
    offset: usize,
  ) {
    assert!(
      offset % WSIZE == 0 && offset + WSIZE <= self.len,
      "heap word at offset {offset} outside of {} owned bytes",
      self.len
    );
  }

  pub fn tag(
    &self,
    block: Block,
  ) -> Tag {
    Tag::from_bits(self.word(block.offset()))
  }

  pub fn set_header(
    &mut self,
    block: Block,
    tag: Tag,
  ) {
    self.set_word(block.offset(), tag.bits());
  }

  pub fn footer(
    &self,
    block: Block,
    size: usize,
  ) -> Tag {
    Tag::from_bits(self.word(block.footer(size)))
  }

  /// Writes the header, and the footer too when `tag` describes a free block
  /// larger than the minimum.
  pub fn write_tags(
    &mut self,
    block: Block,
    tag: Tag,
  ) {
    self.set_header(block, tag);
    if !tag.is_allocated() && tag.size() > MIN_BLOCK_SIZE {
      self.set_word(block.footer(tag.size()), tag.bits());
    }
  }

  /// Rewrites a block's tags through `update`, keeping the footer in sync.
  pub fn update_tags(
    &mut self,
    block: Block,
    update: impl FnOnce(Tag) -> Tag,
  ) {
    let tag = update(self.tag(block));
    self.write_tags(block, tag);
  }

  pub fn next(
    &self,
    block: Block,
  ) -> Block {
    block.next(self.tag(block).size())
  }

  /// Previous block in address order.
  ///
  /// Only valid while the previous block is free: either it is minimum-sized
  /// (and this block's tag says so) or it carries a footer.
  pub fn prev(
    &self,
    block: Block,
  ) -> Block {
    let tag = self.tag(block);
    debug_assert!(!tag.is_prev_allocated());

    if tag.is_prev_minimum() {
      block.prev_minimum()
    } else {
      let footer = Tag::from_bits(self.word(block.prev_footer()));
      block.prev(footer.size())
    }
  }

  pub fn payload_ptr(
    &self,
    block: Block,
  ) -> *mut u8 {
    unsafe { self.base.as_ptr().add(block.payload()) }
  }

  /// Maps a payload pointer back to its block, or `None` if the pointer
  /// cannot be a payload inside this heap.
  pub fn block_of(
    &self,
    ptr: *const u8,
  ) -> Option<Block> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;

    let in_heap = offset >= 2 * WSIZE && offset < self.len;
    if !in_heap || offset % ALIGNMENT != 0 {
      return None;
    }
    Some(Block::from_payload(offset))
  }

  fn link(
    &self,
    offset: usize,
  ) -> Option<Block> {
    match self.word(offset) {
      0 => None,
      raw => Some(Block::at(raw as usize)),
    }
  }

  fn set_link(
    &mut self,
    offset: usize,
    block: Option<Block>,
  ) {
    self.set_word(offset, block.map_or(0, |b| b.offset() as Word));
  }
}

// Offset 0 is the prologue, never a block, so it doubles as the null link.
impl LinkStore for Memory {
  fn block_size(
    &self,
    block: Block,
  ) -> usize {
    self.tag(block).size()
  }

  fn next_free(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.link(block.next_link())
  }

  fn set_next_free(
    &mut self,
    block: Block,
    next: Option<Block>,
  ) {
    self.set_link(block.next_link(), next);
  }

  fn prev_free(
    &self,
    block: Block,
  ) -> Option<Block> {
    debug_assert!(self.block_size(block) > MIN_BLOCK_SIZE);
    self.link(block.prev_link())
  }

  fn set_prev_free(
    &mut self,
    block: Block,
    prev: Option<Block>,
  ) {
    debug_assert!(self.block_size(block) > MIN_BLOCK_SIZE);
    self.set_link(block.prev_link(), prev);
  }
}
