use std::ptr;

use tracing::{debug, trace, warn};

use crate::{
  arena::{Arena, MmapArena},
  block::Block,
  config::Config,
  error::Error,
  free_list::SegregatedLists,
  memory::Memory,
  tag::{ALIGNMENT, MIN_BLOCK_SIZE, Tag, WSIZE},
};

/// Offset of the prologue word; the first real block header follows it.
const PROLOGUE: usize = 0;

/// Segregated-fit allocator over one [`Arena`].
///
/// ```text
///   arena low                                                   arena high
///   ┌──────────┬─────────┬─────────┬─────────┬───── ─ ─ ─┬──────────┐
///   │ prologue │ block 0 │ block 1 │ block 2 │    ...     │ epilogue │
///   │  0 | A P │         │         │         │            │  0 | A   │
///   └──────────┴─────────┴─────────┴─────────┴───── ─ ─ ─┴──────────┘
///      8 bytes                                               8 bytes
/// ```
///
/// Not thread-safe: every call mutates block tags and free lists in place.
pub struct Allocator<A: Arena = MmapArena> {
  arena: A,
  pub(crate) mem: Memory,
  pub(crate) lists: SegregatedLists,
  config: Config,
}

impl Allocator<MmapArena> {
  /// An allocator over a fresh [`MmapArena`] with the default config.
  pub fn new() -> Result<Self, Error> {
    Self::with_config(Config::default())
  }

  pub fn with_config(config: Config) -> Result<Self, Error> {
    config.validate()?;
    let arena = MmapArena::with_capacity(config.arena_capacity)?;
    Self::init(arena, config)
  }
}

impl<A: Arena> Allocator<A> {
  /// Installs the prologue and epilogue at the arena's current break, then
  /// grows the heap by one chunk.
  pub fn init(
    mut arena: A,
    config: Config,
  ) -> Result<Self, Error> {
    config.validate()?;

    let base = arena.low();
    let start = arena.extend(2 * WSIZE)?;
    if start != base {
      return Err(Error::Discontiguous {
        expected: base.as_ptr() as usize,
        actual: start.as_ptr() as usize,
      });
    }

    let mem = unsafe { Memory::new(base, arena.size()) };
    let lists = SegregatedLists::new(config.chunk_size);
    let mut allocator = Self {
      arena,
      mem,
      lists,
      config,
    };

    let epilogue = allocator.epilogue();
    allocator.mem.set_word(PROLOGUE, Tag::SENTINEL.bits());
    allocator.mem.set_header(epilogue, Tag::SENTINEL);
    allocator.extend_heap(allocator.config.chunk_size)?;

    debug!(
      chunk_size = allocator.config.chunk_size,
      heap_size = allocator.heap_size(),
      "allocator initialised"
    );

    Ok(allocator)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Bytes currently owned, sentinels included.
  pub fn heap_size(&self) -> usize {
    self.mem.len()
  }

  /// Returns a 16-byte aligned pointer to at least `size` bytes, or null when
  /// `size` is zero or the arena cannot grow.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    self.check_heap_if_enabled();

    if size == 0 {
      return ptr::null_mut();
    }

    let Some(asize) = adjusted_size(size) else {
      warn!(requested = size, "allocation size overflows");
      return ptr::null_mut();
    };

    let block = match self.lists.find_fit(&self.mem, asize) {
      Some(block) => block,
      None => match self.extend_heap(asize.max(self.config.chunk_size)) {
        Ok(block) => block,
        Err(err) => {
          warn!(requested = size, error = %err, "allocation failed");
          return ptr::null_mut();
        }
      },
    };

    self.place(block, asize);

    trace!(size, asize, offset = block.offset(), "allocated block");
    self.check_heap_if_enabled();

    self.mem.payload_ptr(block)
  }

  /// Returns a block to the heap. Null is ignored.
  ///
  /// # Panics
  ///
  /// If `ptr` is not a payload pointer inside this heap, or its block is not
  /// allocated.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or have been returned by this allocator and not yet
  /// released.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }
    self.check_heap_if_enabled();

    let block = self.owned_block(ptr);
    let tag = self.mem.tag(block);
    let size = tag.size();

    self.mem.write_tags(block, tag.with_allocated(false));
    self.lists.insert(&mut self.mem, block);

    let next = self.mem.next(block);
    self.mem.update_tags(next, |t| t.with_prev_allocated(false));

    let merged = self.coalesce(block);

    trace!(size, offset = block.offset(), merged = merged.offset(), "released block");
    self.check_heap_if_enabled();
  }

  /// Resizes an allocation by moving it.
  ///
  /// Null `ptr` behaves like [`alloc`](Self::alloc); zero `size` releases
  /// `ptr` and returns null. If the new block cannot be allocated, null is
  /// returned and `ptr` stays valid.
  ///
  /// # Safety
  ///
  /// Same contract as [`release`](Self::release).
  pub unsafe fn realloc(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      unsafe { self.release(ptr) };
      return ptr::null_mut();
    }

    if ptr.is_null() {
      return self.alloc(size);
    }

    let old_size = unsafe { self.usable_size(ptr) };

    let new_ptr = self.alloc(size);
    if new_ptr.is_null() {
      return new_ptr;
    }

    unsafe {
      ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(size));
      self.release(ptr);
    }

    new_ptr
  }

  /// Zeroed storage for `count` elements of `elem_size` bytes; null if the
  /// product overflows or is zero.
  pub fn calloc(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    let Some(bytes) = count.checked_mul(elem_size) else {
      warn!(count, elem_size, "calloc size overflows");
      return ptr::null_mut();
    };

    let ptr = self.alloc(bytes);
    if !ptr.is_null() {
      unsafe { ptr::write_bytes(ptr, 0, bytes) };
    }
    ptr
  }

  /// Payload bytes available behind `ptr`.
  ///
  /// # Safety
  ///
  /// Same contract as [`release`](Self::release); `ptr` must not be null.
  pub unsafe fn usable_size(
    &self,
    ptr: *const u8,
  ) -> usize {
    self.mem.tag(self.owned_block(ptr)).size() - WSIZE
  }

  fn owned_block(
    &self,
    ptr: *const u8,
  ) -> Block {
    let Some(block) = self.mem.block_of(ptr) else {
      panic!("pointer {ptr:p} was not returned by this allocator");
    };

    let tag = self.mem.tag(block);
    assert!(
      tag.is_allocated() && !tag.is_sentinel(),
      "pointer {ptr:p} does not refer to an allocated block"
    );
    block
  }

  /// Takes a free block off its list, marks it allocated and splits off the
  /// tail beyond `asize` if it can stand as a block of its own.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    self.lists.remove(&mut self.mem, block);

    let tag = self.mem.tag(block);
    debug_assert!(!tag.is_allocated() && tag.size() >= asize);

    self.mem.set_header(block, tag.with_allocated(true));

    let next = block.next(tag.size());
    self.mem.update_tags(next, |t| {
      t.with_prev_allocated(true)
        .with_prev_minimum(tag.size() == MIN_BLOCK_SIZE)
    });

    self.split(block, asize);
  }

  fn split(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let tag = self.mem.tag(block);
    let size = tag.size();

    if size - asize < MIN_BLOCK_SIZE {
      return;
    }

    self.mem.set_header(block, tag.with_size(asize));

    let rest = block.next(asize);
    let rest_size = size - asize;
    self.mem.write_tags(rest, Tag::new(rest_size, asize == MIN_BLOCK_SIZE, true, false));
    self.lists.insert(&mut self.mem, rest);

    let after = rest.next(rest_size);
    self.mem.update_tags(after, |t| {
      t.with_prev_allocated(false)
        .with_prev_minimum(rest_size == MIN_BLOCK_SIZE)
    });
  }

  /// Grows the arena by `size` bytes (rounded to the alignment). The old
  /// epilogue becomes the header of the new free block, a new epilogue goes
  /// at the end, and the block is merged with a free block before it.
  fn extend_heap(
    &mut self,
    size: usize,
  ) -> Result<Block, Error> {
    let size = crate::align::checked_align(size, ALIGNMENT).ok_or(Error::OutOfMemory { requested: size })?;
    let old_epilogue = self.mem.tag(self.epilogue());

    let start = self.arena.extend(size)?;
    let expected = self.arena.low().as_ptr() as usize + self.mem.len();
    if start.as_ptr() as usize != expected {
      return Err(Error::Discontiguous {
        expected,
        actual: start.as_ptr() as usize,
      });
    }

    let block = self.epilogue();
    unsafe { self.mem.grow_to(self.mem.len() + size) };

    let tag = Tag::new(size, old_epilogue.is_prev_minimum(), old_epilogue.is_prev_allocated(), false);
    self.mem.write_tags(block, tag);
    self.lists.insert(&mut self.mem, block);
    self.mem.set_header(block.next(size), Tag::new(0, false, false, true));

    debug!(bytes = size, heap_size = self.mem.len(), "extended heap");

    Ok(self.coalesce(block))
  }

  pub(crate) fn epilogue(&self) -> Block {
    Block::at(self.mem.len() - WSIZE)
  }

  fn check_heap_if_enabled(&self) {
    if self.config.check_heap {
      if let Err(violation) = self.check_heap() {
        panic!("heap check failed: {violation}");
      }
    }
  }
}

/// Block size needed to serve `size` payload bytes: one header word plus the
/// payload, rounded up to the alignment, never below the minimum block.
fn adjusted_size(size: usize) -> Option<usize> {
  let padded = crate::align::checked_align(size.checked_add(WSIZE)?, ALIGNMENT)?;
  Some(padded.max(MIN_BLOCK_SIZE))
}
