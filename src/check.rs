//! Heap walking and consistency checking.

use std::fmt;

use crate::{
  allocator::Allocator,
  arena::Arena,
  block::Block,
  free_list::{CLASS_COUNT, LinkStore, MIN_CLASS},
  memory::Memory,
  tag::{ALIGNMENT, MIN_BLOCK_SIZE, Tag, WSIZE},
};

/// One block as seen by [`Allocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the arena's low watermark.
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
}

/// Totals gathered by a successful [`Allocator::check_heap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapReport {
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
}

/// First inconsistency found by [`Allocator::check_heap`]. Offsets are
/// header offsets from the arena's low watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapViolation {
  BadPrologue { word: u64 },
  BadEpilogue { offset: usize, word: u64 },
  BadSize { offset: usize, size: usize },
  Misaligned { offset: usize },
  OutOfBounds { offset: usize, size: usize },
  AdjacentFree { offset: usize },
  StalePrevAllocated { offset: usize },
  StalePrevMinimum { offset: usize },
  FooterMismatch { offset: usize },
  AllocatedInFreeList { class: usize, offset: usize },
  WrongClass { class: usize, offset: usize, size: usize },
  BrokenLink { class: usize, offset: usize },
  BadTail { class: usize },
  UnlistedFreeBlocks { listed: usize, walked: usize },
  Accounting { accounted: usize, heap_size: usize },
}

impl fmt::Display for HeapViolation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::BadPrologue { word } => write!(f, "prologue word is {word:#x}"),
      Self::BadEpilogue { offset, word } => write!(f, "epilogue at {offset} is {word:#x}"),
      Self::BadSize { offset, size } => write!(f, "block at {offset} has invalid size {size}"),
      Self::Misaligned { offset } => write!(f, "payload of block at {offset} is misaligned"),
      Self::OutOfBounds { offset, size } => write!(f, "block at {offset} of {size} bytes runs past the epilogue"),
      Self::AdjacentFree { offset } => write!(f, "free block at {offset} is followed by a free block"),
      Self::StalePrevAllocated { offset } => write!(f, "block at {offset} caches a wrong prev-allocated bit"),
      Self::StalePrevMinimum { offset } => write!(f, "block at {offset} caches a wrong prev-minimum bit"),
      Self::FooterMismatch { offset } => write!(f, "free block at {offset} has a footer unlike its header"),
      Self::AllocatedInFreeList { class, offset } => {
        write!(f, "allocated block at {offset} is in free list {class}")
      }
      Self::WrongClass { class, offset, size } => {
        write!(f, "block at {offset} of {size} bytes is in free list {class}")
      }
      Self::BrokenLink { class, offset } => write!(f, "free list {class} is broken at {offset}"),
      Self::BadTail { class } => write!(f, "free list {class} has a wrong tail"),
      Self::UnlistedFreeBlocks { listed, walked } => {
        write!(f, "{walked} free blocks on the heap but {listed} in free lists")
      }
      Self::Accounting { accounted, heap_size } => {
        write!(f, "blocks account for {accounted} bytes of a {heap_size} byte heap")
      }
    }
  }
}

impl std::error::Error for HeapViolation {}

/// Address-order iterator over the blocks between the sentinels.
pub struct Blocks<'a> {
  mem: &'a Memory,
  current: Block,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let tag = self.mem.tag(self.current);
    if tag.is_sentinel() {
      return None;
    }

    let info = BlockInfo {
      offset: self.current.offset(),
      size: tag.size(),
      allocated: tag.is_allocated(),
    };
    self.current = self.current.next(tag.size());
    Some(info)
  }
}

impl<A: Arena> Allocator<A> {
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      mem: &self.mem,
      current: Block::at(WSIZE),
    }
  }

  /// Walks every block and every free list, verifying:
  ///
  /// - the prologue and epilogue sentinels;
  /// - block sizes, payload alignment and bounds;
  /// - no two adjacent free blocks;
  /// - cached previous-block bits against the real predecessor;
  /// - footers of free blocks;
  /// - free-list links, tails and class membership, and that the lists hold
  ///   exactly the free blocks;
  /// - that blocks and sentinels add up to the heap size.
  pub fn check_heap(&self) -> Result<HeapReport, HeapViolation> {
    let prologue = self.mem.word(0);
    if prologue != Tag::SENTINEL.bits() {
      return Err(HeapViolation::BadPrologue { word: prologue });
    }

    let epilogue = self.epilogue();
    let heap_size = self.mem.len();
    let base = self.arena().low().as_ptr() as usize;
    let mut report = HeapReport {
      heap_size,
      ..HeapReport::default()
    };

    let mut block = Block::at(WSIZE);
    let mut prev: Option<Tag> = None;

    loop {
      let offset = block.offset();
      if offset + WSIZE > heap_size {
        return Err(HeapViolation::OutOfBounds { offset, size: 0 });
      }

      let tag = self.mem.tag(block);
      let prev_allocated = prev.is_none_or(|p| p.is_allocated());
      let prev_minimum = prev.is_some_and(|p| p.size() == MIN_BLOCK_SIZE);

      if tag.is_prev_allocated() != prev_allocated {
        return Err(HeapViolation::StalePrevAllocated { offset });
      }
      if tag.is_prev_minimum() != prev_minimum {
        return Err(HeapViolation::StalePrevMinimum { offset });
      }

      if tag.is_sentinel() {
        if block != epilogue || !tag.is_allocated() {
          return Err(HeapViolation::BadEpilogue { offset, word: tag.bits() });
        }
        break;
      }

      let size = tag.size();
      if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
        return Err(HeapViolation::BadSize { offset, size });
      }
      if (base + block.payload()) % ALIGNMENT != 0 {
        return Err(HeapViolation::Misaligned { offset });
      }
      if offset + size > epilogue.offset() {
        return Err(HeapViolation::OutOfBounds { offset, size });
      }

      if tag.is_allocated() {
        report.allocated_blocks += 1;
        report.allocated_bytes += size;
      } else {
        if prev.is_some_and(|p| !p.is_allocated()) {
          return Err(HeapViolation::AdjacentFree { offset: offset - prev.map_or(0, |p| p.size()) });
        }
        if size > MIN_BLOCK_SIZE && self.mem.footer(block, size) != tag {
          return Err(HeapViolation::FooterMismatch { offset });
        }
        report.free_blocks += 1;
        report.free_bytes += size;
      }

      prev = Some(tag);
      block = block.next(size);
    }

    self.check_free_lists(report.free_blocks, report.free_bytes)?;

    let accounted = report.allocated_bytes + report.free_bytes + 2 * WSIZE;
    if accounted != heap_size {
      return Err(HeapViolation::Accounting { accounted, heap_size });
    }

    Ok(report)
  }

  fn check_free_lists(
    &self,
    free_blocks: usize,
    free_bytes: usize,
  ) -> Result<(), HeapViolation> {
    let mut listed = 0;
    let mut listed_bytes = 0;

    // More entries than the heap could hold means a cycle.
    let max_blocks = self.mem.len() / MIN_BLOCK_SIZE;
    let epilogue = self.epilogue().offset();

    for class in 0..CLASS_COUNT {
      let mut prev: Option<Block> = None;
      let mut current = self.lists.head(class);

      while let Some(block) = current {
        let offset = block.offset();
        listed += 1;

        if offset % ALIGNMENT != WSIZE || offset >= epilogue || listed > max_blocks {
          return Err(HeapViolation::BrokenLink { class, offset });
        }

        let tag = self.mem.tag(block);
        if tag.is_allocated() {
          return Err(HeapViolation::AllocatedInFreeList { class, offset });
        }
        if self.lists.classify(tag.size()) != class {
          return Err(HeapViolation::WrongClass {
            class,
            offset,
            size: tag.size(),
          });
        }
        if class != MIN_CLASS && self.mem.prev_free(block) != prev {
          return Err(HeapViolation::BrokenLink { class, offset });
        }

        listed_bytes += tag.size();
        prev = Some(block);
        current = self.mem.next_free(block);
      }

      if class != MIN_CLASS && self.lists.tail(class) != prev {
        return Err(HeapViolation::BadTail { class });
      }
    }

    if listed != free_blocks || listed_bytes != free_bytes {
      return Err(HeapViolation::UnlistedFreeBlocks {
        listed,
        walked: free_blocks,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;

  const CHUNK: usize = 1 << 14;

  fn allocator() -> Allocator {
    Allocator::with_config(Config::new().with_arena_capacity(1 << 20)).unwrap()
  }

  #[test]
  fn test_fresh_heap_report() {
    let allocator = allocator();

    assert_eq!(
      allocator.check_heap(),
      Ok(HeapReport {
        heap_size: CHUNK + 2 * WSIZE,
        allocated_blocks: 0,
        allocated_bytes: 0,
        free_blocks: 1,
        free_bytes: CHUNK,
      })
    );
  }

  #[test]
  fn test_report_tracks_allocations() {
    let mut allocator = allocator();
    let _a = allocator.alloc(100);
    let b = allocator.alloc(8);
    let _c = allocator.alloc(100);
    unsafe { allocator.release(b) };

    let report = allocator.check_heap().unwrap();
    assert_eq!(report.allocated_blocks, 2);
    assert_eq!(report.allocated_bytes, 224);
    assert_eq!(report.free_blocks, 2);
    assert_eq!(report.free_bytes, CHUNK - 224);
  }

  #[test]
  fn test_blocks_walk_in_address_order() {
    let mut allocator = allocator();
    allocator.alloc(100);
    allocator.alloc(300);

    let offsets: Vec<_> = allocator.blocks().map(|b| b.offset).collect();
    assert_eq!(offsets, vec![WSIZE, WSIZE + 112, WSIZE + 112 + 320]);
  }

  #[test]
  fn test_detects_bad_prologue() {
    let mut allocator = allocator();
    allocator.mem.set_word(0, 0);

    assert_eq!(allocator.check_heap(), Err(HeapViolation::BadPrologue { word: 0 }));
  }

  #[test]
  fn test_detects_stale_prev_allocated() {
    let mut allocator = allocator();
    let ptr = allocator.alloc(100);
    let block = allocator.mem.block_of(ptr).unwrap();
    let next = allocator.mem.next(block);
    allocator.mem.update_tags(next, |t| t.with_prev_allocated(false));

    assert_eq!(
      allocator.check_heap(),
      Err(HeapViolation::StalePrevAllocated { offset: next.offset() })
    );
  }

  #[test]
  fn test_detects_adjacent_free_blocks() {
    let mut allocator = allocator();
    let a = allocator.alloc(100);
    let _b = allocator.alloc(100);

    // Free `a` behind the allocator's back: tags only, no coalescing.
    let block = allocator.mem.block_of(a).unwrap();
    allocator.mem.update_tags(block, |t| t.with_allocated(false));
    let next = allocator.mem.next(block);
    allocator.mem.update_tags(next, |t| t.with_prev_allocated(false).with_allocated(false));

    assert_eq!(
      allocator.check_heap(),
      Err(HeapViolation::AdjacentFree { offset: block.offset() })
    );
  }

  #[test]
  fn test_detects_footer_mismatch() {
    let mut allocator = allocator();
    let tail = allocator.blocks().next().unwrap();
    let block = Block::at(tail.offset);
    let footer = block.footer(tail.size);
    allocator.mem.set_word(footer, 0);

    assert_eq!(
      allocator.check_heap(),
      Err(HeapViolation::FooterMismatch { offset: tail.offset })
    );
  }

  #[test]
  fn test_detects_unlisted_free_block() {
    let mut allocator = allocator();
    let a = allocator.alloc(100);
    let _b = allocator.alloc(100);

    let block = allocator.mem.block_of(a).unwrap();
    allocator.mem.update_tags(block, |t| t.with_allocated(false));
    let next = allocator.mem.next(block);
    allocator.mem.update_tags(next, |t| t.with_prev_allocated(false));

    assert_eq!(
      allocator.check_heap(),
      Err(HeapViolation::UnlistedFreeBlocks { listed: 1, walked: 2 })
    );
  }

  #[test]
  fn test_detects_allocated_block_in_free_list() {
    let mut allocator = allocator();
    let a = allocator.alloc(100);
    let _b = allocator.alloc(100);
    unsafe { allocator.release(a) };

    let block = allocator.mem.block_of(a).unwrap();
    allocator.mem.update_tags(block, |t| t.with_allocated(true));
    let next = allocator.mem.next(block);
    allocator.mem.update_tags(next, |t| t.with_prev_allocated(true));

    assert_eq!(
      allocator.check_heap(),
      Err(HeapViolation::AllocatedInFreeList {
        class: allocator.lists.classify(112),
        offset: block.offset()
      })
    );
  }

  #[test]
  fn test_violation_messages() {
    let violation = HeapViolation::AdjacentFree { offset: 8 };
    assert_eq!(violation.to_string(), "free block at 8 is followed by a free block");
  }
}
