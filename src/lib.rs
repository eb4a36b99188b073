//! # segalloc - A Segregated-Fit Memory Allocator
//!
//! This crate provides a `malloc`/`free`/`realloc`/`calloc` style allocator
//! built on boundary tags and segregated free lists, carving blocks out of a
//! raw arena that only ever grows.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                             ARENA                                    │
//!   │                                                                      │
//!   │  ┌────┬────────┬────┬──────────────┬──┬──────────────────────┬────┐  │
//!   │  │ P  │ used   │used│    free      │u │        free          │ E  │  │
//!   │  └────┴────────┴────┴──────────────┴──┴──────────────────────┴────┘  │
//!   │    ▲                       │                     │             ▲     │
//!   │    │                       ▼                     ▼             │     │
//!   │ prologue            ┌─────────────┐       ┌─────────────┐   epilogue │
//!   │                     │  class 6    │       │  class 1    │            │
//!   │                     │  free list  │       │  free list  │            │
//!   │                     └─────────────┘       └─────────────┘            │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   No two neighbouring blocks are ever both free.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro (align!) and checked rounding
//!   ├── tag        - Boundary-tag encoding of size and status bits
//!   ├── block      - Block offsets: header, payload, footer, neighbours
//!   ├── memory     - Bounds-checked word access to the arena (internal)
//!   ├── free_list  - Segregated free lists and fit search (internal)
//!   ├── allocator  - Allocator: alloc, release, realloc, calloc, growth
//!   ├── coalesce   - Merging of freed blocks with free neighbours
//!   ├── arena      - Arena trait, MmapArena, SbrkArena
//!   ├── check      - Heap walker and consistency checker
//!   ├── config     - Config and environment overrides
//!   └── error      - Error type
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segalloc::Allocator;
//!
//! let mut allocator = Allocator::new().unwrap();
//!
//! unsafe {
//!     let ptr = allocator.alloc(size_of::<u64>()) as *mut u64;
//!
//!     *ptr = 42;
//!     println!("Value: {}", *ptr);
//!
//!     allocator.release(ptr as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block carries a one-word header packing its size with three status
//! bits; free blocks larger than 16 bytes repeat it in a footer so the block
//! after them can find their start:
//!
//! ```text
//!   Free Block:
//!   ┌──────────────┬──────────┬──────────┬───────────────┬──────────────┐
//!   │   header     │   next   │   prev   │               │   footer     │
//!   │ size | M P A │  (link)  │  (link)  │    unused     │ size | M P A │
//!   └──────────────┴──────────┴──────────┴───────────────┴──────────────┘
//!
//!   Allocated Block:
//!   ┌──────────────┬────────────────────────────────────────────────────┐
//!   │   header     │                  User Data                         │
//!   └──────────────┴────────────────────────────────────────────────────┘
//!                  ▲
//!                  └── Pointer returned to user (16-byte aligned)
//! ```
//!
//! A 16-byte block has room for its header and one link only, so it has no
//! footer; instead the block after it sets its `M` bit.
//!
//! Allocation rounds the request plus header up to 16 bytes, searches the
//! free lists from the matching size class toward larger ones (oldest block
//! first within a class), grows the arena when nothing fits, and splits off
//! any usable remainder. Release marks the block free and merges it with
//! free neighbours straight away.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap an [`Allocator`] in a lock to share it
//! - **No shrinking**: the arena is never returned to the system while the
//!   allocator lives
//! - **16-byte alignment**: stricter alignments are not supported
//!
//! ## Safety
//!
//! Payloads are handed out as raw pointers. Releasing or reallocating is
//! `unsafe`: the pointer must come from the same allocator and must not have
//! been released already. Violations that can be detected (foreign pointers,
//! double frees) panic.

pub mod align;
pub mod arena;
mod allocator;
mod block;
mod check;
mod coalesce;
pub mod config;
mod error;
mod free_list;
mod memory;
pub mod tag;

pub use allocator::Allocator;
pub use arena::{Arena, MmapArena, SbrkArena};
pub use check::{BlockInfo, Blocks, HeapReport, HeapViolation};
pub use config::Config;
pub use error::Error;
pub use free_list::{CLASS_COUNT, MIN_CLASS};
