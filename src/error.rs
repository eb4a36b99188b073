use std::fmt;

/// Errors surfaced by arenas, configuration and allocator construction.
///
/// Allocation itself never returns these: the malloc-style surface turns
/// them into null pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
  /// The arena refused to grow by `requested` bytes.
  OutOfMemory { requested: usize },
  /// The process break moved underneath an [`SbrkArena`](crate::SbrkArena).
  Discontiguous { expected: usize, actual: usize },
  /// `mmap` failed while reserving an arena.
  MapFailed { errno: i32 },
  InvalidChunkSize(usize),
  InvalidCapacity(usize),
  InvalidEnv { key: &'static str, value: String },
}

impl fmt::Display for Error {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::OutOfMemory { requested } => write!(f, "arena cannot grow by {requested} bytes"),
      Self::Discontiguous { expected, actual } => write!(
        f,
        "arena extension landed at {actual:#x}, expected {expected:#x}"
      ),
      Self::MapFailed { errno } => write!(f, "mmap failed with errno {errno}"),
      Self::InvalidChunkSize(size) => write!(
        f,
        "chunk size {size} must be a power of two of at least 1024 bytes"
      ),
      Self::InvalidCapacity(capacity) => write!(f, "arena capacity {capacity} must be non-zero"),
      Self::InvalidEnv { key, value } => write!(f, "invalid value {value:?} for {key}"),
    }
  }
}

impl std::error::Error for Error {}
