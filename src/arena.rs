//! Raw, growable memory for the allocator to carve up.
//!
//! An arena only ever grows, and never moves what it already owns.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{error::Error, tag::ALIGNMENT};

pub trait Arena {
  /// Grows the arena by exactly `bytes`, returning the start of the new
  /// region (the old break).
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, Error>;

  /// First owned byte. Stable for the arena's lifetime and aligned to
  /// [`ALIGNMENT`].
  fn low(&self) -> NonNull<u8>;

  /// Number of owned bytes.
  fn size(&self) -> usize;

  /// Last owned byte (inclusive).
  fn high(&self) -> *const u8 {
    self.low().as_ptr().wrapping_add(self.size()).wrapping_sub(1)
  }
}

/// Fixed reservation of anonymous memory with a movable break inside it.
///
/// ```text
///   low                   break                       low + capacity
///   ┌──────────────────────┬─────────────────────────────┐
///   │        owned         │         reserved            │
///   └──────────────────────┴─────────────────────────────┘
/// ```
pub struct MmapArena {
  base: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

impl MmapArena {
  /// Reserves `capacity` bytes (rounded up to whole pages). Pages are
  /// zero-filled and only backed once touched.
  pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
    if capacity == 0 {
      return Err(Error::InvalidCapacity(capacity));
    }

    let page = page_size();
    let capacity = crate::align::checked_align(capacity, page).ok_or(Error::InvalidCapacity(capacity))?;

    let mapped = unsafe {
      libc::mmap(
        ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if mapped == libc::MAP_FAILED {
      return Err(Error::MapFailed { errno: errno() });
    }

    let base = NonNull::new(mapped.cast::<u8>()).ok_or(Error::MapFailed { errno: 0 })?;

    Ok(Self { base, capacity, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

impl Arena for MmapArena {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, Error> {
    if bytes > self.capacity - self.brk {
      return Err(Error::OutOfMemory { requested: bytes });
    }

    let start = unsafe { self.base.add(self.brk) };
    self.brk += bytes;
    Ok(start)
  }

  fn low(&self) -> NonNull<u8> {
    self.base
  }

  fn size(&self) -> usize {
    self.brk
  }
}

impl Drop for MmapArena {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base.as_ptr().cast::<c_void>(), self.capacity);
    }
  }
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Only one `SbrkArena` should exist per process. If anything else moves the
/// break between two extensions the next [`Arena::extend`] fails with
/// [`Error::Discontiguous`].
pub struct SbrkArena {
  base: NonNull<u8>,
  size: usize,
}

impl SbrkArena {
  /// Pads the current program break up to [`ALIGNMENT`] and starts owning
  /// memory from there.
  pub fn new() -> Result<Self, Error> {
    let current = unsafe { sbrk(0) } as usize;
    let padding = crate::align!(current, ALIGNMENT) - current;

    if padding != 0 {
      grow_break(padding)?;
    }

    let base = NonNull::new((current + padding) as *mut u8).ok_or(Error::OutOfMemory { requested: padding })?;

    Ok(Self { base, size: 0 })
  }
}

impl Arena for SbrkArena {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, Error> {
    let start = grow_break(bytes)?;

    let expected = self.base.as_ptr() as usize + self.size;
    if start as usize != expected {
      return Err(Error::Discontiguous {
        expected,
        actual: start as usize,
      });
    }

    self.size += bytes;
    NonNull::new(start).ok_or(Error::OutOfMemory { requested: bytes })
  }

  fn low(&self) -> NonNull<u8> {
    self.base
  }

  fn size(&self) -> usize {
    self.size
  }
}

/// Moves the program break up by `bytes`, returning the old break.
fn grow_break(bytes: usize) -> Result<*mut u8, Error> {
  let increment = intptr_t::try_from(bytes).map_err(|_| Error::OutOfMemory { requested: bytes })?;

  let address = unsafe { sbrk(increment) };

  if address == usize::MAX as *mut c_void {
    return Err(Error::OutOfMemory { requested: bytes });
  }

  Ok(address.cast::<u8>())
}

fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}

fn errno() -> i32 {
  std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
