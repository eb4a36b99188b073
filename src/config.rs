use std::env;

use crate::error::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1 << 14;
pub const DEFAULT_ARENA_CAPACITY: usize = 64 << 20;

/// Smallest accepted chunk size. Keeps every class threshold a multiple of
/// the alignment.
pub const MIN_CHUNK_SIZE: usize = 1 << 10;

const CHUNK_SIZE_KEY: &str = "SEGALLOC_CHUNK_SIZE";
const ARENA_CAPACITY_KEY: &str = "SEGALLOC_ARENA_CAPACITY";
const CHECK_HEAP_KEY: &str = "SEGALLOC_CHECK_HEAP";

/// Allocator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Minimum number of bytes requested from the arena on every growth, and
  /// the base of the size-class thresholds.
  pub chunk_size: usize,
  /// Bytes reserved up front by [`MmapArena`](crate::MmapArena).
  pub arena_capacity: usize,
  /// Walk the whole heap before and after every mutating call and panic on
  /// any inconsistency.
  pub check_heap: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      arena_capacity: DEFAULT_ARENA_CAPACITY,
      check_heap: false,
    }
  }
}

impl Config {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn with_arena_capacity(
    mut self,
    arena_capacity: usize,
  ) -> Self {
    self.arena_capacity = arena_capacity;
    self
  }

  pub fn with_check_heap(
    mut self,
    check_heap: bool,
  ) -> Self {
    self.check_heap = check_heap;
    self
  }

  /// Defaults overridden by `SEGALLOC_CHUNK_SIZE`, `SEGALLOC_ARENA_CAPACITY`
  /// and `SEGALLOC_CHECK_HEAP`.
  pub fn from_env() -> Result<Self, Error> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, Error> {
    let mut config = Self::default();

    if let Some(value) = lookup(CHUNK_SIZE_KEY) {
      config.chunk_size = parse_usize(CHUNK_SIZE_KEY, value)?;
    }
    if let Some(value) = lookup(ARENA_CAPACITY_KEY) {
      config.arena_capacity = parse_usize(ARENA_CAPACITY_KEY, value)?;
    }
    if let Some(value) = lookup(CHECK_HEAP_KEY) {
      config.check_heap = match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => return Err(Error::InvalidEnv { key: CHECK_HEAP_KEY, value }),
      };
    }

    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), Error> {
    if !self.chunk_size.is_power_of_two() || self.chunk_size < MIN_CHUNK_SIZE {
      return Err(Error::InvalidChunkSize(self.chunk_size));
    }
    if self.arena_capacity == 0 {
      return Err(Error::InvalidCapacity(self.arena_capacity));
    }
    Ok(())
  }
}

fn parse_usize(
  key: &'static str,
  value: String,
) -> Result<usize, Error> {
  value
    .trim()
    .parse()
    .map_err(|_| Error::InvalidEnv { key, value })
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
    let map: HashMap<&'static str, String> = pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn test_default_is_valid() {
    let config = Config::default();

    assert_eq!(config.chunk_size, 16384);
    assert!(!config.check_heap);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_rejects_bad_chunk_sizes() {
    for chunk_size in [0, 512, 3000, 16400] {
      let config = Config::new().with_chunk_size(chunk_size);
      assert_eq!(config.validate(), Err(Error::InvalidChunkSize(chunk_size)));
    }
    assert!(Config::new().with_chunk_size(1024).validate().is_ok());
  }

  #[test]
  fn test_rejects_zero_capacity() {
    let config = Config::new().with_arena_capacity(0);
    assert_eq!(config.validate(), Err(Error::InvalidCapacity(0)));
  }

  #[test]
  fn test_from_lookup_overrides_defaults() {
    let config = Config::from_lookup(lookup(&[
      ("SEGALLOC_CHUNK_SIZE", "4096"),
      ("SEGALLOC_ARENA_CAPACITY", " 1048576 "),
      ("SEGALLOC_CHECK_HEAP", "Yes"),
    ]))
    .unwrap();

    assert_eq!(config, Config::new().with_chunk_size(4096).with_arena_capacity(1 << 20).with_check_heap(true));
  }

  #[test]
  fn test_from_lookup_without_variables_is_default() {
    assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
  }

  #[test]
  fn test_from_lookup_reports_bad_values() {
    let err = Config::from_lookup(lookup(&[("SEGALLOC_CHUNK_SIZE", "lots")])).unwrap_err();
    assert_eq!(
      err,
      Error::InvalidEnv {
        key: "SEGALLOC_CHUNK_SIZE",
        value: "lots".to_string()
      }
    );

    let err = Config::from_lookup(lookup(&[("SEGALLOC_CHECK_HEAP", "maybe")])).unwrap_err();
    assert!(matches!(err, Error::InvalidEnv { key: "SEGALLOC_CHECK_HEAP", .. }));

    let err = Config::from_lookup(lookup(&[("SEGALLOC_CHUNK_SIZE", "100")])).unwrap_err();
    assert_eq!(err, Error::InvalidChunkSize(100));
  }
}
