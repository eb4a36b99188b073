/// Rounds a value up to the heap alignment (16 bytes), or to an explicit
/// power-of-two alignment.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(17), 32);
/// assert_eq!(align!(13, 8), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align!($value, $crate::tag::ALIGNMENT)
  };
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping around when
/// `value` is within `alignment` of `usize::MAX`.
pub const fn checked_align(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  match value.checked_add(alignment - 1) {
    Some(bumped) => Some(bumped & !(alignment - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tag::ALIGNMENT;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size, ALIGNMENT));
      }
    }
  }

  #[test]
  fn test_align_zero_and_exact() {
    assert_eq!(align!(0usize), 0);
    assert_eq!(align!(64usize), 64);
    assert_eq!(align!(4097usize, 4096), 8192);
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX, ALIGNMENT), None);
    assert_eq!(checked_align(usize::MAX - 14, ALIGNMENT), None);
    assert_eq!(checked_align(usize::MAX - 15, ALIGNMENT), Some(usize::MAX - 15));
  }
}
