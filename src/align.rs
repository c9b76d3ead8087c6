/// Byte multiple every block size and every returned address satisfies.
pub const ALIGNMENT: usize = 16;

/// Rounds `value` up to the allocator's alignment granularity (16 bytes).
///
/// # Examples
///
/// ```rust
/// use rmalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(100), 112);
/// assert_eq!(align!(112), 112);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// ```rust
/// use rmalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Overflow-checked form of [`align!`], for sizes that come from callers.
pub fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|v| v & !(ALIGNMENT - 1))
}

/// Returns true if `addr` sits on the alignment granularity.
pub fn is_aligned(addr: usize) -> bool {
  addr & (ALIGNMENT - 1) == 0
}
