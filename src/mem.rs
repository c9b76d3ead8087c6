//! Byte-level memory emulation.
//!
//! Every copy and fill the allocator performs on heap bytes goes through
//! these primitives. Longer spans are composed from word-sized accesses plus
//! a short tail, so a single access never touches more than 8 bytes.

use std::{mem, ptr};

const WORD: usize = mem::size_of::<u64>();

/// Reads `len` bytes (at most 8) at `addr`, zero-extended to 64 bits.
///
/// # Safety
///
/// `addr..addr + len` must be valid for reads.
pub unsafe fn read(
  addr: *const u8,
  len: usize,
) -> u64 {
  debug_assert!(len <= WORD);

  let mut bytes = [0u8; WORD];
  unsafe { ptr::copy_nonoverlapping(addr, bytes.as_mut_ptr(), len) };
  u64::from_le_bytes(bytes)
}

/// Writes the low-order `len` bytes (at most 8) of `value` to `addr`.
///
/// # Safety
///
/// `addr..addr + len` must be valid for writes.
pub unsafe fn write(
  addr: *mut u8,
  value: u64,
  len: usize,
) {
  debug_assert!(len <= WORD);

  let bytes = value.to_le_bytes();
  unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), addr, len) };
}

/// Copies `n` bytes from `src` to `dst` and returns `dst`.
///
/// # Safety
///
/// Both spans must be valid and must not overlap.
pub unsafe fn copy(
  dst: *mut u8,
  src: *const u8,
  n: usize,
) -> *mut u8 {
  let mut offset = 0;

  unsafe {
    while n - offset >= WORD {
      let data = read(src.add(offset), WORD);
      write(dst.add(offset), data, WORD);
      offset += WORD;
    }

    if offset < n {
      let data = read(src.add(offset), n - offset);
      write(dst.add(offset), data, n - offset);
    }
  }

  dst
}

/// Sets `n` bytes at `dst` to `byte` and returns `dst`.
///
/// # Safety
///
/// `dst..dst + n` must be valid for writes.
pub unsafe fn fill(
  dst: *mut u8,
  byte: u8,
  n: usize,
) -> *mut u8 {
  let data = u64::from_ne_bytes([byte; WORD]);
  let mut offset = 0;

  unsafe {
    while n - offset >= WORD {
      write(dst.add(offset), data, WORD);
      offset += WORD;
    }

    if offset < n {
      write(dst.add(offset), data, n - offset);
    }
  }

  dst
}
