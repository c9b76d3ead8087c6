//! Heap growth adapter.
//!
//! A [`Heap`] reserves one large anonymous mapping up front and hands it out
//! through a simulated program break that only moves forward, the same way
//! `sbrk(2)` extends the data segment. Nothing is committed until touched.
//!
//! ```text
//!   heap_lo                      brk (heap_lo + heap_size)       max_addr
//!   ┌──────────────────────────┬──────────────────────────────────┐
//!   │  handed out via sbrk     │   reserved, never touched yet    │
//!   └──────────────────────────┴──────────────────────────────────┘
//!                            ▲
//!                            └── heap_hi (last valid byte)
//! ```

use std::{fmt::Write, io, ptr};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};
use tracing::{debug, error, warn};

use crate::{config::HeapConfig, error::AllocError, mem};

/// What the allocator needs from whatever backs its heap.
pub trait HeapGrowth {
  /// Extends the heap by `incr` bytes and returns the previous top.
  /// On refusal the heap is left unchanged.
  fn sbrk(
    &mut self,
    incr: usize,
  ) -> Result<*mut u8, AllocError>;

  /// Address of the first heap byte.
  fn heap_lo(&self) -> *mut u8;

  /// Address of the last heap byte. One below `heap_lo` while empty.
  fn heap_hi(&self) -> *mut u8;

  /// Bytes handed out so far.
  fn heap_size(&self) -> usize;

  /// Moves the break back to `heap_lo`, forgetting every byte handed out.
  fn reset_brk(&mut self);

  /// Returns true if `addr` points at a byte currently inside the heap.
  fn contains(
    &self,
    addr: *const u8,
  ) -> bool {
    let addr = addr as usize;
    addr >= self.heap_lo() as usize && addr <= self.heap_hi() as usize
  }
}

/// An mmap-backed heap with a forward-only break.
pub struct Heap {
  start: *mut u8,
  brk: *mut u8,
  reserved: usize,
}

impl Heap {
  /// Reserves `config.max_heap_size` bytes of address space.
  pub fn reserve(config: &HeapConfig) -> Result<Self, AllocError> {
    let size = config.max_heap_size;

    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
        -1,
        0,
      )
    };

    if addr == MAP_FAILED {
      let source = io::Error::last_os_error();
      error!("mmap could not reserve {} bytes for the heap: {}", size, source);
      return Err(AllocError::ReservationFailure { size, source });
    }

    debug!("reserved {} bytes of heap at {:?}", size, addr);

    Ok(Self {
      start: addr as *mut u8,
      brk: addr as *mut u8,
      reserved: size,
    })
  }

  /// Size of the reservation, the most the heap can ever grow to.
  pub fn capacity(&self) -> usize {
    self.reserved
  }

  /// The system page size.
  pub fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
      n if n > 0 => n as usize,
      _ => 4096,
    }
  }

  /// Formats `count` heap bytes starting at `ptr + offset`, most
  /// significant (highest address) first.
  ///
  /// Returns `None` if any byte of the span lies outside the heap.
  pub fn probe(
    &self,
    ptr: *const u8,
    offset: isize,
    count: usize,
  ) -> Option<String> {
    if count == 0 {
      return Some(String::new());
    }

    let lo = (ptr as usize).wrapping_add_signed(offset);
    let hi = lo.wrapping_add(count - 1);

    if lo < self.heap_lo() as usize || hi < lo {
      warn!("invalid probe: address {:#x} is below start of heap", lo);
      return None;
    }
    if hi > self.heap_hi() as usize {
      warn!("invalid probe: address {:#x} is beyond end of heap", hi);
      return None;
    }

    let mut out = format!("bytes {:#x}...{:#x}: 0x", hi, lo);
    for addr in (lo..=hi).rev() {
      let byte = unsafe { mem::read(addr as *const u8, 1) };
      let _ = write!(out, "{:02x}", byte);
    }
    Some(out)
  }
}

impl HeapGrowth for Heap {
  fn sbrk(
    &mut self,
    incr: usize,
  ) -> Result<*mut u8, AllocError> {
    let heap_size = self.heap_size();

    let fits = heap_size
      .checked_add(incr)
      .is_some_and(|total| total <= self.reserved);

    if !fits {
      warn!(
        "sbrk failed: ran out of memory, would require heap size of {} bytes",
        heap_size.saturating_add(incr)
      );
      return Err(AllocError::OutOfMemory {
        requested: incr,
        heap_size,
      });
    }

    let old_brk = self.brk;
    self.brk = unsafe { self.brk.add(incr) };
    Ok(old_brk)
  }

  fn heap_lo(&self) -> *mut u8 {
    self.start
  }

  fn heap_hi(&self) -> *mut u8 {
    self.brk.wrapping_sub(1)
  }

  fn heap_size(&self) -> usize {
    self.brk as usize - self.start as usize
  }

  fn reset_brk(&mut self) {
    self.brk = self.start;
  }
}

impl Drop for Heap {
  fn drop(&mut self) {
    let result = unsafe { libc::munmap(self.start as *mut c_void, self.reserved) };

    if result != 0 {
      error!(
        "munmap could not release heap at {:?}: {}",
        self.start,
        io::Error::last_os_error()
      );
    }
  }
}
