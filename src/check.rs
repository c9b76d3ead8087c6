//! Heap consistency checking and statistics.
//!
//! The checker only sees free blocks: allocated blocks are tracked nowhere,
//! so it cannot tell whether the index is missing one or holds a block that
//! is also in use.

use std::ptr;

use tracing::warn;

use crate::{
  align::{ALIGNMENT, is_aligned},
  allocator::Allocator,
  block::{Block, HEADER_SIZE, MIN_BLOCK_SIZE},
  heap::HeapGrowth,
};

/// A snapshot of heap usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
  /// Bytes handed out by the heap so far.
  pub heap_size: usize,
  /// Blocks currently in the free-space index.
  pub free_blocks: usize,
  /// Total size of those blocks, headers included.
  pub free_bytes: usize,
  /// Size of the biggest free block.
  pub largest_free: usize,
}

impl<H: HeapGrowth> Allocator<H> {
  /// Walks the free-space index and validates every block in it.
  ///
  /// Each block must be aligned, lie wholly inside the heap, have a size
  /// that is a multiple of 16 and at least `MIN_BLOCK_SIZE`, and point back
  /// at its predecessor. A cycle always revisits some block through a
  /// second predecessor, so the back-link check also ends the walk on one.
  ///
  /// Problems are logged together with `context`, usually the caller's
  /// `line!()`. Returns true if the index is consistent.
  pub fn check_heap(
    &self,
    context: u32,
  ) -> bool {
    if self.free.is_empty() {
      return true;
    }

    let lo = self.heap.heap_lo() as usize;
    let end = lo + self.heap.heap_size();

    let mut prev: *mut Block = ptr::null_mut();
    let mut current = self.free.head();

    while !current.is_null() {
      let addr = current as usize;

      if !is_aligned(addr) {
        warn!("[line {}] free block {:#x} is not {}-byte aligned", context, addr, ALIGNMENT);
        return false;
      }

      if addr < lo || addr > end.saturating_sub(HEADER_SIZE) {
        warn!("[line {}] free block {:#x} is outside the heap", context, addr);
        return false;
      }

      let size = unsafe { (*current).size };

      if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
        warn!("[line {}] free block {:#x} has invalid size {}", context, addr, size);
        return false;
      }

      if size > end - addr {
        warn!(
          "[line {}] free block {:#x} of {} bytes runs past the end of the heap",
          context, addr, size
        );
        return false;
      }

      let links = unsafe { &*Block::links(current) };

      if links.prev != prev {
        warn!(
          "[line {}] free block {:#x} points back at {:?} instead of {:?}",
          context, addr, links.prev, prev
        );
        return false;
      }

      prev = current;
      current = links.next;
    }

    true
  }

  /// Heap size and free-space index totals.
  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.heap.heap_size(),
      ..HeapStats::default()
    };

    for block in self.free.iter() {
      let size = unsafe { (*block).size };
      stats.free_blocks += 1;
      stats.free_bytes += size;
      stats.largest_free = stats.largest_free.max(size);
    }

    stats
  }
}
