//! Free-space index.
//!
//! An unordered, intrusive, doubly linked list of free blocks. The links live
//! inside the free blocks themselves, so the index owns no memory; it only
//! remembers where the free blocks are.
//!
//! ```text
//!   head
//!    │
//!    ▼
//!   ┌────────┐     ┌────────┐     ┌────────┐
//!   │ size   │ ──► │ size   │ ──► │ size   │ ──► null
//!   │ links  │ ◄── │ links  │ ◄── │ links  │
//!   └────────┘     └────────┘     └────────┘
//!   most recently released first
//! ```

use std::ptr;

use crate::block::Block;

pub struct FreeIndex {
  head: *mut Block,
}

impl FreeIndex {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
    }
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Forgets every entry without touching the blocks.
  pub fn clear(&mut self) {
    self.head = ptr::null_mut();
  }

  /// Pushes `block` at the head.
  ///
  /// # Safety
  ///
  /// `block` must be a free block of at least `MIN_BLOCK_SIZE` bytes that is
  /// not already in the index.
  pub unsafe fn insert(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let links = Block::links(block);
      (*links).prev = ptr::null_mut();
      (*links).next = self.head;

      if !self.head.is_null() {
        (*Block::links(self.head)).prev = block;
      }
    }

    self.head = block;
  }

  /// Detaches `block` from wherever it sits.
  ///
  /// # Safety
  ///
  /// `block` must currently be in this index.
  pub unsafe fn remove(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let links = Block::links(block);
      let (prev, next) = ((*links).prev, (*links).next);

      if prev.is_null() {
        self.head = next;
      } else {
        (*Block::links(prev)).next = next;
      }

      if !next.is_null() {
        (*Block::links(next)).prev = prev;
      }
    }
  }

  /// Puts `new` where `old` sits, keeping the same neighbors. `old` is no
  /// longer indexed afterwards.
  ///
  /// # Safety
  ///
  /// `old` must currently be in this index; `new` must be a free block of
  /// at least `MIN_BLOCK_SIZE` bytes not overlapping `old`'s links.
  pub unsafe fn replace(
    &mut self,
    old: *mut Block,
    new: *mut Block,
  ) {
    unsafe {
      let old_links = Block::links(old);
      let (prev, next) = ((*old_links).prev, (*old_links).next);

      let new_links = Block::links(new);
      (*new_links).prev = prev;
      (*new_links).next = next;

      if prev.is_null() {
        self.head = new;
      } else {
        (*Block::links(prev)).next = new;
      }

      if !next.is_null() {
        (*Block::links(next)).prev = new;
      }
    }
  }

  /// Walks the index from the head in list order.
  ///
  /// The iterator reads each block's links as it goes, so the index must not
  /// be modified while it is alive.
  pub fn iter(&self) -> Iter {
    Iter { current: self.head }
  }
}

impl Default for FreeIndex {
  fn default() -> Self {
    Self::new()
  }
}

pub struct Iter {
  current: *mut Block,
}

impl Iterator for Iter {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { (*Block::links(block)).next };
    Some(block)
  }
}
