use std::{mem, ptr::NonNull};

use crate::align::ALIGNMENT;

/// Header in front of every block, allocated or free.
///
/// `size` covers the whole block, header included. The header sits before
/// the address handed to callers, so payload writes can never reach it.
#[repr(C, align(16))]
pub struct Block {
  pub size: usize,
}

/// Index links, overlaid on the first payload bytes while a block is free.
#[repr(C)]
pub struct FreeLinks {
  pub prev: *mut Block,
  pub next: *mut Block,
}

/// Bytes between a block's start and its payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest block that can sit in the free-space index: a header plus the
/// links. A split must leave at least this much behind.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + crate::align!(mem::size_of::<FreeLinks>());

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);

impl Block {
  /// Block size needed to serve a request of `size` payload bytes, or
  /// `None` if it cannot be represented.
  pub fn size_for(size: usize) -> Option<usize> {
    crate::align::checked_align(size)?
      .checked_add(HEADER_SIZE)
      .map(|total| total.max(MIN_BLOCK_SIZE))
  }

  /// Stamps a header at `addr` and returns it as a block.
  ///
  /// # Safety
  ///
  /// `addr` must be 16-byte aligned and valid for `size` bytes of writes.
  pub unsafe fn init(
    addr: *mut u8,
    size: usize,
  ) -> *mut Block {
    let block = addr as *mut Block;
    unsafe { (*block).size = size };
    block
  }

  /// Recovers the block from a payload address handed to a caller.
  ///
  /// # Safety
  ///
  /// `payload` must come from [`Block::payload`].
  pub unsafe fn from_payload(payload: NonNull<u8>) -> *mut Block {
    unsafe { payload.as_ptr().sub(HEADER_SIZE) as *mut Block }
  }

  /// The address handed to callers for `block`.
  ///
  /// # Safety
  ///
  /// `block` must be non-null and point at a block header.
  pub unsafe fn payload(block: *mut Block) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked((block as *mut u8).add(HEADER_SIZE)) }
  }

  /// Usable bytes behind the header.
  pub fn capacity(&self) -> usize {
    self.size - HEADER_SIZE
  }

  /// The links of a free block.
  ///
  /// # Safety
  ///
  /// `block` must be at least [`MIN_BLOCK_SIZE`] bytes long.
  pub unsafe fn links(block: *mut Block) -> *mut FreeLinks {
    unsafe { (block as *mut u8).add(HEADER_SIZE) as *mut FreeLinks }
  }
}
