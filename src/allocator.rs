use std::{cmp, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
  block::{Block, MIN_BLOCK_SIZE},
  config::HeapConfig,
  error::AllocError,
  heap::{Heap, HeapGrowth},
  index::FreeIndex,
  mem,
};

/// First-fit free-list allocator over a forward-only heap.
///
/// Released blocks go to the head of an unordered free-space index and are
/// reused first-fit, splitting off any surplus large enough to stand on its
/// own. Adjacent free blocks are never merged, and the heap never shrinks.
pub struct Allocator<H: HeapGrowth = Heap> {
  pub(crate) heap: H,
  pub(crate) free: FreeIndex,
  verify: bool,
}

impl Allocator<Heap> {
  /// Reserves the heap described by `config` and starts with an empty
  /// free-space index.
  pub fn initialize(config: &HeapConfig) -> Result<Self, AllocError> {
    let heap = Heap::reserve(config)?;
    Ok(Self::with_heap(heap, config.verify))
  }
}

impl<H: HeapGrowth> Allocator<H> {
  /// Builds an allocator on top of an already reserved heap.
  pub fn with_heap(
    heap: H,
    verify: bool,
  ) -> Self {
    Self {
      heap,
      free: FreeIndex::new(),
      verify,
    }
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  pub fn heap_size(&self) -> usize {
    self.heap.heap_size()
  }

  /// Allocates at least `size` bytes, 16-byte aligned.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }

    let block_size = Block::size_for(size).ok_or(AllocError::OutOfMemory {
      requested: size,
      heap_size: self.heap_size(),
    })?;

    let block = self.take_block(block_size)?;
    let payload = unsafe { Block::payload(block) };

    trace!("allocate({}) -> {:?}, heap size = {}", size, payload, self.heap_size());
    self.verify_heap(line!());

    Ok(payload)
  }

  /// Returns a block to the free-space index. `None` is a no-op.
  ///
  /// The block goes to the head of the index as it is; it is not merged
  /// with free neighbors.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator and not released since.
  pub unsafe fn release(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let Some(ptr) = ptr else {
      return;
    };

    unsafe {
      let block = Block::from_payload(ptr);
      trace!("release({:?}), {} bytes", ptr, (*block).size);
      self.free.insert(block);
    }

    self.verify_heap(line!());
  }

  /// Resizes the allocation at `ptr` to hold `size` bytes.
  ///
  /// - `ptr == None` allocates.
  /// - `size == 0` releases and returns `Ok(None)`.
  /// - If the block already holds `size` bytes it is kept, and a large enough
  ///   surplus is split off into the index.
  /// - Otherwise a block is found or grown exactly like [`Self::allocate`],
  ///   the old contents are copied over, and the old block is released.
  ///
  /// On error the original allocation is left untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator and not released since.
  pub unsafe fn resize(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(old) = ptr else {
      return self.allocate(size).map(Some);
    };

    if size == 0 {
      unsafe { self.release(Some(old)) };
      return Ok(None);
    }

    let block_size = Block::size_for(size).ok_or(AllocError::OutOfMemory {
      requested: size,
      heap_size: self.heap_size(),
    })?;

    let old_block = unsafe { Block::from_payload(old) };
    let old_size = unsafe { (*old_block).size };

    if old_size >= block_size {
      unsafe { self.shrink_in_place(old_block, block_size) };
      trace!("resize({:?}, {}) -> kept in place", old, size);
      self.verify_heap(line!());
      return Ok(Some(old));
    }

    let new_block = self.take_block(block_size)?;

    let new = unsafe {
      let new = Block::payload(new_block);
      let preserved = cmp::min((*old_block).capacity(), size);
      mem::copy(new.as_ptr(), old.as_ptr(), preserved);
      self.free.insert(old_block);
      new
    };

    trace!("resize({:?}, {}) -> moved to {:?}", old, size, new);
    self.verify_heap(line!());

    Ok(Some(new))
  }

  /// Allocates room for `count` elements of `size` bytes, all zeroed.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::SizeOverflow { count, size })?;

    let ptr = self.allocate(total)?;

    unsafe {
      let capacity = (*Block::from_payload(ptr)).capacity();
      mem::fill(ptr.as_ptr(), 0, capacity);
    }

    Ok(ptr)
  }

  /// Bytes the caller may use at `ptr`; at least what was asked for.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation from this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { (*Block::from_payload(ptr)).capacity() }
  }

  /// Forgets every allocation and rewinds the heap to empty.
  ///
  /// Pointers handed out before the reset must not be used afterwards.
  pub fn reset(&mut self) {
    self.free.clear();
    self.heap.reset_brk();
    debug!("heap reset");
  }

  /// Produces a block of exactly `block_size` bytes (or slightly more when
  /// the surplus is too small to split off), detached from the index.
  fn take_block(
    &mut self,
    block_size: usize,
  ) -> Result<*mut Block, AllocError> {
    // Nothing in the index can be larger than the heap itself.
    if block_size > self.heap_size() {
      return self.grow(block_size);
    }

    match self.find_fit(block_size) {
      Some(block) => unsafe {
        if (*block).size - block_size >= MIN_BLOCK_SIZE {
          self.split(block, block_size);
        } else {
          self.free.remove(block);
        }
        Ok(block)
      },
      None => self.grow(block_size),
    }
  }

  /// First block in index order holding at least `block_size` bytes.
  fn find_fit(
    &self,
    block_size: usize,
  ) -> Option<*mut Block> {
    self
      .free
      .iter()
      .find(|&block| unsafe { (*block).size } >= block_size)
  }

  /// Carves `size` bytes off the front of the indexed `block`. The remainder
  /// takes the block's place in the index.
  ///
  /// # Safety
  ///
  /// `block` must be in the index and at least `size + MIN_BLOCK_SIZE` long.
  unsafe fn split(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let leftover = Block::init((block as *mut u8).add(size), (*block).size - size);
      self.free.replace(block, leftover);
      (*block).size = size;

      debug!(
        "split {:?}: {} bytes taken, {} bytes left at {:?}",
        block,
        size,
        (*leftover).size,
        leftover
      );
    }
  }

  /// Trims an allocated block down to `size`, indexing the surplus if it is
  /// large enough to be a block.
  ///
  /// # Safety
  ///
  /// `block` must be allocated and at least `size` long.
  unsafe fn shrink_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let surplus = (*block).size - size;
      if surplus < MIN_BLOCK_SIZE {
        return;
      }

      let tail = Block::init((block as *mut u8).add(size), surplus);
      (*block).size = size;
      self.free.insert(tail);

      debug!("shrink {:?}: {} bytes released at {:?}", block, surplus, tail);
    }
  }

  fn grow(
    &mut self,
    block_size: usize,
  ) -> Result<*mut Block, AllocError> {
    let addr = self.heap.sbrk(block_size).inspect_err(|err| {
      warn!("heap growth by {} bytes refused: {}", block_size, err);
    })?;

    debug!(
      "heap grown by {} bytes at {:?}, heap size = {}",
      block_size,
      addr,
      self.heap_size()
    );

    Ok(unsafe { Block::init(addr, block_size) })
  }

  fn verify_heap(
    &self,
    context: u32,
  ) {
    if self.verify {
      let consistent = self.check_heap(context);
      assert!(consistent, "heap check failed at line {}", context);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::HEADER_SIZE;

  fn allocator() -> Allocator {
    Allocator::initialize(&HeapConfig::new().with_max_heap_size(1 << 24).with_verify(true)).unwrap()
  }

  fn offset(
    allocator: &Allocator,
    ptr: NonNull<u8>,
  ) -> usize {
    ptr.as_ptr() as usize - allocator.heap().heap_lo() as usize
  }

  #[test]
  fn test_alloc() {
    let mut allocator = allocator();

    unsafe {
      let first_addr = allocator.allocate(8).unwrap().as_ptr() as *mut u64;

      *first_addr = 3u64;

      assert_eq!(*first_addr, 3);

      let size: usize = 6;

      let second_addr = allocator.allocate(size * 2).unwrap().as_ptr() as *mut u16;

      for i in 0..size {
        *(second_addr.add(i)) = (i + 1) as u16;
      }

      assert_eq!(*first_addr, 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, *(second_addr.add(i)))
      }

      allocator.release(NonNull::new(first_addr as *mut u8));

      let third_addr = allocator.allocate(4).unwrap().as_ptr() as *mut u32;

      assert_eq!(first_addr as *mut u32, third_addr);

      allocator.release(NonNull::new(third_addr as *mut u8));

      let fourth_addr = allocator.allocate(64).unwrap().as_ptr() as *mut u128;

      *fourth_addr = 25;

      assert!(fourth_addr > third_addr as *mut u128);

      assert_eq!(*fourth_addr, 25);
    }
  }

  #[test]
  fn test_zero_size_is_invalid() {
    let mut allocator = allocator();

    assert!(matches!(allocator.allocate(0), Err(AllocError::InvalidSize)));
    assert_eq!(allocator.heap_size(), 0);
  }

  #[test]
  fn test_fast_path_grows_without_scanning() {
    let mut allocator = allocator();

    let small = allocator.allocate(16).unwrap();
    unsafe { allocator.release(Some(small)) };
    assert_eq!(allocator.heap_size(), 32);

    let big = allocator.allocate(1000).unwrap();

    assert_eq!(offset(&allocator, big), 32 + HEADER_SIZE);
    assert_eq!(allocator.heap_size(), 32 + 1008 + HEADER_SIZE);
    assert_eq!(allocator.stats().free_blocks, 1);
  }

  #[test]
  fn test_first_fit_takes_most_recent_release() {
    let mut allocator = allocator();

    let a = allocator.allocate(64).unwrap();
    let b = allocator.allocate(64).unwrap();
    let _guard = allocator.allocate(64).unwrap();

    unsafe {
      allocator.release(Some(a));
      allocator.release(Some(b));
    }

    assert_eq!(allocator.allocate(64).unwrap(), b);
    assert_eq!(allocator.allocate(64).unwrap(), a);
    assert!(allocator.free.is_empty());
  }

  #[test]
  fn test_split_leaves_remainder_in_place() {
    let mut allocator = allocator();

    let big = allocator.allocate(240).unwrap();
    let _guard = allocator.allocate(16).unwrap();
    unsafe { allocator.release(Some(big)) };

    let small = allocator.allocate(32).unwrap();
    assert_eq!(small, big);

    let remainder = allocator.free.head();
    unsafe {
      assert_eq!(remainder as usize, big.as_ptr() as usize - HEADER_SIZE + 48);
      assert_eq!((*remainder).size, 256 - 48);
      assert_eq!(allocator.usable_size(small), 32);
    }
  }

  #[test]
  fn test_small_surplus_is_not_split() {
    let mut allocator = allocator();

    let a = allocator.allocate(48).unwrap();
    let _guard = allocator.allocate(16).unwrap();
    unsafe { allocator.release(Some(a)) };

    let b = allocator.allocate(32).unwrap();
    assert_eq!(a, b);
    assert!(allocator.free.is_empty());
    unsafe { assert_eq!(allocator.usable_size(b), 48) };
  }

  #[test]
  fn test_out_of_memory_keeps_index() {
    let mut allocator =
      Allocator::initialize(&HeapConfig::new().with_max_heap_size(4096)).unwrap();

    let a = allocator.allocate(1024).unwrap();
    unsafe { allocator.release(Some(a)) };

    match allocator.allocate(8192) {
      Err(AllocError::OutOfMemory { requested, heap_size }) => {
        assert_eq!(requested, 8192 + HEADER_SIZE);
        assert_eq!(heap_size, 1024 + HEADER_SIZE);
      },
      other => panic!("expected OutOfMemory, got {:?}", other),
    }

    assert!(matches!(
      allocator.allocate(usize::MAX),
      Err(AllocError::OutOfMemory { .. })
    ));
    assert_eq!(allocator.stats().free_blocks, 1);
    assert_eq!(allocator.allocate(1024).unwrap(), a);
  }

  #[test]
  fn test_release_none_is_noop() {
    let mut allocator = allocator();

    unsafe { allocator.release(None) };

    assert!(allocator.free.is_empty());
  }

  #[test]
  fn test_resize_none_allocates() {
    let mut allocator = allocator();

    let ptr = unsafe { allocator.resize(None, 40) }.unwrap().unwrap();

    assert_eq!(offset(&allocator, ptr), HEADER_SIZE);
    unsafe { assert_eq!(allocator.usable_size(ptr), 48) };
  }

  #[test]
  fn test_resize_to_zero_releases() {
    let mut allocator = allocator();

    let a = allocator.allocate(100).unwrap();

    assert!(unsafe { allocator.resize(Some(a), 0) }.unwrap().is_none());
    assert_eq!(allocator.free.head(), unsafe { Block::from_payload(a) });
    assert_eq!(allocator.allocate(100).unwrap(), a);
  }

  #[test]
  fn test_resize_shrinks_in_place() {
    let mut allocator = allocator();

    let a = allocator.allocate(256).unwrap();
    unsafe {
      mem::fill(a.as_ptr(), 0x5A, 256);

      let b = allocator.resize(Some(a), 16).unwrap().unwrap();

      assert_eq!(a, b);
      assert_eq!(allocator.usable_size(b), 16);
      assert_eq!(mem::read(b.as_ptr(), 8), 0x5A5A_5A5A_5A5A_5A5A);

      let tail = allocator.free.head();
      assert_eq!(tail as usize, b.as_ptr() as usize + 16);
      assert_eq!((*tail).size, 256 - 16);
    }
  }

  #[test]
  fn test_resize_grows_by_moving() {
    let mut allocator = allocator();

    let a = allocator.allocate(24).unwrap();
    unsafe {
      for i in 0..24 {
        *a.as_ptr().add(i) = i as u8;
      }

      let b = allocator.resize(Some(a), 500).unwrap().unwrap();

      assert_ne!(a, b);
      for i in 0..24 {
        assert_eq!(*b.as_ptr().add(i), i as u8);
      }
      assert_eq!(allocator.free.head(), Block::from_payload(a));
    }
  }

  #[test]
  fn test_resize_moves_into_free_block() {
    let mut allocator = allocator();

    let roomy = allocator.allocate(512).unwrap();
    let a = allocator.allocate(32).unwrap();
    unsafe {
      allocator.release(Some(roomy));
      mem::fill(a.as_ptr(), 0xC3, 32);

      let heap_before = allocator.heap_size();
      let b = allocator.resize(Some(a), 200).unwrap().unwrap();

      assert_eq!(b, roomy);
      assert_eq!(allocator.heap_size(), heap_before);
      assert_eq!(mem::read(b.as_ptr().add(24), 8), 0xC3C3_C3C3_C3C3_C3C3);
      assert_eq!(allocator.stats().free_blocks, 2);
    }
  }

  #[test]
  fn test_resize_failure_keeps_old_block() {
    let mut allocator =
      Allocator::initialize(&HeapConfig::new().with_max_heap_size(1024)).unwrap();

    let a = allocator.allocate(64).unwrap();
    unsafe {
      mem::write(a.as_ptr(), 0xFEED, 2);

      assert!(matches!(
        allocator.resize(Some(a), 4096),
        Err(AllocError::OutOfMemory { .. })
      ));
      assert!(allocator.free.is_empty());
      assert_eq!(mem::read(a.as_ptr(), 2), 0xFEED);
    }
  }

  #[test]
  fn test_zero_allocate() {
    let mut allocator = allocator();

    let dirty = allocator.allocate(64).unwrap();
    unsafe {
      mem::fill(dirty.as_ptr(), 0xFF, 64);
      allocator.release(Some(dirty));
    }

    let zeroed = allocator.zero_allocate(4, 16).unwrap();
    assert_eq!(zeroed, dirty);
    unsafe {
      for i in 0..64 {
        assert_eq!(*zeroed.as_ptr().add(i), 0);
      }
    }

    assert!(matches!(
      allocator.zero_allocate(usize::MAX, 2),
      Err(AllocError::SizeOverflow { .. })
    ));
    assert!(matches!(allocator.zero_allocate(0, 8), Err(AllocError::InvalidSize)));
  }

  #[test]
  #[should_panic(expected = "heap check failed")]
  fn test_verify_panics_on_corrupted_index() {
    let mut allocator = allocator();

    let a = allocator.allocate(64).unwrap();
    unsafe {
      allocator.release(Some(a));
      (*Block::from_payload(a)).size = 8;
    }

    let _ = allocator.allocate(16);
  }

  #[test]
  fn test_reset() {
    let mut allocator = allocator();

    let a = allocator.allocate(128).unwrap();
    unsafe { allocator.release(Some(a)) };
    allocator.reset();

    assert_eq!(allocator.heap_size(), 0);
    assert!(allocator.free.is_empty());
    assert_eq!(allocator.allocate(128).unwrap(), a);
  }
}
