use std::io;

/// Everything that can keep a request from being satisfied.
///
/// Only [`AllocError::ReservationFailure`] leaves no usable allocator behind;
/// after any other error the free-space index is still valid and the caller
/// may keep issuing requests.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
  /// A zero-byte allocation was requested.
  #[error("invalid allocation size: zero bytes requested")]
  InvalidSize,

  /// The heap could not grow far enough to hold `requested` more bytes.
  #[error("out of memory: cannot grow heap of {heap_size} bytes by {requested} bytes")]
  OutOfMemory { requested: usize, heap_size: usize },

  /// `count * size` does not fit in a `usize`.
  #[error("size overflow: {count} elements of {size} bytes")]
  SizeOverflow { count: usize, size: usize },

  /// The up-front address range reservation was refused by the OS.
  #[error("could not reserve {size} bytes for the heap: {source}")]
  ReservationFailure {
    size: usize,
    #[source]
    source: io::Error,
  },
}

impl AllocError {
  /// Returns true for errors that leave the allocator usable.
  pub fn is_recoverable(&self) -> bool {
    !matches!(self, AllocError::ReservationFailure { .. })
  }
}
