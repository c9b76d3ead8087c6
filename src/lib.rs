//! # rmalloc - A First-Fit Free-List Heap Allocator
//!
//! This crate provides a `malloc`-style allocator (allocate, release, resize,
//! zero-allocate) on top of a simulated, forward-only heap that is reserved
//! with `mmap` and grown like `sbrk`.
//!
//! ## Overview
//!
//! Released blocks are kept in an unordered, doubly linked free list whose
//! links live inside the free blocks themselves. Requests are served
//! first-fit from that list, splitting off any surplus, and only grow the
//! heap when nothing fits:
//!
//! ```text
//!   Allocation Path:
//!
//!   allocate(n)
//!      │
//!      ├── n == 0 ────────────────────────────────► InvalidSize
//!      │
//!      ├── block bigger than the whole heap? ──────► grow heap
//!      │
//!      ├── first free block that fits?
//!      │      ├── surplus >= 32 bytes ─► split, remainder stays indexed
//!      │      └── otherwise ───────────► take it whole
//!      │
//!      └── nothing fits ───────────────────────────► grow heap
//!                                                      │
//!                                                      └── refused ─► OutOfMemory
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── allocator  - Allocator: allocate / release / resize / zero_allocate
//!   ├── block      - Block header and free-list links
//!   ├── check      - Consistency checker and heap statistics
//!   ├── config     - HeapConfig
//!   ├── error      - AllocError
//!   ├── heap       - mmap-backed heap with a forward-only break
//!   ├── index      - Free-space index (intrusive doubly linked list)
//!   └── mem        - Byte-level read / write / copy / fill
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rmalloc::{Allocator, HeapConfig};
//!
//! let config = HeapConfig::new().with_max_heap_size(1 << 20);
//! let mut allocator = Allocator::initialize(&config).unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap();
//! assert_eq!(ptr.as_ptr() as usize % 16, 0);
//!
//! unsafe {
//!     ptr.as_ptr().write(42);
//!     let ptr = allocator.resize(Some(ptr), 400).unwrap();
//!     allocator.release(ptr);
//! }
//! ```
//!
//! ## Block Layout
//!
//! Every block carries a 16-byte header in front of the address handed to
//! the caller, so the caller can never overwrite it. While a block is free,
//! its first payload bytes hold the free-list links:
//!
//! ```text
//!   Allocated Block:
//!   ┌──────────────────┬──────────────────────────────────────────┐
//!   │  Header          │            User Data                     │
//!   │  size: N         │         N - 16 bytes usable              │
//!   │  16 bytes        │                                          │
//!   └──────────────────┴──────────────────────────────────────────┘
//!                      ▲
//!                      └── Pointer returned to user (16-byte aligned)
//!
//!   Free Block:
//!   ┌──────────────────┬──────────┬──────────┬────────────────────┐
//!   │  size: N         │  prev    │  next    │   (unused)         │
//!   └──────────────────┴──────────┴──────────┴────────────────────┘
//!     smallest free block: 32 bytes
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No coalescing**: Adjacent free blocks are never merged, so a stream
//!   of small releases followed by larger requests keeps growing the heap
//! - **Monotonic heap**: Memory is never returned to the OS before the
//!   allocator is dropped
//! - **Unix-only**: Requires `libc` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! Releasing or resizing takes raw pointers back from the caller, so those
//! operations are `unsafe`: double releases and foreign pointers are not
//! detected.

pub mod align;
mod allocator;
mod block;
mod check;
mod config;
mod error;
mod heap;
mod index;
pub mod mem;

pub use allocator::Allocator;
pub use block::{HEADER_SIZE, MIN_BLOCK_SIZE};
pub use check::HeapStats;
pub use config::{DEFAULT_MAX_HEAP_SIZE, HeapConfig, MAX_HEAP_SIZE_VAR, VERIFY_VAR};
pub use error::AllocError;
pub use heap::{Heap, HeapGrowth};
