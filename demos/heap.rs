use std::{io::Read, process, ptr::NonNull};

use rmalloc::{Allocator, Heap, HeapConfig, HeapGrowth, mem};
use tracing_subscriber::filter::LevelFilter;

/// Waits until the user presses ENTER when run with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_alloc(
  allocator: &Allocator,
  label: &str,
  size: usize,
  ptr: NonNull<u8>,
) {
  println!(
    "[{}] allocated {} bytes, address = {:?}, offset = {:#x}, heap size = {}",
    label,
    size,
    ptr,
    ptr.as_ptr() as usize - allocator.heap().heap_lo() as usize,
    allocator.heap_size(),
  );
}

fn print_stats(
  allocator: &Allocator,
  label: &str,
) {
  let stats = allocator.stats();
  println!(
    "[{}] heap size = {}, free blocks = {}, free bytes = {}, largest free = {}",
    label, stats.heap_size, stats.free_blocks, stats.free_bytes, stats.largest_free,
  );
}

fn main() {
  tracing_subscriber::fmt()
    .without_time()
    .with_target(false)
    .with_max_level(LevelFilter::DEBUG)
    .init();

  let step = std::env::args().any(|arg| arg == "--step");

  let config = HeapConfig::from_env().with_verify(true);

  let mut allocator = match Allocator::initialize(&config) {
    Ok(allocator) => allocator,
    Err(err) => {
      eprintln!("FAILURE. {}", err);
      process::exit(1);
    },
  };

  println!(
    "reserved {} bytes at {:?}, page size = {}",
    allocator.heap().capacity(),
    allocator.heap().heap_lo(),
    Heap::page_size(),
  );
  block_until_enter_pressed(step);

  // 1) Two fresh allocations grow the heap.
  let a = allocator.allocate(100).unwrap_or_else(|err| fail(err));
  print_alloc(&allocator, "1a", 100, a);
  let b = allocator.allocate(200).unwrap_or_else(|err| fail(err));
  print_alloc(&allocator, "1b", 200, b);

  unsafe { mem::fill(a.as_ptr(), 0xAB, 100) };
  if let Some(dump) = allocator.heap().probe(a.as_ptr(), 0, 16) {
    println!("[1] {}", dump);
  }
  block_until_enter_pressed(step);

  // 2) Releasing `a` and asking for less splits its block.
  unsafe { allocator.release(Some(a)) };
  let c = allocator.allocate(50).unwrap_or_else(|err| fail(err));
  print_alloc(&allocator, "2", 50, c);
  println!("[2] c == a? {}", c == a);
  print_stats(&allocator, "2");
  block_until_enter_pressed(step);

  // 3) Growing `c` moves it; its bytes come along.
  let c = unsafe { allocator.resize(Some(c), 1000) }
    .unwrap_or_else(|err| fail(err))
    .unwrap_or_else(|| unreachable!("non-zero resize always returns a block"));
  print_alloc(&allocator, "3", 1000, c);
  println!("[3] first byte after move = {:#x}", unsafe { mem::read(c.as_ptr(), 1) });
  block_until_enter_pressed(step);

  // 4) Zeroed array of 16 u64s.
  let z = allocator.zero_allocate(16, 8).unwrap_or_else(|err| fail(err));
  print_alloc(&allocator, "4", 128, z);
  block_until_enter_pressed(step);

  // 5) Small releases never merge, so bigger requests keep growing the heap.
  for round in 0..4 {
    let small = allocator.allocate(64).unwrap_or_else(|err| fail(err));
    unsafe { allocator.release(Some(small)) };
    let large = allocator.allocate(128).unwrap_or_else(|err| fail(err));
    unsafe { allocator.release(Some(large)) };
    print_stats(&allocator, &format!("5.{}", round));
  }

  unsafe {
    allocator.release(Some(b));
    allocator.release(Some(c));
    allocator.release(Some(z));
  }

  println!("\nheap consistent: {}", allocator.check_heap(line!()));
  print_stats(&allocator, "end");
}

fn fail(err: rmalloc::AllocError) -> ! {
  eprintln!("allocation failed: {}", err);
  process::exit(1);
}
