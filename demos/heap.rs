use std::{io::Read, ptr};

use libc::sbrk;
use segalloc::{Allocator, Arena, Config, MmapArena, SbrkArena};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER, but only when started with `--step`.
/// Stepping leaves time to inspect the process with `pmap` or `gdb`.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  size: usize,
  ptr: *mut u8,
) {
  println!("  requested {size:>6} bytes -> {ptr:?} (align 16: {})", ptr as usize % 16 == 0);
}

fn print_heap<A: Arena>(allocator: &Allocator<A>) {
  let base = allocator.arena().low().as_ptr() as usize;

  println!("  heap {:#x} .. {:#x}", base, base + allocator.heap_size());
  for block in allocator.blocks() {
    println!(
      "    +{:<8} {:>7} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "used" } else { "free" }
    );
  }

  match allocator.check_heap() {
    Ok(report) => println!(
      "  {} used / {} free blocks, {} bytes free",
      report.allocated_blocks, report.free_blocks, report.free_bytes
    ),
    Err(violation) => println!("  heap is inconsistent: {violation}"),
  }
}

fn run<A: Arena>(
  mut allocator: Allocator<A>,
  step: bool,
) {
  unsafe {
    print_heap(&allocator);
    pause(step);

    // ------------------------------------------------------------------
    // 1) A few small allocations carved off the first chunk.
    // ------------------------------------------------------------------
    println!("\n[1] Allocate 8, 200 and 4000 bytes");
    let small = allocator.alloc(8);
    print_alloc(8, small);
    let medium = allocator.alloc(200);
    print_alloc(200, medium);
    let large = allocator.alloc(4000);
    print_alloc(4000, large);

    small.cast::<u64>().write(0xDEADBEEF);
    ptr::write_bytes(medium, 0xAB, 200);
    print_heap(&allocator);
    pause(step);

    // ------------------------------------------------------------------
    // 2) Release and allocate the same size again: the block is reused.
    // ------------------------------------------------------------------
    allocator.release(medium);
    let again = allocator.alloc(200);
    println!("\n[2] Release 200 bytes, allocate 200 again");
    print_alloc(200, again);
    println!("  reused the freed block? {}", again == medium);
    pause(step);

    // ------------------------------------------------------------------
    // 3) Releasing neighbours merges them into one free block.
    // ------------------------------------------------------------------
    allocator.release(small);
    allocator.release(again);
    println!("\n[3] Release the 8 and 200 byte blocks (neighbours)");
    print_heap(&allocator);
    pause(step);

    // ------------------------------------------------------------------
    // 4) Something larger than a chunk grows the heap.
    // ------------------------------------------------------------------
    print_program_break("before large alloc");
    let before = allocator.heap_size();
    let big = allocator.alloc(64 * 1024);
    println!("\n[4] Allocate 64 KiB");
    print_alloc(64 * 1024, big);
    println!("  heap grew by {} bytes", allocator.heap_size() - before);
    print_program_break("after large alloc");
    pause(step);

    // ------------------------------------------------------------------
    // 5) realloc keeps the contents, calloc hands out zeroes.
    // ------------------------------------------------------------------
    let moved = allocator.realloc(large, 6000);
    let zeroed = allocator.calloc(32, 8);
    println!("\n[5] realloc 4000 -> 6000, calloc 32 x 8");
    print_alloc(6000, moved);
    print_alloc(256, zeroed);
    pause(step);

    allocator.release(moved);
    allocator.release(zeroed);
    allocator.release(big);

    println!("\n[6] Everything released");
    print_heap(&allocator);
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("segalloc=debug")))
    .init();

  let step = std::env::args().any(|arg| arg == "--step");
  let config = match Config::from_env() {
    Ok(config) => config,
    Err(err) => {
      eprintln!("{err}");
      std::process::exit(1);
    }
  };

  print_program_break("start");

  match SbrkArena::new().and_then(|arena| Allocator::init(arena, config.clone())) {
    Ok(allocator) => {
      println!("Using the program break (sbrk)");
      run(allocator, step);
    }
    Err(err) => {
      println!("sbrk arena unavailable ({err}), falling back to mmap");
      match MmapArena::with_capacity(config.arena_capacity).and_then(|arena| Allocator::init(arena, config)) {
        Ok(allocator) => run(allocator, step),
        Err(err) => {
          eprintln!("{err}");
          std::process::exit(1);
        }
      }
    }
  }

  println!("\nEnd of demo. The OS reclaims all memory on exit.");
}
