use std::time::Instant;

use mapalloc::{
  calloc, check_heap_consistency, close_memory_log, fragmentation_rate, free, init_memory_log,
  malloc, memory_usage_stats, realloc, reset_heap_for_testing, set_allocation_policy,
  AllocationPolicy,
};

/// Workload knobs for the policy comparison, mirroring a mixed
/// allocate-then-punch-holes usage profile.
const NUM_ALLOCS: usize = 1000;
const MAX_ALLOC_SIZE: usize = 256;

/// Tiny deterministic generator so the three policies see the exact same
/// request sequence and the numbers are reproducible across runs.
struct Lcg(u64);

impl Lcg {
  fn next_size(&mut self) -> usize {
    self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    1 + ((self.0 >> 33) as usize % MAX_ALLOC_SIZE)
  }
}

/// Runs the mixed workload under the current policy and prints timing,
/// occupancy and fragmentation.
unsafe fn run_workload_and_measure(policy_name: &str) {
  let mut pointers: Vec<*mut u8> = Vec::with_capacity(NUM_ALLOCS);
  let mut sizes = Lcg(0x6d61_7061_6c6c_6f63);

  let start = Instant::now();
  for _ in 0..NUM_ALLOCS {
    pointers.push(unsafe { malloc(sizes.next_size()) });
  }
  let elapsed = start.elapsed();

  println!("\nPolicy: {policy_name}");
  println!("  allocation time: {elapsed:?}");

  // Punch holes: releasing every other block shatters the free space.
  for i in (0..NUM_ALLOCS).step_by(2) {
    unsafe { free(pointers[i]) };
    pointers[i] = std::ptr::null_mut();
  }

  let stats = memory_usage_stats();
  println!(
    "  after partial free: {} blocks / {} bytes in use, {} blocks / {} bytes free",
    stats.allocated_blocks, stats.total_allocated, stats.free_blocks, stats.total_free
  );
  println!("  fragmentation: {:.4}", fragmentation_rate());

  for p in pointers {
    if !p.is_null() {
      unsafe { free(p) };
    }
  }
}

fn main() {
  init_memory_log(Some("mapalloc_events.log"));

  unsafe {
    // ------------------------------------------------------------------
    // 1) Plain allocation: write through the pointer to show it's real.
    // ------------------------------------------------------------------
    println!("[1] malloc(100) and write a pattern");
    let p = malloc(100);
    p.write_bytes(0xAB, 100);
    println!("    p = {p:?}, p[99] = {:#04x}", *p.add(99));

    // ------------------------------------------------------------------
    // 2) Free and re-allocate: the hole is reused.
    // ------------------------------------------------------------------
    free(p);
    let q = malloc(64);
    println!("\n[2] free(p) then malloc(64)");
    println!(
      "    q = {q:?} ({})",
      if q == p { "reused the freed block" } else { "fresh mapping" }
    );

    // ------------------------------------------------------------------
    // 3) calloc: zeroed array allocation.
    // ------------------------------------------------------------------
    let zeroed = calloc(16, 4);
    println!("\n[3] calloc(16, 4)");
    println!("    zeroed = {zeroed:?}, first byte = {}", *zeroed);

    // ------------------------------------------------------------------
    // 4) realloc: shrink in place, then grow past a plug (moves).
    // ------------------------------------------------------------------
    let r = malloc(50);
    r.copy_from_nonoverlapping(b"mapalloc demo payload".as_ptr(), 21);
    let shrunk = realloc(r, 20);
    println!("\n[4] realloc shrink: {r:?} -> {shrunk:?} (same address)");

    let _plug = malloc(16);
    let grown = realloc(shrunk, 200);
    println!("    realloc grow past a plug: {shrunk:?} -> {grown:?} (moved)");

    // ------------------------------------------------------------------
    // 5) Heap health check and current usage.
    // ------------------------------------------------------------------
    let stats = memory_usage_stats();
    println!("\n[5] usage: {stats:?}");
    println!("    consistency findings: {}", check_heap_consistency());

    // ------------------------------------------------------------------
    // 6) Compare the three placement policies on one workload.
    // ------------------------------------------------------------------
    println!("\n[6] policy comparison ({NUM_ALLOCS} allocations, sizes 1..={MAX_ALLOC_SIZE})");

    reset_heap_for_testing();
    set_allocation_policy(AllocationPolicy::FirstFit);
    run_workload_and_measure("first fit");

    reset_heap_for_testing();
    set_allocation_policy(AllocationPolicy::BestFit);
    run_workload_and_measure("best fit");

    reset_heap_for_testing();
    set_allocation_policy(AllocationPolicy::WorstFit);
    run_workload_and_measure("worst fit");
  }

  close_memory_log();
  println!("\nEvent log written to mapalloc_events.log");
}
