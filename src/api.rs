//! Process-global allocator surface.
//!
//! One [`Heap`] instance serves the whole process, mirroring the contract
//! of the C library allocator this crate replaces. Every allocation entry
//! point consults the per-thread recursion guard before touching the
//! heap; see [`crate::reentry`] for why.
//!
//! # Single-mutator contract
//!
//! The global heap is mutated without locks. That is correct for the
//! intended use - one mutator at a time, serialized calls - and undefined
//! for concurrent mutators, exactly like the design it implements. The
//! recursion flag is deliberately per-thread so the *diversion* logic
//! stays sound in a threaded host, but it does not serialize the heap.

use core::cell::UnsafeCell;
use core::ptr;

use crate::heap::{AllocationPolicy, Heap};
use crate::log;
use crate::reentry;
use crate::stats::MemoryUsage;

struct GlobalHeap(UnsafeCell<Heap>);

// SAFETY: asserted under the single-mutator contract documented above;
// the cell is only touched from the allocation entry points, which the
// caller serializes.
unsafe impl Sync for GlobalHeap {}

static HEAP: GlobalHeap = GlobalHeap(UnsafeCell::new(Heap::new()));

/// # Safety
///
/// Caller must hold the single-mutator contract; the returned reference
/// must not outlive the current operation.
unsafe fn heap() -> &'static mut Heap {
  unsafe { &mut *HEAP.0.get() }
}

/// Allocates `size` bytes from the global heap.
///
/// Returns null for zero sizes and on OS mapping failure. Reentrant
/// calls (allocation from inside an allocation) are served by the host
/// runtime's original allocator.
///
/// # Safety
///
/// Single-mutator contract on the global heap.
pub unsafe fn malloc(size: usize) -> *mut u8 {
  let Some(_token) = reentry::enter() else {
    return unsafe { reentry::fallback_malloc(size) };
  };
  unsafe { heap().malloc(size) }
}

/// Releases an allocation obtained from [`malloc`], [`calloc`] or
/// [`realloc`]. Null and unrecognized pointers are no-ops (the latter
/// logged). Reentrant calls return immediately without touching the
/// pointer.
///
/// # Safety
///
/// Single-mutator contract, and `p` must not be used after this call.
pub unsafe fn free(p: *mut u8) {
  let Some(_token) = reentry::enter() else {
    return;
  };
  unsafe { heap().free(p) }
}

/// Allocates a zeroed array of `number` elements of `size` bytes.
/// Overflowing products and zero totals yield null. A reentrant call is
/// served by the fallback allocator and zeroed the same way.
///
/// # Safety
///
/// Single-mutator contract on the global heap.
pub unsafe fn calloc(number: usize, size: usize) -> *mut u8 {
  let Some(_token) = reentry::enter() else {
    let Some(total) = number.checked_mul(size) else {
      return ptr::null_mut();
    };
    let p = unsafe { reentry::fallback_malloc(total) };
    if !p.is_null() {
      unsafe {
        ptr::write_bytes(p, 0, total);
      }
    }
    return p;
  };
  unsafe { heap().calloc(number, size) }
}

/// Resizes an allocation; see [`Heap::realloc`] for the case analysis.
/// On failure the original pointer stays valid. A reentrant call returns
/// null rather than walking a heap that is mid-mutation.
///
/// # Safety
///
/// Single-mutator contract, and on success the caller must switch to the
/// returned pointer.
pub unsafe fn realloc(p: *mut u8, size: usize) -> *mut u8 {
  let Some(_token) = reentry::enter() else {
    return ptr::null_mut();
  };
  unsafe { heap().realloc(p, size) }
}

/// Selects the placement policy used by subsequent allocations.
pub fn set_allocation_policy(policy: AllocationPolicy) {
  // SAFETY: policy is a plain field write under the single-mutator
  // contract.
  unsafe {
    heap().set_policy(policy);
  }
}

/// Integer-valued policy selector for foreign callers: `0` first fit,
/// `1` best fit, `2` worst fit. Out-of-range values are ignored.
pub fn set_allocation_policy_raw(raw: i32) {
  if let Some(policy) = AllocationPolicy::from_raw(raw) {
    set_allocation_policy(policy);
  }
}

/// Returns the placement policy currently in effect.
pub fn allocation_policy() -> AllocationPolicy {
  // SAFETY: plain field read under the single-mutator contract.
  unsafe { heap().policy() }
}

/// Opens the event log at `path` (truncating), or disables logging when
/// `path` is `None`. See [`crate::log`].
pub fn init_memory_log(path: Option<&str>) {
  log::init_memory_log(path);
}

/// Closes the event log if open.
pub fn close_memory_log() {
  log::close_memory_log();
}

/// Usage counters for the global heap; a single read-only traversal.
pub fn memory_usage_stats() -> MemoryUsage {
  // SAFETY: read-only traversal under the single-mutator contract.
  unsafe { heap().usage_stats() }
}

/// External fragmentation of the global heap, in `[0.0, 1.0]`.
pub fn fragmentation_rate() -> f64 {
  // SAFETY: read-only traversal under the single-mutator contract.
  unsafe { heap().fragmentation_rate() }
}

/// Scans the global heap for structural damage, reporting findings on
/// stderr. Returns the number of findings.
pub fn check_heap_consistency() -> usize {
  // SAFETY: read-only traversal under the single-mutator contract.
  unsafe { heap().check_consistency() }
}

/// Abandons every block of the global heap so the next allocation starts
/// from scratch.
///
/// The old mappings are leaked by design. This exists to isolate tests
/// from one another; it has no legitimate production use.
///
/// # Safety
///
/// No allocation obtained earlier from this crate may be used or freed
/// after the reset, and the single-mutator contract applies.
pub unsafe fn reset_heap_for_testing() {
  unsafe {
    heap().reset();
  }
}
