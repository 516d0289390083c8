//! # mapalloc - A Policy-Driven malloc Replacement
//!
//! This crate implements a general-purpose dynamic memory allocator that
//! can stand in for the C library's `malloc`/`free`/`calloc`/`realloc`,
//! managing a heap built from anonymous `mmap` regions.
//!
//! ## Overview
//!
//! Every allocation lives in a *block*: an in-band metadata header
//! followed by the user payload. All blocks ever created are threaded
//! onto one doubly-linked list, free and in-use alike:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         PROCESS HEAP                                 │
//!   │                                                                      │
//!   │   base ──► [hdr|A: 64 used] ◄──► [hdr|B: 128 free] ◄──► [hdr|C: 32] │
//!   │              mapping #1             mapping #2           mapping #2  │
//!   │                                                                      │
//!   │   Each heap extension is a fresh anonymous mapping; only splits      │
//!   │   produce blocks that share one. List neighbors are therefore not    │
//!   │   always memory neighbors, and merges must prove physical           │
//!   │   contiguity first.                                                  │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request is served by searching the list for a free block under the
//! configured placement policy - first fit, best fit or worst fit -
//! splitting off any usable surplus, and extending the heap with a fresh
//! mapping when nothing fits. Freeing marks the block and eagerly merges
//! it with free physically-contiguous neighbors.
//!
//! ## Crate Structure
//!
//! ```text
//!   mapalloc
//!   ├── align      - alignment unit and the align! macro
//!   ├── block      - block header layout and pointer conversions
//!   ├── heap       - block list engine: search, extend, split, coalesce
//!   ├── allocator  - malloc/free/calloc/realloc on the engine
//!   ├── stats      - usage counters, fragmentation rate, consistency check
//!   ├── log        - recursion-safe event log (raw fd writes)
//!   ├── reentry    - per-thread recursion guard + fallback allocator
//!   ├── api        - the process-global allocator surface
//!   └── interpose  - unmangled C symbols (feature "interpose")
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use mapalloc::{AllocationPolicy, Heap};
//!
//! let mut heap = Heap::with_policy(AllocationPolicy::BestFit);
//!
//! unsafe {
//!   let p = heap.malloc(100);
//!   assert!(!p.is_null());
//!
//!   p.write_bytes(0x2A, 100);
//!   assert_eq!(42, *p);
//!
//!   heap.free(p);
//! }
//!
//! let stats = heap.usage_stats();
//! assert_eq!(1, stats.free_blocks);
//! ```
//!
//! The same operations exist on a process-global heap for replacing the
//! host allocator; see [`malloc`], [`free`], [`calloc`], [`realloc`] and
//! the `interpose` feature for the LD_PRELOAD wiring.
//!
//! ## Replacing the host allocator
//!
//! Standing in for `malloc` means host-runtime code that allocates
//! (symbol resolution, formatted output) re-enters the allocator from
//! inside itself. Two mechanisms make that survivable:
//!
//! - a per-thread recursion guard diverts nested allocation calls to the
//!   host's original `malloc` (resolved once via `dlsym(RTLD_NEXT, ..)`);
//! - the event log formats into a fixed stack buffer and writes with raw
//!   `write(2)` calls, so observing the allocator never allocates.
//!
//! ## Limitations
//!
//! - **Single mutator**: heap mutations are not locked. Concurrent
//!   allocation from several threads is undefined behavior by contract.
//! - **Memory is never unmapped**: freed blocks are recycled, not
//!   returned to the OS; `reset_heap_for_testing` abandons mappings
//!   outright (test-only leak by design).
//! - **No hardening**: no canaries, checksums or guard pages; the
//!   pointer validation scan is a correctness device, not a security
//!   boundary.
//!
//! ## Safety
//!
//! The allocation entry points are `unsafe`: they hand out and consume
//! raw pointers whose lifecycles the borrow checker cannot see. Callers
//! uphold the usual C allocator rules - free once, never use after free,
//! never free foreign pointers (the latter is detected and ignored, but
//! relying on that is a bug).

pub mod align;
mod allocator;
mod api;
mod block;
mod heap;
mod log;
mod reentry;
mod stats;

#[cfg(feature = "interpose")]
mod interpose;

pub use api::{
  allocation_policy, calloc, check_heap_consistency, close_memory_log, fragmentation_rate, free,
  init_memory_log, malloc, memory_usage_stats, realloc, reset_heap_for_testing,
  set_allocation_policy, set_allocation_policy_raw,
};
pub use heap::{AllocationPolicy, Heap};
pub use stats::MemoryUsage;
