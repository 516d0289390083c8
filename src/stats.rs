//! Heap introspection: usage counters, external fragmentation, and the
//! structural consistency check.
//!
//! Everything here is a read-only traversal of the block list. These
//! routines exist for external observers (tests, tooling, the demo); the
//! allocation paths never depend on them.

use crate::block::{physically_contiguous, Block};
use crate::heap::Heap;
use crate::log::stderr_line;

/// Snapshot of heap occupancy from a single list traversal.
///
/// Totals count payload bytes only; header overhead is excluded from both
/// sides.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
  /// Payload bytes currently handed out to clients.
  pub total_allocated: usize,
  /// Payload bytes sitting in free blocks.
  pub total_free: usize,
  /// Number of in-use blocks.
  pub allocated_blocks: usize,
  /// Number of free blocks.
  pub free_blocks: usize,
}

impl Heap {
  /// Walks the block list once and tallies usage per category.
  pub fn usage_stats(&self) -> MemoryUsage {
    let mut stats = MemoryUsage::default();

    // SAFETY: reachable headers are live by the engine's invariants.
    unsafe {
      let mut current = self.base;
      while !current.is_null() {
        if (*current).is_free {
          stats.total_free += (*current).size;
          stats.free_blocks += 1;
        } else {
          stats.total_allocated += (*current).size;
          stats.allocated_blocks += 1;
        }
        current = (*current).next;
      }
    }

    stats
  }

  /// External fragmentation of the free memory, in `[0.0, 1.0]`.
  ///
  /// `1.0 - largest_free / total_free`: the share of free memory that is
  /// NOT part of the single largest free block. `0.0` when there is no
  /// free memory at all, or when it all sits in one block; values near
  /// `1.0` mean the free memory is shattered into small fragments that
  /// cannot serve a large request.
  pub fn fragmentation_rate(&self) -> f64 {
    let mut total_free = 0usize;
    let mut largest_free = 0usize;

    // SAFETY: reachable headers are live by the engine's invariants.
    unsafe {
      let mut current = self.base;
      while !current.is_null() {
        if (*current).is_free {
          total_free += (*current).size;
          if (*current).size > largest_free {
            largest_free = (*current).size;
          }
        }
        current = (*current).next;
      }
    }

    if total_free == 0 {
      return 0.0;
    }

    1.0 - (largest_free as f64) / (total_free as f64)
  }

  /// Scans the list for structural damage and reports each finding on the
  /// standard error stream (raw `write(2)`, so the diagnostic path cannot
  /// re-enter the allocator). Returns the number of findings.
  ///
  /// Two conditions are checked:
  ///
  /// - a `next` link whose `prev` does not point back;
  /// - two list-adjacent free blocks that are physically contiguous,
  ///   which the eager coalesce should have merged.
  pub fn check_consistency(&self) -> usize {
    let mut findings = 0usize;

    // SAFETY: reachable headers are live by the engine's invariants; the
    // scan only reads.
    unsafe {
      let mut current = self.base;
      while !current.is_null() {
        let next: *mut Block = (*current).next;

        if !next.is_null() && (*next).prev != current {
          stderr_line(format_args!(
            "heap inconsistency: block {:p} next->prev does not point back to it",
            current
          ));
          findings += 1;
        }

        if !next.is_null()
          && (*current).is_free
          && (*next).is_free
          && physically_contiguous(current, next)
        {
          stderr_line(format_args!(
            "heap inconsistency: contiguous free blocks {:p} and {:p} not coalesced",
            current, next
          ));
          findings += 1;
        }

        current = next;
      }
    }

    findings
  }
}
