//! The four allocation operations, implemented as [`Heap`] engine methods.
//!
//! These are the semantic core of the crate: `malloc`, `free`, `calloc`
//! and `realloc` with C-library contracts, expressed over the block list.
//! The process-global, recursion-guarded wrappers live in [`crate::api`];
//! the methods here know nothing about guards or globals, which is what
//! lets tests drive a private `Heap` instance per scenario.
//!
//! ## Allocation flow
//!
//! ```text
//!   malloc(size)
//!      │ size == 0 ──────────────────────────► null
//!      ▼
//!   align size up to 8
//!      │ heap empty ──► extend_heap ──► becomes list base
//!      ▼
//!   find_free_block (policy search)
//!      │ hit ──► split surplus ──► mark in use
//!      │ miss ─► extend_heap from last visited block
//!      ▼
//!   header address + BLOCK_META_SIZE ─────────► user pointer
//! ```
//!
//! `free` validates the pointer against the block list before touching
//! anything: an address the allocator never handed out is logged and
//! ignored rather than corrupting the heap (or aborting the process).

use core::ptr;

use crate::align;
use crate::block::{header_of, payload_of, physically_contiguous, BLOCK_META_SIZE};
use crate::heap::{absorb_next, coalesce_blocks, extend_heap, split_block, Heap};
use crate::log::log_event;

impl Heap {
  /// Allocates `size` bytes and returns the payload pointer, or null when
  /// `size` is zero or the OS refuses memory.
  ///
  /// The returned pointer is 8-byte aligned and backed by at least
  /// `align!(size)` payload bytes.
  ///
  /// # Safety
  ///
  /// Single-mutator: no other call may be operating on this heap.
  pub unsafe fn malloc(&mut self, size: usize) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    let aligned = align!(size);
    let block;

    if self.base.is_null() {
      block = unsafe { extend_heap(ptr::null_mut(), aligned) };
      if block.is_null() {
        return ptr::null_mut();
      }
      self.base = block;
    } else {
      let (found, last) = unsafe { self.find_free_block(aligned) };
      if !found.is_null() {
        unsafe {
          split_block(found, aligned);
          (*found).is_free = false;
        }
        block = found;
      } else {
        block = unsafe { extend_heap(last, aligned) };
        if block.is_null() {
          return ptr::null_mut();
        }
      }
    }

    let user_ptr = unsafe { payload_of(block) };
    log_event!("malloc: requested {}, allocated {} at {:p}", size, aligned, user_ptr);
    user_ptr
  }

  /// Releases the block behind `p` back to the heap.
  ///
  /// Null is a no-op. A pointer that does not name the payload of an
  /// in-use block is logged and otherwise ignored. A valid block is
  /// marked free and eagerly merged with free physically-contiguous
  /// neighbors.
  ///
  /// # Safety
  ///
  /// Single-mutator, and the payload behind a valid `p` must no longer be
  /// used by the caller after this returns.
  pub unsafe fn free(&mut self, p: *mut u8) {
    if p.is_null() {
      return;
    }

    if self.is_valid_address(p) {
      unsafe {
        let block = header_of(p);
        (*block).is_free = true;
        log_event!("free: freeing {:p} (size {})", p, (*block).size);
        coalesce_blocks(block);
      }
    } else {
      log_event!("free: invalid pointer {:p}", p);
    }
  }

  /// Allocates a zeroed array of `number` elements of `size` bytes each.
  ///
  /// Returns null when the element count times the element size
  /// overflows, when the product is zero, or when allocation fails.
  /// Exactly `number * size` payload bytes are zeroed; alignment slack
  /// beyond that stays uninitialized.
  ///
  /// # Safety
  ///
  /// Single-mutator: no other call may be operating on this heap.
  pub unsafe fn calloc(&mut self, number: usize, size: usize) -> *mut u8 {
    let Some(total) = number.checked_mul(size) else {
      return ptr::null_mut();
    };

    let p = unsafe { self.malloc(total) };
    if !p.is_null() {
      unsafe {
        ptr::write_bytes(p, 0, total);
      }
      log_event!("calloc: allocated and zeroed {} bytes at {:p}", total, p);
    }
    p
  }

  /// Resizes the allocation behind `p` to `size` bytes.
  ///
  /// Case analysis, in order:
  ///
  /// 1. `p` null: plain `malloc(size)`.
  /// 2. `size` zero: plain `free(p)`, returns null.
  /// 3. `p` invalid: logged, returns null.
  /// 4. The block already holds the aligned size: shrink in place (split
  ///    off the surplus), return `p`.
  /// 5. The next block is free, physically contiguous, and together they
  ///    cover the request: absorb it forward, trim to size, return `p`.
  /// 6. Otherwise allocate elsewhere, copy the old payload, free the old
  ///    block. On allocation failure the original block is untouched and
  ///    `p` remains valid.
  ///
  /// # Safety
  ///
  /// Single-mutator, and on a non-null return the caller must stop using
  /// `p` unless the returned pointer equals it.
  pub unsafe fn realloc(&mut self, p: *mut u8, size: usize) -> *mut u8 {
    if p.is_null() {
      return unsafe { self.malloc(size) };
    }
    if size == 0 {
      unsafe {
        self.free(p);
      }
      return ptr::null_mut();
    }

    if !self.is_valid_address(p) {
      log_event!("realloc: invalid pointer {:p}", p);
      return ptr::null_mut();
    }

    let block = unsafe { header_of(p) };
    let aligned = align!(size);

    unsafe {
      if (*block).size >= aligned {
        let fragment = split_block(block, aligned);
        if !fragment.is_null() {
          // The cut-off tail may sit right before another free block of
          // the same mapping; merge so the remainder stays whole.
          coalesce_blocks(fragment);
        }
        log_event!("realloc: shrunk block at {:p} to {} bytes", p, aligned);
        return p;
      }

      let next = (*block).next;
      if !next.is_null()
        && (*next).is_free
        && physically_contiguous(block, next)
        && (*block).size + BLOCK_META_SIZE + (*next).size >= aligned
      {
        absorb_next(block);
        split_block(block, aligned);
        log_event!("realloc: expanded block at {:p} in place to {} bytes", p, aligned);
        return p;
      }
    }

    let old_size = unsafe { (*block).size };
    let new_ptr = unsafe { self.malloc(size) };
    if new_ptr.is_null() {
      // Standard realloc contract: failure leaves the original block
      // allocated and valid.
      return ptr::null_mut();
    }

    unsafe {
      ptr::copy_nonoverlapping(p, new_ptr, old_size.min(aligned));
      self.free(p);
    }

    log_event!("realloc: moved block from {:p} to {:p} (new size {})", p, new_ptr, aligned);
    new_ptr
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn usage(heap: &Heap) -> (usize, usize) {
    let stats = heap.usage_stats();
    (stats.allocated_blocks, stats.free_blocks)
  }

  #[test]
  fn malloc_zero_returns_null() {
    let mut heap = Heap::new();

    unsafe {
      assert!(heap.malloc(0).is_null());
    }
    assert!(heap.is_empty());
  }

  #[test]
  fn malloc_returns_aligned_writable_memory() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.malloc(13);
      assert!(!p.is_null());
      assert_eq!(0, p as usize % crate::align::ALIGNMENT);

      // Write the full aligned capacity to prove it is backed.
      ptr::write_bytes(p, 0xA5, 16);
      assert_eq!(0xA5, *p.add(15));
      assert!(heap.is_valid_address(p));
    }
  }

  #[test]
  fn freed_blocks_are_reused() {
    let mut heap = Heap::new();

    unsafe {
      let p1 = heap.malloc(100);
      // Spacer keeps the freed block away from the list tail.
      let _p2 = heap.malloc(100);
      heap.free(p1);

      let p3 = heap.malloc(64);
      assert_eq!(p1, p3);
    }
  }

  #[test]
  fn coalesce_cascade_collapses_three_frees_into_one() {
    // The three blocks come from three mappings, so the counts only
    // collapse where splits made blocks physically contiguous; with
    // whole-mapping blocks each free stands alone in its own region and
    // the interesting cascade happens inside one mapping instead.
    let mut heap = Heap::new();

    unsafe {
      // One mapping, three sub-blocks: carve p1, p2, p3 out of a single
      // large region via splits.
      let big = heap.malloc(3 * (100 + BLOCK_META_SIZE));
      heap.free(big);
      assert_eq!((0, 1), usage(&heap));

      let p1 = heap.malloc(100);
      let p2 = heap.malloc(100);
      let p3 = heap.malloc(100);
      assert!(!p3.is_null());

      heap.free(p2);
      let (_, free_blocks) = usage(&heap);
      let baseline = free_blocks;

      heap.free(p1);
      assert_eq!(baseline, usage(&heap).1);

      heap.free(p3);
      assert_eq!(1, usage(&heap).1);
    }
  }

  #[test]
  fn split_serves_a_small_request_from_a_large_free_block() {
    let mut heap = Heap::new();

    unsafe {
      let large = heap.malloc(2048);
      heap.free(large);
      assert_eq!((0, 1), usage(&heap));

      let small = heap.malloc(128);
      assert!(!small.is_null());
      assert_eq!((1, 1), usage(&heap));
    }
  }

  #[test]
  fn calloc_zeroes_every_byte() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.calloc(100, 1);
      assert!(!p.is_null());
      for i in 0..100 {
        assert_eq!(0, *p.add(i));
      }
    }
  }

  #[test]
  fn calloc_rejects_overflow_and_zero() {
    let mut heap = Heap::new();

    unsafe {
      assert!(heap.calloc(usize::MAX, 2).is_null());
      assert!(heap.calloc(0, 8).is_null());
      assert!(heap.calloc(8, 0).is_null());
    }
    assert!(heap.is_empty());
  }

  #[test]
  fn realloc_null_behaves_like_malloc() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.realloc(ptr::null_mut(), 32);
      assert!(!p.is_null());
      assert!(heap.is_valid_address(p));
    }
  }

  #[test]
  fn realloc_zero_behaves_like_free() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.malloc(32);
      assert!(heap.realloc(p, 0).is_null());
      assert!(!heap.is_valid_address(p));
    }
  }

  #[test]
  fn realloc_invalid_pointer_returns_null() {
    let mut heap = Heap::new();

    unsafe {
      assert!(!heap.malloc(32).is_null());
      let bogus = 64 as *mut u8;
      assert!(heap.realloc(bogus, 32).is_null());
    }
  }

  #[test]
  fn realloc_shrink_keeps_the_pointer_and_contents() {
    let mut heap = Heap::new();
    let text: &[u8] = b"Este es un texto de prueba largo";

    unsafe {
      let p = heap.malloc(50);
      ptr::copy_nonoverlapping(text.as_ptr(), p, text.len());

      let shrunk = heap.realloc(p, 20);
      assert_eq!(p, shrunk);
      for i in 0..20 {
        assert_eq!(text[i], *shrunk.add(i));
      }
    }
  }

  #[test]
  fn realloc_expands_in_place_over_a_free_neighbor() {
    let mut heap = Heap::new();

    unsafe {
      // Carve two contiguous blocks out of one mapping.
      let big = heap.malloc(2 * (32 + BLOCK_META_SIZE));
      heap.free(big);
      let p1 = heap.malloc(32);
      let p2 = heap.malloc(32);
      ptr::copy_nonoverlapping(b"data".as_ptr(), p1, 4);

      heap.free(p2);

      let expanded = heap.realloc(p1, 64);
      assert_eq!(p1, expanded);
      assert_eq!(b"data", &[*p1, *p1.add(1), *p1.add(2), *p1.add(3)]);
    }
  }

  #[test]
  fn realloc_moves_when_it_cannot_grow_in_place() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.malloc(50);
      ptr::copy_nonoverlapping(b"data".as_ptr(), p, 4);

      // A plug directly after p in list order; even though it lives in
      // another mapping the old block simply has no free contiguous
      // neighbor to grow over.
      assert!(!heap.malloc(16).is_null());

      let moved = heap.realloc(p, 100);
      assert!(!moved.is_null());
      assert_ne!(p, moved);
      assert_eq!(b"data", &[*moved, *moved.add(1), *moved.add(2), *moved.add(3)]);

      // The old pointer went back to the heap.
      assert!(!heap.is_valid_address(p));
    }
  }

  #[test]
  fn realloc_shrink_remainder_rejoins_a_free_tail() {
    let mut heap = Heap::new();

    unsafe {
      // One mapping: [p1][rest free]. Shrinking p1 must leave a single
      // free block, not a chain of contiguous free fragments.
      let big = heap.malloc(512);
      heap.free(big);
      let p1 = heap.malloc(128);
      assert_eq!((1, 1), usage(&heap));

      let shrunk = heap.realloc(p1, 32);
      assert_eq!(p1, shrunk);
      assert_eq!((1, 1), usage(&heap));
      assert_eq!(0, heap.check_consistency());
    }
  }

  #[test]
  fn free_invalid_pointer_is_a_logged_no_op() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.malloc(32);
      let (allocated, free_blocks) = usage(&heap);

      heap.free(64 as *mut u8);
      // Interior pointers are not payload addresses either.
      heap.free(p.add(8));

      assert_eq!((allocated, free_blocks), usage(&heap));
      assert!(heap.is_valid_address(p));
    }
  }

  #[test]
  fn free_null_is_a_no_op() {
    let mut heap = Heap::new();

    unsafe {
      heap.free(ptr::null_mut());
    }
    assert!(heap.is_empty());
  }

  #[test]
  fn double_free_is_rejected_by_validation() {
    let mut heap = Heap::new();

    unsafe {
      let p = heap.malloc(32);
      heap.free(p);
      assert!(!heap.is_valid_address(p));

      // Second free finds no in-use block at this payload address.
      heap.free(p);
      assert_eq!(1, usage(&heap).1);
    }
  }
}
