//! Recursion guard and fallback allocator.
//!
//! When this library stands in for the host `malloc`, host-runtime code
//! running *inside* an allocation call can allocate again: dynamic symbol
//! resolution, lazy TLS setup and formatted output all reach for the
//! process allocator. Without protection that nested call re-enters the
//! engine mid-mutation and recurses until the stack is gone.
//!
//! The guard is a per-thread flag. The outermost allocation call raises
//! it and owns the heap until it returns; any nested call sees the raised
//! flag and is diverted:
//!
//! - nested `malloc` goes to the fallback allocator (the host runtime's
//!   original `malloc`, resolved once through `dlsym(RTLD_NEXT, ..)` and
//!   cached);
//! - nested `free` drops the pointer on the floor - the pointer came
//!   either from the fallback or from an earlier completed call, and
//!   leaking it beats unbounded recursion inside a logging routine.
//!
//! The flag is per-thread rather than global so the diversion logic stays
//! correct if the surrounding program is threaded; it is NOT a lock and
//! does not make concurrent mutation of the heap safe.

use core::cell::Cell;
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::log::stderr_line;

thread_local! {
  static INSIDE_ALLOCATOR: Cell<bool> = const { Cell::new(false) };
}

/// Proof that this thread entered the allocator non-reentrantly. Dropping
/// it lowers the flag, so every return path - including early exits and
/// panics in tests - restores the guard.
pub(crate) struct ReentryToken {
  _not_send: core::marker::PhantomData<*mut ()>,
}

impl Drop for ReentryToken {
  fn drop(&mut self) {
    INSIDE_ALLOCATOR.with(|flag| flag.set(false));
  }
}

/// Raises this thread's guard flag. Returns `None` when the flag was
/// already raised, i.e. the caller is a nested allocation call that must
/// take the fallback path.
pub(crate) fn enter() -> Option<ReentryToken> {
  INSIDE_ALLOCATOR.with(|flag| {
    if flag.get() {
      None
    } else {
      flag.set(true);
      Some(ReentryToken { _not_send: core::marker::PhantomData })
    }
  })
}

/// Host `malloc`, cached after the first successful lookup.
static FALLBACK_MALLOC: AtomicPtr<libc::c_void> = AtomicPtr::new(ptr::null_mut());

type MallocFn = unsafe extern "C" fn(usize) -> *mut libc::c_void;

/// Allocates through the host runtime's original `malloc`.
///
/// The symbol is resolved against the next object in link order that
/// provides one, then cached. Resolution failure is reported on stderr
/// and surfaces as null - at that point the process has no allocator to
/// fall back on and the caller's own failure handling takes over.
///
/// # Safety
///
/// Must only be called when a host `malloc` can legitimately serve the
/// request (the returned memory is owned by the host allocator, not by
/// this crate's heap).
pub(crate) unsafe fn fallback_malloc(size: usize) -> *mut u8 {
  let mut sym = FALLBACK_MALLOC.load(Ordering::Acquire);

  if sym.is_null() {
    // SAFETY: plain symbol lookup; RTLD_NEXT skips our own interposed
    // definition. dlsym may allocate internally, which is why callers
    // only reach this path with the guard flag already raised.
    sym = unsafe { libc::dlsym(libc::RTLD_NEXT, c"malloc".as_ptr()) };
    if sym.is_null() {
      stderr_line(format_args!("mapalloc: cannot resolve host malloc, returning null"));
      return ptr::null_mut();
    }
    FALLBACK_MALLOC.store(sym, Ordering::Release);
  }

  // SAFETY: the symbol named "malloc" has the libc malloc signature.
  let func: MallocFn = unsafe { mem::transmute(sym) };
  unsafe { func(size) as *mut u8 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guard_blocks_nested_entry_and_resets_on_drop() {
    let outer = enter();
    assert!(outer.is_some());

    // Nested entry on the same thread is refused.
    assert!(enter().is_none());

    drop(outer);
    let again = enter();
    assert!(again.is_some());
  }

  #[test]
  fn guard_is_per_thread() {
    let _outer = enter().unwrap();

    let handle = std::thread::spawn(|| enter().is_some());
    assert!(handle.join().unwrap());
  }

  #[test]
  fn fallback_malloc_resolves_the_host_allocator() {
    unsafe {
      let p = fallback_malloc(64);
      assert!(!p.is_null());

      // The memory belongs to the host allocator; return it there.
      libc::free(p as *mut libc::c_void);
    }
  }
}
