//! Unmangled C symbols for allocator interposition.
//!
//! Building with `--features interpose` exports `malloc`, `free`,
//! `calloc` and `realloc` from the cdylib under their standard names, so
//! loading the library ahead of libc replaces the process allocator:
//!
//! ```bash,ignore
//! cargo build --release --features interpose
//! LD_PRELOAD=target/release/libmapalloc.so ./your_program
//! ```
//!
//! The feature is off by default on purpose: a test binary exporting
//! these symbols would shadow its own harness allocator.

use core::ffi::c_void;

use crate::api;

/// C `malloc`: allocates `size` bytes, null on failure.
///
/// # Safety
///
/// Caller must eventually hand the pointer back to `free` exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
  unsafe { api::malloc(size) as *mut c_void }
}

/// C `free`: releases a pointer from `malloc`/`calloc`/`realloc`. Null is
/// a no-op; unrecognized pointers are logged and ignored.
///
/// # Safety
///
/// `ptr` must not be used after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
  unsafe { api::free(ptr as *mut u8) }
}

/// C `calloc`: zeroed array allocation with overflow-checked sizing.
///
/// # Safety
///
/// Caller must eventually hand the pointer back to `free` exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
  unsafe { api::calloc(nmemb, size) as *mut c_void }
}

/// C `realloc`: resizes an allocation; on failure the original pointer
/// stays valid.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this allocator, and on a
/// non-null return the caller must switch to the returned pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
  unsafe { api::realloc(ptr as *mut u8, size) as *mut c_void }
}
