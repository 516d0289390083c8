//! Block metadata: the in-band header preceding every payload.
//!
//! Each region handed out by the allocator is laid out as
//! `[header | user payload]`:
//!
//! ```text
//!   ┌──────────────────────┬─────────────────────────────┐
//!   │     Block header     │        User payload         │
//!   ├──────────────────────┼─────────────────────────────┤
//!   │ size: usize          │                             │
//!   │ is_free: bool        │      size bytes,            │
//!   │ next: *mut Block     │      8-byte aligned         │
//!   │ prev: *mut Block     │                             │
//!   └──────────────────────┴─────────────────────────────┘
//!   ▲                      ▲
//!   │                      └── pointer returned to the user
//!   └── header address (BLOCK_META_SIZE bytes earlier)
//! ```
//!
//! Headers form a doubly-linked list in block-creation order. The links are
//! plain raw pointers: the allocator owns every header uniformly, and the
//! list is navigation, not ownership.
//!
//! Two blocks that are neighbors in the list are not necessarily neighbors
//! in memory - every heap extension is an independent OS mapping. The
//! [`physically_contiguous`] predicate is the only thing that may authorize
//! merging two blocks into one region.

use core::mem;

use crate::align;

/// Metadata header preceding each payload.
///
/// `size` counts payload bytes only (never the header) and is always a
/// positive multiple of [`crate::align::ALIGNMENT`].
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub is_free: bool,
  pub next: *mut Block,
  pub prev: *mut Block,
}

/// Size of the header, rounded up to the alignment unit so that the payload
/// that follows it starts on an aligned address.
pub const BLOCK_META_SIZE: usize = align!(mem::size_of::<Block>());

/// Returns the user payload address for a block header.
///
/// # Safety
///
/// `block` must point to a live header created by this allocator.
#[inline]
pub unsafe fn payload_of(block: *mut Block) -> *mut u8 {
  unsafe { (block as *mut u8).add(BLOCK_META_SIZE) }
}

/// Returns the block header for a user payload address.
///
/// This is the inverse of [`payload_of`]: the header always sits exactly
/// [`BLOCK_META_SIZE`] bytes before the payload.
///
/// # Safety
///
/// `payload` must be an address previously returned by this allocator and
/// still backed by a live block.
#[inline]
pub unsafe fn header_of(payload: *mut u8) -> *mut Block {
  unsafe { payload.sub(BLOCK_META_SIZE) as *mut Block }
}

/// True iff `b` starts exactly where the region of `a` ends, i.e.
/// `addr(a) + BLOCK_META_SIZE + a.size == addr(b)`.
///
/// List adjacency never implies this: blocks from different mappings can
/// sit anywhere relative to each other. Merging two blocks whose regions
/// are not physically contiguous would fold unrelated mappings into one
/// block and corrupt memory, so every coalesce decision checks this first.
///
/// # Safety
///
/// `a` must point to a live header.
#[inline]
pub unsafe fn physically_contiguous(a: *mut Block, b: *mut Block) -> bool {
  unsafe { (a as usize) + BLOCK_META_SIZE + (*a).size == b as usize }
}
