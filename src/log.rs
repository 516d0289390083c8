//! Recursion-safe event log.
//!
//! Every allocator decision point reports here. The constraint that shapes
//! this module: the allocator replaces the host `malloc`, so nothing on the
//! logging path may allocate - no `String`, no `std::io` buffered streams,
//! no `CString`. A buffered writer that allocated would re-enter the
//! allocator from inside the allocator and recurse until the stack dies.
//!
//! Instead, records are formatted through `core::fmt::Write` into a fixed
//! 256-byte stack buffer and handed to the kernel with a raw `write(2)` on
//! a plain file descriptor. Lines longer than the buffer are silently
//! truncated to 254 bytes plus the trailing newline.
//!
//! The descriptor is process-wide and atomically swapped by open/close, so
//! a disabled log (`fd == -1`) makes every log call a cheap no-op.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicI32, Ordering};

/// Log file descriptor. `-1` means logging is disabled.
static LOG_FD: AtomicI32 = AtomicI32::new(-1);

/// Capacity of the line buffer, including the trailing newline.
const LINE_CAPACITY: usize = 256;

/// Longest record content; one byte is reserved for the newline and one
/// mirrors the historical NUL reservation of the wire format.
const LINE_MAX: usize = LINE_CAPACITY - 2;

/// Longest accepted log-file path. Paths are NUL-terminated into a stack
/// buffer because building a `CString` would allocate.
const PATH_CAPACITY: usize = 512;

/// Opens (or re-opens) the event log.
///
/// Any previously open log is closed first, so descriptors never leak.
/// The file is created if missing and truncated if present. `None`
/// disables logging. A path that does not fit the internal buffer, or
/// that the OS refuses to open, leaves logging disabled.
pub fn init_memory_log(path: Option<&str>) {
  close_memory_log();

  let Some(path) = path else {
    return;
  };

  let mut c_path = [0u8; PATH_CAPACITY];
  if path.len() >= c_path.len() {
    stderr_line(format_args!("mapalloc: log path too long, logging disabled"));
    return;
  }
  c_path[..path.len()].copy_from_slice(path.as_bytes());

  // SAFETY: c_path is NUL-terminated and outlives the call.
  let fd = unsafe {
    libc::open(
      c_path.as_ptr() as *const libc::c_char,
      libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
      0o644 as libc::c_int,
    )
  };

  if fd != -1 {
    LOG_FD.store(fd, Ordering::Release);
  }
}

/// Closes the event log descriptor if one is open.
pub fn close_memory_log() {
  let fd = LOG_FD.swap(-1, Ordering::AcqRel);
  if fd != -1 {
    // SAFETY: fd came from our own successful open and was swapped out,
    // so no other close can race on it.
    unsafe {
      libc::close(fd);
    }
  }
}

/// Fixed-size line assembler. Overflowing writes truncate instead of
/// failing, so a long record degrades to a shorter record, never an error.
struct LineBuffer {
  bytes: [u8; LINE_CAPACITY],
  len: usize,
}

impl LineBuffer {
  const fn new() -> Self {
    Self { bytes: [0; LINE_CAPACITY], len: 0 }
  }

  /// Appends the newline and writes the whole line to `fd`.
  fn flush(&mut self, fd: i32) {
    self.bytes[self.len] = b'\n';
    // SAFETY: len < LINE_CAPACITY is maintained by write_str, so the
    // newline index and the write length stay in bounds.
    unsafe {
      libc::write(fd, self.bytes.as_ptr() as *const libc::c_void, self.len + 1);
    }
  }
}

impl Write for LineBuffer {
  fn write_str(&mut self, s: &str) -> fmt::Result {
    let room = LINE_MAX - self.len;
    let take = s.len().min(room);
    self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
    self.len += take;
    Ok(())
  }
}

/// Formats one record into a stack buffer and writes it to the log fd.
/// No-op when logging is disabled. Never allocates.
pub(crate) fn log_fmt(args: fmt::Arguments<'_>) {
  let fd = LOG_FD.load(Ordering::Acquire);
  if fd == -1 {
    return;
  }

  let mut line = LineBuffer::new();
  let _ = line.write_fmt(args);
  line.flush(fd);
}

/// Writes one formatted line straight to the standard error stream with a
/// raw `write(2)`. Used for diagnostics that must work from inside the
/// allocator, where `eprintln!` (which may allocate) is off-limits.
pub(crate) fn stderr_line(args: fmt::Arguments<'_>) {
  let mut line = LineBuffer::new();
  let _ = line.write_fmt(args);
  line.flush(2);
}

/// Records one allocator event. Accepts `format!`-style arguments;
/// expands to a single non-allocating [`log_fmt`] call.
macro_rules! log_event {
  ($($arg:tt)*) => {
    $crate::log::log_fmt(core::format_args!($($arg)*))
  };
}

pub(crate) use log_event;

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  // The log descriptor is process-global, so the open/write/close phases
  // live in one test rather than racing across the parallel test harness.
  #[test]
  fn log_lifecycle_writes_truncates_and_disables() {
    let path = std::env::temp_dir().join(format!("mapalloc_log_{}", std::process::id()));
    let path_str = path.to_str().unwrap();

    // Disabled log: must be a silent no-op.
    log_event!("orphan record {}", 1);

    init_memory_log(Some(path_str));
    log_event!("malloc: requested {}, allocated {} at {:p}", 10usize, 16usize, &0u8);

    // A record longer than the buffer must come out truncated, newline
    // intact, instead of overflowing.
    let long = "x".repeat(LINE_CAPACITY * 2);
    log_event!("{}", long);

    close_memory_log();

    // Closed log: writes go nowhere.
    log_event!("after close");

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("malloc: requested 10, allocated 16"));
    assert!(!contents.contains("after close"));
    assert!(!contents.contains("orphan record"));

    for line in contents.lines() {
      assert!(line.len() <= LINE_MAX);
    }
    assert!(contents.lines().any(|line| line.len() == LINE_MAX));

    let _ = fs::remove_file(&path);
  }
}
