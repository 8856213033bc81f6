//! Advisory whole-file locks backing the single-writer contract.
//!
//! `flock` locks follow the open file description, so they vanish with
//! the handle on every exit path. Locking is Unix-only; elsewhere the
//! functions report success and writers run unguarded.

use std::fs::File;
use std::io;

/// Try to take an exclusive lock without blocking. `Ok(false)` means
/// another handle holds it.
#[cfg(unix)]
pub(crate) fn try_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
pub(crate) fn release(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
pub(crate) fn try_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
pub(crate) fn release(_file: &File) {}
