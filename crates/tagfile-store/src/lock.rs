//! Advisory locking for tag index files.
//!
//! The lock is taken with `flock(2)` on the index file itself and blocks
//! until granted; there is no timeout. It is released when the guard drops.
//! Other platforms get a no-op guard, which matches running with
//! `file_locking` disabled.

use std::fs::File;
use std::io;

/// Exclusive advisory lock held on an open file.
#[derive(Debug)]
pub struct FileLock<'a> {
    #[allow(dead_code)]
    file: &'a File,
}

impl<'a> FileLock<'a> {
    /// Block until an exclusive lock on `file` is held.
    #[cfg(unix)]
    pub fn exclusive(file: &'a File) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        loop {
            let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if result == 0 {
                return Ok(Self { file });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(unix))]
    pub fn exclusive(file: &'a File) -> io::Result<Self> {
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}
