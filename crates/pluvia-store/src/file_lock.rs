//! Advisory file locking for cross-process store mutations.
//!
//! The oracle and the operator CLI run as separate processes against the same
//! data directory. Every read-validate-write section of the file store holds
//! an exclusive lock on `<data_dir>/.lock` for its duration.
//!
//! The lock is released when [`FileLock`] is dropped.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Exclusive lock on a store directory.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock on `dir` is acquired.
    pub fn acquire(dir: &Path) -> IoResult<Self> {
        let (file, path) = Self::open(dir)?;
        Self::lock(&file, true)?;
        Ok(Self { _file: file, path })
    }

    /// Acquire the lock without waiting.
    ///
    /// # Errors
    /// - `ErrorKind::WouldBlock` if another holder has the lock
    pub fn try_acquire(dir: &Path) -> IoResult<Self> {
        let (file, path) = Self::open(dir)?;
        Self::lock(&file, false)?;
        Ok(Self { _file: file, path })
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(dir: &Path) -> IoResult<(File, PathBuf)> {
        let lock_path = dir.join(".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        Ok((file, lock_path))
    }

    #[cfg(unix)]
    fn lock(file: &File, blocking: bool) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        let mut operation = libc::LOCK_EX;
        if !blocking {
            operation |= libc::LOCK_NB;
        }

        loop {
            let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if result == 0 {
                return Ok(());
            }

            let errno = IoError::last_os_error();
            match errno.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EWOULDBLOCK) => {
                    return Err(IoError::new(
                        ErrorKind::WouldBlock,
                        "policy store is locked by another process",
                    ))
                }
                _ => return Err(errno),
            }
        }
    }

    // Only the in-process lock applies here.
    #[cfg(not(unix))]
    fn lock(_file: &File, _blocking: bool) -> IoResult<()> {
        tracing::debug!("cross-process store locking is unavailable on this platform");
        Ok(())
    }
}
