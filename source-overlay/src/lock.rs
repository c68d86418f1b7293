//! Cross-process mutual exclusion for overlay rebuilds.
//!
//! Processes coordinate through an OS advisory lock on a fixed file inside
//! the overlay root. The lock is held by a [`LockGuard`] and released when
//! the guard is dropped, so every exit path out of the critical section
//! (return, `?`, panic unwinding) lets contenders proceed. If the process
//! dies the kernel drops the lock with the file descriptor.
//!
//! The lock is taken with `flock(2)`, so it only excludes other participants
//! that also use `flock` on the same file. A POSIX `lockf`/`fcntl` lock on
//! `.pyre.lock` does not conflict with it on Linux.
//!
//! # Degraded mode
//!
//! When the directory that should contain the lock file does not exist,
//! acquisition succeeds with an *unlocked* guard and the caller proceeds
//! without protection. This mirrors the overlay root being removed from
//! under us and is logged, not raised.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// How to behave when the lock is already held elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Wait until the lock becomes available. There is no timeout.
    Blocking,
    /// Fail with [`LockError::Contended`] instead of waiting.
    NonBlocking,
}

/// Errors that can occur while acquiring the lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder owns the lock and [`LockMode::NonBlocking`] was requested.
    #[error("lock {} is held by another process", path.display())]
    Contended { path: PathBuf },

    /// The lock file could not be opened or locked.
    #[error("failed to lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scoped ownership of the advisory lock.
///
/// Holds `None` when acquisition degraded to a no-op.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    fn unlocked(path: PathBuf) -> Self {
        Self { file: None, path }
    }

    /// Whether this guard actually holds the OS lock.
    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                // Closing the descriptor below releases it anyway.
                tracing::debug!(path = %self.path.display(), error = %e, "Explicit unlock failed");
            }
            tracing::trace!(path = %self.path.display(), "Released lock");
        }
    }
}

/// Acquire an exclusive advisory lock on `path`.
///
/// The lock file is created if needed; its content is never read or written.
///
/// # Errors
///
/// - [`LockError::Contended`] if `mode` is [`LockMode::NonBlocking`] and the
///   lock is held elsewhere
/// - [`LockError::Io`] for any other open or lock failure
///
/// A missing parent directory is *not* an error: see the module docs.
pub fn acquire_lock(path: &Path, mode: LockMode) -> Result<LockGuard, LockError> {
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "Lock directory does not exist, proceeding without lock"
            );
            return Ok(LockGuard::unlocked(path.to_path_buf()));
        }
        Err(e) => {
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let locked = match mode {
        LockMode::Blocking => file.lock_exclusive(),
        LockMode::NonBlocking => file.try_lock_exclusive(),
    };

    match locked {
        Ok(()) => {
            tracing::trace!(path = %path.display(), ?mode, "Acquired lock");
            Ok(LockGuard {
                file: Some(file),
                path: path.to_path_buf(),
            })
        }
        Err(e) if is_contended(&e) => Err(LockError::Contended {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(LockError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".pyre.lock");

        let guard = acquire_lock(&path, LockMode::Blocking).unwrap();

        assert!(guard.is_locked());
        assert!(path.exists());
        assert_eq!(guard.path(), path);
    }

    #[test]
    fn test_non_blocking_fails_when_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".pyre.lock");

        let _held = acquire_lock(&path, LockMode::Blocking).unwrap();
        let result = acquire_lock(&path, LockMode::NonBlocking);

        assert!(matches!(result, Err(LockError::Contended { .. })));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".pyre.lock");

        {
            let _held = acquire_lock(&path, LockMode::Blocking).unwrap();
        }

        let again = acquire_lock(&path, LockMode::NonBlocking).unwrap();
        assert!(again.is_locked());
    }

    #[test]
    fn test_lock_released_on_error_path() {
        fn fails_while_locked(path: &Path) -> Result<(), String> {
            let _guard = acquire_lock(path, LockMode::Blocking).map_err(|e| e.to_string())?;
            Err("boom".to_string())
        }

        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".pyre.lock");

        assert!(fails_while_locked(&path).is_err());
        assert!(acquire_lock(&path, LockMode::NonBlocking).is_ok());
    }

    #[test]
    fn test_missing_directory_degrades_to_unlocked() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("does-not-exist").join(".pyre.lock");

        let guard = acquire_lock(&path, LockMode::Blocking).unwrap();

        assert!(!guard.is_locked());
        assert!(!path.exists());
    }

    #[test]
    fn test_blocking_waits_for_holder() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".pyre.lock");
        let held = acquire_lock(&path, LockMode::Blocking).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            let guard = acquire_lock(&waiter_path, LockMode::Blocking).unwrap();
            tx.send(guard.is_locked()).unwrap();
        });

        // Still blocked while we hold the lock.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(held);
        assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
        waiter.join().unwrap();
    }
}
