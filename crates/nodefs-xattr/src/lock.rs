//! Advisory `flock(2)` locks scoped to one node record.
//!
//! Locks are taken on a dedicated `<node>.mlock` file so that replacing the
//! record file itself (temp file + rename) never drops a held lock.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::{Result, XattrError};

/// Default number of non-blocking attempts
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default delay before the second attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers that need a consistent full record
    Shared,
    /// Writers
    Exclusive,
}

impl LockMode {
    fn nonblocking(self) -> FlockArg {
        match self {
            LockMode::Shared => FlockArg::LockSharedNonblock,
            LockMode::Exclusive => FlockArg::LockExclusiveNonblock,
        }
    }

    fn blocking(self) -> FlockArg {
        match self {
            LockMode::Shared => FlockArg::LockShared,
            LockMode::Exclusive => FlockArg::LockExclusive,
        }
    }
}

/// Retry policy for lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Non-blocking attempts before the final blocking attempt
    pub max_retries: u32,
    /// Backoff before the second attempt, doubled afterwards
    pub initial_delay: Duration,
}

impl LockOptions {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
        }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

/// A held advisory lock. Released on drop.
pub struct NodeLock {
    _flock: Flock<File>,
    path: PathBuf,
    mode: LockMode,
}

impl NodeLock {
    /// Lock `lockfile`, creating it and its parent directory when missing.
    pub fn acquire(lockfile: &Path, mode: LockMode, options: &LockOptions) -> Result<Self> {
        if let Some(parent) = lockfile.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lockfile)?;

        let flock = lock_with_retry(file, mode, options, lockfile)?;
        Ok(Self {
            _flock: flock,
            path: lockfile.to_path_buf(),
            mode,
        })
    }

    /// Lock file this lock was taken on
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Fail unless this lock was taken on `lockfile`
    pub fn ensure_covers(&self, lockfile: &Path) -> Result<()> {
        if self.path != lockfile {
            return Err(XattrError::LockMismatch {
                expected: lockfile.to_path_buf(),
                actual: self.path.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLock")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Acquire flock with retry and exponential backoff.
///
/// Uses non-blocking attempts first so that a briefly contended record does
/// not park the thread, then blocks on the last attempt.
fn lock_with_retry(
    mut file: File,
    mode: LockMode,
    options: &LockOptions,
    path: &Path,
) -> Result<Flock<File>> {
    let mut delay = options.initial_delay;

    for attempt in 0..options.max_retries {
        match Flock::lock(file, mode.nonblocking()) {
            Ok(guard) => return Ok(guard),
            Err((returned, Errno::EWOULDBLOCK)) => {
                debug!(path = %path.display(), attempt, "Lock busy, backing off");
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2);
                file = returned;
            }
            Err((_, err)) => return Err(XattrError::Io(err.into())),
        }
    }

    Flock::lock(file, mode.blocking()).map_err(|(_, err)| {
        debug!(path = %path.display(), error = %err, "Blocking lock attempt failed");
        XattrError::LockTimeout {
            path: path.to_path_buf(),
            retries: options.max_retries,
        }
    })
}
