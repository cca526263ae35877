/// Advisory file locking for disk images shared between slots
///
/// Slots coordinate access to disk images exclusively through `flock`:
/// the root filesystem and any plugin disk declaring the shared suffix are
/// locked shared, everything else exclusive. Locks are acquired blocking
/// before the VM process is spawned and held until the run completes.
use crate::types::{Result, SandboxError};
use crate::vm::disk::LockMode;
use log::debug;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// flock operation constants
const LOCK_SH: i32 = 1;
const LOCK_EX: i32 = 2;

extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

/// RAII guard for one locked disk image. The lock is released when the
/// guard is dropped and the descriptor closes.
#[derive(Debug)]
pub struct DiskLock {
    path: PathBuf,
    _file: File,
}

impl DiskLock {
    /// Acquire an advisory lock on `path`, blocking until it is granted.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(mode == LockMode::Exclusive)
            .open(path)
            .map_err(|e| {
                SandboxError::Lock(format!("Cannot open disk image {}: {}", path.display(), e))
            })?;

        let operation = match mode {
            LockMode::Shared => LOCK_SH,
            LockMode::Exclusive => LOCK_EX,
        };

        let ret = unsafe { flock(file.as_raw_fd(), operation) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            return Err(SandboxError::Lock(format!(
                "flock failed for {}: {}",
                path.display(),
                err
            )));
        }

        debug!("Locked {} ({:?})", path.display(), mode);

        Ok(DiskLock {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Acquire the whole lock set for a run, in the given order.
pub fn acquire_all(locks: &[(PathBuf, LockMode)]) -> Result<Vec<DiskLock>> {
    let mut held = Vec::with_capacity(locks.len());
    for (path, mode) in locks {
        held.push(DiskLock::acquire(path, *mode)?);
    }
    Ok(held)
}
