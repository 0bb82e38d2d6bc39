use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use cagent_core::AgentError;

/// An advisory `flock(2)` exclusive lock on a run directory, held for the
/// lifetime of the guard. Prevents two processes (e.g. a stray resumed
/// run and a fresh run sharing a resume key) from writing checkpoints for
/// the same run concurrently.
pub struct RunLock {
    _file: File,
}

impl RunLock {
    /// Acquire a non-blocking exclusive lock on `lock_path`, creating the
    /// lock file if absent. Fails fast with `StorageDegraded` rather than
    /// blocking if another process already holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self, AgentError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path)
            .map_err(|e| AgentError::StorageDegraded(format!("failed to open lock file: {e}")))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(AgentError::StorageDegraded(format!(
                "checkpoint directory is locked by another process: {}",
                lock_path.display()
            )));
        }

        Ok(Self { _file: file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = unsafe { libc::flock(self._file.as_raw_fd(), libc::LOCK_UN) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        {
            let _lock = RunLock::acquire(&path).unwrap();
            assert!(RunLock::acquire(&path).is_err());
        }
        assert!(RunLock::acquire(&path).is_ok());
    }
}
