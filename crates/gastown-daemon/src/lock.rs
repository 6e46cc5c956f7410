//! PID-file singleton lock.
//!
//! At most one daemon runs per town root. The lock is `flock`-based: the
//! winner writes its PID and holds the descriptor for the process
//! lifetime; a loser exits quietly. Callers that spawned a daemon detect a
//! lost race by comparing the PID in the file against the child they
//! spawned. The file is removed on clean shutdown; a stale file from a
//! crash is harmless because liveness is always probed against the PID.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use gastown_core::paths;
use tracing::warn;

/// Errors from acquiring the lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another daemon holds the lock.
    #[error("daemon already running for this town root")]
    Held,

    /// The daemon directory or PID file is not writable.
    #[error("pid file {}: {source}", path.display())]
    Io {
        /// PID file path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Held PID-file lock. Dropping it removes the file.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Acquire the singleton lock for `town_root` and record our PID.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when another process has the lock, and
    /// [`LockError::Io`] when the daemon directory cannot be prepared.
    pub fn acquire(town_root: &Path) -> Result<Self, LockError> {
        let path = paths::pid_file(town_root);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(paths::daemon_dir(town_root)).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if !try_acquire_exclusive_nonblocking(&file).map_err(io_err)? {
            return Err(LockError::Held);
        }

        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        Ok(Self { file, path })
    }

    /// Path of the held PID file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        // Remove before the descriptor (and with it the flock) goes away.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "cannot remove pid file");
            }
        }
        let _ = self.file.flush();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn try_acquire_exclusive_nonblocking(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: `fd` comes from an open `File` that outlives this call, and
    // `LOCK_EX | LOCK_NB` is a valid flock operation.
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(not(unix))]
fn try_acquire_exclusive_nonblocking(_: &File) -> io::Result<bool> {
    Ok(true)
}

/// Read the PID recorded in the lock file, if any.
///
/// # Errors
///
/// Returns I/O errors other than the file being absent.
pub fn read_pid(town_root: &Path) -> io::Result<Option<i32>> {
    let path = paths::pid_file(town_root);
    let mut contents = String::new();
    match File::open(&path) {
        Ok(mut file) => {
            file.read_to_string(&mut contents)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }
    Ok(contents.trim().parse().ok())
}

/// Whether a daemon is running for this town root. Returns its PID when it
/// is. A recorded PID whose process is gone counts as not running.
///
/// # Errors
///
/// Returns I/O errors from reading the PID file.
pub fn is_running(town_root: &Path) -> io::Result<Option<i32>> {
    let Some(pid) = read_pid(town_root)? else {
        return Ok(None);
    };
    if pid <= 0 {
        return Ok(None);
    }
    Ok(process_alive(pid).then_some(pid))
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    // Signal 0 probes existence without delivering anything.
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_our_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock = PidLock::acquire(dir.path()).unwrap();
        assert_eq!(
            read_pid(dir.path()).unwrap(),
            Some(std::process::id() as i32)
        );
        drop(lock);
        assert_eq!(read_pid(dir.path()).unwrap(), None, "clean shutdown removes");
    }

    #[cfg(unix)]
    #[test]
    fn second_acquire_loses_the_race() {
        let dir = tempfile::tempdir().unwrap();
        let _held = PidLock::acquire(dir.path()).unwrap();
        // flock is per open file description, so a second open in the same
        // process contends exactly like a second process would.
        assert!(matches!(PidLock::acquire(dir.path()), Err(LockError::Held)));
    }

    #[test]
    fn running_probe_sees_our_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = PidLock::acquire(dir.path()).unwrap();
        assert_eq!(
            is_running(dir.path()).unwrap(),
            Some(std::process::id() as i32)
        );
    }

    #[test]
    fn stale_pid_counts_as_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(paths::daemon_dir(dir.path())).unwrap();
        // PIDs near i32::MAX are above any real pid_max.
        std::fs::write(paths::pid_file(dir.path()), "2147483646").unwrap();
        assert_eq!(is_running(dir.path()).unwrap(), None);
    }

    #[test]
    fn missing_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(is_running(dir.path()).unwrap(), None);
    }
}
