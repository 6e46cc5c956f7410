//! Rename-based rotation for the daemon's own log.
//!
//! Unlike the child logs (copy-truncate, because children hold open
//! descriptors), `daemon/daemon.log` is written only by this process, so
//! it rotates the ordinary way: rename aside, reopen fresh. The writer
//! plugs into `tracing-subscriber` as a `MakeWriter`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Size threshold before the daemon log rotates (10 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated daemon logs to keep (`daemon.log.1` is newest).
pub const DEFAULT_MAX_BACKUPS: usize = 3;

struct Inner {
    path: PathBuf,
    file: File,
    size: u64,
    max_size: u64,
    max_backups: usize,
}

impl Inner {
    fn rotate_if_needed(&mut self, incoming: usize) -> io::Result<()> {
        if self.size + incoming as u64 <= self.max_size {
            return Ok(());
        }

        self.file.flush()?;
        for i in (1..=self.max_backups).rev() {
            let old = backup_path(&self.path, i);
            if i == self.max_backups {
                let _ = std::fs::remove_file(&old);
            } else {
                let _ = std::fs::rename(&old, backup_path(&self.path, i + 1));
            }
        }
        std::fs::rename(&self.path, backup_path(&self.path, 1))?;

        self.file = open_log(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

fn backup_path(path: &std::path::Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn open_log(path: &std::path::Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Size-rotating log writer for the daemon's own log.
#[derive(Clone)]
pub struct RotatingLogWriter {
    inner: Arc<Mutex<Inner>>,
}

impl RotatingLogWriter {
    /// Open (or create) the log at `path` with the given rotation knobs.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be opened.
    pub fn open(path: PathBuf, max_size: u64, max_backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = open_log(&path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path,
                file,
                size,
                max_size,
                max_backups,
            })),
        })
    }
}

/// Handle implementing `Write`; one is minted per log event.
pub struct RotatingLogHandle {
    inner: Arc<Mutex<Inner>>,
}

impl Write for RotatingLogHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rotate_if_needed(buf.len())?;
        let written = inner.file.write(buf)?;
        inner.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingLogWriter {
    type Writer = RotatingLogHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingLogHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_append_and_track_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.log");
        let writer = RotatingLogWriter::open(path.clone(), 1024, 3).unwrap();

        let mut handle = writer.make_writer();
        handle.write_all(b"hello\n").unwrap();
        handle.flush().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello\n");
    }

    #[test]
    fn rotates_by_rename_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.log");
        let writer = RotatingLogWriter::open(path.clone(), 32, 3).unwrap();

        let mut handle = writer.make_writer();
        for _ in 0..8 {
            handle.write_all(b"0123456789\n").unwrap();
        }
        handle.flush().unwrap();

        assert!(backup_path(&path, 1).is_file(), "rotated file exists");
        assert!(
            std::fs::metadata(&path).unwrap().len() <= 32,
            "live log stays under threshold"
        );
    }

    #[test]
    fn backups_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.log");
        let writer = RotatingLogWriter::open(path.clone(), 8, 2).unwrap();

        let mut handle = writer.make_writer();
        for _ in 0..20 {
            handle.write_all(b"0123456789\n").unwrap();
        }

        assert!(backup_path(&path, 1).exists());
        assert!(backup_path(&path, 2).exists());
        assert!(!backup_path(&path, 3).exists());
    }

    #[test]
    fn reopens_existing_log_at_current_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.log");
        std::fs::write(&path, b"already here\n").unwrap();

        let writer = RotatingLogWriter::open(path.clone(), 1024, 3).unwrap();
        let mut handle = writer.make_writer();
        handle.write_all(b"more\n").unwrap();
        handle.flush().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"already here\nmore\n");
    }
}
