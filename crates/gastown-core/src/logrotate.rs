//! Copy-truncate rotation for log files held open by child processes.
//!
//! The Dolt server children write their logs through file descriptors the
//! daemon does not own, so rotation must never close, move, or recreate the
//! file. Rotation compresses the current content off to the side and then
//! truncates the original in place; any open descriptor remains valid and
//! appends continue from offset zero.
//!
//! The daemon's own log is not handled here. The daemon controls that
//! writer, so it rotates by rename instead.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::paths;

/// Size threshold before automatic rotation triggers (100 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated backups to keep per file.
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Daemon-level log files that need copy-truncate rotation.
const DAEMON_CHILD_LOGS: [&str; 3] = ["dolt.log", "dolt-server.log", "dolt-test-server.log"];

/// Per-file rotation failure. Non-fatal: the run continues with the next
/// file and reports the collection at the end.
#[derive(Debug, thiserror::Error)]
#[error("rotating {}: {source}", path.display())]
pub struct RotationError {
    /// The log file the failure belongs to.
    pub path: PathBuf,
    /// Underlying I/O failure.
    #[source]
    pub source: io::Error,
}

/// Outcome of a rotation run: three disjoint sets of files.
#[derive(Debug, Default)]
pub struct RotationResult {
    /// Files that were rotated.
    pub rotated: Vec<PathBuf>,
    /// Files below the threshold (or empty, for forced runs).
    pub skipped: Vec<PathBuf>,
    /// Per-file non-fatal errors.
    pub errors: Vec<RotationError>,
}

/// Rotates managed child-process logs under a town root.
#[derive(Debug, Clone, Copy)]
pub struct LogRotator {
    max_size: u64,
    max_backups: usize,
}

impl Default for LogRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRotator {
    /// Rotator with the default threshold (100 MiB) and backup count (3).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    /// Override the size threshold.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Override the backup count.
    #[must_use]
    pub const fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Rotate every managed log at or above the size threshold; skip the
    /// rest. Missing files are ignored.
    #[must_use]
    pub fn rotate(&self, town_root: &Path) -> RotationResult {
        self.run(town_root, |size| size >= self.max_size)
    }

    /// Rotate every managed log with any content, regardless of threshold.
    /// Zero-byte files are skipped: there is nothing to compress.
    #[must_use]
    pub fn force_rotate(&self, town_root: &Path) -> RotationResult {
        self.run(town_root, |size| size > 0)
    }

    fn run(&self, town_root: &Path, should_rotate: impl Fn(u64) -> bool) -> RotationResult {
        let mut result = RotationResult::default();

        for log_path in collect_child_logs(town_root) {
            let info = match fs::metadata(&log_path) {
                Ok(info) => info,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    result.errors.push(RotationError {
                        path: log_path,
                        source: e,
                    });
                    continue;
                }
            };

            if !should_rotate(info.len()) {
                result.skipped.push(log_path);
                continue;
            }

            match self.rotate_file(&log_path) {
                Ok(()) => result.rotated.push(log_path),
                Err(source) => result.errors.push(RotationError {
                    path: log_path,
                    source,
                }),
            }
        }

        result
    }

    /// Copy-truncate rotation of a single file:
    ///
    /// 1. shift existing backups (`.1.gz` becomes `.2.gz`, the oldest is
    ///    deleted),
    /// 2. compress the current content to `.1.gz`,
    /// 3. truncate the original to zero bytes in place,
    /// 4. prune any stragglers beyond the backup count.
    pub fn rotate_file(&self, log_path: &Path) -> io::Result<()> {
        for i in (1..=self.max_backups).rev() {
            let old = backup_path(log_path, i);
            if i == self.max_backups {
                let _ = fs::remove_file(&old);
            } else {
                let _ = fs::rename(&old, backup_path(log_path, i + 1));
            }
        }

        let dst = backup_path(log_path, 1);
        compress_file(log_path, &dst)?;

        // Truncating through the path keeps the child's fd valid. Never
        // remove or recreate the file here.
        let file = fs::OpenOptions::new().write(true).open(log_path)?;
        file.set_len(0)?;

        self.prune_old_backups(log_path);

        Ok(())
    }

    /// Remove backups beyond the configured count, oldest (by mtime) first.
    fn prune_old_backups(&self, log_path: &Path) {
        let Some(dir) = log_path.parent() else {
            return;
        };
        let Some(base) = log_path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let prefix = format!("{base}.");

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot scan for old log backups");
                return;
            }
        };

        let mut backups: Vec<(PathBuf, std::time::SystemTime)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if !name.starts_with(&prefix) || !name.ends_with(".gz") {
                    return None;
                }
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((entry.path(), mtime))
            })
            .collect();

        if backups.len() <= self.max_backups {
            return;
        }

        backups.sort_by_key(|(_, mtime)| *mtime);
        for (path, _) in backups.iter().take(backups.len() - self.max_backups) {
            let _ = fs::remove_file(path);
        }
    }
}

/// All Dolt-related log files under the town root that need copy-truncate
/// rotation: the daemon-level server logs plus the per-rig
/// `.beads/dolt-server.log` files. Only existing regular files count.
#[must_use]
pub fn collect_child_logs(town_root: &Path) -> Vec<PathBuf> {
    let mut logs = Vec::new();
    let daemon_dir = paths::daemon_dir(town_root);

    for name in DAEMON_CHILD_LOGS {
        let path = daemon_dir.join(name);
        if path.is_file() {
            logs.push(path);
        }
    }

    let Ok(entries) = fs::read_dir(town_root) else {
        return logs;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') || name == "daemon" {
            continue;
        }
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        for rel in [
            &[".beads", "dolt-server.log"][..],
            &["rig", ".beads", "dolt-server.log"][..],
        ] {
            let mut path = entry.path();
            path.extend(rel);
            if path.is_file() {
                logs.push(path);
            }
        }
    }

    logs
}

fn backup_path(log_path: &Path, index: usize) -> PathBuf {
    let mut name = log_path.as_os_str().to_os_string();
    name.push(format!(".{index}.gz"));
    PathBuf::from(name)
}

fn compress_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let output = File::create(dst)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn town_with_log(content: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let town = tempfile::tempdir().unwrap();
        let daemon_dir = town.path().join("daemon");
        fs::create_dir_all(&daemon_dir).unwrap();
        let log = daemon_dir.join("dolt.log");
        fs::write(&log, content).unwrap();
        (town, log)
    }

    #[test]
    fn copy_truncate_leaves_empty_original_and_backup() {
        let (_town, log) = town_with_log(b"line 1\nline 2\nline 3\n");

        LogRotator::new().rotate_file(&log).unwrap();

        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert!(backup_path(&log, 1).is_file());
    }

    #[test]
    fn repeated_rotation_shifts_and_caps_backups() {
        let (_town, log) = town_with_log(b"");
        let rotator = LogRotator::new();

        for _ in 0..4 {
            fs::write(&log, b"data\n").unwrap();
            rotator.rotate_file(&log).unwrap();
        }

        for i in 1..=DEFAULT_MAX_BACKUPS {
            assert!(backup_path(&log, i).is_file(), "expected .{i}.gz");
        }
        assert!(!backup_path(&log, 4).exists(), ".4.gz exceeds the cap");
    }

    #[test]
    fn rotate_skips_below_threshold() {
        let (town, _log) = town_with_log(&[b'x'; 20]);
        let rotator = LogRotator::new();

        let result = rotator.rotate(town.path());
        assert!(result.rotated.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn rotate_honors_lowered_threshold() {
        let (town, log) = town_with_log(&[b'x'; 20]);
        let rotator = LogRotator::new().with_max_size(10);

        let result = rotator.rotate(town.path());
        assert_eq!(result.rotated.len(), 1);
        assert!(result.skipped.is_empty());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert!(backup_path(&log, 1).is_file());
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let rotator = LogRotator::new().with_max_size(16);

        let (town, _) = town_with_log(&[b'x'; 15]);
        let result = rotator.rotate(town.path());
        assert!(result.rotated.is_empty(), "threshold - 1 must skip");

        let (town, _) = town_with_log(&[b'x'; 16]);
        let result = rotator.rotate(town.path());
        assert_eq!(result.rotated.len(), 1, "exactly threshold must rotate");
    }

    #[test]
    fn force_rotate_rotates_tiny_but_skips_empty() {
        let (town, _) = town_with_log(b"x");
        let result = LogRotator::new().force_rotate(town.path());
        assert_eq!(result.rotated.len(), 1);

        let (town, _) = town_with_log(b"");
        let result = LogRotator::new().force_rotate(town.path());
        assert!(result.rotated.is_empty());
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn second_rotate_is_idempotent() {
        let (town, _) = town_with_log(&[b'x'; 64]);
        let rotator = LogRotator::new().with_max_size(32);

        let first = rotator.rotate(town.path());
        assert_eq!(first.rotated.len(), 1);

        let second = rotator.rotate(town.path());
        assert!(second.rotated.is_empty(), "everything is under threshold");
        assert_eq!(second.skipped.len(), 1);
    }

    #[test]
    fn open_append_descriptor_survives_rotation() {
        let (_town, log) = town_with_log(b"");
        let mut writer = fs::OpenOptions::new().append(true).open(&log).unwrap();
        writer.write_all(b"before rotation\n").unwrap();

        LogRotator::new().rotate_file(&log).unwrap();
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);

        writer.write_all(b"after\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(fs::read(&log).unwrap(), b"after\n");
    }

    #[test]
    fn collects_rig_level_logs() {
        let town = tempfile::tempdir().unwrap();
        fs::create_dir_all(town.path().join("daemon")).unwrap();
        fs::write(town.path().join("daemon/dolt-server.log"), b"x").unwrap();

        let rig_beads = town.path().join("refinery/.beads");
        fs::create_dir_all(&rig_beads).unwrap();
        fs::write(rig_beads.join("dolt-server.log"), b"x").unwrap();

        let nested = town.path().join("refinery/rig/.beads");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("dolt-server.log"), b"x").unwrap();

        let hidden = town.path().join(".git/.beads");
        fs::create_dir_all(&hidden).unwrap();
        fs::write(hidden.join("dolt-server.log"), b"x").unwrap();

        let logs = collect_child_logs(town.path());
        assert_eq!(logs.len(), 3, "hidden directories are excluded: {logs:?}");
    }
}
