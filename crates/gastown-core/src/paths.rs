//! Filesystem layout under a town root.
//!
//! The town root is the single source of truth for one deployment. It holds
//! the `daemon/` runtime directory, the `mayor/` config directory, and one
//! subdirectory per rig.

use std::path::{Path, PathBuf};

/// Runtime directory for the daemon (PID file, state, logs).
#[must_use]
pub fn daemon_dir(town_root: &Path) -> PathBuf {
    town_root.join("daemon")
}

/// Single-writer lock file holding the daemon's PID.
#[must_use]
pub fn pid_file(town_root: &Path) -> PathBuf {
    daemon_dir(town_root).join("daemon.pid")
}

/// Heartbeat state written by the running daemon.
#[must_use]
pub fn state_file(town_root: &Path) -> PathBuf {
    daemon_dir(town_root).join("state.json")
}

/// The daemon's own log. Rotated by rename, never by copy-truncate, because
/// the daemon controls the writer.
#[must_use]
pub fn daemon_log(town_root: &Path) -> PathBuf {
    daemon_dir(town_root).join("daemon.log")
}

/// Persisted crash-loop state for supervised agents.
#[must_use]
pub fn restart_state_file(town_root: &Path) -> PathBuf {
    daemon_dir(town_root).join("restart-state.json")
}

/// Daemon configuration file.
#[must_use]
pub fn config_file(town_root: &Path) -> PathBuf {
    town_root.join("mayor").join("daemon.json")
}

/// Walk up from `start` looking for a town root (a directory containing
/// `mayor/`). Returns `None` when no ancestor qualifies.
#[must_use]
pub fn find_town_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join("mayor").is_dir() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let root = Path::new("/town");
        assert_eq!(pid_file(root), Path::new("/town/daemon/daemon.pid"));
        assert_eq!(state_file(root), Path::new("/town/daemon/state.json"));
        assert_eq!(config_file(root), Path::new("/town/mayor/daemon.json"));
    }

    #[test]
    fn find_town_root_climbs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("town");
        let nested = root.join("rig-a").join("deep");
        std::fs::create_dir_all(root.join("mayor")).unwrap();
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_town_root(&nested), Some(root.clone()));
        assert_eq!(find_town_root(&root), Some(root));
    }

    #[test]
    fn find_town_root_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_town_root(dir.path()), None);
    }
}
