//! On-disk heartbeat state (`daemon/state.json`).
//!
//! The heartbeat writer rewrites this file on a fixed cadence; `gt daemon
//! status` reads it to derive uptime and to warn when the installed binary
//! is newer than the running process. Writes are atomic (temp + rename) so
//! a reader never observes a torn file.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gastown_core::paths;
use serde::{Deserialize, Serialize};

/// Errors from reading or writing state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Filesystem failure.
    #[error("state file {}: {source}", path.display())]
    Io {
        /// State file path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The file exists but is not valid state JSON.
    #[error("corrupt state file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persisted daemon state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonState {
    /// PID of the writing daemon.
    #[serde(default)]
    pub pid: u32,

    /// When the daemon started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Last heartbeat write.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Heartbeats written since start.
    #[serde(default)]
    pub heartbeat_count: u64,
}

impl DaemonState {
    /// Fresh state for a daemon starting now.
    #[must_use]
    pub fn starting_now() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Some(Utc::now()),
            last_heartbeat: None,
            heartbeat_count: 0,
        }
    }

    /// Record one heartbeat.
    pub fn beat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
        self.heartbeat_count += 1;
    }

    /// Uptime relative to `now`, if the state records a start.
    #[must_use]
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at.map(|started| now - started)
    }

    /// Load from `daemon/state.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the file cannot be read or parsed. A
    /// missing file yields the default state.
    pub fn load(town_root: &Path) -> Result<Self, StateError> {
        let path = paths::state_file(town_root);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(StateError::Io { path, source }),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write atomically to `daemon/state.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the write fails. This is the one
    /// supervisor-level failure the daemon treats as terminal.
    pub fn save(&self, town_root: &Path) -> Result<(), StateError> {
        let path = paths::state_file(town_root);
        let io_err = |source| StateError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(paths::daemon_dir(town_root)).map_err(io_err)?;
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = DaemonState::starting_now();
        state.beat(Utc::now());
        state.beat(Utc::now());
        state.save(dir.path()).unwrap();

        let loaded = DaemonState::load(dir.path()).unwrap();
        assert_eq!(loaded.pid, std::process::id());
        assert_eq!(loaded.heartbeat_count, 2);
        assert!(loaded.last_heartbeat.is_some());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = DaemonState::load(dir.path()).unwrap();
        assert_eq!(state.pid, 0);
        assert!(state.started_at.is_none());
    }

    #[test]
    fn uptime_derives_from_start() {
        let mut state = DaemonState::default();
        assert!(state.uptime(Utc::now()).is_none());

        let started = Utc::now() - chrono::Duration::minutes(90);
        state.started_at = Some(started);
        let uptime = state.uptime(Utc::now()).unwrap();
        assert!(uptime >= chrono::Duration::minutes(90));
    }
}
