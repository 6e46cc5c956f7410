//! Named terminal-multiplexer session handles.
//!
//! Agent processes live inside named tmux sessions so operators can attach
//! to them. The control plane only needs three verbs per session: does it
//! exist, send it keys, kill it. Spawning is detached; the daemon's
//! supervision loop polls existence to drive its state machine.

use std::path::Path;
use std::time::Duration;

use crate::subprocess::{run_tool, ToolError, TOOL_CHECK_TIMEOUT};

/// Bound on individual multiplexer commands.
const SESSION_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervision state of one agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet observed.
    Unknown,
    /// Session exists.
    Running,
    /// Session disappeared without being stopped.
    Crashed,
    /// Circuit open; not restarting.
    Backoff,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Running => write!(f, "running"),
            Self::Crashed => write!(f, "crashed"),
            Self::Backoff => write!(f, "backoff"),
        }
    }
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The multiplexer binary is missing or misbehaving.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A session command exited non-zero.
    #[error("tmux {action} for session {session:?} failed: {stderr}")]
    CommandFailed {
        /// Which verb failed.
        action: &'static str,
        /// Target session name.
        session: String,
        /// Trimmed stderr from the multiplexer.
        stderr: String,
    },
}

/// Drives named sessions through the `tmux` binary.
#[derive(Debug, Clone)]
pub struct SessionHost {
    bin: String,
}

impl Default for SessionHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHost {
    /// Host using `tmux` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bin: "tmux".to_string(),
        }
    }

    /// Host using a specific binary. Test seam.
    #[must_use]
    pub fn with_binary(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Multiplexer version string, for tooling detection. Bounded by the
    /// standard ten-second check timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the binary is missing or the check
    /// fails.
    pub fn version(&self) -> Result<String, SessionError> {
        let out = run_tool(&self.bin, &["-V"], TOOL_CHECK_TIMEOUT)?;
        if !out.success() {
            return Err(SessionError::CommandFailed {
                action: "version",
                session: String::new(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Whether a session with this name exists. A missing multiplexer
    /// server counts as "no".
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] only when the binary cannot be run at all.
    pub fn exists(&self, name: &str) -> Result<bool, SessionError> {
        let out = run_tool(&self.bin, &["has-session", "-t", name], SESSION_OP_TIMEOUT)?;
        Ok(out.success())
    }

    /// Start a detached session running `command`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the spawn fails.
    pub fn spawn(&self, name: &str, command: &str, cwd: Option<&Path>) -> Result<(), SessionError> {
        let cwd_str = cwd.map(|p| p.display().to_string());
        let mut args = vec!["new-session", "-d", "-s", name];
        if let Some(cwd) = cwd_str.as_deref() {
            args.push("-c");
            args.push(cwd);
        }
        args.push(command);

        let out = run_tool(&self.bin, &args, SESSION_OP_TIMEOUT)?;
        if !out.success() {
            return Err(SessionError::CommandFailed {
                action: "new-session",
                session: name.to_string(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Send literal keys to a session, followed by Enter.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the send fails.
    pub fn send_keys(&self, name: &str, keys: &str) -> Result<(), SessionError> {
        let out = run_tool(
            &self.bin,
            &["send-keys", "-t", name, keys, "Enter"],
            SESSION_OP_TIMEOUT,
        )?;
        if !out.success() {
            return Err(SessionError::CommandFailed {
                action: "send-keys",
                session: name.to_string(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Kill a session. Killing a session that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the binary cannot be run.
    pub fn kill(&self, name: &str) -> Result<(), SessionError> {
        let _ = run_tool(&self.bin, &["kill-session", "-t", name], SESSION_OP_TIMEOUT)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_maps_exit_codes() {
        assert!(SessionHost::with_binary("true").exists("any").unwrap());
        assert!(!SessionHost::with_binary("false").exists("any").unwrap());
    }

    #[test]
    fn missing_binary_is_a_tool_error() {
        let host = SessionHost::with_binary("definitely-not-tmux-xyz");
        assert!(matches!(
            host.exists("any"),
            Err(SessionError::Tool(ToolError::NotFound(_)))
        ));
    }

    #[test]
    fn version_trims_output() {
        let host = SessionHost::with_binary("echo");
        assert_eq!(host.version().unwrap(), "-V");
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Running.to_string(), "running");
        assert_eq!(SessionState::Backoff.to_string(), "backoff");
    }
}
