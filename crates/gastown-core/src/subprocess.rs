//! Bounded subprocess execution for companion tools.
//!
//! The control plane shells out to a small set of external tools (the
//! terminal multiplexer, the `bd` issue CLI). Every invocation is bounded
//! by a timeout so a wedged tool cannot stall a patrol tick.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Default bound for tooling detection (version checks and the like).
pub const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured output of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
}

impl ToolOutput {
    /// Whether the tool exited zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from running a companion tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The binary was not found on `PATH`.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool did not finish within the allotted time.
    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Timeout applied, in seconds.
        timeout_secs: u64,
    },

    /// Any other spawn or wait failure.
    #[error("running {tool}: {source}")]
    Io {
        /// Tool name.
        tool: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Run `program` with `args`, capturing output, killing the process if it
/// exceeds `timeout`.
///
/// # Errors
///
/// Returns [`ToolError::NotFound`] when the binary is missing,
/// [`ToolError::Timeout`] when the bound expires, and [`ToolError::Io`] on
/// other spawn or wait failures. A non-zero exit is not an error; check
/// [`ToolOutput::success`].
pub fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput, ToolError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(program.to_string())
            } else {
                ToolError::Io {
                    tool: program.to_string(),
                    source: e,
                }
            }
        })?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = read_pipe(child.stdout.take());
                let stderr = read_pipe(child.stderr.take());
                return Ok(ToolOutput {
                    stdout,
                    stderr,
                    exit_code: status.code().unwrap_or(-1),
                });
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout {
                        tool: program.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(ToolError::Io {
                    tool: program.to_string(),
                    source: e,
                })
            }
        }
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
