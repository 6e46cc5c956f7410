//! gastown-daemon - Gas Town supervisor daemon.
//!
//! Run by `gt daemon start` as a detached background child (the CLI
//! detaches it; there is no double-fork, so the PID the CLI spawned is the
//! PID that lands in the lock file). A second daemon that loses the
//! singleton race exits quietly with success.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gastown_core::paths;
use gastown_daemon::daemon::{Daemon, Launch};
use gastown_daemon::logwriter::{RotatingLogWriter, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_SIZE};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Gas Town supervisor daemon.
#[derive(Parser, Debug)]
#[command(name = "gastown-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Town root directory. Defaults to the enclosing town of the working
    /// directory.
    #[arg(long)]
    town_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to stderr instead of daemon/daemon.log (debugging).
    #[arg(long)]
    stderr: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let town_root = match args.town_root {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            paths::find_town_root(&cwd)
                .ok_or_else(|| anyhow::anyhow!("not inside a Gas Town workspace"))?
        }
    };

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if args.stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        let writer = RotatingLogWriter::open(
            paths::daemon_log(&town_root),
            DEFAULT_MAX_SIZE,
            DEFAULT_MAX_BACKUPS,
        )
        .context("opening daemon log")?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    }

    let runtime = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    runtime.block_on(async move {
        match Daemon::launch(&town_root)? {
            Launch::AlreadyRunning => {
                info!("daemon already running for this town root, exiting");
                Ok(())
            }
            Launch::Running(daemon) => daemon.run().await,
        }
    })
}
