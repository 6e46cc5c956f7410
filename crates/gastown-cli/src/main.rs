//! gt - operator CLI for the Gas Town control plane.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::daemon::DaemonCommand;
use commands::mail::MailCommand;

/// gt - Gas Town control plane.
#[derive(Parser, Debug)]
#[command(name = "gt")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Town root directory. Defaults to the enclosing town of the working
    /// directory.
    #[arg(long, global = true)]
    town_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the Gas Town daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
    /// Mailbox operations
    Mail {
        #[command(subcommand)]
        command: MailCommand,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let town_root = match commands::resolve_town_root(cli.town_root) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Daemon { command } => commands::daemon::execute(&town_root, command),
        Commands::Mail { command } => commands::mail::execute(&town_root, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
