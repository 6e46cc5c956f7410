//! Mailbox commands.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Subcommand;
use gastown_core::config::DaemonConfig;
use gastown_core::db::{ConnOpener, DoltOpener};
use gastown_core::mail::drain::{self, DrainOptions};
use gastown_core::mail::DbMailbox;

const MAILBOX_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// `gt mail` subcommands.
#[derive(Subcommand, Debug)]
pub enum MailCommand {
    /// Bulk-archive stale protocol messages
    ///
    /// Drains messages matching common protocol patterns that accumulate
    /// in agent inboxes (especially witness): completion and startup
    /// notifications, lifecycle events, merge outcomes, swarm starts.
    /// Help requests (HELP:) and handoff context (HANDOFF) are always
    /// preserved. By default only messages older than 30 minutes drain.
    Drain {
        /// Target inbox identity (e.g. gastown/witness)
        #[arg(long, env = "GT_IDENTITY")]
        identity: String,

        /// Only drain messages older than this (e.g. 30m, 1h)
        #[arg(long, default_value = "30m")]
        max_age: String,

        /// Drain all protocol messages regardless of age
        #[arg(long)]
        all: bool,

        /// Show what would be drained without archiving
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Database holding the messages table
        #[arg(long, default_value = "hq")]
        database: String,

        /// Dolt server port (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Dispatch a mail subcommand.
pub fn execute(town_root: &Path, command: MailCommand) -> Result<()> {
    match command {
        MailCommand::Drain {
            identity,
            max_age,
            all,
            dry_run,
            database,
            port,
        } => run_drain(town_root, &identity, &max_age, all, dry_run, &database, port),
    }
}

fn run_drain(
    town_root: &Path,
    identity: &str,
    max_age: &str,
    drain_all: bool,
    dry_run: bool,
    database: &str,
    port: Option<u16>,
) -> Result<()> {
    let max_age = humantime::parse_duration(max_age)
        .with_context(|| format!("invalid --max-age {max_age:?}"))?;

    let port = match port {
        Some(port) => port,
        None => DaemonConfig::load(town_root)
            .unwrap_or_default()
            .dolt_port(),
    };

    let opener = DoltOpener::new(port);
    let mut conn = opener
        .open(database, MAILBOX_IO_TIMEOUT, MAILBOX_IO_TIMEOUT)
        .with_context(|| format!("connecting to database {database}"))?;
    let mut mailbox = DbMailbox::new(conn.as_mut(), identity);

    let opts = DrainOptions {
        max_age,
        drain_all,
        dry_run,
    };
    let report = drain::drain(&mut mailbox, &opts, Utc::now()).context("listing messages")?;

    if report.total == 0 {
        println!("✓ Inbox {identity} is empty, nothing to drain");
        return Ok(());
    }
    if report.candidates.is_empty() {
        println!(
            "✓ No drainable messages in {identity} ({} messages total)",
            report.total
        );
        return Ok(());
    }

    if dry_run {
        println!(
            "(dry-run) Would drain {}/{} messages from {identity}:",
            report.candidates.len(),
            report.total
        );
        let now = Utc::now();
        for candidate in &report.candidates {
            let age = now - candidate.message.timestamp;
            println!(
                "  {} {} [{}] (age: {}m)",
                candidate.message.id,
                candidate.message.subject,
                candidate.reason,
                age.num_minutes()
            );
        }
        return Ok(());
    }

    let remaining = report.total - report.archived;
    if !report.success() {
        println!(
            "⚠ Drained {}/{} messages from {identity} ({remaining} remaining, {} errors)",
            report.archived,
            report.candidates.len(),
            report.errors.len()
        );
        for (id, error) in &report.errors {
            println!("  Error: {id}: {error}");
        }
        bail!("failed to drain {} messages", report.errors.len());
    }

    println!(
        "✓ Drained {} messages from {identity} ({remaining} remaining)",
        report.archived
    );
    for (reason, count) in report.by_reason() {
        println!("  {reason}: {count}");
    }
    Ok(())
}
