//! Bulk archival of stale protocol messages.
//!
//! Protocol notifications accumulate in agent inboxes (especially the
//! witness) long after they stop being actionable. The drainer selects the
//! stale ones by subject prefix and age, then deletes them. Anything that
//! needs human attention (help requests, handoff context) is never
//! selected, no matter how old.
//!
//! Selection is pure and separated from the delete pass so both halves are
//! independently testable and dry-runnable.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{MailError, Mailbox, Message};

/// Default age threshold for draining.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Protocol subject prefixes that are safe to bulk-archive. Routine
/// notifications that need no individual attention once stale.
pub const DRAINABLE_SUBJECTS: [&str; 7] = [
    "POLECAT_DONE",
    "POLECAT_STARTED",
    "LIFECYCLE:",
    "MERGED",
    "MERGE_READY",
    "MERGE_FAILED",
    "SWARM_START",
];

/// Whether a subject matches a drainable protocol pattern.
#[must_use]
pub fn is_drainable_subject(subject: &str) -> bool {
    DRAINABLE_SUBJECTS
        .iter()
        .any(|prefix| subject.starts_with(prefix))
}

/// Why a message was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainReason {
    /// Aged protocol message.
    Protocol,
    /// Protocol message that is also a wisp.
    WispProtocol,
    /// Non-protocol wisp, read and aged.
    ReadWisp,
}

impl std::fmt::Display for DrainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol => write!(f, "protocol"),
            Self::WispProtocol => write!(f, "wisp+protocol"),
            Self::ReadWisp => write!(f, "read-wisp"),
        }
    }
}

/// A message selected for draining.
#[derive(Debug, Clone)]
pub struct DrainCandidate {
    /// The selected message.
    pub message: Message,
    /// Why it was selected.
    pub reason: DrainReason,
}

/// Drain inputs.
#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    /// Only drain messages older than this.
    pub max_age: Duration,
    /// Drain matching protocol messages regardless of age.
    pub drain_all: bool,
    /// Select and report without deleting.
    pub dry_run: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            drain_all: false,
            dry_run: false,
        }
    }
}

/// Outcome of a drain pass.
#[derive(Debug)]
pub struct DrainReport {
    /// Total messages listed in the mailbox.
    pub total: usize,
    /// Messages selected for draining.
    pub candidates: Vec<DrainCandidate>,
    /// Messages actually deleted (zero on dry run).
    pub archived: usize,
    /// Per-message delete failures as `(id, error)` text.
    pub errors: Vec<(String, String)>,
}

impl DrainReport {
    /// Overall success: zero deletions failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Candidate counts grouped by reason, for the summary.
    #[must_use]
    pub fn by_reason(&self) -> Vec<(DrainReason, usize)> {
        let mut counts: Vec<(DrainReason, usize)> = Vec::new();
        for candidate in &self.candidates {
            match counts.iter_mut().find(|(r, _)| *r == candidate.reason) {
                Some((_, n)) => *n += 1,
                None => counts.push((candidate.reason, 1)),
            }
        }
        counts
    }
}

/// Select drain candidates from a listed mailbox.
///
/// A message is selected iff:
/// - its subject is drainable AND (`drain_all` OR older than `max_age`), or
/// - it is a read wisp, aged (or `drain_all`), with a non-protocol subject.
#[must_use]
pub fn select_candidates(
    messages: &[Message],
    now: DateTime<Utc>,
    opts: &DrainOptions,
) -> Vec<DrainCandidate> {
    let cutoff = now - chrono::Duration::from_std(opts.max_age).unwrap_or_default();
    let mut candidates = Vec::new();

    for message in messages {
        if !is_drainable_subject(&message.subject) {
            continue;
        }
        if !opts.drain_all && message.timestamp > cutoff {
            continue;
        }
        let reason = if message.wisp {
            DrainReason::WispProtocol
        } else {
            DrainReason::Protocol
        };
        candidates.push(DrainCandidate {
            message: message.clone(),
            reason,
        });
    }

    // Read wisps with non-protocol subjects drain too, once aged.
    for message in messages {
        if is_drainable_subject(&message.subject) {
            continue;
        }
        if message.wisp && message.read && (opts.drain_all || message.timestamp <= cutoff) {
            candidates.push(DrainCandidate {
                message: message.clone(),
                reason: DrainReason::ReadWisp,
            });
        }
    }

    candidates
}

/// Run a full drain pass against a mailbox.
///
/// On dry run the report carries the candidates and nothing is deleted.
/// Delete failures are collected per message; the pass continues.
///
/// # Errors
///
/// Returns [`MailError`] only when listing the mailbox fails.
pub fn drain(
    mailbox: &mut dyn Mailbox,
    opts: &DrainOptions,
    now: DateTime<Utc>,
) -> Result<DrainReport, MailError> {
    let messages = mailbox.list()?;
    let candidates = select_candidates(&messages, now, opts);

    let mut report = DrainReport {
        total: messages.len(),
        candidates,
        archived: 0,
        errors: Vec::new(),
    };

    if opts.dry_run {
        return Ok(report);
    }

    for candidate in &report.candidates {
        match mailbox.delete(&candidate.message.id) {
            Ok(()) => report.archived += 1,
            Err(e) => report
                .errors
                .push((candidate.message.id.clone(), e.to_string())),
        }
    }

    Ok(report)
}
