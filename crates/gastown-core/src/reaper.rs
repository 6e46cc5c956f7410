//! Retention engine for ephemeral wisp rows ("wisp reaper").
//!
//! Wisps track in-flight steps of higher-level molecules. They are cheap to
//! create and worthless once their work completes, so the reaper closes
//! stale ones, permanently deletes old closed ones, purges aged mail rows,
//! and auto-closes abandoned issues, across every configured database, in
//! bounded batches, under parent-closure gating.
//!
//! A cycle is an explicit pipeline of five ordered steps:
//! scan → reap → purge → auto-close → report. Steps are independent; a
//! failure in one is logged, counted per database, recorded on the cycle
//! molecule, and never aborts the next step. The reaper is restricted to
//! the wisps table plus mail purge and stale-issue auto-close; it never
//! touches other issues.
//!
//! Timing is UTC throughout. All value parameters travel as `?`
//! placeholders; database names are interpolated only after passing the
//! identifier gate in [`crate::db`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::{is_valid_db_name, AutocommitGuard, ConnOpener, DbError, SqlConn, SqlValue};
use crate::molecule::Molecule;

/// Default patrol interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Wisps older than this are reaped (closed).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Closed wisps older than this are permanently deleted.
pub const DEFAULT_DELETE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Closed mail (`gt:message`) older than this is permanently deleted.
pub const DEFAULT_MAIL_DELETE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Issues stale longer than this are auto-closed.
pub const DEFAULT_STALE_ISSUE_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// If the open wisp count exceeds this, the report escalates.
pub const WISP_ALERT_THRESHOLD: i64 = 500;

/// Rows per DELETE batch, keeping transactions short and the commit graph
/// shallow.
pub const DELETE_BATCH_SIZE: usize = 100;

/// Socket timeout for counts and updates.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall-clock cap on one batched delete phase.
const BATCH_PHASE_TIMEOUT: Duration = Duration::from_secs(120);

/// The production database set, used when none are configured.
#[must_use]
pub fn production_databases() -> Vec<String> {
    ["hq", "beads", "gastown"].map(String::from).to_vec()
}

/// Inputs for one retention cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Databases to process. Empty means [`production_databases`].
    pub databases: Vec<String>,
    /// Age before an open wisp is reaped.
    pub max_age: Duration,
    /// Age after closing before a wisp is purged.
    pub delete_age: Duration,
    /// Age after closing before mail is purged.
    pub mail_delete_age: Duration,
    /// Inactivity age before an issue is auto-closed.
    pub stale_issue_age: Duration,
    /// Report without acting.
    pub dry_run: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            delete_age: DEFAULT_DELETE_AGE,
            mail_delete_age: DEFAULT_MAIL_DELETE_AGE,
            stale_issue_age: DEFAULT_STALE_ISSUE_AGE,
            dry_run: false,
        }
    }
}

/// Accumulated results of one cycle, reported in the summary line.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleOutcome {
    /// Stale wisps closed (or countable, in dry-run).
    pub reaped: i64,
    /// Open wisps remaining after the reap step.
    pub open: i64,
    /// Closed wisp rows deleted.
    pub purged: i64,
    /// Mail rows deleted.
    pub mail_purged: i64,
    /// Stale issues closed.
    pub auto_closed: i64,
    /// Databases the cycle iterated over.
    pub databases: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// The retention engine. Stateless between cycles; connections are opened
/// per (database, phase) and dropped on step exit.
pub struct Reaper<'a> {
    opener: &'a dyn ConnOpener,
}

struct Cycle {
    databases: Vec<String>,
    max_age: Duration,
    dry_run: bool,
    cutoff: DateTime<Utc>,
    delete_cutoff: DateTime<Utc>,
    total_reaped: i64,
    total_open: i64,
    total_purged: i64,
    total_mail_purged: i64,
    total_auto_closed: i64,
}

impl<'a> Reaper<'a> {
    /// Engine over the given connection opener.
    #[must_use]
    pub fn new(opener: &'a dyn ConnOpener) -> Self {
        Self { opener }
    }

    /// Run one full cycle, recording step outcomes on `mol`.
    ///
    /// Databases are processed sequentially; within a database the steps
    /// are strictly ordered reap → purge → mail-purge → auto-close. The
    /// caller guarantees cycles never overlap (one per daemon).
    pub fn run_cycle(&self, opts: &CycleOptions, mol: &Molecule) -> CycleOutcome {
        let now = Utc::now();
        let mut cycle = Cycle {
            databases: if opts.databases.is_empty() {
                production_databases()
            } else {
                opts.databases.clone()
            },
            max_age: opts.max_age,
            dry_run: opts.dry_run,
            cutoff: now - chrono_duration(opts.max_age),
            delete_cutoff: now - chrono_duration(opts.delete_age),
            total_reaped: 0,
            total_open: 0,
            total_purged: 0,
            total_mail_purged: 0,
            total_auto_closed: 0,
        };

        if cycle.dry_run {
            info!("wisp_reaper: DRY RUN: reporting only, no changes will be made");
        }

        // Step 1: scan.
        if cycle.databases.is_empty() {
            info!("wisp_reaper: no databases to reap");
            mol.fail_step("scan", "no databases found");
            return self.outcome(&cycle);
        }
        info!("wisp_reaper: scanning {} databases", cycle.databases.len());
        mol.close_step("scan");

        self.reap_step(&mut cycle, mol);
        self.purge_step(&mut cycle, mol, opts.mail_delete_age);
        self.auto_close_step(&mut cycle, mol, opts.stale_issue_age);
        self.report_step(&cycle, mol);

        self.outcome(&cycle)
    }

    fn outcome(&self, cycle: &Cycle) -> CycleOutcome {
        CycleOutcome {
            reaped: cycle.total_reaped,
            open: cycle.total_open,
            purged: cycle.total_purged,
            mail_purged: cycle.total_mail_purged,
            auto_closed: cycle.total_auto_closed,
            databases: cycle.databases.len(),
            dry_run: cycle.dry_run,
        }
    }

    /// Step 2: close stale wisps whose parent molecule already closed.
    fn reap_step(&self, cycle: &mut Cycle, mol: &Molecule) {
        let mut reap_errors = 0u32;

        let databases = cycle.databases.clone();
        for db in &databases {
            if !is_valid_db_name(db) {
                warn!("wisp_reaper: skipping invalid database name: {:?}", db);
                continue;
            }
            match self.reap_in_db(db, cycle.cutoff, cycle.dry_run) {
                Ok((reaped, open)) => {
                    cycle.total_reaped += reaped;
                    cycle.total_open += open;
                    if reaped > 0 {
                        info!(
                            "wisp_reaper: {}: {}closed {} stale wisps (older than {:?}), {} open remain",
                            db,
                            dry_prefix(cycle.dry_run),
                            reaped,
                            cycle.max_age,
                            open
                        );
                    }
                }
                Err(e) => {
                    warn!("wisp_reaper: {}: close error: {}", db, e);
                    reap_errors += 1;
                }
            }
        }

        if cycle.total_reaped > 0 {
            info!(
                "wisp_reaper: total {}closed {} stale wisps across {} databases, {} open remain",
                dry_prefix(cycle.dry_run),
                cycle.total_reaped,
                cycle.databases.len(),
                cycle.total_open
            );
        }

        if reap_errors > 0 {
            mol.fail_step("reap", &format!("{reap_errors} databases had reap errors"));
        } else {
            mol.close_step("reap");
        }
    }

    /// Step 3: delete old closed wisps, then old closed mail.
    fn purge_step(&self, cycle: &mut Cycle, mol: &Molecule, mail_delete_age: Duration) {
        let mut purge_errors = 0u32;

        let databases = cycle.databases.clone();
        for db in &databases {
            if !is_valid_db_name(db) {
                continue;
            }
            match self.purge_closed_wisps(db, cycle.delete_cutoff, cycle.dry_run) {
                Ok(purged) => cycle.total_purged += purged,
                Err(e) => {
                    warn!("wisp_reaper: {}: purge error: {}", db, e);
                    purge_errors += 1;
                }
            }
        }

        if cycle.total_purged > 0 {
            info!(
                "wisp_reaper: total {}purged {} closed wisp rows across {} databases",
                dry_prefix(cycle.dry_run),
                cycle.total_purged,
                cycle.databases.len()
            );
        }

        // Mail retention runs on its own cutoff, computed fresh.
        let mail_cutoff = Utc::now() - chrono_duration(mail_delete_age);
        for db in &databases {
            if !is_valid_db_name(db) {
                continue;
            }
            match self.purge_old_mail(db, mail_cutoff, cycle.dry_run) {
                Ok(purged) => cycle.total_mail_purged += purged,
                Err(e) => warn!("wisp_reaper: {}: mail purge error: {}", db, e),
            }
        }

        if cycle.total_mail_purged > 0 {
            info!(
                "wisp_reaper: total {}purged {} old mail rows across {} databases",
                dry_prefix(cycle.dry_run),
                cycle.total_mail_purged,
                cycle.databases.len()
            );
        }

        if purge_errors > 0 {
            mol.fail_step("purge", &format!("{purge_errors} databases had purge errors"));
        } else {
            mol.close_step("purge");
        }
    }

    /// Step 4: close issues stale for longer than the threshold.
    fn auto_close_step(&self, cycle: &mut Cycle, mol: &Molecule, stale_issue_age: Duration) {
        let stale_cutoff = Utc::now() - chrono_duration(stale_issue_age);
        let mut auto_close_errors = 0u32;

        let databases = cycle.databases.clone();
        for db in &databases {
            if !is_valid_db_name(db) {
                continue;
            }
            match self.auto_close_stale(db, stale_cutoff, cycle.dry_run) {
                Ok(closed) => cycle.total_auto_closed += closed,
                Err(e) => {
                    warn!("wisp_reaper: {}: auto-close error: {}", db, e);
                    auto_close_errors += 1;
                }
            }
        }

        if cycle.total_auto_closed > 0 {
            info!(
                "wisp_reaper: total {}auto-closed {} stale issues across {} databases",
                dry_prefix(cycle.dry_run),
                cycle.total_auto_closed,
                cycle.databases.len()
            );
        }

        if auto_close_errors > 0 {
            mol.fail_step(
                "auto-close",
                &format!("{auto_close_errors} databases had auto-close errors"),
            );
        } else {
            mol.close_step("auto-close");
        }
    }

    /// Step 5: summary line and alerting.
    fn report_step(&self, cycle: &Cycle, mol: &Molecule) {
        if cycle.total_open > WISP_ALERT_THRESHOLD {
            warn!(
                "wisp_reaper: WARNING: {} open wisps exceed threshold {}, investigate wisp lifecycle",
                cycle.total_open, WISP_ALERT_THRESHOLD
            );
        }

        info!(
            "wisp_reaper: cycle complete — reaped={} purged={} mail_purged={} auto_closed={} open={} databases={} dryRun={}",
            cycle.total_reaped,
            cycle.total_purged,
            cycle.total_mail_purged,
            cycle.total_auto_closed,
            cycle.total_open,
            cycle.databases.len(),
            cycle.dry_run
        );

        mol.close_step("report");
    }

    /// Close stale wisps in one database. Only wisps whose parent molecule
    /// is closed (proof the work completed) or that have no parent at all
    /// are eligible. Returns `(reaped, remaining_open)`.
    fn reap_in_db(
        &self,
        db: &str,
        cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<(i64, i64), DbError> {
        let mut conn = self.opener.open(db, QUERY_TIMEOUT, QUERY_TIMEOUT)?;
        let parent_check = parent_check_where(db);
        let where_clause = format!(
            "w.status IN ('open', 'hooked', 'in_progress') AND w.created_at < ? AND {parent_check}"
        );
        let cutoff_param = [sql_timestamp(cutoff)];

        if dry_run {
            let would_reap = conn.query_count(
                &format!("SELECT COUNT(*) FROM `{db}`.wisps w WHERE {where_clause}"),
                &cutoff_param,
            )?;
            let open = count_open_wisps(conn.as_mut(), db)?;
            return Ok((would_reap, open));
        }

        let reaped;
        {
            let mut guard = AutocommitGuard::disable(conn.as_mut())?;
            let update = format!(
                "UPDATE `{db}`.wisps w SET w.status = 'closed', w.closed_at = NOW() WHERE {where_clause}"
            );
            reaped = i64::try_from(guard.conn().exec(&update, &cutoff_param)?).unwrap_or(i64::MAX);
            if reaped > 0 {
                dolt_commit(
                    guard.conn(),
                    db,
                    &format!("reaper: close {reaped} stale wisps in {db}"),
                );
            }
        }

        let open = count_open_wisps(conn.as_mut(), db)?;
        Ok((reaped, open))
    }

    /// Delete closed wisp rows (and their auxiliary data) older than the
    /// delete cutoff, in batches, under the same parent gating as reap.
    fn purge_closed_wisps(
        &self,
        db: &str,
        delete_cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<i64, DbError> {
        let mut conn = self.opener.open(db, QUERY_TIMEOUT, QUERY_TIMEOUT)?;
        let parent_check = parent_check_where(db);
        let cutoff_param = sql_timestamp(delete_cutoff);

        // Delete digest: eligible closed wisps grouped by type.
        let digest_sql = format!(
            "SELECT COALESCE(w.wisp_type, 'unknown') AS wtype, COUNT(*) AS cnt \
             FROM `{db}`.wisps w WHERE w.status = 'closed' AND w.closed_at < ? AND {parent_check} \
             GROUP BY wtype"
        );
        let rows = conn.query_rows(&digest_sql, std::slice::from_ref(&cutoff_param))?;
        let mut digest_total = 0i64;
        for row in &rows {
            let wtype = row.first().and_then(SqlValue::as_str).unwrap_or("unknown");
            let count = row.get(1).and_then(SqlValue::as_i64).unwrap_or(0);
            if count > 0 {
                info!(
                    "wisp_reaper: {}: {}delete digest: type={} count={}",
                    db,
                    dry_tag(dry_run),
                    wtype,
                    count
                );
            }
            digest_total += count;
        }

        if digest_total == 0 {
            return Ok(0);
        }

        if dry_run {
            info!(
                "wisp_reaper: {}: [DRY RUN] would delete {} closed wisp rows (closed before {})",
                db,
                digest_total,
                delete_cutoff.to_rfc3339()
            );
            return Ok(digest_total);
        }

        info!(
            "wisp_reaper: {}: deleting {} closed wisp rows (closed before {})",
            db,
            digest_total,
            delete_cutoff.to_rfc3339()
        );

        let id_query = format!(
            "SELECT w.id FROM `{db}`.wisps w \
             WHERE w.status = 'closed' AND w.closed_at < ? AND {parent_check} \
             LIMIT {DELETE_BATCH_SIZE}"
        );
        let aux_tables = ["wisp_labels", "wisp_comments", "wisp_events", "wisp_dependencies"];

        let mut guard = AutocommitGuard::disable(conn.as_mut())?;
        let total_deleted = batch_delete_rows(
            guard.conn(),
            db,
            &id_query,
            &cutoff_param,
            "wisps",
            &aux_tables,
            Instant::now() + BATCH_PHASE_TIMEOUT,
        )?;

        if total_deleted > 0 {
            dolt_commit(
                guard.conn(),
                db,
                &format!("reaper: purge {total_deleted} closed wisps from {db}"),
            );
            info!(
                "wisp_reaper: {}: deleted {} closed wisp rows and associated data",
                db, total_deleted
            );
        }

        Ok(total_deleted)
    }

    /// Delete closed mail (`gt:message` labeled issues) older than the mail
    /// cutoff. Purge-only: no gating beyond age, closed status, and label
    /// membership; open or unread mail to parked rigs never vanishes.
    fn purge_old_mail(
        &self,
        db: &str,
        mail_cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<i64, DbError> {
        let mut conn = self.opener.open(db, QUERY_TIMEOUT, QUERY_TIMEOUT)?;
        let cutoff_param = sql_timestamp(mail_cutoff);

        let count_sql = format!(
            "SELECT COUNT(*) FROM `{db}`.issues WHERE status = 'closed' AND closed_at < ? \
             AND id IN (SELECT issue_id FROM `{db}`.labels WHERE label = 'gt:message')"
        );
        let count = conn.query_count(&count_sql, std::slice::from_ref(&cutoff_param))?;
        if count == 0 {
            return Ok(0);
        }

        if dry_run {
            info!(
                "wisp_reaper: {}: [DRY RUN] would delete {} closed mail rows older than {}",
                db,
                count,
                mail_cutoff.to_rfc3339()
            );
            return Ok(count);
        }

        info!(
            "wisp_reaper: {}: deleting {} closed mail rows older than {}",
            db,
            count,
            mail_cutoff.to_rfc3339()
        );

        let id_query = format!(
            "SELECT i.id FROM `{db}`.issues i INNER JOIN `{db}`.labels l ON i.id = l.issue_id \
             WHERE i.status = 'closed' AND i.closed_at < ? AND l.label = 'gt:message' \
             LIMIT {DELETE_BATCH_SIZE}"
        );
        let aux_tables = ["labels", "comments", "events", "dependencies"];

        let mut guard = AutocommitGuard::disable(conn.as_mut())?;
        let total_deleted = batch_delete_rows(
            guard.conn(),
            db,
            &id_query,
            &cutoff_param,
            "issues",
            &aux_tables,
            Instant::now() + BATCH_PHASE_TIMEOUT,
        )?;

        if total_deleted > 0 {
            dolt_commit(
                guard.conn(),
                db,
                &format!("reaper: purge {total_deleted} old mail from {db}"),
            );
            info!(
                "wisp_reaper: {}: deleted {} old mail rows and associated data",
                db, total_deleted
            );
        }

        Ok(total_deleted)
    }

    /// Close issues open with no updates past the stale cutoff. Excludes
    /// P0/P1, epics, and issues with active dependencies in either
    /// direction.
    fn auto_close_stale(
        &self,
        db: &str,
        stale_cutoff: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<i64, DbError> {
        let mut conn = self.opener.open(db, QUERY_TIMEOUT, QUERY_TIMEOUT)?;
        let stale_where = stale_issue_where(db);
        let cutoff_param = [sql_timestamp(stale_cutoff)];

        let count = conn.query_count(
            &format!("SELECT COUNT(*) FROM `{db}`.issues i WHERE {stale_where}"),
            &cutoff_param,
        )?;
        if count == 0 {
            return Ok(0);
        }

        if dry_run {
            info!(
                "wisp_reaper: {}: [DRY RUN] would auto-close {} stale issues",
                db, count
            );
            return Ok(count);
        }

        info!(
            "wisp_reaper: {}: auto-closing {} stale issues (no updates since {})",
            db,
            count,
            stale_cutoff.to_rfc3339()
        );

        let closed;
        {
            let mut guard = AutocommitGuard::disable(conn.as_mut())?;
            let update = format!(
                "UPDATE `{db}`.issues i SET i.status = 'closed', i.closed_at = NOW() WHERE {stale_where}"
            );
            closed = i64::try_from(guard.conn().exec(&update, &cutoff_param)?).unwrap_or(i64::MAX);
            if closed > 0 {
                dolt_commit(
                    guard.conn(),
                    db,
                    &format!("reaper: auto-close {closed} stale issues in {db}"),
                );
            }
        }

        if closed > 0 {
            info!("wisp_reaper: {}: auto-closed {} stale issues", db, closed);
        }
        Ok(closed)
    }
}

/// SQL fragment restricting operations to wisps whose parent molecule is
/// closed or that have no parent (orphans). Shared verbatim by the reap and
/// purge phases so eligibility cannot drift between them.
#[must_use]
pub fn parent_check_where(db: &str) -> String {
    format!(
        "(NOT EXISTS (\
            SELECT 1 FROM `{db}`.wisp_dependencies wd \
            WHERE wd.issue_id = w.id AND wd.type = 'parent-child') \
         OR EXISTS (\
            SELECT 1 FROM `{db}`.wisp_dependencies wd \
            JOIN `{db}`.wisps parent ON parent.id = wd.depends_on_id \
            WHERE wd.issue_id = w.id AND wd.type = 'parent-child' \
            AND parent.status = 'closed'))"
    )
}

/// WHERE body shared by the stale-issue COUNT and UPDATE.
fn stale_issue_where(db: &str) -> String {
    format!(
        "i.status IN ('open', 'in_progress') \
         AND i.updated_at < ? \
         AND i.priority > 1 \
         AND i.issue_type != 'epic' \
         AND i.id NOT IN (\
            SELECT DISTINCT d.issue_id FROM `{db}`.dependencies d \
            INNER JOIN `{db}`.issues dep ON d.depends_on_id = dep.id \
            WHERE dep.status IN ('open', 'in_progress')) \
         AND i.id NOT IN (\
            SELECT DISTINCT d.depends_on_id FROM `{db}`.dependencies d \
            INNER JOIN `{db}`.issues blocker ON d.issue_id = blocker.id \
            WHERE blocker.status IN ('open', 'in_progress'))"
    )
}

/// Delete rows from a primary table and its auxiliary tables in batches.
/// `id_query` must select a single id column, take one timestamp parameter,
/// and carry its own LIMIT. Auxiliary tables are deleted first per batch
/// (referential integrity); an auxiliary failure is logged but does not
/// abort the batch, since some databases lack some aux tables. The caller
/// owns autocommit and the Dolt commit.
fn batch_delete_rows(
    conn: &mut dyn SqlConn,
    db: &str,
    id_query: &str,
    cutoff_param: &String,
    primary_table: &str,
    aux_tables: &[&str],
    deadline: Instant,
) -> Result<i64, DbError> {
    let mut total_deleted = 0i64;

    loop {
        if Instant::now() >= deadline {
            return Err(DbError::Deadline(BATCH_PHASE_TIMEOUT));
        }

        let ids = conn.query_strings(id_query, std::slice::from_ref(cutoff_param))?;
        if ids.is_empty() {
            break;
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        for table in aux_tables {
            let sql = format!("DELETE FROM `{db}`.`{table}` WHERE issue_id IN ({placeholders})");
            if let Err(e) = conn.exec(&sql, &ids) {
                warn!("wisp_reaper: {}: delete from {}: {}", db, table, e);
            }
        }

        let sql = format!("DELETE FROM `{db}`.`{primary_table}` WHERE id IN ({placeholders})");
        let affected = conn.exec(&sql, &ids)?;
        total_deleted += i64::try_from(affected).unwrap_or(i64::MAX);
    }

    Ok(total_deleted)
}

fn count_open_wisps(conn: &mut dyn SqlConn, db: &str) -> Result<i64, DbError> {
    conn.query_count(
        &format!(
            "SELECT COUNT(*) FROM `{db}`.wisps WHERE status IN ('open', 'hooked', 'in_progress')"
        ),
        &[],
    )
}

/// Record the working set as one logical revision. Commit messages are
/// constructed from counts and validated database names only, so they are
/// quote-free by construction. A failed commit is logged and the cycle
/// proceeds.
fn dolt_commit(conn: &mut dyn SqlConn, db: &str, message: &str) {
    let sql = format!("CALL DOLT_COMMIT('-Am', '{message}')");
    if let Err(e) = conn.exec(&sql, &[]) {
        warn!("wisp_reaper: {}: dolt commit failed: {}", db, e);
    }
}

fn sql_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_default()
}

fn dry_prefix(dry_run: bool) -> &'static str {
    if dry_run {
        "[DRY RUN] would have "
    } else {
        ""
    }
}

fn dry_tag(dry_run: bool) -> &'static str {
    if dry_run {
        "[DRY RUN] "
    } else {
        ""
    }
}
