//! Wisp reaper patrol: drives the retention engine.
//!
//! The patrol is a thin orchestrator. It pours the cycle molecule, builds
//! the cycle options from config, and hands off to the engine, which
//! mirrors the formula: scan → reap → purge → auto-close → report.

use std::time::Duration;

use gastown_core::config::DaemonConfig;
use gastown_core::db::DoltOpener;
use gastown_core::molecule::{Molecule, MOL_WISP_REAPER};
use gastown_core::reaper::{self, CycleOptions, Reaper};
use tracing::info;

use crate::patrol::{Patrol, PatrolContext};

/// Periodic retention over wisps, mail, and stale issues.
#[derive(Debug, Default)]
pub struct WispReaperPatrol;

/// Build cycle options from the patrol config block.
#[must_use]
pub fn cycle_options(config: &DaemonConfig) -> CycleOptions {
    let block = config.wisp_reaper();
    CycleOptions {
        databases: block.map(|c| c.databases.clone()).unwrap_or_default(),
        max_age: block.map_or(reaper::DEFAULT_MAX_AGE, |c| c.max_age()),
        delete_age: block.map_or(reaper::DEFAULT_DELETE_AGE, |c| c.delete_age()),
        mail_delete_age: reaper::DEFAULT_MAIL_DELETE_AGE,
        stale_issue_age: reaper::DEFAULT_STALE_ISSUE_AGE,
        dry_run: block.is_some_and(|c| c.dry_run),
    }
}

impl Patrol for WispReaperPatrol {
    fn name(&self) -> &'static str {
        "wisp_reaper"
    }

    fn interval(&self, config: &DaemonConfig) -> Duration {
        config
            .wisp_reaper()
            .map_or(reaper::DEFAULT_INTERVAL, |c| c.interval())
    }

    fn run(&self, ctx: &PatrolContext) {
        let opts = cycle_options(&ctx.config);

        let mol = Molecule::pour(
            ctx.molecules.clone(),
            MOL_WISP_REAPER,
            &[
                ("max_age".to_string(), format!("{:?}", opts.max_age)),
                ("purge_age".to_string(), format!("{:?}", opts.delete_age)),
            ],
        );

        let opener = DoltOpener::new(ctx.dolt_port);
        let outcome = Reaper::new(&opener).run_cycle(&opts, &mol);
        mol.close();

        info!(
            reaped = outcome.reaped,
            purged = outcome.purged,
            mail_purged = outcome.mail_purged,
            auto_closed = outcome.auto_closed,
            open = outcome.open,
            "wisp_reaper: patrol tick finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_without_config() {
        let opts = cycle_options(&DaemonConfig::default());
        assert!(opts.databases.is_empty());
        assert_eq!(opts.max_age, reaper::DEFAULT_MAX_AGE);
        assert_eq!(opts.delete_age, reaper::DEFAULT_DELETE_AGE);
        assert!(!opts.dry_run);
    }

    #[test]
    fn options_follow_config_block() {
        let json = r#"{"patrols": {"wisp_reaper": {
            "enabled": true,
            "dry_run": true,
            "interval": "1h",
            "max_age": "48h",
            "delete_age": "336h",
            "databases": ["hq"]
        }}}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();

        let opts = cycle_options(&config);
        assert_eq!(opts.databases, ["hq"]);
        assert_eq!(opts.max_age, Duration::from_secs(48 * 3600));
        assert_eq!(opts.delete_age, Duration::from_secs(14 * 24 * 3600));
        assert!(opts.dry_run);
        assert_eq!(WispReaperPatrol.interval(&config), Duration::from_secs(3600));
    }

    #[test]
    fn invalid_interval_falls_back() {
        let json = r#"{"patrols": {"wisp_reaper": {"enabled": true, "interval": "nope"}}}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(WispReaperPatrol.interval(&config), reaper::DEFAULT_INTERVAL);
    }
}
