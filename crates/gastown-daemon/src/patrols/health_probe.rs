//! Health probe patrol: pours an inspection molecule for agents.
//!
//! The daemon is a thin ticker here. It creates the molecule carrying the
//! advisory thresholds and the Dolt port; agents pick it up, execute the
//! checks, and fill in results. Daemons schedule, agents decide and act.

use std::time::Duration;

use gastown_core::config::{DaemonConfig, DEFAULT_HEALTH_PROBE_INTERVAL};
use gastown_core::molecule::{Molecule, MOL_HEALTH_PROBE};
use gastown_core::reaper::production_databases;
use tracing::{info, warn};

use crate::patrol::{Patrol, PatrolContext};

/// Pours the periodic health inspection molecule.
#[derive(Debug, Default)]
pub struct HealthProbePatrol;

impl Patrol for HealthProbePatrol {
    fn name(&self) -> &'static str {
        "health_probe"
    }

    fn interval(&self, config: &DaemonConfig) -> Duration {
        config
            .health_probe()
            .map_or(DEFAULT_HEALTH_PROBE_INTERVAL, |c| c.interval())
    }

    fn run(&self, ctx: &PatrolContext) {
        let block = ctx.config.health_probe();
        let (latency_ms, orphan_count, backup_stale_secs) = block.map_or_else(
            || gastown_core::config::HealthProbeConfig::default().thresholds(),
            gastown_core::config::HealthProbeConfig::thresholds,
        );

        let databases = block
            .filter(|c| !c.databases.is_empty())
            .map_or_else(production_databases, |c| c.databases.clone());

        info!("health_probe: pouring molecule for agent execution");
        let mol = Molecule::pour(
            ctx.molecules.clone(),
            MOL_HEALTH_PROBE,
            &[
                ("port".to_string(), ctx.dolt_port.to_string()),
                ("databases".to_string(), databases.join(",")),
                ("latency_threshold".to_string(), format!("{latency_ms:.0}ms")),
                ("orphan_threshold".to_string(), orphan_count.to_string()),
                (
                    "backup_threshold".to_string(),
                    format!("{backup_stale_secs:.0}s"),
                ),
            ],
        );

        if !mol.is_poured() {
            warn!("health_probe: molecule pour failed (non-fatal), skipping cycle");
            return;
        }

        info!("health_probe: poured {} for agent pickup", mol.root_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_without_config() {
        assert_eq!(
            HealthProbePatrol.interval(&DaemonConfig::default()),
            DEFAULT_HEALTH_PROBE_INTERVAL
        );
    }

    #[test]
    fn interval_from_config() {
        let json = r#"{"patrols": {"health_probe": {"enabled": true, "interval": "10m"}}}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            HealthProbePatrol.interval(&config),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn invalid_interval_falls_back() {
        let json = r#"{"patrols": {"health_probe": {"enabled": true, "interval": "bogus"}}}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            HealthProbePatrol.interval(&config),
            DEFAULT_HEALTH_PROBE_INTERVAL
        );
    }
}
