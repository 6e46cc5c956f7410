//! Log rotation patrol: copy-truncate oversized child logs.

use std::time::Duration;

use gastown_core::config::{DaemonConfig, DEFAULT_LOG_ROTATION_INTERVAL};
use gastown_core::logrotate::LogRotator;
use tracing::{info, warn};

use crate::patrol::{Patrol, PatrolContext};

/// Rotates Dolt server logs on a timer. The daemon's own log is excluded;
/// it has its own rename-based writer.
#[derive(Debug, Default)]
pub struct LogRotationPatrol;

impl Patrol for LogRotationPatrol {
    fn name(&self) -> &'static str {
        "log_rotation"
    }

    fn interval(&self, config: &DaemonConfig) -> Duration {
        config
            .log_rotation()
            .map_or(DEFAULT_LOG_ROTATION_INTERVAL, |c| c.interval())
    }

    fn run(&self, ctx: &PatrolContext) {
        let result = LogRotator::new().rotate(&ctx.town_root);

        for path in &result.rotated {
            info!("log_rotation: rotated {}", path.display());
        }
        for err in &result.errors {
            warn!("log_rotation: {}", err);
        }
        if !result.rotated.is_empty() || !result.errors.is_empty() {
            info!(
                "log_rotation: pass complete: rotated={} skipped={} errors={}",
                result.rotated.len(),
                result.skipped.len(),
                result.errors.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_without_config() {
        let patrol = LogRotationPatrol;
        assert_eq!(
            patrol.interval(&DaemonConfig::default()),
            DEFAULT_LOG_ROTATION_INTERVAL
        );
    }

    #[test]
    fn interval_from_config() {
        let json = r#"{"patrols": {"log_rotation": {"enabled": true, "interval": "2h"}}}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            LogRotationPatrol.interval(&config),
            Duration::from_secs(2 * 3600)
        );
        assert!(LogRotationPatrol.enabled(&config));
    }
}
