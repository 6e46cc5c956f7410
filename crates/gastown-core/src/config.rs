//! Daemon configuration (`<root>/mayor/daemon.json`).
//!
//! The schema is opt-in and forward compatible: unknown fields are ignored,
//! a missing file yields the default config, and a missing `patrols`
//! section disables every patrol. A fresh daemon with an empty config
//! performs no database writes.
//!
//! Durations are stored as human-readable strings (`"30m"`, `"24h"`) and
//! parsed lazily; an invalid value falls back to the field default with a
//! warning rather than failing the load.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::paths;
use crate::reaper;

/// Default interval for the log rotation patrol.
pub const DEFAULT_LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default interval for the health probe patrol.
pub const DEFAULT_HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default advisory latency alert threshold for the health probe.
pub const DEFAULT_LATENCY_ALERT_MS: f64 = 5000.0;

/// Default advisory orphan-count alert threshold for the health probe.
pub const DEFAULT_ORPHAN_ALERT_COUNT: u32 = 20;

/// Default advisory backup-staleness alert threshold for the health probe.
pub const DEFAULT_BACKUP_STALE_SECONDS: f64 = 3600.0;

/// Default Dolt SQL server port.
pub const DEFAULT_DOLT_PORT: u16 = 3307;

/// Errors from loading the daemon config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("reading {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("invalid daemon.json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Patrol blocks. `None` means all patrols are disabled.
    #[serde(default)]
    pub patrols: Option<PatrolsConfig>,

    /// Supervised Dolt SQL server child, if the daemon owns one.
    #[serde(default)]
    pub dolt_server: Option<DoltServerConfig>,

    /// Agent sessions the daemon supervises in the terminal multiplexer.
    #[serde(default)]
    pub agents: Vec<AgentSessionConfig>,
}

impl DaemonConfig {
    /// Load the config from `<root>/mayor/daemon.json`. A missing file is
    /// the default configuration, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read or
    /// parsed.
    pub fn load(town_root: &Path) -> Result<Self, ConfigError> {
        let path = paths::config_file(town_root);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Whether the named patrol is enabled. Opt-in: the block must exist
    /// and carry `enabled: true`.
    #[must_use]
    pub fn patrol_enabled(&self, name: &str) -> bool {
        let Some(patrols) = &self.patrols else {
            return false;
        };
        match name {
            "log_rotation" => patrols.log_rotation.as_ref().is_some_and(|c| c.enabled),
            "wisp_reaper" => patrols.wisp_reaper.as_ref().is_some_and(|c| c.enabled),
            "health_probe" => patrols.health_probe.as_ref().is_some_and(|c| c.enabled),
            _ => false,
        }
    }

    /// The wisp reaper patrol block, if configured.
    #[must_use]
    pub fn wisp_reaper(&self) -> Option<&WispReaperConfig> {
        self.patrols.as_ref()?.wisp_reaper.as_ref()
    }

    /// The health probe patrol block, if configured.
    #[must_use]
    pub fn health_probe(&self) -> Option<&HealthProbeConfig> {
        self.patrols.as_ref()?.health_probe.as_ref()
    }

    /// The log rotation patrol block, if configured.
    #[must_use]
    pub fn log_rotation(&self) -> Option<&LogRotationPatrolConfig> {
        self.patrols.as_ref()?.log_rotation.as_ref()
    }

    /// The Dolt server port the control plane talks to.
    #[must_use]
    pub fn dolt_port(&self) -> u16 {
        self.dolt_server.as_ref().map_or(DEFAULT_DOLT_PORT, |c| c.port)
    }
}

/// One optional block per patrol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatrolsConfig {
    /// Copy-truncate rotation of child logs.
    #[serde(default)]
    pub log_rotation: Option<LogRotationPatrolConfig>,

    /// Retention engine for wisps, mail, and stale issues.
    #[serde(default)]
    pub wisp_reaper: Option<WispReaperConfig>,

    /// Health probe molecule pouring.
    #[serde(default)]
    pub health_probe: Option<HealthProbeConfig>,
}

/// Log rotation patrol configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRotationPatrolConfig {
    /// Whether the patrol runs.
    #[serde(default)]
    pub enabled: bool,

    /// How often to check, e.g. `"1h"`.
    #[serde(default)]
    pub interval: Option<String>,
}

impl LogRotationPatrolConfig {
    /// Effective interval, defaulting to one hour.
    #[must_use]
    pub fn interval(&self) -> Duration {
        duration_or(self.interval.as_deref(), DEFAULT_LOG_ROTATION_INTERVAL)
    }
}

/// Wisp reaper patrol configuration.
///
/// The reaper is restricted to the wisps table, mail purge, and stale-issue
/// auto-close; it never touches other issues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WispReaperConfig {
    /// Whether the reaper runs.
    #[serde(default)]
    pub enabled: bool,

    /// Report what would be reaped and purged without acting.
    #[serde(default)]
    pub dry_run: bool,

    /// How often to run, e.g. `"30m"`.
    #[serde(default)]
    pub interval: Option<String>,

    /// How old a wisp must be before reaping, e.g. `"24h"`.
    #[serde(default)]
    pub max_age: Option<String>,

    /// How long after closing before wisps are deleted, e.g. `"168h"`.
    #[serde(default)]
    pub delete_age: Option<String>,

    /// Database names to reap. Empty means the production fallback set.
    #[serde(default)]
    pub databases: Vec<String>,
}

impl WispReaperConfig {
    /// Effective run interval, defaulting to thirty minutes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        duration_or(self.interval.as_deref(), reaper::DEFAULT_INTERVAL)
    }

    /// Effective reap age, defaulting to twenty-four hours.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        duration_or(self.max_age.as_deref(), reaper::DEFAULT_MAX_AGE)
    }

    /// Effective purge age, defaulting to seven days.
    #[must_use]
    pub fn delete_age(&self) -> Duration {
        duration_or(self.delete_age.as_deref(), reaper::DEFAULT_DELETE_AGE)
    }
}

/// Health probe patrol configuration.
///
/// Thresholds are advisory: they are written onto the poured molecule and
/// acted on by agents, never by the daemon itself. Zero means "use the
/// default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthProbeConfig {
    /// Whether the probe runs.
    #[serde(default)]
    pub enabled: bool,

    /// How often to pour, e.g. `"5m"`.
    #[serde(default)]
    pub interval: Option<String>,

    /// Databases the probe should inspect. Empty means the production set.
    #[serde(default)]
    pub databases: Vec<String>,

    /// Latency alert threshold in milliseconds.
    #[serde(default)]
    pub latency_alert_ms: f64,

    /// Orphaned-database count alert threshold.
    #[serde(default)]
    pub orphan_alert_count: u32,

    /// Backup age alert threshold in seconds.
    #[serde(default)]
    pub backup_stale_seconds: f64,
}

impl HealthProbeConfig {
    /// Effective pour interval, defaulting to five minutes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        duration_or(self.interval.as_deref(), DEFAULT_HEALTH_PROBE_INTERVAL)
    }

    /// Effective thresholds `(latency_ms, orphan_count, backup_stale_secs)`,
    /// substituting defaults for zero or negative values.
    #[must_use]
    pub fn thresholds(&self) -> (f64, u32, f64) {
        let latency = if self.latency_alert_ms > 0.0 {
            self.latency_alert_ms
        } else {
            DEFAULT_LATENCY_ALERT_MS
        };
        let orphans = if self.orphan_alert_count > 0 {
            self.orphan_alert_count
        } else {
            DEFAULT_ORPHAN_ALERT_COUNT
        };
        let backup = if self.backup_stale_seconds > 0.0 {
            self.backup_stale_seconds
        } else {
            DEFAULT_BACKUP_STALE_SECONDS
        };
        (latency, orphans, backup)
    }
}

/// Supervised Dolt SQL server child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoltServerConfig {
    /// Whether the daemon owns the server process.
    #[serde(default)]
    pub enabled: bool,

    /// TCP port the server listens on.
    #[serde(default = "default_dolt_port")]
    pub port: u16,

    /// Data directory, relative to the town root when not absolute.
    #[serde(default)]
    pub data_dir: Option<String>,
}

const fn default_dolt_port() -> u16 {
    DEFAULT_DOLT_PORT
}

impl Default for DoltServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_DOLT_PORT,
            data_dir: None,
        }
    }
}

/// One supervised agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSessionConfig {
    /// Session identity, e.g. `"deacon"`. Doubles as the multiplexer
    /// session name.
    pub id: String,

    /// Command line started inside the session.
    pub command: String,

    /// Working directory, relative to the town root when not absolute.
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Parse a human-readable duration, substituting `default` for missing,
/// empty, zero, or unparsable values. Invalid values warn; they never fail
/// the caller.
#[must_use]
pub fn duration_or(value: Option<&str>, default: Duration) -> Duration {
    match value {
        None => default,
        Some("") => default,
        Some(s) => match humantime::parse_duration(s) {
            Ok(d) if !d.is_zero() => d,
            Ok(_) => default,
            Err(e) => {
                warn!(value = s, error = %e, "invalid duration in daemon.json, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_patrols_disables_everything() {
        let config = DaemonConfig::default();
        assert!(!config.patrol_enabled("wisp_reaper"));
        assert!(!config.patrol_enabled("log_rotation"));
        assert!(!config.patrol_enabled("health_probe"));
    }

    #[test]
    fn empty_patrols_block_disables_everything() {
        let config = DaemonConfig {
            patrols: Some(PatrolsConfig::default()),
            ..Default::default()
        };
        assert!(!config.patrol_enabled("wisp_reaper"));
    }

    #[test]
    fn patrol_must_opt_in() {
        let mut config = DaemonConfig {
            patrols: Some(PatrolsConfig {
                wisp_reaper: Some(WispReaperConfig::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!config.patrol_enabled("wisp_reaper"), "enabled defaults off");

        config
            .patrols
            .as_mut()
            .unwrap()
            .wisp_reaper
            .as_mut()
            .unwrap()
            .enabled = true;
        assert!(config.patrol_enabled("wisp_reaper"));
        assert!(!config.patrol_enabled("health_probe"));
    }

    #[test]
    fn unknown_patrol_name_is_disabled() {
        let config = DaemonConfig {
            patrols: Some(PatrolsConfig::default()),
            ..Default::default()
        };
        assert!(!config.patrol_enabled("beacon_sweep"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "patrols": {
                "wisp_reaper": {"enabled": true, "interval": "1h", "max_db_count": 10},
                "future_patrol": {"enabled": true}
            },
            "shiny_new_section": 42
        }"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert!(config.patrol_enabled("wisp_reaper"));
        assert_eq!(
            config.wisp_reaper().unwrap().interval(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn durations_fall_back_on_garbage() {
        let reaper = WispReaperConfig {
            interval: Some("nope".into()),
            max_age: Some("48h".into()),
            ..Default::default()
        };
        assert_eq!(reaper.interval(), reaper::DEFAULT_INTERVAL);
        assert_eq!(reaper.max_age(), Duration::from_secs(48 * 3600));
        assert_eq!(reaper.delete_age(), reaper::DEFAULT_DELETE_AGE);
    }

    #[test]
    fn zero_duration_uses_default() {
        assert_eq!(
            duration_or(Some("0s"), Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn health_thresholds_default_and_override() {
        let probe = HealthProbeConfig::default();
        let (lat, orphan, backup) = probe.thresholds();
        assert_eq!(lat, DEFAULT_LATENCY_ALERT_MS);
        assert_eq!(orphan, DEFAULT_ORPHAN_ALERT_COUNT);
        assert_eq!(backup, DEFAULT_BACKUP_STALE_SECONDS);

        let probe = HealthProbeConfig {
            latency_alert_ms: 3000.0,
            orphan_alert_count: 10,
            backup_stale_seconds: 1800.0,
            ..Default::default()
        };
        assert_eq!(probe.thresholds(), (3000.0, 10, 1800.0));

        // Partial override: unset fields keep their defaults.
        let probe = HealthProbeConfig {
            latency_alert_ms: 2000.0,
            ..Default::default()
        };
        let (lat, orphan, backup) = probe.thresholds();
        assert_eq!(lat, 2000.0);
        assert_eq!(orphan, DEFAULT_ORPHAN_ALERT_COUNT);
        assert_eq!(backup, DEFAULT_BACKUP_STALE_SECONDS);
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(dir.path()).unwrap();
        assert!(config.patrols.is_none());
        assert_eq!(config.dolt_port(), DEFAULT_DOLT_PORT);
    }

    #[test]
    fn load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mayor")).unwrap();
        std::fs::write(dir.path().join("mayor/daemon.json"), "not json").unwrap();
        assert!(matches!(
            DaemonConfig::load(dir.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn full_config_round_trip() {
        let json = r#"{
            "patrols": {
                "log_rotation": {"enabled": true, "interval": "2h"},
                "wisp_reaper": {
                    "enabled": true,
                    "dry_run": true,
                    "max_age": "24h",
                    "delete_age": "168h",
                    "databases": ["hq", "beads"]
                },
                "health_probe": {"enabled": true, "interval": "3m"}
            },
            "dolt_server": {"enabled": true, "port": 3309},
            "agents": [{"id": "deacon", "command": "gt deacon run"}]
        }"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert!(config.patrol_enabled("log_rotation"));
        assert!(config.wisp_reaper().unwrap().dry_run);
        assert_eq!(config.wisp_reaper().unwrap().databases, ["hq", "beads"]);
        assert_eq!(
            config.health_probe().unwrap().interval(),
            Duration::from_secs(180)
        );
        assert_eq!(config.dolt_port(), 3309);
        assert_eq!(config.agents.len(), 1);
    }
}
