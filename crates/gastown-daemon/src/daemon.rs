//! Daemon assembly and main loop.
//!
//! The daemon is deliberately dumb: it holds the singleton lock, writes a
//! heartbeat, ticks patrols, and restarts crashed children. All judgment
//! lives in agents. Losing the singleton race is success, not failure; the
//! caller compares PIDs to find out who won.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use gastown_core::config::DaemonConfig;
use gastown_core::molecule::{BeadsSink, MoleculeSink};
use gastown_core::session::SessionHost;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::lock::{LockError, PidLock};
use crate::patrol::{PatrolContext, PatrolScheduler};
use crate::patrols::{HealthProbePatrol, LogRotationPatrol, WispReaperPatrol};
use crate::state::DaemonState;
use crate::supervise::{ChildSupervisor, SUPERVISION_INTERVAL};

/// Heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Result of trying to become the daemon.
pub enum Launch {
    /// We hold the lock; run the daemon.
    Running(Box<Daemon>),
    /// Another daemon already holds this town root. Exit quietly.
    AlreadyRunning,
}

/// The assembled daemon, holding the singleton lock.
pub struct Daemon {
    town_root: PathBuf,
    config: DaemonConfig,
    _lock: PidLock,
}

impl Daemon {
    /// Acquire the singleton lock and load configuration.
    ///
    /// A config file that exists but cannot be parsed is logged and
    /// replaced by the default (everything disabled); the daemon still
    /// runs as a safety net.
    ///
    /// # Errors
    ///
    /// Returns an error only for terminal conditions: the daemon
    /// directory is not writable.
    pub fn launch(town_root: &Path) -> Result<Launch> {
        let lock = match PidLock::acquire(town_root) {
            Ok(lock) => lock,
            Err(LockError::Held) => return Ok(Launch::AlreadyRunning),
            Err(e @ LockError::Io { .. }) => {
                return Err(anyhow::Error::new(e).context("acquiring daemon lock"))
            }
        };

        let config = match DaemonConfig::load(town_root) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "cannot load daemon.json, running with defaults");
                DaemonConfig::default()
            }
        };

        Ok(Launch::Running(Box::new(Self {
            town_root: town_root.to_path_buf(),
            config,
            _lock: lock,
        })))
    }

    /// Run until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error on supervisor-level invariant violations, chiefly
    /// an unwritable `state.json`.
    pub async fn run(self) -> Result<()> {
        let mut state = DaemonState::starting_now();
        state
            .save(&self.town_root)
            .context("writing initial daemon state")?;

        info!(
            pid = std::process::id(),
            town_root = %self.town_root.display(),
            "daemon started"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let molecules: Arc<dyn MoleculeSink> = Arc::new(BeadsSink::new());
        let ctx = Arc::new(PatrolContext {
            town_root: self.town_root.clone(),
            config: self.config.clone(),
            molecules,
            dolt_port: self.config.dolt_port(),
        });

        let mut scheduler = PatrolScheduler::new();
        scheduler.register(Arc::new(LogRotationPatrol));
        scheduler.register(Arc::new(WispReaperPatrol));
        scheduler.register(Arc::new(HealthProbePatrol));
        let patrol_handles = scheduler.spawn_all(&ctx, &shutdown_rx);

        let supervisor = Arc::new(Mutex::new(ChildSupervisor::new(
            &self.town_root,
            self.config.clone(),
            SessionHost::new(),
        )));
        run_supervision_pass(&supervisor).await;

        let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM")?;
        let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT")?;
        let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP")?;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut supervision = tokio::time::interval(SUPERVISION_INTERVAL);

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT");
                    break;
                }
                _ = sighup.recv() => {
                    info!("received SIGHUP");
                    let supervisor = Arc::clone(&supervisor);
                    let _ = tokio::task::spawn_blocking(move || {
                        supervisor
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .reload_tracker();
                    })
                    .await;
                }
                _ = heartbeat.tick() => {
                    state.beat(Utc::now());
                    // An unwritable state file is the one invariant
                    // violation that terminates the daemon.
                    state
                        .save(&self.town_root)
                        .context("writing heartbeat state")?;
                }
                _ = supervision.tick() => {
                    run_supervision_pass(&supervisor).await;
                }
            }
        }

        info!("shutting down daemon");
        let _ = shutdown_tx.send(true);
        for handle in patrol_handles {
            let _ = handle.await;
        }

        let shutdown_supervisor = Arc::clone(&supervisor);
        let _ = tokio::task::spawn_blocking(move || {
            shutdown_supervisor
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .shutdown();
        })
        .await;

        info!("daemon shutdown complete");
        // The lock drops here and removes the PID file.
        Ok(())
    }
}

async fn run_supervision_pass(supervisor: &Arc<Mutex<ChildSupervisor>>) {
    let supervisor = Arc::clone(supervisor);
    let result = tokio::task::spawn_blocking(move || {
        supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tick();
    })
    .await;
    if let Err(e) = result {
        warn!(error = %e, "supervision pass panicked");
    }
}
