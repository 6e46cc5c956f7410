//! Patrol framework: opt-in periodic tasks on independent tickers.
//!
//! A patrol is data-driven: the daemon owns a registry, and a patrol runs
//! iff its config block exists with `enabled: true`. Each enabled patrol
//! gets its own tokio task and ticker; ticks that fire while a run is
//! still in progress are dropped, never queued, so a slow patrol cannot
//! build a backlog. Patrol bodies are synchronous (database and file I/O)
//! and execute on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gastown_core::config::DaemonConfig;
use gastown_core::molecule::MoleculeSink;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Everything a patrol tick may touch.
pub struct PatrolContext {
    /// Town root this daemon serves.
    pub town_root: PathBuf,
    /// Daemon configuration, loaded at startup.
    pub config: DaemonConfig,
    /// Sink for tracking molecules.
    pub molecules: Arc<dyn MoleculeSink>,
    /// Port of the Dolt server the patrols talk to.
    pub dolt_port: u16,
}

/// A periodic task owned by the daemon.
///
/// Patrols never panic the daemon: `run` catches and logs its own
/// failures, reporting them through the cycle molecule where one exists.
pub trait Patrol: Send + Sync + 'static {
    /// Config-facing name, e.g. `"wisp_reaper"`.
    fn name(&self) -> &'static str;

    /// Effective tick interval under this config.
    fn interval(&self, config: &DaemonConfig) -> Duration;

    /// Whether the patrol is enabled. Opt-in by default.
    fn enabled(&self, config: &DaemonConfig) -> bool {
        config.patrol_enabled(self.name())
    }

    /// One tick. Runs on the blocking pool; at most one tick per patrol is
    /// active at any time.
    fn run(&self, ctx: &PatrolContext);
}

/// Registry plus spawner for all patrols.
#[derive(Default)]
pub struct PatrolScheduler {
    patrols: Vec<Arc<dyn Patrol>>,
}

impl PatrolScheduler {
    /// Empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a patrol to the registry.
    pub fn register(&mut self, patrol: Arc<dyn Patrol>) {
        self.patrols.push(patrol);
    }

    /// Registered patrol names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.patrols.iter().map(|p| p.name()).collect()
    }

    /// Spawn one ticker task per enabled patrol. Disabled patrols are
    /// logged and skipped. Tasks exit when `shutdown` flips to true.
    pub fn spawn_all(
        &self,
        ctx: &Arc<PatrolContext>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for patrol in &self.patrols {
            if !patrol.enabled(&ctx.config) {
                info!(patrol = patrol.name(), "patrol disabled");
                continue;
            }
            let interval = patrol.interval(&ctx.config);
            info!(patrol = patrol.name(), ?interval, "patrol enabled");
            handles.push(spawn_ticker(
                Arc::clone(patrol),
                interval,
                Arc::clone(ctx),
                shutdown.clone(),
            ));
        }

        handles
    }
}

fn spawn_ticker(
    patrol: Arc<dyn Patrol>,
    interval: Duration,
    ctx: Arc<PatrolContext>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Drop overlapping ticks instead of queueing them.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so patrols
        // fire one interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the daemon is gone; stop too.
                    if changed.is_err() || *shutdown.borrow() {
                        info!(patrol = patrol.name(), "patrol stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let patrol = Arc::clone(&patrol);
                    let ctx = Arc::clone(&ctx);
                    let name = patrol.name();
                    // Awaiting the blocking run keeps at most one tick of
                    // this patrol in flight; Skip drops the ones we miss.
                    let result = tokio::task::spawn_blocking(move || patrol.run(&ctx)).await;
                    if let Err(e) = result {
                        warn!(patrol = name, error = %e, "patrol tick panicked");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use gastown_core::config::{PatrolsConfig, WispReaperConfig};
    use gastown_core::molecule::NullSink;

    use super::*;

    struct CountingPatrol {
        ticks: Arc<AtomicU32>,
        delay: Duration,
    }

    impl Patrol for CountingPatrol {
        fn name(&self) -> &'static str {
            "wisp_reaper"
        }

        fn interval(&self, _config: &DaemonConfig) -> Duration {
            Duration::from_millis(50)
        }

        fn run(&self, _ctx: &PatrolContext) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
        }
    }

    fn ctx_with_reaper_enabled() -> Arc<PatrolContext> {
        Arc::new(PatrolContext {
            town_root: PathBuf::from("/tmp/town"),
            config: DaemonConfig {
                patrols: Some(PatrolsConfig {
                    wisp_reaper: Some(WispReaperConfig {
                        enabled: true,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            molecules: Arc::new(NullSink),
            dolt_port: 3307,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_patrol_never_spawns() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut scheduler = PatrolScheduler::new();
        scheduler.register(Arc::new(CountingPatrol {
            ticks: Arc::clone(&ticks),
            delay: Duration::ZERO,
        }));

        let ctx = Arc::new(PatrolContext {
            town_root: PathBuf::from("/tmp/town"),
            config: DaemonConfig::default(),
            molecules: Arc::new(NullSink),
            dolt_port: 3307,
        });
        let (_tx, rx) = watch::channel(false);
        let handles = scheduler.spawn_all(&ctx, &rx);
        assert!(handles.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn enabled_patrol_ticks_and_stops_on_shutdown() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut scheduler = PatrolScheduler::new();
        scheduler.register(Arc::new(CountingPatrol {
            ticks: Arc::clone(&ticks),
            delay: Duration::ZERO,
        }));

        let ctx = ctx_with_reaper_enabled();
        let (tx, rx) = watch::channel(false);
        let handles = scheduler.spawn_all(&ctx, &rx);
        assert_eq!(handles.len(), 1);

        tokio::time::sleep(Duration::from_millis(180)).await;
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        let count = ticks.load(Ordering::SeqCst);
        assert!(count >= 2, "expected at least two ticks, got {count}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_ticks_are_dropped_not_queued() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut scheduler = PatrolScheduler::new();
        scheduler.register(Arc::new(CountingPatrol {
            ticks: Arc::clone(&ticks),
            // Each run spans several intervals.
            delay: Duration::from_millis(150),
        }));

        let ctx = ctx_with_reaper_enabled();
        let (tx, rx) = watch::channel(false);
        let handles = scheduler.spawn_all(&ctx, &rx);

        tokio::time::sleep(Duration::from_millis(400)).await;
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        // 400ms / 50ms interval would be ~8 ticks if queued; with drops a
        // 150ms run admits at most one tick per ~200ms.
        let count = ticks.load(Ordering::SeqCst);
        assert!(count <= 3, "overlapping ticks must be dropped, got {count}");
    }
}
