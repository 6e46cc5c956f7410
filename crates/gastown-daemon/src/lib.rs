//! Gas Town supervisor daemon.
//!
//! The daemon is a safety net, not a critical path: polecats transition
//! their own lifecycle state and consumers poll for results. The daemon
//! holds singleton ownership of shared services (the Dolt server, agent
//! sessions), writes a heartbeat, and ticks a set of opt-in patrols on
//! independent timers. It only intervenes on anomalies: crashed children,
//! stale rows, oversized logs.

pub mod daemon;
pub mod lock;
pub mod logwriter;
pub mod patrol;
pub mod patrols;
pub mod state;
pub mod supervise;
