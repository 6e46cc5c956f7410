//! Core components for the Gas Town control plane.
//!
//! Gas Town coordinates fleets of long-lived worker processes ("polecats")
//! that run tasks from a shared issue database and loop back to idle. This
//! crate holds the leaf components of the supervisory control plane and the
//! seams they share:
//!
//! - [`dedup`]: in-memory message deduplication for the witness observer
//! - [`logrotate`]: copy-truncate rotation of child-process log files
//! - [`mail`]: mailbox model and bulk drain of stale protocol messages
//! - [`reaper`]: retention engine for ephemeral wisp rows
//! - [`db`]: SQL access layer for the external Dolt server
//! - [`molecule`]: tracking molecules poured by patrols
//! - [`restart`]: persisted crash-loop accounting for supervised agents
//! - [`session`]: named terminal-multiplexer session handles
//!
//! The daemon and CLI crates compose these; nothing here spawns tasks or
//! owns a runtime.

pub mod config;
pub mod db;
pub mod dedup;
pub mod logrotate;
pub mod mail;
pub mod molecule;
pub mod paths;
pub mod reaper;
pub mod restart;
pub mod session;
pub mod subprocess;
