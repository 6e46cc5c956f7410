//! The daemon's patrol roster.

pub mod health_probe;
pub mod log_rotation;
pub mod wisp_reaper;

pub use health_probe::HealthProbePatrol;
pub use log_rotation::LogRotationPatrol;
pub use wisp_reaper::WispReaperPatrol;
