//! CLI command implementations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use gastown_core::paths;

pub mod daemon;
pub mod mail;

/// Resolve the town root: an explicit flag wins, otherwise walk up from
/// the working directory.
pub fn resolve_town_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root);
    }
    let cwd = std::env::current_dir().context("resolving working directory")?;
    paths::find_town_root(&cwd)
        .context("not in a Gas Town workspace (no mayor/ directory found); pass --town-root")
}
