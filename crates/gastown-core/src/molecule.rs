//! Tracking molecules poured by patrols.
//!
//! A molecule is a wisp that represents a patrol cycle in progress. The
//! patrol advances through named steps, closing each on success or failing
//! it with a reason. Daemons schedule and record; agents read the molecule
//! and act. Pour failures are advisory: a patrol whose molecule did not
//! pour still runs, it just leaves no tracking record.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::subprocess::{run_tool, ToolError};

/// Formula name for the retention engine's cycle molecule.
pub const MOL_WISP_REAPER: &str = "mol-wisp-reaper";

/// Formula name for the health probe molecule.
pub const MOL_HEALTH_PROBE: &str = "mol-health-probe";

const POUR_TIMEOUT: Duration = Duration::from_secs(10);

/// Where molecule writes land. The production sink shells out to the `bd`
/// issue CLI; tests record in memory.
pub trait MoleculeSink: Send + Sync {
    /// Pour a molecule from `formula`, tagging it with `fields`. Returns
    /// the root wisp ID, or `None` when pouring failed.
    fn pour(&self, formula: &str, fields: &[(String, String)]) -> Option<String>;

    /// Mark a step closed.
    fn close_step(&self, root_id: &str, step: &str);

    /// Mark a step failed with a reason.
    fn fail_step(&self, root_id: &str, step: &str, reason: &str);

    /// Close the molecule itself.
    fn close(&self, root_id: &str);
}

/// A poured molecule bound to its sink.
///
/// All methods are no-ops when the pour failed, so call sites never need to
/// branch on pour success.
pub struct Molecule {
    sink: Arc<dyn MoleculeSink>,
    root_id: String,
}

impl Molecule {
    /// Pour a molecule through `sink`.
    #[must_use]
    pub fn pour(sink: Arc<dyn MoleculeSink>, formula: &str, fields: &[(String, String)]) -> Self {
        let root_id = sink.pour(formula, fields).unwrap_or_default();
        Self { sink, root_id }
    }

    /// Whether the pour produced a tracking record.
    #[must_use]
    pub fn is_poured(&self) -> bool {
        !self.root_id.is_empty()
    }

    /// Root wisp ID, empty when the pour failed.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Mark `step` closed.
    pub fn close_step(&self, step: &str) {
        if self.is_poured() {
            self.sink.close_step(&self.root_id, step);
        }
    }

    /// Mark `step` failed with `reason`.
    pub fn fail_step(&self, step: &str, reason: &str) {
        if self.is_poured() {
            self.sink.fail_step(&self.root_id, step, reason);
        }
    }

    /// Close the molecule.
    pub fn close(&self) {
        if self.is_poured() {
            self.sink.close(&self.root_id);
        }
    }
}

/// Sink that discards every write. Useful for one-shot CLI paths that do
/// not track cycles.
#[derive(Debug, Default)]
pub struct NullSink;

impl MoleculeSink for NullSink {
    fn pour(&self, _formula: &str, _fields: &[(String, String)]) -> Option<String> {
        None
    }
    fn close_step(&self, _root_id: &str, _step: &str) {}
    fn fail_step(&self, _root_id: &str, _step: &str, _reason: &str) {}
    fn close(&self, _root_id: &str) {}
}

/// Production sink: drives the `bd` issue CLI.
#[derive(Debug)]
pub struct BeadsSink {
    bin: String,
}

impl BeadsSink {
    /// Sink using the `bd` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self { bin: "bd".into() }
    }

    fn run(&self, args: &[&str]) -> Option<String> {
        match run_tool(&self.bin, args, POUR_TIMEOUT) {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(out) => {
                warn!(
                    tool = %self.bin,
                    exit_code = out.exit_code,
                    stderr = %out.stderr.trim(),
                    "molecule write failed"
                );
                None
            }
            Err(ToolError::NotFound(tool)) => {
                warn!(%tool, "molecule sink tool not installed");
                None
            }
            Err(e) => {
                warn!(error = %e, "molecule write failed");
                None
            }
        }
    }
}

impl Default for BeadsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MoleculeSink for BeadsSink {
    fn pour(&self, formula: &str, fields: &[(String, String)]) -> Option<String> {
        let mut args = vec!["mol", "pour", formula, "--json"];
        let rendered: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        for field in &rendered {
            args.push("--field");
            args.push(field);
        }

        let stdout = self.run(&args)?;
        match serde_json::from_str::<serde_json::Value>(&stdout) {
            Ok(json) => json
                .get("id")
                .and_then(|id| id.as_str())
                .map(ToString::to_string),
            Err(e) => {
                warn!(error = %e, "molecule pour returned unparsable output");
                None
            }
        }
    }

    fn close_step(&self, root_id: &str, step: &str) {
        let _ = self.run(&["mol", "close-step", root_id, step]);
    }

    fn fail_step(&self, root_id: &str, step: &str, reason: &str) {
        let _ = self.run(&["mol", "fail-step", root_id, step, "--reason", reason]);
    }

    fn close(&self, root_id: &str) {
        let _ = self.run(&["mol", "close", root_id]);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::MoleculeSink;

    /// Records every sink call for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<String>>,
    }

    impl MoleculeSink for RecordingSink {
        fn pour(&self, formula: &str, _fields: &[(String, String)]) -> Option<String> {
            self.events.lock().unwrap().push(format!("pour {formula}"));
            Some("mol-1".to_string())
        }

        fn close_step(&self, root_id: &str, step: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("close {root_id} {step}"));
        }

        fn fail_step(&self, root_id: &str, step: &str, reason: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {root_id} {step}: {reason}"));
        }

        fn close(&self, root_id: &str) {
            self.events.lock().unwrap().push(format!("done {root_id}"));
        }
    }
}
