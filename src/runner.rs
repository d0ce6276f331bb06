//! Sequential phase execution.
//!
//! Phases run strictly in declared order, one process at a time. The first
//! failure stops the run: later phases never start, and the output gathered
//! so far is kept in the [`RunReport`] next to the error.

use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::command::{CommandBuilder, FileMaterializer};
use crate::error::{PhasebookError, Result};
use crate::executor::ProcessRunner;
use crate::phase::{PhaseOrder, playbook_path};

/// Phase name -> combined output, in the order phases first ran.
///
/// A phase that runs twice keeps its first position and its latest output.
/// Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResults {
    entries: Vec<(String, String)>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: &str, output: String) {
        match self.entries.iter_mut().find(|(name, _)| name == phase) {
            Some((_, existing)) => *existing = output,
            None => self.entries.push((phase.to_string(), output)),
        }
    }

    pub fn get(&self, phase: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == phase)
            .map(|(_, output)| output.as_str())
    }

    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for RunResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (phase, output) in &self.entries {
            map.serialize_entry(phase, output)?;
        }
        map.end()
    }
}

/// Outcome of a run: everything gathered plus the failure that stopped it
#[derive(Debug)]
pub struct RunReport {
    pub results: RunResults,
    pub failure: Option<PhasebookError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Collapse into the results, or the failure if there was one.
    pub fn into_result(self) -> Result<RunResults> {
        match self.failure {
            None => Ok(self.results),
            Some(err) => Err(err),
        }
    }
}

/// Drives the phases of one run.
pub struct PhaseRunner<'a> {
    playbook_dir: &'a Path,
    builder: CommandBuilder<'a>,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(playbook_dir: &'a Path, builder: CommandBuilder<'a>) -> Self {
        Self {
            playbook_dir,
            builder,
        }
    }

    /// Run every phase of `order` in sequence, stopping at the first failure.
    pub fn run(
        &self,
        order: &PhaseOrder,
        files: &mut dyn FileMaterializer,
        processes: &mut dyn ProcessRunner,
    ) -> RunReport {
        let mut results = RunResults::new();

        for (index, phase) in order.iter().enumerate() {
            match self.run_phase(phase, files, processes) {
                Ok(output) => results.record(phase, output),
                Err(err) => {
                    tracing::error!("{}", err);
                    if index + 1 < order.len() {
                        tracing::warn!("Skipping the remaining phases after {}", phase);
                    }
                    return RunReport {
                        results,
                        failure: Some(err),
                    };
                }
            }
        }

        tracing::info!("All {} phases completed", order.len());
        RunReport {
            results,
            failure: None,
        }
    }

    fn run_phase(
        &self,
        phase: &str,
        files: &mut dyn FileMaterializer,
        processes: &mut dyn ProcessRunner,
    ) -> Result<String> {
        let playbook = playbook_path(self.playbook_dir, phase);
        let command = self.builder.build(&playbook, phase, files)?;
        tracing::info!(
            "Running playbook {} with command: {}",
            playbook.display(),
            command
        );

        let mut output = Vec::new();
        processes
            .run(phase, &command, &mut |chunk| {
                output.extend_from_slice(chunk.bytes())
            })
            .map_err(|e| PhasebookError::phase_execution(phase, e.to_string()))?;

        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}
