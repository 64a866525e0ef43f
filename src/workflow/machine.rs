//! Step position tracking for the guided build.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::creative::Device;
use crate::document::Progress;
use crate::error::{BuildError, BuildResult};

use super::step::BuildStep;

/// A user command against the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Next,
    Prev,
    Substep,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Substep => "substep",
        })
    }
}

impl std::str::FromStr for Command {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            "substep" => Ok(Self::Substep),
            other => Err(BuildError::config(format!("unknown command '{}'", other))),
        }
    }
}

/// Current step index and per-device sub-step counters.
///
/// The index always stays within `0..steps.len()`.
#[derive(Debug, Clone)]
pub struct BuildStepMachine {
    steps: Vec<BuildStep>,
    current: usize,
    substeps: BTreeMap<Device, u32>,
}

impl BuildStepMachine {
    pub fn new(steps: Vec<BuildStep>) -> BuildResult<Self> {
        if steps.is_empty() {
            return Err(BuildError::config("workflow has no steps"));
        }
        Ok(Self {
            steps,
            current: 0,
            substeps: BTreeMap::new(),
        })
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &BuildStep {
        &self.steps[self.current]
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.steps.len()
    }

    /// Moves one step forward, clamped to the last step. Returns the new index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1).min(self.steps.len() - 1);
        self.current
    }

    /// Moves one step back, clamped at 0. Returns the new index.
    pub fn retreat(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Jumps to `index`, clamped to the last step.
    pub fn jump_to(&mut self, index: usize) -> usize {
        self.current = index.min(self.steps.len() - 1);
        self.current
    }

    pub fn substep(&self, device: Device) -> u32 {
        self.substeps.get(&device).copied().unwrap_or(0)
    }

    pub fn substeps(&self) -> &BTreeMap<Device, u32> {
        &self.substeps
    }

    pub fn advance_substep(&mut self, device: Device) -> u32 {
        let counter = self.substeps.entry(device).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn reset_substeps(&mut self, devices: &[Device]) {
        for device in devices {
            self.substeps.remove(device);
        }
    }

    pub fn set_substeps(&mut self, substeps: BTreeMap<Device, u32>) {
        self.substeps = substeps;
    }

    /// Position to persist with the document.
    pub fn progress(&self) -> Progress {
        Progress {
            step: self.current,
            substeps: self.substeps.clone(),
        }
    }

    /// Re-enters a persisted position; the step is clamped like `jump_to`.
    pub fn resume(&mut self, progress: Progress) -> usize {
        self.substeps = progress.substeps;
        self.jump_to(progress.step)
    }
}
