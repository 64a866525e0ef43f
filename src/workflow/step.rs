//! Build steps and the actions bound to them.

use serde::{Deserialize, Serialize};

use crate::action::FunctionSpec;
use crate::creative::Device;

/// State change applied after an action fully succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCallback {
    /// Move to the next step, clamped to the last one.
    AdvanceStep,
    /// Merge the creative payloads returned by the action into the session.
    MergeCreative,
    /// Increment the sub-step counter of the action's devices.
    AdvanceSubstep,
    /// Zero the sub-step counter of the action's devices.
    ResetSubstep,
}

/// One operation of a build step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    /// History entry name used while the action runs.
    pub label: String,
    /// Device scope; `None` means every configured device.
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub sequences: Vec<String>,
    /// Capture a snapshot before running (only honored by `next`).
    #[serde(default)]
    pub checkpoint: bool,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub callbacks: Vec<StepCallback>,
}

impl ActionDescriptor {
    pub fn new(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            device: None,
            sequences: Vec::new(),
            checkpoint: false,
            functions: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_sequences<I, S>(mut self, sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sequences = sequences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_function(mut self, function: FunctionSpec) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_callbacks<I>(mut self, callbacks: I) -> Self
    where
        I: IntoIterator<Item = StepCallback>,
    {
        self.callbacks = callbacks.into_iter().collect();
        self
    }

    /// Devices this action applies to.
    pub fn device_scope(&self, configured: &[Device]) -> Vec<Device> {
        match self.device {
            Some(device) => vec![device],
            None => configured.to_vec(),
        }
    }
}

/// A stage of the guided build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub directions: String,
    /// Repeatable sub-step operation.
    #[serde(default)]
    pub action: Option<ActionDescriptor>,
    /// Operation that must succeed before the step index advances.
    #[serde(default)]
    pub next_action: Option<ActionDescriptor>,
}

impl BuildStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            directions: String::new(),
            action: None,
            next_action: None,
        }
    }

    pub fn with_directions(mut self, directions: impl Into<String>) -> Self {
        self.directions = directions.into();
        self
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_next_action(mut self, action: ActionDescriptor) -> Self {
        self.next_action = Some(action);
        self
    }
}
