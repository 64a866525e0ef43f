//! Workflow configuration: device profiles, sequence templates and build steps.
//!
//! Configurations are plain JSON. [`WorkflowConfig::standard`] is the built-in
//! four-step ad workflow (rest states, intro, expanded states, review).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::action::FunctionSpec;
use crate::creative::{Device, DEVICE_PLACEHOLDER, STEP_PLACEHOLDER};
use crate::error::{BuildError, BuildResult};
use crate::workflow::step::{ActionDescriptor, BuildStep, StepCallback};

// =============================================================================
// DEVICE PROFILES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i64,
    pub height: i64,
}

/// Placement magnitudes in pixels for one device.
///
/// The distinction between the first and later intro insertions is kept as
/// two constants; they are tuned against the canvas, not derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOffsets {
    /// Horizontal distance of the first intro board from its anchor.
    pub intro_first: i64,
    /// Horizontal distance between consecutive intro boards. Also the
    /// horizontal distance of rest/expanded flanks from their source.
    pub intro_next: i64,
    /// Vertical distance of a flank from its source.
    pub flank_vertical: i64,
    /// Extra spacing used when a placement has to be pushed clear.
    pub gap: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Short name used in board names ("D", "M").
    pub abbreviation: String,
    pub canvas: Size,
    pub offsets: DeviceOffsets,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self {
            abbreviation: "D".to_string(),
            canvas: Size {
                width: 970,
                height: 600,
            },
            offsets: DeviceOffsets {
                intro_first: 2400,
                intro_next: 1200,
                flank_vertical: 1000,
                gap: 100,
            },
        }
    }

    pub fn mobile() -> Self {
        Self {
            abbreviation: "M".to_string(),
            canvas: Size {
                width: 320,
                height: 480,
            },
            offsets: DeviceOffsets {
                intro_first: 1200,
                intro_next: 600,
                flank_vertical: 500,
                gap: 50,
            },
        }
    }
}

// =============================================================================
// SEQUENCE TEMPLATES
// =============================================================================

/// Shape of a sequence, instantiated per device on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub name: String,
    /// Board name pattern; `${device}` and `${step}` are substituted.
    pub pattern: String,
    /// `None` for unbounded sequences.
    #[serde(default)]
    pub max_steps: Option<u32>,
    /// Board an empty growable sequence is cloned from. Supports `${device}`.
    #[serde(default)]
    pub anchor: Option<String>,
}

impl SequenceTemplate {
    pub fn fixed(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            max_steps: Some(3),
            anchor: None,
        }
    }

    pub fn growable(name: &str, pattern: &str, anchor: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            max_steps: None,
            anchor: Some(anchor.to_string()),
        }
    }

    /// Anchor board name for a device.
    pub fn anchor_name(&self, profile: &DeviceProfile) -> Option<String> {
        self.anchor
            .as_ref()
            .map(|a| a.replace(DEVICE_PLACEHOLDER, &profile.abbreviation))
    }
}

// =============================================================================
// WORKFLOW CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub devices: BTreeMap<Device, DeviceProfile>,
    pub sequences: Vec<SequenceTemplate>,
    pub steps: Vec<BuildStep>,
    /// When set, `prev` restores the latest snapshot of the target step.
    #[serde(default)]
    pub prev_restores_snapshot: bool,
}

impl WorkflowConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> BuildResult<Self> {
        let config: WorkflowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> BuildResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> BuildResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn device_list(&self) -> Vec<Device> {
        self.devices.keys().copied().collect()
    }

    pub fn profile(&self, device: Device) -> BuildResult<&DeviceProfile> {
        self.devices
            .get(&device)
            .ok_or_else(|| BuildError::config(format!("no profile for device '{}'", device)))
    }

    pub fn template(&self, name: &str) -> BuildResult<&SequenceTemplate> {
        self.sequences
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| BuildError::config(format!("unknown sequence '{}'", name)))
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> BuildResult<()> {
        if self.steps.is_empty() {
            return Err(BuildError::config("workflow has no steps"));
        }
        if self.devices.is_empty() {
            return Err(BuildError::config("workflow has no devices"));
        }
        for (device, profile) in &self.devices {
            let o = &profile.offsets;
            if o.intro_first <= 0 || o.intro_next <= 0 || o.flank_vertical <= 0 || o.gap < 0 {
                return Err(BuildError::config(format!(
                    "offsets for '{}' must be positive",
                    device
                )));
            }
        }
        for template in &self.sequences {
            if template.pattern.matches(STEP_PLACEHOLDER).count() != 1 {
                return Err(BuildError::config(format!(
                    "pattern '{}' must contain {} exactly once",
                    template.pattern, STEP_PLACEHOLDER
                )));
            }
        }
        for step in &self.steps {
            for descriptor in step.action.iter().chain(step.next_action.iter()) {
                if let Some(device) = descriptor.device {
                    self.profile(device)?;
                }
                for name in &descriptor.sequences {
                    self.template(name)?;
                }
            }
        }
        Ok(())
    }

    /// The built-in ad workflow.
    pub fn standard() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(Device::Desktop, DeviceProfile::desktop());
        devices.insert(Device::Mobile, DeviceProfile::mobile());

        let propagate = |id: &str| FunctionSpec::new(id, "propagate");

        Self {
            devices,
            sequences: vec![
                SequenceTemplate::fixed("rest", "${device}_Rest_${step}"),
                SequenceTemplate::growable("intro", "${device}_Intro_${step}", "${device}_Rest_2"),
                SequenceTemplate::fixed("expanded", "${device}_Expanded_${step}"),
            ],
            steps: vec![
                BuildStep::new("rest", "Rest states")
                    .with_directions(
                        "Name the middle rest board of each device <D|M>_Rest_2, then continue.",
                    )
                    .with_next_action(
                        ActionDescriptor::new("propagate", "Propagate rest states")
                            .with_sequences(["rest"])
                            .with_checkpoint(true)
                            .with_function(propagate("propagate-rest"))
                            .with_callbacks([StepCallback::AdvanceStep, StepCallback::MergeCreative]),
                    ),
                BuildStep::new("intro", "Intro frames")
                    .with_directions("Add intro frames one at a time, then continue.")
                    .with_action(
                        ActionDescriptor::new("propagate", "Add intro frame")
                            .with_sequences(["intro"])
                            .with_function(propagate("propagate-intro"))
                            .with_callbacks([
                                StepCallback::MergeCreative,
                                StepCallback::AdvanceSubstep,
                            ]),
                    )
                    .with_next_action(
                        ActionDescriptor::new("validate", "Check intro frames")
                            .with_checkpoint(true)
                            .with_function(FunctionSpec::new("require-intro", "require_boards").with_options(
                                json!({ "matcher": { "pattern": r"^${device}_Intro_\d+$" }, "min": 1 }),
                            ))
                            .with_callbacks([StepCallback::AdvanceStep, StepCallback::ResetSubstep]),
                    ),
                BuildStep::new("expanded", "Expanded states")
                    .with_directions(
                        "Name the middle expanded board of each device <D|M>_Expanded_2, then continue.",
                    )
                    .with_next_action(
                        ActionDescriptor::new("propagate", "Propagate expanded states")
                            .with_sequences(["expanded"])
                            .with_checkpoint(true)
                            .with_function(propagate("propagate-expanded"))
                            .with_callbacks([StepCallback::AdvanceStep, StepCallback::MergeCreative]),
                    ),
                BuildStep::new("review", "Review").with_directions("All sequences are built."),
            ],
            prev_restores_snapshot: false,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::standard()
    }
}
