//! Sequence registry: the in-memory description of every board chain.
//!
//! A [`Creative`] maps each [`Device`] to its sequences. Every [`Sequence`]
//! keeps its `artboards` sorted ascending by step with no duplicate step.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DeviceProfile, SequenceTemplate, WorkflowConfig};
use crate::document::DocNode;
use crate::error::{BuildError, BuildResult};
use crate::locator::{find_boards, Matcher};

/// Placeholder replaced by the step number in a name pattern.
pub const STEP_PLACEHOLDER: &str = "${step}";

/// Placeholder replaced by the device abbreviation in a sequence template.
pub const DEVICE_PLACEHOLDER: &str = "${device}";

// =============================================================================
// DEVICE
// =============================================================================

/// A platform variant of the creative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Mobile,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Desktop, Device::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Device {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(BuildError::config(format!("unknown device '{}'", other))),
        }
    }
}

// =============================================================================
// BOARD ENTRY
// =============================================================================

/// A board registered at a step of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEntry {
    pub name: String,
    /// Registry entry id.
    pub id: String,
    pub step: u32,
    /// Document node id. The document owns the node.
    pub board_ref: String,
}

impl BoardEntry {
    pub fn new(name: impl Into<String>, step: u32, board_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4().to_string(),
            step,
            board_ref: board_ref.into(),
        }
    }
}

// =============================================================================
// SEQUENCE
// =============================================================================

/// How a sequence grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceShape {
    /// Fixed three slots filled around the middle one.
    Flanking,
    /// New boards are prepended at step 1.
    Growable { limit: Option<u32> },
}

/// An ordered chain of boards for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub device: Device,
    /// Sequence type ("rest", "intro", ...).
    pub name: String,
    /// Board name pattern with a `${step}` placeholder.
    pub name_pattern: String,
    /// `None` for unbounded sequences.
    pub max_steps: Option<u32>,
    pub artboards: Vec<BoardEntry>,
}

impl Sequence {
    pub fn new(
        device: Device,
        name: impl Into<String>,
        name_pattern: impl Into<String>,
        max_steps: Option<u32>,
    ) -> Self {
        Self {
            device,
            name: name.into(),
            name_pattern: name_pattern.into(),
            max_steps,
            artboards: Vec::new(),
        }
    }

    /// Creates an empty sequence from a template, resolving `${device}`.
    pub fn from_template(device: Device, template: &SequenceTemplate, profile: &DeviceProfile) -> Self {
        Self::new(
            device,
            template.name.clone(),
            template
                .pattern
                .replace(DEVICE_PLACEHOLDER, &profile.abbreviation),
            template.max_steps,
        )
    }

    pub fn len(&self) -> usize {
        self.artboards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artboards.is_empty()
    }

    pub fn shape(&self) -> SequenceShape {
        match self.max_steps {
            Some(3) => SequenceShape::Flanking,
            limit => SequenceShape::Growable { limit },
        }
    }

    /// Board name for a step.
    pub fn board_name(&self, step: u32) -> String {
        self.name_pattern.replace(STEP_PLACEHOLDER, &step.to_string())
    }

    /// Regex matching this sequence's board names, capturing the step.
    pub fn step_regex(&self) -> BuildResult<Regex> {
        let (prefix, suffix) = self.name_pattern.split_once(STEP_PLACEHOLDER).ok_or_else(|| {
            BuildError::config(format!(
                "pattern '{}' has no {} placeholder",
                self.name_pattern, STEP_PLACEHOLDER
            ))
        })?;
        Ok(Regex::new(&format!(
            r"^{}(\d+){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))?)
    }

    pub fn entry_at(&self, step: u32) -> Option<&BoardEntry> {
        self.artboards.iter().find(|e| e.step == step)
    }

    /// The most recent board of a growable chain.
    pub fn lowest(&self) -> Option<&BoardEntry> {
        self.artboards.first()
    }

    /// Registers a board, keeping the sort order. Rejects a taken step.
    pub fn insert_entry(&mut self, entry: BoardEntry) -> BuildResult<()> {
        if self.entry_at(entry.step).is_some() {
            return Err(BuildError::duplicate_step(self.name.clone(), entry.step));
        }
        self.artboards.push(entry);
        self.sort_by_step();
        Ok(())
    }

    /// Moves every entry one step later and renames it accordingly.
    pub fn shift_steps(&mut self) {
        for index in 0..self.artboards.len() {
            let step = self.artboards[index].step + 1;
            self.artboards[index].name = self.board_name(step);
            self.artboards[index].step = step;
        }
    }

    pub fn sort_by_step(&mut self) {
        self.artboards.sort_by_key(|e| e.step);
    }

    /// True when sorted ascending by step without duplicates.
    pub fn is_consistent(&self) -> bool {
        self.artboards.windows(2).all(|w| w[0].step < w[1].step)
    }
}

// =============================================================================
// CREATIVE
// =============================================================================

/// The full multi-device, multi-sequence aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creative {
    pub sequences: BTreeMap<Device, BTreeMap<String, Sequence>>,
}

impl Creative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of registered boards.
    pub fn len(&self) -> usize {
        self.sequences
            .values()
            .flat_map(|by_name| by_name.values())
            .map(Sequence::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence(&self, device: Device, name: &str) -> Option<&Sequence> {
        self.sequences.get(&device).and_then(|by_name| by_name.get(name))
    }

    pub fn sequence_mut(&mut self, device: Device, name: &str) -> Option<&mut Sequence> {
        self.sequences
            .get_mut(&device)
            .and_then(|by_name| by_name.get_mut(name))
    }

    /// Returns the sequence, creating it empty from the template on first use.
    pub fn ensure_sequence(
        &mut self,
        device: Device,
        template: &SequenceTemplate,
        profile: &DeviceProfile,
    ) -> &mut Sequence {
        self.sequences
            .entry(device)
            .or_default()
            .entry(template.name.clone())
            .or_insert_with(|| Sequence::from_template(device, template, profile))
    }

    pub fn insert_sequence(&mut self, sequence: Sequence) {
        self.sequences
            .entry(sequence.device)
            .or_default()
            .insert(sequence.name.clone(), sequence);
    }

    /// Takes over every sequence present in `other`.
    pub fn merge(&mut self, other: Creative) {
        for sequence in other.sequences.into_values().flat_map(BTreeMap::into_values) {
            self.insert_sequence(sequence);
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.sequences
            .values()
            .flat_map(|by_name| by_name.values())
            .all(Sequence::is_consistent)
    }

    /// Reconstructs the registry from board names found in the document.
    pub fn rebuild(nodes: &[DocNode], config: &WorkflowConfig) -> BuildResult<Self> {
        let mut creative = Creative::new();
        for (device, profile) in &config.devices {
            for template in &config.sequences {
                let mut sequence = Sequence::from_template(*device, template, profile);
                let regex = sequence.step_regex()?;
                let matcher = Matcher::Pattern(regex.clone());
                for board in find_boards(Some(nodes), None, &matcher) {
                    let step = regex
                        .captures(&board.name)
                        .and_then(|caps| caps.get(1))
                        .and_then(|m| m.as_str().parse::<u32>().ok());
                    let Some(step) = step else { continue };
                    let entry = BoardEntry::new(board.name.clone(), step, board.id.clone());
                    if let Err(err) = sequence.insert_entry(entry) {
                        tracing::warn!(board = %board.name, error = %err, "skipping duplicate board");
                    }
                }
                if !sequence.is_empty() {
                    creative.insert_sequence(sequence);
                }
            }
        }
        Ok(creative)
    }
}
