//! The document-editing surface consumed by the build workflow.
//!
//! Everything the orchestrator does to the live document goes through
//! [`DocumentApi`]. [`HistoryScope`] wraps a suspended history scope so the
//! document's history is resumed on every exit path of an action.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::creative::Device;
use crate::error::{BuildError, BuildResult};
use super::model::{DocNode, HistoryRecord};

/// Opaque reference to a captured history state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStateRef(pub String);

impl HistoryStateRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HistoryStateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named history state as reported by the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    pub name: String,
    pub state: HistoryStateRef,
}

impl From<&HistoryRecord> for HistoryState {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            name: record.name.clone(),
            state: HistoryStateRef(record.heads.join(",")),
        }
    }
}

/// Workflow position stored alongside the boards, so a reopened document
/// resumes where the last command left it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub step: usize,
    pub substeps: BTreeMap<Device, u32>,
}

/// A low-level command for batched submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DocCommand {
    Rename { id: String, name: String },
    Translate { id: String, dx: i64, dy: i64 },
    Rasterize { layer_id: String },
    ConvertToEmbedded { layer_id: String },
}

/// Document primitives used by the locator, the propagation engine and the
/// snapshot manager.
pub trait DocumentApi {
    /// Identifier of the underlying document.
    fn document_id(&mut self) -> BuildResult<String>;

    /// Current top-level nodes (with their children) in document order.
    fn nodes(&mut self) -> BuildResult<Vec<DocNode>>;

    /// Duplicates a node next to itself and returns the new node.
    fn duplicate(&mut self, id: &str) -> BuildResult<DocNode>;

    /// Moves a node (and its descendants).
    fn translate(&mut self, id: &str, dx: i64, dy: i64) -> BuildResult<()>;

    /// Renames a node.
    fn rename(&mut self, id: &str, name: &str) -> BuildResult<()>;

    /// Deletes a node and its descendants.
    fn remove(&mut self, id: &str) -> BuildResult<()>;

    /// Rasterizes a vector layer into pixels.
    fn rasterize(&mut self, layer_id: &str) -> BuildResult<()>;

    /// Wraps a layer into an embedded artifact.
    fn convert_to_embedded(&mut self, layer_id: &str) -> BuildResult<()>;

    /// Starts grouping mutations into one history entry named `action_name`.
    fn suspend_history(&mut self, action_name: &str) -> BuildResult<()>;

    /// Ends the current history scope.
    fn resume_history(&mut self) -> BuildResult<()>;

    fn is_history_suspended(&self) -> bool;

    /// Captures a named checkpoint of the document history.
    fn capture_history_state(&mut self, name: &str) -> BuildResult<HistoryStateRef>;

    /// Brings the boards back to a captured checkpoint. Later checkpoints
    /// stay restorable.
    fn restore_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()>;

    /// Drops the most recent checkpoint record pointing at `state`.
    fn forget_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()>;

    /// Lists the captured checkpoints, oldest first.
    fn history_states(&mut self) -> BuildResult<Vec<HistoryState>>;

    /// Deletes every captured checkpoint.
    fn clear_history_states(&mut self) -> BuildResult<()>;

    /// Last recorded workflow position, if any.
    fn progress(&mut self) -> BuildResult<Option<Progress>>;

    fn record_progress(&mut self, progress: &Progress) -> BuildResult<()>;

    /// Submits a batch of low-level commands in order, one result per command.
    /// A failing command does not stop the batch.
    fn submit(&mut self, commands: &[DocCommand]) -> Vec<BuildResult<()>> {
        commands
            .iter()
            .map(|command| match command {
                DocCommand::Rename { id, name } => self.rename(id, name),
                DocCommand::Translate { id, dx, dy } => self.translate(id, *dx, *dy),
                DocCommand::Rasterize { layer_id } => self.rasterize(layer_id),
                DocCommand::ConvertToEmbedded { layer_id } => self.convert_to_embedded(layer_id),
            })
            .collect()
    }
}

// =============================================================================
// HISTORY SCOPE
// =============================================================================

/// A suspended history scope over a document.
///
/// Dereferences to the document; dropping the scope resumes the history.
pub struct HistoryScope<'a, D: DocumentApi + ?Sized> {
    document: &'a mut D,
    label: String,
    active: bool,
}

impl<'a, D: DocumentApi + ?Sized> HistoryScope<'a, D> {
    /// Suspends the document history under `action_name`.
    pub fn suspend(document: &'a mut D, action_name: &str) -> BuildResult<Self> {
        document.suspend_history(action_name)?;
        Ok(Self {
            document,
            label: action_name.to_string(),
            active: true,
        })
    }

    /// Resumes the history explicitly, surfacing any error.
    pub fn finish(mut self) -> BuildResult<()> {
        self.active = false;
        self.document.resume_history()
    }
}

impl<D: DocumentApi + ?Sized> Deref for HistoryScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &*self.document
    }
}

impl<D: DocumentApi + ?Sized> DerefMut for HistoryScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut *self.document
    }
}

impl<D: DocumentApi + ?Sized> Drop for HistoryScope<'_, D> {
    fn drop(&mut self) {
        if !self.active || !self.document.is_history_suspended() {
            return;
        }
        if let Err(err) = self.document.resume_history() {
            tracing::error!(action = %self.label, error = %err, "failed to resume history scope");
        }
    }
}

/// Parses the comma-joined hex heads of a [`HistoryStateRef`].
pub(crate) fn split_heads(state: &HistoryStateRef) -> BuildResult<Vec<String>> {
    let heads: Vec<String> = state
        .as_str()
        .split(',')
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();
    if heads.iter().any(|h| h.len() != 64) {
        return Err(BuildError::history(format!("malformed history state '{}'", state)));
    }
    Ok(heads)
}
