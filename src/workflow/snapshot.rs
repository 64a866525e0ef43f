//! Named history checkpoints keyed by step number.
//!
//! Checkpoints live in the document; this manager keeps the ordered list of
//! what was captured in this session along with the step position at capture
//! time. Names are not unique: capturing `Step_2` twice yields two snapshots
//! and a restore by name picks the most recent one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::creative::Device;
use crate::document::{DocumentApi, HistoryStateRef};
use crate::error::{BuildError, BuildResult};

const STEP_PREFIX: &str = "Step_";

/// Conventional name of the checkpoint taken at step `step`.
pub fn snapshot_name(step: usize) -> String {
    format!("{}{}", STEP_PREFIX, step)
}

/// Step number encoded in a conventional snapshot name.
pub fn parse_snapshot_name(name: &str) -> Option<usize> {
    name.strip_prefix(STEP_PREFIX)?.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub step_number: usize,
    pub state: HistoryStateRef,
    /// Sub-step counters at capture time.
    #[serde(default)]
    pub substeps: BTreeMap<Device, u32>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotManager {
    snapshots: Vec<Snapshot>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the list from the checkpoints recorded in the document.
    ///
    /// Records whose name does not follow the `Step_<n>` convention are skipped.
    pub fn from_document(document: &mut dyn DocumentApi) -> BuildResult<Self> {
        let snapshots = document
            .history_states()?
            .into_iter()
            .filter_map(|state| {
                let step_number = parse_snapshot_name(&state.name)?;
                Some(Snapshot {
                    name: state.name,
                    step_number,
                    state: state.state,
                    substeps: BTreeMap::new(),
                })
            })
            .collect();
        Ok(Self { snapshots })
    }

    /// Captures a new checkpoint of the document.
    pub fn capture(
        &mut self,
        document: &mut dyn DocumentApi,
        name: &str,
        step_number: usize,
        substeps: BTreeMap<Device, u32>,
    ) -> BuildResult<&Snapshot> {
        let state = document.capture_history_state(name)?;
        info!(snapshot = %name, step = step_number, "captured snapshot");
        self.snapshots.push(Snapshot {
            name: name.to_string(),
            step_number,
            state,
            substeps,
        });
        self.snapshots
            .last()
            .ok_or_else(|| BuildError::snapshot_not_found(name))
    }

    /// Restores the most recent snapshot named `name`.
    pub fn restore(&self, document: &mut dyn DocumentApi, name: &str) -> BuildResult<&Snapshot> {
        let snapshot = self
            .latest(name)
            .ok_or_else(|| BuildError::snapshot_not_found(name))?;
        document.restore_history_state(&snapshot.state)?;
        info!(snapshot = %name, step = snapshot.step_number, "restored snapshot");
        Ok(snapshot)
    }

    pub fn latest(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|s| s.name == name)
    }

    /// The most recent snapshot overall.
    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn list_all(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Drops the most recent snapshot, in the document as well.
    pub fn discard_last(&mut self, document: &mut dyn DocumentApi) -> BuildResult<()> {
        let Some(snapshot) = self.snapshots.pop() else {
            return Ok(());
        };
        document.forget_history_state(&snapshot.state)?;
        debug!(snapshot = %snapshot.name, "discarded snapshot");
        Ok(())
    }

    /// Deletes every snapshot, in the document as well.
    pub fn clear(&mut self, document: &mut dyn DocumentApi) -> BuildResult<()> {
        document.clear_history_states()?;
        debug!(count = self.snapshots.len(), "cleared snapshots");
        self.snapshots.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Bounds, DocNode, DocumentManager};

    fn document() -> DocumentManager {
        DocumentManager::with_nodes(
            "ad",
            vec![DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600))],
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_names() {
        assert_eq!(snapshot_name(3), "Step_3");
        assert_eq!(parse_snapshot_name("Step_12"), Some(12));
        assert_eq!(parse_snapshot_name("Before export"), None);
    }

    #[test]
    fn test_duplicate_names_restore_latest() {
        let mut doc = document();
        let mut manager = SnapshotManager::new();
        manager
            .capture(&mut doc, "Step_1", 1, BTreeMap::new())
            .unwrap();
        let id = doc.nodes().unwrap()[0].id.clone();
        doc.rename(&id, "D_Rest_2 edited").unwrap();
        manager
            .capture(&mut doc, "Step_1", 1, BTreeMap::new())
            .unwrap();
        assert_eq!(manager.len(), 2);

        doc.rename(&id, "D_Rest_2 again").unwrap();
        manager.restore(&mut doc, "Step_1").unwrap();
        assert_eq!(doc.nodes().unwrap()[0].name, "D_Rest_2 edited");
    }

    #[test]
    fn test_discard_last_forgets_record() {
        let mut doc = document();
        let mut manager = SnapshotManager::new();
        manager.capture(&mut doc, "Step_0", 0, BTreeMap::new()).unwrap();
        manager.capture(&mut doc, "Step_1", 1, BTreeMap::new()).unwrap();

        manager.discard_last(&mut doc).unwrap();
        assert_eq!(manager.last().map(|s| s.name.as_str()), Some("Step_0"));
        let names: Vec<String> = doc.history_states().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Step_0"]);
    }

    #[test]
    fn test_restore_unknown_name() {
        let mut doc = document();
        let manager = SnapshotManager::new();
        assert!(matches!(
            manager.restore(&mut doc, "Step_9"),
            Err(BuildError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_from_document_and_clear() {
        let mut doc = document();
        doc.capture_history_state("Step_0").unwrap();
        doc.capture_history_state("manual").unwrap();
        doc.capture_history_state("Step_2").unwrap();

        let mut manager = SnapshotManager::from_document(&mut doc).unwrap();
        let steps: Vec<usize> = manager.list_all().iter().map(|s| s.step_number).collect();
        assert_eq!(steps, vec![0, 2]);
        assert_eq!(manager.last().map(|s| s.name.as_str()), Some("Step_2"));

        manager.clear(&mut doc).unwrap();
        assert!(manager.is_empty());
        assert!(doc.history_states().unwrap().is_empty());
    }
}
