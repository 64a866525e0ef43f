//! Automerge-backed implementation of the document API.
//!
//! This module provides the `DocumentManager` struct that wraps an Automerge
//! document and provides:
//! - Structural edits (duplicate, translate, layer conversion) via autosurgeon
//!   hydrate/reconcile
//! - Targeted renames via direct put operations along the node path
//! - History scopes committed as one named Automerge change
//! - Checkpoints as change-hash heads; a restore reads the boards at those
//!   heads and writes them back as a new change, so history only grows

use automerge::{
    transaction::{CommitOptions, Transactable},
    AutoCommit, ChangeHash, ObjId, ReadDoc, ScalarValue, Value, ROOT,
};
use autosurgeon::{hydrate, reconcile};

use crate::creative::Device;
use crate::error::{BuildError, BuildResult};
use super::api::{split_heads, DocumentApi, HistoryState, HistoryStateRef, Progress};
use super::model::{DocNode, DocumentRoot, HistoryRecord, LayerKind, ProgressRecord, SubstepRecord};

/// The live board document.
///
/// Outside a history scope every mutation is committed as its own change,
/// labelled with the primitive that produced it. Inside a scope all
/// mutations land in one change labelled with the scope's action name.
pub struct DocumentManager {
    doc: AutoCommit,
    /// Cached hydrated state - invalidated after direct document mutations.
    cached_state: Option<DocumentRoot>,
    /// Cached ObjId for the "nodes" list. Invalidated on load and restore.
    cached_nodes_obj: Option<ObjId>,
    /// Label of the open history scope.
    suspended: Option<String>,
}

impl DocumentManager {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Creates a new empty document.
    pub fn new(name: &str) -> BuildResult<Self> {
        Self::with_root(DocumentRoot::new(name))
    }

    /// Creates a document holding the given top-level nodes.
    pub fn with_nodes(name: &str, nodes: Vec<DocNode>) -> BuildResult<Self> {
        let mut root = DocumentRoot::new(name);
        root.nodes = nodes;
        Self::with_root(root)
    }

    fn with_root(root: DocumentRoot) -> BuildResult<Self> {
        let mut doc = AutoCommit::new();
        reconcile(&mut doc, &root)?;
        doc.commit_with(CommitOptions::default().with_message("Open document".to_string()));
        Ok(Self {
            doc,
            cached_state: Some(root),
            cached_nodes_obj: None,
            suspended: None,
        })
    }

    /// Creates a DocumentManager from saved binary data.
    pub fn from_bytes(bytes: &[u8]) -> BuildResult<Self> {
        let doc = AutoCommit::load(bytes)?;
        Ok(Self {
            doc,
            cached_state: None,
            cached_nodes_obj: None,
            suspended: None,
        })
    }

    /// Saves the document to binary format.
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Returns the current heads.
    pub fn get_heads(&mut self) -> Vec<ChangeHash> {
        self.doc.get_heads()
    }

    /// Commit messages of every change, oldest first.
    pub fn change_messages(&mut self) -> Vec<String> {
        self.doc
            .get_changes(&[])
            .iter()
            .filter_map(|change| change.message().map(|m| m.to_string()))
            .collect()
    }

    /// Invalidates all caches. Call after any operation that replaces the document.
    fn invalidate_all_caches(&mut self) {
        self.cached_state = None;
        self.cached_nodes_obj = None;
    }

    // =========================================================================
    // HIGH-LEVEL OPERATIONS (via Hydrate/Reconcile)
    // =========================================================================

    /// Hydrates the entire document state to Rust structs.
    pub fn get_state(&mut self) -> BuildResult<DocumentRoot> {
        if let Some(ref cached) = self.cached_state {
            return Ok(cached.clone());
        }
        let state: DocumentRoot = hydrate(&self.doc)?;
        self.cached_state = Some(state.clone());
        Ok(state)
    }

    /// Applies a fallible mutation to the state, then reconciles back to the document.
    /// Nothing is written when `f` fails.
    pub fn update_state<F, T>(&mut self, label: &str, f: F) -> BuildResult<T>
    where
        F: FnOnce(&mut DocumentRoot) -> BuildResult<T>,
    {
        let mut state = self.get_state()?;
        let out = f(&mut state)?;
        reconcile(&mut self.doc, &state)?;
        self.cached_state = Some(state);
        self.commit_unless_suspended(label);
        Ok(out)
    }

    /// Appends a top-level node.
    pub fn add_node(&mut self, node: DocNode) -> BuildResult<()> {
        self.update_state("Add board", |state| {
            state.nodes.push(node);
            Ok(())
        })
    }

    /// Gets a node by id.
    pub fn get_node(&mut self, id: &str) -> BuildResult<Option<DocNode>> {
        let state = self.get_state()?;
        Ok(state.find_node(id).cloned())
    }

    // =========================================================================
    // INTERNAL HELPERS - WITH TOPOLOGY CACHING
    // =========================================================================

    fn commit_unless_suspended(&mut self, label: &str) {
        if self.suspended.is_none() {
            self.doc
                .commit_with(CommitOptions::default().with_message(label.to_string()));
        }
    }

    /// Gets the cached "nodes" list ObjId, or discovers it.
    fn get_nodes_obj(&mut self) -> BuildResult<ObjId> {
        if let Some(ref obj) = self.cached_nodes_obj {
            return Ok(obj.clone());
        }
        let obj = self.get_obj_at_key(&ROOT, "nodes")?;
        self.cached_nodes_obj = Some(obj.clone());
        Ok(obj)
    }

    /// Walks the index path down the node tree to the node's map object.
    fn get_node_obj(&mut self, id: &str) -> BuildResult<ObjId> {
        let path = self
            .get_state()?
            .node_path(id)
            .ok_or_else(|| BuildError::board_not_found(id))?;
        let mut list = self.get_nodes_obj()?;
        let mut node = None;
        for index in path {
            if let Some(parent) = node.take() {
                list = self.get_obj_at_key(&parent, "children")?;
            }
            node = Some(self.get_obj_at_index(&list, index)?);
        }
        node.ok_or_else(|| BuildError::board_not_found(id))
    }

    /// Gets an object ID at a map key.
    fn get_obj_at_key(&self, parent: &ObjId, key: &str) -> BuildResult<ObjId> {
        match self.doc.get(parent, key)? {
            Some((Value::Object(_), obj_id)) => Ok(obj_id),
            Some(_) => Err(BuildError::schema_violation(format!(
                "'{}' is not an object",
                key
            ))),
            None => Err(BuildError::field_not_found(key)),
        }
    }

    /// Gets an object ID at a list index.
    fn get_obj_at_index(&self, list: &ObjId, index: usize) -> BuildResult<ObjId> {
        match self.doc.get(list, index)? {
            Some((Value::Object(_), obj_id)) => Ok(obj_id),
            Some(_) => Err(BuildError::schema_violation(format!(
                "list entry {} is not an object",
                index
            ))),
            None => Err(BuildError::field_not_found(format!("[{}]", index))),
        }
    }

    fn set_layer_kind(&mut self, label: &str, layer_id: &str, kind: LayerKind) -> BuildResult<()> {
        self.update_state(label, |state| {
            let layer = state
                .find_layer_mut(layer_id)
                .ok_or_else(|| BuildError::layer_not_found(layer_id))?;
            layer.kind = kind;
            Ok(())
        })
    }
}

fn decode_heads(state: &HistoryStateRef) -> BuildResult<Vec<ChangeHash>> {
    split_heads(state)?
        .iter()
        .map(|head| {
            let bytes = hex::decode(head)
                .map_err(|e| BuildError::history(format!("bad change hash '{}': {}", head, e)))?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            Ok(ChangeHash(arr))
        })
        .collect()
}

// =============================================================================
// DOCUMENT API
// =============================================================================

impl DocumentApi for DocumentManager {
    fn document_id(&mut self) -> BuildResult<String> {
        Ok(self.get_state()?.document_id)
    }

    fn nodes(&mut self) -> BuildResult<Vec<DocNode>> {
        Ok(self.get_state()?.nodes)
    }

    fn duplicate(&mut self, id: &str) -> BuildResult<DocNode> {
        self.update_state("Duplicate board", |state| {
            let copy = state
                .find_node(id)
                .map(DocNode::duplicate)
                .ok_or_else(|| BuildError::board_not_found(id))?;
            state.insert_after(id, copy.clone());
            Ok(copy)
        })
    }

    fn translate(&mut self, id: &str, dx: i64, dy: i64) -> BuildResult<()> {
        self.update_state("Move board", |state| {
            state
                .find_node_mut(id)
                .ok_or_else(|| BuildError::board_not_found(id))?
                .translate(dx, dy);
            Ok(())
        })
    }

    fn remove(&mut self, id: &str) -> BuildResult<()> {
        self.update_state("Delete board", |state| {
            state
                .remove_node(id)
                .map(|_| ())
                .ok_or_else(|| BuildError::board_not_found(id))
        })
    }

    /// Targeted O(1) put on the node's name field.
    fn rename(&mut self, id: &str, name: &str) -> BuildResult<()> {
        let node_obj = self.get_node_obj(id)?;
        self.cached_state = None;
        self.doc.put(&node_obj, "name", ScalarValue::Str(name.into()))?;
        self.commit_unless_suspended("Rename board");
        Ok(())
    }

    fn rasterize(&mut self, layer_id: &str) -> BuildResult<()> {
        self.set_layer_kind("Rasterize layer", layer_id, LayerKind::Pixel)
    }

    fn convert_to_embedded(&mut self, layer_id: &str) -> BuildResult<()> {
        self.set_layer_kind("Convert to embedded", layer_id, LayerKind::Embedded)
    }

    fn suspend_history(&mut self, action_name: &str) -> BuildResult<()> {
        if let Some(ref open) = self.suspended {
            return Err(BuildError::history(format!(
                "cannot suspend '{}': '{}' is still open",
                action_name, open
            )));
        }
        self.suspended = Some(action_name.to_string());
        Ok(())
    }

    fn resume_history(&mut self) -> BuildResult<()> {
        let label = self
            .suspended
            .take()
            .ok_or_else(|| BuildError::history("no suspended history scope"))?;
        self.doc.commit_with(CommitOptions::default().with_message(label));
        Ok(())
    }

    fn is_history_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    fn capture_history_state(&mut self, name: &str) -> BuildResult<HistoryStateRef> {
        if self.suspended.is_some() {
            return Err(BuildError::history("cannot capture inside a suspended scope"));
        }
        let heads: Vec<String> = self
            .doc
            .get_heads()
            .iter()
            .map(|h| hex::encode(h.0))
            .collect();
        let record = HistoryRecord {
            name: name.to_string(),
            heads,
        };
        let state = HistoryState::from(&record).state;
        self.update_state("Capture snapshot", |root| {
            root.history.push(record);
            Ok(())
        })?;
        Ok(state)
    }

    fn restore_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()> {
        if self.suspended.is_some() {
            return Err(BuildError::history("cannot restore inside a suspended scope"));
        }
        let heads = decode_heads(state)?;
        let past: DocumentRoot = hydrate(&self.doc.fork_at(&heads)?)?;
        self.invalidate_all_caches();
        // Only the boards travel back; records and progress stay current.
        self.update_state("Restore snapshot", |root| {
            root.nodes = past.nodes;
            Ok(())
        })
    }

    fn forget_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()> {
        self.update_state("Forget snapshot", |root| {
            let index = root
                .history
                .iter()
                .rposition(|record| HistoryState::from(record).state == *state)
                .ok_or_else(|| BuildError::snapshot_not_found(state.as_str()))?;
            root.history.remove(index);
            Ok(())
        })
    }

    fn history_states(&mut self) -> BuildResult<Vec<HistoryState>> {
        Ok(self
            .get_state()?
            .history
            .iter()
            .map(HistoryState::from)
            .collect())
    }

    fn clear_history_states(&mut self) -> BuildResult<()> {
        self.update_state("Clear snapshots", |root| {
            root.history.clear();
            Ok(())
        })
    }

    fn progress(&mut self) -> BuildResult<Option<Progress>> {
        let Some(record) = self.get_state()?.progress else {
            return Ok(None);
        };
        let substeps = record
            .substeps
            .iter()
            .map(|s| -> BuildResult<(Device, u32)> { Ok((s.device.parse()?, s.count as u32)) })
            .collect::<BuildResult<_>>()?;
        Ok(Some(Progress {
            step: record.step as usize,
            substeps,
        }))
    }

    fn record_progress(&mut self, progress: &Progress) -> BuildResult<()> {
        let record = ProgressRecord {
            step: progress.step as u64,
            substeps: progress
                .substeps
                .iter()
                .map(|(device, count)| SubstepRecord {
                    device: device.to_string(),
                    count: u64::from(*count),
                })
                .collect(),
        };
        self.update_state("Record progress", |root| {
            root.progress = Some(record);
            Ok(())
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::api::{DocCommand, HistoryScope};
    use crate::document::model::{Bounds, Layer};

    fn manager_with_board() -> (DocumentManager, String) {
        let board = DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600))
            .with_layer(Layer::new("headline", LayerKind::Text))
            .with_layer(Layer::new("photo", LayerKind::Pixel));
        let id = board.id.clone();
        let manager = DocumentManager::with_nodes("test", vec![board]).unwrap();
        (manager, id)
    }

    #[test]
    fn test_duplicate_inserts_after_source() {
        let (mut manager, id) = manager_with_board();
        let copy = manager.duplicate(&id).unwrap();

        let nodes = manager.nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].id, copy.id);
        assert_eq!(nodes[1].name, "D_Rest_2 copy");
        assert_eq!(nodes[1].bounds, nodes[0].bounds);
    }

    #[test]
    fn test_targeted_rename_nested() {
        let child = DocNode::artboard("M_Rest_2", Bounds::new(0, 0, 320, 480));
        let child_id = child.id.clone();
        let group = DocNode::group("Mobile", Bounds::new(0, 0, 2000, 2000)).with_child(child);
        let mut manager = DocumentManager::with_nodes("test", vec![group]).unwrap();

        manager.rename(&child_id, "M_Intro_1").unwrap();
        let node = manager.get_node(&child_id).unwrap().unwrap();
        assert_eq!(node.name, "M_Intro_1");
        assert!(matches!(
            manager.rename("missing", "x"),
            Err(BuildError::BoardNotFound(_))
        ));
    }

    #[test]
    fn test_translate_and_layer_conversion() {
        let (mut manager, id) = manager_with_board();
        manager.translate(&id, 100, -50).unwrap();
        let node = manager.get_node(&id).unwrap().unwrap();
        assert_eq!(node.bounds, Bounds::new(100, -50, 970, 600));

        let text_id = node.layers[0].id.clone();
        manager.rasterize(&text_id).unwrap();
        manager.convert_to_embedded(&text_id).unwrap();
        let node = manager.get_node(&id).unwrap().unwrap();
        assert_eq!(node.layers[0].kind, LayerKind::Embedded);
    }

    #[test]
    fn test_submit_reports_each_command() {
        let (mut manager, id) = manager_with_board();
        let results = manager.submit(&[
            DocCommand::Rename {
                id: id.clone(),
                name: "renamed".to_string(),
            },
            DocCommand::Rasterize {
                layer_id: "missing".to_string(),
            },
            DocCommand::Translate { id, dx: 5, dy: 5 },
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BuildError::LayerNotFound(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_history_scope_groups_changes() {
        let (mut manager, id) = manager_with_board();
        {
            let mut scope = HistoryScope::suspend(&mut manager, "Propagate rest").unwrap();
            scope.rename(&id, "a").unwrap();
            scope.translate(&id, 10, 0).unwrap();
            scope.finish().unwrap();
        }
        assert!(!manager.is_history_suspended());
        let messages = manager.change_messages();
        assert_eq!(messages.last().map(String::as_str), Some("Propagate rest"));
        assert!(!messages.iter().any(|m| m == "Rename board"));
    }

    #[test]
    fn test_history_scope_resumes_on_error_path() {
        let (mut manager, _) = manager_with_board();
        let result: BuildResult<()> = (|| {
            let mut scope = HistoryScope::suspend(&mut manager, "Failing action")?;
            scope.rename("missing", "x")?;
            scope.finish()
        })();
        assert!(result.is_err());
        assert!(!manager.is_history_suspended());
        assert!(manager.suspend_history("next").is_ok());
    }

    #[test]
    fn test_nested_suspend_rejected() {
        let (mut manager, _) = manager_with_board();
        manager.suspend_history("outer").unwrap();
        assert!(matches!(
            manager.suspend_history("inner"),
            Err(BuildError::History(_))
        ));
        assert!(manager.capture_history_state("Step_0").is_err());
        manager.resume_history().unwrap();
        assert!(manager.resume_history().is_err());
    }

    #[test]
    fn test_capture_and_restore_keeps_records() {
        let (mut manager, id) = manager_with_board();
        let checkpoint = manager.capture_history_state("Step_0").unwrap();

        manager.duplicate(&id).unwrap();
        manager.rename(&id, "changed").unwrap();
        let later = manager.capture_history_state("Step_1").unwrap();
        assert_eq!(manager.nodes().unwrap().len(), 2);

        manager.restore_history_state(&checkpoint).unwrap();
        let nodes = manager.nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "D_Rest_2");

        // Going back did not discard the later checkpoint.
        manager.restore_history_state(&later).unwrap();
        let nodes = manager.nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "changed");
        assert_eq!(
            manager.change_messages().last().map(String::as_str),
            Some("Restore snapshot")
        );

        let names: Vec<String> = manager
            .history_states()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Step_0", "Step_1"]);

        manager.clear_history_states().unwrap();
        assert!(manager.history_states().unwrap().is_empty());
    }

    #[test]
    fn test_restore_survives_save_and_load() {
        let (mut manager, id) = manager_with_board();
        let first = manager.capture_history_state("Step_0").unwrap();
        manager.duplicate(&id).unwrap();
        let second = manager.capture_history_state("Step_1").unwrap();
        manager.restore_history_state(&first).unwrap();

        let mut loaded = DocumentManager::from_bytes(&manager.save()).unwrap();
        assert_eq!(loaded.nodes().unwrap().len(), 1);
        loaded.restore_history_state(&second).unwrap();
        assert_eq!(loaded.nodes().unwrap().len(), 2);
    }

    #[test]
    fn test_forget_drops_latest_matching_record() {
        let (mut manager, _) = manager_with_board();
        manager.capture_history_state("Step_0").unwrap();
        let state = manager.capture_history_state("Step_0").unwrap();
        manager.forget_history_state(&state).unwrap();
        assert_eq!(manager.history_states().unwrap().len(), 1);
        assert!(matches!(
            manager.forget_history_state(&HistoryStateRef("00".repeat(32))),
            Err(BuildError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_remove_board() {
        let (mut manager, id) = manager_with_board();
        let copy = manager.duplicate(&id).unwrap();
        manager.remove(&copy.id).unwrap();
        assert_eq!(manager.nodes().unwrap().len(), 1);
        assert!(matches!(
            manager.remove(&copy.id),
            Err(BuildError::BoardNotFound(_))
        ));
    }

    #[test]
    fn test_progress_round_trip() {
        let (mut manager, _) = manager_with_board();
        assert_eq!(manager.progress().unwrap(), None);

        let mut progress = Progress {
            step: 2,
            ..Default::default()
        };
        progress.substeps.insert(Device::Mobile, 3);
        manager.record_progress(&progress).unwrap();

        let mut loaded = DocumentManager::from_bytes(&manager.save()).unwrap();
        assert_eq!(loaded.progress().unwrap(), Some(progress));
    }

    #[test]
    fn test_save_and_load() {
        let (mut manager, id) = manager_with_board();
        manager.capture_history_state("Step_0").unwrap();
        let bytes = manager.save();

        let mut loaded = DocumentManager::from_bytes(&bytes).unwrap();
        assert!(loaded.get_node(&id).unwrap().is_some());
        assert_eq!(loaded.history_states().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_state_ref() {
        let (mut manager, _) = manager_with_board();
        let bad = HistoryStateRef("abc".to_string());
        assert!(matches!(
            manager.restore_history_state(&bad),
            Err(BuildError::History(_))
        ));
    }
}
