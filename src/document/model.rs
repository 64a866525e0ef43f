//! Data models for the live board document.
//!
//! These structs use autosurgeon derives for automatic CRDT serialization.
//! Node bounds are absolute canvas coordinates in whole pixels.

use autosurgeon::{Hydrate, Reconcile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// DOCUMENT ROOT
// =============================================================================

/// Root document structure for a creative under construction.
#[derive(Debug, Clone, Default, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct DocumentRoot {
    /// Stable document identifier.
    pub document_id: String,

    /// Human-readable document name.
    pub name: String,

    /// Top-level nodes in document order.
    pub nodes: Vec<DocNode>,

    /// Named history checkpoints, insertion ordered.
    pub history: Vec<HistoryRecord>,

    /// Workflow position reached in this document; absent until a command ran.
    #[serde(default)]
    pub progress: Option<ProgressRecord>,
}

impl DocumentRoot {
    /// Creates a new empty document root with a fresh identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            document_id: Uuid::new_v4().to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the number of top-level nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the document holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds a node anywhere in the tree.
    pub fn find_node(&self, id: &str) -> Option<&DocNode> {
        find_in(&self.nodes, id)
    }

    /// Finds a node anywhere in the tree, mutably.
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut DocNode> {
        find_in_mut(&mut self.nodes, id)
    }

    /// Returns the index path from the root list down to the node.
    pub fn node_path(&self, id: &str) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        if path_in(&self.nodes, id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// Finds a layer on any node.
    pub fn find_layer_mut(&mut self, layer_id: &str) -> Option<&mut Layer> {
        layer_in_mut(&mut self.nodes, layer_id)
    }

    /// Inserts `node` directly after the sibling with id `after`.
    /// Returns false if `after` does not exist.
    pub fn insert_after(&mut self, after: &str, node: DocNode) -> bool {
        insert_after_in(&mut self.nodes, after, node).is_none()
    }

    /// Removes a node (and its descendants) from anywhere in the tree.
    pub fn remove_node(&mut self, id: &str) -> Option<DocNode> {
        remove_in(&mut self.nodes, id)
    }
}

fn find_in<'a>(nodes: &'a [DocNode], id: &str) -> Option<&'a DocNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [DocNode], id: &str) -> Option<&'a mut DocNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    None
}

fn path_in(nodes: &[DocNode], id: &str, path: &mut Vec<usize>) -> bool {
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        if node.id == id || path_in(&node.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn layer_in_mut<'a>(nodes: &'a mut [DocNode], layer_id: &str) -> Option<&'a mut Layer> {
    for node in nodes.iter_mut() {
        if let Some(layer) = node.layers.iter_mut().find(|l| l.id == layer_id) {
            return Some(layer);
        }
        if let Some(layer) = layer_in_mut(&mut node.children, layer_id) {
            return Some(layer);
        }
    }
    None
}

/// Gives the node back when the sibling was not found.
fn insert_after_in(nodes: &mut Vec<DocNode>, after: &str, node: DocNode) -> Option<DocNode> {
    if let Some(index) = nodes.iter().position(|n| n.id == after) {
        nodes.insert(index + 1, node);
        return None;
    }
    let mut node = node;
    for sibling in nodes.iter_mut() {
        match insert_after_in(&mut sibling.children, after, node) {
            None => return None,
            Some(back) => node = back,
        }
    }
    Some(node)
}

fn remove_in(nodes: &mut Vec<DocNode>, id: &str) -> Option<DocNode> {
    if let Some(index) = nodes.iter().position(|n| n.id == id) {
        return Some(nodes.remove(index));
    }
    nodes.iter_mut().find_map(|n| remove_in(&mut n.children, id))
}

// =============================================================================
// NODES
// =============================================================================

/// What a document node is.
#[derive(Debug, Clone, Copy, Reconcile, Hydrate, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A board: one frame/state of the creative.
    Artboard,
    /// A plain container.
    Group,
}

/// A named rectangular region in the document, possibly containing other nodes.
#[derive(Debug, Clone, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct DocNode {
    /// Unique identifier (document handle).
    pub id: String,

    pub name: String,

    pub kind: NodeKind,

    pub bounds: Bounds,

    /// Content layers painted on this node.
    #[serde(default)]
    pub layers: Vec<Layer>,

    /// Nested nodes.
    #[serde(default)]
    pub children: Vec<DocNode>,
}

impl DocNode {
    /// Creates a new artboard with a fresh id.
    pub fn artboard(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind: NodeKind::Artboard,
            bounds,
            layers: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a new group with a fresh id.
    pub fn group(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            kind: NodeKind::Group,
            ..Self::artboard(name, bounds)
        }
    }

    /// Builder: Add a layer.
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Builder: Add a nested node.
    pub fn with_child(mut self, child: DocNode) -> Self {
        self.children.push(child);
        self
    }

    /// Returns a deep copy carrying fresh ids for the node, its layers and its children.
    pub fn duplicate(&self) -> DocNode {
        let mut copy = self.clone();
        copy.name = format!("{} copy", self.name);
        copy.refresh_ids();
        copy
    }

    fn refresh_ids(&mut self) {
        self.id = Uuid::new_v4().to_string();
        for layer in &mut self.layers {
            layer.id = Uuid::new_v4().to_string();
        }
        for child in &mut self.children {
            child.refresh_ids();
        }
    }

    /// Moves this node and all of its descendants.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        self.bounds = self.bounds.offset(dx, dy);
        for child in &mut self.children {
            child.translate(dx, dy);
        }
    }
}

/// Axis-aligned node bounds.
#[derive(Debug, Clone, Copy, Default, Reconcile, Hydrate, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounds {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    pub fn new(left: i64, top: i64, width: i64, height: i64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.top + self.height
    }

    /// Returns the bounds moved by (dx, dy).
    pub fn offset(&self, dx: i64, dy: i64) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            ..*self
        }
    }

    /// True when the interiors overlap. Shared edges do not count.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }
}

// =============================================================================
// LAYERS
// =============================================================================

/// Content type of a layer.
#[derive(Debug, Clone, Copy, Reconcile, Hydrate, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Pixel,
    Text,
    Shape,
    /// A portable embedded artifact (smart object).
    Embedded,
}

/// A content layer on a node.
#[derive(Debug, Clone, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
}

impl Layer {
    /// Creates a new layer with a fresh id.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
        }
    }

    /// True for vector content that must be rasterized before wrapping.
    pub fn needs_rasterize(&self) -> bool {
        matches!(self.kind, LayerKind::Text | LayerKind::Shape)
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// A named history checkpoint stored in the document.
#[derive(Debug, Clone, Default, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub name: String,

    /// Hex-encoded change hashes of the document heads at capture time.
    pub heads: Vec<String>,
}

/// Step position and sub-step counters persisted with the document.
#[derive(Debug, Clone, Default, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    pub step: u64,
    pub substeps: Vec<SubstepRecord>,
}

#[derive(Debug, Clone, Default, Reconcile, Hydrate, Serialize, Deserialize, PartialEq)]
pub struct SubstepRecord {
    /// Device name ("desktop", "mobile").
    pub device: String,
    pub count: u64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_root() -> DocumentRoot {
        let mut root = DocumentRoot::new("test");
        root.nodes.push(DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600)));
        root.nodes.push(
            DocNode::group("Mobile", Bounds::new(0, 2000, 2000, 2000))
                .with_child(DocNode::artboard("M_Rest_2", Bounds::new(0, 2000, 320, 480))),
        );
        root
    }

    #[test]
    fn test_document_root_default() {
        let root = DocumentRoot::default();
        assert!(root.is_empty());
        assert_eq!(root.len(), 0);
    }

    #[test]
    fn test_node_path_into_children() {
        let root = sample_root();
        let mobile_id = root.nodes[1].children[0].id.clone();
        assert_eq!(root.node_path(&mobile_id), Some(vec![1, 0]));
        assert_eq!(root.node_path("missing"), None);
    }

    #[test]
    fn test_insert_after_nested_sibling() {
        let mut root = sample_root();
        let mobile_id = root.nodes[1].children[0].id.clone();
        let copy = root.find_node(&mobile_id).unwrap().duplicate();
        assert!(root.insert_after(&mobile_id, copy));
        assert_eq!(root.nodes[1].children.len(), 2);
        assert_eq!(root.nodes[1].children[1].name, "M_Rest_2 copy");
        assert!(!root.insert_after("missing", DocNode::artboard("x", Bounds::default())));
    }

    #[test]
    fn test_remove_nested_node() {
        let mut root = sample_root();
        let mobile_id = root.nodes[1].children[0].id.clone();
        let removed = root.remove_node(&mobile_id).unwrap();
        assert_eq!(removed.name, "M_Rest_2");
        assert!(root.nodes[1].children.is_empty());
        assert_eq!(root.len(), 2);
        assert!(root.remove_node("missing").is_none());
    }

    #[test]
    fn test_duplicate_refreshes_ids() {
        let node = DocNode::artboard("A", Bounds::new(0, 0, 10, 10))
            .with_layer(Layer::new("headline", LayerKind::Text));
        let copy = node.duplicate();
        assert_ne!(copy.id, node.id);
        assert_ne!(copy.layers[0].id, node.layers[0].id);
        assert_eq!(copy.layers[0].name, "headline");
    }

    #[test]
    fn test_bounds_intersection_ignores_shared_edges() {
        let a = Bounds::new(0, 0, 100, 100);
        assert!(a.intersects(&Bounds::new(50, 50, 100, 100)));
        assert!(!a.intersects(&Bounds::new(100, 0, 100, 100)));
        assert!(!a.intersects(&a.offset(0, 100)));
    }

    #[test]
    fn test_translate_moves_children() {
        let mut root = sample_root();
        root.nodes[1].translate(10, -20);
        assert_eq!(root.nodes[1].children[0].bounds.left, 10);
        assert_eq!(root.nodes[1].children[0].bounds.top, 1980);
    }
}
