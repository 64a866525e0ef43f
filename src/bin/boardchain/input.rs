//! Input structs for seeding a document from a template JSON file.
//!
//! The template lists boards with flat coordinates:
//!
//! ```json
//! { "name": "Spring campaign",
//!   "boards": [ { "name": "D_Rest_2", "x": 0, "y": 0, "width": 970, "height": 600,
//!                 "layers": [ { "name": "headline", "kind": "text" } ] } ] }
//! ```

use serde::Deserialize;

use boardchain::document::{Bounds, DocNode, Layer, LayerKind};

#[derive(Debug, Deserialize)]
pub struct InputTemplate {
    pub name: String,
    pub boards: Vec<InputBoard>,
}

#[derive(Debug, Deserialize)]
pub struct InputBoard {
    pub name: String,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Groups hold other boards; artboards hold layers.
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub layers: Vec<InputLayer>,
    #[serde(default)]
    pub children: Vec<InputBoard>,
}

#[derive(Debug, Deserialize)]
pub struct InputLayer {
    pub name: String,
    pub kind: LayerKind,
}

impl From<InputBoard> for DocNode {
    fn from(input: InputBoard) -> Self {
        let bounds = Bounds::new(input.x, input.y, input.width, input.height);
        let node = if input.group {
            DocNode::group(input.name, bounds)
        } else {
            DocNode::artboard(input.name, bounds)
        };
        let node = input
            .layers
            .into_iter()
            .fold(node, |node, layer| node.with_layer(Layer::new(layer.name, layer.kind)));
        input
            .children
            .into_iter()
            .fold(node, |node, child| node.with_child(child.into()))
    }
}
