//! Live board document.
//!
//! Provides the document-editing surface the build workflow consumes and an
//! Automerge-backed implementation of it.

pub mod api;
pub mod manager;
pub mod model;

// Re-exports for convenience
pub use api::{DocCommand, DocumentApi, HistoryScope, HistoryState, HistoryStateRef, Progress};
pub use manager::DocumentManager;
pub use model::{
    Bounds, DocNode, DocumentRoot, HistoryRecord, Layer, LayerKind, NodeKind, ProgressRecord,
    SubstepRecord,
};
