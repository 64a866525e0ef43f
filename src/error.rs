//! Error types for the creative build workflow.

use thiserror::Error;

/// Result type alias for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that can occur while building a creative.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Automerge error during document operations.
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    /// Autosurgeon hydration error.
    #[error("Hydration error: {0}")]
    Hydrate(#[from] autosurgeon::HydrateError),

    /// Autosurgeon reconcile error.
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] autosurgeon::ReconcileError),

    /// A required source board could not be located.
    #[error("no valid boards found matching '{0}'")]
    NoValidBoards(String),

    /// Board or node not found in the document.
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    /// Layer not found in the document.
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Field not found in a document object.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Schema violation - document structure is invalid.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Two registry entries would share a step.
    #[error("Sequence '{sequence}' already has a board at step {step}")]
    DuplicateStep { sequence: String, step: u32 },

    /// The sequence shape does not allow the requested propagation.
    #[error("Sequence '{sequence}' cannot grow: {reason}")]
    SequenceShape { sequence: String, reason: String },

    /// A history scope was misused (nested suspend, restore while suspended...).
    #[error("History error: {0}")]
    History(String),

    /// No snapshot with this name was captured.
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Action function name not present in the registry.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Invalid workflow configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid board name pattern.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a configuration or document file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Creates a NoValidBoards error.
    pub fn no_valid_boards(what: impl Into<String>) -> Self {
        Self::NoValidBoards(what.into())
    }

    /// Creates a BoardNotFound error.
    pub fn board_not_found(id: impl Into<String>) -> Self {
        Self::BoardNotFound(id.into())
    }

    /// Creates a LayerNotFound error.
    pub fn layer_not_found(id: impl Into<String>) -> Self {
        Self::LayerNotFound(id.into())
    }

    /// Creates a FieldNotFound error.
    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::FieldNotFound(field.into())
    }

    /// Creates a SchemaViolation error.
    pub fn schema_violation(msg: impl Into<String>) -> Self {
        Self::SchemaViolation(msg.into())
    }

    /// Creates a DuplicateStep error.
    pub fn duplicate_step(sequence: impl Into<String>, step: u32) -> Self {
        Self::DuplicateStep {
            sequence: sequence.into(),
            step,
        }
    }

    /// Creates a SequenceShape error.
    pub fn sequence_shape(sequence: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SequenceShape {
            sequence: sequence.into(),
            reason: reason.into(),
        }
    }

    /// Creates a History error.
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History(msg.into())
    }

    /// Creates a SnapshotNotFound error.
    pub fn snapshot_not_found(name: impl Into<String>) -> Self {
        Self::SnapshotNotFound(name.into())
    }

    /// Creates an UnknownFunction error.
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Self::UnknownFunction(name.into())
    }

    /// Creates a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
