//! Boardchain - build workflow orchestrator for multi-device ad creatives.
//!
//! A creative is a set of board chains (sequences) per device: rest states,
//! intro frames, expanded states. This crate walks a designer through building
//! them step by step, cloning and placing boards in a document:
//!
//! - **Sequence registry**: which board sits at which step of which chain
//! - **Propagation**: flanking insertion for three-slot chains, head-prepend
//!   growth for open-ended ones
//! - **Actions**: named function chains run one after the other, one history
//!   entry per action
//! - **Snapshots**: `Step_<n>` checkpoints of the document, restorable later
//!
//! The document is reached through the [`DocumentApi`] trait. [`DocumentManager`]
//! implements it over an Automerge document.
//!
//! # Example
//!
//! ```rust
//! use boardchain::{BuildSession, Bounds, DocNode, DocumentManager, WorkflowConfig};
//!
//! let boards = vec![
//!     DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600)),
//!     DocNode::artboard("M_Rest_2", Bounds::new(0, 4000, 320, 480)),
//! ];
//! let document = DocumentManager::with_nodes("Spring campaign", boards).unwrap();
//! let mut session = BuildSession::init(document, WorkflowConfig::standard()).unwrap();
//!
//! // Propagates the rest states of both devices and moves to the intro step.
//! let outcome = session.next().unwrap();
//! assert!(outcome.success);
//! assert_eq!(session.current_step_index(), 1);
//!
//! let mut document = session.teardown();
//! let bytes = document.save();
//! assert!(!bytes.is_empty());
//! ```

pub mod action;
pub mod config;
pub mod creative;
pub mod document;
pub mod error;
pub mod locator;
pub mod propagate;
pub mod workflow;

// Re-exports for convenience
pub use action::{ActionExecutor, ActionResult, FunctionRegistry, FunctionSpec};
pub use config::{DeviceProfile, SequenceTemplate, WorkflowConfig};
pub use creative::{BoardEntry, Creative, Device, Sequence};
pub use document::{Bounds, DocNode, DocumentApi, DocumentManager, Layer, LayerKind};
pub use error::{BuildError, BuildResult};
pub use locator::{find_boards, Matcher, MatcherSpec};
pub use propagate::{Flank, PropagationEngine, PropagationRoute};
pub use workflow::{BuildSession, Command, Snapshot, StepOutcome};

// WASM bindings (only compiled when wasm feature enabled)
#[cfg(feature = "wasm")]
pub mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::JsBuildSession;
