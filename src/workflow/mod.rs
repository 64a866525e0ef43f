//! Guided build workflow: steps, position tracking, snapshots and the session
//! that ties them to a document.

pub mod machine;
pub mod session;
pub mod snapshot;
pub mod step;

pub use machine::{BuildStepMachine, Command};
pub use session::{BuildSession, SessionStatus, StepOutcome};
pub use snapshot::{snapshot_name, Snapshot, SnapshotManager};
pub use step::{ActionDescriptor, BuildStep, StepCallback};
