//! Sequence propagation: route planning and board cloning.

pub mod engine;
pub mod route;

pub use engine::{PropagateOptions, PropagationEngine};
pub use route::{Flank, PropagationRoute, RouteKind, MIDDLE_STEP};
