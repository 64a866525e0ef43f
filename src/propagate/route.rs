//! Propagation routes and placement arithmetic.
//!
//! A [`PropagationRoute`] is planned once per (device, sequence) pair before
//! any document mutation and is not modified afterwards.

use serde::Serialize;

use crate::config::DeviceOffsets;
use crate::creative::{BoardEntry, Device};
use crate::document::{Bounds, DocNode};

/// Step of the source board in a flanking sequence.
pub const MIDDLE_STEP: u32 = 2;

/// Upper bound on collision pushes for one placement.
const MAX_PUSHES: usize = 64;

/// One side of a fixed three-slot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Flank {
    First,
    Second,
}

impl Flank {
    /// Duplication order.
    pub const ALL: [Flank; 2] = [Flank::First, Flank::Second];

    pub fn step(self) -> u32 {
        match self {
            Self::First => 1,
            Self::Second => 3,
        }
    }

    pub fn vertical_sign(self) -> i64 {
        match self {
            Self::First => 1,
            Self::Second => -1,
        }
    }

    /// Offset of this flank from the middle board.
    pub fn offset(self, offsets: &DeviceOffsets) -> (i64, i64) {
        (offsets.intro_next, self.vertical_sign() * offsets.flank_vertical)
    }
}

/// Offset of a new head board from the board it is cloned from.
///
/// The first board of an empty chain has to clear its anchor, later ones only
/// the previous head.
pub fn prepend_offset(offsets: &DeviceOffsets, first_insertion: bool) -> (i64, i64) {
    if first_insertion {
        (-offsets.intro_first, 0)
    } else {
        (-offsets.intro_next, 0)
    }
}

/// Pushes an offset further along its own direction until the moved bounds
/// overlap none of `occupied`.
pub fn clear_offset(
    source: &Bounds,
    (mut dx, mut dy): (i64, i64),
    occupied: &[Bounds],
    gap: i64,
) -> (i64, i64) {
    let push = if dy != 0 {
        (0, dy.signum() * (source.height + gap))
    } else if dx != 0 {
        (dx.signum() * (source.width + gap), 0)
    } else {
        return (dx, dy);
    };
    for _ in 0..MAX_PUSHES {
        let target = source.offset(dx, dy);
        if !occupied.iter().any(|b| b.intersects(&target)) {
            return (dx, dy);
        }
        dx += push.0;
        dy += push.1;
    }
    tracing::warn!(dx, dy, "no free slot found, placing with overlap");
    (dx, dy)
}

/// Bounds of every artboard in the tree except `skip`.
pub fn occupied_bounds(nodes: &[DocNode], skip: &str) -> Vec<Bounds> {
    fn walk(nodes: &[DocNode], skip: &str, out: &mut Vec<Bounds>) {
        for node in nodes {
            if node.id != skip && node.kind == crate::document::NodeKind::Artboard {
                out.push(node.bounds);
            }
            walk(&node.children, skip, out);
        }
    }
    let mut out = Vec::new();
    walk(nodes, skip, &mut out);
    out
}

/// What a route will do to its sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteKind {
    /// Duplicate the middle board into the listed flanks.
    Flanks {
        pending: Vec<Flank>,
        /// Flank boards already present in the document, registered as-is.
        adopted: Vec<BoardEntry>,
        /// Register the middle board itself.
        register_source: bool,
    },
    /// Renumber the chain and clone a new head.
    Prepend {
        first_insertion: bool,
        /// Existing entries, highest step first, with their new names.
        renames: Vec<(BoardEntry, String)>,
    },
}

/// A planned propagation into one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationRoute {
    pub source_board: DocNode,
    pub device: Device,
    pub sequence: String,
    /// Names of the boards this route creates, in creation order.
    pub destination_names: Vec<String>,
    /// Step the source board occupies (flanks) or the new board takes (prepend).
    pub step: u32,
    pub kind: RouteKind,
}

impl PropagationRoute {
    /// True when the route has no board to create.
    pub fn is_noop(&self) -> bool {
        match &self.kind {
            RouteKind::Flanks {
                pending,
                adopted,
                register_source,
            } => pending.is_empty() && adopted.is_empty() && !register_source,
            RouteKind::Prepend { .. } => false,
        }
    }
}
