//! Sequence propagation engine.
//!
//! Two modes, picked by sequence shape:
//! - **Flanking insertion** for fixed three-slot sequences: the middle board
//!   (step 2) is duplicated into steps 1 and 3, one above and one below.
//! - **Head-prepend growth** for growable sequences: every board moves one
//!   step later, then a new board is cloned from the previous head (or the
//!   anchor board) into step 1.
//!
//! All routes of a batch are planned before the first mutation, so a missing
//! source board leaves both the document and the registry untouched. The
//! registry is only written after the document side of a route succeeded.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::action::ActionResult;
use crate::config::{DeviceProfile, WorkflowConfig};
use crate::creative::{BoardEntry, Creative, Device, Sequence, SequenceShape};
use crate::document::{DocCommand, DocNode, DocumentApi, Layer, LayerKind};
use crate::error::{BuildError, BuildResult};
use crate::locator::{find_board_named, find_boards, Matcher};

use super::route::{
    clear_offset, occupied_bounds, prepend_offset, Flank, PropagationRoute, RouteKind, MIDDLE_STEP,
};

/// Options accepted by the `propagate` action function.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PropagateOptions {
    /// Skip normalizing the source board before duplication.
    pub propagate_only: bool,
}

/// Plans and applies propagation routes.
pub struct PropagationEngine<'c> {
    config: &'c WorkflowConfig,
}

impl<'c> PropagationEngine<'c> {
    pub fn new(config: &'c WorkflowConfig) -> Self {
        Self { config }
    }

    // =========================================================================
    // BATCH
    // =========================================================================

    /// Propagates every (device, sequence) pair, best effort.
    ///
    /// A locator miss fails the whole batch before any mutation. A route that
    /// errors while cloning is logged and skipped; `count` holds the routes
    /// that succeeded.
    pub fn propagate(
        &self,
        document: &mut dyn DocumentApi,
        creative: &mut Creative,
        devices: &[Device],
        sequences: &[String],
        options: &PropagateOptions,
    ) -> BuildResult<ActionResult> {
        let nodes = document.nodes()?;
        let mut routes = Vec::new();
        for &device in devices {
            for name in sequences {
                match self.plan_route(&nodes, creative, device, name) {
                    Ok(route) => routes.push(route),
                    Err(err @ BuildError::NoValidBoards(_)) => {
                        warn!(%device, sequence = %name, error = %err, "source board missing");
                        return Ok(ActionResult::failure(err.to_string()));
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if routes.is_empty() {
            return Ok(ActionResult::ok("nothing to propagate").with_count(0));
        }

        let total = routes.len();
        let mut succeeded = 0;
        let mut created = 0;
        for route in &routes {
            match self.apply_route(document, creative, route, options) {
                Ok(n) => {
                    succeeded += 1;
                    created += n;
                }
                Err(err) => warn!(
                    device = %route.device,
                    sequence = %route.sequence,
                    error = %err,
                    "propagation route failed"
                ),
            }
        }

        if succeeded == 0 {
            return Ok(ActionResult::failure(format!(
                "propagation failed for all {} routes",
                total
            )));
        }
        info!(succeeded, total, created, "propagation finished");
        Ok(ActionResult::ok(format!(
            "propagated {}/{} routes, {} boards created",
            succeeded, total, created
        ))
        .with_count(succeeded)
        .with_payload(creative.clone()))
    }

    // =========================================================================
    // PLANNING
    // =========================================================================

    /// Current registry sequence, or a fresh one if none exists yet.
    fn sequence_for(&self, creative: &Creative, device: Device, name: &str) -> BuildResult<Sequence> {
        if let Some(sequence) = creative.sequence(device, name) {
            return Ok(sequence.clone());
        }
        let template = self.config.template(name)?;
        Ok(Sequence::from_template(device, template, self.config.profile(device)?))
    }

    /// Finds the board a sequence propagates from.
    pub fn locate_source(
        &self,
        nodes: &[DocNode],
        creative: &Creative,
        device: Device,
        name: &str,
    ) -> BuildResult<DocNode> {
        let sequence = self.sequence_for(creative, device, name)?;
        let wanted = match sequence.shape() {
            SequenceShape::Flanking => sequence
                .entry_at(MIDDLE_STEP)
                .map(|e| (Some(e.board_ref.clone()), e.name.clone()))
                .unwrap_or_else(|| (None, sequence.board_name(MIDDLE_STEP))),
            SequenceShape::Growable { .. } => match sequence.lowest() {
                Some(head) => (Some(head.board_ref.clone()), head.name.clone()),
                None => {
                    let template = self.config.template(name)?;
                    let anchor = template
                        .anchor_name(self.config.profile(device)?)
                        .ok_or_else(|| {
                            BuildError::config(format!("sequence '{}' has no anchor board", name))
                        })?;
                    (None, anchor)
                }
            },
        };

        let (board_ref, board_name) = wanted;
        if let Some(id) = board_ref {
            if let Some(node) = find_by_id(nodes, &id) {
                return Ok(node.clone());
            }
        }
        find_board_named(nodes, None, &board_name)?
            .cloned()
            .ok_or_else(|| BuildError::no_valid_boards(board_name))
    }

    /// Plans one route without touching the document or the registry.
    pub fn plan_route(
        &self,
        nodes: &[DocNode],
        creative: &Creative,
        device: Device,
        name: &str,
    ) -> BuildResult<PropagationRoute> {
        let sequence = self.sequence_for(creative, device, name)?;
        let source = self.locate_source(nodes, creative, device, name)?;
        debug!(%device, sequence = %name, source = %source.name, "planning route");

        match sequence.shape() {
            SequenceShape::Flanking => {
                let mut pending = Vec::new();
                let mut adopted = Vec::new();
                for flank in Flank::ALL {
                    if sequence.entry_at(flank.step()).is_some() {
                        continue;
                    }
                    let dest = sequence.board_name(flank.step());
                    match find_board_named(nodes, Some(&source.id), &dest)? {
                        Some(existing) => adopted.push(BoardEntry::new(
                            dest,
                            flank.step(),
                            existing.id.clone(),
                        )),
                        None => pending.push(flank),
                    }
                }
                Ok(PropagationRoute {
                    destination_names: pending
                        .iter()
                        .map(|f| sequence.board_name(f.step()))
                        .collect(),
                    source_board: source,
                    device,
                    sequence: name.to_string(),
                    step: MIDDLE_STEP,
                    kind: RouteKind::Flanks {
                        pending,
                        adopted,
                        register_source: sequence.entry_at(MIDDLE_STEP).is_none(),
                    },
                })
            }
            SequenceShape::Growable { limit } => {
                if let Some(limit) = limit {
                    if sequence.len() as u32 >= limit {
                        return Err(BuildError::sequence_shape(
                            name,
                            format!("already holds {} boards", limit),
                        ));
                    }
                }
                // Any board carrying the chain's naming that the registry does not
                // know would collide with the renumbering.
                let matcher = Matcher::Pattern(sequence.step_regex()?);
                if let Some(stale) = find_boards(Some(nodes), Some(&source.id), &matcher)
                    .into_iter()
                    .find(|b| !sequence.artboards.iter().any(|e| e.board_ref == b.id))
                {
                    return Err(BuildError::schema_violation(format!(
                        "board '{}' uses the '{}' naming but is not part of the sequence",
                        stale.name, name
                    )));
                }

                let mut renames: Vec<(BoardEntry, String)> = sequence
                    .artboards
                    .iter()
                    .map(|e| (e.clone(), sequence.board_name(e.step + 1)))
                    .collect();
                renames.sort_by(|a, b| b.0.step.cmp(&a.0.step));
                Ok(PropagationRoute {
                    source_board: source,
                    device,
                    sequence: name.to_string(),
                    destination_names: vec![sequence.board_name(1)],
                    step: 1,
                    kind: RouteKind::Prepend {
                        first_insertion: sequence.is_empty(),
                        renames,
                    },
                })
            }
        }
    }

    // =========================================================================
    // APPLYING
    // =========================================================================

    /// Applies one planned route and returns the number of boards created.
    pub fn apply_route(
        &self,
        document: &mut dyn DocumentApi,
        creative: &mut Creative,
        route: &PropagationRoute,
        options: &PropagateOptions,
    ) -> BuildResult<usize> {
        if route.is_noop() {
            debug!(device = %route.device, sequence = %route.sequence, "route already complete");
            return Ok(0);
        }
        let template = self.config.template(&route.sequence)?;
        let profile = self.config.profile(route.device)?;

        match &route.kind {
            RouteKind::Flanks {
                pending,
                adopted,
                register_source,
            } => {
                if !options.propagate_only && !pending.is_empty() {
                    self.normalize(document, &route.source_board)?;
                }
                let mut entries = Vec::new();
                let mut failures = 0;
                for (flank, dest) in pending.iter().zip(&route.destination_names) {
                    match self.clone_flank(document, route, profile, *flank, dest) {
                        Ok(entry) => entries.push(entry),
                        Err(err) => {
                            failures += 1;
                            warn!(flank = ?flank, board = %dest, error = %err, "flank duplication failed");
                        }
                    }
                }
                if entries.is_empty() && failures > 0 {
                    return Err(BuildError::no_valid_boards(format!(
                        "{} flanks of {}",
                        route.sequence, route.source_board.name
                    )));
                }

                let created = entries.len();
                let sequence = creative.ensure_sequence(route.device, template, profile);
                if *register_source {
                    let name = sequence.board_name(route.step);
                    sequence.insert_entry(BoardEntry::new(
                        name,
                        route.step,
                        route.source_board.id.clone(),
                    ))?;
                }
                for entry in adopted.iter().cloned().chain(entries) {
                    sequence.insert_entry(entry)?;
                }
                Ok(created)
            }
            RouteKind::Prepend {
                first_insertion,
                renames,
            } => {
                self.renumber(document, renames)?;
                let dest = &route.destination_names[0];
                let head = match self.clone_head(document, route, profile, *first_insertion, dest) {
                    Ok(head) => head,
                    Err(err) => {
                        self.revert_renames(document, renames);
                        return Err(err);
                    }
                };

                let sequence = creative.ensure_sequence(route.device, template, profile);
                sequence.shift_steps();
                sequence.insert_entry(head)?;
                Ok(1)
            }
        }
    }

    fn clone_flank(
        &self,
        document: &mut dyn DocumentApi,
        route: &PropagationRoute,
        profile: &DeviceProfile,
        flank: Flank,
        name: &str,
    ) -> BuildResult<BoardEntry> {
        let offset = flank.offset(&profile.offsets);
        let copy = self.clone_and_place(document, &route.source_board, name, offset, profile)?;
        Ok(BoardEntry::new(name, flank.step(), copy.id))
    }

    fn clone_head(
        &self,
        document: &mut dyn DocumentApi,
        route: &PropagationRoute,
        profile: &DeviceProfile,
        first_insertion: bool,
        name: &str,
    ) -> BuildResult<BoardEntry> {
        let offset = prepend_offset(&profile.offsets, first_insertion);
        let copy = self.clone_and_place(document, &route.source_board, name, offset, profile)?;
        Ok(BoardEntry::new(name, route.step, copy.id))
    }

    /// Duplicates `source`, names the copy and moves it to the first free slot
    /// along `offset`. A copy that cannot be named or placed is deleted again.
    fn clone_and_place(
        &self,
        document: &mut dyn DocumentApi,
        source: &DocNode,
        name: &str,
        offset: (i64, i64),
        profile: &DeviceProfile,
    ) -> BuildResult<DocNode> {
        let copy = document.duplicate(&source.id)?;
        if let Err(err) = self.place(document, source, &copy, name, offset, profile) {
            if let Err(cleanup) = document.remove(&copy.id) {
                warn!(board = %copy.id, error = %cleanup, "could not delete unplaced copy");
            }
            return Err(err);
        }
        Ok(copy)
    }

    fn place(
        &self,
        document: &mut dyn DocumentApi,
        source: &DocNode,
        copy: &DocNode,
        name: &str,
        offset: (i64, i64),
        profile: &DeviceProfile,
    ) -> BuildResult<()> {
        document.rename(&copy.id, name)?;
        let occupied = occupied_bounds(&document.nodes()?, &copy.id);
        let (dx, dy) = clear_offset(&source.bounds, offset, &occupied, profile.offsets.gap);
        document.translate(&copy.id, dx, dy)?;
        debug!(board = %name, dx, dy, "placed board");
        Ok(())
    }

    /// Renames the chain one step later, highest step first.
    fn renumber(
        &self,
        document: &mut dyn DocumentApi,
        renames: &[(BoardEntry, String)],
    ) -> BuildResult<()> {
        let commands: Vec<DocCommand> = renames
            .iter()
            .map(|(entry, name)| DocCommand::Rename {
                id: entry.board_ref.clone(),
                name: name.clone(),
            })
            .collect();
        let results = document.submit(&commands);
        let Some(failed) = results.iter().position(Result::is_err) else {
            return Ok(());
        };
        self.revert_renames(document, &renames[..failed]);
        // Only the first failure is surfaced.
        match results.into_iter().nth(failed) {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Best-effort restore of the original names, lowest step first.
    fn revert_renames(&self, document: &mut dyn DocumentApi, renames: &[(BoardEntry, String)]) {
        let commands: Vec<DocCommand> = renames
            .iter()
            .rev()
            .map(|(entry, _)| DocCommand::Rename {
                id: entry.board_ref.clone(),
                name: entry.name.clone(),
            })
            .collect();
        for (command, result) in commands.iter().zip(document.submit(&commands)) {
            if let Err(err) = result {
                warn!(?command, error = %err, "could not revert rename");
            }
        }
    }

    // =========================================================================
    // NORMALIZATION
    // =========================================================================

    /// Rasterizes vector layers of `board` and wraps every layer into an
    /// embedded artifact. Returns the number of commands submitted.
    pub fn normalize(&self, document: &mut dyn DocumentApi, board: &DocNode) -> BuildResult<usize> {
        let mut layers = Vec::new();
        collect_layers(board, &mut layers);

        let mut commands: Vec<DocCommand> = layers
            .iter()
            .filter(|l| l.needs_rasterize())
            .map(|l| DocCommand::Rasterize {
                layer_id: l.id.clone(),
            })
            .collect();
        commands.extend(
            layers
                .iter()
                .filter(|l| l.kind != LayerKind::Embedded)
                .map(|l| DocCommand::ConvertToEmbedded {
                    layer_id: l.id.clone(),
                }),
        );
        if commands.is_empty() {
            return Ok(0);
        }
        for result in document.submit(&commands) {
            result?;
        }
        debug!(board = %board.name, commands = commands.len(), "normalized board");
        Ok(commands.len())
    }
}

fn collect_layers<'n>(node: &'n DocNode, out: &mut Vec<&'n Layer>) {
    out.extend(node.layers.iter());
    for child in &node.children {
        collect_layers(child, out);
    }
}

fn find_by_id<'n>(nodes: &'n [DocNode], id: &str) -> Option<&'n DocNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_by_id(&node.children, id) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        Bounds, DocumentManager, HistoryState, HistoryStateRef, Layer, LayerKind, Progress,
    };

    fn rest_boards() -> Vec<DocNode> {
        vec![
            DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600))
                .with_layer(Layer::new("headline", LayerKind::Text))
                .with_layer(Layer::new("logo", LayerKind::Shape)),
            DocNode::artboard("M_Rest_2", Bounds::new(0, 4000, 320, 480))
                .with_layer(Layer::new("photo", LayerKind::Pixel)),
        ]
    }

    fn names(seq: &Sequence) -> Vec<String> {
        seq.artboards.iter().map(|e| e.name.clone()).collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn artboards(nodes: &[DocNode]) -> Vec<&DocNode> {
        let all = Matcher::Pattern(regex::Regex::new(".*").unwrap());
        find_boards(Some(nodes), None, &all)
    }

    #[test]
    fn test_flanking_fills_both_sides() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut doc = DocumentManager::with_nodes("ad", rest_boards()).unwrap();
        let mut creative = Creative::new();

        let result = engine
            .propagate(
                &mut doc,
                &mut creative,
                &Device::ALL,
                &strings(&["rest"]),
                &PropagateOptions::default(),
            )
            .unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.count, Some(2));

        let rest = creative.sequence(Device::Desktop, "rest").unwrap();
        assert_eq!(names(rest), strings(&["D_Rest_1", "D_Rest_2", "D_Rest_3"]));
        assert!(creative.is_consistent());
        assert_eq!(creative.len(), 6);

        let nodes = doc.nodes().unwrap();
        let middle = find_board_named(&nodes, None, "D_Rest_2").unwrap().unwrap();
        let first = find_board_named(&nodes, None, "D_Rest_1").unwrap().unwrap();
        let second = find_board_named(&nodes, None, "D_Rest_3").unwrap().unwrap();
        assert_eq!(first.id, rest.artboards[0].board_ref);
        let dy_first = first.bounds.top - middle.bounds.top;
        let dy_second = second.bounds.top - middle.bounds.top;
        assert!(dy_first > 0 && dy_second < 0);
        assert!(first.bounds.left > middle.bounds.left);

        // Source layers were normalized before cloning.
        assert!(middle.layers.iter().all(|l| l.kind == LayerKind::Embedded));
    }

    #[test]
    fn test_placements_never_overlap() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut boards = rest_boards();
        // Occupies the slot of the first desktop flank.
        boards.push(DocNode::artboard("Notes", Bounds::new(1200, 1000, 970, 600)));
        let mut doc = DocumentManager::with_nodes("ad", boards).unwrap();
        let mut creative = Creative::new();

        engine
            .propagate(
                &mut doc,
                &mut creative,
                &Device::ALL,
                &strings(&["rest"]),
                &PropagateOptions::default(),
            )
            .unwrap();
        for _ in 0..3 {
            engine
                .propagate(
                    &mut doc,
                    &mut creative,
                    &Device::ALL,
                    &strings(&["intro"]),
                    &PropagateOptions::default(),
                )
                .unwrap();
        }

        let nodes = doc.nodes().unwrap();
        let boards = artboards(&nodes);
        for (i, a) in boards.iter().enumerate() {
            for b in &boards[i + 1..] {
                assert!(
                    !a.bounds.intersects(&b.bounds),
                    "{} overlaps {}",
                    a.name,
                    b.name
                );
            }
        }
    }

    #[test]
    fn test_head_prepend_renumbers_chain() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut doc = DocumentManager::with_nodes("ad", rest_boards()).unwrap();
        let mut creative = Creative::new();
        let desktop = [Device::Desktop];

        let mut first_ref = None;
        for round in 1..=3u32 {
            let result = engine
                .propagate(
                    &mut doc,
                    &mut creative,
                    &desktop,
                    &strings(&["intro"]),
                    &PropagateOptions { propagate_only: true },
                )
                .unwrap();
            assert!(result.success);
            let intro = creative.sequence(Device::Desktop, "intro").unwrap();
            assert_eq!(intro.len(), round as usize);
            if round == 1 {
                first_ref = Some(intro.artboards[0].board_ref.clone());
            }
        }

        let intro = creative.sequence(Device::Desktop, "intro").unwrap();
        assert_eq!(names(intro), strings(&["D_Intro_1", "D_Intro_2", "D_Intro_3"]));
        // The first clone ended up last.
        assert_eq!(intro.artboards[2].board_ref, first_ref.unwrap());

        let nodes = doc.nodes().unwrap();
        for entry in &intro.artboards {
            let node = nodes.iter().find(|n| n.id == entry.board_ref).unwrap();
            assert_eq!(node.name, entry.name);
        }
        let lefts: Vec<i64> = intro
            .artboards
            .iter()
            .map(|e| nodes.iter().find(|n| n.id == e.board_ref).unwrap().bounds.left)
            .collect();
        assert!(lefts[0] < lefts[1] && lefts[1] < lefts[2]);
        assert!(lefts[2] < 0);
        assert!(creative.sequence(Device::Mobile, "intro").is_none());
    }

    #[test]
    fn test_missing_source_mutates_nothing() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut boards = rest_boards();
        boards.pop();
        let mut doc = DocumentManager::with_nodes("ad", boards).unwrap();
        let before = doc.nodes().unwrap();
        let mut creative = Creative::new();

        let result = engine
            .propagate(
                &mut doc,
                &mut creative,
                &Device::ALL,
                &strings(&["rest"]),
                &PropagateOptions::default(),
            )
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("no valid boards found matching 'M_Rest_2'"));
        assert_eq!(doc.nodes().unwrap(), before);
        assert!(creative.is_empty());
    }

    #[test]
    fn test_existing_flank_is_adopted() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut boards = rest_boards();
        let existing = DocNode::artboard("D_Rest_1", Bounds::new(1200, 1000, 970, 600));
        let existing_id = existing.id.clone();
        boards.push(existing);
        let nodes = boards.clone();
        let mut doc = DocumentManager::with_nodes("ad", boards).unwrap();
        let mut creative = Creative::new();

        let route = engine
            .plan_route(&nodes, &creative, Device::Desktop, "rest")
            .unwrap();
        assert_eq!(route.destination_names, strings(&["D_Rest_3"]));

        let created = engine
            .apply_route(&mut doc, &mut creative, &route, &PropagateOptions::default())
            .unwrap();
        assert_eq!(created, 1);
        let rest = creative.sequence(Device::Desktop, "rest").unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest.artboards[0].board_ref, existing_id);

        // A complete sequence plans a no-op.
        let nodes = doc.nodes().unwrap();
        let again = engine
            .plan_route(&nodes, &creative, Device::Desktop, "rest")
            .unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn test_unregistered_chain_board_is_rejected() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut nodes = rest_boards();
        nodes.push(DocNode::artboard("D_Intro_1", Bounds::new(-5000, 0, 970, 600)));
        let err = engine
            .plan_route(&nodes, &Creative::new(), Device::Desktop, "intro")
            .unwrap_err();
        assert!(matches!(err, BuildError::SchemaViolation(_)));
    }

    #[test]
    fn test_normalize_counts_commands() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let mut doc = DocumentManager::with_nodes("ad", rest_boards()).unwrap();
        let board = doc.nodes().unwrap()[0].clone();
        // Two vector layers rasterized, both converted.
        assert_eq!(engine.normalize(&mut doc, &board).unwrap(), 4);
        let board = doc.nodes().unwrap()[0].clone();
        assert_eq!(engine.normalize(&mut doc, &board).unwrap(), 0);
    }

    /// Delegates to a manager but refuses to duplicate one board, or to move
    /// any board at all.
    struct RefusingDocument {
        inner: DocumentManager,
        refuse: String,
        refuse_moves: bool,
    }

    impl RefusingDocument {
        fn refusing_duplicate(inner: DocumentManager, id: String) -> Self {
            Self {
                inner,
                refuse: id,
                refuse_moves: false,
            }
        }

        fn refusing_moves(inner: DocumentManager) -> Self {
            Self {
                inner,
                refuse: String::new(),
                refuse_moves: true,
            }
        }
    }

    impl DocumentApi for RefusingDocument {
        fn document_id(&mut self) -> BuildResult<String> {
            self.inner.document_id()
        }
        fn nodes(&mut self) -> BuildResult<Vec<DocNode>> {
            self.inner.nodes()
        }
        fn duplicate(&mut self, id: &str) -> BuildResult<DocNode> {
            if id == self.refuse {
                return Err(BuildError::board_not_found(id));
            }
            self.inner.duplicate(id)
        }
        fn translate(&mut self, id: &str, dx: i64, dy: i64) -> BuildResult<()> {
            if self.refuse_moves {
                return Err(BuildError::schema_violation("board is locked"));
            }
            self.inner.translate(id, dx, dy)
        }
        fn rename(&mut self, id: &str, name: &str) -> BuildResult<()> {
            self.inner.rename(id, name)
        }
        fn remove(&mut self, id: &str) -> BuildResult<()> {
            self.inner.remove(id)
        }
        fn rasterize(&mut self, layer_id: &str) -> BuildResult<()> {
            self.inner.rasterize(layer_id)
        }
        fn convert_to_embedded(&mut self, layer_id: &str) -> BuildResult<()> {
            self.inner.convert_to_embedded(layer_id)
        }
        fn suspend_history(&mut self, action_name: &str) -> BuildResult<()> {
            self.inner.suspend_history(action_name)
        }
        fn resume_history(&mut self) -> BuildResult<()> {
            self.inner.resume_history()
        }
        fn is_history_suspended(&self) -> bool {
            self.inner.is_history_suspended()
        }
        fn capture_history_state(&mut self, name: &str) -> BuildResult<HistoryStateRef> {
            self.inner.capture_history_state(name)
        }
        fn restore_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()> {
            self.inner.restore_history_state(state)
        }
        fn forget_history_state(&mut self, state: &HistoryStateRef) -> BuildResult<()> {
            self.inner.forget_history_state(state)
        }
        fn history_states(&mut self) -> BuildResult<Vec<HistoryState>> {
            self.inner.history_states()
        }
        fn clear_history_states(&mut self) -> BuildResult<()> {
            self.inner.clear_history_states()
        }
        fn progress(&mut self) -> BuildResult<Option<Progress>> {
            self.inner.progress()
        }
        fn record_progress(&mut self, progress: &Progress) -> BuildResult<()> {
            self.inner.record_progress(progress)
        }
    }

    #[test]
    fn test_partial_failure_counts_successes() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let boards = rest_boards();
        let refuse = boards[1].id.clone();
        let mut doc =
            RefusingDocument::refusing_duplicate(DocumentManager::with_nodes("ad", boards).unwrap(), refuse);
        let mut creative = Creative::new();

        let result = engine
            .propagate(
                &mut doc,
                &mut creative,
                &Device::ALL,
                &strings(&["rest"]),
                &PropagateOptions::default(),
            )
            .unwrap();
        assert!(result.success);
        assert_eq!(result.count, Some(1));
        assert_eq!(creative.sequence(Device::Desktop, "rest").unwrap().len(), 3);
        assert!(creative.sequence(Device::Mobile, "rest").is_none());
    }

    #[test]
    fn test_unplaced_flank_copies_are_deleted() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let boards = rest_boards();
        let before: Vec<String> = boards.iter().map(|b| b.name.clone()).collect();
        let mut doc =
            RefusingDocument::refusing_moves(DocumentManager::with_nodes("ad", boards).unwrap());
        let mut creative = Creative::new();

        let result = engine
            .propagate(
                &mut doc,
                &mut creative,
                &Device::ALL,
                &strings(&["rest"]),
                &PropagateOptions { propagate_only: true },
            )
            .unwrap();
        assert!(!result.success);
        let after: Vec<String> = doc.nodes().unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(after, before);
        assert!(creative.is_empty());
    }

    #[test]
    fn test_unplaced_head_leaves_chain_usable() {
        let config = WorkflowConfig::standard();
        let engine = PropagationEngine::new(&config);
        let desktop = [Device::Desktop];
        let intro = strings(&["intro"]);
        let only = PropagateOptions { propagate_only: true };
        let mut doc = RefusingDocument::refusing_moves(
            DocumentManager::with_nodes("ad", rest_boards()).unwrap(),
        );
        let mut creative = Creative::new();

        doc.refuse_moves = false;
        let first = engine
            .propagate(&mut doc, &mut creative, &desktop, &intro, &only)
            .unwrap();
        assert!(first.success);

        // Renumbering succeeds, placing the new head fails.
        doc.refuse_moves = true;
        let failed = engine
            .propagate(&mut doc, &mut creative, &desktop, &intro, &only)
            .unwrap();
        assert!(!failed.success);
        let nodes = doc.nodes().unwrap();
        let heads = nodes.iter().filter(|n| n.name == "D_Intro_1").count();
        assert_eq!(heads, 1);
        assert!(!nodes.iter().any(|n| n.name == "D_Intro_2"));
        assert_eq!(creative.sequence(Device::Desktop, "intro").unwrap().len(), 1);

        doc.refuse_moves = false;
        let retried = engine
            .propagate(&mut doc, &mut creative, &desktop, &intro, &only)
            .unwrap();
        assert!(retried.success, "{}", retried.message);
        let chain = creative.sequence(Device::Desktop, "intro").unwrap();
        assert_eq!(names(chain), strings(&["D_Intro_1", "D_Intro_2"]));
    }
}
