//! The build session: one guided workflow over one document.
//!
//! A session is created with [`BuildSession::init`] and handed back with
//! [`BuildSession::teardown`]. It owns the step machine, the snapshot list and
//! the sequence registry; nothing is global, so several sessions over
//! different documents can coexist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::action::{summarize, ActionContext, ActionExecutor, ActionResult, FunctionRegistry};
use crate::config::WorkflowConfig;
use crate::creative::{Creative, Device};
use crate::document::{DocumentApi, HistoryScope};
use crate::error::BuildResult;

use super::machine::{BuildStepMachine, Command};
use super::snapshot::{snapshot_name, Snapshot, SnapshotManager};
use super::step::{ActionDescriptor, BuildStep, StepCallback};

/// Feedback for one workflow command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub command: Command,
    pub success: bool,
    /// First failure message, or a summary on success.
    pub message: String,
    /// Step index after the command.
    pub step: usize,
    pub results: Vec<ActionResult>,
}

impl StepOutcome {
    fn plain(command: Command, message: impl Into<String>, step: usize) -> Self {
        Self {
            command,
            success: true,
            message: message.into(),
            step,
            results: Vec::new(),
        }
    }
}

/// Serializable view of the session for a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub step: usize,
    pub step_id: String,
    pub step_name: String,
    pub directions: String,
    pub substeps: BTreeMap<Device, u32>,
    pub snapshots: Vec<String>,
    pub creative: Creative,
}

pub struct BuildSession<D: DocumentApi> {
    document: D,
    config: WorkflowConfig,
    functions: FunctionRegistry,
    machine: BuildStepMachine,
    snapshots: SnapshotManager,
    creative: Creative,
}

impl<D: DocumentApi> BuildSession<D> {
    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Opens a session over `document`.
    ///
    /// Snapshots are recovered from the document's history records, the step
    /// position and sub-step counters resume from the progress recorded by
    /// the last command, and the registry is rebuilt from board names.
    pub fn init(mut document: D, config: WorkflowConfig) -> BuildResult<Self> {
        config.validate()?;
        let snapshots = SnapshotManager::from_document(&mut document)?;
        let mut machine = BuildStepMachine::new(config.steps.clone())?;
        if let Some(progress) = document.progress()? {
            machine.resume(progress);
        }
        let creative = Creative::rebuild(&document.nodes()?, &config)?;
        let document_id = document.document_id()?;
        info!(
            document = %document_id,
            step = machine.current(),
            snapshots = snapshots.len(),
            boards = creative.len(),
            "session opened"
        );
        Ok(Self {
            document,
            config,
            functions: FunctionRegistry::standard(),
            machine,
            snapshots,
            creative,
        })
    }

    /// Replaces the function registry.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Closes the session and returns the document.
    pub fn teardown(mut self) -> D {
        if self.document.is_history_suspended() {
            if let Err(err) = self.document.resume_history() {
                warn!(error = %err, "could not resume history on teardown");
            }
        }
        info!(step = self.machine.current(), "session closed");
        self.document
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    pub fn dispatch(&mut self, command: Command) -> BuildResult<StepOutcome> {
        match command {
            Command::Next => self.next(),
            Command::Prev => self.prev(),
            Command::Substep => self.substep(),
        }
    }

    /// Runs the current step's `next_action` and advances on full success.
    #[instrument(skip(self))]
    pub fn next(&mut self) -> BuildResult<StepOutcome> {
        let current = self.machine.current();
        let Some(action) = self.machine.current_step().next_action.clone() else {
            if self.machine.is_last() {
                return Ok(StepOutcome::plain(Command::Next, "workflow complete", current));
            }
            let step = self.machine.advance();
            self.save_progress()?;
            info!(step, "advanced");
            return Ok(StepOutcome::plain(Command::Next, "advanced", step));
        };

        if action.checkpoint {
            let substeps = self.machine.substeps().clone();
            self.snapshots
                .capture(&mut self.document, &snapshot_name(current), current, substeps)?;
        }
        let outcome = self.execute(Command::Next, &action)?;
        // A failed attempt keeps no checkpoint; the retry captures a fresh one.
        if action.checkpoint && !outcome.success {
            self.snapshots.discard_last(&mut self.document)?;
        }
        Ok(outcome)
    }

    /// Moves one step back. Restores the target step's snapshot when the
    /// workflow is configured to.
    #[instrument(skip(self))]
    pub fn prev(&mut self) -> BuildResult<StepOutcome> {
        let step = self.machine.retreat();
        let name = snapshot_name(step);
        if self.config.prev_restores_snapshot && self.snapshots.latest(&name).is_some() {
            self.restore_snapshot(&name)?;
            return Ok(StepOutcome::plain(
                Command::Prev,
                format!("restored {}", name),
                self.machine.current(),
            ));
        }
        self.save_progress()?;
        Ok(StepOutcome::plain(Command::Prev, "moved back", step))
    }

    /// Runs the current step's repeatable `action`.
    #[instrument(skip(self))]
    pub fn substep(&mut self) -> BuildResult<StepOutcome> {
        let Some(action) = self.machine.current_step().action.clone() else {
            return Ok(StepOutcome::plain(
                Command::Substep,
                "nothing to do",
                self.machine.current(),
            ));
        };
        self.execute(Command::Substep, &action)
    }

    /// Runs an action inside one history scope. When every function succeeded
    /// its callbacks are applied and the new position is recorded in the same
    /// history entry.
    fn execute(&mut self, command: Command, action: &ActionDescriptor) -> BuildResult<StepOutcome> {
        let devices = action.device_scope(&self.config.device_list());

        let mut scope = HistoryScope::suspend(&mut self.document, &action.label)?;
        let mut ctx = ActionContext {
            document: &mut *scope,
            creative: self.creative.clone(),
            devices: devices.clone(),
            sequences: action.sequences.clone(),
            config: &self.config,
        };
        let results = ActionExecutor::new(&self.functions).run(&action.functions, &mut ctx);
        drop(ctx);

        let (success, failure) = summarize(&results);
        if success {
            apply_callbacks(
                &mut self.machine,
                &mut self.creative,
                &action.callbacks,
                &results,
                &devices,
            );
            scope.record_progress(&self.machine.progress())?;
        }
        scope.finish()?;

        if !success {
            let message = failure.unwrap_or_default();
            warn!(action = %action.label, %message, "action failed");
            return Ok(StepOutcome {
                command,
                success: false,
                message,
                step: self.machine.current(),
                results,
            });
        }

        let message = results
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        info!(action = %action.label, step = self.machine.current(), "action succeeded");
        Ok(StepOutcome {
            command,
            success: true,
            message,
            step: self.machine.current(),
            results,
        })
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Captures `Step_<current>` by hand.
    pub fn capture_snapshot(&mut self) -> BuildResult<Snapshot> {
        let current = self.machine.current();
        let substeps = self.machine.substeps().clone();
        let snapshot =
            self.snapshots
                .capture(&mut self.document, &snapshot_name(current), current, substeps)?;
        Ok(snapshot.clone())
    }

    /// Restores the latest snapshot named `name` and re-points the session at
    /// its step. Returns the new step index.
    pub fn restore_snapshot(&mut self, name: &str) -> BuildResult<usize> {
        let snapshot = self.snapshots.restore(&mut self.document, name)?.clone();
        let step = self.machine.jump_to(snapshot.step_number);
        self.machine.set_substeps(snapshot.substeps);
        self.creative = Creative::rebuild(&self.document.nodes()?, &self.config)?;
        self.save_progress()?;
        Ok(step)
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        self.snapshots.list_all()
    }

    pub fn clear_snapshots(&mut self) -> BuildResult<()> {
        self.snapshots.clear(&mut self.document)
    }

    fn save_progress(&mut self) -> BuildResult<()> {
        self.document.record_progress(&self.machine.progress())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn current_step_index(&self) -> usize {
        self.machine.current()
    }

    pub fn current_step(&self) -> &BuildStep {
        self.machine.current_step()
    }

    pub fn substep_count(&self, device: Device) -> u32 {
        self.machine.substep(device)
    }

    pub fn creative(&self) -> &Creative {
        &self.creative
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn status(&self) -> SessionStatus {
        let step = self.machine.current_step();
        SessionStatus {
            step: self.machine.current(),
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            directions: step.directions.clone(),
            substeps: self.machine.substeps().clone(),
            snapshots: self.snapshots.list_all().iter().map(|s| s.name.clone()).collect(),
            creative: self.creative.clone(),
        }
    }
}

/// Applies the callbacks of a fully successful action, in declared order.
fn apply_callbacks(
    machine: &mut BuildStepMachine,
    creative: &mut Creative,
    callbacks: &[StepCallback],
    results: &[ActionResult],
    devices: &[Device],
) {
    for callback in callbacks {
        match callback {
            StepCallback::AdvanceStep => {
                machine.advance();
            }
            StepCallback::MergeCreative => {
                for payload in results.iter().filter_map(|r| r.payload.clone()) {
                    creative.merge(payload);
                }
            }
            StepCallback::AdvanceSubstep => {
                for &device in devices {
                    machine.advance_substep(device);
                }
            }
            StepCallback::ResetSubstep => machine.reset_substeps(devices),
        }
    }
}
