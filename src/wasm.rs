//! WASM bindings for the build session.
//!
//! This module exposes a [`BuildSession`] over an Automerge document to a
//! JavaScript workflow UI. Commands return plain JS objects shaped like
//! [`StepOutcome`].

use js_sys::{Array, Uint8Array};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

use crate::config::WorkflowConfig;
use crate::document::{DocNode, DocumentApi, DocumentManager};
use crate::error::BuildError;
use crate::workflow::{BuildSession, Command, StepOutcome};

/// Serialize a value to JsValue with maps as plain JS objects (not Map).
fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&Serializer::new().serialize_maps_as_objects(true))
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<BuildError> for JsValue {
    fn from(err: BuildError) -> JsValue {
        JsValue::from_str(&err.to_string())
    }
}

/// Helper macro for Result conversion
macro_rules! js_result {
    ($expr:expr) => {
        $expr.map_err(|e: BuildError| JsValue::from(e))
    };
}

/// Reads a workflow config, falling back to the standard one for null/undefined.
fn config_from_js(config: JsValue) -> Result<WorkflowConfig, JsValue> {
    if config.is_null() || config.is_undefined() {
        return Ok(WorkflowConfig::standard());
    }
    Ok(from_value(config)?)
}

// =============================================================================
// MAIN WRAPPER TYPE
// =============================================================================

/// JavaScript-friendly wrapper around a build session.
#[wasm_bindgen]
pub struct JsBuildSession {
    inner: BuildSession<DocumentManager>,
}

#[wasm_bindgen]
impl JsBuildSession {
    /// Opens a session over a fresh document holding `boards`.
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const session = new JsBuildSession('Spring campaign', boards, null);
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(name: &str, boards: JsValue, config: JsValue) -> Result<JsBuildSession, JsValue> {
        let boards: Vec<DocNode> = from_value(boards)?;
        let config = config_from_js(config)?;
        let document = js_result!(DocumentManager::with_nodes(name, boards))?;
        let inner = js_result!(BuildSession::init(document, config))?;
        Ok(JsBuildSession { inner })
    }

    /// Opens a session over a saved document (Uint8Array).
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const session = JsBuildSession.fromBytes(bytes, null);
    /// ```
    #[wasm_bindgen(js_name = fromBytes)]
    pub fn from_bytes(bytes: &[u8], config: JsValue) -> Result<JsBuildSession, JsValue> {
        let config = config_from_js(config)?;
        let document = js_result!(DocumentManager::from_bytes(bytes))?;
        let inner = js_result!(BuildSession::init(document, config))?;
        Ok(JsBuildSession { inner })
    }

    /// Saves the document to binary bytes (returns Uint8Array).
    #[wasm_bindgen(js_name = toBytes)]
    pub fn to_bytes(&mut self) -> Uint8Array {
        let bytes = self.inner.document_mut().save();
        Uint8Array::from(&bytes[..])
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

#[wasm_bindgen]
impl JsBuildSession {
    /// Runs the current step's next action.
    ///
    /// # Example (JavaScript)
    /// ```js
    /// const outcome = session.next();
    /// if (!outcome.success) showError(outcome.message);
    /// ```
    pub fn next(&mut self) -> Result<JsValue, JsValue> {
        self.run(Command::Next)
    }

    pub fn prev(&mut self) -> Result<JsValue, JsValue> {
        self.run(Command::Prev)
    }

    pub fn substep(&mut self) -> Result<JsValue, JsValue> {
        self.run(Command::Substep)
    }

    /// Runs a command by name: "next", "prev" or "substep".
    pub fn dispatch(&mut self, command: &str) -> Result<JsValue, JsValue> {
        let command: Command = js_result!(command.parse())?;
        self.run(command)
    }
}

impl JsBuildSession {
    fn run(&mut self, command: Command) -> Result<JsValue, JsValue> {
        let outcome: StepOutcome = js_result!(self.inner.dispatch(command))?;
        Ok(to_js_value(&outcome)?)
    }
}

// =============================================================================
// STATE AND SNAPSHOT METHODS
// =============================================================================

#[wasm_bindgen]
impl JsBuildSession {
    /// Gets the step position, sub-step counters, snapshots and registry.
    #[wasm_bindgen(js_name = getStatus)]
    pub fn get_status(&self) -> Result<JsValue, JsValue> {
        Ok(to_js_value(&self.inner.status())?)
    }

    #[wasm_bindgen(js_name = currentStep)]
    pub fn current_step(&self) -> usize {
        self.inner.current_step_index()
    }

    /// Gets the document's board tree.
    #[wasm_bindgen(js_name = getBoards)]
    pub fn get_boards(&mut self) -> Result<JsValue, JsValue> {
        let nodes = js_result!(self.inner.document_mut().nodes())?;
        Ok(to_js_value(&nodes)?)
    }

    /// Captures `Step_<current>` and returns the snapshot.
    #[wasm_bindgen(js_name = captureSnapshot)]
    pub fn capture_snapshot(&mut self) -> Result<JsValue, JsValue> {
        let snapshot = js_result!(self.inner.capture_snapshot())?;
        Ok(to_js_value(&snapshot)?)
    }

    /// Restores the latest snapshot with this name; returns the new step index.
    #[wasm_bindgen(js_name = restoreSnapshot)]
    pub fn restore_snapshot(&mut self, name: &str) -> Result<usize, JsValue> {
        js_result!(self.inner.restore_snapshot(name))
    }

    /// Snapshot names in capture order.
    #[wasm_bindgen(js_name = listSnapshots)]
    pub fn list_snapshots(&self) -> Array {
        let array = Array::new();
        for snapshot in self.inner.snapshots() {
            array.push(&JsValue::from_str(&snapshot.name));
        }
        array
    }

    #[wasm_bindgen(js_name = clearSnapshots)]
    pub fn clear_snapshots(&mut self) -> Result<(), JsValue> {
        js_result!(self.inner.clear_snapshots())
    }
}
