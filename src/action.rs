//! Action executor and the named functions actions are built from.
//!
//! An action is an ordered list of [`FunctionSpec`]s. The executor resolves
//! each `do_it` name in a [`FunctionRegistry`] and runs them one after the
//! other against a shared [`ActionContext`], collecting one [`ActionResult`]
//! per function. A failing function never stops the ones after it.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WorkflowConfig;
use crate::creative::{Creative, Device};
use crate::document::DocumentApi;
use crate::error::{BuildError, BuildResult};
use crate::locator::{find_boards, MatcherSpec};
use crate::propagate::{PropagateOptions, PropagationEngine};

// =============================================================================
// RESULTS
// =============================================================================

/// Outcome of one action function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    /// Updated registry, merged into the session by `MergeCreative`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Creative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
            count: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
            count: None,
        }
    }

    pub fn with_payload(mut self, payload: Creative) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// Overall success of a result list and the first failure message, if any.
pub fn summarize(results: &[ActionResult]) -> (bool, Option<String>) {
    match results.iter().find(|r| !r.success) {
        Some(failed) => (false, Some(failed.message.clone())),
        None => (true, None),
    }
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// A named function reference inside an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub id: String,
    /// Registry name of the function to run.
    pub do_it: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

impl FunctionSpec {
    pub fn new(id: impl Into<String>, do_it: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            do_it: do_it.into(),
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

/// Everything a function may touch while an action runs.
pub struct ActionContext<'a> {
    pub document: &'a mut dyn DocumentApi,
    /// Working copy of the session registry.
    pub creative: Creative,
    pub devices: Vec<Device>,
    pub sequences: Vec<String>,
    pub config: &'a WorkflowConfig,
}

impl fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("devices", &self.devices)
            .field("sequences", &self.sequences)
            .field("boards", &self.creative.len())
            .finish()
    }
}

/// A unit of work an action can reference by name.
pub trait ActionFunction {
    fn call(&self, ctx: &mut ActionContext<'_>, options: &Value) -> BuildResult<ActionResult>;
}

impl<F> ActionFunction for F
where
    F: Fn(&mut ActionContext<'_>, &Value) -> BuildResult<ActionResult>,
{
    fn call(&self, ctx: &mut ActionContext<'_>, options: &Value) -> BuildResult<ActionResult> {
        self(ctx, options)
    }
}

/// Functions available to actions, by name.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Box<dyn ActionFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `propagate`, `normalize` and `require_boards`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("propagate", propagate);
        registry.register("normalize", normalize);
        registry.register("require_boards", require_boards);
        registry
    }

    /// Registers (or replaces) a function.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&mut ActionContext<'_>, &Value) -> BuildResult<ActionResult> + 'static,
    {
        self.register_boxed(name, Box::new(function));
    }

    pub fn register_boxed(&mut self, name: impl Into<String>, function: Box<dyn ActionFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ActionFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Runs function lists against a registry.
pub struct ActionExecutor<'r> {
    registry: &'r FunctionRegistry,
}

impl<'r> ActionExecutor<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self { registry }
    }

    /// Runs every function in order, one result per function.
    ///
    /// An empty list yields a single "nothing to do" success.
    pub fn run(&self, functions: &[FunctionSpec], ctx: &mut ActionContext<'_>) -> Vec<ActionResult> {
        if functions.is_empty() {
            return vec![ActionResult::ok("nothing to do")];
        }

        let mut results = Vec::with_capacity(functions.len());
        for spec in functions {
            let result = match self.registry.get(&spec.do_it) {
                Some(function) => function.call(ctx, &spec.options),
                None => Err(BuildError::unknown_function(&spec.do_it)),
            };
            let result = result.unwrap_or_else(|err| ActionResult::failure(err.to_string()));
            if result.success {
                debug!(function = %spec.id, message = %result.message, "function finished");
            } else {
                warn!(function = %spec.id, message = %result.message, "function failed");
            }
            results.push(result);
        }
        results
    }
}

// =============================================================================
// STANDARD FUNCTIONS
// =============================================================================

/// Deserializes function options, treating `null` as all defaults.
fn parse_options<T: DeserializeOwned + Default>(options: &Value) -> BuildResult<T> {
    if options.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(options.clone())?)
}

/// Grows every sequence of the context by one propagation.
pub fn propagate(ctx: &mut ActionContext<'_>, options: &Value) -> BuildResult<ActionResult> {
    let options: PropagateOptions = parse_options(options)?;
    PropagationEngine::new(ctx.config).propagate(
        ctx.document,
        &mut ctx.creative,
        &ctx.devices,
        &ctx.sequences,
        &options,
    )
}

/// Normalizes the source board of every sequence without cloning it.
pub fn normalize(ctx: &mut ActionContext<'_>, _options: &Value) -> BuildResult<ActionResult> {
    let engine = PropagationEngine::new(ctx.config);
    let nodes = ctx.document.nodes()?;
    let mut sources = Vec::new();
    for &device in &ctx.devices {
        for name in &ctx.sequences {
            match engine.locate_source(&nodes, &ctx.creative, device, name) {
                Ok(board) => sources.push(board),
                Err(err @ BuildError::NoValidBoards(_)) => {
                    return Ok(ActionResult::failure(err.to_string()))
                }
                Err(err) => return Err(err),
            }
        }
    }
    let mut commands = 0;
    for board in &sources {
        commands += engine.normalize(ctx.document, board)?;
    }
    Ok(ActionResult::ok(format!("normalized {} boards", sources.len())).with_count(commands))
}

#[derive(Debug, Deserialize)]
struct RequireBoardsOptions {
    matcher: MatcherSpec,
    #[serde(default = "default_min")]
    min: usize,
}

fn default_min() -> usize {
    1
}

/// Fails unless every device in scope has at least `min` boards matching the
/// configured matcher. `${device}` in the matcher is replaced per device.
pub fn require_boards(ctx: &mut ActionContext<'_>, options: &Value) -> BuildResult<ActionResult> {
    let options: RequireBoardsOptions = serde_json::from_value(options.clone())?;
    let nodes = ctx.document.nodes()?;
    let mut total = 0;
    for &device in &ctx.devices {
        let spec = options
            .matcher
            .for_device(&ctx.config.profile(device)?.abbreviation);
        let found = find_boards(Some(&nodes), None, &spec.compile()?).len();
        if found < options.min {
            return Ok(ActionResult::failure(
                BuildError::no_valid_boards(spec.to_string()).to_string(),
            ));
        }
        total += found;
    }
    Ok(ActionResult::ok(format!("found {} boards", total)).with_count(total))
}
