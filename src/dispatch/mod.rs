mod behaviors;
mod compilation;
mod nodes;
mod table;
mod transform;
mod types;
mod wiring;
#[cfg(test)]
mod tests;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::assets::{AssetStore, AssetStoreHandle};
use crate::error::{BridgeError, BridgeResult, ErrorKind};
use crate::gate::{CompilationGate, GateWait};
use crate::hierarchy::{self, BehaviorRef};
use crate::registry::TypeCatalog;

pub use table::{tool_by_name, tool_for, tools, ArgSpec, Shape, ToolSpec};

pub type JsonMap = Map<String, Value>;

/// Handler behind one tool table row.
pub type Handler = fn(&Dispatcher, &mut World, &mut CommandCtx) -> BridgeResult<JsonMap>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Node,
    Behavior,
    Transform,
    Types,
    Event,
    Batch,
    Compilation,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Node,
        Category::Behavior,
        Category::Transform,
        Category::Types,
        Category::Event,
        Category::Batch,
        Category::Compilation,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Category::Node => "node",
            Category::Behavior => "behavior",
            Category::Transform => "transform",
            Category::Types => "types",
            Category::Event => "event",
            Category::Batch => "batch",
            Category::Compilation => "compilation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(value))
    }
}

/// Inbound transport envelope.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub payload: Value,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub category: String,
    pub operation: String,
    pub payload: JsonMap,
}

impl Command {
    pub fn new(category: impl Into<String>, operation: impl Into<String>, payload: Value) -> BridgeResult<Self> {
        Ok(Self {
            category: category.into(),
            operation: operation.into(),
            payload: payload_object(payload)?,
        })
    }
}

fn payload_object(payload: Value) -> BridgeResult<JsonMap> {
    match payload {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonMap::new()),
        other => Err(BridgeError::missing(format!(
            "payload must be an object, got {}",
            crate::coercion::json_kind(&other)
        ))),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandResult {
    Success(JsonMap),
    Failure { kind: ErrorKind, message: String },
}

impl CommandResult {
    pub fn failure(error: &BridgeError) -> Self {
        CommandResult::Failure {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CommandResult::Success(_) => None,
            CommandResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn data(&self) -> Option<&JsonMap> {
        match self {
            CommandResult::Success(data) => Some(data),
            CommandResult::Failure { .. } => None,
        }
    }

    /// Outbound envelope: data plus `success: true`, or
    /// `{success: false, error, errorKind}`.
    pub fn to_envelope(&self) -> Value {
        match self {
            CommandResult::Success(data) => {
                let mut out = data.clone();
                out.insert("success".into(), Value::Bool(true));
                Value::Object(out)
            }
            CommandResult::Failure { kind, message } => json!({
                "success": false,
                "error": message,
                "errorKind": kind.as_str(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    GateWait,
    Resolved,
    Executed,
    Responded,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::GateWait => "gate_wait",
            Stage::Resolved => "resolved",
            Stage::Executed => "executed",
            Stage::Responded => "responded",
            Stage::Failed => "failed",
        }
    }
}

/// Per-command state handed to handlers.
pub struct CommandCtx<'a> {
    pub spec: &'static ToolSpec,
    pub payload: &'a JsonMap,
    stage: Stage,
    notes: Vec<String>,
}

impl<'a> CommandCtx<'a> {
    fn new(spec: &'static ToolSpec, payload: &'a JsonMap) -> Self {
        Self {
            spec,
            payload,
            stage: Stage::Received,
            notes: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Marks target resolution as done.
    pub fn resolved(&mut self) {
        self.stage = Stage::Resolved;
    }

    pub fn extend_notes(&mut self, notes: impl IntoIterator<Item = String>) {
        self.notes.extend(notes);
    }

    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    pub fn required(&self, key: &str) -> BridgeResult<&'a Value> {
        self.value(key)
            .ok_or_else(|| BridgeError::missing(format!("'{key}' is required")))
    }

    pub fn str(&self, key: &str) -> BridgeResult<&'a str> {
        self.required(key)?
            .as_str()
            .ok_or_else(|| BridgeError::missing(format!("'{key}' must be a string")))
    }

    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(Value::as_bool)
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(Value::as_f64)
    }

    pub fn opt_usize(&self, key: &str) -> Option<usize> {
        self.value(key)
            .and_then(Value::as_u64)
            .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
    }
}

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub default_max_wait_seconds: f64,
    pub default_max_results: usize,
    pub batch_max_items: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_max_wait_seconds: 30.0,
            default_max_results: 100,
            batch_max_items: 100,
        }
    }
}

impl From<&crate::config::BridgeConfig> for DispatchSettings {
    fn from(config: &crate::config::BridgeConfig) -> Self {
        Self {
            default_max_wait_seconds: config.default_max_wait_seconds,
            default_max_results: config.default_max_results,
            batch_max_items: config.batch_max_items,
        }
    }
}

/// Routes tool calls and commands through validation, gating, resolution and
/// execution. Cheap to clone; clone it out of the world before executing.
#[derive(Resource, Clone)]
pub struct Dispatcher {
    catalog: TypeCatalog,
    gate: CompilationGate,
    assets: Option<AssetStoreHandle>,
    settings: Arc<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(
        catalog: TypeCatalog,
        gate: CompilationGate,
        assets: Option<AssetStoreHandle>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            catalog,
            gate,
            assets,
            settings: Arc::new(settings),
        }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn gate(&self) -> &CompilationGate {
        &self.gate
    }

    pub fn assets(&self) -> Option<&dyn AssetStore> {
        self.assets.as_ref().map(|handle| handle.0.as_ref())
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn node(&self, world: &World, path: &str) -> BridgeResult<Entity> {
        hierarchy::resolve_node(world, path)
    }

    pub fn behavior(&self, world: &World, entity: Entity, type_name: &str) -> BridgeResult<BehaviorRef> {
        hierarchy::resolve_behavior(world, &self.catalog, entity, type_name)
    }

    pub fn execute_tool(&self, world: &mut World, call: ToolCall) -> CommandResult {
        let Some(spec) = tool_by_name(&call.tool_name) else {
            let error = BridgeError::UnsupportedOperation(format!("Unknown tool '{}'", call.tool_name));
            warn!("[Bridge dispatch] {error}");
            return CommandResult::failure(&error);
        };
        match payload_object(call.payload) {
            Ok(payload) => self.run(world, spec, &payload),
            Err(error) => self.fail(spec, Stage::Received, error),
        }
    }

    pub fn execute(&self, world: &mut World, command: Command) -> CommandResult {
        let Some(spec) = tool_for(&command.category, &command.operation) else {
            let error = BridgeError::UnsupportedOperation(format!(
                "Unknown operation '{}/{}'",
                command.category, command.operation
            ));
            warn!("[Bridge dispatch] {error}");
            return CommandResult::failure(&error);
        };
        self.run(world, spec, &command.payload)
    }

    fn fail(&self, spec: &ToolSpec, stage: Stage, error: BridgeError) -> CommandResult {
        warn!(
            "[Bridge dispatch] {} failed at {} ({}): {error}",
            spec.tool_name,
            stage.as_str(),
            error.kind()
        );
        CommandResult::failure(&error)
    }

    fn refresh_types(&self) {
        if self.gate.take_finished_rebuild() {
            info!("[Bridge dispatch] Rebuild finished, dropping cached type resolutions");
            self.catalog.invalidate();
        }
    }

    fn run(&self, world: &mut World, spec: &'static ToolSpec, payload: &JsonMap) -> CommandResult {
        let mut ctx = CommandCtx::new(spec, payload);
        debug!(
            "[Bridge dispatch] {} ({}/{}) received",
            spec.tool_name,
            spec.category.slug(),
            spec.operation
        );

        if let Err(error) = spec.validate(payload) {
            return self.fail(spec, ctx.stage(), error);
        }
        ctx.advance(Stage::Validated);
        self.refresh_types();

        let mut wait: Option<GateWait> = None;
        if spec.mutating {
            ctx.advance(Stage::GateWait);
            let max_wait = ctx
                .opt_f64("maxWaitSeconds")
                .unwrap_or(self.settings.default_max_wait_seconds)
                .max(0.0);
            let outcome = self.gate.await_stable(max_wait);
            if outcome.timed_out() && ctx.opt_bool("failOnCompilationTimeout").unwrap_or(false) {
                return self.fail(
                    spec,
                    ctx.stage(),
                    BridgeError::CompilationTimeout {
                        waited_seconds: outcome.elapsed_seconds,
                    },
                );
            }
            if outcome.waited {
                self.refresh_types();
            }
            wait = Some(outcome);
        }

        let handler = spec.handler;
        let executed = catch_unwind(AssertUnwindSafe(|| handler(self, world, &mut ctx)));
        let mut data = match executed {
            Ok(Ok(data)) => data,
            Ok(Err(error)) => return self.fail(spec, ctx.stage(), error),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return self.fail(
                    spec,
                    ctx.stage(),
                    BridgeError::rejected(format!("handler panicked: {message}")),
                );
            }
        };
        ctx.advance(Stage::Executed);

        if let Some(wait) = wait {
            data.insert("compilationWaitInfo".into(), wait.to_json());
            if wait.timed_out() {
                data.insert("compilationWaitTimedOut".into(), Value::Bool(true));
            }
        }
        if !ctx.notes.is_empty() {
            data.insert(
                "coercionNotes".into(),
                Value::Array(ctx.notes.drain(..).map(Value::String).collect()),
            );
        }
        ctx.advance(Stage::Responded);
        debug!("[Bridge dispatch] {} responded", spec.tool_name);
        CommandResult::Success(data)
    }
}

/// Converts a `json!({...})` literal into handler output.
pub(crate) fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = JsonMap::new();
            map.insert("value".into(), other);
            map
        }
    }
}

/// Runs `call` with the [`Dispatcher`] installed in `world`.
pub fn execute_in_world(world: &mut World, call: ToolCall) -> CommandResult {
    let Some(dispatcher) = world.get_resource::<Dispatcher>().cloned() else {
        return CommandResult::failure(&BridgeError::rejected("the bridge plugin is not installed"));
    };
    dispatcher.execute_tool(world, call)
}
