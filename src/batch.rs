//! Ordered execution of several commands with per-item results.

use bevy::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

use crate::dispatch::{
    object, tool_for, Category, Command, CommandCtx, CommandResult, Dispatcher, JsonMap, ToolCall,
};
use crate::error::{BridgeError, BridgeResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub stop_on_error: bool,
    /// Attempted items; `None` means the configured cap.
    pub max_results: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub total_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<Value>,
    pub truncated: bool,
    pub remaining_count: usize,
    pub stopped_on_error: bool,
}

enum BatchItem {
    Tool(ToolCall),
    Command(Command),
}

impl BatchItem {
    fn parse(raw: &Value) -> BridgeResult<Self> {
        let Some(fields) = raw.as_object() else {
            return Err(BridgeError::missing("batch items must be objects"));
        };
        let payload = fields.get("payload").cloned().unwrap_or(Value::Null);
        if let Some(tool_name) = fields.get("toolName").and_then(Value::as_str) {
            return Ok(BatchItem::Tool(ToolCall::new(tool_name, payload)));
        }
        match (
            fields.get("category").and_then(Value::as_str),
            fields.get("operation").and_then(Value::as_str),
        ) {
            (Some(category), Some(operation)) => {
                Command::new(category, operation, payload).map(BatchItem::Command)
            }
            _ => Err(BridgeError::missing(
                "batch items need 'toolName' or both 'category' and 'operation'",
            )),
        }
    }

    fn label(&self) -> String {
        match self {
            BatchItem::Tool(call) => call.tool_name.clone(),
            BatchItem::Command(command) => tool_for(&command.category, &command.operation)
                .map(|t| t.tool_name.to_string())
                .unwrap_or_else(|| format!("{}/{}", command.category, command.operation)),
        }
    }

    fn is_batch(&self) -> bool {
        match self {
            BatchItem::Tool(call) => call.tool_name.trim() == "batch_execute",
            BatchItem::Command(command) => Category::parse(&command.category) == Some(Category::Batch),
        }
    }
}

fn label_of(raw: &Value) -> String {
    raw.get("toolName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn run_item(dispatcher: &Dispatcher, world: &mut World, raw: &Value) -> (String, CommandResult) {
    let item = match BatchItem::parse(raw) {
        Ok(item) => item,
        Err(error) => return (label_of(raw), CommandResult::failure(&error)),
    };
    let label = item.label();
    if item.is_batch() {
        let error = BridgeError::UnsupportedOperation("batches cannot be nested".into());
        return (label, CommandResult::failure(&error));
    }
    let result = match item {
        BatchItem::Tool(call) => dispatcher.execute_tool(world, call),
        BatchItem::Command(command) => dispatcher.execute(world, command),
    };
    (label, result)
}

/// Runs `items` in order through the full dispatcher pipeline, each with its
/// own gate wait. A failing item never aborts the batch unless
/// `stop_on_error` is set.
pub fn execute_all(
    dispatcher: &Dispatcher,
    world: &mut World,
    items: &[Value],
    options: BatchOptions,
) -> BatchOutcome {
    let cap = dispatcher.settings().batch_max_items.max(1);
    let limit = options.max_results.unwrap_or(cap).min(cap);
    let mut outcome = BatchOutcome {
        total_count: items.len(),
        success_count: 0,
        error_count: 0,
        results: Vec::with_capacity(items.len().min(limit)),
        truncated: items.len() > limit,
        remaining_count: 0,
        stopped_on_error: false,
    };

    for (index, raw) in items.iter().take(limit).enumerate() {
        let (label, result) = run_item(dispatcher, world, raw);
        let failed = !result.is_success();
        if failed {
            outcome.error_count += 1;
        } else {
            outcome.success_count += 1;
        }
        let mut envelope = result.to_envelope();
        envelope["index"] = json!(index);
        envelope["toolName"] = json!(label);
        outcome.results.push(envelope);
        if failed && options.stop_on_error {
            outcome.stopped_on_error = true;
            break;
        }
    }
    outcome.remaining_count = outcome.total_count - outcome.results.len();
    info!(
        "[Bridge batch] {} item(s): {} ok, {} failed, {} not run",
        outcome.total_count, outcome.success_count, outcome.error_count, outcome.remaining_count
    );
    outcome
}

pub(crate) fn handle(
    dispatcher: &Dispatcher,
    world: &mut World,
    ctx: &mut CommandCtx,
) -> BridgeResult<JsonMap> {
    let items = ctx
        .value("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::missing("'items' must be an array"))?;
    let options = BatchOptions {
        stop_on_error: ctx.opt_bool("stopOnError").unwrap_or(false),
        max_results: ctx.opt_usize("maxResults"),
    };
    ctx.resolved();
    let outcome = execute_all(dispatcher, world, items, options);
    serde_json::to_value(outcome)
        .map(object)
        .map_err(|e| BridgeError::rejected(format!("could not render batch outcome: {e}")))
}
