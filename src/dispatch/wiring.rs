use bevy::prelude::*;
use serde_json::{json, Value};

use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{self, EventBinding, UnwireSelector};
use crate::hierarchy::{self, BehaviorRef};
use crate::methods::ListenerMode;

fn source(d: &Dispatcher, world: &World, ctx: &CommandCtx) -> BridgeResult<BehaviorRef> {
    let entity = d.node(world, ctx.str("path")?)?;
    d.behavior(world, entity, ctx.str("behaviorType")?)
}

fn header(world: &World, behavior: &BehaviorRef) -> JsonMap {
    object(json!({
        "path": hierarchy::node_path(world, behavior.entity),
        "behaviorType": behavior.short_name,
    }))
}

pub(super) fn fields(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = source(d, world, ctx)?;
    ctx.resolved();
    let events = events::event_fields(world, d.catalog(), &behavior)?;
    let mut out = header(world, &behavior);
    out.insert("events".into(), Value::Array(events));
    Ok(out)
}

pub(super) fn list(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = source(d, world, ctx)?;
    let (field, listeners) =
        events::list_listeners(world, d.catalog(), &behavior, ctx.str("eventName")?)?;
    ctx.resolved();
    let rendered: Vec<Value> = listeners
        .iter()
        .enumerate()
        .map(|(i, l)| events::listener_json(i, l))
        .collect();
    let mut out = header(world, &behavior);
    out.insert("eventField".into(), json!(field.name));
    out.insert("fieldMatch".into(), json!(field.strategy));
    out.insert("count".into(), json!(rendered.len()));
    out.insert("listeners".into(), Value::Array(rendered));
    Ok(out)
}

pub(super) fn wire(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = source(d, world, ctx)?;
    let target = d.node(world, ctx.str("targetPath")?)?;
    let mode = match ctx.opt_str("mode") {
        Some(raw) => Some(ListenerMode::parse(raw).ok_or_else(|| {
            BridgeError::mismatch(format!("Unknown listener mode '{raw}'"))
        })?),
        None => None,
    };
    let binding = EventBinding {
        source: behavior.clone(),
        event: ctx.str("eventName")?.to_string(),
        target,
        target_type: ctx.opt_str("targetType").map(str::to_string),
        method: ctx.str("methodName")?.to_string(),
        mode,
        argument: ctx.value("argument").cloned(),
    };
    ctx.resolved();
    let outcome = events::wire(world, d.catalog(), d.assets(), &binding)?;
    ctx.extend_notes(outcome.notes.iter().cloned());
    let mut out = header(world, &behavior);
    out.extend(object(outcome.to_json()));
    Ok(out)
}

pub(super) fn unwire(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = source(d, world, ctx)?;
    let selector = match (ctx.opt_usize("index"), ctx.opt_str("targetPath"), ctx.opt_str("methodName")) {
        (Some(index), _, _) => UnwireSelector::Index(index),
        (None, Some(target), Some(method)) => {
            // Stored targets are canonical paths; a node that no longer
            // exists can still be unwired by its raw path.
            let target = match d.node(world, target) {
                Ok(entity) => hierarchy::node_path(world, entity),
                Err(_) => target.trim_matches('/').to_string(),
            };
            UnwireSelector::Target {
                target,
                method: method.to_string(),
            }
        }
        _ => {
            return Err(BridgeError::missing(
                "unwire_event needs 'index' or both 'targetPath' and 'methodName'",
            ))
        }
    };
    ctx.resolved();
    let (field, removed) =
        events::unwire(world, d.catalog(), &behavior, ctx.str("eventName")?, &selector)?;
    let removed: Vec<Value> = removed
        .iter()
        .map(|l| {
            let mut rendered = events::listener_json(0, l);
            if let Some(fields) = rendered.as_object_mut() {
                fields.remove("index");
            }
            rendered
        })
        .collect();
    let (_, remaining) = events::list_listeners(world, d.catalog(), &behavior, &field.name)?;
    let mut out = header(world, &behavior);
    out.insert("eventField".into(), json!(field.name));
    out.insert("removedCount".into(), json!(removed.len()));
    out.insert("removed".into(), Value::Array(removed));
    out.insert("remainingCount".into(), json!(remaining.len()));
    Ok(out)
}

pub(super) fn invoke(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = source(d, world, ctx)?;
    ctx.resolved();
    let (field, results) = events::invoke(world, d.catalog(), &behavior, ctx.str("eventName")?)?;
    let invoked = results
        .iter()
        .filter(|r| r["status"] == json!("invoked"))
        .count();
    let mut out = header(world, &behavior);
    out.insert("eventField".into(), json!(field.name));
    out.insert("invokedCount".into(), json!(invoked));
    out.insert("results".into(), Value::Array(results));
    Ok(out)
}
