use bevy::prelude::*;
use globset::Glob;
use serde_json::{json, Value};

use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::ResolvedType;

fn resolve_named(d: &Dispatcher, world: &World, ctx: &mut CommandCtx) -> BridgeResult<ResolvedType> {
    let node = ctx.opt_str("path").map(|p| d.node(world, p)).transpose()?;
    let resolved = d.catalog().resolve(world, ctx.str("typeName")?, node)?;
    ctx.resolved();
    Ok(resolved)
}

pub(super) fn resolve(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let resolved = resolve_named(d, world, ctx)?;
    Ok(object(json!({ "type": resolved.to_json() })))
}

pub(super) fn describe(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let resolved = resolve_named(d, world, ctx)?;
    let descriptor = d.catalog().describe(&resolved)?;
    let descriptor = serde_json::to_value(descriptor)
        .map_err(|e| BridgeError::rejected(format!("could not render type descriptor: {e}")))?;
    Ok(object(json!({
        "tier": resolved.tier,
        "descriptor": descriptor,
    })))
}

pub(super) fn list(d: &Dispatcher, _world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let matcher = match ctx.opt_str("filter").map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => Some(
            Glob::new(filter)
                .map(|g| g.compile_matcher())
                .map_err(|e| BridgeError::mismatch(format!("Invalid filter '{filter}': {e}")))?,
        ),
        None => None,
    };
    let max = ctx
        .opt_usize("maxResults")
        .unwrap_or(d.settings().default_max_results)
        .max(1);
    ctx.resolved();

    let mut matching = d
        .catalog()
        .behavior_types()
        .into_iter()
        .filter(|t| matcher.as_ref().map_or(true, |m| m.is_match(&t.short_name)));
    let types: Vec<Value> = matching
        .by_ref()
        .take(max)
        .map(|t| json!({ "shortName": t.short_name, "typePath": t.type_path }))
        .collect();
    let truncated = matching.next().is_some();
    Ok(object(json!({
        "count": types.len(),
        "types": types,
        "truncated": truncated,
    })))
}
