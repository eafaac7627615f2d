use bevy::prelude::*;
use serde_json::{json, Value};

use super::behaviors::{build_behavior, BuiltBehavior};
use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::coercion::{coerce_onto, CoercionContext};
use crate::components::Active;
use crate::error::{BridgeError, BridgeResult};
use crate::hierarchy;

const DEFAULT_HIERARCHY_DEPTH: usize = 3;

fn checked_name(raw: &str) -> BridgeResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(BridgeError::missing("node name is empty"));
    }
    if name.contains('/') {
        return Err(BridgeError::rejected(format!(
            "Node names cannot contain '/': '{name}'"
        )));
    }
    Ok(name.to_string())
}

fn descendant_count(world: &World, entity: Entity) -> usize {
    hierarchy::children(world, entity)
        .into_iter()
        .map(|child| 1 + descendant_count(world, child))
        .sum()
}

pub(super) fn find(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    ctx.resolved();
    Ok(object(json!({ "node": hierarchy::node_info(world, d.catalog(), entity) })))
}

pub(super) fn find_all(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let pattern = ctx.str("pattern")?;
    let max = ctx
        .opt_usize("maxResults")
        .unwrap_or(d.settings().default_max_results);
    let found = hierarchy::find_all(world, pattern, max)?;
    ctx.resolved();
    let matches: Vec<Value> = found
        .matches
        .iter()
        .map(|e| hierarchy::node_info(world, d.catalog(), *e))
        .collect();
    Ok(object(json!({
        "pattern": pattern,
        "count": matches.len(),
        "matches": matches,
        "truncated": found.truncated,
    })))
}

pub(super) fn hierarchy(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let depth = ctx.opt_usize("maxDepth").unwrap_or(DEFAULT_HIERARCHY_DEPTH);
    let capacity = ctx
        .opt_usize("maxResults")
        .unwrap_or(d.settings().default_max_results)
        .max(1);
    let mut budget = capacity;

    let out = match ctx.opt_str("path") {
        Some(path) => {
            let entity = d.node(world, path)?;
            ctx.resolved();
            json!({ "node": hierarchy::hierarchy_tree(world, d.catalog(), entity, depth, &mut budget) })
        }
        None => {
            ctx.resolved();
            let mut roots = Vec::new();
            let mut truncated = false;
            for root in hierarchy::roots(world) {
                if budget == 0 {
                    truncated = true;
                    break;
                }
                roots.push(hierarchy::hierarchy_tree(world, d.catalog(), root, depth, &mut budget));
            }
            json!({ "roots": roots, "rootsTruncated": truncated })
        }
    };
    let mut out = object(out);
    out.insert("nodeCount".into(), json!(capacity - budget));
    Ok(out)
}

pub(super) fn create(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let name = checked_name(ctx.str("name")?)?;
    let parent = ctx.opt_str("parent").map(|p| d.node(world, p)).transpose()?;

    let mut built: Vec<BuiltBehavior> = Vec::new();
    if let Some(requested) = ctx.value("behaviors") {
        let entries = requested
            .as_array()
            .ok_or_else(|| BridgeError::missing("'behaviors' must be an array"))?;
        for entry in entries {
            let (type_name, properties) = match entry {
                Value::String(name) => (name.as_str(), None),
                Value::Object(map) => (
                    map.get("type")
                        .and_then(Value::as_str)
                        .ok_or_else(|| BridgeError::missing("behavior entries need a 'type'"))?,
                    map.get("properties"),
                ),
                other => {
                    return Err(BridgeError::missing(format!(
                        "behavior entries must be names or objects, got {}",
                        crate::coercion::json_kind(other)
                    )))
                }
            };
            let behavior = build_behavior(d, world, type_name, properties, None)?;
            if built.iter().any(|b| b.resolved.type_id == behavior.resolved.type_id) {
                return Err(BridgeError::rejected(format!(
                    "{} is listed more than once",
                    behavior.resolved.short_name
                )));
            }
            built.push(behavior);
        }
    }

    let mut transform = Transform::default();
    if let Some(translation) = ctx.value("translation") {
        let registry = d.catalog().registry().read();
        let mut coercion = CoercionContext::new(&registry, d.assets());
        coerce_onto(&mut transform.translation, translation, &mut coercion, "translation")?;
        ctx.extend_notes(coercion.take_notes());
    }
    ctx.resolved();

    let mut spawned = world.spawn((Name::new(name.clone()), transform));
    if let Some(parent) = parent {
        spawned.set_parent(parent);
    }
    if let Some(active) = ctx.opt_bool("active") {
        spawned.insert(Active(active));
    }
    let entity = spawned.id();

    let registry = d.catalog().registry().read();
    for behavior in &built {
        let mut target = world.entity_mut(entity);
        behavior
            .component
            .insert(&mut target, behavior.value.as_ref(), &registry);
    }
    drop(registry);
    for behavior in built {
        ctx.extend_notes(behavior.notes);
    }

    info!(
        "[Bridge dispatch] Created node '{}'",
        hierarchy::node_path(world, entity)
    );
    Ok(object(json!({ "node": hierarchy::node_info(world, d.catalog(), entity) })))
}

pub(super) fn delete(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    ctx.resolved();
    let path = hierarchy::node_path(world, entity);
    let removed = 1 + descendant_count(world, entity);
    world.entity_mut(entity).despawn_recursive();
    info!("[Bridge dispatch] Deleted '{path}' ({removed} node(s))");
    Ok(object(json!({ "deleted": path, "removedCount": removed })))
}

pub(super) fn rename(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    let name = checked_name(ctx.str("newName")?)?;
    ctx.resolved();
    let before = hierarchy::node_path(world, entity);
    world.entity_mut(entity).insert(Name::new(name));
    Ok(object(json!({
        "before": before,
        "after": hierarchy::node_path(world, entity),
    })))
}

pub(super) fn reparent(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    let parent = ctx.opt_str("newParent").map(|p| d.node(world, p)).transpose()?;
    if let Some(parent) = parent {
        if hierarchy::is_self_or_ancestor(world, entity, parent) {
            return Err(BridgeError::rejected(format!(
                "Cannot move '{}' under '{}': that would create a cycle",
                hierarchy::node_path(world, entity),
                hierarchy::node_path(world, parent)
            )));
        }
    }
    ctx.resolved();
    let before = hierarchy::node_path(world, entity);
    let mut node = world.entity_mut(entity);
    match parent {
        Some(parent) => {
            node.set_parent(parent);
        }
        None => {
            node.remove_parent();
        }
    }
    Ok(object(json!({
        "before": before,
        "after": hierarchy::node_path(world, entity),
    })))
}

pub(super) fn set_active(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    let active = ctx
        .opt_bool("active")
        .ok_or_else(|| BridgeError::missing("'active' must be a bool"))?;
    ctx.resolved();
    let before = hierarchy::is_active(world, entity);
    world.entity_mut(entity).insert(Active(active));
    Ok(object(json!({
        "path": hierarchy::node_path(world, entity),
        "before": before,
        "after": active,
        "activeInHierarchy": hierarchy::is_active_in_hierarchy(world, entity),
    })))
}
