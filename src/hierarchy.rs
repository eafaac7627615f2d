use std::any::TypeId;

use bevy::prelude::*;
use bevy::reflect::PartialReflect;
use globset::{Glob, GlobMatcher};
use serde_json::{json, Value};

use crate::components::Active;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::TypeCatalog;

/// Component types that make up the node itself and are never listed as
/// behaviors.
pub fn is_structural(type_id: TypeId) -> bool {
    type_id == TypeId::of::<Name>()
        || type_id == TypeId::of::<Parent>()
        || type_id == TypeId::of::<Children>()
        || type_id == TypeId::of::<Active>()
        || type_id == TypeId::of::<GlobalTransform>()
}

pub fn node_exists(world: &World, entity: Entity) -> bool {
    world.entities().contains(entity)
}

pub fn node_name(world: &World, entity: Entity) -> Option<&str> {
    world.get::<Name>(entity).map(|n| n.as_str())
}

/// Named entities without a parent, by entity index. Bevy recycles the index
/// of a despawned entity, so a root created after a delete can sort ahead of
/// older roots.
pub fn roots(world: &World) -> Vec<Entity> {
    let mut roots: Vec<Entity> = world
        .iter_entities()
        .filter(|e| e.contains::<Name>() && !e.contains::<Parent>())
        .map(|e| e.id())
        .collect();
    roots.sort_by_key(|e| e.index());
    roots
}

/// Named children in `Children` order.
pub fn children(world: &World, entity: Entity) -> Vec<Entity> {
    world
        .get::<Children>(entity)
        .map(|children| {
            children
                .iter()
                .copied()
                .filter(|c| world.get::<Name>(*c).is_some())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parent(world: &World, entity: Entity) -> Option<Entity> {
    world.get::<Parent>(entity).map(|p| p.get())
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolves a `/`-delimited path. Each level takes the first child with a
/// matching name; duplicate sibling names are not disambiguated.
pub fn resolve_node(world: &World, path: &str) -> BridgeResult<Entity> {
    let parts = segments(path);
    if parts.is_empty() {
        return Err(BridgeError::missing("node path is empty"));
    }
    let mut level = roots(world);
    let mut current = None;
    for (depth, part) in parts.iter().enumerate() {
        let found = level
            .iter()
            .copied()
            .find(|e| node_name(world, *e) == Some(*part))
            .ok_or_else(|| {
                let walked = parts[..depth].join("/");
                if walked.is_empty() {
                    BridgeError::not_found(format!("Node '{path}' not found: no root named '{part}'"))
                } else {
                    BridgeError::not_found(format!(
                        "Node '{path}' not found: '{walked}' has no child named '{part}'"
                    ))
                }
            })?;
        level = children(world, found);
        current = Some(found);
    }
    current.ok_or_else(|| BridgeError::not_found(format!("Node '{path}' not found")))
}

pub fn node_path(world: &World, entity: Entity) -> String {
    let mut names = Vec::new();
    let mut cursor = Some(entity);
    while let Some(e) = cursor {
        names.push(
            node_name(world, e)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{e}")),
        );
        cursor = parent(world, e);
    }
    names.reverse();
    names.join("/")
}

pub fn is_active(world: &World, entity: Entity) -> bool {
    world.get::<Active>(entity).map_or(true, |a| a.0)
}

pub fn is_active_in_hierarchy(world: &World, entity: Entity) -> bool {
    let mut cursor = Some(entity);
    while let Some(e) = cursor {
        if !is_active(world, e) {
            return false;
        }
        cursor = parent(world, e);
    }
    true
}

/// True when `ancestor` is `entity` or one of its ancestors.
pub fn is_self_or_ancestor(world: &World, ancestor: Entity, entity: Entity) -> bool {
    let mut cursor = Some(entity);
    while let Some(e) = cursor {
        if e == ancestor {
            return true;
        }
        cursor = parent(world, e);
    }
    false
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindResult {
    pub matches: Vec<Entity>,
    pub truncated: bool,
}

fn compile(segment: &str) -> BridgeResult<GlobMatcher> {
    Glob::new(segment)
        .map(|g| g.compile_matcher())
        .map_err(|e| BridgeError::mismatch(format!("Invalid pattern '{segment}': {e}")))
}

fn name_matches(world: &World, entity: Entity, matcher: &GlobMatcher) -> bool {
    node_name(world, entity).is_some_and(|name| matcher.is_match(name))
}

/// Glob search in pre-order. Patterns with `/` are anchored at the roots and
/// matched one level per segment; bare patterns match names at any depth.
pub fn find_all(world: &World, pattern: &str, max_results: usize) -> BridgeResult<FindResult> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(BridgeError::missing("pattern is empty"));
    }
    let limit = max_results.max(1);
    let mut matches = Vec::new();

    if pattern.contains('/') {
        let matchers = segments(pattern)
            .into_iter()
            .map(compile)
            .collect::<BridgeResult<Vec<_>>>()?;
        if matchers.is_empty() {
            return Err(BridgeError::missing("pattern has no segments"));
        }
        for root in roots(world) {
            collect_anchored(world, root, &matchers, 0, limit + 1, &mut matches);
        }
    } else {
        let matcher = compile(pattern)?;
        for root in roots(world) {
            collect_any_depth(world, root, &matcher, limit + 1, &mut matches);
        }
    }

    let truncated = matches.len() > limit;
    matches.truncate(limit);
    Ok(FindResult { matches, truncated })
}

fn collect_anchored(
    world: &World,
    entity: Entity,
    matchers: &[GlobMatcher],
    depth: usize,
    cap: usize,
    out: &mut Vec<Entity>,
) {
    if out.len() >= cap || !name_matches(world, entity, &matchers[depth]) {
        return;
    }
    if depth + 1 == matchers.len() {
        out.push(entity);
        return;
    }
    for child in children(world, entity) {
        collect_anchored(world, child, matchers, depth + 1, cap, out);
    }
}

fn collect_any_depth(
    world: &World,
    entity: Entity,
    matcher: &GlobMatcher,
    cap: usize,
    out: &mut Vec<Entity>,
) {
    if out.len() >= cap {
        return;
    }
    if name_matches(world, entity, matcher) {
        out.push(entity);
    }
    for child in children(world, entity) {
        collect_any_depth(world, child, matcher, cap, out);
    }
}

/// A behavior type that is attached to a specific node.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorRef {
    pub entity: Entity,
    pub type_id: TypeId,
    pub type_path: String,
    pub short_name: String,
}

/// Reflected component types on `entity`, in archetype order.
pub fn behaviors_on(world: &World, catalog: &TypeCatalog, entity: Entity) -> Vec<BehaviorRef> {
    if !node_exists(world, entity) {
        return Vec::new();
    }
    let registry = catalog.registry().read();
    let mut out = Vec::new();
    for info in world.inspect_entity(entity) {
        let Some(type_id) = info.type_id() else {
            continue;
        };
        if is_structural(type_id) {
            continue;
        }
        let Some(registration) = registry.get(type_id) else {
            continue;
        };
        if registration.data::<ReflectComponent>().is_none() {
            continue;
        }
        let table = registration.type_info().type_path_table();
        out.push(BehaviorRef {
            entity,
            type_id,
            type_path: table.path().to_string(),
            short_name: table.short_path().to_string(),
        });
    }
    out
}

pub fn resolve_behavior(
    world: &World,
    catalog: &TypeCatalog,
    entity: Entity,
    type_name: &str,
) -> BridgeResult<BehaviorRef> {
    let resolved = catalog.resolve(world, type_name, Some(entity))?;
    behaviors_on(world, catalog, entity)
        .into_iter()
        .find(|b| b.type_id == resolved.type_id)
        .ok_or_else(|| {
            BridgeError::not_found(format!(
                "Behavior '{}' is not attached to '{}'",
                resolved.short_name,
                node_path(world, entity)
            ))
        })
}

fn reflect_component(catalog: &TypeCatalog, behavior: &BehaviorRef) -> BridgeResult<ReflectComponent> {
    catalog
        .registry()
        .read()
        .get_type_data::<ReflectComponent>(behavior.type_id)
        .cloned()
        .ok_or_else(|| {
            BridgeError::rejected(format!("{} is not a reflected component", behavior.type_path))
        })
}

fn detached(world: &World, behavior: &BehaviorRef) -> BridgeError {
    BridgeError::not_found(format!(
        "Behavior '{}' is no longer attached to '{}'",
        behavior.short_name,
        node_path(world, behavior.entity)
    ))
}

/// Runs `read` against the live reflected component.
pub fn read_behavior<R>(
    world: &World,
    catalog: &TypeCatalog,
    behavior: &BehaviorRef,
    read: impl FnOnce(&dyn PartialReflect) -> BridgeResult<R>,
) -> BridgeResult<R> {
    let component = reflect_component(catalog, behavior)?;
    if !node_exists(world, behavior.entity) {
        return Err(detached(world, behavior));
    }
    let value = component
        .reflect(world.entity(behavior.entity))
        .ok_or_else(|| detached(world, behavior))?;
    read(value.as_partial_reflect())
}

/// Runs `edit` against the live reflected component.
pub fn edit_behavior<R>(
    world: &mut World,
    catalog: &TypeCatalog,
    behavior: &BehaviorRef,
    edit: impl FnOnce(&mut dyn PartialReflect) -> BridgeResult<R>,
) -> BridgeResult<R> {
    let component = reflect_component(catalog, behavior)?;
    if !node_exists(world, behavior.entity) {
        return Err(detached(world, behavior));
    }
    let Some(mut value) = component.reflect_mut(world.entity_mut(behavior.entity)) else {
        return Err(detached(world, behavior));
    };
    edit(value.as_partial_reflect_mut())
}

pub fn node_info(world: &World, catalog: &TypeCatalog, entity: Entity) -> Value {
    let behaviors: Vec<String> = behaviors_on(world, catalog, entity)
        .into_iter()
        .map(|b| b.short_name)
        .collect();
    json!({
        "name": node_name(world, entity).unwrap_or_default(),
        "path": node_path(world, entity),
        "entity": entity.to_bits(),
        "active": is_active(world, entity),
        "activeInHierarchy": is_active_in_hierarchy(world, entity),
        "childCount": children(world, entity).len(),
        "behaviors": behaviors,
    })
}

/// Nested `{name, path, active, behaviors, children}` tree, `max_depth` levels
/// below `entity`.
pub fn hierarchy_tree(
    world: &World,
    catalog: &TypeCatalog,
    entity: Entity,
    max_depth: usize,
    budget: &mut usize,
) -> Value {
    let mut node = node_info(world, catalog, entity);
    *budget = budget.saturating_sub(1);
    let kids = children(world, entity);
    if max_depth == 0 || *budget == 0 {
        if !kids.is_empty() {
            node["childrenTruncated"] = json!(true);
        }
        return node;
    }
    let mut rendered = Vec::with_capacity(kids.len());
    for child in kids.iter().copied() {
        if *budget == 0 {
            node["childrenTruncated"] = json!(true);
            break;
        }
        rendered.push(hierarchy_tree(world, catalog, child, max_depth - 1, budget));
    }
    node["children"] = Value::Array(rendered);
    node
}
