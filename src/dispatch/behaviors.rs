use bevy::prelude::*;
use bevy::reflect::{PartialReflect, ReflectFromReflect};
use serde_json::{json, Value};

use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::coercion::{coerce_onto, default_value, reflect_to_json, CoercionContext};
use crate::error::{BridgeError, BridgeResult};
use crate::hierarchy::{self, BehaviorRef};
use crate::members::{resolve_member, resolve_member_mut};
use crate::registry::ResolvedType;

/// A behavior value built from its registered default, ready to insert.
pub(super) struct BuiltBehavior {
    pub resolved: ResolvedType,
    pub component: ReflectComponent,
    pub value: Box<dyn PartialReflect>,
    pub notes: Vec<String>,
}

fn component_data(d: &Dispatcher, resolved: &ResolvedType) -> BridgeResult<ReflectComponent> {
    if hierarchy::is_structural(resolved.type_id) {
        return Err(BridgeError::UnsupportedOperation(format!(
            "{} is part of the node itself and cannot be managed as a behavior",
            resolved.short_name
        )));
    }
    d.catalog()
        .registry()
        .read()
        .get_type_data::<ReflectComponent>(resolved.type_id)
        .cloned()
        .ok_or_else(|| {
            BridgeError::mismatch(format!("'{}' is not a behavior type", resolved.type_path))
        })
}

pub(super) fn build_behavior(
    d: &Dispatcher,
    world: &World,
    type_name: &str,
    properties: Option<&Value>,
    node: Option<Entity>,
) -> BridgeResult<BuiltBehavior> {
    let resolved = d.catalog().resolve(world, type_name, node)?;
    let component = component_data(d, &resolved)?;
    let registry = d.catalog().registry().read();
    let mut value = default_value(resolved.type_id, &registry, &resolved.short_name)?;
    let mut coercion = CoercionContext::new(&registry, d.assets());
    match properties {
        None | Some(Value::Null) => {}
        Some(props @ Value::Object(_)) => coerce_onto(value.as_mut(), props, &mut coercion, "")?,
        Some(other) => {
            return Err(BridgeError::mismatch(format!(
                "properties for {} must be an object, got {}",
                resolved.short_name,
                crate::coercion::json_kind(other)
            )))
        }
    }
    let notes = coercion.take_notes();
    drop(registry);
    Ok(BuiltBehavior {
        resolved,
        component,
        value,
        notes,
    })
}

fn render(world: &World, d: &Dispatcher, behavior: &BehaviorRef) -> BridgeResult<Value> {
    hierarchy::read_behavior(world, d.catalog(), behavior, |value| Ok(reflect_to_json(value)))
}

/// Applies `edit` to a concrete copy of the behavior and writes the copy back
/// only when `edit` succeeds. Returns the edit's output and the coercion
/// notes it produced.
pub(super) fn edit_scratch<R>(
    d: &Dispatcher,
    world: &mut World,
    behavior: &BehaviorRef,
    edit: impl FnOnce(&mut dyn PartialReflect, &mut CoercionContext) -> BridgeResult<R>,
) -> BridgeResult<(R, Vec<String>)> {
    let catalog = d.catalog();
    let mut scratch = hierarchy::read_behavior(world, catalog, behavior, |live| {
        let registry = catalog.registry().read();
        let from_reflect = registry
            .get_type_data::<ReflectFromReflect>(behavior.type_id)
            .ok_or_else(|| {
                BridgeError::rejected(format!("{} cannot be copied for editing", behavior.type_path))
            })?;
        from_reflect.from_reflect(live).ok_or_else(|| {
            BridgeError::rejected(format!("{} could not be copied for editing", behavior.type_path))
        })
    })?;
    let component = catalog
        .registry()
        .read()
        .get_type_data::<ReflectComponent>(behavior.type_id)
        .cloned()
        .ok_or_else(|| BridgeError::rejected(format!("{} is not a reflected component", behavior.type_path)))?;

    let registry = catalog.registry().read();
    let mut coercion = CoercionContext::new(&registry, d.assets());
    let output = edit(scratch.as_partial_reflect_mut(), &mut coercion)?;
    let notes = coercion.take_notes();
    let mut entity = world.entity_mut(behavior.entity);
    component.insert(&mut entity, scratch.as_partial_reflect(), &registry);
    Ok((output, notes))
}

fn target(d: &Dispatcher, world: &World, ctx: &mut CommandCtx) -> BridgeResult<BehaviorRef> {
    let entity = d.node(world, ctx.str("path")?)?;
    let behavior = d.behavior(world, entity, ctx.str("behaviorType")?)?;
    ctx.resolved();
    Ok(behavior)
}

fn header(world: &World, behavior: &BehaviorRef) -> JsonMap {
    object(json!({
        "path": hierarchy::node_path(world, behavior.entity),
        "behaviorType": behavior.short_name,
        "typePath": behavior.type_path,
    }))
}

pub(super) fn list(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    ctx.resolved();
    let behaviors: Vec<Value> = hierarchy::behaviors_on(world, d.catalog(), entity)
        .into_iter()
        .map(|b| json!({ "type": b.short_name, "typePath": b.type_path }))
        .collect();
    Ok(object(json!({
        "path": hierarchy::node_path(world, entity),
        "count": behaviors.len(),
        "behaviors": behaviors,
    })))
}

pub(super) fn get(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = target(d, world, ctx)?;
    let property = ctx.opt_str("property");
    let value = hierarchy::read_behavior(world, d.catalog(), &behavior, |value| match property {
        Some(member) => resolve_member(value, member).map(reflect_to_json),
        None => Ok(reflect_to_json(value)),
    })?;
    let mut out = header(world, &behavior);
    if let Some(member) = property {
        out.insert("property".into(), json!(member));
    }
    out.insert("value".into(), value);
    Ok(out)
}

pub(super) fn attach(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    let built = build_behavior(d, world, ctx.str("behaviorType")?, ctx.value("properties"), Some(entity))?;
    ctx.resolved();
    if world.entity(entity).contains_type_id(built.resolved.type_id) {
        return Err(BridgeError::rejected(format!(
            "'{}' already has a {}",
            hierarchy::node_path(world, entity),
            built.resolved.short_name
        )));
    }
    {
        let registry = d.catalog().registry().read();
        let mut node = world.entity_mut(entity);
        built.component.insert(&mut node, built.value.as_ref(), &registry);
    }
    ctx.extend_notes(built.notes);
    info!(
        "[Bridge dispatch] Attached {} to '{}'",
        built.resolved.short_name,
        hierarchy::node_path(world, entity)
    );

    let behavior = d.behavior(world, entity, &built.resolved.type_path)?;
    let mut out = header(world, &behavior);
    out.insert("value".into(), render(world, d, &behavior)?);
    Ok(out)
}

pub(super) fn detach(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = target(d, world, ctx)?;
    if behavior.type_id == std::any::TypeId::of::<Transform>() {
        return Err(BridgeError::UnsupportedOperation(
            "Transform is required on every node and cannot be detached".to_string(),
        ));
    }
    let before = render(world, d, &behavior)?;
    let component = d
        .catalog()
        .registry()
        .read()
        .get_type_data::<ReflectComponent>(behavior.type_id)
        .cloned()
        .ok_or_else(|| BridgeError::rejected(format!("{} is not a reflected component", behavior.type_path)))?;
    component.remove(&mut world.entity_mut(behavior.entity));
    let mut out = header(world, &behavior);
    out.insert("before".into(), before);
    Ok(out)
}

pub(super) fn set_property(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = target(d, world, ctx)?;
    let property = ctx.str("property")?;
    let value = ctx.payload.get("value").unwrap_or(&Value::Null);
    let ((before, after), notes) = edit_scratch(d, world, &behavior, |scratch, coercion| {
        let member = resolve_member_mut(scratch, property)?;
        let before = reflect_to_json(member);
        coerce_onto(member, value, coercion, property)?;
        Ok((before, reflect_to_json(member)))
    })?;
    ctx.extend_notes(notes);
    let mut out = header(world, &behavior);
    out.insert("property".into(), json!(property));
    out.insert("before".into(), before);
    out.insert("after".into(), after);
    Ok(out)
}

pub(super) fn set_properties(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let behavior = target(d, world, ctx)?;
    let properties = ctx
        .value("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| BridgeError::missing("'properties' must be an object"))?;
    if properties.is_empty() {
        return Err(BridgeError::missing("'properties' is empty"));
    }
    let before = render(world, d, &behavior)?;
    let (applied, notes) = edit_scratch(d, world, &behavior, |scratch, coercion| {
        let mut applied = Vec::with_capacity(properties.len());
        for (member, value) in properties {
            let slot = resolve_member_mut(scratch, member)?;
            coerce_onto(slot, value, coercion, member)?;
            applied.push(member.clone());
        }
        Ok(applied)
    })?;
    ctx.extend_notes(notes);
    let mut out = header(world, &behavior);
    out.insert("applied".into(), json!(applied));
    out.insert("before".into(), before);
    out.insert("after".into(), render(world, d, &behavior)?);
    Ok(out)
}
