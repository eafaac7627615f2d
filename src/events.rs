//! Persistent observer wiring between behaviors.
//!
//! Listeners live as reflected data inside `ObserverEvent` fields, so wiring
//! and unwiring are member edits on the source behavior and never run the
//! target method. `invoke` is the only operation that calls into targets.

use bevy::prelude::*;
use bevy::reflect::{PartialReflect, ReflectRef};
use serde::Serialize;
use serde_json::{json, Value};

use crate::assets::AssetStore;
use crate::coercion::{append_to_list, remove_from_list, CoercionContext};
use crate::components::{ObserverEvent, PersistentListener};
use crate::error::{BridgeError, BridgeResult};
use crate::hierarchy::{self, BehaviorRef};
use crate::members::{resolve_member, resolve_member_mut, to_snake_case};
use crate::methods::{ListenerMode, MethodSignature, ReflectMethods};
use crate::registry::TypeCatalog;

/// How a loosely named event was matched to a concrete field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStrategy {
    Exact,
    BackingField,
    Prefixed,
    Substring,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventField {
    pub name: String,
    pub strategy: FieldStrategy,
}

/// Names of the `ObserverEvent` fields on a behavior value.
pub fn observer_fields(behavior: &dyn PartialReflect) -> Vec<String> {
    let ReflectRef::Struct(s) = behavior.reflect_ref() else {
        return Vec::new();
    };
    (0..s.field_len())
        .filter(|&i| {
            s.field_at(i)
                .is_some_and(|f| f.try_downcast_ref::<ObserverEvent>().is_some())
        })
        .filter_map(|i| s.name_at(i).map(str::to_string))
        .collect()
}

fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Exact name, snake_case backing name, `on_` prefixed name, then a
/// case-insensitive substring over the observer fields.
pub fn discover_field(fields: &[String], requested: &str) -> Option<EventField> {
    let requested = requested.trim();
    if requested.is_empty() {
        return None;
    }
    let hit = |name: &str, strategy| {
        fields.iter().find(|f| f.as_str() == name).map(|f| EventField {
            name: f.clone(),
            strategy,
        })
    };
    let snake = to_snake_case(requested);
    let prefixed = if snake.starts_with("on_") {
        snake.clone()
    } else {
        format!("on_{snake}")
    };
    hit(requested, FieldStrategy::Exact)
        .or_else(|| hit(&snake, FieldStrategy::BackingField))
        .or_else(|| hit(&prefixed, FieldStrategy::Prefixed))
        .or_else(|| {
            let needle = squash(requested);
            fields
                .iter()
                .find(|f| squash(f).contains(&needle))
                .map(|f| EventField {
                    name: f.clone(),
                    strategy: FieldStrategy::Substring,
                })
        })
}

fn locate_field(
    world: &World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
    requested: &str,
) -> BridgeResult<EventField> {
    let fields = hierarchy::read_behavior(world, catalog, source, |value| Ok(observer_fields(value)))?;
    if fields.is_empty() {
        return Err(BridgeError::not_found(format!(
            "{} has no event fields",
            source.short_name
        )));
    }
    discover_field(&fields, requested).ok_or_else(|| {
        BridgeError::not_found(format!(
            "No event matching '{requested}' on {}; available: {}",
            source.short_name,
            fields.join(", ")
        ))
    })
}

fn read_event(
    world: &World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
    field: &str,
) -> BridgeResult<ObserverEvent> {
    hierarchy::read_behavior(world, catalog, source, |value| {
        resolve_member(value, field)?
            .try_downcast_ref::<ObserverEvent>()
            .cloned()
            .ok_or_else(|| BridgeError::mismatch(format!("'{field}' is not an event field")))
    })
}

pub fn listener_json(index: usize, listener: &PersistentListener) -> Value {
    let argument = match listener.mode {
        ListenerMode::Void => Value::Null,
        ListenerMode::Int => json!(listener.argument.int_value),
        ListenerMode::Float => json!(listener.argument.float_value),
        ListenerMode::String => json!(listener.argument.string_value),
        ListenerMode::Bool => json!(listener.argument.bool_value),
        ListenerMode::Reference => json!(listener.argument.reference),
    };
    json!({
        "index": index,
        "targetPath": listener.target,
        "targetType": listener.behavior,
        "methodName": listener.method,
        "mode": listener.mode.as_str(),
        "argument": argument,
        "enabled": listener.enabled,
    })
}

/// `[{name, listenerCount}]` for every event field of the behavior.
pub fn event_fields(
    world: &World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
) -> BridgeResult<Vec<Value>> {
    hierarchy::read_behavior(world, catalog, source, |value| {
        let mut out = Vec::new();
        for name in observer_fields(value) {
            let count = resolve_member(value, &name)?
                .try_downcast_ref::<ObserverEvent>()
                .map_or(0, |e| e.listeners.len());
            out.push(json!({ "name": name, "listenerCount": count }));
        }
        Ok(out)
    })
}

pub fn list_listeners(
    world: &World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
    requested: &str,
) -> BridgeResult<(EventField, Vec<PersistentListener>)> {
    let field = locate_field(world, catalog, source, requested)?;
    let event = read_event(world, catalog, source, &field.name)?;
    Ok((field, event.listeners))
}

/// Persistent binding from a source event to a target method.
#[derive(Clone, Debug)]
pub struct EventBinding {
    pub source: BehaviorRef,
    pub event: String,
    pub target: Entity,
    pub target_type: Option<String>,
    pub method: String,
    pub mode: Option<ListenerMode>,
    pub argument: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct WireOutcome {
    pub field: EventField,
    pub index: usize,
    pub listener: PersistentListener,
    pub fallback: bool,
    pub notes: Vec<String>,
}

impl WireOutcome {
    pub fn to_json(&self) -> Value {
        let resolution = if self.fallback { "fallback" } else { "exact" };
        json!({
            "eventField": self.field.name,
            "fieldMatch": self.field.strategy,
            "listenerIndex": self.index,
            "listener": listener_json(self.index, &self.listener),
            "methodResolution": resolution,
        })
    }
}

/// Mode implied by a literal argument's JSON type.
pub fn infer_mode(argument: Option<&Value>) -> ListenerMode {
    match argument {
        None | Some(Value::Null) => ListenerMode::Void,
        Some(Value::Bool(_)) => ListenerMode::Bool,
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => ListenerMode::Int,
        Some(Value::Number(_)) => ListenerMode::Float,
        Some(_) => ListenerMode::String,
    }
}

struct MethodMatch {
    behavior: BehaviorRef,
    signature: MethodSignature,
    exact: bool,
}

fn method_table(catalog: &TypeCatalog, behavior: &BehaviorRef) -> Option<ReflectMethods> {
    catalog
        .registry()
        .read()
        .get_type_data::<ReflectMethods>(behavior.type_id)
        .cloned()
}

fn resolve_method(
    world: &World,
    catalog: &TypeCatalog,
    target: Entity,
    target_type: Option<&str>,
    method: &str,
    mode: ListenerMode,
) -> BridgeResult<MethodMatch> {
    let candidates = match target_type {
        Some(name) => vec![hierarchy::resolve_behavior(world, catalog, target, name)?],
        None => hierarchy::behaviors_on(world, catalog, target),
    };
    let mut fallback = None;
    for behavior in candidates {
        let Some(table) = method_table(catalog, &behavior) else {
            continue;
        };
        match table.find(method, mode) {
            Some((signature, true)) => {
                return Ok(MethodMatch {
                    behavior,
                    signature,
                    exact: true,
                })
            }
            Some((signature, false)) if fallback.is_none() => {
                fallback = Some(MethodMatch {
                    behavior,
                    signature,
                    exact: false,
                });
            }
            _ => {}
        }
    }
    fallback.ok_or_else(|| {
        let scope = match target_type {
            Some(name) => name.to_string(),
            None => format!("any behavior on '{}'", hierarchy::node_path(world, target)),
        };
        BridgeError::not_found(format!("Method '{method}' not found on {scope}"))
    })
}

fn listener_argument(
    world: &World,
    mode: ListenerMode,
    argument: Option<&Value>,
) -> BridgeResult<Value> {
    let value = argument.cloned().unwrap_or(Value::Null);
    let field = match mode {
        ListenerMode::Void => return Ok(json!({})),
        ListenerMode::Int => "int_value",
        ListenerMode::Float => "float_value",
        ListenerMode::String => "string_value",
        ListenerMode::Bool => "bool_value",
        ListenerMode::Reference => {
            let path = value.as_str().ok_or_else(|| {
                BridgeError::missing("reference listeners need a node path argument")
            })?;
            let entity = hierarchy::resolve_node(world, path)?;
            return Ok(json!({ "reference": hierarchy::node_path(world, entity) }));
        }
    };
    if value.is_null() {
        return Ok(json!({}));
    }
    Ok(json!({ field: value }))
}

/// Appends a listener to the source event. The target is only resolved, not
/// called.
pub fn wire(
    world: &mut World,
    catalog: &TypeCatalog,
    assets: Option<&dyn AssetStore>,
    binding: &EventBinding,
) -> BridgeResult<WireOutcome> {
    let field = locate_field(world, catalog, &binding.source, &binding.event)?;
    let requested_mode = binding
        .mode
        .unwrap_or_else(|| infer_mode(binding.argument.as_ref()));
    let found = resolve_method(
        world,
        catalog,
        binding.target,
        binding.target_type.as_deref(),
        &binding.method,
        requested_mode,
    )?;
    let mode = found.signature.mode;
    let argument = listener_argument(world, mode, binding.argument.as_ref())?;
    let element = json!({
        "target": hierarchy::node_path(world, binding.target),
        "behavior": found.behavior.type_path,
        "method": found.signature.name,
        "mode": mode.variant_name(),
        "argument": argument,
        "enabled": true,
    });

    let mut notes = Vec::new();
    if !found.exact {
        notes.push(format!(
            "no {} overload of '{}', bound the {} overload",
            requested_mode.as_str(),
            binding.method,
            mode.as_str()
        ));
    }
    let list_path = format!("{}.listeners", field.name);
    let index = hierarchy::edit_behavior(world, catalog, &binding.source, |value| {
        let registry = catalog.registry().read();
        let mut ctx = CoercionContext::new(&registry, assets);
        let listeners = resolve_member_mut(value, &list_path)?;
        let index = append_to_list(listeners, &element, &mut ctx, &list_path)?;
        notes.extend(ctx.take_notes());
        Ok(index)
    })?;

    let listener = read_event(world, catalog, &binding.source, &field.name)?
        .listeners
        .get(index)
        .cloned()
        .ok_or_else(|| BridgeError::rejected("listener vanished after wiring"))?;
    info!(
        "[Bridge events] Wired {}.{} -> {}::{} ({})",
        binding.source.short_name,
        field.name,
        listener.target,
        listener.method,
        mode.as_str()
    );
    Ok(WireOutcome {
        field,
        index,
        listener,
        fallback: !found.exact,
        notes,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnwireSelector {
    Index(usize),
    /// Every listener bound to `method` on the node at `target`.
    Target { target: String, method: String },
}

pub fn unwire(
    world: &mut World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
    requested: &str,
    selector: &UnwireSelector,
) -> BridgeResult<(EventField, Vec<PersistentListener>)> {
    let field = locate_field(world, catalog, source, requested)?;
    let current = read_event(world, catalog, source, &field.name)?.listeners;
    let mut indexes: Vec<usize> = match selector {
        UnwireSelector::Index(index) => {
            if *index >= current.len() {
                return Err(BridgeError::not_found(format!(
                    "{} has no listener at index {index} (count {})",
                    field.name,
                    current.len()
                )));
            }
            vec![*index]
        }
        UnwireSelector::Target { target, method } => current
            .iter()
            .enumerate()
            .filter(|(_, l)| &l.target == target && &l.method == method)
            .map(|(i, _)| i)
            .collect(),
    };
    if indexes.is_empty() {
        return Err(BridgeError::not_found(format!(
            "No listener on {} matches the given target and method",
            field.name
        )));
    }

    let list_path = format!("{}.listeners", field.name);
    indexes.sort_unstable();
    let removed = hierarchy::edit_behavior(world, catalog, source, |value| {
        let listeners = resolve_member_mut(value, &list_path)?;
        let mut removed = Vec::with_capacity(indexes.len());
        for index in indexes.iter().rev() {
            let element = remove_from_list(listeners, *index, &list_path)?;
            if let Some(listener) = element.try_downcast_ref::<PersistentListener>() {
                removed.push(listener.clone());
            }
        }
        removed.reverse();
        Ok(removed)
    })?;
    info!(
        "[Bridge events] Removed {} listener(s) from {}.{}",
        removed.len(),
        source.short_name,
        field.name
    );
    Ok((field, removed))
}

/// Calls every enabled listener of the event, in order.
pub fn invoke(
    world: &mut World,
    catalog: &TypeCatalog,
    source: &BehaviorRef,
    requested: &str,
) -> BridgeResult<(EventField, Vec<Value>)> {
    let field = locate_field(world, catalog, source, requested)?;
    let listeners = read_event(world, catalog, source, &field.name)?.listeners;
    let mut outcomes = Vec::with_capacity(listeners.len());
    for (index, listener) in listeners.iter().enumerate() {
        let mut outcome = listener_json(index, listener);
        if !listener.enabled {
            outcome["status"] = json!("skipped");
            outcomes.push(outcome);
            continue;
        }
        match call_listener(world, catalog, listener) {
            Ok(()) => outcome["status"] = json!("invoked"),
            Err(e) => {
                warn!(
                    "[Bridge events] Listener {index} of {}.{} failed: {e}",
                    source.short_name, field.name
                );
                outcome["status"] = json!("failed");
                outcome["error"] = json!(e.to_string());
                outcome["errorKind"] = json!(e.kind());
            }
        }
        outcomes.push(outcome);
    }
    Ok((field, outcomes))
}

fn call_listener(
    world: &mut World,
    catalog: &TypeCatalog,
    listener: &PersistentListener,
) -> BridgeResult<()> {
    let target = hierarchy::resolve_node(world, &listener.target)?;
    let behavior = hierarchy::resolve_behavior(world, catalog, target, &listener.behavior)?;
    let table = method_table(catalog, &behavior).ok_or_else(|| {
        BridgeError::not_found(format!("{} has no invocable methods", behavior.short_name))
    })?;
    let arg = listener.call_arg();
    let component = catalog
        .registry()
        .read()
        .get_type_data::<ReflectComponent>(behavior.type_id)
        .cloned()
        .ok_or_else(|| BridgeError::rejected("target is not a reflected component"))?;
    let Some(mut value) = component.reflect_mut(world.entity_mut(target)) else {
        return Err(BridgeError::not_found(format!(
            "{} vanished from '{}'",
            behavior.short_name, listener.target
        )));
    };
    table
        .call(&mut *value, &listener.method, &arg)
        .map_err(BridgeError::HostRejected)
}
