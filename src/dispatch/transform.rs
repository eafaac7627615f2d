use bevy::prelude::*;
use serde_json::{json, Value};

use super::{object, CommandCtx, Dispatcher, JsonMap};
use crate::coercion::{coerce_onto, reflect_to_json, CoercionContext};
use crate::error::{BridgeError, BridgeResult};
use crate::hierarchy;

fn euler_degrees(rotation: Quat) -> Value {
    let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
    reflect_to_json(&Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees()))
}

fn transform_json(transform: &Transform) -> Value {
    json!({
        "translation": reflect_to_json(&transform.translation),
        "rotation": reflect_to_json(&transform.rotation),
        "rotationEuler": euler_degrees(transform.rotation),
        "scale": reflect_to_json(&transform.scale),
    })
}

fn local(world: &World, entity: Entity) -> BridgeResult<Transform> {
    world.get::<Transform>(entity).copied().ok_or_else(|| {
        BridgeError::not_found(format!(
            "'{}' has no Transform",
            hierarchy::node_path(world, entity)
        ))
    })
}

/// Reads a vector payload key onto `start`: `{x,y,z}` maps merge, arrays
/// replace, and a bare number fills every component when `uniform` is set.
fn vector(
    coercion: &mut CoercionContext,
    key: &str,
    raw: &Value,
    start: Vec3,
    uniform: bool,
) -> BridgeResult<Vec3> {
    if let (true, Some(n)) = (uniform, raw.as_f64()) {
        return Ok(Vec3::splat(n as f32));
    }
    let mut out = start;
    coerce_onto(&mut out, raw, coercion, key)?;
    Ok(out)
}

fn from_euler_degrees(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

/// Shared shell of `set` and `adjust`: resolves the node, hands a copy of its
/// transform to `update`, writes the copy back and reports both snapshots.
fn update_transform(
    d: &Dispatcher,
    world: &mut World,
    ctx: &mut CommandCtx,
    keys: &[&str],
    update: impl FnOnce(&mut Transform, &mut CoercionContext, &CommandCtx) -> BridgeResult<()>,
) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    if !keys.iter().any(|k| ctx.value(k).is_some()) {
        return Err(BridgeError::missing(format!(
            "{} needs at least one of: {}",
            ctx.spec.tool_name,
            keys.join(", ")
        )));
    }
    let before = local(world, entity)?;
    ctx.resolved();

    let mut next = before;
    let notes = {
        let registry = d.catalog().registry().read();
        let mut coercion = CoercionContext::new(&registry, d.assets());
        update(&mut next, &mut coercion, ctx)?;
        coercion.take_notes()
    };
    ctx.extend_notes(notes);
    if let Some(mut live) = world.get_mut::<Transform>(entity) {
        *live = next;
    }
    Ok(object(json!({
        "path": hierarchy::node_path(world, entity),
        "before": transform_json(&before),
        "after": transform_json(&next),
    })))
}

pub(super) fn get(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    let entity = d.node(world, ctx.str("path")?)?;
    let transform = local(world, entity)?;
    ctx.resolved();
    let mut out = object(json!({
        "path": hierarchy::node_path(world, entity),
        "local": transform_json(&transform),
    }));
    if let Some(global) = world.get::<GlobalTransform>(entity) {
        out.insert(
            "global".into(),
            transform_json(&global.compute_transform()),
        );
    }
    Ok(out)
}

pub(super) fn set(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    const KEYS: [&str; 4] = ["translation", "rotation", "rotationEuler", "scale"];
    update_transform(d, world, ctx, &KEYS, |t, coercion, ctx| {
        if let Some(raw) = ctx.value("translation") {
            t.translation = vector(coercion, "translation", raw, t.translation, false)?;
        }
        match (ctx.value("rotation"), ctx.value("rotationEuler")) {
            (Some(_), Some(_)) => {
                return Err(BridgeError::mismatch(
                    "pass either 'rotation' or 'rotationEuler', not both",
                ))
            }
            (Some(raw), None) => coerce_onto(&mut t.rotation, raw, coercion, "rotation")?,
            (None, Some(raw)) => {
                let current = t.rotation.to_euler(EulerRot::XYZ);
                let start = Vec3::new(
                    current.0.to_degrees(),
                    current.1.to_degrees(),
                    current.2.to_degrees(),
                );
                t.rotation = from_euler_degrees(vector(coercion, "rotationEuler", raw, start, false)?);
            }
            (None, None) => {}
        }
        if let Some(raw) = ctx.value("scale") {
            t.scale = vector(coercion, "scale", raw, t.scale, true)?;
        }
        Ok(())
    })
}

pub(super) fn adjust(d: &Dispatcher, world: &mut World, ctx: &mut CommandCtx) -> BridgeResult<JsonMap> {
    const KEYS: [&str; 3] = ["translate", "rotateEuler", "scaleBy"];
    update_transform(d, world, ctx, &KEYS, |t, coercion, ctx| {
        if let Some(raw) = ctx.value("translate") {
            t.translation += vector(coercion, "translate", raw, Vec3::ZERO, false)?;
        }
        if let Some(raw) = ctx.value("rotateEuler") {
            let delta = from_euler_degrees(vector(coercion, "rotateEuler", raw, Vec3::ZERO, false)?);
            t.rotation = (delta * t.rotation).normalize();
        }
        if let Some(raw) = ctx.value("scaleBy") {
            t.scale *= vector(coercion, "scaleBy", raw, Vec3::ONE, true)?;
        }
        Ok(())
    })
}
