//! JSON → reflected value coercion, applied in place.
//!
//! Compound values merge onto what is already stored, so `{ "y": 9 }` on a
//! `Vec3` leaves `x` and `z` alone. Lossy scalar adjustments (truncation,
//! clamping) succeed but leave a note for the response.

use std::any::TypeId;
use std::fmt::Display;

use bevy::color::Srgba;
use bevy::prelude::*;
use bevy::reflect::{
    DynamicEnum, DynamicStruct, DynamicTuple, DynamicVariant, EnumInfo, PartialReflect,
    ReflectKind, ReflectMut, ReflectRef, TypeInfo, TypeRegistry, VariantInfo, VariantType,
};
use bevy::reflect::std_traits::ReflectDefault;
use serde_json::{json, Map as JsonMap, Value};

use crate::assets::AssetStore;
use crate::components::AssetRef;
use crate::error::{BridgeError, BridgeResult};
use crate::members::{struct_field_index, to_snake_case};

pub struct CoercionContext<'a> {
    registry: &'a TypeRegistry,
    assets: Option<&'a dyn AssetStore>,
    notes: Vec<String>,
}

impl<'a> CoercionContext<'a> {
    pub fn new(registry: &'a TypeRegistry, assets: Option<&'a dyn AssetStore>) -> Self {
        Self {
            registry,
            assets,
            notes: Vec::new(),
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn note(&mut self, path: &str, message: impl Display) {
        let note = if path.is_empty() {
            message.to_string()
        } else {
            format!("{path}: {message}")
        };
        debug!("[Bridge coercion] {note}");
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
}

fn join(path: &str, member: impl Display) -> String {
    if path.is_empty() {
        member.to_string()
    } else {
        format!("{path}.{member}")
    }
}

fn indexed(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

fn at(path: &str) -> &str {
    if path.is_empty() {
        "value"
    } else {
        path
    }
}

/// Coerces `value` onto `target` in place.
pub fn coerce_onto(
    target: &mut dyn PartialReflect,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    if coerce_compound(target, value, ctx, path)? {
        return Ok(());
    }
    if let Some(info) = enum_info(target) {
        if is_option(info) {
            return coerce_option(target, info, value, ctx, path);
        }
        return coerce_enum(target, info, value, ctx, path);
    }
    if let Some(asset) = target.try_downcast_mut::<AssetRef>() {
        if !value.is_object() {
            return coerce_asset(asset, value, ctx, path);
        }
    }
    if coerce_scalar(target, value, ctx, path)? {
        return Ok(());
    }
    coerce_structural(target, value, ctx, path)
}

/// Builds a fresh value of a registered type from its default, then coerces
/// `value` onto it.
pub fn build_value(
    type_id: TypeId,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<Box<dyn PartialReflect>> {
    let mut fresh = default_value(type_id, ctx.registry(), path)?;
    coerce_onto(fresh.as_mut(), value, ctx, path)?;
    Ok(fresh)
}

pub fn default_value(
    type_id: TypeId,
    registry: &TypeRegistry,
    path: &str,
) -> BridgeResult<Box<dyn PartialReflect>> {
    let registration = registry.get(type_id).ok_or_else(|| {
        BridgeError::rejected(format!("{}: element type is not registered", at(path)))
    })?;
    let default = registration.data::<ReflectDefault>().ok_or_else(|| {
        BridgeError::rejected(format!(
            "{}: {} has no registered default",
            at(path),
            registration.type_info().type_path()
        ))
    })?;
    Ok(default.default().into_partial_reflect())
}

/// Pushes a coerced element onto a reflected list and returns its index.
pub fn append_to_list(
    target: &mut dyn PartialReflect,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<usize> {
    let item_type = list_item_type(target)
        .ok_or_else(|| BridgeError::mismatch(format!("{} is not a list", at(path))))?;
    let len = match target.reflect_ref() {
        ReflectRef::List(list) => list.len(),
        _ => return Err(BridgeError::mismatch(format!("{} is not a list", at(path)))),
    };
    let element = build_value(item_type, value, ctx, &indexed(path, len))?;
    let ReflectMut::List(list) = target.reflect_mut() else {
        return Err(BridgeError::mismatch(format!("{} is not a list", at(path))));
    };
    list.push(element);
    Ok(list.len() - 1)
}

pub fn remove_from_list(
    target: &mut dyn PartialReflect,
    index: usize,
    path: &str,
) -> BridgeResult<Box<dyn PartialReflect>> {
    let ReflectMut::List(list) = target.reflect_mut() else {
        return Err(BridgeError::mismatch(format!("{} is not a list", at(path))));
    };
    if index >= list.len() {
        return Err(BridgeError::not_found(format!(
            "{}: index {index} out of range (length {})",
            at(path),
            list.len()
        )));
    }
    Ok(list.remove(index))
}

fn list_item_type(target: &dyn PartialReflect) -> Option<TypeId> {
    match target.get_represented_type_info()? {
        TypeInfo::List(info) => Some(info.item_ty().id()),
        _ => None,
    }
}

fn enum_info(target: &dyn PartialReflect) -> Option<&'static EnumInfo> {
    match target.get_represented_type_info()? {
        TypeInfo::Enum(info) => Some(info),
        _ => None,
    }
}

fn is_option(info: &EnumInfo) -> bool {
    info.type_path().starts_with("core::option::Option<")
}

fn apply(target: &mut dyn PartialReflect, value: &dyn PartialReflect, path: &str) -> BridgeResult<()> {
    target
        .try_apply(value)
        .map_err(|e| BridgeError::mismatch(format!("{}: {e}", at(path))))
}

// === compound numeric types ===

fn number(value: &Value, path: &str) -> BridgeResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| BridgeError::mismatch(format!("{}: number out of range", at(path)))),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            BridgeError::mismatch(format!("{}: expected a number, got \"{s}\"", at(path)))
        }),
        other => Err(BridgeError::mismatch(format!(
            "{}: expected a number, got {}",
            at(path),
            json_kind(other)
        ))),
    }
}

fn key_matches(expected: &str, given: &str) -> bool {
    let given: String = given.chars().filter(|c| *c != '_').collect();
    let expected: String = expected.chars().filter(|c| *c != '_').collect();
    given.eq_ignore_ascii_case(&expected)
}

/// Merges a named-field map or an array of at least `min_array` numbers onto
/// `slots`.
fn merge_components(
    slots: &mut [f64],
    keys: &[&str],
    min_array: usize,
    value: &Value,
    path: &str,
) -> BridgeResult<()> {
    match value {
        Value::Object(fields) => {
            for (key, item) in fields {
                let index = keys
                    .iter()
                    .position(|k| key_matches(k, key))
                    .ok_or_else(|| {
                        BridgeError::mismatch(format!(
                            "{}: unknown component '{key}', expected {}",
                            at(path),
                            keys.join(", ")
                        ))
                    })?;
                slots[index] = number(item, &join(path, key))?;
            }
            Ok(())
        }
        Value::Array(items) if (min_array..=slots.len()).contains(&items.len()) => {
            for (i, item) in items.iter().enumerate() {
                slots[i] = number(item, &indexed(path, i))?;
            }
            Ok(())
        }
        other => Err(BridgeError::mismatch(format!(
            "{}: expected an object with {} or an array of {} numbers, got {}",
            at(path),
            keys.join("/"),
            slots.len(),
            json_kind(other)
        ))),
    }
}

fn coerce_compound(
    target: &mut dyn PartialReflect,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<bool> {
    if let Some(v) = target.try_downcast_mut::<Vec2>() {
        let mut c = [v.x as f64, v.y as f64];
        merge_components(&mut c, &["x", "y"], 2, value, path)?;
        *v = Vec2::new(c[0] as f32, c[1] as f32);
        return Ok(true);
    }
    if let Some(v) = target.try_downcast_mut::<Vec3>() {
        let mut c = [v.x as f64, v.y as f64, v.z as f64];
        merge_components(&mut c, &["x", "y", "z"], 3, value, path)?;
        *v = Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32);
        return Ok(true);
    }
    if let Some(v) = target.try_downcast_mut::<Vec4>() {
        let mut c = [v.x as f64, v.y as f64, v.z as f64, v.w as f64];
        merge_components(&mut c, &["x", "y", "z", "w"], 4, value, path)?;
        *v = Vec4::new(c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32);
        return Ok(true);
    }
    if let Some(v) = target.try_downcast_mut::<IVec2>() {
        let mut c = [v.x as f64, v.y as f64];
        merge_components(&mut c, &["x", "y"], 2, value, path)?;
        let min = i32::MIN as i128;
        let max = i32::MAX as i128;
        let x = integer_from_f64(c[0], min, max, ctx, &join(path, "x"))?;
        let y = integer_from_f64(c[1], min, max, ctx, &join(path, "y"))?;
        *v = IVec2::new(x as i32, y as i32);
        return Ok(true);
    }
    if let Some(q) = target.try_downcast_mut::<Quat>() {
        let mut c = [q.x as f64, q.y as f64, q.z as f64, q.w as f64];
        merge_components(&mut c, &["x", "y", "z", "w"], 4, value, path)?;
        let next = Quat::from_xyzw(c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32);
        if next.length_squared() <= f32::EPSILON {
            return Err(BridgeError::mismatch(format!(
                "{}: zero-length rotation",
                at(path)
            )));
        }
        *q = if next.is_normalized() {
            next
        } else {
            ctx.note(path, "normalized rotation quaternion");
            next.normalize()
        };
        return Ok(true);
    }
    if let Some(color) = target.try_downcast_mut::<Color>() {
        let current = color.to_srgba();
        let next = match value {
            Value::String(hex) => Srgba::hex(hex.trim()).map_err(|e| {
                BridgeError::mismatch(format!("{}: invalid hex color '{hex}': {e}", at(path)))
            })?,
            _ => {
                let mut c = [
                    current.red as f64,
                    current.green as f64,
                    current.blue as f64,
                    current.alpha as f64,
                ];
                merge_components(&mut c, &["r", "g", "b", "a"], 3, value, path)?;
                Srgba::new(c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32)
            }
        };
        *color = Color::Srgba(next);
        return Ok(true);
    }
    if let Some(rect) = target.try_downcast_mut::<Rect>() {
        let mut c = [
            rect.min.x as f64,
            rect.min.y as f64,
            rect.max.x as f64,
            rect.max.y as f64,
        ];
        merge_components(&mut c, &["min_x", "min_y", "max_x", "max_y"], 4, value, path)?;
        rect.min = Vec2::new(c[0] as f32, c[1] as f32);
        rect.max = Vec2::new(c[2] as f32, c[3] as f32);
        return Ok(true);
    }
    Ok(false)
}

// === enums ===

fn current_variant(target: &dyn PartialReflect) -> Option<String> {
    match target.reflect_ref() {
        ReflectRef::Enum(e) => Some(e.variant_name().to_string()),
        _ => None,
    }
}

fn coerce_option(
    target: &mut dyn PartialReflect,
    info: &'static EnumInfo,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    if value.is_null() {
        return apply(target, &DynamicEnum::new("None", DynamicVariant::Unit), path);
    }
    if let ReflectMut::Enum(e) = target.reflect_mut() {
        if e.variant_name() == "Some" {
            if let Some(inner) = e.field_at_mut(0) {
                return coerce_onto(inner, value, ctx, path);
            }
        }
    }
    let inner_type = match info.variant("Some") {
        Some(VariantInfo::Tuple(variant)) => variant.field_at(0).map(|f| f.type_id()),
        _ => None,
    }
    .ok_or_else(|| BridgeError::mismatch(format!("{}: malformed option type", at(path))))?;
    let inner = build_value(inner_type, value, ctx, path)?;
    let mut tuple = DynamicTuple::default();
    tuple.insert_boxed(inner);
    apply(
        target,
        &DynamicEnum::new("Some", DynamicVariant::Tuple(tuple)),
        path,
    )
}

fn unknown_variant(info: &EnumInfo, name: &str, path: &str) -> BridgeError {
    BridgeError::mismatch(format!(
        "{}: unknown variant '{name}' for {}, expected one of: {}",
        at(path),
        info.type_path_table().short_path(),
        info.variant_names().join(", ")
    ))
}

fn coerce_enum(
    target: &mut dyn PartialReflect,
    info: &'static EnumInfo,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    match value {
        Value::String(name) => {
            let variant = info
                .variant(name)
                .ok_or_else(|| unknown_variant(info, name, path))?;
            if !matches!(variant, VariantInfo::Unit(_)) {
                return Err(BridgeError::mismatch(format!(
                    "{}: variant '{name}' carries data, pass {{\"{name}\": ...}}",
                    at(path)
                )));
            }
            if current_variant(target).as_deref() == Some(name.as_str()) {
                return Ok(());
            }
            apply(
                target,
                &DynamicEnum::new(name.clone(), DynamicVariant::Unit),
                path,
            )
        }
        Value::Object(map) if map.len() == 1 => {
            let Some((name, fields)) = map.iter().next() else {
                return Err(unknown_variant(info, "", path));
            };
            let variant = info
                .variant(name)
                .ok_or_else(|| unknown_variant(info, name, path))?;
            if current_variant(target).as_deref() != Some(name.as_str()) {
                let fresh = default_variant(variant, ctx.registry(), path)?;
                apply(target, &DynamicEnum::new(name.clone(), fresh), path)?;
            }
            edit_variant_fields(target, fields, ctx, &join(path, name))
        }
        other => Err(BridgeError::mismatch(format!(
            "{}: expected a variant name for {}, got {}",
            at(path),
            info.type_path_table().short_path(),
            json_kind(other)
        ))),
    }
}

fn default_variant(
    variant: &VariantInfo,
    registry: &TypeRegistry,
    path: &str,
) -> BridgeResult<DynamicVariant> {
    Ok(match variant {
        VariantInfo::Unit(_) => DynamicVariant::Unit,
        VariantInfo::Tuple(info) => {
            let mut tuple = DynamicTuple::default();
            for field in info.iter() {
                tuple.insert_boxed(default_value(field.type_id(), registry, path)?);
            }
            DynamicVariant::Tuple(tuple)
        }
        VariantInfo::Struct(info) => {
            let mut fields = DynamicStruct::default();
            for field in info.iter() {
                fields.insert_boxed(field.name(), default_value(field.type_id(), registry, path)?);
            }
            DynamicVariant::Struct(fields)
        }
    })
}

fn edit_variant_fields(
    target: &mut dyn PartialReflect,
    fields: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    let ReflectMut::Enum(e) = target.reflect_mut() else {
        return Err(BridgeError::mismatch(format!("{} is not an enum", at(path))));
    };
    match (e.variant_type(), fields) {
        (VariantType::Unit, Value::Null) => Ok(()),
        (VariantType::Unit, Value::Object(map)) if map.is_empty() => Ok(()),
        (VariantType::Struct, Value::Object(map)) => {
            for (key, item) in map {
                let snake = to_snake_case(key);
                let index = (0..e.field_len())
                    .find(|&i| matches!(e.name_at(i), Some(n) if n == key.as_str() || n == snake))
                    .ok_or_else(|| {
                        BridgeError::not_found(format!("{}: unknown member '{key}'", at(path)))
                    })?;
                let field = e.field_at_mut(index).ok_or_else(|| {
                    BridgeError::not_found(format!("{}: unknown member '{key}'", at(path)))
                })?;
                coerce_onto(field, item, ctx, &join(path, key))?;
            }
            Ok(())
        }
        (VariantType::Tuple, Value::Array(items)) => {
            if items.len() != e.field_len() {
                return Err(BridgeError::mismatch(format!(
                    "{}: expected {} values, got {}",
                    at(path),
                    e.field_len(),
                    items.len()
                )));
            }
            for (i, item) in items.iter().enumerate() {
                if let Some(field) = e.field_at_mut(i) {
                    coerce_onto(field, item, ctx, &join(path, i))?;
                }
            }
            Ok(())
        }
        (VariantType::Tuple, single) if e.field_len() == 1 => match e.field_at_mut(0) {
            Some(field) => coerce_onto(field, single, ctx, &join(path, 0)),
            None => Ok(()),
        },
        (_, other) => Err(BridgeError::mismatch(format!(
            "{}: {} does not fit variant '{}'",
            at(path),
            json_kind(other),
            e.variant_name()
        ))),
    }
}

// === asset references ===

fn coerce_asset(
    asset: &mut AssetRef,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    match value {
        Value::Null => {
            *asset = AssetRef::default();
            Ok(())
        }
        Value::String(p) if p.trim().is_empty() => {
            *asset = AssetRef::default();
            Ok(())
        }
        Value::String(p) => {
            let store = ctx.assets.ok_or_else(|| {
                BridgeError::rejected("no asset store is configured on this host")
            })?;
            *asset = store.resolve(p).ok_or_else(|| {
                BridgeError::not_found(format!("{}: asset '{p}' not found", at(path)))
            })?;
            Ok(())
        }
        other => Err(BridgeError::mismatch(format!(
            "{}: expected an asset path, got {}",
            at(path),
            json_kind(other)
        ))),
    }
}

// === scalars ===

fn clamp_integer(raw: i128, min: i128, max: i128, ctx: &mut CoercionContext, path: &str) -> i128 {
    if raw < min {
        ctx.note(path, format!("clamped {raw} to {min}"));
        min
    } else if raw > max {
        ctx.note(path, format!("clamped {raw} to {max}"));
        max
    } else {
        raw
    }
}

fn integer_from_f64(
    value: f64,
    min: i128,
    max: i128,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<i128> {
    if !value.is_finite() {
        return Err(BridgeError::mismatch(format!(
            "{}: {value} is not a finite number",
            at(path)
        )));
    }
    let truncated = value.trunc();
    if truncated != value {
        ctx.note(path, format!("truncated {value} to {truncated}"));
    }
    Ok(clamp_integer(truncated as i128, min, max, ctx, path))
}

fn integer_from_json(
    value: &Value,
    min: i128,
    max: i128,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<i128> {
    let exact = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    };
    match exact {
        Some(raw) => Ok(clamp_integer(raw, min, max, ctx, path)),
        None => integer_from_f64(number(value, path)?, min, max, ctx, path),
    }
}

fn bool_from_json(value: &Value, path: &str) -> BridgeResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(BridgeError::mismatch(format!(
            "{}: expected a boolean, got {}",
            at(path),
            json_kind(other)
        ))),
    }
}

fn string_from_json(value: &Value, ctx: &mut CoercionContext, path: &str) -> BridgeResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => {
            ctx.note(path, format!("converted number {n} to a string"));
            Ok(n.to_string())
        }
        Value::Bool(b) => {
            ctx.note(path, format!("converted boolean {b} to a string"));
            Ok(b.to_string())
        }
        other => Err(BridgeError::mismatch(format!(
            "{}: expected a string, got {}",
            at(path),
            json_kind(other)
        ))),
    }
}

macro_rules! coerce_integers {
    ($target:expr, $value:expr, $ctx:expr, $path:expr; $($ty:ty),+ $(,)?) => {
        $(
            if let Some(slot) = $target.try_downcast_mut::<$ty>() {
                let raw = integer_from_json($value, <$ty>::MIN as i128, <$ty>::MAX as i128, $ctx, $path)?;
                *slot = raw as $ty;
                return Ok(true);
            }
        )+
    };
}

fn coerce_scalar(
    target: &mut dyn PartialReflect,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<bool> {
    if let Some(slot) = target.try_downcast_mut::<bool>() {
        *slot = bool_from_json(value, path)?;
        return Ok(true);
    }
    if let Some(slot) = target.try_downcast_mut::<String>() {
        *slot = string_from_json(value, ctx, path)?;
        return Ok(true);
    }
    if let Some(slot) = target.try_downcast_mut::<f32>() {
        let n = number(value, path)?;
        let limit = f32::MAX as f64;
        *slot = if n.abs() > limit {
            let clamped = n.clamp(-limit, limit);
            ctx.note(path, format!("clamped {n} to the f32 range"));
            clamped as f32
        } else {
            n as f32
        };
        return Ok(true);
    }
    if let Some(slot) = target.try_downcast_mut::<f64>() {
        *slot = number(value, path)?;
        return Ok(true);
    }
    coerce_integers!(target, value, ctx, path; i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
    Ok(false)
}

// === structural visitor ===

fn coerce_structural(
    target: &mut dyn PartialReflect,
    value: &Value,
    ctx: &mut CoercionContext,
    path: &str,
) -> BridgeResult<()> {
    let type_path = target.reflect_type_path().to_string();
    let represented = target.get_represented_type_info();
    let mismatch = |expected: &str| {
        BridgeError::mismatch(format!(
            "{}: expected {expected} for {type_path}, got {}",
            at(path),
            json_kind(value)
        ))
    };

    match target.reflect_mut() {
        ReflectMut::Struct(s) => {
            let Value::Object(fields) = value else {
                return Err(mismatch("an object"));
            };
            for (key, item) in fields {
                let index = struct_field_index(s, key).ok_or_else(|| {
                    BridgeError::not_found(format!(
                        "{}: unknown member '{key}' on {type_path}",
                        at(path)
                    ))
                })?;
                let child = join(path, s.name_at(index).unwrap_or(key.as_str()));
                if let Some(field) = s.field_at_mut(index) {
                    coerce_onto(field, item, ctx, &child)?;
                }
            }
            Ok(())
        }
        ReflectMut::TupleStruct(s) => match value {
            Value::Array(items) => {
                if items.len() != s.field_len() {
                    return Err(mismatch(&format!("an array of {} values", s.field_len())));
                }
                for (i, item) in items.iter().enumerate() {
                    if let Some(field) = s.field_mut(i) {
                        coerce_onto(field, item, ctx, &join(path, i))?;
                    }
                }
                Ok(())
            }
            single if s.field_len() == 1 => match s.field_mut(0) {
                Some(field) => coerce_onto(field, single, ctx, path),
                None => Err(mismatch("a value")),
            },
            _ => Err(mismatch("an array")),
        },
        ReflectMut::Tuple(t) => {
            let Value::Array(items) = value else {
                return Err(mismatch("an array"));
            };
            if items.len() != t.field_len() {
                return Err(mismatch(&format!("an array of {} values", t.field_len())));
            }
            for (i, item) in items.iter().enumerate() {
                if let Some(field) = t.field_mut(i) {
                    coerce_onto(field, item, ctx, &join(path, i))?;
                }
            }
            Ok(())
        }
        ReflectMut::List(list) => {
            let Value::Array(items) = value else {
                return Err(mismatch("an array"));
            };
            while list.len() > items.len() {
                list.pop();
            }
            let item_type = match represented {
                Some(TypeInfo::List(info)) => Some(info.item_ty().id()),
                _ => None,
            };
            for (i, item) in items.iter().enumerate() {
                let child = indexed(path, i);
                if let Some(existing) = list.get_mut(i) {
                    coerce_onto(existing, item, ctx, &child)?;
                    continue;
                }
                let item_type = item_type.ok_or_else(|| mismatch("a list of known element type"))?;
                let element = build_value(item_type, item, ctx, &child)?;
                list.push(element);
            }
            Ok(())
        }
        ReflectMut::Array(array) => {
            let Value::Array(items) = value else {
                return Err(mismatch("an array"));
            };
            if items.len() != array.len() {
                return Err(mismatch(&format!("an array of exactly {} values", array.len())));
            }
            for (i, item) in items.iter().enumerate() {
                if let Some(slot) = array.get_mut(i) {
                    coerce_onto(slot, item, ctx, &indexed(path, i))?;
                }
            }
            Ok(())
        }
        ReflectMut::Map(map) => {
            let Value::Object(entries) = value else {
                return Err(mismatch("an object"));
            };
            let (key_type, value_type) = match represented {
                Some(TypeInfo::Map(info)) => (info.key_ty().id(), info.value_ty().id()),
                _ => return Err(mismatch("a map of known key type")),
            };
            if key_type != TypeId::of::<String>() {
                return Err(BridgeError::rejected(format!(
                    "{}: only string-keyed maps can be edited",
                    at(path)
                )));
            }
            for (key, item) in entries {
                let child = join(path, key);
                let existing = (0..map.len()).find(|&i| {
                    map.get_at(i).is_some_and(|(k, _)| {
                        k.try_downcast_ref::<String>().is_some_and(|k| k == key)
                    })
                });
                match (existing, item) {
                    (Some(_), Value::Null) => {
                        map.remove(key as &dyn PartialReflect);
                    }
                    (None, Value::Null) => {}
                    (Some(index), _) => {
                        if let Some((_, slot)) = map.get_at_mut(index) {
                            coerce_onto(slot, item, ctx, &child)?;
                        }
                    }
                    (None, _) => {
                        let entry = build_value(value_type, item, ctx, &child)?;
                        map.insert_boxed(Box::new(key.clone()), entry);
                    }
                }
            }
            Ok(())
        }
        _ => Err(BridgeError::mismatch(format!(
            "{}: values of type {type_path} cannot be set from JSON",
            at(path)
        ))),
    }
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// === rendering ===

fn float_json(value: f32) -> Value {
    if !value.is_finite() {
        return Value::Null;
    }
    format!("{value}")
        .parse::<f64>()
        .map(|v| json!(v))
        .unwrap_or_else(|_| json!(value))
}

/// Renders a reflected value as JSON for responses and snapshots.
pub fn reflect_to_json(value: &dyn PartialReflect) -> Value {
    if let Some(v) = value.try_downcast_ref::<Vec2>() {
        return json!({ "x": float_json(v.x), "y": float_json(v.y) });
    }
    if let Some(v) = value.try_downcast_ref::<Vec3>() {
        return json!({ "x": float_json(v.x), "y": float_json(v.y), "z": float_json(v.z) });
    }
    if let Some(v) = value.try_downcast_ref::<Vec4>() {
        return json!({
            "x": float_json(v.x), "y": float_json(v.y), "z": float_json(v.z), "w": float_json(v.w)
        });
    }
    if let Some(v) = value.try_downcast_ref::<IVec2>() {
        return json!({ "x": v.x, "y": v.y });
    }
    if let Some(q) = value.try_downcast_ref::<Quat>() {
        return json!({
            "x": float_json(q.x), "y": float_json(q.y), "z": float_json(q.z), "w": float_json(q.w)
        });
    }
    if let Some(color) = value.try_downcast_ref::<Color>() {
        let c = color.to_srgba();
        return json!({
            "r": float_json(c.red), "g": float_json(c.green), "b": float_json(c.blue),
            "a": float_json(c.alpha)
        });
    }
    if let Some(rect) = value.try_downcast_ref::<Rect>() {
        return json!({
            "min_x": float_json(rect.min.x), "min_y": float_json(rect.min.y),
            "max_x": float_json(rect.max.x), "max_y": float_json(rect.max.y)
        });
    }
    if let Some(asset) = value.try_downcast_ref::<AssetRef>() {
        if asset.is_empty() {
            return Value::Null;
        }
        return json!({ "path": asset.path, "kind": asset.kind });
    }
    if let Some(v) = value.try_downcast_ref::<f32>() {
        return float_json(*v);
    }
    if let Some(v) = value.try_downcast_ref::<f64>() {
        return json!(v);
    }
    if let Some(v) = value.try_downcast_ref::<bool>() {
        return json!(v);
    }
    if let Some(v) = value.try_downcast_ref::<String>() {
        return json!(v);
    }
    macro_rules! render_integers {
        ($($ty:ty),+) => {
            $(
                if let Some(v) = value.try_downcast_ref::<$ty>() {
                    return json!(v);
                }
            )+
        };
    }
    render_integers!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

    match value.reflect_ref() {
        ReflectRef::Struct(s) => {
            let mut out = JsonMap::new();
            for i in 0..s.field_len() {
                if let (Some(name), Some(field)) = (s.name_at(i), s.field_at(i)) {
                    out.insert(name.to_string(), reflect_to_json(field));
                }
            }
            Value::Object(out)
        }
        ReflectRef::TupleStruct(s) if s.field_len() == 1 => {
            s.field(0).map(reflect_to_json).unwrap_or(Value::Null)
        }
        ReflectRef::TupleStruct(s) => Value::Array(s.iter_fields().map(reflect_to_json).collect()),
        ReflectRef::Tuple(t) => Value::Array(t.iter_fields().map(reflect_to_json).collect()),
        ReflectRef::List(l) => Value::Array(l.iter().map(reflect_to_json).collect()),
        ReflectRef::Array(a) => Value::Array(a.iter().map(reflect_to_json).collect()),
        ReflectRef::Map(m) => {
            let mut out = JsonMap::new();
            for (key, item) in m.iter() {
                let key = match key.try_downcast_ref::<String>() {
                    Some(k) => k.clone(),
                    None => match reflect_to_json(key) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                };
                out.insert(key, reflect_to_json(item));
            }
            Value::Object(out)
        }
        ReflectRef::Enum(e) => {
            let option = enum_info(value).is_some_and(is_option);
            match (option, e.variant_type()) {
                (true, VariantType::Unit) => Value::Null,
                (true, _) => e.field_at(0).map(reflect_to_json).unwrap_or(Value::Null),
                (false, VariantType::Unit) => json!(e.variant_name()),
                (false, VariantType::Tuple) => {
                    let fields: Vec<Value> = (0..e.field_len())
                        .filter_map(|i| e.field_at(i))
                        .map(reflect_to_json)
                        .collect();
                    let inner = if fields.len() == 1 {
                        fields.into_iter().next().unwrap_or(Value::Null)
                    } else {
                        Value::Array(fields)
                    };
                    json!({ e.variant_name(): inner })
                }
                (false, VariantType::Struct) => {
                    let mut fields = JsonMap::new();
                    for i in 0..e.field_len() {
                        if let (Some(name), Some(field)) = (e.name_at(i), e.field_at(i)) {
                            fields.insert(name.to_string(), reflect_to_json(field));
                        }
                    }
                    json!({ e.variant_name(): fields })
                }
            }
        }
        _ => {
            let kind = value.reflect_kind();
            if kind == ReflectKind::Opaque {
                json!(format!("{value:?}"))
            } else {
                json!(value.reflect_type_path())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryAssetStore;
    use crate::components::{
        Door, DoorLock, Health, Patrol, PatrolMode, PersistentListener, SampleBehaviorsPlugin,
        Spawner, SpriteRenderer, SpriteTint,
    };
    use crate::error::ErrorKind;
    use crate::methods::ListenerMode;

    fn registry() -> AppTypeRegistry {
        let mut app = App::new();
        app.add_plugins(SampleBehaviorsPlugin);
        app.world().resource::<AppTypeRegistry>().clone()
    }

    fn coerce<T: PartialReflect>(target: &mut T, value: Value) -> BridgeResult<Vec<String>> {
        let registry = registry();
        let registry = registry.read();
        let store = InMemoryAssetStore::with_paths(["sprites/hero.png", "prefabs/goblin.scn"]);
        let mut ctx = CoercionContext::new(&registry, Some(&store));
        coerce_onto(target, &value, &mut ctx, "")?;
        Ok(ctx.take_notes())
    }

    #[test]
    fn partial_vector_update_keeps_other_components() {
        let mut patrol = Patrol::default();
        coerce(&mut patrol, json!({ "offset": { "x": 1, "y": 2, "z": 3 } })).expect("full");
        coerce(&mut patrol, json!({ "offset": { "y": 9 } })).expect("partial");
        assert_eq!(patrol.offset, Vec3::new(1.0, 9.0, 3.0));
        coerce(&mut patrol, json!({ "offset": [4, 5, 6] })).expect("array");
        assert_eq!(patrol.offset, Vec3::new(4.0, 5.0, 6.0));
        let err = coerce(&mut patrol, json!({ "offset": { "q": 1 } })).expect_err("bad key");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn colors_accept_channels_and_hex() {
        let mut tint = SpriteTint::default();
        coerce(&mut tint, json!({ "color": { "g": 0.0 } })).expect("channel");
        let c = tint.color.to_srgba();
        assert_eq!((c.red, c.green, c.blue, c.alpha), (1.0, 0.0, 1.0, 1.0));
        coerce(&mut tint, json!({ "color": "#00ff0080" })).expect("hex");
        let c = tint.color.to_srgba();
        assert_eq!(c.red, 0.0);
        assert_eq!(c.green, 1.0);
        assert!((c.alpha - 128.0 / 255.0).abs() < 1e-3);
        assert!(coerce(&mut tint, json!({ "color": "#zz" })).is_err());
    }

    #[test]
    fn rect_merges_named_edges() {
        let mut renderer = SpriteRenderer::default();
        coerce(&mut renderer, json!({ "bounds": [0, 0, 16, 16] })).expect("array");
        coerce(&mut renderer, json!({ "bounds": { "maxX": 32 } })).expect("edge");
        assert_eq!(renderer.bounds.max, Vec2::new(32.0, 16.0));
        assert_eq!(renderer.bounds.min, Vec2::ZERO);
    }

    #[test]
    fn enum_variants_match_case_sensitively() {
        let mut door = Door::default();
        coerce(&mut door, json!({ "lock": "Locked" })).expect("variant");
        assert_eq!(door.lock, DoorLock::Locked);
        let err = coerce(&mut door, json!({ "lock": "locked" })).expect_err("case");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("Unlocked, Locked, Jammed"));
        assert_eq!(door.lock, DoorLock::Locked);
    }

    #[test]
    fn options_and_maps() {
        let mut spawner = Spawner::default();
        coerce(&mut spawner, json!({ "tag": "wave-1" })).expect("some");
        assert_eq!(spawner.tag.as_deref(), Some("wave-1"));
        coerce(&mut spawner, json!({ "tag": "wave-2" })).expect("edit some");
        assert_eq!(spawner.tag.as_deref(), Some("wave-2"));
        coerce(&mut spawner, json!({ "tag": null })).expect("none");
        assert!(spawner.tag.is_none());

        coerce(&mut spawner, json!({ "weights": { "goblin": 0.5, "orc": 2 } })).expect("insert");
        assert_eq!(spawner.weights.get("orc"), Some(&2.0));
        coerce(&mut spawner, json!({ "weights": { "orc": null, "goblin": 0.75 } })).expect("edit");
        assert_eq!(spawner.weights.len(), 1);
        assert_eq!(spawner.weights.get("goblin"), Some(&0.75));
    }

    #[test]
    fn integers_truncate_and_clamp_with_notes() {
        let mut spawner = Spawner::default();
        let notes = coerce(&mut spawner, json!({ "max_alive": 2.7 })).expect("truncate");
        assert_eq!(spawner.max_alive, 2);
        assert_eq!(notes, vec!["max_alive: truncated 2.7 to 2".to_string()]);

        let notes = coerce(&mut spawner, json!({ "maxAlive": 300 })).expect("clamp");
        assert_eq!(spawner.max_alive, u8::MAX);
        assert_eq!(notes, vec!["max_alive: clamped 300 to 255".to_string()]);

        let notes = coerce(&mut spawner, json!({ "max_alive": 10 })).expect("exact");
        assert!(notes.is_empty());
        let err = coerce(&mut spawner, json!({ "max_alive": "lots" })).expect_err("text");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn asset_paths_resolve_through_store() {
        let mut spawner = Spawner::default();
        coerce(&mut spawner, json!({ "prefab": "assets/prefabs/goblin.scn" })).expect("asset");
        assert_eq!(spawner.prefab.path, "prefabs/goblin.scn");
        assert_eq!(spawner.prefab.kind, "prefab");
        let err = coerce(&mut spawner, json!({ "prefab": "prefabs/dragon.scn" })).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
        coerce(&mut spawner, json!({ "prefab": null })).expect("clear");
        assert!(spawner.prefab.is_empty());
    }

    #[test]
    fn lists_resize_and_unknown_members_fail() {
        let mut patrol = Patrol::default();
        coerce(&mut patrol, json!({ "waypoints": [[0, 0], { "x": 4, "y": 1 }], "mode": "PingPong" }))
            .expect("list");
        assert_eq!(patrol.waypoints, vec![Vec2::ZERO, Vec2::new(4.0, 1.0)]);
        assert_eq!(patrol.mode, PatrolMode::PingPong);
        coerce(&mut patrol, json!({ "waypoints": [{ "y": 7 }] })).expect("shrink");
        assert_eq!(patrol.waypoints, vec![Vec2::new(0.0, 7.0)]);

        let err = coerce(&mut patrol, json!({ "velocity": 3 })).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
        let err = coerce(&mut patrol, json!({ "speed": true })).expect_err("shape");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn appends_and_removes_listener_elements() {
        let registry = registry();
        let registry = registry.read();
        let mut ctx = CoercionContext::new(&registry, None);
        let mut health = Health::default();
        let listeners = crate::members::resolve_member_mut(&mut health, "on_death.listeners")
            .expect("listeners");
        let index = append_to_list(
            listeners,
            &json!({ "target": "Boss", "method": "kill", "mode": "Void" }),
            &mut ctx,
            "on_death.listeners",
        )
        .expect("append");
        assert_eq!(index, 0);
        assert_eq!(health.on_death.listeners[0].target, "Boss");
        assert_eq!(health.on_death.listeners[0].mode, ListenerMode::Void);
        assert!(health.on_death.listeners[0].enabled);

        let listeners = crate::members::resolve_member_mut(&mut health, "on_death.listeners")
            .expect("listeners");
        assert!(remove_from_list(listeners, 4, "on_death.listeners").is_err());
        let removed = remove_from_list(listeners, 0, "on_death.listeners").expect("remove");
        assert!(removed.try_downcast_ref::<PersistentListener>().is_some());
        assert!(health.on_death.listeners.is_empty());
    }

    #[test]
    fn renders_behaviors_as_json() {
        let mut spawner = Spawner {
            max_alive: 3,
            tag: Some("wave".into()),
            ..Default::default()
        };
        spawner.weights.insert("goblin".into(), 0.5);
        let json = reflect_to_json(&spawner);
        assert_eq!(json["max_alive"], json!(3));
        assert_eq!(json["tag"], json!("wave"));
        assert_eq!(json["prefab"], Value::Null);
        assert_eq!(json["weights"]["goblin"], json!(0.5));

        let door = reflect_to_json(&Door {
            lock: DoorLock::Jammed,
            ..Default::default()
        });
        assert_eq!(door["lock"], json!("Jammed"));
        assert_eq!(door["on_opened"]["listeners"], json!([]));

        let transform = reflect_to_json(&Transform::from_xyz(1.5, 0.0, -2.0));
        assert_eq!(transform["translation"], json!({ "x": 1.5, "y": 0.0, "z": -2.0 }));
    }
}
