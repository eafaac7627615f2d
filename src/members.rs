//! Dotted / indexed member paths over reflected values.
//!
//! `on_click.listeners[0].method` walks a struct field, a list element and a
//! nested field. `[key]` also addresses string-keyed map entries, and numeric
//! dotted segments (`offset.0`) address tuple fields.

use bevy::reflect::{Map, PartialReflect, ReflectMut, ReflectRef, Struct};

use crate::error::{BridgeError, BridgeResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
    Key(String),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{name}"),
            Segment::Index(index) => write!(f, "[{index}]"),
            Segment::Key(key) => write!(f, "[{key}]"),
        }
    }
}

pub fn parse_member_path(path: &str) -> BridgeResult<Vec<Segment>> {
    let path = path.trim();
    if path.is_empty() {
        return Err(BridgeError::missing("member path is empty"));
    }
    let mut segments = Vec::new();
    let mut rest = path;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| {
                BridgeError::mismatch(format!("unclosed '[' in member path '{path}'"))
            })?;
            let inner = after[..close].trim().trim_matches('"');
            if inner.is_empty() {
                return Err(BridgeError::mismatch(format!(
                    "empty index in member path '{path}'"
                )));
            }
            segments.push(match inner.parse::<usize>() {
                Ok(index) => Segment::Index(index),
                Err(_) => Segment::Key(inner.to_string()),
            });
            rest = &after[close + 1..];
            rest = rest.strip_prefix('.').unwrap_or(rest);
            continue;
        }
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let name = &rest[..end];
        if name.is_empty() {
            return Err(BridgeError::mismatch(format!(
                "empty segment in member path '{path}'"
            )));
        }
        segments.push(Segment::Field(name.to_string()));
        rest = &rest[end..];
        rest = rest.strip_prefix('.').unwrap_or(rest);
    }
    Ok(segments)
}

/// `maxHealth` → `max_health`, `OnClick` → `on_click`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch == ' ' || ch == '-' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Field index by exact name, then by its snake_case spelling.
pub fn struct_field_index(value: &dyn Struct, name: &str) -> Option<usize> {
    let find = |wanted: &str| (0..value.field_len()).find(|&i| value.name_at(i) == Some(wanted));
    find(name).or_else(|| {
        let snake = to_snake_case(name);
        (snake != name).then(|| find(snake.as_str())).flatten()
    })
}

fn map_entry_index(map: &dyn Map, key: &str) -> Option<usize> {
    (0..map.len()).find(|&i| {
        map.get_at(i).is_some_and(|(k, _)| {
            k.try_downcast_ref::<String>()
                .is_some_and(|k| k == key)
        })
    })
}

fn missing_member(value_type: &str, segment: &Segment) -> BridgeError {
    BridgeError::not_found(format!("Unknown member '{segment}' on {value_type}"))
}

fn step<'a>(value: &'a dyn PartialReflect, segment: &Segment) -> BridgeResult<&'a dyn PartialReflect> {
    let found = match (value.reflect_ref(), segment) {
        (ReflectRef::Struct(s), Segment::Field(name)) => {
            struct_field_index(s, name).and_then(|i| s.field_at(i))
        }
        (ReflectRef::TupleStruct(s), Segment::Field(name)) => {
            name.parse::<usize>().ok().and_then(|i| s.field(i))
        }
        (ReflectRef::Tuple(t), Segment::Field(name)) => {
            name.parse::<usize>().ok().and_then(|i| t.field(i))
        }
        (ReflectRef::List(l), Segment::Index(i)) => l.get(*i),
        (ReflectRef::Array(a), Segment::Index(i)) => a.get(*i),
        (ReflectRef::Map(m), Segment::Key(key)) => {
            map_entry_index(m, key).and_then(|i| m.get_at(i)).map(|(_, v)| v)
        }
        (ReflectRef::Map(m), Segment::Index(i)) => map_entry_index(m, &i.to_string())
            .and_then(|i| m.get_at(i))
            .map(|(_, v)| v),
        (ReflectRef::Enum(e), Segment::Field(name)) => match name.parse::<usize>() {
            Ok(i) => e.field_at(i),
            Err(_) => e.field(name).or_else(|| e.field(&to_snake_case(name))),
        },
        _ => None,
    };
    found.ok_or_else(|| missing_member(value.reflect_type_path(), segment))
}

fn step_mut<'a>(
    value: &'a mut dyn PartialReflect,
    segment: &Segment,
) -> BridgeResult<&'a mut dyn PartialReflect> {
    let value_type = value.reflect_type_path().to_string();
    let found = match (value.reflect_mut(), segment) {
        (ReflectMut::Struct(s), Segment::Field(name)) => match struct_field_index(s, name) {
            Some(i) => s.field_at_mut(i),
            None => None,
        },
        (ReflectMut::TupleStruct(s), Segment::Field(name)) => {
            name.parse::<usize>().ok().and_then(|i| s.field_mut(i))
        }
        (ReflectMut::Tuple(t), Segment::Field(name)) => {
            name.parse::<usize>().ok().and_then(|i| t.field_mut(i))
        }
        (ReflectMut::List(l), Segment::Index(i)) => l.get_mut(*i),
        (ReflectMut::Array(a), Segment::Index(i)) => a.get_mut(*i),
        (ReflectMut::Map(m), Segment::Key(key)) => match map_entry_index(m, key) {
            Some(i) => m.get_at_mut(i).map(|(_, v)| v),
            None => None,
        },
        (ReflectMut::Map(m), Segment::Index(i)) => match map_entry_index(m, &i.to_string()) {
            Some(i) => m.get_at_mut(i).map(|(_, v)| v),
            None => None,
        },
        (ReflectMut::Enum(e), Segment::Field(name)) => {
            let index = match name.parse::<usize>() {
                Ok(i) => Some(i),
                Err(_) => {
                    let snake = to_snake_case(name);
                    (0..e.field_len())
                        .find(|&i| matches!(e.name_at(i), Some(n) if n == name.as_str() || n == snake))
                }
            };
            index.and_then(|i| e.field_at_mut(i))
        }
        _ => None,
    };
    found.ok_or_else(|| missing_member(&value_type, segment))
}

pub fn resolve_member<'a>(
    root: &'a dyn PartialReflect,
    path: &str,
) -> BridgeResult<&'a dyn PartialReflect> {
    let mut current = root;
    for segment in parse_member_path(path)? {
        current = step(current, &segment)?;
    }
    Ok(current)
}

pub fn resolve_member_mut<'a>(
    root: &'a mut dyn PartialReflect,
    path: &str,
) -> BridgeResult<&'a mut dyn PartialReflect> {
    let mut current = root;
    for segment in parse_member_path(path)? {
        current = step_mut(current, &segment)?;
    }
    Ok(current)
}
