//! Invocable methods for behaviors.
//!
//! Rust has no runtime method reflection, so behaviors that can be the target
//! of a persistent listener publish a static method table through the
//! [`ReflectMethods`] type data (`#[reflect(Methods)]`).

use bevy::reflect::FromType;
use bevy::prelude::*;
use serde::Serialize;

/// Argument shape a listener passes to its target method.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerMode {
    #[default]
    Void,
    Int,
    Float,
    String,
    Bool,
    Reference,
}

impl ListenerMode {
    pub const ALL: [ListenerMode; 6] = [
        ListenerMode::Void,
        ListenerMode::Int,
        ListenerMode::Float,
        ListenerMode::String,
        ListenerMode::Bool,
        ListenerMode::Reference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ListenerMode::Void => "void",
            ListenerMode::Int => "int",
            ListenerMode::Float => "float",
            ListenerMode::String => "string",
            ListenerMode::Bool => "bool",
            ListenerMode::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let mode = match lowered.as_str() {
            "void" | "none" | "" => ListenerMode::Void,
            "int" | "integer" => ListenerMode::Int,
            "float" | "number" => ListenerMode::Float,
            "string" | "str" => ListenerMode::String,
            "bool" | "boolean" => ListenerMode::Bool,
            "reference" | "object" | "ref" => ListenerMode::Reference,
            _ => return None,
        };
        Some(mode)
    }

    /// Name of the variant as stored in reflected listener data.
    pub fn variant_name(self) -> &'static str {
        match self {
            ListenerMode::Void => "Void",
            ListenerMode::Int => "Int",
            ListenerMode::Float => "Float",
            ListenerMode::String => "String",
            ListenerMode::Bool => "Bool",
            ListenerMode::Reference => "Reference",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MethodArg {
    Void,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Reference(String),
}

impl MethodArg {
    pub fn mode(&self) -> ListenerMode {
        match self {
            MethodArg::Void => ListenerMode::Void,
            MethodArg::Int(_) => ListenerMode::Int,
            MethodArg::Float(_) => ListenerMode::Float,
            MethodArg::String(_) => ListenerMode::String,
            MethodArg::Bool(_) => ListenerMode::Bool,
            MethodArg::Reference(_) => ListenerMode::Reference,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: &'static str,
    pub mode: ListenerMode,
}

impl MethodSignature {
    pub const fn new(name: &'static str, mode: ListenerMode) -> Self {
        Self { name, mode }
    }
}

pub trait BehaviorMethods: Reflect {
    fn method_signatures() -> &'static [MethodSignature];

    fn call_method(&mut self, name: &str, arg: &MethodArg) -> Result<(), String>;
}

#[derive(Clone)]
pub struct ReflectMethods {
    signatures: fn() -> &'static [MethodSignature],
    call: fn(&mut dyn Reflect, &str, &MethodArg) -> Result<(), String>,
}

impl ReflectMethods {
    pub fn signatures(&self) -> &'static [MethodSignature] {
        (self.signatures)()
    }

    pub fn call(&self, target: &mut dyn Reflect, name: &str, arg: &MethodArg) -> Result<(), String> {
        (self.call)(target, name, arg)
    }

    /// Exact name + mode match first, otherwise the first method with the name.
    pub fn find(&self, name: &str, mode: ListenerMode) -> Option<(MethodSignature, bool)> {
        let signatures = self.signatures();
        if let Some(exact) = signatures
            .iter()
            .find(|sig| sig.name == name && sig.mode == mode)
        {
            return Some((*exact, true));
        }
        signatures
            .iter()
            .find(|sig| sig.name == name)
            .map(|sig| (*sig, false))
    }
}

impl<T: BehaviorMethods> FromType<T> for ReflectMethods {
    fn from_type() -> Self {
        Self {
            signatures: T::method_signatures,
            call: |target, name, arg| {
                let Some(this) = target.downcast_mut::<T>() else {
                    return Err(format!(
                        "method table does not belong to {}",
                        target.reflect_type_path()
                    ));
                };
                this.call_method(name, arg)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Reflect, Default)]
    struct Lamp {
        lit: bool,
        brightness: f32,
    }

    impl BehaviorMethods for Lamp {
        fn method_signatures() -> &'static [MethodSignature] {
            const METHODS: &[MethodSignature] = &[
                MethodSignature::new("toggle", ListenerMode::Void),
                MethodSignature::new("set_brightness", ListenerMode::Float),
                MethodSignature::new("set_brightness", ListenerMode::Int),
            ];
            METHODS
        }

        fn call_method(&mut self, name: &str, arg: &MethodArg) -> Result<(), String> {
            match (name, arg) {
                ("toggle", _) => self.lit = !self.lit,
                ("set_brightness", MethodArg::Float(v)) => self.brightness = *v as f32,
                ("set_brightness", MethodArg::Int(v)) => self.brightness = *v as f32,
                _ => return Err(format!("Lamp cannot handle {name}")),
            }
            Ok(())
        }
    }

    #[test]
    fn find_prefers_exact_signature() {
        let methods = <ReflectMethods as FromType<Lamp>>::from_type();
        let (sig, exact) = methods
            .find("set_brightness", ListenerMode::Int)
            .expect("method");
        assert!(exact);
        assert_eq!(sig.mode, ListenerMode::Int);

        let (sig, exact) = methods
            .find("set_brightness", ListenerMode::String)
            .expect("fallback");
        assert!(!exact);
        assert_eq!(sig.mode, ListenerMode::Float);
        assert!(methods.find("explode", ListenerMode::Void).is_none());
    }

    #[test]
    fn call_dispatches_through_reflect() {
        let methods = <ReflectMethods as FromType<Lamp>>::from_type();
        let mut lamp = Lamp::default();
        methods
            .call(&mut lamp, "set_brightness", &MethodArg::Float(0.5))
            .expect("call");
        methods
            .call(&mut lamp, "toggle", &MethodArg::Void)
            .expect("toggle");
        assert!(lamp.lit);
        assert!((lamp.brightness - 0.5).abs() < f32::EPSILON);
        assert!(methods
            .call(&mut lamp, "set_brightness", &MethodArg::Bool(true))
            .is_err());
    }

    #[test]
    fn modes_parse_loosely() {
        assert_eq!(ListenerMode::parse("Integer"), Some(ListenerMode::Int));
        assert_eq!(ListenerMode::parse("object"), Some(ListenerMode::Reference));
        assert_eq!(ListenerMode::parse("vector"), None);
        for mode in ListenerMode::ALL {
            assert_eq!(ListenerMode::parse(mode.as_str()), Some(mode));
        }
    }
}
