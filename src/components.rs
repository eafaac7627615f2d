use bevy::prelude::*;

use crate::methods::{BehaviorMethods, ListenerMode, MethodArg, MethodSignature, ReflectMethods};

/// Node activity flag. Nodes without it are active.
#[derive(Component, Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Component, Default)]
pub struct Active(pub bool);

impl Default for Active {
    fn default() -> Self {
        Active(true)
    }
}

/// Reference to a stored asset, resolved through the host's asset store.
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct AssetRef {
    pub path: String,
    pub kind: String,
}

impl AssetRef {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Observer-pattern field: a persisted list of listeners, edited as data.
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct ObserverEvent {
    pub listeners: Vec<PersistentListener>,
}

#[derive(Reflect, Clone, Debug, PartialEq)]
#[reflect(Default)]
pub struct PersistentListener {
    /// Path of the target node at wiring time.
    pub target: String,
    /// Full type path of the behavior that owns `method`.
    pub behavior: String,
    pub method: String,
    pub mode: ListenerMode,
    pub argument: ListenerArgument,
    pub enabled: bool,
}

impl Default for PersistentListener {
    fn default() -> Self {
        Self {
            target: String::new(),
            behavior: String::new(),
            method: String::new(),
            mode: ListenerMode::Void,
            argument: ListenerArgument::default(),
            enabled: true,
        }
    }
}

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct ListenerArgument {
    pub int_value: i64,
    pub float_value: f64,
    pub string_value: String,
    pub bool_value: bool,
    pub reference: String,
}

impl PersistentListener {
    pub fn call_arg(&self) -> MethodArg {
        match self.mode {
            ListenerMode::Void => MethodArg::Void,
            ListenerMode::Int => MethodArg::Int(self.argument.int_value),
            ListenerMode::Float => MethodArg::Float(self.argument.float_value),
            ListenerMode::String => MethodArg::String(self.argument.string_value.clone()),
            ListenerMode::Bool => MethodArg::Bool(self.argument.bool_value),
            ListenerMode::Reference => MethodArg::Reference(self.argument.reference.clone()),
        }
    }
}

// === Sample behaviors shipped with the headless host ===

#[derive(Component, Reflect, Clone, Debug, PartialEq)]
#[reflect(Component, Default, Methods)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    pub invulnerable: bool,
    pub on_death: ObserverEvent,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 100.0,
            max: 100.0,
            invulnerable: false,
            on_death: ObserverEvent::default(),
        }
    }
}

impl BehaviorMethods for Health {
    fn method_signatures() -> &'static [MethodSignature] {
        const METHODS: &[MethodSignature] = &[
            MethodSignature::new("heal", ListenerMode::Float),
            MethodSignature::new("damage", ListenerMode::Float),
            MethodSignature::new("damage", ListenerMode::Int),
            MethodSignature::new("kill", ListenerMode::Void),
            MethodSignature::new("set_invulnerable", ListenerMode::Bool),
        ];
        METHODS
    }

    fn call_method(&mut self, name: &str, arg: &MethodArg) -> Result<(), String> {
        match (name, arg) {
            ("heal", MethodArg::Float(v)) => {
                self.current = (self.current + *v as f32).min(self.max);
            }
            ("damage", MethodArg::Float(v)) => {
                if !self.invulnerable {
                    self.current = (self.current - *v as f32).max(0.0);
                }
            }
            ("damage", MethodArg::Int(v)) => {
                if !self.invulnerable {
                    self.current = (self.current - *v as f32).max(0.0);
                }
            }
            ("kill", _) => self.current = 0.0,
            ("set_invulnerable", MethodArg::Bool(v)) => self.invulnerable = *v,
            _ => return Err(format!("Health::{name} does not accept {:?}", arg.mode())),
        }
        Ok(())
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoorLock {
    #[default]
    Unlocked,
    Locked,
    Jammed,
}

#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component, Default, Methods)]
pub struct Door {
    pub open: bool,
    pub lock: DoorLock,
    pub code: u32,
    pub on_opened: ObserverEvent,
    pub on_closed: ObserverEvent,
}

impl BehaviorMethods for Door {
    fn method_signatures() -> &'static [MethodSignature] {
        const METHODS: &[MethodSignature] = &[
            MethodSignature::new("open", ListenerMode::Void),
            MethodSignature::new("close", ListenerMode::Void),
            MethodSignature::new("toggle", ListenerMode::Void),
            MethodSignature::new("unlock", ListenerMode::Int),
        ];
        METHODS
    }

    fn call_method(&mut self, name: &str, arg: &MethodArg) -> Result<(), String> {
        match (name, arg) {
            ("open", _) => {
                if self.lock != DoorLock::Unlocked {
                    return Err(format!("door is {:?}", self.lock));
                }
                self.open = true;
            }
            ("close", _) => self.open = false,
            ("toggle", _) => {
                if self.lock != DoorLock::Unlocked {
                    return Err(format!("door is {:?}", self.lock));
                }
                self.open = !self.open;
            }
            ("unlock", MethodArg::Int(code)) => {
                if self.lock == DoorLock::Locked && i64::from(self.code) == *code {
                    self.lock = DoorLock::Unlocked;
                } else {
                    return Err("wrong code".to_string());
                }
            }
            _ => return Err(format!("Door::{name} does not accept {:?}", arg.mode())),
        }
        Ok(())
    }
}

#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component, Default, Methods)]
pub struct Button {
    pub label: String,
    pub click_count: u32,
    pub interactable: bool,
    pub on_click: ObserverEvent,
    pub on_hover: ObserverEvent,
}

impl BehaviorMethods for Button {
    fn method_signatures() -> &'static [MethodSignature] {
        const METHODS: &[MethodSignature] = &[
            MethodSignature::new("press", ListenerMode::Void),
            MethodSignature::new("set_label", ListenerMode::String),
            MethodSignature::new("set_interactable", ListenerMode::Bool),
        ];
        METHODS
    }

    fn call_method(&mut self, name: &str, arg: &MethodArg) -> Result<(), String> {
        match (name, arg) {
            ("press", _) => self.click_count = self.click_count.saturating_add(1),
            ("set_label", MethodArg::String(label)) => self.label = label.clone(),
            ("set_interactable", MethodArg::Bool(v)) => self.interactable = *v,
            _ => return Err(format!("Button::{name} does not accept {:?}", arg.mode())),
        }
        Ok(())
    }
}

#[derive(Component, Reflect, Clone, Debug, PartialEq)]
#[reflect(Component, Default)]
pub struct SpriteTint {
    pub color: Color,
    pub intensity: f32,
}

impl Default for SpriteTint {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatrolMode {
    #[default]
    Loop,
    PingPong,
    Once,
}

#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component, Default)]
pub struct Patrol {
    pub waypoints: Vec<Vec2>,
    pub speed: f32,
    pub mode: PatrolMode,
    pub offset: Vec3,
}

#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component, Default)]
pub struct Spawner {
    pub prefab: AssetRef,
    pub interval: f64,
    pub max_alive: u8,
    pub tag: Option<String>,
    pub weights: bevy::utils::HashMap<String, f32>,
}

#[derive(Component, Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Component, Default)]
pub struct SpriteRenderer {
    pub sprite: AssetRef,
    pub flip_x: bool,
    pub layer: i32,
    pub bounds: Rect,
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Team {
    #[default]
    Neutral,
    Player,
    Enemy,
}

#[derive(Component, Reflect, Clone, Copy, Debug, Default, PartialEq)]
#[reflect(Component, Default)]
pub struct Faction(pub Team);

pub struct SampleBehaviorsPlugin;

impl Plugin for SampleBehaviorsPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Health>()
            .register_type::<Door>()
            .register_type::<DoorLock>()
            .register_type::<Button>()
            .register_type::<SpriteTint>()
            .register_type::<Patrol>()
            .register_type::<PatrolMode>()
            .register_type::<Spawner>()
            .register_type::<Option<String>>()
            .register_type::<bevy::utils::HashMap<String, f32>>()
            .register_type::<SpriteRenderer>()
            .register_type::<Team>()
            .register_type::<Faction>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_methods_respect_invulnerability() {
        let mut health = Health::default();
        health
            .call_method("damage", &MethodArg::Int(30))
            .expect("damage");
        assert_eq!(health.current, 70.0);
        health
            .call_method("set_invulnerable", &MethodArg::Bool(true))
            .expect("invulnerable");
        health
            .call_method("damage", &MethodArg::Float(50.0))
            .expect("damage");
        assert_eq!(health.current, 70.0);
        health
            .call_method("heal", &MethodArg::Float(500.0))
            .expect("heal");
        assert_eq!(health.current, health.max);
    }

    #[test]
    fn locked_door_needs_code() {
        let mut door = Door {
            lock: DoorLock::Locked,
            code: 42,
            ..default()
        };
        assert!(door.call_method("open", &MethodArg::Void).is_err());
        assert!(door.call_method("unlock", &MethodArg::Int(7)).is_err());
        door.call_method("unlock", &MethodArg::Int(42))
            .expect("unlock");
        door.call_method("open", &MethodArg::Void).expect("open");
        assert!(door.open);
    }

    #[test]
    fn listener_builds_call_argument_from_mode() {
        let listener = PersistentListener {
            mode: ListenerMode::String,
            argument: ListenerArgument {
                string_value: "Play".to_string(),
                int_value: 3,
                ..default()
            },
            ..default()
        };
        assert_eq!(listener.call_arg(), MethodArg::String("Play".to_string()));
        assert!(listener.enabled);
    }
}
