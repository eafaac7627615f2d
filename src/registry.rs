use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bevy::prelude::*;
use bevy::reflect::{TypeInfo, TypeRegistration, TypeRegistry};
use serde::Serialize;
use serde_json::{json, Value};

use crate::components::ObserverEvent;
use crate::error::{BridgeError, BridgeResult};
use crate::methods::ReflectMethods;

/// Which resolution tier produced a [`ResolvedType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Exact,
    Prefixed,
    AttachedBehavior,
    ShortName,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedType {
    pub type_id: TypeId,
    pub type_path: String,
    pub short_name: String,
    pub tier: ResolutionTier,
}

impl ResolvedType {
    fn from_registration(registration: &TypeRegistration, tier: ResolutionTier) -> Self {
        let table = registration.type_info().type_path_table();
        Self {
            type_id: registration.type_id(),
            type_path: table.path().to_string(),
            short_name: table.short_path().to_string(),
            tier,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "typePath": self.type_path,
            "shortName": self.short_name,
            "tier": self.tier,
        })
    }
}

/// Name → type resolution over the host's reflection registry.
///
/// Callers pass either full type paths or bare names; resolution tries, in
/// order, the exact path, each configured namespace prefix, the behaviors
/// attached to the node in question and finally a registry-wide unique short
/// name. Hits are cached until [`TypeCatalog::invalidate`] is called after a
/// rebuild.
#[derive(Resource, Clone)]
pub struct TypeCatalog {
    registry: AppTypeRegistry,
    prefixes: Arc<Vec<String>>,
    cache: Arc<RwLock<HashMap<String, (TypeId, ResolutionTier)>>>,
}

impl TypeCatalog {
    pub fn new(registry: AppTypeRegistry, prefixes: Vec<String>) -> Self {
        Self {
            registry,
            prefixes: Arc::new(prefixes),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &AppTypeRegistry {
        &self.registry
    }

    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if !cache.is_empty() {
            debug!("[Bridge types] Dropping {} cached resolutions", cache.len());
        }
        cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn resolve(
        &self,
        world: &World,
        type_name: &str,
        node: Option<Entity>,
    ) -> BridgeResult<ResolvedType> {
        let name = type_name.trim();
        if name.is_empty() {
            return Err(BridgeError::missing("type name is empty"));
        }
        let registry = self.registry.read();

        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied();
        if let Some((type_id, tier)) = cached {
            if let Some(registration) = registry.get(type_id) {
                return Ok(ResolvedType::from_registration(registration, tier));
            }
        }

        let resolved = self
            .resolve_uncached(&registry, world, name, node)
            .ok_or_else(|| BridgeError::not_found(format!("Type '{name}' is not registered")))?;
        // Attached hits depend on the node searched, so only node-free tiers are cached.
        if resolved.tier != ResolutionTier::AttachedBehavior {
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), (resolved.type_id, resolved.tier));
        }
        Ok(resolved)
    }

    fn resolve_uncached(
        &self,
        registry: &TypeRegistry,
        world: &World,
        name: &str,
        node: Option<Entity>,
    ) -> Option<ResolvedType> {
        if let Some(registration) = registry.get_with_type_path(name) {
            return Some(ResolvedType::from_registration(
                registration,
                ResolutionTier::Exact,
            ));
        }

        let bare = name.rsplit("::").next().unwrap_or(name);
        for prefix in self.prefixes.iter() {
            let candidate = format!("{prefix}{bare}");
            if let Some(registration) = registry.get_with_type_path(&candidate) {
                return Some(ResolvedType::from_registration(
                    registration,
                    ResolutionTier::Prefixed,
                ));
            }
        }

        if let Some(entity) = node.filter(|e| world.entities().contains(*e)) {
            for info in world.inspect_entity(entity) {
                let Some(registration) = info.type_id().and_then(|id| registry.get(id)) else {
                    continue;
                };
                let table = registration.type_info().type_path_table();
                if table.short_path() == bare || table.ident() == Some(bare) {
                    return Some(ResolvedType::from_registration(
                        registration,
                        ResolutionTier::AttachedBehavior,
                    ));
                }
            }
        }

        registry
            .get_with_short_type_path(bare)
            .map(|registration| {
                ResolvedType::from_registration(registration, ResolutionTier::ShortName)
            })
    }

    /// Registered types carrying `ReflectComponent`, sorted by short name.
    pub fn behavior_types(&self) -> Vec<ResolvedType> {
        let registry = self.registry.read();
        let mut types: Vec<ResolvedType> = registry
            .iter()
            .filter(|r| r.data::<ReflectComponent>().is_some())
            .map(|r| ResolvedType::from_registration(r, ResolutionTier::Exact))
            .collect();
        types.sort_by(|a, b| {
            a.short_name
                .cmp(&b.short_name)
                .then_with(|| a.type_path.cmp(&b.type_path))
        });
        types
    }

    pub fn describe(&self, resolved: &ResolvedType) -> BridgeResult<TypeDescriptor> {
        let registry = self.registry.read();
        let registration = registry.get(resolved.type_id).ok_or_else(|| {
            BridgeError::not_found(format!(
                "Type '{}' left the registry",
                resolved.type_path
            ))
        })?;
        Ok(TypeDescriptor::from_registration(registration))
    }
}

/// Member-level view of a registered type.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub type_path: String,
    pub short_name: String,
    pub kind: &'static str,
    pub is_behavior: bool,
    pub members: Vec<MemberDescriptor>,
    pub variants: Vec<String>,
    pub observer_fields: Vec<String>,
    pub methods: Vec<MethodDescriptor>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDescriptor {
    pub name: String,
    pub type_path: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub mode: &'static str,
}

impl TypeDescriptor {
    pub fn from_registration(registration: &TypeRegistration) -> Self {
        let info = registration.type_info();
        let table = info.type_path_table();
        let mut members = Vec::new();
        let mut variants = Vec::new();
        let mut observer_fields = Vec::new();
        let kind = match info {
            TypeInfo::Struct(s) => {
                for field in s.iter() {
                    if field.type_id() == TypeId::of::<ObserverEvent>() {
                        observer_fields.push(field.name().to_string());
                    }
                    members.push(MemberDescriptor {
                        name: field.name().to_string(),
                        type_path: field.type_path().to_string(),
                    });
                }
                "struct"
            }
            TypeInfo::TupleStruct(s) => {
                for field in s.iter() {
                    members.push(MemberDescriptor {
                        name: field.index().to_string(),
                        type_path: field.type_path().to_string(),
                    });
                }
                "tuple_struct"
            }
            TypeInfo::Enum(e) => {
                variants = e.variant_names().iter().map(|v| v.to_string()).collect();
                "enum"
            }
            TypeInfo::List(_) => "list",
            TypeInfo::Array(_) => "array",
            TypeInfo::Map(_) => "map",
            TypeInfo::Tuple(_) => "tuple",
            _ => "opaque",
        };
        let methods = registration
            .data::<ReflectMethods>()
            .map(|m| {
                m.signatures()
                    .iter()
                    .map(|sig| MethodDescriptor {
                        name: sig.name.to_string(),
                        mode: sig.mode.as_str(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            type_path: table.path().to_string(),
            short_name: table.short_path().to_string(),
            kind,
            is_behavior: registration.data::<ReflectComponent>().is_some(),
            members,
            variants,
            observer_fields,
            methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Door, Health, SampleBehaviorsPlugin};

    /// Lives outside every configured prefix.
    #[derive(Component, Reflect, Default)]
    #[reflect(Component, Default)]
    struct Burrow {
        depth: u32,
    }

    fn catalog_app() -> (App, TypeCatalog) {
        let mut app = App::new();
        app.add_plugins(SampleBehaviorsPlugin)
            .register_type::<Burrow>()
            .register_type::<Transform>();
        let catalog = TypeCatalog::new(
            app.world().resource::<AppTypeRegistry>().clone(),
            crate::config::default_namespace_prefixes(),
        );
        (app, catalog)
    }

    #[test]
    fn resolves_exact_and_prefixed_names() {
        let (app, catalog) = catalog_app();
        let exact = catalog
            .resolve(app.world(), "scene_bridge::components::Health", None)
            .expect("exact");
        assert_eq!(exact.tier, ResolutionTier::Exact);
        assert_eq!(exact.type_id, TypeId::of::<Health>());

        let prefixed = catalog
            .resolve(app.world(), "Transform", None)
            .expect("prefixed");
        assert_eq!(prefixed.tier, ResolutionTier::Prefixed);
        assert_eq!(prefixed.type_id, TypeId::of::<Transform>());
    }

    #[test]
    fn falls_back_to_attached_behaviors() {
        let (mut app, catalog) = catalog_app();
        let entity = app
            .world_mut()
            .spawn((Name::new("Digger"), Burrow::default()))
            .id();
        let resolved = catalog
            .resolve(app.world(), "Burrow", Some(entity))
            .expect("attached");
        assert_eq!(resolved.tier, ResolutionTier::AttachedBehavior);
        assert_eq!(resolved.type_id, TypeId::of::<Burrow>());
    }

    mod north {
        use bevy::prelude::*;

        #[derive(Component, Reflect, Default)]
        #[reflect(Component, Default)]
        pub struct Marker;
    }

    mod south {
        use bevy::prelude::*;

        #[derive(Component, Reflect, Default)]
        #[reflect(Component, Default)]
        pub struct Marker;
    }

    #[test]
    fn attached_hits_follow_the_node() {
        let (mut app, catalog) = catalog_app();
        app.register_type::<north::Marker>()
            .register_type::<south::Marker>();
        let world = app.world_mut();
        let x = world.spawn((Name::new("X"), north::Marker)).id();
        let y = world.spawn((Name::new("Y"), south::Marker)).id();

        let on_x = catalog
            .resolve(app.world(), "Marker", Some(x))
            .expect("marker on x");
        assert_eq!(on_x.type_id, TypeId::of::<north::Marker>());
        let on_y = catalog
            .resolve(app.world(), "Marker", Some(y))
            .expect("marker on y");
        assert_eq!(on_y.type_id, TypeId::of::<south::Marker>());
        assert_eq!(on_y.tier, ResolutionTier::AttachedBehavior);
        assert_eq!(catalog.cached_len(), 0);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let (app, catalog) = catalog_app();
        let err = catalog
            .resolve(app.world(), "Dragon", None)
            .expect_err("unknown");
        assert_eq!(err.kind(), crate::error::ErrorKind::TargetNotFound);
        assert_eq!(
            catalog
                .resolve(app.world(), "  ", None)
                .expect_err("empty")
                .kind(),
            crate::error::ErrorKind::MissingArgument
        );
    }

    #[test]
    fn cache_is_dropped_on_invalidate() {
        let (app, catalog) = catalog_app();
        catalog.resolve(app.world(), "Door", None).expect("door");
        assert_eq!(catalog.cached_len(), 1);
        let again = catalog.resolve(app.world(), "Door", None).expect("cached");
        assert_eq!(again.tier, ResolutionTier::Prefixed);
        catalog.invalidate();
        assert_eq!(catalog.cached_len(), 0);
    }

    #[test]
    fn describes_members_methods_and_observers() {
        let (app, catalog) = catalog_app();
        let door = catalog.resolve(app.world(), "Door", None).expect("door");
        let descriptor = catalog.describe(&door).expect("describe");
        assert_eq!(descriptor.kind, "struct");
        assert!(descriptor.is_behavior);
        assert_eq!(descriptor.observer_fields, vec!["on_opened", "on_closed"]);
        assert!(descriptor.members.iter().any(|m| m.name == "lock"));
        assert!(descriptor
            .methods
            .iter()
            .any(|m| m.name == "unlock" && m.mode == "int"));
        assert_eq!(door.type_id, TypeId::of::<Door>());

        let lock = catalog.resolve(app.world(), "DoorLock", None).expect("lock");
        let lock = catalog.describe(&lock).expect("describe lock");
        assert_eq!(lock.variants, vec!["Unlocked", "Locked", "Jammed"]);
        assert!(!lock.is_behavior);
    }

    #[test]
    fn lists_behavior_types() {
        let (_app, catalog) = catalog_app();
        let names: Vec<String> = catalog
            .behavior_types()
            .into_iter()
            .map(|t| t.short_name)
            .collect();
        assert!(names.contains(&"Health".to_string()));
        assert!(names.contains(&"Burrow".to_string()));
        assert!(!names.contains(&"DoorLock".to_string()));
    }
}
