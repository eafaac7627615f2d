use super::*;
use crate::components::{Button, Door, Health, Patrol, Spawner};
use crate::gate::AtomicBuildStatus;
use crate::test_support::{bridge_app, bridge_app_with_status, call, spawn_named};

fn scene(app: &mut App) {
    let world = app.world_mut();
    let level = spawn_named(world, "Level", None);
    let hero = spawn_named(world, "Hero", Some(level));
    world.entity_mut(hero).insert((Health::default(), Patrol::default()));
    let panel = spawn_named(world, "Panel", Some(level));
    world.entity_mut(panel).insert(Button::default());
    let gate = spawn_named(world, "Gate", Some(level));
    world.entity_mut(gate).insert(Door::default());
    spawn_named(world, "Enemy1", Some(level));
    spawn_named(world, "Enemy2", Some(level));
    let spawner = spawn_named(world, "Spawner", None);
    world.entity_mut(spawner).insert(Spawner::default());
}

fn setup() -> App {
    let mut app = bridge_app();
    scene(&mut app);
    app
}

fn ok(result: CommandResult) -> JsonMap {
    match result {
        CommandResult::Success(data) => data,
        CommandResult::Failure { kind, message } => panic!("expected success, got {kind}: {message}"),
    }
}

fn kind(result: CommandResult) -> ErrorKind {
    result.error_kind().expect("expected a failure")
}

fn node(app: &App, path: &str) -> Entity {
    hierarchy::resolve_node(app.world(), path).expect("node")
}

#[test]
fn unknown_tool_is_unsupported_operation() {
    let mut app = setup();
    let result = call(&mut app, "teleport_everything", json!({}));
    let envelope = result.to_envelope();
    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["errorKind"], json!("UnsupportedOperation"));

    let d = app.world().resource::<Dispatcher>().clone();
    let command = Command::new("physics", "explode", json!({})).expect("command");
    assert_eq!(
        kind(d.execute(app.world_mut(), command)),
        ErrorKind::UnsupportedOperation
    );
}

#[test]
fn validation_rejects_missing_or_misshapen_arguments() {
    let mut app = setup();
    assert_eq!(kind(call(&mut app, "find_node", json!({}))), ErrorKind::MissingArgument);
    assert_eq!(
        kind(call(&mut app, "find_node", json!({ "path": "  " }))),
        ErrorKind::MissingArgument
    );
    assert_eq!(
        kind(call(&mut app, "set_node_active", json!({ "path": "Level", "active": "yes" }))),
        ErrorKind::MissingArgument
    );
    assert_eq!(
        kind(call(&mut app, "find_node", json!(["Level"]))),
        ErrorKind::MissingArgument
    );
}

#[test]
fn commands_route_by_category_and_operation() {
    let mut app = setup();
    let d = app.world().resource::<Dispatcher>().clone();
    let command = Command::new("Node", "find", json!({ "path": "Level/Hero" })).expect("command");
    let data = ok(d.execute(app.world_mut(), command));
    assert_eq!(data["node"]["path"], json!("Level/Hero"));
    let behaviors = data["node"]["behaviors"].as_array().expect("behaviors");
    assert!(behaviors.contains(&json!("Health")));
    assert!(behaviors.contains(&json!("Patrol")));
    assert!(!behaviors.contains(&json!("Name")));
    assert!(!behaviors.contains(&json!("GlobalTransform")));
}

#[test]
fn find_nodes_lists_matches_in_child_order() {
    let mut app = setup();
    let data = ok(call(&mut app, "find_nodes", json!({ "pattern": "Level/Enemy*" })));
    let paths: Vec<&Value> = data["matches"]
        .as_array()
        .expect("matches")
        .iter()
        .map(|m| &m["path"])
        .collect();
    assert_eq!(paths, vec![&json!("Level/Enemy1"), &json!("Level/Enemy2")]);
    assert_eq!(data["truncated"], json!(false));

    let data = ok(call(&mut app, "find_nodes", json!({ "pattern": "Enemy*", "maxResults": 1 })));
    assert_eq!(data["count"], json!(1));
    assert_eq!(data["truncated"], json!(true));
}

#[test]
fn hierarchy_respects_depth() {
    let mut app = setup();
    let data = ok(call(&mut app, "get_hierarchy", json!({ "maxDepth": 0 })));
    let roots = data["roots"].as_array().expect("roots");
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["name"], json!("Level"));
    assert_eq!(roots[0]["childrenTruncated"], json!(true));

    let data = ok(call(&mut app, "get_hierarchy", json!({ "path": "Level" })));
    assert_eq!(data["node"]["children"].as_array().map(Vec::len), Some(5));
}

#[test]
fn create_node_builds_behaviors_under_parent() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "create_node",
        json!({
            "name": "Guard",
            "parent": "Level",
            "translation": { "x": 4.0 },
            "behaviors": ["Door", { "type": "Health", "properties": { "max": 250.0 } }],
        }),
    ));
    assert_eq!(data["node"]["path"], json!("Level/Guard"));
    assert!(data.get("compilationWaitInfo").is_some());

    let guard = node(&app, "Level/Guard");
    let world = app.world();
    assert_eq!(world.get::<Health>(guard).map(|h| h.max), Some(250.0));
    assert!(world.get::<Door>(guard).is_some());
    assert_eq!(world.get::<Transform>(guard).map(|t| t.translation.x), Some(4.0));

    assert_eq!(
        kind(call(&mut app, "create_node", json!({ "name": "a/b" }))),
        ErrorKind::HostRejected
    );
    assert_eq!(
        kind(call(&mut app, "create_node", json!({ "name": "Ghost", "behaviors": ["Nope"] }))),
        ErrorKind::TargetNotFound
    );
    assert!(hierarchy::resolve_node(app.world(), "Ghost").is_err());
}

#[test]
fn rename_reparent_and_delete() {
    let mut app = setup();
    let data = ok(call(&mut app, "rename_node", json!({ "path": "Level/Hero", "newName": "Champion" })));
    assert_eq!(data["before"], json!("Level/Hero"));
    assert_eq!(data["after"], json!("Level/Champion"));

    assert_eq!(
        kind(call(&mut app, "reparent_node", json!({ "path": "Level", "newParent": "Level/Champion" }))),
        ErrorKind::HostRejected
    );
    let data = ok(call(&mut app, "reparent_node", json!({ "path": "Level/Champion", "newParent": "Spawner" })));
    assert_eq!(data["after"], json!("Spawner/Champion"));
    let data = ok(call(&mut app, "reparent_node", json!({ "path": "Spawner/Champion" })));
    assert_eq!(data["after"], json!("Champion"));

    let data = ok(call(&mut app, "delete_node", json!({ "path": "Level" })));
    assert_eq!(data["removedCount"], json!(5));
    assert!(hierarchy::resolve_node(app.world(), "Level/Gate").is_err());
}

#[test]
fn set_node_active_reports_hierarchy_state() {
    let mut app = setup();
    let data = ok(call(&mut app, "set_node_active", json!({ "path": "Level", "active": false })));
    assert_eq!((data["before"].clone(), data["after"].clone()), (json!(true), json!(false)));
    let data = ok(call(&mut app, "find_node", json!({ "path": "Level/Hero" })));
    assert_eq!(data["node"]["active"], json!(true));
    assert_eq!(data["node"]["activeInHierarchy"], json!(false));
}

#[test]
fn partial_vector_updates_keep_other_components() {
    let mut app = setup();
    let payload = |value: Value| {
        json!({ "path": "Level/Hero", "behaviorType": "Patrol", "property": "offset", "value": value })
    };
    ok(call(&mut app, "set_behavior_property", payload(json!({ "x": 1.0, "y": 2.0, "z": 3.0 }))));
    let data = ok(call(&mut app, "set_behavior_property", payload(json!({ "y": 9.0 }))));
    assert_eq!(data["before"], json!({ "x": 1.0, "y": 2.0, "z": 3.0 }));
    assert_eq!(data["after"], json!({ "x": 1.0, "y": 9.0, "z": 3.0 }));
    let hero = node(&app, "Level/Hero");
    assert_eq!(
        app.world().get::<Patrol>(hero).map(|p| p.offset),
        Some(Vec3::new(1.0, 9.0, 3.0))
    );
}

#[test]
fn lossy_integer_writes_are_reported() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "set_behavior_property",
        json!({ "path": "Spawner", "behaviorType": "Spawner", "property": "max_alive", "value": 300 }),
    ));
    let notes = data["coercionNotes"].as_array().expect("notes");
    assert!(notes.iter().any(|n| n.as_str().is_some_and(|s| s.contains("clamped"))));
    let spawner = node(&app, "Spawner");
    assert_eq!(app.world().get::<Spawner>(spawner).map(|s| s.max_alive), Some(255));
}

#[test]
fn set_properties_is_all_or_nothing() {
    let mut app = setup();
    let result = call(
        &mut app,
        "set_behavior_properties",
        json!({
            "path": "Level/Hero",
            "behaviorType": "Health",
            "properties": { "current": 10.0, "stamina": 3 },
        }),
    );
    assert_eq!(kind(result), ErrorKind::TargetNotFound);
    let hero = node(&app, "Level/Hero");
    assert_eq!(app.world().get::<Health>(hero).map(|h| h.current), Some(100.0));

    let data = ok(call(
        &mut app,
        "set_behavior_properties",
        json!({
            "path": "Level/Hero",
            "behaviorType": "Health",
            "properties": { "current": 10.0, "invulnerable": true },
        }),
    ));
    assert_eq!(data["applied"], json!(["current", "invulnerable"]));
    assert_eq!(data["after"]["current"], json!(10.0));
    let health = app.world().get::<Health>(hero).cloned().expect("health");
    assert!(health.invulnerable);
    assert_eq!(health.current, 10.0);
}

#[test]
fn attach_detach_and_get() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "attach_behavior",
        json!({ "path": "Level/Enemy1", "behaviorType": "Health", "properties": { "max": 30.0 } }),
    ));
    assert_eq!(data["value"]["max"], json!(30.0));
    assert_eq!(
        kind(call(&mut app, "attach_behavior", json!({ "path": "Level/Enemy1", "behaviorType": "Health" }))),
        ErrorKind::HostRejected
    );
    assert_eq!(
        kind(call(&mut app, "attach_behavior", json!({ "path": "Level/Enemy1", "behaviorType": "Active" }))),
        ErrorKind::UnsupportedOperation
    );

    let data = ok(call(
        &mut app,
        "get_behavior",
        json!({ "path": "Level/Enemy1", "behaviorType": "Health", "property": "max" }),
    ));
    assert_eq!(data["value"], json!(30.0));

    let data = ok(call(&mut app, "detach_behavior", json!({ "path": "Level/Enemy1", "behaviorType": "Health" })));
    assert_eq!(data["before"]["max"], json!(30.0));
    assert_eq!(
        kind(call(&mut app, "get_behavior", json!({ "path": "Level/Enemy1", "behaviorType": "Health" }))),
        ErrorKind::TargetNotFound
    );
}

#[test]
fn transform_is_listed_but_cannot_be_detached() {
    let mut app = setup();
    let data = ok(call(&mut app, "list_behaviors", json!({ "path": "Level/Enemy1" })));
    let behaviors = data["behaviors"].as_array().expect("behaviors");
    assert!(behaviors.iter().any(|b| b["type"] == json!("Transform")));
    assert!(!behaviors.iter().any(|b| b["type"] == json!("GlobalTransform")));

    assert_eq!(
        kind(call(&mut app, "detach_behavior", json!({ "path": "Level/Enemy1", "behaviorType": "Transform" }))),
        ErrorKind::UnsupportedOperation
    );
    assert!(app.world().get::<Transform>(node(&app, "Level/Enemy1")).is_some());
}

#[test]
fn transforms_set_and_adjust() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "set_transform",
        json!({ "path": "Level/Hero", "translation": [1.0, 2.0, 3.0], "rotationEuler": { "z": 90.0 }, "scale": 2.0 }),
    ));
    assert_eq!(data["after"]["translation"], json!({ "x": 1.0, "y": 2.0, "z": 3.0 }));
    ok(call(&mut app, "adjust_transform", json!({ "path": "Level/Hero", "translate": { "x": 1.0 }, "scaleBy": [1.0, 0.5, 1.0] })));

    let hero = node(&app, "Level/Hero");
    let transform = *app.world().get::<Transform>(hero).expect("transform");
    assert_eq!(transform.translation, Vec3::new(2.0, 2.0, 3.0));
    assert_eq!(transform.scale, Vec3::new(2.0, 1.0, 2.0));
    let (_, _, z) = transform.rotation.to_euler(EulerRot::XYZ);
    assert!((z.to_degrees() - 90.0).abs() < 1e-3);

    assert_eq!(
        kind(call(&mut app, "set_transform", json!({ "path": "Level/Hero" }))),
        ErrorKind::MissingArgument
    );
    let data = ok(call(&mut app, "get_transform", json!({ "path": "Level/Hero" })));
    assert_eq!(data["local"]["translation"]["x"], json!(2.0));
}

#[test]
fn type_tools_resolve_describe_and_list() {
    let mut app = setup();
    let data = ok(call(&mut app, "resolve_type", json!({ "typeName": "Door" })));
    assert_eq!(data["type"]["typePath"], json!("scene_bridge::components::Door"));
    assert_eq!(data["type"]["tier"], json!("prefixed"));

    let data = ok(call(&mut app, "describe_type", json!({ "typeName": "Door" })));
    assert_eq!(data["descriptor"]["observerFields"], json!(["on_opened", "on_closed"]));
    assert_eq!(data["descriptor"]["isBehavior"], json!(true));

    let data = ok(call(&mut app, "list_behavior_types", json!({ "filter": "Do*" })));
    assert_eq!(data["types"][0]["shortName"], json!("Door"));
    assert_eq!(
        kind(call(&mut app, "resolve_type", json!({ "typeName": "Dragon" }))),
        ErrorKind::TargetNotFound
    );
}

#[test]
fn wired_listeners_survive_a_save_and_reload() {
    use bevy::reflect::serde::{ReflectDeserializer, ReflectSerializer};
    use serde::de::DeserializeSeed;

    let mut app = setup();
    ok(call(
        &mut app,
        "wire_event",
        json!({
            "path": "Level/Panel",
            "behaviorType": "Button",
            "eventName": "click",
            "targetPath": "Level/Gate",
            "methodName": "unlock",
            "argument": 7,
        }),
    ));
    let panel = node(&app, "Level/Panel");
    let wired = app.world().get::<Button>(panel).cloned().expect("button");

    let saved = {
        let registry = app.world().resource::<AppTypeRegistry>().read();
        serde_json::to_string(&ReflectSerializer::new(&wired, &registry)).expect("serialize")
    };
    let restored = {
        let registry = app.world().resource::<AppTypeRegistry>().read();
        let mut de = serde_json::Deserializer::from_str(&saved);
        let value = ReflectDeserializer::new(&registry)
            .deserialize(&mut de)
            .expect("deserialize");
        Button::from_reflect(&*value).expect("button from reflect")
    };
    assert_eq!(restored.on_click, wired.on_click);
    assert_eq!(restored.on_click.listeners.len(), 1);
    assert_eq!(restored.on_click.listeners[0].method, "unlock");
    assert_eq!(restored.on_click.listeners[0].argument.int_value, 7);

    app.world_mut().entity_mut(panel).remove::<Button>();
    app.world_mut().entity_mut(panel).insert(restored);
    let data = ok(call(
        &mut app,
        "list_event_listeners",
        json!({ "path": "Level/Panel", "behaviorType": "Button", "eventName": "on_click" }),
    ));
    assert_eq!(data["count"], json!(1));
    assert_eq!(data["listeners"][0]["targetPath"], json!("Level/Gate"));
}

#[test]
fn wired_events_invoke_their_targets() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "wire_event",
        json!({
            "path": "Level/Panel",
            "behaviorType": "Button",
            "eventName": "click",
            "targetPath": "Level/Gate",
            "methodName": "open",
        }),
    ));
    assert_eq!(data["eventField"], json!("on_click"));
    assert_eq!(data["methodResolution"], json!("exact"));
    let gate = node(&app, "Level/Gate");
    assert_eq!(app.world().get::<Door>(gate).map(|d| d.open), Some(false));

    let source = json!({ "path": "Level/Panel", "behaviorType": "Button", "eventName": "on_click" });
    let data = ok(call(&mut app, "list_event_listeners", source.clone()));
    assert_eq!(data["count"], json!(1));
    assert_eq!(data["listeners"][0]["targetPath"], json!("Level/Gate"));

    let data = ok(call(&mut app, "invoke_event", source.clone()));
    assert_eq!(data["invokedCount"], json!(1));
    assert_eq!(app.world().get::<Door>(gate).map(|d| d.open), Some(true));

    let mut unwire = source.clone();
    unwire["index"] = json!(0);
    let data = ok(call(&mut app, "unwire_event", unwire));
    assert_eq!(data["removedCount"], json!(1));
    assert_eq!(data["remainingCount"], json!(0));

    let data = ok(call(&mut app, "list_event_fields", json!({ "path": "Level/Panel", "behaviorType": "Button" })));
    assert_eq!(data["events"].as_array().map(Vec::len), Some(2));
}

#[test]
fn mutating_commands_wait_for_the_gate() {
    let status = AtomicBuildStatus::default();
    let mut app = bridge_app_with_status(status.clone());
    scene(&mut app);

    let data = ok(call(&mut app, "find_node", json!({ "path": "Level" })));
    assert!(data.get("compilationWaitInfo").is_none());

    status.set_rebuilding(true);
    let data = ok(call(&mut app, "rename_node", json!({ "path": "Level/Hero", "newName": "Hero2", "maxWaitSeconds": 0.05 })));
    assert_eq!(data["compilationWaitTimedOut"], json!(true));
    assert_eq!(data["compilationWaitInfo"]["compilationCompleted"], json!(false));
    assert_eq!(data["after"], json!("Level/Hero2"));

    let result = call(
        &mut app,
        "rename_node",
        json!({ "path": "Level/Hero2", "newName": "Hero3", "maxWaitSeconds": 0.0, "failOnCompilationTimeout": true }),
    );
    assert_eq!(kind(result), ErrorKind::CompilationTimeout);
    assert!(hierarchy::resolve_node(app.world(), "Level/Hero2").is_ok());

    let data = ok(call(&mut app, "get_compilation_status", json!({})));
    assert_eq!(data["isRebuilding"], json!(true));
    let data = ok(call(&mut app, "wait_for_compilation", json!({ "maxWaitSeconds": 0.0 })));
    assert_eq!(data["compilationWaitTimedOut"], json!(true));

    status.set_rebuilding(false);
    let data = ok(call(&mut app, "rename_node", json!({ "path": "Level/Hero2", "newName": "Hero" })));
    assert_eq!(data["compilationWaitInfo"]["waitedForCompilation"], json!(false));
    assert!(data.get("compilationWaitTimedOut").is_none());
}

#[test]
fn huge_wait_requests_are_bounded() {
    let status = AtomicBuildStatus::default();
    let mut app = bridge_app_with_status(status.clone());
    scene(&mut app);

    status.set_rebuilding(true);
    let releaser = {
        let status = status.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            status.set_rebuilding(false);
        })
    };
    let data = ok(call(&mut app, "rename_node", json!({ "path": "Level/Hero", "newName": "Hero2", "maxWaitSeconds": 1e20 })));
    releaser.join().expect("releaser");
    assert_eq!(data["compilationWaitInfo"]["compilationCompleted"], json!(true));
    assert_eq!(data["after"], json!("Level/Hero2"));
}

#[test]
fn finished_rebuild_drops_cached_types() {
    let status = AtomicBuildStatus::default();
    let mut app = bridge_app_with_status(status.clone());
    scene(&mut app);

    ok(call(&mut app, "resolve_type", json!({ "typeName": "Health" })));
    let data = ok(call(&mut app, "get_compilation_status", json!({})));
    assert_eq!(data["cachedTypeResolutions"], json!(1));

    status.set_rebuilding(true);
    ok(call(&mut app, "get_compilation_status", json!({})));
    status.set_rebuilding(false);
    let data = ok(call(&mut app, "get_compilation_status", json!({})));
    assert_eq!(data["cachedTypeResolutions"], json!(0));
}

#[test]
fn batch_tool_reports_aggregate_counts() {
    let mut app = setup();
    let data = ok(call(
        &mut app,
        "batch_execute",
        json!({
            "items": [
                { "toolName": "find_node", "payload": { "path": "Level" } },
                { "toolName": "find_node", "payload": { "path": "Nowhere" } },
            ],
        }),
    ));
    assert_eq!(data["totalCount"], json!(2));
    assert_eq!(data["successCount"], json!(1));
    assert_eq!(data["errorCount"], json!(1));
    assert_eq!(
        CommandResult::Success(data).to_envelope()["success"],
        json!(true)
    );
}

#[test]
fn tool_table_is_consistent() {
    for tool in tools() {
        assert_eq!(tool_by_name(tool.tool_name).map(|t| t.operation), Some(tool.operation));
        assert_eq!(
            tool_for(tool.category.slug(), tool.operation).map(|t| t.tool_name),
            Some(tool.tool_name)
        );
    }
    assert_eq!(tools().len(), 28);
}
