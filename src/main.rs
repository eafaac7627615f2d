//! Headless host: a small sample scene exposed over the bridge HTTP API.

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use scene_bridge::components::{
    Button, Door, DoorLock, Faction, Health, Patrol, SampleBehaviorsPlugin, Spawner, Team,
};
use scene_bridge::config::BridgeConfig;
use scene_bridge::BridgePlugin;

fn main() {
    let config = BridgeConfig::load();
    let mut app = App::new();

    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / 60.0,
        ))),
    )
    .add_plugins(LogPlugin::default())
    .add_plugins((HierarchyPlugin, TransformPlugin))
    .add_plugins(SampleBehaviorsPlugin)
    .add_plugins(BridgePlugin::new(config))
    .add_systems(Startup, spawn_sample_scene);

    #[cfg(not(target_arch = "wasm32"))]
    app.add_plugins(scene_bridge::api::BridgeApiPlugin);

    info!("[Bridge] Starting headless host");
    app.run();
}

fn node(commands: &mut Commands, name: &str, translation: Vec3) -> Entity {
    commands
        .spawn((
            Name::new(name.to_string()),
            Transform::from_translation(translation),
        ))
        .id()
}

fn spawn_sample_scene(mut commands: Commands) {
    let level = node(&mut commands, "Level", Vec3::ZERO);

    let hero = node(&mut commands, "Hero", Vec3::new(0.0, 1.0, 0.0));
    commands.entity(hero).insert((
        Health::default(),
        Faction(Team::Player),
        Patrol {
            waypoints: vec![Vec2::ZERO, Vec2::new(4.0, 0.0)],
            speed: 2.0,
            ..default()
        },
    ));

    let panel = node(&mut commands, "Panel", Vec3::new(-3.0, 0.0, 0.0));
    commands.entity(panel).insert(Button {
        label: "Open gate".to_string(),
        interactable: true,
        ..default()
    });

    let gate = node(&mut commands, "Gate", Vec3::new(6.0, 0.0, 0.0));
    commands.entity(gate).insert(Door {
        lock: DoorLock::Unlocked,
        ..default()
    });

    commands.entity(level).add_children(&[hero, panel, gate]);

    let spawner = node(&mut commands, "Spawner", Vec3::new(10.0, 0.0, 0.0));
    commands.entity(spawner).insert(Spawner {
        interval: 5.0,
        max_alive: 4,
        ..default()
    });
}
