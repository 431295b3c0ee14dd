use bevy::asset::{AssetPlugin, LoadState};
use bevy::prelude::*;
use std::path::Path;

use bevy_quarks::quarks_particles::{BlendMode, EffectSystem, SystemKind};
use bevy_quarks::{QuarksEffectAsset, QuarksEffectLoader, load_effect_file};

fn fixtures_path() -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .to_string_lossy()
        .to_string()
}

fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(bevy::app::ScheduleRunnerPlugin::run_loop(
            std::time::Duration::from_millis(10),
        )),
    );
    app.add_plugins(AssetPlugin {
        file_path: fixtures_path(),
        ..default()
    });
    app.init_asset::<QuarksEffectAsset>()
        .init_asset_loader::<QuarksEffectLoader>();
    app
}

fn run_until_settled(app: &mut App, handle: &Handle<QuarksEffectAsset>, max_updates: u32) -> Option<bool> {
    for _ in 0..max_updates {
        app.update();
        let asset_server = app.world().resource::<AssetServer>();
        match asset_server.load_state(handle) {
            LoadState::Loaded => return Some(true),
            LoadState::Failed(_) => return Some(false),
            _ => continue,
        }
    }
    None
}

#[test]
fn loads_effect_through_the_asset_server() {
    let mut app = create_test_app();
    let handle: Handle<QuarksEffectAsset> = {
        let asset_server = app.world().resource::<AssetServer>();
        asset_server.load("fire/fire.quarks.json")
    };
    assert_eq!(run_until_settled(&mut app, &handle, 100), Some(true));

    let assets = app.world().resource::<Assets<QuarksEffectAsset>>();
    let asset = assets.get(&handle).expect("asset should be available");
    assert_eq!(asset.root_url, "fire");
    assert_eq!(asset.data.emitter_count, 2);
    assert_eq!(asset.data.materials.len(), 2);

    let effect = asset.instantiate(None);
    let flames = effect.find_system_by_name("flames").unwrap();
    assert_eq!(flames.kind(), SystemKind::Billboard);
    let (_, flame_node) = effect
        .systems()
        .find(|(_, e)| e.system.system().name() == "flames")
        .unwrap();
    assert_eq!(flame_node.material.blend_mode, BlendMode::Additive);
    assert_eq!(
        flame_node.material.texture.as_ref().map(|t| t.path.as_str()),
        Some("fire/textures/flame.png")
    );
    assert_eq!(effect.find_system_by_name("shards").unwrap().kind(), SystemKind::Solid);
}

#[test]
fn invalid_json_fails_to_load() {
    let mut app = create_test_app();
    let handle: Handle<QuarksEffectAsset> = {
        let asset_server = app.world().resource::<AssetServer>();
        asset_server.load("broken.quarks.json")
    };
    assert_eq!(run_until_settled(&mut app, &handle, 100), Some(false));
}

#[test]
fn fixture_runs_outside_the_app() {
    fastrand::seed(7);
    let mut effect = load_effect_file(Path::new(&fixtures_path()).join("fire/fire.quarks.json")).unwrap();
    effect.start();
    for _ in 0..30 {
        effect.tick(1.0 / 60.0, bevy::math::Affine3A::IDENTITY);
    }
    let flames = effect.find_system_by_name("flames").unwrap().system();
    assert!(flames.live_count() > 0);
    assert!(flames.particles().iter().filter(|p| p.alive).all(|p| p.cell < 16));

    let shards = effect.find_system_by_name("shards").unwrap();
    assert_eq!(shards.system().live_count(), 8);
    let solid = shards.as_solid().unwrap();
    assert_eq!(solid.spawned_total(), 8);
    assert!(solid.particle_mesh().is_some());
}
