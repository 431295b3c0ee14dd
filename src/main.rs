//! Standalone viewer for three.quarks effects.
//!
//! Reads `quarks_viewer.ron` from the working directory. Space toggles the
//! effect, R restarts it.

use bevy::prelude::*;
use bevy_quarks::quarks_particles::presets;
use bevy_quarks::settings::VIEWER_SETTINGS_FILE;
use bevy_quarks::{
    ControlAction, ControlTarget, EffectControl, EffectInstance, QuarksEffect, QuarksEffectAsset,
    QuarksPlugin, ViewerSettings,
};

#[derive(Component)]
struct OrbitCamera {
    angle: f32,
}

#[derive(Component)]
struct ViewedEffect;

fn main() {
    let settings = ViewerSettings::load(VIEWER_SETTINGS_FILE);

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Quarks Viewer".to_string(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(QuarksPlugin {
            settings: settings.quarks.clone(),
        })
        .insert_resource(ClearColor(settings.clear_color()))
        .insert_resource(settings)
        .add_systems(Startup, setup)
        .add_systems(Update, (orbit_camera, keyboard_control))
        .run();
}

fn setup(
    mut commands: Commands,
    settings: Res<ViewerSettings>,
    asset_server: Res<AssetServer>,
    mut effects: ResMut<Assets<QuarksEffectAsset>>,
) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 2.0, settings.camera_distance).looking_at(Vec3::Y, Vec3::Y),
        OrbitCamera { angle: 0.0 },
    ));
    commands.spawn((
        DirectionalLight {
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let handle = match &settings.effect {
        Some(path) => {
            info!("Loading effect {path}");
            asset_server.load(path.clone())
        }
        None => {
            let config = presets::preset(&settings.preset).unwrap_or_else(|| {
                warn!("Unknown preset '{}', using defaults", settings.preset);
                default()
            });
            effects.add(QuarksEffectAsset::from_config(&settings.preset, config))
        }
    };
    commands.spawn((
        Name::new("Effect"),
        ViewedEffect,
        QuarksEffect::new(handle),
        Transform::from_xyz(0.0, 1.0, 0.0),
    ));
}

fn orbit_camera(
    time: Res<Time>,
    settings: Res<ViewerSettings>,
    mut query: Query<(&mut Transform, &mut OrbitCamera)>,
) {
    if settings.orbit_speed == 0.0 {
        return;
    }
    for (mut transform, mut orbit) in &mut query {
        orbit.angle += settings.orbit_speed * time.delta_secs();
        let (sin, cos) = orbit.angle.sin_cos();
        let distance = settings.camera_distance;
        *transform = Transform::from_xyz(sin * distance, 2.0, cos * distance)
            .looking_at(Vec3::Y, Vec3::Y);
    }
}

fn keyboard_control(
    keys: Res<ButtonInput<KeyCode>>,
    effects: Query<(Entity, &EffectInstance), With<ViewedEffect>>,
    mut controls: MessageWriter<EffectControl>,
) {
    for (entity, instance) in &effects {
        let action = if keys.just_pressed(KeyCode::Space) {
            if instance.effect.is_started() {
                ControlAction::Stop
            } else {
                ControlAction::Start
            }
        } else if keys.just_pressed(KeyCode::KeyR) {
            ControlAction::Reset
        } else {
            continue;
        };
        controls.write(EffectControl::new(entity, action, ControlTarget::Effect));
        if action == ControlAction::Reset {
            controls.write(EffectControl::new(entity, ControlAction::Start, ControlTarget::Effect));
        }
    }
}
