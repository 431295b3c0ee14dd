//! Built-in particle system presets.

use std::f32::consts::PI;

use bevy::prelude::*;

use crate::data::*;
use crate::gradient::{GradientKey, NumberGradient};
use crate::value::Value;

/// Return the built-in presets as `(name, config)` pairs.
pub fn default_presets() -> Vec<(&'static str, ParticleSystemConfig)> {
    vec![("Sparks", sparks()), ("Smoke", smoke()), ("Debris", debris())]
}

/// Look up a built-in preset by name (case-insensitive).
pub fn preset(name: &str) -> Option<ParticleSystemConfig> {
    default_presets()
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, config)| config)
}

/// Fast additive sparks thrown out of a sphere and pulled down by gravity.
fn sparks() -> ParticleSystemConfig {
    ParticleSystemConfig {
        kind: SystemKind::Billboard,
        duration: 1.0,
        start_life: Value::interval(0.3, 0.8),
        start_speed: Value::interval(3.0, 8.0),
        start_size: Value::interval(0.03, 0.06),
        start_color: ColorValue::Constant(LinearRgba::new(1.0, 0.9, 0.6, 1.0)),
        emission_over_time: Value::Constant(20.0),
        emission_bursts: vec![EmissionBurst::at(0.0, 30.0)],
        shape: ShapeConfig {
            kind: ShapeKind::Sphere,
            radius: 0.05,
            ..default()
        },
        behaviors: vec![
            Behavior::GravityForce {
                gravity: Some(Value::Constant(9.8)),
            },
            Behavior::ColorOverLife {
                color: Some(ColorValue::Gradient(ColorGradientDef {
                    color_keys: vec![
                        GradientKey::new(0.0, LinearRgba::new(1.0, 1.0, 0.8, 1.0)),
                        GradientKey::new(0.5, LinearRgba::new(1.0, 0.7, 0.2, 1.0)),
                        GradientKey::new(1.0, LinearRgba::new(0.8, 0.2, 0.0, 1.0)),
                    ],
                    alpha_keys: vec![GradientKey::new(0.0, 1.0), GradientKey::new(1.0, 0.0)],
                })),
            },
            Behavior::SizeOverLife {
                size: Some(FloatTrack::Keys(NumberGradient::from_keys(vec![
                    GradientKey::new(0.0, 1.0),
                    GradientKey::new(1.0, 0.25),
                ]))),
            },
        ],
        billboard_mode: BillboardMode::Stretched,
        blend_mode: Some(BlendMode::Additive),
        ..default()
    }
}

/// Slow rising smoke puffs that grow and fade.
fn smoke() -> ParticleSystemConfig {
    ParticleSystemConfig {
        kind: SystemKind::Billboard,
        duration: 4.0,
        start_life: Value::interval(2.0, 4.0),
        start_speed: Value::interval(0.3, 0.8),
        start_size: Value::interval(0.3, 0.5),
        start_rotation: Some(RotationValue::Angle(Value::interval(0.0, 2.0 * PI))),
        start_color: ColorValue::Constant(LinearRgba::new(0.5, 0.5, 0.5, 0.6)),
        emission_over_time: Value::Constant(12.0),
        shape: ShapeConfig {
            kind: ShapeKind::Cone,
            radius: 0.3,
            angle: PI / 12.0,
            ..default()
        },
        behaviors: vec![
            Behavior::ApplyForce {
                force: ForceVector::new(Vec3::new(0.0, 0.6, 0.0)),
            },
            Behavior::ColorOverLife {
                color: Some(ColorValue::Gradient(ColorGradientDef {
                    color_keys: vec![
                        GradientKey::new(0.0, LinearRgba::new(0.5, 0.5, 0.5, 1.0)),
                        GradientKey::new(1.0, LinearRgba::new(0.25, 0.25, 0.25, 1.0)),
                    ],
                    alpha_keys: vec![
                        GradientKey::new(0.0, 0.0),
                        GradientKey::new(0.1, 0.4),
                        GradientKey::new(0.6, 0.25),
                        GradientKey::new(1.0, 0.0),
                    ],
                })),
            },
            Behavior::SizeOverLife {
                size: Some(FloatTrack::Keys(NumberGradient::from_keys(vec![
                    GradientKey::new(0.0, 1.0),
                    GradientKey::new(1.0, 3.0),
                ]))),
            },
            Behavior::RotationOverLife {
                angular_velocity: Some(Value::interval(-0.5, 0.5)),
            },
        ],
        blend_mode: Some(BlendMode::Alpha),
        ..default()
    }
}

/// One-shot burst of tumbling mesh chunks.
fn debris() -> ParticleSystemConfig {
    let mut config = ParticleSystemConfig {
        kind: SystemKind::Solid,
        duration: 2.0,
        start_life: Value::interval(1.0, 2.5),
        start_speed: Value::interval(3.0, 8.0),
        start_size: Value::interval(0.08, 0.2),
        start_rotation: Some(RotationValue::RandomQuat),
        start_color: ColorValue::Range {
            a: LinearRgba::new(0.35, 0.3, 0.25, 1.0),
            b: LinearRgba::new(0.55, 0.5, 0.45, 1.0),
        },
        emission_over_time: Value::Constant(0.0),
        emission_bursts: vec![EmissionBurst::at(0.0, 15.0)],
        shape: ShapeConfig {
            kind: ShapeKind::Hemisphere,
            radius: 0.2,
            direction_randomizer: 0.3,
            ..default()
        },
        behaviors: vec![
            Behavior::GravityForce {
                gravity: Some(Value::Constant(9.8)),
            },
            Behavior::RotationBySpeed {
                angular_velocity: Some(FloatTrack::Keys(NumberGradient::from_keys(vec![
                    GradientKey::new(0.0, 0.0),
                    GradientKey::new(1.0, 12.0),
                ]))),
                speed_range: SpeedRange::new(0.0, 8.0),
            },
            Behavior::LimitSpeedOverLife {
                speed: Some(FloatTrack::Value(Value::Constant(10.0))),
                dampen: Some(0.9),
            },
        ],
        blend_mode: Some(BlendMode::Opaque),
        ..default()
    };
    config.set_looping(false);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{billboard_capacity, solid_capacity};

    #[test]
    fn presets_round_trip_through_ron() {
        for (name, config) in default_presets() {
            let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default())
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            let back: ParticleSystemConfig =
                ron::from_str(&text).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(back, config, "{name} changed through RON");
        }
    }

    #[test]
    fn preset_lookup_ignores_case() {
        assert!(preset("smoke").is_some());
        assert!(preset("DEBRIS").is_some());
        assert!(preset("Waterfall").is_none());
    }

    #[test]
    fn presets_have_room_for_particles() {
        for (name, config) in default_presets() {
            let capacity = match config.kind {
                SystemKind::Billboard => billboard_capacity(config.emission_rate(), config.duration),
                SystemKind::Solid => {
                    solid_capacity(config.emission_rate(), config.max_life(), config.looping)
                        + config.total_burst_count() as usize
                }
            };
            assert!(capacity > 0, "{name} has no capacity");
        }
    }
}
