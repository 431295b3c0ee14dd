//! Behavior application layer.
//!
//! Each backend has two dispatch tables keyed by behavior type. The
//! *system-level* table runs once whenever the behavior list changes and fills
//! interpolation tracks ([`LifeTracks`]); the *per-particle* table compiles
//! behaviors into closures that run on every live particle every tick, in list
//! order.

use bevy::prelude::*;

use crate::billboard::NativeParticleSystem;
use crate::data::{Behavior, ColorGradientDef, ColorValue, FloatTrack, ForceVector, SpeedRange};
use crate::gradient::{ColorGradient, GradientKey, NumberGradient};
use crate::particle::Particle;
use crate::value::{Value, ValueRange};

/// Per-particle behavior: `(particle, delta_seconds)`.
pub type ParticleBehaviorFn = Box<dyn Fn(&mut Particle, f32) + Send + Sync>;

/// Life-ratio tracks owned by a system and evaluated every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct LifeTracks {
    pub color: ColorGradient,
    pub size: NumberGradient,
    /// Multiplier on integration speed.
    pub velocity: NumberGradient,
    /// Radians per second added to `rotation.z`.
    pub angular_speed: NumberGradient,
    /// Spawn range for angular speed when no angular track is set.
    pub angular_speed_range: ValueRange,
    pub limit_velocity: NumberGradient,
    pub limit_velocity_damping: f32,
}

impl LifeTracks {
    pub fn new(limit_velocity_damping: f32) -> Self {
        Self {
            color: ColorGradient::default(),
            size: NumberGradient::default(),
            velocity: NumberGradient::default(),
            angular_speed: NumberGradient::default(),
            angular_speed_range: ValueRange::default(),
            limit_velocity: NumberGradient::default(),
            limit_velocity_damping,
        }
    }

    /// Clamp velocity to the ceiling at `ratio`, scaled by damping.
    pub fn limit_speed(&self, particle: &mut Particle, ratio: f32) {
        let Some(limit) = self.limit_velocity.sample(ratio) else {
            return;
        };
        let speed = particle.speed();
        if speed > limit && speed > 0.0 {
            particle.velocity *= (limit / speed) * self.limit_velocity_damping;
        }
    }
}

// ---------------------------------------------------------------------------
// System-level tables
// ---------------------------------------------------------------------------

/// Configure the native primitive's tracks, gravity and sprite range.
pub fn apply_system_level_billboard(native: &mut NativeParticleSystem, behaviors: &[Behavior]) {
    for behavior in behaviors {
        match behavior {
            Behavior::ForceOverLife { force } | Behavior::ApplyForce { force } => {
                native.gravity += force.resolve();
            }
            Behavior::GravityForce { gravity: Some(g) } => {
                native.gravity.y -= g.evaluate_constant();
            }
            Behavior::FrameOverLife { frame: Some(frame) } => {
                let range = frame.range();
                native.start_cell = range.min.max(0.0).floor() as u32;
                native.end_cell = range.max.max(0.0).floor() as u32;
                native.animate_cells = true;
            }
            other => apply_life_track(&mut native.tracks, other),
        }
    }
}

/// Configure the engine-internal tracks of the solid backend.
pub fn apply_system_level_solid(tracks: &mut LifeTracks, behaviors: &[Behavior]) {
    for behavior in behaviors {
        apply_life_track(tracks, behavior);
    }
}

fn apply_life_track(tracks: &mut LifeTracks, behavior: &Behavior) {
    match behavior {
        Behavior::ColorOverLife { color: Some(color) } => {
            tracks.color = color_track(color);
        }
        Behavior::SizeOverLife { size: Some(size) } => {
            tracks.size = size.to_gradient();
        }
        Behavior::RotationOverLife {
            angular_velocity: Some(v),
        }
        | Behavior::Rotation3DOverLife {
            angular_velocity: Some(v),
        } => {
            let reduced = v.parse_value_to_min_max();
            match reduced.gradient {
                Some(gradient) => tracks.angular_speed = gradient,
                None => tracks.angular_speed_range = reduced.range,
            }
        }
        Behavior::SpeedOverLife { speed: Some(speed) } => {
            tracks.velocity = speed.to_gradient();
        }
        Behavior::LimitSpeedOverLife { speed, dampen } => {
            if let Some(speed) = speed {
                tracks.limit_velocity = speed.to_gradient();
            }
            if let Some(dampen) = dampen {
                tracks.limit_velocity_damping = *dampen;
            }
        }
        _ => {}
    }
}

fn color_track(color: &ColorValue) -> ColorGradient {
    if let Some(gradient) = color.gradient() {
        return gradient;
    }
    let (a, b) = color.endpoints();
    if a == b {
        ColorGradient::constant(a)
    } else {
        ColorGradient::from_keys(vec![GradientKey::new(0.0, a), GradientKey::new(1.0, b)])
    }
}

// ---------------------------------------------------------------------------
// Per-particle tables
// ---------------------------------------------------------------------------

/// Closures layered on top of the native billboard update.
pub fn build_per_particle_billboard(behaviors: &[Behavior]) -> Vec<ParticleBehaviorFn> {
    behaviors
        .iter()
        .filter_map(|behavior| match behavior {
            Behavior::ColorBySpeed { color, speed_range } => color_by_speed(color.as_ref()?, *speed_range),
            Behavior::SizeBySpeed { size, speed_range } => size_by_speed(size.as_ref()?, *speed_range),
            Behavior::RotationBySpeed {
                angular_velocity,
                speed_range,
            } => rotation_by_speed(angular_velocity.as_ref(), *speed_range),
            Behavior::OrbitOverLife {
                orbit_speed,
                center,
                radius,
            } => Some(orbit_over_life(orbit_speed.as_ref(), *center, radius.as_ref())),
            _ => None,
        })
        .collect()
}

/// Closures run by the solid backend's own update loop.
pub fn build_per_particle_solid(behaviors: &[Behavior]) -> Vec<ParticleBehaviorFn> {
    behaviors
        .iter()
        .filter_map(|behavior| match behavior {
            Behavior::ForceOverLife { force } | Behavior::ApplyForce { force } => apply_force(force),
            Behavior::GravityForce { gravity } => {
                let g = gravity.as_ref()?.evaluate_constant();
                apply_force(&ForceVector::new(Vec3::new(0.0, -g, 0.0)))
            }
            Behavior::ColorBySpeed { color, speed_range } => color_by_speed(color.as_ref()?, *speed_range),
            Behavior::SizeBySpeed { size, speed_range } => size_by_speed(size.as_ref()?, *speed_range),
            Behavior::RotationBySpeed {
                angular_velocity,
                speed_range,
            } => rotation_by_speed(angular_velocity.as_ref(), *speed_range),
            Behavior::OrbitOverLife {
                orbit_speed,
                center,
                radius,
            } => Some(orbit_over_life(orbit_speed.as_ref(), *center, radius.as_ref())),
            _ => None,
        })
        .collect()
}

/// `velocity += force × dt`. Skipped entirely for a zero force.
fn apply_force(force: &ForceVector) -> Option<ParticleBehaviorFn> {
    let force = force.resolve();
    if force == Vec3::ZERO {
        return None;
    }
    Some(Box::new(move |p: &mut Particle, dt: f32| {
        p.velocity += force * dt;
    }))
}

/// Gradient color picked by speed ratio, times spawn color; alpha from spawn.
fn color_by_speed(color: &ColorGradientDef, range: SpeedRange) -> Option<ParticleBehaviorFn> {
    let gradient = color.bake();
    if gradient.is_empty() {
        return None;
    }
    Some(Box::new(move |p: &mut Particle, _dt: f32| {
        let c = gradient.sample_or(range.ratio(p.speed()), LinearRgba::WHITE);
        let start = p.start.color;
        p.color = LinearRgba::new(
            c.red * start.red,
            c.green * start.green,
            c.blue * start.blue,
            start.alpha,
        );
    }))
}

fn size_by_speed(size: &NumberGradient, range: SpeedRange) -> Option<ParticleBehaviorFn> {
    if size.is_empty() {
        return None;
    }
    let size = size.clone();
    Some(Box::new(move |p: &mut Particle, _dt: f32| {
        let multiplier = size.sample_or(range.ratio(p.speed()), 1.0);
        p.scale = Vec3::splat(p.start.size * multiplier);
    }))
}

/// Keyed tracks are sampled by speed ratio; plain values spin at their
/// midpoint regardless of speed.
fn rotation_by_speed(angular_velocity: Option<&FloatTrack>, range: SpeedRange) -> Option<ParticleBehaviorFn> {
    match angular_velocity? {
        FloatTrack::Keys(keys) if !keys.is_empty() => {
            let keys = keys.clone();
            Some(Box::new(move |p: &mut Particle, dt: f32| {
                let angular = keys.sample_or(range.ratio(p.speed()), 0.0);
                p.rotation.z += angular * dt;
            }))
        }
        track => {
            let angular = track.range().midpoint();
            Some(Box::new(move |p: &mut Particle, dt: f32| {
                p.rotation.z += angular * dt;
            }))
        }
    }
}

/// Overwrites position with a circle around `center` in the XY plane.
fn orbit_over_life(speed: Option<&Value>, center: Vec3, radius: Option<&FloatTrack>) -> ParticleBehaviorFn {
    let speed = speed.map_or(1.0, Value::evaluate_constant);
    let radius_keys = radius.filter(|r| r.has_keys()).cloned();
    let constant_radius = match radius {
        Some(r) if !r.has_keys() => r.range().midpoint(),
        _ => 1.0,
    };
    Box::new(move |p: &mut Particle, _dt: f32| {
        if p.life_time <= 0.0 {
            return;
        }
        let life_ratio = p.age / p.life_time;
        let radius = radius_keys
            .as_ref()
            .map_or(constant_radius, |keys| keys.sample(life_ratio));
        let angle = life_ratio * speed * std::f32::consts::TAU;
        p.position = center + Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColorGradientDef;

    const EPS: f32 = 1e-5;

    fn moving(speed: f32) -> Particle {
        Particle {
            alive: true,
            visible: true,
            velocity: Vec3::new(speed, 0.0, 0.0),
            ..default()
        }
    }

    #[test]
    fn color_by_speed_blends_to_purple() {
        let behaviors = vec![Behavior::ColorBySpeed {
            color: Some(ColorGradientDef::from_colors(vec![
                GradientKey::new(0.0, LinearRgba::RED),
                GradientKey::new(1.0, LinearRgba::BLUE),
            ])),
            speed_range: SpeedRange::new(0.0, 10.0),
        }];
        let closures = build_per_particle_solid(&behaviors);
        assert_eq!(closures.len(), 1);

        let mut p = moving(5.0);
        p.start.color = LinearRgba::new(1.0, 1.0, 0.5, 0.8);
        closures[0](&mut p, 1.0 / 60.0);

        assert!((p.color.red - 0.5).abs() < EPS);
        assert!(p.color.green.abs() < EPS);
        assert!((p.color.blue - 0.25).abs() < EPS);
        assert!((p.color.alpha - 0.8).abs() < EPS);
    }

    #[test]
    fn force_integrates_into_velocity() {
        let behaviors = vec![Behavior::ForceOverLife {
            force: ForceVector::new(Vec3::new(0.0, 2.0, 0.0)),
        }];
        let closures = build_per_particle_solid(&behaviors);
        let mut p = moving(0.0);
        closures[0](&mut p, 0.5);
        assert!((p.velocity.y - 1.0).abs() < EPS);
    }

    #[test]
    fn zero_force_compiles_to_nothing() {
        let behaviors = vec![
            Behavior::ApplyForce {
                force: ForceVector::default(),
            },
            Behavior::GravityForce { gravity: None },
        ];
        assert!(build_per_particle_solid(&behaviors).is_empty());
    }

    #[test]
    fn orbit_overwrites_position() {
        let closures = build_per_particle_solid(&[Behavior::OrbitOverLife {
            orbit_speed: Some(Value::Constant(1.0)),
            center: Vec3::new(1.0, 2.0, 3.0),
            radius: Some(FloatTrack::Value(Value::Constant(2.0))),
        }]);
        let mut p = moving(0.0);
        p.position = Vec3::splat(100.0);
        p.life_time = 4.0;
        p.age = 1.0;
        closures[0](&mut p, 0.1);
        assert!((p.position - Vec3::new(1.0, 4.0, 3.0)).length() < 1e-4);
    }

    #[test]
    fn orbit_is_a_no_op_without_lifetime() {
        let closures = build_per_particle_billboard(&[Behavior::OrbitOverLife {
            orbit_speed: None,
            center: Vec3::ZERO,
            radius: None,
        }]);
        let mut p = moving(0.0);
        p.position = Vec3::ONE;
        p.life_time = 0.0;
        closures[0](&mut p, 0.1);
        assert_eq!(p.position, Vec3::ONE);
    }

    #[test]
    fn size_by_speed_scales_spawn_size() {
        let closures = build_per_particle_billboard(&[Behavior::SizeBySpeed {
            size: Some(NumberGradient::from_keys(vec![
                GradientKey::new(0.0, 1.0),
                GradientKey::new(1.0, 3.0),
            ])),
            speed_range: SpeedRange::new(0.0, 2.0),
        }]);
        let mut p = moving(1.0);
        p.start.size = 0.5;
        closures[0](&mut p, 0.1);
        assert!((p.scale - Vec3::splat(1.0)).length() < EPS);
    }

    #[test]
    fn rotation_by_speed_uses_midpoint_without_keys() {
        let closures = build_per_particle_solid(&[Behavior::RotationBySpeed {
            angular_velocity: Some(FloatTrack::Value(Value::interval(1.0, 3.0))),
            speed_range: SpeedRange::default(),
        }]);
        let mut p = moving(0.0);
        closures[0](&mut p, 0.5);
        assert!((p.rotation.z - 1.0).abs() < EPS);
    }

    #[test]
    fn billboard_table_skips_forces() {
        let behaviors = vec![Behavior::ForceOverLife {
            force: ForceVector::new(Vec3::X),
        }];
        assert!(build_per_particle_billboard(&behaviors).is_empty());
    }

    #[test]
    fn system_level_fills_life_tracks() {
        let mut tracks = LifeTracks::new(0.1);
        apply_system_level_solid(
            &mut tracks,
            &[
                Behavior::SizeOverLife {
                    size: Some(FloatTrack::Keys(NumberGradient::from_keys(vec![
                        GradientKey::new(0.0, 1.0),
                        GradientKey::new(1.0, 0.0),
                    ]))),
                },
                Behavior::RotationOverLife {
                    angular_velocity: Some(Value::interval(1.0, 2.0)),
                },
                Behavior::LimitSpeedOverLife {
                    speed: Some(FloatTrack::Value(Value::Constant(3.0))),
                    dampen: Some(0.5),
                },
                Behavior::Unknown {
                    type_name: "Noise".into(),
                    raw: "{}".into(),
                },
            ],
        );
        assert_eq!(tracks.size.len(), 2);
        assert_eq!(tracks.angular_speed_range, ValueRange::new(1.0, 2.0));
        assert!(tracks.angular_speed.is_empty());
        assert_eq!(tracks.limit_velocity.sample(0.3), Some(3.0));
        assert_eq!(tracks.limit_velocity_damping, 0.5);
    }

    #[test]
    fn limit_speed_scales_by_ceiling_and_damping() {
        let mut tracks = LifeTracks::new(0.5);
        tracks.limit_velocity = NumberGradient::constant(2.0);
        let mut p = moving(8.0);
        tracks.limit_speed(&mut p, 0.5);
        assert!((p.velocity.x - 1.0).abs() < EPS);

        let mut slow = moving(1.0);
        tracks.limit_speed(&mut slow, 0.5);
        assert_eq!(slow.velocity.x, 1.0);
    }

    #[test]
    fn billboard_system_level_maps_gravity_and_frames() {
        let mut native = NativeParticleSystem::new(8);
        apply_system_level_billboard(
            &mut native,
            &[
                Behavior::GravityForce {
                    gravity: Some(Value::Constant(9.8)),
                },
                Behavior::ApplyForce {
                    force: ForceVector::new(Vec3::new(1.0, 0.0, 0.0)),
                },
                Behavior::FrameOverLife {
                    frame: Some(FloatTrack::Value(Value::interval(2.0, 7.0))),
                },
            ],
        );
        assert!((native.gravity - Vec3::new(1.0, -9.8, 0.0)).length() < EPS);
        assert_eq!((native.start_cell, native.end_cell), (2, 7));
        assert!(native.animate_cells);
    }
}
