//! Emitter shape generators: initial position and outward velocity.

use std::f32::consts::TAU;

use bevy::prelude::*;

use crate::data::{ShapeConfig, ShapeKind};
use crate::particle::Particle;

/// A configured emitter volume.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeEmitter {
    Point {
        direction1: Vec3,
        direction2: Vec3,
    },
    Sphere {
        radius: f32,
        arc: f32,
        thickness: f32,
    },
    /// Base disc on the XZ plane, opening toward +Y.
    Cone {
        radius: f32,
        arc: f32,
        thickness: f32,
        angle: f32,
    },
    Box {
        min: Vec3,
        max: Vec3,
        direction1: Vec3,
        direction2: Vec3,
    },
    /// Upper (+Y) half sphere.
    Hemisphere {
        radius: f32,
        radius_range: f32,
        direction_randomizer: f32,
    },
    /// Y-aligned, centered on the origin.
    Cylinder {
        radius: f32,
        height: f32,
        radius_range: f32,
        direction_randomizer: f32,
    },
}

impl Default for ShapeEmitter {
    fn default() -> Self {
        ShapeEmitter::Point {
            direction1: Vec3::Y,
            direction2: Vec3::Y,
        }
    }
}

impl ShapeEmitter {
    pub fn from_config(shape: &ShapeConfig) -> Self {
        match shape.kind {
            ShapeKind::Point => ShapeEmitter::Point {
                direction1: shape.direction1,
                direction2: shape.direction2,
            },
            ShapeKind::Sphere => ShapeEmitter::Sphere {
                radius: shape.radius,
                arc: shape.arc,
                thickness: shape.thickness,
            },
            ShapeKind::Cone => ShapeEmitter::Cone {
                radius: shape.radius,
                arc: shape.arc,
                thickness: shape.thickness,
                angle: shape.angle,
            },
            ShapeKind::Box => ShapeEmitter::Box {
                min: shape.box_min,
                max: shape.box_max,
                direction1: shape.direction1,
                direction2: shape.direction2,
            },
            ShapeKind::Hemisphere => ShapeEmitter::Hemisphere {
                radius: shape.radius,
                radius_range: shape.radius_range,
                direction_randomizer: shape.direction_randomizer,
            },
            ShapeKind::Cylinder => ShapeEmitter::Cylinder {
                radius: shape.radius,
                height: shape.height,
                radius_range: shape.radius_range,
                direction_randomizer: shape.direction_randomizer,
            },
        }
    }

    /// Scale every extent by a (cumulative parent) scale.
    pub fn scaled(self, scale: Vec3) -> Self {
        let s = scale.abs().max_element();
        match self {
            ShapeEmitter::Point { .. } => self,
            ShapeEmitter::Sphere { radius, arc, thickness } => ShapeEmitter::Sphere {
                radius: radius * s,
                arc,
                thickness,
            },
            ShapeEmitter::Cone {
                radius,
                arc,
                thickness,
                angle,
            } => ShapeEmitter::Cone {
                radius: radius * s,
                arc,
                thickness,
                angle,
            },
            ShapeEmitter::Box {
                min,
                max,
                direction1,
                direction2,
            } => ShapeEmitter::Box {
                min: min * scale,
                max: max * scale,
                direction1,
                direction2,
            },
            ShapeEmitter::Hemisphere {
                radius,
                radius_range,
                direction_randomizer,
            } => ShapeEmitter::Hemisphere {
                radius: radius * s,
                radius_range,
                direction_randomizer,
            },
            ShapeEmitter::Cylinder {
                radius,
                height,
                radius_range,
                direction_randomizer,
            } => ShapeEmitter::Cylinder {
                radius: radius * s,
                height: height * scale.y.abs(),
                radius_range,
                direction_randomizer,
            },
        }
    }

    /// Place `particle` inside the volume and aim it outward at
    /// `start_speed`.
    pub fn initialize_particle(&self, particle: &mut Particle, start_speed: f32) {
        let (position, direction) = self.sample();
        particle.position = position;
        particle.velocity = direction * start_speed;
    }

    fn sample(&self) -> (Vec3, Vec3) {
        match *self {
            ShapeEmitter::Point {
                direction1,
                direction2,
            } => (Vec3::ZERO, random_between(direction1, direction2)),
            ShapeEmitter::Sphere {
                radius,
                arc,
                thickness,
            } => {
                let theta = fastrand::f32() * arc;
                let cos_phi = fastrand::f32() * 2.0 - 1.0;
                let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
                let dir = Vec3::new(sin_phi * theta.cos(), cos_phi, sin_phi * theta.sin());
                let r = radius * (1.0 - thickness.clamp(0.0, 1.0) * fastrand::f32());
                (dir * r, dir)
            }
            ShapeEmitter::Cone {
                radius,
                arc,
                thickness,
                angle,
            } => {
                let theta = fastrand::f32() * arc;
                let rand = 1.0 - thickness.clamp(0.0, 1.0) * fastrand::f32();
                let r = radius * rand.sqrt();
                let position = Vec3::new(r * theta.cos(), 0.0, r * theta.sin());
                let spread = if radius > 0.0 { angle * (r / radius) } else { angle * fastrand::f32() };
                let dir = Vec3::new(spread.sin() * theta.cos(), spread.cos(), spread.sin() * theta.sin());
                (position, dir)
            }
            ShapeEmitter::Box {
                min,
                max,
                direction1,
                direction2,
            } => {
                let position = Vec3::new(
                    min.x + (max.x - min.x) * fastrand::f32(),
                    min.y + (max.y - min.y) * fastrand::f32(),
                    min.z + (max.z - min.z) * fastrand::f32(),
                );
                (position, random_between(direction1, direction2))
            }
            ShapeEmitter::Hemisphere {
                radius,
                radius_range,
                direction_randomizer,
            } => {
                let r = radius - fastrand::f32() * radius * radius_range;
                let phi = fastrand::f32() * TAU;
                let theta = (fastrand::f32() * 2.0 - 1.0).acos();
                let position = Vec3::new(
                    r * phi.cos() * theta.sin(),
                    (r * theta.cos()).abs(),
                    r * phi.sin() * theta.sin(),
                );
                let outward = position.try_normalize().unwrap_or(Vec3::Y);
                (position, randomize_direction(outward, direction_randomizer))
            }
            ShapeEmitter::Cylinder {
                radius,
                height,
                radius_range,
                direction_randomizer,
            } => {
                let y = (fastrand::f32() - 0.5) * height;
                let angle = fastrand::f32() * TAU;
                let distribution = 1.0 - radius_range.clamp(0.0, 1.0) * fastrand::f32();
                let r = distribution.sqrt() * radius;
                let position = Vec3::new(r * angle.cos(), y, r * angle.sin());
                let outward = Vec3::new(angle.cos(), 0.0, angle.sin());
                (position, randomize_direction(outward, direction_randomizer))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn random_between(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.x + (b.x - a.x) * fastrand::f32(),
        a.y + (b.y - a.y) * fastrand::f32(),
        a.z + (b.z - a.z) * fastrand::f32(),
    )
}

fn randomize_direction(dir: Vec3, amount: f32) -> Vec3 {
    if amount <= 0.0 {
        return dir;
    }
    (dir + random_unit_sphere() * amount)
        .try_normalize()
        .unwrap_or(dir)
}

pub(crate) fn random_unit_sphere() -> Vec3 {
    loop {
        let v = Vec3::new(
            fastrand::f32() * 2.0 - 1.0,
            fastrand::f32() * 2.0 - 1.0,
            fastrand::f32() * 2.0 - 1.0,
        );
        let len_sq = v.length_squared();
        if len_sq > 0.001 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}
