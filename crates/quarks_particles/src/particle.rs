//! Runtime particle state shared by both backends, plus pool capacity sizing.

use bevy::prelude::*;

/// Values captured at spawn that later stages scale against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnSnapshot {
    pub size: f32,
    pub color: LinearRgba,
    pub speed: f32,
    pub angular_speed: f32,
}

impl Default for SpawnSnapshot {
    fn default() -> Self {
        Self {
            size: 1.0,
            color: LinearRgba::WHITE,
            speed: 0.0,
            angular_speed: 0.0,
        }
    }
}

/// One simulated particle. Positions and velocities live in the backend's
/// simulation space (emitter-local or world, per the system's config).
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Euler angles (XYZ); `z` is the in-plane spin.
    pub rotation: Vec3,
    /// Base orientation for quaternion start rotations, applied before
    /// `rotation`.
    pub orientation: Quat,
    pub scale: Vec3,
    pub color: LinearRgba,
    pub age: f32,
    pub life_time: f32,
    pub alive: bool,
    pub visible: bool,
    pub start: SpawnSnapshot,
    /// Velocity gradient factor for the current tick.
    pub speed_modifier: f32,
    /// Sprite sheet cell.
    pub cell: u32,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
            color: LinearRgba::WHITE,
            age: 0.0,
            life_time: 1.0,
            alive: false,
            visible: false,
            start: SpawnSnapshot::default(),
            speed_modifier: 1.0,
            cell: 0,
        }
    }
}

impl Particle {
    /// Normalized age in `[0, 1]`; zero for a non-positive lifetime.
    pub fn life_ratio(&self) -> f32 {
        if self.life_time <= 0.0 {
            0.0
        } else {
            (self.age / self.life_time).clamp(0.0, 1.0)
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Final orientation: base orientation then Euler spin.
    pub fn world_rotation(&self) -> Quat {
        self.orientation
            * Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    /// Return to the dead pool.
    pub fn kill(&mut self) {
        self.alive = false;
        self.visible = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Billboard pool size: `ceil(rate × duration × 2)`.
pub fn billboard_capacity(emission_rate: f32, duration: f32) -> usize {
    (emission_rate * duration * 2.0).ceil().max(0.0) as usize
}

/// Solid pool size: `max(ceil(rate × lifetime), 1)` when looping,
/// `ceil(rate × lifetime × 2)` otherwise.
pub fn solid_capacity(emission_rate: f32, lifetime: f32, looping: bool) -> usize {
    if looping {
        ((emission_rate * lifetime).ceil().max(0.0) as usize).max(1)
    } else {
        (emission_rate * lifetime * 2.0).ceil().max(0.0) as usize
    }
}
