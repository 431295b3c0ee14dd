//! Billboard backend.
//!
//! [`NativeParticleSystem`] is a lightweight sprite primitive with its own
//! emission loop and gradient-driven update (color, size, angular speed,
//! velocity, speed limit, sprite cells). [`BillboardSystem`] wraps it: it
//! configures the primitive from a [`ParticleSystemConfig`] and installs a
//! post-update hook that runs per-particle behavior closures after the native
//! update.

use bevy::math::Affine3A;
use bevy::prelude::*;

use crate::behavior::{
    LifeTracks, ParticleBehaviorFn, apply_system_level_billboard, build_per_particle_billboard,
};
use crate::data::{BillboardMode, Behavior, ParticleSystemConfig, SpriteSheet, lerp_rgba};
use crate::gradient::NumberGradient;
use crate::particle::{Particle, SpawnSnapshot, billboard_capacity};
use crate::shape::ShapeEmitter;
use crate::system::EffectSystem;
use crate::value::{Value, ValueRange};

/// Runs after the native update over the live particles.
pub type PostUpdateHook = Box<dyn Fn(&mut [Particle], f32) + Send + Sync>;

/// Half-width of the emit-rate window a burst is mapped to, in normalized
/// emission time.
const BURST_WINDOW: f32 = 0.02;
const NATIVE_LIMIT_DAMPING: f32 = 0.4;

// ---------------------------------------------------------------------------
// Native primitive
// ---------------------------------------------------------------------------

pub struct NativeParticleSystem {
    capacity: usize,
    particles: Vec<Particle>,
    stock: Vec<Particle>,

    pub emit_rate: f32,
    /// Emit-rate over normalized emission time; overrides `emit_rate`.
    pub emit_rate_gradient: NumberGradient,
    pub start_size_gradient: NumberGradient,
    pub lifetime_gradient: NumberGradient,
    pub manual_emit_count: u32,

    pub life: ValueRange,
    pub size: ValueRange,
    pub emit_power: ValueRange,
    pub initial_rotation: ValueRange,
    pub scale_x: f32,
    pub scale_y: f32,
    pub color1: LinearRgba,
    pub color2: LinearRgba,
    /// Color reached at end of life when no color track is set.
    pub color_dead: LinearRgba,
    pub gravity: Vec3,
    pub tracks: LifeTracks,

    pub sprite: Option<SpriteSheet>,
    pub start_cell: u32,
    pub end_cell: u32,
    pub animate_cells: bool,

    /// Emission stops after this many seconds; 0 = never.
    pub target_stop_duration: f32,
    /// Cycle length used to normalize time when looping.
    pub duration: f32,
    pub pre_warm_cycles: u32,
    pub pre_warm_step: f32,
    pub is_local: bool,
    pub dispose_on_stop: bool,
    pub billboard_mode: BillboardMode,
    pub shape: ShapeEmitter,
    pub shape_speed: Option<Value>,
    pub emitter_transform: Affine3A,

    post_update: Option<PostUpdateHook>,
    elapsed: f32,
    emit_accumulator: f32,
    started: bool,
    emission_ended: bool,
    disposed: bool,
    pool_exhausted_warned: bool,
}

impl NativeParticleSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            particles: Vec::with_capacity(capacity),
            stock: Vec::new(),
            emit_rate: 10.0,
            emit_rate_gradient: NumberGradient::default(),
            start_size_gradient: NumberGradient::default(),
            lifetime_gradient: NumberGradient::default(),
            manual_emit_count: 0,
            life: ValueRange::splat(1.0),
            size: ValueRange::splat(1.0),
            emit_power: ValueRange::splat(1.0),
            initial_rotation: ValueRange::default(),
            scale_x: 1.0,
            scale_y: 1.0,
            color1: LinearRgba::WHITE,
            color2: LinearRgba::WHITE,
            color_dead: LinearRgba::new(1.0, 1.0, 1.0, 0.0),
            gravity: Vec3::ZERO,
            tracks: LifeTracks::new(NATIVE_LIMIT_DAMPING),
            sprite: None,
            start_cell: 0,
            end_cell: 0,
            animate_cells: false,
            target_stop_duration: 0.0,
            duration: 5.0,
            pre_warm_cycles: 0,
            pre_warm_step: 1.0 / 60.0,
            is_local: false,
            dispose_on_stop: false,
            billboard_mode: BillboardMode::All,
            shape: ShapeEmitter::default(),
            shape_speed: None,
            emitter_transform: Affine3A::IDENTITY,
            post_update: None,
            elapsed: 0.0,
            emit_accumulator: 0.0,
            started: false,
            emission_ended: false,
            disposed: false,
            pool_exhausted_warned: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live particles.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn set_post_update(&mut self, hook: Option<PostUpdateHook>) {
        self.post_update = hook;
    }

    pub fn has_post_update(&self) -> bool {
        self.post_update.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// One-shot emission is over and every particle has died.
    pub fn is_finished(&self) -> bool {
        self.emission_ended && self.particles.is_empty()
    }

    /// Insert a burst as a spike in the emit-rate track.
    pub fn add_burst(&mut self, time_ratio: f32, count: f32) {
        let t = time_ratio.clamp(0.0, 1.0);
        let base = self.emit_rate;
        self.emit_rate_gradient.add((t - BURST_WINDOW).max(0.0), base);
        self.emit_rate_gradient.add(t, count / BURST_WINDOW);
        self.emit_rate_gradient.add((t + BURST_WINDOW).min(1.0), base);
    }

    pub fn start(&mut self) {
        if self.disposed {
            return;
        }
        self.started = true;
        self.emission_ended = false;
        self.elapsed = 0.0;
        self.emit_accumulator = 0.0;
        for _ in 0..self.pre_warm_cycles {
            self.update(self.pre_warm_step);
        }
    }

    /// Stop emitting and retire every live particle.
    pub fn stop(&mut self) {
        self.started = false;
        self.retire_all();
    }

    pub fn reset(&mut self) {
        self.retire_all();
        self.elapsed = 0.0;
        self.emit_accumulator = 0.0;
        self.emission_ended = false;
    }

    pub fn dispose(&mut self) {
        self.started = false;
        self.disposed = true;
        self.particles.clear();
        self.stock.clear();
        self.post_update = None;
    }

    fn retire_all(&mut self) {
        for mut p in self.particles.drain(..) {
            p.kill();
            self.stock.push(p);
        }
    }

    /// Time through the current emission cycle, in `[0, 1]`.
    fn normalized_time(&self) -> f32 {
        if self.target_stop_duration > 0.0 {
            (self.elapsed / self.target_stop_duration).clamp(0.0, 1.0)
        } else if self.duration > 0.0 {
            (self.elapsed % self.duration) / self.duration
        } else {
            0.0
        }
    }

    /// Advance by `dt`: emit, run the native update, then the hook.
    pub fn update(&mut self, dt: f32) {
        if !self.started || self.disposed {
            return;
        }
        self.elapsed += dt;
        if self.target_stop_duration <= 0.0 && self.duration > 0.0 {
            self.elapsed = self.elapsed.rem_euclid(self.duration);
        }

        if !self.emission_ended {
            let normalized = self.normalized_time();
            let rate = self.emit_rate_gradient.sample_or(normalized, self.emit_rate);
            self.emit_accumulator += rate.max(0.0) * dt;
            let mut count = self.emit_accumulator.floor() as u32;
            self.emit_accumulator -= count as f32;
            count += std::mem::take(&mut self.manual_emit_count);
            for _ in 0..count {
                if !self.emit_one(normalized) {
                    break;
                }
            }
            if self.target_stop_duration > 0.0 && self.elapsed >= self.target_stop_duration {
                self.emission_ended = true;
            }
        }

        self.native_update(dt);

        if let Some(hook) = &self.post_update {
            hook(&mut self.particles, dt);
        }

        if self.dispose_on_stop && self.is_finished() {
            self.dispose();
        }
    }

    fn emit_one(&mut self, normalized: f32) -> bool {
        if self.particles.len() >= self.capacity {
            if !self.pool_exhausted_warned {
                warn!("Billboard pool exhausted at {} particles; dropping spawns", self.capacity);
                self.pool_exhausted_warned = true;
            }
            return false;
        }
        let timed = self.target_stop_duration > 0.0;
        let mut p = self.stock.pop().unwrap_or_default();
        p.reset();
        p.alive = true;
        p.visible = true;

        p.life_time = match self.lifetime_gradient.sample(normalized) {
            Some(life) if timed => life,
            _ => self.life.sample(),
        };
        let size = match self.start_size_gradient.sample(normalized) {
            Some(size) if timed => size,
            _ => self.size.sample(),
        };
        p.scale = Vec3::new(size * self.scale_x, size * self.scale_y, size);
        p.color = lerp_rgba(self.color1, self.color2, fastrand::f32());
        p.rotation.z = self.initial_rotation.sample();
        p.start = SpawnSnapshot {
            size,
            color: p.color,
            speed: 0.0,
            angular_speed: self.tracks.angular_speed_range.sample(),
        };

        let speed = self
            .shape_speed
            .as_ref()
            .map_or_else(|| self.emit_power.sample(), |v| v.sample_spawn(normalized, timed));
        p.start.speed = speed;
        self.shape.initialize_particle(&mut p, speed);
        if !self.is_local {
            p.position = self.emitter_transform.transform_point3(p.position);
            p.velocity = self.emitter_transform.transform_vector3(p.velocity);
        }

        if let Some(sprite) = &self.sprite {
            let cells = sprite.cell_count();
            let first = if self.animate_cells {
                self.start_cell
            } else {
                sprite.start_tile.sample(normalized).max(0.0) as u32
            };
            p.cell = first.min(cells - 1);
        }

        self.particles.push(p);
        true
    }

    fn native_update(&mut self, dt: f32) {
        let mut i = 0;
        while i < self.particles.len() {
            let p = &mut self.particles[i];
            p.age += dt;
            if p.age >= p.life_time {
                let mut dead = self.particles.swap_remove(i);
                dead.kill();
                self.stock.push(dead);
                continue;
            }
            let ratio = p.life_ratio();

            p.color = match self.tracks.color.sample(ratio) {
                Some(c) => c,
                None => lerp_rgba(p.start.color, self.color_dead, ratio),
            };
            if let Some(s) = self.tracks.size.sample(ratio) {
                let size = p.start.size * s;
                p.scale = Vec3::new(size * self.scale_x, size * self.scale_y, size);
            }
            let angular = self.tracks.angular_speed.sample_or(ratio, p.start.angular_speed);
            p.rotation.z += angular * dt;
            p.speed_modifier = self.tracks.velocity.sample_or(ratio, 1.0);
            self.tracks.limit_speed(p, ratio);

            p.position += p.velocity * dt * p.speed_modifier;
            p.velocity += self.gravity * dt;

            if self.animate_cells {
                if let Some(sprite) = &self.sprite {
                    let span = self.end_cell.saturating_sub(self.start_cell) as f32;
                    let cell = self.start_cell + (span * ratio).floor() as u32;
                    p.cell = cell.min(sprite.cell_count() - 1);
                }
            }
            i += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Wrapper
// ---------------------------------------------------------------------------

/// A billboard emitter built from a [`ParticleSystemConfig`].
pub struct BillboardSystem {
    name: String,
    config: ParticleSystemConfig,
    native: NativeParticleSystem,
    base_gravity: Vec3,
}

impl BillboardSystem {
    /// `parent_scale` is the cumulative scale of the emitter's ancestors,
    /// applied to the shape volume.
    pub fn new(name: impl Into<String>, config: ParticleSystemConfig, parent_scale: Vec3) -> Self {
        let duration = if config.target_stop_duration > 0.0 {
            config.target_stop_duration
        } else if config.duration > 0.0 {
            config.duration
        } else {
            5.0
        };
        let rate = config.emission_rate();
        let mut native = NativeParticleSystem::new(billboard_capacity(rate, duration));

        native.emit_rate = rate;
        native.target_stop_duration = config.target_stop_duration;
        native.duration = duration;
        native.pre_warm_cycles = config.pre_warm_cycles;
        native.pre_warm_step = config.pre_warm_step;
        native.is_local = config.is_local;
        native.dispose_on_stop = config.dispose_on_stop;
        native.billboard_mode = config.billboard_mode;
        native.scale_x = config.scale_x;
        native.scale_y = config.scale_y;

        native.life = config.start_life.evaluate_interval();
        native.emit_power = config.start_speed.evaluate_interval();
        native.size = config.start_size.evaluate_interval();
        for (target, value) in [
            (&mut native.emit_rate_gradient, &config.emission_over_time),
            (&mut native.start_size_gradient, &config.start_size),
            (&mut native.lifetime_gradient, &config.start_life),
        ] {
            if let Some(gradient) = value.parse_value_to_min_max().gradient {
                *target = gradient;
            }
        }
        native.initial_rotation = config
            .start_rotation
            .as_ref()
            .map_or(ValueRange::default(), |r| r.z_range());

        let (color1, color2) = config.start_color.endpoints();
        native.color1 = color1;
        native.color2 = color2;
        native.color_dead = color1.with_alpha(0.0);

        native.shape = ShapeEmitter::from_config(&config.shape).scaled(parent_scale);
        native.shape_speed = config.shape.speed.clone();
        native.sprite = config.sprite.clone().filter(SpriteSheet::is_animated);

        for burst in &config.emission_bursts {
            let time = burst.time.evaluate_constant();
            native.add_burst(time / duration, burst.count.evaluate_constant());
        }

        let mut system = Self {
            name: name.into(),
            base_gravity: config.gravity,
            config,
            native,
        };
        system.rebuild_behaviors();
        system
    }

    pub fn native(&self) -> &NativeParticleSystem {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut NativeParticleSystem {
        &mut self.native
    }

    pub fn emit(&mut self, count: u32) {
        self.native.manual_emit_count += count;
    }

    /// Reset native tracks to their base state, reapply the system-level
    /// table, and reinstall the per-particle hook.
    fn rebuild_behaviors(&mut self) {
        let native = &mut self.native;
        native.tracks = LifeTracks::new(NATIVE_LIMIT_DAMPING);
        native.gravity = self.base_gravity;
        native.start_cell = 0;
        native.end_cell = native.sprite.as_ref().map_or(0, |s| s.cell_count() - 1);
        native.animate_cells = false;
        apply_system_level_billboard(native, &self.config.behaviors);

        let closures = build_per_particle_billboard(&self.config.behaviors);
        native.set_post_update(wrap_closures(closures));
    }
}

fn wrap_closures(closures: Vec<ParticleBehaviorFn>) -> Option<PostUpdateHook> {
    if closures.is_empty() {
        return None;
    }
    Some(Box::new(move |particles: &mut [Particle], dt: f32| {
        for p in particles.iter_mut().filter(|p| p.alive) {
            for f in &closures {
                f(p, dt);
            }
        }
    }))
}

impl EffectSystem for BillboardSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn config(&self) -> &ParticleSystemConfig {
        &self.config
    }

    fn start(&mut self) {
        self.native.start();
    }

    fn stop(&mut self) {
        self.native.stop();
    }

    fn reset(&mut self) {
        self.native.reset();
    }

    fn dispose(&mut self) {
        self.native.dispose();
    }

    fn is_started(&self) -> bool {
        self.native.is_started()
    }

    fn is_disposed(&self) -> bool {
        self.native.is_disposed()
    }

    fn tick(&mut self, dt: f32) {
        self.native.update(dt);
    }

    fn set_emitter_transform(&mut self, world: Affine3A) {
        self.native.emitter_transform = world;
    }

    fn simulation_to_world(&self) -> Affine3A {
        if self.native.is_local {
            self.native.emitter_transform
        } else {
            Affine3A::IDENTITY
        }
    }

    fn particles(&self) -> &[Particle] {
        self.native.particles()
    }

    fn capacity(&self) -> usize {
        self.native.capacity()
    }

    fn set_behaviors(&mut self, behaviors: Vec<Behavior>) {
        self.config.behaviors = behaviors;
        self.rebuild_behaviors();
    }

    fn add_behavior(&mut self, behavior: Behavior) {
        self.config.behaviors.push(behavior);
        self.rebuild_behaviors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColorGradientDef, EmissionBurst, SpeedRange};
    use crate::gradient::GradientKey;

    const DT: f32 = 1.0 / 60.0;

    fn config(rate: f32, looping: bool) -> ParticleSystemConfig {
        let mut config = ParticleSystemConfig {
            emission_over_time: Value::Constant(rate),
            duration: 1.0,
            ..default()
        };
        config.set_looping(looping);
        config
    }

    fn run(system: &mut BillboardSystem, seconds: f32) {
        let steps = (seconds / DT).round() as usize;
        for _ in 0..steps {
            system.tick(DT);
        }
    }

    #[test]
    fn capacity_follows_rate_and_duration() {
        let mut c = config(10.0, false);
        c.duration = 5.0;
        c.set_looping(false);
        let system = BillboardSystem::new("a", c, Vec3::ONE);
        assert_eq!(system.capacity(), 100);
    }

    #[test]
    fn emits_at_rate_while_started() {
        let mut system = BillboardSystem::new("a", config(30.0, true), Vec3::ONE);
        run(&mut system, 0.5);
        assert!(system.particles().is_empty());

        system.start();
        run(&mut system, 0.5);
        let n = system.particles().len();
        assert!((14..=15).contains(&n), "expected ~15 live particles, got {n}");
    }

    #[test]
    fn stop_then_start_leaves_no_residue() {
        let mut system = BillboardSystem::new("a", config(20.0, true), Vec3::ONE);
        system.start();
        run(&mut system, 0.5);
        assert!(!system.particles().is_empty());

        system.stop();
        assert!(system.particles().is_empty());
        run(&mut system, 0.2);
        assert!(system.particles().is_empty());

        system.start();
        system.tick(DT);
        assert!(system.particles().iter().all(|p| p.age <= DT + 1e-6));
    }

    #[test]
    fn particles_die_at_end_of_life() {
        let mut c = config(60.0, true);
        c.start_life = Value::Constant(0.25);
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        run(&mut system, 1.0);
        assert!(system.particles().iter().all(|p| p.age < p.life_time));
    }

    #[test]
    fn one_shot_stops_emitting_after_duration() {
        let mut system = BillboardSystem::new("a", config(20.0, false), Vec3::ONE);
        system.start();
        run(&mut system, 2.5);
        assert!(system.native().is_finished());
        assert!(system.particles().is_empty());
    }

    #[test]
    fn looping_clock_keeps_advancing_after_long_runtimes() {
        let mut c = config(10.0, true);
        c.duration = 5.0;
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        // 2^19 s, where f32 spacing exceeds a 60 fps step.
        system.native_mut().elapsed = 524_288.0;
        let before = system.native().normalized_time();
        run(&mut system, 1.0);
        let after = system.native().normalized_time();
        assert!(system.native().elapsed < 5.0);
        assert!((after - before - 0.2).abs() < 0.01, "before={before} after={after}");
    }

    #[test]
    fn reset_retires_particles_and_emission_resumes() {
        let mut c = config(20.0, false);
        c.start_life = Value::Constant(5.0);
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        run(&mut system, 1.5);
        assert!(system.native().emission_ended);
        assert!(system.live_count() > 0);

        system.reset();
        assert_eq!(system.live_count(), 0);
        assert!(system.particles().is_empty());
        assert!(!system.native().emission_ended);
        assert!(system.is_started());

        run(&mut system, 0.5);
        assert!(system.is_started());
        assert!(system.live_count() > 0);
    }

    #[test]
    fn reset_after_a_finished_one_shot_emits_again() {
        let mut system = BillboardSystem::new("a", config(20.0, false), Vec3::ONE);
        system.start();
        run(&mut system, 2.5);
        assert!(system.native().is_finished());

        system.reset();
        assert!(!system.native().is_finished());
        assert_eq!(system.live_count(), 0);
        run(&mut system, 0.25);
        assert!(system.live_count() > 0);
    }

    #[test]
    fn dispose_on_stop_releases_finished_systems() {
        let mut c = config(20.0, false);
        c.dispose_on_stop = true;
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        run(&mut system, 2.5);
        assert!(system.is_disposed());
        system.dispose();
        assert!(system.is_disposed());
    }

    #[test]
    fn color_fades_to_dead_color_without_track() {
        let mut c = config(60.0, true);
        c.start_life = Value::Constant(1.0);
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        run(&mut system, 0.5);
        let oldest = system
            .particles()
            .iter()
            .max_by(|a, b| a.age.total_cmp(&b.age))
            .cloned()
            .unwrap();
        assert!((oldest.color.alpha - (1.0 - oldest.life_ratio())).abs() < 1e-3);
    }

    #[test]
    fn gravity_behavior_pulls_particles_down() {
        let mut c = config(30.0, true);
        c.start_speed = Value::Constant(0.0);
        c.behaviors = vec![Behavior::GravityForce {
            gravity: Some(Value::Constant(10.0)),
        }];
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        system.start();
        run(&mut system, 0.5);
        assert!(system.particles().iter().all(|p| p.velocity.y <= 0.0));
        assert!(system.particles().iter().any(|p| p.position.y < 0.0));
    }

    #[test]
    fn post_update_hook_runs_per_particle_behaviors() {
        let mut c = config(30.0, true);
        c.start_speed = Value::Constant(5.0);
        c.start_color = crate::data::ColorValue::Constant(LinearRgba::WHITE);
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        assert!(!system.native().has_post_update());

        system.set_behaviors(vec![Behavior::ColorBySpeed {
            color: Some(ColorGradientDef::from_colors(vec![
                GradientKey::new(0.0, LinearRgba::RED),
                GradientKey::new(1.0, LinearRgba::BLUE),
            ])),
            speed_range: SpeedRange::new(0.0, 10.0),
        }]);
        assert!(system.native().has_post_update());

        system.start();
        run(&mut system, 0.2);
        for p in system.particles() {
            assert!((p.color.red - 0.5).abs() < 1e-4);
            assert!((p.color.blue - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn set_behaviors_rebuilds_from_base_state() {
        let mut c = config(10.0, true);
        c.gravity = Vec3::new(0.0, -1.0, 0.0);
        c.behaviors = vec![Behavior::GravityForce {
            gravity: Some(Value::Constant(5.0)),
        }];
        let mut system = BillboardSystem::new("a", c, Vec3::ONE);
        assert_eq!(system.native().gravity, Vec3::new(0.0, -6.0, 0.0));
        system.set_behaviors(Vec::new());
        assert_eq!(system.native().gravity, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn bursts_become_emit_rate_windows() {
        let mut c = config(10.0, false);
        c.duration = 5.0;
        c.set_looping(false);
        c.emission_bursts = vec![EmissionBurst::at(2.5, 8.0)];
        let system = BillboardSystem::new("a", c, Vec3::ONE);
        let gradient = &system.native().emit_rate_gradient;
        assert_eq!(gradient.len(), 3);
        assert_eq!(gradient.sample(0.5), Some(400.0));
        assert_eq!(gradient.sample(0.1), Some(10.0));
    }
}
