//! Mesh/solid backend: a custom simulation loop over a fixed pool of
//! mesh-instanced particles.
//!
//! The drawing side only sees [`SolidParticleSystem::instances`], a
//! `bytemuck`-castable buffer with one model matrix and color per pool slot.
//! Everything else (emission scheduling, recycling, initialization, gradient
//! tracks, behaviors, integration) happens here.
//!
//! Per-tick order:
//! 1. emission bookkeeping (rate, distance, bursts, looping)
//! 2. spawn initialization
//! 3. life-ratio tracks
//! 4. per-particle behavior closures
//! 5. position integration
//! 6. dead/alive bookkeeping

use bevy::math::Affine3A;
use bevy::prelude::*;
use bytemuck::{Pod, Zeroable};

use crate::behavior::{LifeTracks, ParticleBehaviorFn, apply_system_level_solid, build_per_particle_solid};
use crate::data::{Behavior, ParticleSystemConfig, SampledRotation};
use crate::particle::{Particle, SpawnSnapshot, solid_capacity};
use crate::shape::ShapeEmitter;
use crate::system::EffectSystem;

const SOLID_LIMIT_DAMPING: f32 = 0.1;
/// Cycle length when a looping system has no usable duration.
const DEFAULT_CYCLE: f32 = 5.0;

/// Per-instance render data. Dead slots are all zeros.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl ParticleInstance {
    fn from_particle(p: &Particle, to_world: &Affine3A) -> Self {
        let local = Affine3A::from_scale_rotation_translation(p.scale, p.world_rotation(), p.position);
        Self {
            model: Mat4::from(*to_world * local).to_cols_array_2d(),
            color: [p.color.red, p.color.green, p.color.blue, p.color.alpha],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct EmissionState {
    time: f32,
    wait_emitting: f32,
    travel_distance: f32,
    previous_world_pos: Option<Vec3>,
    burst_index: usize,
    ended: bool,
    manual_emit_count: u32,
}

pub struct SolidParticleSystem {
    name: String,
    config: ParticleSystemConfig,
    particles: Vec<Particle>,
    instances: Vec<ParticleInstance>,
    particle_mesh: Option<Mesh>,
    mesh_revision: u32,

    tracks: LifeTracks,
    behaviors: Vec<ParticleBehaviorFn>,
    shape: ShapeEmitter,
    /// `(time, count)` sorted by time.
    bursts: Vec<(f32, u32)>,
    emission: EmissionState,
    emitter_transform: Affine3A,

    started: bool,
    disposed: bool,
    spawned_total: u64,
    pool_exhausted_warned: bool,
}

impl SolidParticleSystem {
    pub fn new(name: impl Into<String>, config: ParticleSystemConfig, particle_mesh: Mesh) -> Self {
        let mut bursts: Vec<(f32, u32)> = config
            .emission_bursts
            .iter()
            .map(|b| {
                let count = b.count.evaluate_constant().max(0.0).round() as u32;
                (b.time.evaluate_constant(), count)
            })
            .collect();
        bursts.sort_by(|a, b| a.0.total_cmp(&b.0));

        let capacity = Self::capacity_for(&config);
        let mut system = Self {
            name: name.into(),
            particles: vec![Particle::default(); capacity],
            instances: vec![ParticleInstance::zeroed(); capacity],
            particle_mesh: Some(particle_mesh),
            mesh_revision: 0,
            tracks: LifeTracks::new(SOLID_LIMIT_DAMPING),
            behaviors: Vec::new(),
            shape: ShapeEmitter::from_config(&config.shape),
            bursts,
            emission: EmissionState::default(),
            emitter_transform: Affine3A::IDENTITY,
            started: false,
            disposed: false,
            spawned_total: 0,
            pool_exhausted_warned: false,
            config,
        };
        system.rebuild_behaviors();
        system
    }

    /// Pool size: the capacity formula over the longest lifetime, plus room
    /// for every burst. Distance emission is sized as if the emitter moved
    /// at one meter per second.
    pub fn capacity_for(config: &ParticleSystemConfig) -> usize {
        let looping = config.target_stop_duration == 0.0;
        let life = config.max_life();
        let per_meter = config
            .emission_over_distance
            .as_ref()
            .map_or(0, |v| solid_capacity(v.evaluate_constant().max(0.0), life, looping));
        solid_capacity(config.emission_rate(), life, looping)
            + config.total_burst_count() as usize
            + per_meter
    }

    /// Instance buffer, one entry per pool slot.
    pub fn instances(&self) -> &[ParticleInstance] {
        &self.instances
    }

    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    pub fn particle_mesh(&self) -> Option<&Mesh> {
        self.particle_mesh.as_ref()
    }

    /// Bumped whenever the particle mesh is replaced.
    pub fn mesh_revision(&self) -> u32 {
        self.mesh_revision
    }

    /// Particles spawned since construction.
    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    pub fn is_emission_ended(&self) -> bool {
        self.emission.ended
    }

    /// Queue `count` spawns for the next tick.
    pub fn emit(&mut self, count: u32) {
        self.emission.manual_emit_count += count;
    }

    /// Swap the instanced mesh and rebuild the pool. A running system is
    /// restarted.
    pub fn replace_particle_mesh(&mut self, mesh: Mesh) {
        if self.disposed {
            return;
        }
        let was_started = self.started;
        self.particle_mesh = Some(mesh);
        self.mesh_revision += 1;
        self.rebuild_pool();
        self.emission = EmissionState::default();
        self.started = false;
        if was_started {
            self.start();
        }
    }

    fn rebuild_pool(&mut self) {
        let capacity = self.particles.len();
        self.particles = vec![Particle::default(); capacity];
        self.instances = vec![ParticleInstance::zeroed(); capacity];
    }

    fn rebuild_behaviors(&mut self) {
        self.tracks = LifeTracks::new(SOLID_LIMIT_DAMPING);
        apply_system_level_solid(&mut self.tracks, &self.config.behaviors);
        self.behaviors = build_per_particle_solid(&self.config.behaviors);
    }

    fn cycle_length(&self) -> f32 {
        if self.config.target_stop_duration > 0.0 {
            self.config.target_stop_duration
        } else if self.config.duration > 0.0 {
            self.config.duration
        } else {
            DEFAULT_CYCLE
        }
    }

    fn is_timed(&self) -> bool {
        self.config.target_stop_duration > 0.0
    }

    fn normalized_time(&self) -> f32 {
        (self.emission.time / self.cycle_length()).clamp(0.0, 1.0)
    }

    fn hide_all(&mut self) {
        for (p, instance) in self.particles.iter_mut().zip(&mut self.instances) {
            if p.alive || p.visible {
                p.kill();
                *instance = ParticleInstance::zeroed();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tick stages
    // -----------------------------------------------------------------------

    /// Count of spawns due this tick and the cycle position they sample,
    /// taken before the clock wraps. Advances emission time.
    fn schedule_emission(&mut self, dt: f32) -> (u32, f32) {
        let mut due = std::mem::take(&mut self.emission.manual_emit_count);
        if self.emission.ended {
            return (due, self.normalized_time());
        }
        self.emission.time += dt;

        let timed = self.is_timed();
        let normalized = self.normalized_time();
        let rate = if timed && self.config.emission_over_time.is_curve() {
            self.config.emission_over_time.evaluate_bezier_at(normalized)
        } else {
            self.config.emission_rate()
        };
        self.emission.wait_emitting += rate.max(0.0) * dt;
        let n = self.emission.wait_emitting.floor();
        self.emission.wait_emitting -= n;
        due += n as u32;

        if let Some(per_meter) = self
            .config
            .emission_over_distance
            .as_ref()
            .map(|v| v.evaluate_constant())
            .filter(|v| *v > 0.0)
        {
            let position = Vec3::from(self.emitter_transform.translation);
            if let Some(previous) = self.emission.previous_world_pos {
                self.emission.travel_distance += position.distance(previous);
            }
            self.emission.previous_world_pos = Some(position);
            let n = (self.emission.travel_distance * per_meter).floor();
            self.emission.travel_distance -= n / per_meter;
            due += n as u32;
        }

        while let Some(&(time, count)) = self.bursts.get(self.emission.burst_index) {
            if time > self.emission.time {
                break;
            }
            due += count;
            self.emission.burst_index += 1;
        }

        let cycle = self.cycle_length();
        if self.emission.time >= cycle {
            if self.config.looping || !timed {
                self.emission.time = self.emission.time.rem_euclid(cycle);
                self.emission.burst_index = 0;
            } else {
                self.emission.ended = true;
            }
        }
        (due, normalized)
    }

    fn spawn(&mut self, normalized: f32) -> bool {
        let Some(index) = self.particles.iter().position(|p| !p.alive) else {
            if !self.pool_exhausted_warned {
                warn!(
                    "Solid particle system '{}' pool exhausted at {} particles; dropping spawns",
                    self.name,
                    self.particles.len()
                );
                self.pool_exhausted_warned = true;
            }
            return false;
        };
        let timed = self.is_timed();
        let config = &self.config;
        let p = &mut self.particles[index];
        p.reset();
        p.alive = true;
        p.visible = true;

        let color = config.start_color.sample(normalized);
        p.color = color;

        let speed = match &config.shape.speed {
            Some(v) => v.sample_spawn(normalized, timed),
            None => config.start_speed.sample_spawn(normalized, timed),
        };
        p.life_time = config.start_life.sample_spawn(normalized, timed);
        let size = config.start_size.sample_spawn(normalized, timed);
        p.scale = Vec3::new(size * config.scale_x, size * config.scale_y, size);

        match config.start_rotation.as_ref().map(|r| r.sample(normalized)) {
            Some(SampledRotation::Euler(angles)) => p.rotation = angles,
            Some(SampledRotation::Orientation(q)) => p.orientation = q,
            None => {}
        }
        p.start = SpawnSnapshot {
            size,
            color,
            speed,
            angular_speed: self.tracks.angular_speed_range.sample(),
        };

        self.shape.initialize_particle(p, speed);
        if !config.is_local {
            p.position = self.emitter_transform.transform_point3(p.position);
            p.velocity = self.emitter_transform.transform_vector3(p.velocity);
            p.orientation = Quat::from_affine3(&self.emitter_transform) * p.orientation;
        }
        self.spawned_total += 1;
        true
    }

    fn update_particles(&mut self, dt: f32) {
        let to_world = self.simulation_to_world();
        let Self {
            particles,
            instances,
            tracks,
            behaviors,
            config,
            ..
        } = self;

        for (p, instance) in particles.iter_mut().zip(instances.iter_mut()) {
            if !p.alive {
                // Zeroed on the transition to dead; nothing to do after that.
                continue;
            }
            let ratio = p.life_ratio();

            if let Some(c) = tracks.color.sample(ratio) {
                let s = p.start.color;
                p.color = LinearRgba::new(c.red * s.red, c.green * s.green, c.blue * s.blue, c.alpha * s.alpha);
            }
            if let Some(factor) = tracks.size.sample(ratio) {
                let size = p.start.size * factor;
                p.scale = Vec3::new(size * config.scale_x, size * config.scale_y, size);
            }
            p.speed_modifier = tracks.velocity.sample_or(ratio, 1.0);
            let angular = tracks.angular_speed.sample_or(ratio, p.start.angular_speed);
            p.rotation.z += angular * dt;
            tracks.limit_speed(p, ratio);

            for behavior in behaviors.iter() {
                behavior(p, dt);
            }

            p.position += p.velocity * dt * p.speed_modifier;

            p.age += dt;
            if p.age >= p.life_time {
                p.kill();
                *instance = ParticleInstance::zeroed();
            } else {
                *instance = ParticleInstance::from_particle(p, &to_world);
            }
        }
    }
}

impl EffectSystem for SolidParticleSystem {
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
        if self.disposed {
            return;
        }
        self.started = true;
        self.emission = EmissionState::default();
        for _ in 0..self.config.pre_warm_cycles {
            self.tick(self.config.pre_warm_step);
        }
    }

    fn stop(&mut self) {
        self.started = false;
        self.hide_all();
    }

    fn reset(&mut self) {
        self.rebuild_pool();
        self.emission = EmissionState::default();
    }

    fn dispose(&mut self) {
        self.started = false;
        self.disposed = true;
        self.particles.clear();
        self.instances.clear();
        self.behaviors.clear();
        self.particle_mesh = None;
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn tick(&mut self, dt: f32) {
        if self.disposed || !self.started {
            return;
        }
        let dt = dt * self.config.speed_factor;

        let (due, normalized) = self.schedule_emission(dt);
        for _ in 0..due {
            if !self.spawn(normalized) {
                break;
            }
        }

        self.update_particles(dt);

        if self.emission.ended && self.live_count() == 0 && self.config.dispose_on_stop {
            self.stop();
            self.dispose();
        }
    }

    fn set_emitter_transform(&mut self, world: Affine3A) {
        self.emitter_transform = world;
    }

    fn simulation_to_world(&self) -> Affine3A {
        if self.config.is_local {
            self.emitter_transform
        } else {
            Affine3A::IDENTITY
        }
    }

    fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn capacity(&self) -> usize {
        self.particles.len()
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
