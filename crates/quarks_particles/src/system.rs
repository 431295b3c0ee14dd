//! Common control surface over both particle backends.

use bevy::math::Affine3A;

use crate::billboard::BillboardSystem;
use crate::data::{Behavior, ParticleSystemConfig, SystemKind};
use crate::particle::Particle;
use crate::solid::SolidParticleSystem;

/// Lifecycle and simulation interface shared by every backend.
///
/// `tick` is driven by the host once per frame. `stop` hides live particles
/// without deallocating them, `reset` also clears emission state, and
/// `dispose` releases everything and may be called more than once.
pub trait EffectSystem: Send + Sync {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn config(&self) -> &ParticleSystemConfig;

    fn start(&mut self);
    fn stop(&mut self);
    fn reset(&mut self);
    fn dispose(&mut self);
    fn is_started(&self) -> bool;
    fn is_disposed(&self) -> bool;

    fn tick(&mut self, dt: f32);

    /// World transform of the emitter node, refreshed before each tick.
    fn set_emitter_transform(&mut self, world: Affine3A);
    /// Maps particle positions into world space.
    fn simulation_to_world(&self) -> Affine3A;

    /// Particle storage; only entries with `alive` set are simulated.
    fn particles(&self) -> &[Particle];
    fn capacity(&self) -> usize;

    fn live_count(&self) -> usize {
        self.particles().iter().filter(|p| p.alive).count()
    }

    /// Replace the behavior list and rebuild tracks and closures from it.
    fn set_behaviors(&mut self, behaviors: Vec<Behavior>);
    fn add_behavior(&mut self, behavior: Behavior);
}

/// A runtime system of either backend.
pub enum ParticleSystem {
    Billboard(BillboardSystem),
    Solid(SolidParticleSystem),
}

impl ParticleSystem {
    pub fn kind(&self) -> SystemKind {
        match self {
            ParticleSystem::Billboard(_) => SystemKind::Billboard,
            ParticleSystem::Solid(_) => SystemKind::Solid,
        }
    }

    pub fn system(&self) -> &dyn EffectSystem {
        match self {
            ParticleSystem::Billboard(s) => s,
            ParticleSystem::Solid(s) => s,
        }
    }

    pub fn system_mut(&mut self) -> &mut dyn EffectSystem {
        match self {
            ParticleSystem::Billboard(s) => s,
            ParticleSystem::Solid(s) => s,
        }
    }

    pub fn as_billboard(&self) -> Option<&BillboardSystem> {
        match self {
            ParticleSystem::Billboard(s) => Some(s),
            ParticleSystem::Solid(_) => None,
        }
    }

    pub fn as_solid(&self) -> Option<&SolidParticleSystem> {
        match self {
            ParticleSystem::Solid(s) => Some(s),
            ParticleSystem::Billboard(_) => None,
        }
    }

    pub fn as_solid_mut(&mut self) -> Option<&mut SolidParticleSystem> {
        match self {
            ParticleSystem::Solid(s) => Some(s),
            ParticleSystem::Billboard(_) => None,
        }
    }
}

impl From<BillboardSystem> for ParticleSystem {
    fn from(system: BillboardSystem) -> Self {
        ParticleSystem::Billboard(system)
    }
}

impl From<SolidParticleSystem> for ParticleSystem {
    fn from(system: SolidParticleSystem) -> Self {
        ParticleSystem::Solid(system)
    }
}
