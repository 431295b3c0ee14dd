//! # quarks_particles
//!
//! CPU particle simulation core for three.quarks effects.
//!
//! The crate knows nothing about JSON or the Bevy world. It takes a fully
//! resolved [`ParticleSystemConfig`] and runs it on one of two backends:
//!
//! - [`BillboardSystem`]: a thin wrapper over [`NativeParticleSystem`], a
//!   declarative sprite updater with built-in gradient tracks. Per-particle
//!   behaviors run as a post-update hook.
//! - [`SolidParticleSystem`]: a custom loop over a fixed pool of
//!   mesh-instanced particles with its own emission scheduler.
//!
//! Both are driven through the [`EffectSystem`] trait.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use quarks_particles::{presets, BillboardSystem, EffectSystem};
//!
//! let config = presets::preset("Sparks").unwrap_or_default();
//! let mut system = BillboardSystem::new("sparks", config, Vec3::ONE);
//! system.start();
//! system.tick(1.0 / 60.0);
//! ```

pub mod behavior;
pub mod billboard;
pub mod data;
pub mod gradient;
pub mod particle;
pub mod presets;
pub mod shape;
pub mod solid;
pub mod system;
pub mod value;

// Re-export core types
pub use behavior::{LifeTracks, ParticleBehaviorFn};
pub use billboard::{BillboardSystem, NativeParticleSystem};
pub use data::*;
pub use gradient::{ColorGradient, Gradient, GradientKey, Lerp, NumberGradient};
pub use particle::{Particle, billboard_capacity, solid_capacity};
pub use shape::ShapeEmitter;
pub use solid::{ParticleInstance, SolidParticleSystem};
pub use system::{EffectSystem, ParticleSystem};
pub use value::{BezierSegment, MinMaxGradient, Value, ValueRange};
