//! # bevy_quarks
//!
//! Import and play three.quarks particle effects in Bevy.
//!
//! A three.quarks JSON document is converted once into a left-handed effect
//! graph ([`EffectData`]), then instantiated into a runtime [`Effect`] whose
//! emitters run on the CPU backends of `quarks_particles`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_quarks::{QuarksEffect, QuarksPlugin};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(QuarksPlugin::default())
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(mut commands: Commands, asset_server: Res<AssetServer>) {
//!     commands.spawn((
//!         QuarksEffect::new(asset_server.load("effects/fire.quarks.json")),
//!         Transform::from_xyz(0.0, 1.0, 0.0),
//!     ));
//! }
//! ```
//!
//! ## Without Bevy's app
//!
//! [`parse_effect`] builds an [`Effect`] straight from a JSON string. Drive it
//! with [`Effect::tick`] and read particles from each system.

pub mod convert;
pub mod effect;
pub mod factory;
pub mod format;
pub mod loader;
pub mod runtime;
pub mod settings;

use bevy::prelude::*;

// Re-export the simulation crate
pub use quarks_particles;

// Re-export conversion and effect types
pub use convert::{ConvertError, DataConverter, EffectData};
pub use effect::{Effect, EffectNode, EmitterNode, NodeId, NodeKind};
pub use factory::{MaterialDescriptor, NodeFactory, TextureDescriptor};

// Re-export loading
pub use loader::{
    QuarksEffectAsset, QuarksEffectLoader, QuarksError, QuarksLoaderError, load_effect_file,
    parse_effect,
};

// Re-export runtime types
pub use runtime::{ControlAction, ControlTarget, EffectControl, EffectInstance, QuarksEffect};
pub use settings::{QuarksSettings, ViewerSettings};

/// Registers the effect asset, its loader, and the runtime systems.
#[derive(Default)]
pub struct QuarksPlugin {
    pub settings: QuarksSettings,
}

impl Plugin for QuarksPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<quarks_particles::SystemKind>()
            .register_type::<quarks_particles::BillboardMode>()
            .register_type::<quarks_particles::BlendMode>()
            .register_type::<quarks_particles::EulerOrder>()
            .register_type::<quarks_particles::ShapeKind>()
            .init_asset::<QuarksEffectAsset>()
            .init_asset_loader::<QuarksEffectLoader>()
            .insert_resource(self.settings.clone())
            .init_resource::<runtime::QuarksRenderAssets>()
            .add_message::<EffectControl>()
            .add_systems(
                Update,
                (
                    runtime::reload_modified_effects,
                    runtime::instantiate_effects,
                    runtime::handle_effect_control,
                    runtime::tick_effects,
                    runtime::sync_particle_entities,
                )
                    .chain(),
            );
    }
}
