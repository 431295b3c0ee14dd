//! Builds the runtime node arena from converted effect data.

pub mod geometry;
pub mod material;

use bevy::prelude::*;
use quarks_particles::{
    BillboardSystem, ParticleSystem, ParticleSystemConfig, SolidParticleSystem, SystemKind,
};

use crate::convert::{EffectData, EmitterData, GroupData, ObjectData};
use crate::effect::{EffectNode, EmitterNode, NodeId, NodeKind, unique_name};
pub use geometry::GeometryFactory;
pub use material::{MaterialDescriptor, MaterialFactory, TextureDescriptor};

pub struct NodeFactory<'a> {
    materials: MaterialFactory<'a>,
    geometries: GeometryFactory<'a>,
    data: &'a EffectData,
}

impl<'a> NodeFactory<'a> {
    pub fn new(data: &'a EffectData, root_url: &'a str) -> Self {
        Self {
            materials: MaterialFactory::new(data, root_url),
            geometries: GeometryFactory::new(data),
            data,
        }
    }

    /// Depth-first walk of the converted graph. The root is always entry 0;
    /// without a root object an empty "Root" group stands in.
    pub fn create(&self) -> Vec<EffectNode> {
        let mut nodes = Vec::new();
        match &self.data.root {
            Some(root) => self.create_node(&mut nodes, root, None, Vec3::ONE),
            None => {
                warn!("Effect has no root object, creating an empty root group");
                nodes.push(EffectNode::group(
                    format!("root_{:08x}", fastrand::u32(..)),
                    "Root".to_string(),
                    Transform::IDENTITY,
                    None,
                ));
            }
        }
        nodes
    }

    fn create_node(
        &self,
        nodes: &mut Vec<EffectNode>,
        object: &ObjectData,
        parent: Option<NodeId>,
        parent_scale: Vec3,
    ) {
        let id = NodeId(nodes.len());
        if let Some(parent) = parent {
            nodes[parent.0].children.push(id);
        }

        match object {
            ObjectData::Group(GroupData {
                uuid,
                name,
                transform,
                children,
            }) => {
                let name = unique_name(nodes, name);
                debug!("Creating group {name}");
                nodes.push(EffectNode::group(uuid.clone(), name, *transform, parent));
                let scale = parent_scale * transform.scale;
                for child in children {
                    self.create_node(nodes, child, Some(id), scale);
                }
            }
            ObjectData::Emitter(EmitterData {
                uuid,
                name,
                transform,
                config,
                material_id,
                ..
            }) => {
                let name = unique_name(nodes, name);
                let emitter =
                    self.build_emitter(&name, config.clone(), material_id.as_deref(), parent_scale);
                debug!("Creating {} system {name}", emitter.system.kind().label());
                nodes.push(EffectNode {
                    uuid: uuid.clone(),
                    name,
                    transform: *transform,
                    parent,
                    children: Vec::new(),
                    kind: NodeKind::Particle(Box::new(emitter)),
                });
            }
        }
    }

    /// Create a backend for `config`. A resolved material's blend mode wins
    /// over the config's; without a material the config's is kept.
    pub fn build_emitter(
        &self,
        name: &str,
        mut config: ParticleSystemConfig,
        material_id: Option<&str>,
        parent_scale: Vec3,
    ) -> EmitterNode {
        let mut material = self.materials.resolve(material_id, name);
        if let Some(mode) = config.blend_mode.filter(|_| material_id.is_none()) {
            material.blend_mode = mode;
        }
        config.blend_mode = Some(material.blend_mode);

        let system: ParticleSystem = match config.kind {
            SystemKind::Billboard => BillboardSystem::new(name, config, parent_scale).into(),
            SystemKind::Solid => {
                let mesh = self.geometries.create_particle_mesh(&config, name);
                SolidParticleSystem::new(name, config, mesh).into()
            }
        };
        EmitterNode { system, material }
    }
}
