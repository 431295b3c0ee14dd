//! Particle mesh creation for the solid backend.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use quarks_particles::ParticleSystemConfig;

use crate::convert::{BufferGeometryData, EffectData, GeometryKind};

pub struct GeometryFactory<'a> {
    data: &'a EffectData,
}

impl<'a> GeometryFactory<'a> {
    pub fn new(data: &'a EffectData) -> Self {
        Self { data }
    }

    /// Mesh instanced by each particle. Without an `instancing_geometry`
    /// reference this is a unit quad; a dangling reference gives an empty
    /// mesh.
    pub fn create_particle_mesh(&self, config: &ParticleSystemConfig, owner: &str) -> Mesh {
        let Some(id) = config.instancing_geometry.as_deref() else {
            return Mesh::from(Rectangle::new(1.0, 1.0));
        };
        let Some(geometry) = self.data.geometry(id) else {
            warn!("{owner}: geometry {id} not found, using an empty mesh");
            return empty_mesh();
        };
        match &geometry.kind {
            GeometryKind::Plane { width, height } => Mesh::from(Rectangle::new(*width, *height)),
            GeometryKind::Buffer(buffer) => buffer_mesh(buffer),
            GeometryKind::Unknown(kind) => {
                warn!("{owner}: geometry {id} has unsupported type {kind}, using an empty mesh");
                empty_mesh()
            }
        }
    }
}

pub fn empty_mesh() -> Mesh {
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, Vec::<[f32; 3]>::new())
}

/// Build a mesh from converted vertex data. UVs move from a bottom-left to a
/// top-left origin.
fn buffer_mesh(buffer: &BufferGeometryData) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, buffer.positions.clone());

    if let Some(uvs) = &buffer.uvs {
        let uvs: Vec<[f32; 2]> = uvs.iter().map(|[u, v]| [*u, 1.0 - v]).collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    }
    if let Some(colors) = &buffer.colors {
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors.clone());
    }
    if let Some(indices) = &buffer.indices {
        mesh.insert_indices(Indices::U32(indices.clone()));
    }

    match &buffer.normals {
        Some(normals) => mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals.clone()),
        None if !buffer.positions.is_empty() => mesh.compute_normals(),
        None => {}
    }
    mesh
}
