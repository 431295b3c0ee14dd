//! Raw three.quarks JSON schema.
//!
//! Only the document skeleton is typed strictly. Objects, resources, and
//! every polymorphic property (values, colors, rotations, behaviors) stay as
//! [`serde_json::Value`] so the converter can reject one subtree without
//! losing its siblings.

use serde::Deserialize;
use serde_json::Value as Json;

/// Top-level document.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawDocument {
    pub metadata: Option<RawMetadata>,
    pub geometries: Vec<Json>,
    pub materials: Vec<Json>,
    pub textures: Vec<Json>,
    pub images: Vec<Json>,
    pub object: Option<Json>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawMetadata {
    pub version: Option<f32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub generator: Option<String>,
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// A `Group` or `ParticleEmitter` node.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawObject {
    pub uuid: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub matrix: Option<Vec<f32>>,
    pub position: Option<Vec<f32>>,
    pub rotation: Option<Vec<f32>>,
    pub scale: Option<Vec<f32>>,
    pub children: Vec<Json>,
    pub ps: Option<Json>,
}

/// Emitter configuration (`ps` block).
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEmitterConfig {
    pub version: Option<String>,
    pub auto_destroy: Option<bool>,
    pub looping: Option<bool>,
    pub prewarm: Option<bool>,
    pub duration: Option<f32>,
    pub shape: Option<RawShape>,
    pub start_life: Option<Json>,
    pub start_speed: Option<Json>,
    pub start_rotation: Option<Json>,
    pub start_size: Option<Json>,
    pub start_color: Option<Json>,
    pub emission_over_time: Option<Json>,
    pub emission_over_distance: Option<Json>,
    pub emission_bursts: Vec<RawBurst>,
    pub only_used_by_other: Option<bool>,
    pub instancing_geometry: Option<String>,
    pub render_order: Option<i32>,
    pub render_mode: Option<u32>,
    pub renderer_emitter_settings: Option<RawRendererSettings>,
    pub material: Option<String>,
    pub layers: Option<u32>,
    pub start_tile_index: Option<Json>,
    pub u_tile_count: Option<u32>,
    pub v_tile_count: Option<u32>,
    pub blend_tiles: Option<bool>,
    pub soft_particles: Option<bool>,
    pub behaviors: Vec<Json>,
    pub world_space: Option<bool>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawRendererSettings {
    pub speed_factor: Option<f32>,
    pub length_factor: Option<f32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawShape {
    #[serde(rename = "type")]
    pub kind: String,
    pub radius: Option<f32>,
    pub arc: Option<f32>,
    pub thickness: Option<f32>,
    pub angle: Option<f32>,
    pub mode: Option<u32>,
    pub spread: Option<f32>,
    pub speed: Option<Json>,
    pub size: Option<Vec<f32>>,
    pub height: Option<f32>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawBurst {
    pub time: Json,
    pub count: Json,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMaterial {
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    /// Hex number or `"#rrggbb"` string.
    pub color: Option<Json>,
    pub map: Option<String>,
    pub blending: Option<u32>,
    pub side: Option<u32>,
    pub transparent: Option<bool>,
    pub depth_write: Option<bool>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTexture {
    pub uuid: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub mapping: Option<u32>,
    pub wrap: Option<Vec<u32>>,
    pub repeat: Option<Vec<f32>>,
    pub offset: Option<Vec<f32>>,
    pub rotation: Option<f32>,
    pub min_filter: Option<u32>,
    pub mag_filter: Option<u32>,
    pub flip_y: Option<bool>,
    pub generate_mipmaps: Option<bool>,
    pub format: Option<u32>,
    pub channel: Option<u32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawImage {
    pub uuid: String,
    pub url: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawGeometry {
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub data: Option<RawGeometryData>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawGeometryData {
    pub attributes: RawAttributes,
    pub index: Option<RawIndex>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RawAttributes {
    pub position: Option<RawAttribute>,
    pub normal: Option<RawAttribute>,
    pub uv: Option<RawAttribute>,
    pub color: Option<RawAttribute>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawAttribute {
    pub item_size: usize,
    #[serde(default)]
    pub normalized: bool,
    pub array: Vec<f32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct RawIndex {
    pub array: Vec<u32>,
}
