//! Materials, textures, images, and geometries.
//!
//! Resource lists are converted item by item: a malformed entry is logged
//! and skipped while the rest of the list still converts.

use bevy::prelude::*;
use quarks_particles::BlendMode;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use super::ConvertError;
use super::transform::{flip_winding, flip_z_components};
use super::value::{hex_to_linear, parse_hex};
use crate::format::{RawAttribute, RawGeometry, RawImage, RawMaterial, RawTexture};

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub uuid: String,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub color: Option<LinearRgba>,
    /// Texture id.
    pub map: Option<String>,
    pub blending: Option<BlendMode>,
    pub transparent: bool,
    pub depth_write: bool,
    /// 0 = front, 1 = back, 2 = double sided.
    pub side: u32,
}

impl TryFrom<RawMaterial> for MaterialData {
    type Error = ConvertError;

    fn try_from(raw: RawMaterial) -> Result<Self, Self::Error> {
        let color = match &raw.color {
            None | Some(Json::Null) => None,
            Some(color) => Some(
                parse_hex(color)
                    .map(hex_to_linear)
                    .ok_or_else(|| ConvertError::invalid("material color", color))?,
            ),
        };
        Ok(Self {
            blending: raw.blending.and_then(|b| blend_mode(b, &raw.uuid)),
            uuid: raw.uuid,
            name: raw.name,
            kind: raw.kind,
            color,
            map: raw.map,
            transparent: raw.transparent.unwrap_or(false),
            depth_write: raw.depth_write.unwrap_or(true),
            side: raw.side.unwrap_or(0),
        })
    }
}

fn blend_mode(blending: u32, material: &str) -> Option<BlendMode> {
    match blending {
        0 => Some(BlendMode::Opaque),
        1 => Some(BlendMode::Alpha),
        2 => Some(BlendMode::Additive),
        other => {
            warn!("Material {material}: unsupported blending {other}, using the default");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Textures
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    #[default]
    Clamp,
    Mirror,
}

impl WrapMode {
    fn from_three(code: u32) -> Self {
        match code {
            1000 => Self::Repeat,
            1002 => Self::Mirror,
            _ => Self::Clamp,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplingMode {
    Nearest,
    Bilinear,
    #[default]
    Trilinear,
}

impl SamplingMode {
    /// Minification filter decides; the magnification filter is only a
    /// fallback.
    fn from_filters(min_filter: Option<u32>, mag_filter: Option<u32>) -> Self {
        match (min_filter, mag_filter) {
            (Some(1008 | 1009), _) => Self::Trilinear,
            (Some(1006 | 1007), _) => Self::Bilinear,
            (Some(_), _) => Self::Nearest,
            (None, Some(1006)) => Self::Bilinear,
            (None, Some(_)) => Self::Nearest,
            (None, None) => Self::Trilinear,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub uuid: String,
    pub name: Option<String>,
    /// Image id.
    pub image: Option<String>,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub uv_scale: Vec2,
    pub uv_offset: Vec2,
    pub uv_rotation: f32,
    pub sampling: SamplingMode,
    pub flip_y: bool,
    pub generate_mipmaps: bool,
    pub channel: u32,
}

impl From<RawTexture> for TextureData {
    fn from(raw: RawTexture) -> Self {
        let wrap = raw.wrap.unwrap_or_default();
        let pair = |v: Option<Vec<f32>>, fallback: f32| {
            v.map_or(Vec2::splat(fallback), |v| {
                Vec2::new(
                    v.first().copied().unwrap_or(fallback),
                    v.get(1).copied().unwrap_or(fallback),
                )
            })
        };
        Self {
            uuid: raw.uuid,
            name: raw.name,
            image: raw.image,
            wrap_u: wrap.first().copied().map(WrapMode::from_three).unwrap_or_default(),
            wrap_v: wrap.get(1).copied().map(WrapMode::from_three).unwrap_or_default(),
            uv_scale: pair(raw.repeat, 1.0),
            uv_offset: pair(raw.offset, 0.0),
            uv_rotation: raw.rotation.unwrap_or(0.0),
            sampling: SamplingMode::from_filters(raw.min_filter, raw.mag_filter),
            flip_y: raw.flip_y.unwrap_or(true),
            generate_mipmaps: raw.generate_mipmaps.unwrap_or(true),
            channel: raw.channel.unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub uuid: String,
    pub url: Option<String>,
}

impl From<RawImage> for ImageData {
    fn from(raw: RawImage) -> Self {
        Self {
            uuid: raw.uuid,
            url: raw.url.filter(|u| !u.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometries
// ---------------------------------------------------------------------------

/// Vertex data already in left-handed space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferGeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Option<Vec<u32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GeometryKind {
    Plane { width: f32, height: f32 },
    Buffer(BufferGeometryData),
    /// Carried so references still resolve; builds an empty mesh.
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeometryData {
    pub uuid: String,
    pub kind: GeometryKind,
}

impl TryFrom<RawGeometry> for GeometryData {
    type Error = ConvertError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_str() {
            "PlaneGeometry" | "PlaneBufferGeometry" => GeometryKind::Plane {
                width: raw.width.unwrap_or(1.0),
                height: raw.height.unwrap_or(1.0),
            },
            "BufferGeometry" => {
                let data = raw.data.unwrap_or_default();
                let attributes = data.attributes;
                let mut indices = data.index.map(|i| i.array);
                if let Some(indices) = indices.as_mut() {
                    flip_winding(indices);
                }
                GeometryKind::Buffer(BufferGeometryData {
                    positions: attributes
                        .position
                        .map(|a| vec3_attribute(a, "position"))
                        .transpose()?
                        .unwrap_or_default(),
                    normals: attributes
                        .normal
                        .map(|a| vec3_attribute(a, "normal"))
                        .transpose()?,
                    uvs: attributes.uv.map(uv_attribute),
                    colors: attributes.color.map(color_attribute),
                    indices,
                })
            }
            other => {
                debug!("Geometry {}: unsupported type {other:?}", raw.uuid);
                GeometryKind::Unknown(other.to_string())
            }
        };
        Ok(Self {
            uuid: raw.uuid,
            kind,
        })
    }
}

/// Flip Z and pack into triples.
fn vec3_attribute(
    mut attribute: RawAttribute,
    name: &'static str,
) -> Result<Vec<[f32; 3]>, ConvertError> {
    if attribute.item_size < 3 {
        return Err(ConvertError::Attribute {
            name,
            item_size: attribute.item_size,
        });
    }
    flip_z_components(&mut attribute.array, attribute.item_size);
    Ok(attribute
        .array
        .chunks_exact(attribute.item_size)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn uv_attribute(attribute: RawAttribute) -> Vec<[f32; 2]> {
    let size = attribute.item_size.max(1);
    attribute
        .array
        .chunks_exact(size)
        .map(|c| [c[0], c.get(1).copied().unwrap_or(0.0)])
        .collect()
}

fn color_attribute(attribute: RawAttribute) -> Vec<[f32; 4]> {
    let size = attribute.item_size.max(1);
    let scale = if attribute.normalized { 1.0 / 255.0 } else { 1.0 };
    attribute
        .array
        .chunks_exact(size)
        .map(|c| {
            let channel = |i: usize, fallback: f32| c.get(i).map_or(fallback, |v| v * scale);
            [
                channel(0, 0.0),
                channel(1, 0.0),
                channel(2, 0.0),
                channel(3, 1.0),
            ]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// List conversion
// ---------------------------------------------------------------------------

/// Convert every entry of a resource list, dropping the ones that fail.
pub(crate) fn convert_list<R, T>(
    items: &[Json],
    what: &'static str,
    convert: impl Fn(R) -> Result<T, ConvertError>,
) -> Vec<T>
where
    R: DeserializeOwned,
{
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let result = serde_json::from_value::<R>(item.clone())
                .map_err(|source| ConvertError::Schema { what, source })
                .and_then(&convert);
            match result {
                Ok(converted) => Some(converted),
                Err(e) => {
                    error!("Skipping {what} #{i}: {e}");
                    None
                }
            }
        })
        .collect()
}
