//! Material and texture resolution.
//!
//! Produces plain descriptors; the runtime turns them into
//! `StandardMaterial`s and loads the images through the asset server.

use bevy::image::{ImageAddressMode, ImageFilterMode, ImageSamplerDescriptor};
use bevy::math::Affine2;
use bevy::prelude::*;
use quarks_particles::BlendMode;

use crate::convert::{EffectData, MaterialData, SamplingMode, TextureData, WrapMode};

/// Image to load plus how to sample it.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDescriptor {
    /// Asset path, already joined with the effect's root URL.
    pub path: String,
    pub sampler: ImageSamplerDescriptor,
    pub uv_transform: Affine2,
    pub flip_y: bool,
    pub generate_mipmaps: bool,
    pub channel: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescriptor {
    pub name: String,
    pub base_color: LinearRgba,
    pub texture: Option<TextureDescriptor>,
    pub blend_mode: BlendMode,
    pub double_sided: bool,
    pub depth_write: bool,
    pub unlit: bool,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: LinearRgba::WHITE,
            texture: None,
            blend_mode: BlendMode::Alpha,
            double_sided: true,
            depth_write: false,
            unlit: true,
        }
    }
}

impl MaterialDescriptor {
    pub fn alpha_mode(&self) -> AlphaMode {
        match self.blend_mode {
            BlendMode::Opaque => AlphaMode::Opaque,
            BlendMode::Alpha => AlphaMode::Blend,
            BlendMode::Additive => AlphaMode::Add,
        }
    }
}

pub struct MaterialFactory<'a> {
    data: &'a EffectData,
    root_url: &'a str,
}

impl<'a> MaterialFactory<'a> {
    pub fn new(data: &'a EffectData, root_url: &'a str) -> Self {
        Self { data, root_url }
    }

    /// Resolve an emitter's material reference. A missing reference falls
    /// back to the default unlit descriptor.
    pub fn resolve(&self, material_id: Option<&str>, owner: &str) -> MaterialDescriptor {
        let Some(id) = material_id else {
            return MaterialDescriptor::default();
        };
        let Some(material) = self.data.material(id) else {
            warn!("{owner}: material {id} not found, using the default material");
            return MaterialDescriptor::default();
        };
        self.describe(material, owner)
    }

    fn describe(&self, material: &MaterialData, owner: &str) -> MaterialDescriptor {
        let lit = matches!(
            material.kind.as_deref(),
            Some("MeshStandardMaterial" | "MeshPhysicalMaterial" | "MeshLambertMaterial" | "MeshPhongMaterial")
        );
        MaterialDescriptor {
            name: material
                .name
                .clone()
                .unwrap_or_else(|| material.uuid.clone()),
            base_color: material.color.unwrap_or(LinearRgba::WHITE),
            texture: material
                .map
                .as_deref()
                .and_then(|id| self.create_texture(id, owner)),
            blend_mode: Self::blend_mode(material),
            double_sided: material.side != 0,
            depth_write: material.depth_write,
            unlit: !lit,
        }
    }

    /// Normal blending only blends when the material is transparent.
    pub fn blend_mode(material: &MaterialData) -> BlendMode {
        match (material.blending, material.transparent) {
            (Some(BlendMode::Additive), _) => BlendMode::Additive,
            (Some(BlendMode::Opaque), _) | (_, false) => BlendMode::Opaque,
            (_, true) => BlendMode::Alpha,
        }
    }

    pub fn create_texture(&self, texture_id: &str, owner: &str) -> Option<TextureDescriptor> {
        let Some(texture) = self.data.texture(texture_id) else {
            warn!("{owner}: texture {texture_id} not found");
            return None;
        };
        let Some(image_id) = texture.image.as_deref() else {
            warn!("{owner}: texture {texture_id} has no image");
            return None;
        };
        let Some(url) = self.data.image(image_id).and_then(|i| i.url.as_deref()) else {
            warn!("{owner}: image {image_id} not found");
            return None;
        };
        let path = resolve_url(self.root_url, url)?;
        Some(TextureDescriptor {
            path,
            sampler: sampler_descriptor(texture),
            uv_transform: Affine2::from_scale_angle_translation(
                texture.uv_scale,
                -texture.uv_rotation,
                texture.uv_offset,
            ),
            flip_y: texture.flip_y,
            generate_mipmaps: texture.generate_mipmaps,
            channel: texture.channel,
        })
    }
}

/// Join a relative image URL onto the effect's root. Inline `data:` images
/// are not supported and resolve to `None`.
pub fn resolve_url(root_url: &str, url: &str) -> Option<String> {
    if url.starts_with("data:") {
        warn!("Inline data URL images are not supported, skipping texture");
        return None;
    }
    if root_url.is_empty() || url.contains("://") || url.starts_with('/') {
        return Some(url.to_string());
    }
    let url = url.trim_start_matches("./");
    Some(format!("{}/{url}", root_url.trim_end_matches('/')))
}

pub fn sampler_descriptor(texture: &TextureData) -> ImageSamplerDescriptor {
    let address = |wrap: WrapMode| match wrap {
        WrapMode::Repeat => ImageAddressMode::Repeat,
        WrapMode::Clamp => ImageAddressMode::ClampToEdge,
        WrapMode::Mirror => ImageAddressMode::MirrorRepeat,
    };
    let (filter, mipmap_filter) = match texture.sampling {
        SamplingMode::Nearest => (ImageFilterMode::Nearest, ImageFilterMode::Nearest),
        SamplingMode::Bilinear => (ImageFilterMode::Linear, ImageFilterMode::Nearest),
        SamplingMode::Trilinear => (ImageFilterMode::Linear, ImageFilterMode::Linear),
    };
    ImageSamplerDescriptor {
        address_mode_u: address(texture.wrap_u),
        address_mode_v: address(texture.wrap_v),
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        ..ImageSamplerDescriptor::default()
    }
}
