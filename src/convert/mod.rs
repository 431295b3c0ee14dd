//! One-pass translation of a raw three.quarks document into the effect graph.
//!
//! All handedness conversion happens here. Each group or emitter subtree is
//! converted on its own: a failure is logged and drops that subtree only.

pub mod behavior;
pub mod resources;
pub mod transform;
pub mod value;

use std::f32::consts::FRAC_PI_4;

use bevy::prelude::*;
use quarks_particles::{
    BillboardMode, EmissionBurst, ParticleSystemConfig, ShapeConfig, ShapeKind, SpriteSheet,
    SystemKind, Value,
};
use serde_json::Value as Json;
use thiserror::Error;

use crate::format::{
    RawDocument, RawEmitterConfig, RawGeometry, RawImage, RawMaterial, RawObject, RawShape,
    RawTexture,
};
pub use behavior::convert_behavior;
pub use resources::{
    BufferGeometryData, GeometryData, GeometryKind, ImageData, MaterialData, SamplingMode,
    TextureData, WrapMode,
};
pub use transform::{convert_transform, mirror_z, to_simulation_space};
pub use value::{convert_color, convert_rotation, convert_value};

/// Why a subtree or resource entry was dropped.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid {what}: {source}")]
    Schema {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
    #[error("{name} attribute needs 3 components per item, got {item_size}")]
    Attribute { name: &'static str, item_size: usize },
    #[error("emitter {0:?} has no particle system config")]
    MissingConfig(String),
}

impl ConvertError {
    pub(crate) fn invalid(what: &'static str, value: &Json) -> Self {
        Self::Invalid {
            what,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Converted graph
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct GroupData {
    pub uuid: String,
    pub name: String,
    pub transform: Transform,
    pub children: Vec<ObjectData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmitterData {
    pub uuid: String,
    pub name: String,
    pub transform: Transform,
    pub config: ParticleSystemConfig,
    pub material_id: Option<String>,
    pub parent_uuid: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectData {
    Group(GroupData),
    Emitter(EmitterData),
}

impl ObjectData {
    pub fn uuid(&self) -> &str {
        match self {
            ObjectData::Group(g) => &g.uuid,
            ObjectData::Emitter(e) => &e.uuid,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ObjectData::Group(g) => &g.name,
            ObjectData::Emitter(e) => &e.name,
        }
    }

    pub fn transform(&self) -> &Transform {
        match self {
            ObjectData::Group(g) => &g.transform,
            ObjectData::Emitter(e) => &e.transform,
        }
    }
}

/// Normalized effect description, ready for the node factory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectData {
    pub root: Option<ObjectData>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<TextureData>,
    pub images: Vec<ImageData>,
    pub geometries: Vec<GeometryData>,
    pub group_count: usize,
    pub emitter_count: usize,
}

impl EffectData {
    pub fn material(&self, uuid: &str) -> Option<&MaterialData> {
        self.materials.iter().find(|m| m.uuid == uuid)
    }

    pub fn texture(&self, uuid: &str) -> Option<&TextureData> {
        self.textures.iter().find(|t| t.uuid == uuid)
    }

    pub fn image(&self, uuid: &str) -> Option<&ImageData> {
        self.images.iter().find(|i| i.uuid == uuid)
    }

    pub fn geometry(&self, uuid: &str) -> Option<&GeometryData> {
        self.geometries.iter().find(|g| g.uuid == uuid)
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DataConverter {
    groups: usize,
    emitters: usize,
}

impl DataConverter {
    pub fn convert(document: &RawDocument) -> EffectData {
        let mut converter = Self::default();

        let root = document.object.as_ref().and_then(|object| {
            converter
                .convert_object(object, None, 0)
                .unwrap_or_else(|e| {
                    error!("Failed to convert root object: {e}");
                    None
                })
        });

        let data = EffectData {
            root,
            materials: resources::convert_list(&document.materials, "material", |m: RawMaterial| {
                MaterialData::try_from(m)
            }),
            textures: resources::convert_list(&document.textures, "texture", |t: RawTexture| {
                Ok(TextureData::from(t))
            }),
            images: resources::convert_list(&document.images, "image", |i: RawImage| {
                Ok(ImageData::from(i))
            }),
            geometries: resources::convert_list(
                &document.geometries,
                "geometry",
                |g: RawGeometry| GeometryData::try_from(g),
            ),
            group_count: converter.groups,
            emitter_count: converter.emitters,
        };

        info!(
            "Converted effect: {} groups, {} emitters, {} materials, {} textures, {} images, {} geometries",
            data.group_count,
            data.emitter_count,
            data.materials.len(),
            data.textures.len(),
            data.images.len(),
            data.geometries.len()
        );
        data
    }

    /// `Ok(None)` for node types that have no counterpart (meshes, lights).
    fn convert_object(
        &mut self,
        json: &Json,
        parent_uuid: Option<&str>,
        depth: usize,
    ) -> Result<Option<ObjectData>, ConvertError> {
        let raw: RawObject = serde_json::from_value(json.clone())
            .map_err(|source| ConvertError::Schema { what: "object", source })?;
        let transform = convert_transform(
            raw.matrix.as_deref(),
            raw.position.as_deref(),
            raw.rotation.as_deref(),
            raw.scale.as_deref(),
        );
        let indent = "  ".repeat(depth);

        match raw.kind.as_str() {
            "Group" => {
                let uuid = raw.uuid.unwrap_or_else(|| format!("group_{}", self.groups));
                self.groups += 1;
                let mut children = Vec::with_capacity(raw.children.len());
                for child in &raw.children {
                    match self.convert_object(child, Some(&uuid), depth + 1) {
                        Ok(Some(object)) => children.push(object),
                        Ok(None) => {}
                        Err(e) => error!("{indent}Skipping child of group {uuid}: {e}"),
                    }
                }
                let name = raw.name.unwrap_or_else(|| "Group".to_string());
                debug!("{indent}Group {name} ({uuid}), {} children", children.len());
                Ok(Some(ObjectData::Group(GroupData {
                    uuid,
                    name,
                    transform,
                    children,
                })))
            }
            "ParticleEmitter" => {
                let uuid = raw.uuid.unwrap_or_else(|| format!("emitter_{}", self.emitters));
                let ps = raw
                    .ps
                    .filter(|ps| !ps.is_null())
                    .ok_or_else(|| ConvertError::MissingConfig(uuid.clone()))?;
                let ps: RawEmitterConfig = serde_json::from_value(ps)
                    .map_err(|source| ConvertError::Schema { what: "emitter config", source })?;
                if !raw.children.is_empty() {
                    debug!("{indent}Ignoring {} children of emitter {uuid}", raw.children.len());
                }

                let material_id = ps.material.clone();
                let config = convert_emitter_config(ps);
                self.emitters += 1;
                let name = raw.name.unwrap_or_else(|| "ParticleEmitter".to_string());
                debug!("{indent}Emitter {name} ({uuid}), {}", config.kind.label());
                Ok(Some(ObjectData::Emitter(EmitterData {
                    uuid,
                    name,
                    transform,
                    config,
                    material_id,
                    parent_uuid: parent_uuid.map(str::to_string),
                })))
            }
            other => {
                debug!("{indent}Ignoring object of type {other:?}");
                Ok(None)
            }
        }
    }
}

/// Resolve an emitter's `ps` block into a backend configuration.
pub fn convert_emitter_config(ps: RawEmitterConfig) -> ParticleSystemConfig {
    let mut config = ParticleSystemConfig {
        kind: match ps.render_mode {
            Some(2) => SystemKind::Solid,
            _ => SystemKind::Billboard,
        },
        billboard_mode: match ps.render_mode {
            Some(1) => BillboardMode::Stretched,
            Some(4 | 5) => BillboardMode::Y,
            _ => BillboardMode::All,
        },
        duration: ps.duration.unwrap_or(5.0),
        is_local: ps.world_space.is_some_and(|world| !world),
        dispose_on_stop: ps.auto_destroy.unwrap_or(false),
        render_order: ps.render_order.unwrap_or(0),
        layers: ps.layers.unwrap_or(1),
        material: ps.material,
        instancing_geometry: ps.instancing_geometry,
        ..default()
    };
    config.set_looping(ps.looping.unwrap_or(false));

    if ps.prewarm == Some(true) {
        config.pre_warm_cycles = (config.duration * 60.0).ceil() as u32;
        config.pre_warm_step = 1.0 / 60.0;
    }

    if let Some(v) = &ps.start_life {
        config.start_life = convert_value(v);
    }
    if let Some(v) = &ps.start_speed {
        config.start_speed = convert_value(v);
    }
    if let Some(v) = &ps.start_size {
        config.start_size = convert_value(v);
    }
    config.start_rotation = ps.start_rotation.as_ref().map(convert_rotation);
    if let Some(c) = &ps.start_color {
        config.start_color = convert_color(c);
    }
    if let Some(v) = &ps.emission_over_time {
        config.emission_over_time = convert_value(v);
    }
    config.emission_over_distance = ps.emission_over_distance.as_ref().map(convert_value);

    config.emission_bursts = ps
        .emission_bursts
        .iter()
        .map(|burst| EmissionBurst {
            time: convert_value(&burst.time),
            count: convert_value(&burst.count),
        })
        .collect();
    config
        .emission_bursts
        .sort_by(|a, b| a.time.evaluate_constant().total_cmp(&b.time.evaluate_constant()));

    if let Some(shape) = &ps.shape {
        config.shape = convert_shape(shape);
    }
    config.behaviors = ps.behaviors.iter().map(convert_behavior).collect();

    if ps.u_tile_count.is_some() || ps.v_tile_count.is_some() {
        config.sprite = Some(SpriteSheet {
            u_tiles: ps.u_tile_count.unwrap_or(1).max(1),
            v_tiles: ps.v_tile_count.unwrap_or(1).max(1),
            start_tile: ps
                .start_tile_index
                .as_ref()
                .map_or(Value::Constant(0.0), convert_value),
            blend_tiles: ps.blend_tiles.unwrap_or(false),
        });
    }
    if let Some(speed_factor) = ps.renderer_emitter_settings.and_then(|r| r.speed_factor) {
        config.speed_factor = speed_factor;
    }

    config
}

fn convert_shape(raw: &RawShape) -> ShapeConfig {
    let mut shape = ShapeConfig::of_kind(ShapeKind::parse(&raw.kind));
    if let Some(radius) = raw.radius {
        shape.radius = radius;
    }
    if let Some(arc) = raw.arc {
        shape.arc = arc;
    }
    if let Some(thickness) = raw.thickness {
        shape.thickness = thickness;
    }
    if let Some(height) = raw.height {
        shape.height = height;
    }
    shape.angle = raw.angle.unwrap_or(FRAC_PI_4);

    let size = raw.size.as_deref().unwrap_or(&[]);
    let extent = Vec3::new(
        size.first().copied().unwrap_or(1.0),
        size.get(1).copied().unwrap_or(1.0),
        size.get(2).copied().unwrap_or(1.0),
    );
    shape.box_min = -extent / 2.0;
    shape.box_max = extent / 2.0;

    shape.speed = raw.speed.as_ref().map(convert_value);
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarks_particles::{Behavior, ColorValue, RotationValue};
    use serde_json::json;

    fn document(json: Json) -> RawDocument {
        serde_json::from_value(json).unwrap()
    }

    fn emitter(name: &str, ps: Json) -> Json {
        json!({ "type": "ParticleEmitter", "name": name, "ps": ps })
    }

    #[test]
    fn converts_a_hierarchy() {
        let data = DataConverter::convert(&document(json!({
            "object": {
                "type": "Group",
                "uuid": "root",
                "position": [0, 0, 2],
                "children": [
                    emitter("a", json!({ "renderMode": 2, "material": "m1" })),
                    {
                        "type": "Group",
                        "children": [emitter("b", json!({ "renderMode": 1 }))]
                    }
                ]
            }
        })));

        assert_eq!(data.group_count, 2);
        assert_eq!(data.emitter_count, 2);
        let Some(ObjectData::Group(root)) = &data.root else {
            panic!("expected a root group");
        };
        assert_eq!(root.transform.translation, Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(root.children.len(), 2);

        let ObjectData::Emitter(a) = &root.children[0] else {
            panic!("expected an emitter");
        };
        assert_eq!(a.config.kind, SystemKind::Solid);
        assert_eq!(a.material_id.as_deref(), Some("m1"));
        assert_eq!(a.parent_uuid.as_deref(), Some("root"));
        assert_eq!(a.uuid, "emitter_0");

        let ObjectData::Group(inner) = &root.children[1] else {
            panic!("expected a nested group");
        };
        assert_eq!(inner.uuid, "group_1");
        assert_eq!(inner.name, "Group");
        let ObjectData::Emitter(b) = &inner.children[0] else {
            panic!("expected an emitter");
        };
        assert_eq!(b.config.billboard_mode, BillboardMode::Stretched);
        assert_eq!(b.parent_uuid.as_deref(), Some("group_1"));
    }

    #[test]
    fn bad_subtrees_are_dropped_and_siblings_survive() {
        let data = DataConverter::convert(&document(json!({
            "object": {
                "type": "Group",
                "children": [
                    { "type": "ParticleEmitter", "name": "no-config" },
                    { "type": "ParticleEmitter", "ps": { "duration": "long" } },
                    { "type": "Mesh", "name": "ignored" },
                    42,
                    emitter("good", json!({}))
                ]
            },
            "materials": [{ "uuid": "m", "color": "#zzz" }, { "uuid": "ok" }]
        })));
        let Some(ObjectData::Group(root)) = &data.root else {
            panic!("expected a root group");
        };
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name(), "good");
        assert_eq!(data.materials.len(), 1);
    }

    #[test]
    fn missing_root_converts_resources_only() {
        let data = DataConverter::convert(&document(json!({
            "images": [{ "uuid": "i", "url": "textures/spark.png" }]
        })));
        assert!(data.root.is_none());
        assert_eq!(
            data.image("i").and_then(|i| i.url.as_deref()),
            Some("textures/spark.png")
        );
    }

    #[test]
    fn emitter_config_mapping() {
        let ps: RawEmitterConfig = serde_json::from_value(json!({
            "duration": 2,
            "looping": false,
            "prewarm": true,
            "worldSpace": false,
            "autoDestroy": true,
            "startLife": { "type": "IntervalValue", "a": 1, "b": 2 },
            "startSize": 0.5,
            "startRotation": { "type": "RandomQuat" },
            "startColor": { "type": "ConstantColor", "value": [1, 0, 0, 1] },
            "emissionOverTime": { "type": "ConstantValue", "value": 30 },
            "emissionBursts": [
                { "time": 1.5, "count": 4 },
                { "time": 0.5, "count": 2 }
            ],
            "shape": { "type": "box", "size": [2, 4, 6] },
            "behaviors": [{ "type": "GravityForce", "gravity": 9.8 }, { "type": "Noise" }],
            "uTileCount": 4,
            "vTileCount": 2,
            "startTileIndex": 3,
            "renderMode": 4,
            "rendererEmitterSettings": { "speedFactor": 0.25 }
        }))
        .unwrap();
        let config = convert_emitter_config(ps);

        assert_eq!(config.kind, SystemKind::Billboard);
        assert_eq!(config.billboard_mode, BillboardMode::Y);
        assert!(!config.looping);
        assert_eq!(config.target_stop_duration, 2.0);
        assert_eq!(config.pre_warm_cycles, 120);
        assert!(config.is_local);
        assert!(config.dispose_on_stop);
        assert_eq!(config.start_life, Value::Interval { min: 1.0, max: 2.0 });
        assert_eq!(config.start_size, Value::Constant(0.5));
        assert_eq!(config.start_rotation, Some(RotationValue::RandomQuat));
        assert_eq!(
            config.start_color,
            ColorValue::Constant(LinearRgba::new(1.0, 0.0, 0.0, 1.0))
        );
        assert_eq!(config.emission_rate(), 30.0);
        assert_eq!(config.emission_bursts[0].time, Value::Constant(0.5));
        assert_eq!(config.total_burst_count(), 6);
        assert_eq!(config.shape.kind, ShapeKind::Box);
        assert_eq!(config.shape.box_max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(config.behaviors.len(), 2);
        assert!(matches!(config.behaviors[1], Behavior::Unknown { .. }));
        let sprite = config.sprite.unwrap();
        assert_eq!(sprite.cell_count(), 8);
        assert_eq!(sprite.start_tile, Value::Constant(3.0));
        assert_eq!(config.speed_factor, 0.25);
    }

    #[test]
    fn emitter_defaults() {
        let config = convert_emitter_config(RawEmitterConfig::default());
        assert_eq!(config.kind, SystemKind::Billboard);
        assert_eq!(config.duration, 5.0);
        assert!(!config.looping);
        assert_eq!(config.target_stop_duration, 5.0);
        assert!(!config.is_local);
        assert_eq!(config.pre_warm_cycles, 0);
        assert!(config.sprite.is_none());

        let looping = convert_emitter_config(RawEmitterConfig {
            looping: Some(true),
            ..default()
        });
        assert_eq!(looping.target_stop_duration, 0.0);
    }

    #[test]
    fn cone_shape_defaults() {
        let shape = convert_shape(&RawShape {
            kind: "cone".into(),
            radius: Some(0.5),
            ..default()
        });
        assert_eq!(shape.kind, ShapeKind::Cone);
        assert_eq!(shape.radius, 0.5);
        assert_eq!(shape.angle, FRAC_PI_4);
        assert_eq!(shape.box_min, Vec3::splat(-0.5));
    }
}
