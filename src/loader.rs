//! Reading three.quarks documents from strings, files, and the asset server.

use std::path::Path;

use bevy::{
    asset::{AssetLoader, LoadContext, io::Reader},
    prelude::*,
};
use quarks_particles::ParticleSystemConfig;
use thiserror::Error;

use crate::convert::{DataConverter, EffectData, EmitterData, GroupData, ObjectData};
use crate::effect::Effect;
use crate::format::RawDocument;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum QuarksError {
    #[error("Could not read effect: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse effect JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse and convert a document. Only syntax errors fail; broken subtrees
/// and dangling references are logged and skipped by the converter.
pub fn parse_effect_data(json: &str) -> Result<EffectData, QuarksError> {
    let document: RawDocument = serde_json::from_str(json)?;
    Ok(DataConverter::convert(&document))
}

/// Parse a document and build its runtime effect. `root_url` is joined onto
/// relative image paths.
pub fn parse_effect(json: &str, root_url: &str) -> Result<Effect, QuarksError> {
    Ok(Effect::new(parse_effect_data(json)?, root_url))
}

/// Load an effect from disk, resolving images next to the file.
pub fn load_effect_file(path: impl AsRef<Path>) -> Result<Effect, QuarksError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    parse_effect(&json, &root_url_of(path))
}

/// Directory of an effect file, used as its root URL.
pub fn root_url_of(path: &Path) -> String {
    path.parent()
        .map(|dir| dir.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Converted effect data. Each `QuarksEffect` that references it builds its
/// own runtime [`Effect`] from a copy.
#[derive(Asset, TypePath, Clone, Debug, Default)]
pub struct QuarksEffectAsset {
    pub data: EffectData,
    pub root_url: String,
}

impl QuarksEffectAsset {
    /// A one-emitter effect under a root group, for presets and tooling.
    pub fn from_config(name: &str, config: ParticleSystemConfig) -> Self {
        let emitter = EmitterData {
            uuid: "emitter_0".to_string(),
            name: name.to_string(),
            transform: Transform::IDENTITY,
            material_id: config.material.clone(),
            config,
            parent_uuid: Some("group_0".to_string()),
        };
        Self {
            data: EffectData {
                root: Some(ObjectData::Group(GroupData {
                    uuid: "group_0".to_string(),
                    name: "Root".to_string(),
                    transform: Transform::IDENTITY,
                    children: vec![ObjectData::Emitter(emitter)],
                })),
                group_count: 1,
                emitter_count: 1,
                ..default()
            },
            root_url: String::new(),
        }
    }

    pub fn instantiate(&self, root_url_override: Option<&str>) -> Effect {
        Effect::new(
            self.data.clone(),
            root_url_override.unwrap_or(&self.root_url),
        )
    }
}

#[derive(Default, TypePath)]
pub struct QuarksEffectLoader;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum QuarksLoaderError {
    #[error("Could not load effect asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse effect JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssetLoader for QuarksEffectLoader {
    type Asset = QuarksEffectAsset;
    type Settings = ();
    type Error = QuarksLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &(),
        load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let document: RawDocument = serde_json::from_slice(&bytes)?;
        let path = load_context.path().path();
        debug!("Converting effect {path:?}");
        Ok(QuarksEffectAsset {
            data: DataConverter::convert(&document),
            root_url: root_url_of(path),
        })
    }

    fn extensions(&self) -> &[&str] {
        &["quarks.json", "quarks"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarks_particles::EffectSystem;

    const DOCUMENT: &str = r#"{
        "metadata": { "version": 4.5, "type": "Object", "generator": "Object3D.toJSON" },
        "materials": [{ "uuid": "m", "type": "MeshBasicMaterial", "blending": 2, "transparent": true }],
        "object": {
            "uuid": "root", "type": "Group", "name": "explosion",
            "children": [
                { "uuid": "e1", "type": "ParticleEmitter", "name": "flash",
                  "ps": { "looping": false, "duration": 1, "material": "m",
                          "startLife": { "type": "ConstantValue", "value": 0.5 },
                          "emissionBursts": [{ "time": 0, "count": { "type": "ConstantValue", "value": 12 } }] } }
            ]
        }
    }"#;

    #[test]
    fn parses_documents_into_effects() {
        let mut effect = parse_effect(DOCUMENT, "fx").unwrap();
        assert_eq!(effect.root_url(), "fx");
        assert_eq!(effect.data().emitter_count, 1);
        effect.start();
        assert!(effect.find_system_by_name("flash").unwrap().system().is_started());
    }

    #[test]
    fn syntax_errors_fail() {
        assert!(matches!(parse_effect("{ not json", ""), Err(QuarksError::Json(_))));
    }

    #[test]
    fn semantic_problems_do_not_fail() {
        let effect = parse_effect(r#"{ "object": { "type": "Group", "children": [42] } }"#, "").unwrap();
        assert_eq!(effect.nodes().count(), 1);
        let empty = parse_effect("{}", "").unwrap();
        assert_eq!(empty.node(empty.root().unwrap()).unwrap().name, "Root");
    }

    #[test]
    fn missing_files_are_io_errors() {
        assert!(matches!(
            load_effect_file("definitely/not/here.quarks.json"),
            Err(QuarksError::Io(_))
        ));
    }

    #[test]
    fn presets_become_single_emitter_assets() {
        let config = quarks_particles::presets::preset("Smoke").unwrap();
        let mut effect = QuarksEffectAsset::from_config("smoke", config).instantiate(None);
        assert_eq!(effect.systems().count(), 1);
        effect.start();
        assert!(effect.find_system_by_name("smoke").is_some_and(|s| s.system().is_started()));
    }

    #[test]
    fn root_url_is_the_parent_directory() {
        assert_eq!(root_url_of(Path::new("effects/fire/fire.quarks.json")), "effects/fire");
        assert_eq!(root_url_of(Path::new("fire.quarks")), "");
    }

    #[test]
    fn assets_instantiate_fresh_effects() {
        let asset = QuarksEffectAsset {
            data: parse_effect_data(DOCUMENT).unwrap(),
            root_url: "fx".into(),
        };
        let mut a = asset.instantiate(None);
        let b = asset.instantiate(Some("other"));
        a.start();
        assert!(a.is_started());
        assert!(!b.is_started());
        assert_eq!(b.root_url(), "other");
    }
}
