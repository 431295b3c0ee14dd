use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const VIEWER_SETTINGS_FILE: &str = "quarks_viewer.ron";

/// Runtime knobs shared by every spawned effect.
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuarksSettings {
    /// Start effects as soon as they are instantiated
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Multiplier applied to frame time
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
    /// Longest single step handed to the simulation, in seconds
    #[serde(default = "default_max_delta")]
    pub max_delta: f32,
    /// Replaces the directory of the effect file when resolving images
    #[serde(default)]
    pub root_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_time_scale() -> f32 {
    1.0
}

fn default_max_delta() -> f32 {
    0.1
}

impl Default for QuarksSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            time_scale: 1.0,
            max_delta: 0.1,
            root_url: None,
        }
    }
}

impl QuarksSettings {
    /// Frame delta scaled and clamped for one simulation step.
    pub fn step(&self, delta_secs: f32) -> f32 {
        (delta_secs * self.time_scale.max(0.0)).min(self.max_delta.max(0.0))
    }
}

/// Standalone viewer configuration
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ViewerSettings {
    /// Effect asset to show, relative to the assets folder
    #[serde(default)]
    pub effect: Option<String>,
    /// Built-in preset shown when no effect path is set
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 3],
    #[serde(default = "default_camera_distance")]
    pub camera_distance: f32,
    /// Camera orbit speed in radians per second (0.0 = static)
    #[serde(default = "default_orbit_speed")]
    pub orbit_speed: f32,
    #[serde(default)]
    pub quarks: QuarksSettings,
}

fn default_preset() -> String {
    "Sparks".to_string()
}

fn default_clear_color() -> [f32; 3] {
    [0.05, 0.05, 0.08]
}

fn default_camera_distance() -> f32 {
    8.0
}

fn default_orbit_speed() -> f32 {
    0.2
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            effect: None,
            preset: default_preset(),
            clear_color: default_clear_color(),
            camera_distance: default_camera_distance(),
            orbit_speed: default_orbit_speed(),
            quarks: QuarksSettings::default(),
        }
    }
}

impl ViewerSettings {
    /// Load settings from disk, or return defaults if missing or invalid
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read {}: {e}, using default viewer settings", path.display());
                return Self::default();
            }
        };
        Self::from_ron(&content).unwrap_or_else(|e| {
            warn!("Invalid viewer settings in {}: {e}, using defaults", path.display());
            Self::default()
        })
    }

    pub fn from_ron(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(content)
    }

    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let pretty = ron::ser::PrettyConfig::default();
        match ron::ser::to_string_pretty(self, pretty) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    error!("Failed to save viewer settings: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize viewer settings: {}", e),
        }
    }

    pub fn clear_color(&self) -> Color {
        let [r, g, b] = self.clear_color;
        Color::srgb(r, g, b)
    }
}
