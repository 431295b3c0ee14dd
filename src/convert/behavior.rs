//! Behavior tag dispatch.

use bevy::prelude::*;
use quarks_particles::{Behavior, ColorValue, ForceVector, NumberGradient, SpeedRange};
use serde_json::Value as Json;

use super::value::{
    convert_color, convert_color_gradient, convert_float_track, convert_number_keys,
    convert_value, number, type_tag,
};

/// Map one behavior object onto its typed variant. Unknown tags are carried
/// through as [`Behavior::Unknown`] with the raw JSON attached.
pub fn convert_behavior(json: &Json) -> Behavior {
    let field = |key: &str| json.get(key).filter(|v| !v.is_null());
    let value = |key: &str| field(key).map(convert_value);
    let track = |key: &str| field(key).and_then(convert_float_track);

    let type_name = type_tag(json).unwrap_or_default();
    match type_name {
        "ColorOverLife" => Behavior::ColorOverLife {
            color: field("color").map(color_over_life),
        },
        "SizeOverLife" => Behavior::SizeOverLife {
            size: track("size"),
        },
        "RotationOverLife" => Behavior::RotationOverLife {
            angular_velocity: value("angularVelocity"),
        },
        "Rotation3DOverLife" => Behavior::Rotation3DOverLife {
            angular_velocity: value("angularVelocity"),
        },
        "ForceOverLife" => Behavior::ForceOverLife {
            force: force_vector(json),
        },
        "ApplyForce" => Behavior::ApplyForce {
            force: force_vector(json),
        },
        "GravityForce" => Behavior::GravityForce {
            gravity: value("gravity").or_else(|| value("magnitude")),
        },
        "SpeedOverLife" => Behavior::SpeedOverLife {
            speed: track("speed"),
        },
        "FrameOverLife" => Behavior::FrameOverLife {
            frame: track("frame"),
        },
        "LimitSpeedOverLife" => Behavior::LimitSpeedOverLife {
            speed: track("maxSpeed").or_else(|| track("speed")),
            dampen: value("dampen").map(|v| v.evaluate_constant()),
        },
        "ColorBySpeed" => Behavior::ColorBySpeed {
            color: field("color")
                .map(convert_color_gradient)
                .filter(|g| !g.is_empty()),
            speed_range: speed_range(json),
        },
        "SizeBySpeed" => Behavior::SizeBySpeed {
            size: field("size").and_then(keyed_gradient),
            speed_range: speed_range(json),
        },
        "RotationBySpeed" => Behavior::RotationBySpeed {
            angular_velocity: track("angularVelocity"),
            speed_range: speed_range(json),
        },
        "OrbitOverLife" => Behavior::OrbitOverLife {
            orbit_speed: value("orbitSpeed").or_else(|| value("speed")),
            center: field("center").map(vec3).unwrap_or(Vec3::ZERO),
            radius: track("radius"),
        },
        other => {
            debug!("Passing through unknown behavior {other:?}");
            Behavior::Unknown {
                type_name: other.to_string(),
                raw: json.to_string(),
            }
        }
    }
}

/// Untagged `color`/`alpha`/`keys` bodies are gradients; anything tagged
/// goes through the regular color encodings.
fn color_over_life(json: &Json) -> ColorValue {
    let has_gradient_keys = json.get("keys").is_some()
        || json.get("color").and_then(|c| c.get("keys")).is_some()
        || json.get("alpha").and_then(|c| c.get("keys")).is_some();
    if has_gradient_keys && type_tag(json).is_none() {
        return ColorValue::Gradient(convert_color_gradient(json));
    }
    convert_color(json)
}

/// Nested `force: {x, y, z}`, flat `x`/`y`/`z`, or `direction` × `magnitude`.
fn force_vector(json: &Json) -> ForceVector {
    let source = json.get("force").filter(|f| f.is_object()).unwrap_or(json);
    let axis = |key: &str| source.get(key).filter(|v| !v.is_null()).map(convert_value);
    let force = ForceVector {
        x: axis("x"),
        y: axis("y"),
        z: axis("z"),
    };
    if force != ForceVector::default() {
        return force;
    }

    match json.get("direction") {
        Some(direction) => {
            let magnitude = json
                .get("magnitude")
                .map(|m| convert_value(m).evaluate_constant())
                .unwrap_or(1.0);
            ForceVector::new(vec3(direction) * magnitude)
        }
        None => force,
    }
}

/// `minSpeed`/`maxSpeed`, or a `speedRange` pair of `{a, b}` / `[a, b]`.
fn speed_range(json: &Json) -> SpeedRange {
    let default = SpeedRange::default();
    if let Some(range) = json.get("speedRange") {
        let pick = |key: &str, i: usize| {
            number(range, key).or_else(|| range.get(i)?.as_f64().map(|v| v as f32))
        };
        return SpeedRange::new(
            pick("a", 0).unwrap_or(default.min_speed),
            pick("b", 1).unwrap_or(default.max_speed),
        );
    }
    let bound = |key: &str| json.get(key).map(|v| convert_value(v).evaluate_constant());
    SpeedRange::new(
        bound("minSpeed").unwrap_or(default.min_speed),
        bound("maxSpeed").unwrap_or(default.max_speed),
    )
}

fn keyed_gradient(json: &Json) -> Option<NumberGradient> {
    let keys = json.get("keys")?.as_array()?;
    let gradient = convert_number_keys(keys);
    (!gradient.is_empty()).then_some(gradient)
}

/// `{x, y, z}` or `[x, y, z]`; missing components are zero.
fn vec3(json: &Json) -> Vec3 {
    let component = |key: &str, i: usize| {
        number(json, key)
            .or_else(|| json.get(i)?.as_f64().map(|v| v as f32))
            .unwrap_or(0.0)
    };
    Vec3::new(component("x", 0), component("y", 1), component("z", 2))
}
