//! Value, color, rotation, and gradient encodings.
//!
//! Every function here is total: unknown or legacy encodings fall back to
//! zero (values), opaque white (colors), or identity (rotations) instead of
//! failing the emitter.

use bevy::prelude::*;
use quarks_particles::{
    BezierSegment, ColorGradientDef, ColorValue, EulerOrder, FloatTrack, GradientKey,
    NumberGradient, RotationValue, Value,
};
use serde_json::Value as Json;

// ---- Scalars ----

pub fn convert_value(json: &Json) -> Value {
    if let Some(n) = json.as_f64() {
        return Value::Constant(n as f32);
    }
    match type_tag(json) {
        Some("ConstantValue") => Value::Constant(number(json, "value").unwrap_or(0.0)),
        Some("IntervalValue") => Value::Interval {
            min: number(json, "a").unwrap_or(0.0),
            max: number(json, "b").unwrap_or(0.0),
        },
        Some("PiecewiseBezier") => convert_bezier(json),
        other => {
            debug!("Unknown value encoding {other:?}, using 0");
            Value::Constant(0.0)
        }
    }
}

/// `functions: [{ function: { p0..p3 }, start }]`. A missing `p1` repeats
/// `p0` and a missing `p2` repeats `p3`.
fn convert_bezier(json: &Json) -> Value {
    let mut segments: Vec<BezierSegment> = json
        .get("functions")
        .and_then(Json::as_array)
        .map(|functions| {
            functions
                .iter()
                .map(|f| {
                    let curve = f.get("function").unwrap_or(f);
                    let p0 = number(curve, "p0").unwrap_or(0.0);
                    let p3 = number(curve, "p3").unwrap_or(p0);
                    let p1 = number(curve, "p1").unwrap_or(p0);
                    let p2 = number(curve, "p2").unwrap_or(p3);
                    BezierSegment::new(number(f, "start").unwrap_or(0.0), [p0, p1, p2, p3])
                })
                .collect()
        })
        .unwrap_or_default();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    Value::PiecewiseBezier(segments)
}

/// A scalar track: explicit `keys`, bare `functions`, or any value encoding.
pub fn convert_float_track(json: &Json) -> Option<FloatTrack> {
    if json.is_null() {
        return None;
    }
    if let Some(keys) = json.get("keys").and_then(Json::as_array) {
        return Some(FloatTrack::Keys(convert_number_keys(keys)));
    }
    if json.get("functions").is_some() && type_tag(json).is_none_or(|t| t == "PiecewiseBezier") {
        return Some(FloatTrack::Value(convert_bezier(json)));
    }
    Some(FloatTrack::Value(convert_value(json)))
}

// ---- Gradient keys ----

/// `pos`, falling back to `time`.
pub fn key_position(key: &Json) -> Option<f32> {
    number(key, "pos").or_else(|| number(key, "time"))
}

pub fn convert_number_keys(keys: &[Json]) -> NumberGradient {
    let mut gradient = NumberGradient::default();
    for key in keys {
        let (Some(position), Some(value)) = (key_position(key), key.get("value")) else {
            continue;
        };
        let value = value
            .as_f64()
            .map(|v| v as f32)
            .or_else(|| parse_rgba(value).map(|c| c.alpha))
            .unwrap_or(0.0);
        gradient.add(position, value);
    }
    gradient
}

pub fn convert_color_keys(keys: &[Json]) -> Vec<GradientKey<LinearRgba>> {
    let mut out: Vec<GradientKey<LinearRgba>> = keys
        .iter()
        .filter_map(|key| {
            let position = key_position(key)?;
            let color = parse_rgba(key.get("value")?)?;
            Some(GradientKey::new(position, color))
        })
        .collect();
    out.sort_by(|a, b| a.position.total_cmp(&b.position));
    out
}

fn convert_alpha_keys(keys: &[Json]) -> Vec<GradientKey<f32>> {
    convert_number_keys(keys).keys
}

// ---- Colors ----

/// `Gradient` body: `color`/`alpha` linear functions, bare `keys`, or legacy
/// `functions` of color ranges.
pub fn convert_color_gradient(json: &Json) -> ColorGradientDef {
    let keys_of = |field: &str| {
        json.get(field)
            .and_then(|f| f.get("keys"))
            .and_then(Json::as_array)
    };

    let mut def = ColorGradientDef::default();
    if let Some(keys) = keys_of("color") {
        def.color_keys = convert_color_keys(keys);
    } else if let Some(keys) = json.get("keys").and_then(Json::as_array) {
        def.color_keys = convert_color_keys(keys);
    } else if let Some(functions) = json.get("functions").and_then(Json::as_array) {
        def.color_keys = color_range_functions(functions);
    }
    if let Some(keys) = keys_of("alpha") {
        def.alpha_keys = convert_alpha_keys(keys);
    }
    def
}

/// Each `{ function: ColorRange{a, b}, start }` spans to the next start.
fn color_range_functions(functions: &[Json]) -> Vec<GradientKey<LinearRgba>> {
    let mut spans: Vec<(f32, LinearRgba, LinearRgba)> = functions
        .iter()
        .filter_map(|f| {
            let range = f.get("function")?;
            let a = parse_rgba(range.get("a")?)?;
            let b = range.get("b").and_then(parse_rgba).unwrap_or(a);
            Some((number(f, "start").unwrap_or(0.0), a, b))
        })
        .collect();
    spans.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut keys = Vec::with_capacity(spans.len() * 2);
    for (i, (start, a, b)) in spans.iter().enumerate() {
        let end = spans.get(i + 1).map_or(1.0, |next| next.0);
        keys.push(GradientKey::new(*start, *a));
        keys.push(GradientKey::new(end, *b));
    }
    keys
}

pub fn convert_color(json: &Json) -> ColorValue {
    if let Some(color) = parse_rgba(json) {
        return ColorValue::Constant(color);
    }
    let pair = |json: &Json| {
        let a = json.get("a").and_then(parse_rgba).unwrap_or(LinearRgba::WHITE);
        let b = json.get("b").and_then(parse_rgba).unwrap_or(a);
        (a, b)
    };
    match type_tag(json) {
        Some("ConstantColor") => ColorValue::Constant(
            json.get("value")
                .or_else(|| json.get("color"))
                .and_then(parse_rgba)
                .unwrap_or(LinearRgba::WHITE),
        ),
        Some("ColorRange") => {
            let (a, b) = pair(json);
            ColorValue::Range { a, b }
        }
        Some("RandomColor") => {
            let (a, b) = pair(json);
            ColorValue::Random { a, b }
        }
        Some("Gradient") => ColorValue::Gradient(convert_color_gradient(json)),
        Some("RandomColorBetweenGradient") => ColorValue::RandomBetweenGradient {
            gradient1: json
                .get("gradient1")
                .map(convert_color_gradient)
                .unwrap_or_default(),
            gradient2: json
                .get("gradient2")
                .map(convert_color_gradient)
                .unwrap_or_default(),
        },
        other => {
            debug!("Unknown color encoding {other:?}, using white");
            ColorValue::Constant(LinearRgba::WHITE)
        }
    }
}

/// Accepts `[r, g, b, a?]`, `{r, g, b, a?}`, `{x, y, z, w?}`, a hex number,
/// or a `"#rrggbb"` string. Array and object channels are linear; hex is
/// sRGB.
pub fn parse_rgba(json: &Json) -> Option<LinearRgba> {
    match json {
        Json::Array(items) => {
            let channel = |i: usize| items.get(i).and_then(Json::as_f64).map(|v| v as f32);
            Some(LinearRgba::new(
                channel(0)?,
                channel(1)?,
                channel(2)?,
                channel(3).unwrap_or(1.0),
            ))
        }
        Json::Object(_) if json.get("r").is_some() => Some(LinearRgba::new(
            number(json, "r").unwrap_or(0.0),
            number(json, "g").unwrap_or(0.0),
            number(json, "b").unwrap_or(0.0),
            number(json, "a").unwrap_or(1.0),
        )),
        Json::Object(_) if json.get("x").is_some() && type_tag(json).is_none() => {
            Some(LinearRgba::new(
                number(json, "x").unwrap_or(0.0),
                number(json, "y").unwrap_or(0.0),
                number(json, "z").unwrap_or(0.0),
                number(json, "w").unwrap_or(1.0),
            ))
        }
        Json::String(_) | Json::Number(_) => parse_hex(json).map(hex_to_linear),
        _ => None,
    }
}

/// Hex color from a number or a `"#rrggbb"` / `"0xrrggbb"` string.
pub fn parse_hex(json: &Json) -> Option<u32> {
    if let Some(n) = json.as_u64() {
        return u32::try_from(n).ok();
    }
    let s = json.as_str()?.trim();
    let digits = s
        .strip_prefix('#')
        .or_else(|| s.strip_prefix("0x"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}

pub fn hex_to_linear(hex: u32) -> LinearRgba {
    let [_, r, g, b] = hex.to_be_bytes();
    Color::srgb_u8(r, g, b).to_linear()
}

// ---- Rotations ----

pub fn convert_rotation(json: &Json) -> RotationValue {
    match type_tag(json) {
        Some("Euler") => RotationValue::Euler {
            x: json.get("angleX").map(convert_value).unwrap_or_default(),
            y: json.get("angleY").map(convert_value).unwrap_or_default(),
            z: json.get("angleZ").map(convert_value).unwrap_or_default(),
            order: json
                .get("order")
                .and_then(Json::as_str)
                .and_then(EulerOrder::parse)
                .unwrap_or_default(),
        },
        Some("AxisAngle") => {
            let axis = json.get("axis");
            let axis_component = |i: usize, key: &str| {
                axis.and_then(|a| a.get(i).or_else(|| a.get(key)))
                    .map(convert_value)
                    .unwrap_or_default()
            };
            RotationValue::AxisAngle {
                axis: [
                    axis_component(0, "x"),
                    axis_component(1, "y"),
                    axis_component(2, "z"),
                ],
                angle: json.get("angle").map(convert_value).unwrap_or_default(),
            }
        }
        Some("RandomQuat") => RotationValue::RandomQuat,
        Some("ConstantValue" | "IntervalValue" | "PiecewiseBezier") => {
            RotationValue::Angle(convert_value(json))
        }
        None if json.is_number() => RotationValue::Angle(convert_value(json)),
        other => {
            debug!("Unknown rotation encoding {other:?}, using identity");
            RotationValue::default()
        }
    }
}

// ---- Helpers ----

pub(crate) fn type_tag(json: &Json) -> Option<&str> {
    json.get("type").and_then(Json::as_str)
}

pub(crate) fn number(json: &Json, key: &str) -> Option<f32> {
    json.get(key).and_then(Json::as_f64).map(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EPS: f32 = 1e-5;

    #[test]
    fn scalar_encodings() {
        assert_eq!(convert_value(&json!(2.5)), Value::Constant(2.5));
        assert_eq!(
            convert_value(&json!({ "type": "ConstantValue", "value": 3 })),
            Value::Constant(3.0)
        );
        assert_eq!(
            convert_value(&json!({ "type": "IntervalValue", "a": 1, "b": 4 })),
            Value::Interval { min: 1.0, max: 4.0 }
        );
        assert_eq!(convert_value(&json!({ "type": "Mystery" })), Value::Constant(0.0));
        assert_eq!(convert_value(&json!("nope")), Value::Constant(0.0));
    }

    #[test]
    fn bezier_segments_are_sorted() {
        let v = convert_value(&json!({
            "type": "PiecewiseBezier",
            "functions": [
                { "function": { "p0": 5, "p1": 5, "p2": 6, "p3": 6 }, "start": 0.5 },
                { "function": { "p0": 0, "p1": 1, "p2": 2, "p3": 5 }, "start": 0 }
            ]
        }));
        let Value::PiecewiseBezier(segments) = &v else {
            panic!("expected a curve, got {v:?}");
        };
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[1].start, 0.5);
        assert!((v.evaluate_bezier_at(0.0) - 0.0).abs() < EPS);
        assert!((v.evaluate_bezier_at(1.0) - 6.0).abs() < EPS);
    }

    #[test]
    fn partial_bezier_fills_inner_points() {
        let track = convert_float_track(&json!({
            "functions": [{ "function": { "p0": 1, "p3": 3 }, "start": 0 }]
        }));
        let Some(FloatTrack::Value(Value::PiecewiseBezier(segments))) = track else {
            panic!("expected a curve track");
        };
        assert_eq!(segments[0].p, [1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn float_track_prefers_keys() {
        let track = convert_float_track(&json!({
            "keys": [{ "value": 1, "pos": 0 }, { "value": 2, "time": 1 }]
        }))
        .unwrap();
        assert!(track.has_keys());
        assert!((track.sample(0.5) - 1.5).abs() < EPS);
        assert!(convert_float_track(&Json::Null).is_none());
    }

    #[test]
    fn color_encodings() {
        assert_eq!(
            convert_color(&json!([0.5, 0.25, 1.0])),
            ColorValue::Constant(LinearRgba::new(0.5, 0.25, 1.0, 1.0))
        );
        assert_eq!(
            convert_color(&json!({ "type": "ConstantColor", "color": { "r": 1, "g": 0, "b": 0 } })),
            ColorValue::Constant(LinearRgba::new(1.0, 0.0, 0.0, 1.0))
        );
        assert_eq!(
            convert_color(&json!({ "type": "ConstantColor", "value": [0, 1, 0, 0.5] })),
            ColorValue::Constant(LinearRgba::new(0.0, 1.0, 0.0, 0.5))
        );
        assert_eq!(
            convert_color(&json!({ "type": "ConstantColor" })),
            ColorValue::Constant(LinearRgba::WHITE)
        );
        let ColorValue::Range { a, b } = convert_color(&json!({
            "type": "ColorRange",
            "a": { "x": 1, "y": 1, "z": 1, "w": 1 },
            "b": [0, 0, 0, 1]
        })) else {
            panic!("expected a range");
        };
        assert_eq!(a, LinearRgba::WHITE);
        assert_eq!(b, LinearRgba::BLACK);
        assert_eq!(convert_color(&json!({ "type": "Weird" })), ColorValue::default());
    }

    #[test]
    fn hex_is_srgb() {
        assert_eq!(parse_hex(&json!("#ff8000")), Some(0xff8000));
        assert_eq!(parse_hex(&json!(16777215)), Some(0xffffff));
        assert_eq!(parse_hex(&json!("zz")), None);
        let c = hex_to_linear(0xff0000);
        assert!((c.red - 1.0).abs() < EPS);
        assert_eq!(c.green, 0.0);
        let mid = hex_to_linear(0x808080);
        assert!(mid.red < 0.5, "sRGB mid grey should be darker in linear space");
    }

    #[test]
    fn gradient_with_alpha_keys() {
        let def = convert_color_gradient(&json!({
            "type": "Gradient",
            "color": { "type": "CLinearFunction", "subType": "Color", "keys": [
                { "value": { "r": 1, "g": 0, "b": 0 }, "pos": 1 },
                { "value": [0, 0, 1], "pos": 0 }
            ]},
            "alpha": { "type": "CLinearFunction", "subType": "Number", "keys": [
                { "value": 1, "pos": 0 },
                { "value": 0, "pos": 1 }
            ]}
        }));
        assert_eq!(def.color_keys.len(), 2);
        assert_eq!(def.color_keys[0].position, 0.0);
        assert_eq!(def.alpha_keys.len(), 2);
        let baked = def.bake();
        let mid = baked.sample(0.5).unwrap();
        assert!((mid.alpha - 0.5).abs() < EPS);
    }

    #[test]
    fn legacy_gradient_functions() {
        let def = convert_color_gradient(&json!({
            "type": "Gradient",
            "functions": [{
                "function": { "type": "ColorRange", "a": [1, 1, 1, 1], "b": [0, 0, 0, 1] },
                "start": 0
            }]
        }));
        assert_eq!(def.color_keys.len(), 2);
        assert_eq!(def.color_keys[1].position, 1.0);
        assert_eq!(def.color_keys[1].value, LinearRgba::BLACK);
    }

    #[test]
    fn random_between_gradient_keeps_both() {
        let c = convert_color(&json!({
            "type": "RandomColorBetweenGradient",
            "gradient1": { "keys": [{ "value": [1, 0, 0, 1], "pos": 0 }] },
            "gradient2": { "keys": [{ "value": [0, 0, 1, 1], "pos": 0 }] }
        }));
        let ColorValue::RandomBetweenGradient { gradient1, gradient2 } = c else {
            panic!("expected RandomBetweenGradient");
        };
        assert_eq!(gradient1.color_keys.len(), 1);
        assert_eq!(gradient2.color_keys[0].value, LinearRgba::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn rotation_encodings() {
        assert_eq!(
            convert_rotation(&json!(0.5)),
            RotationValue::Angle(Value::Constant(0.5))
        );
        assert_eq!(
            convert_rotation(&json!({ "type": "IntervalValue", "a": 0, "b": 1 })),
            RotationValue::Angle(Value::Interval { min: 0.0, max: 1.0 })
        );
        let RotationValue::Euler { y, order, .. } = convert_rotation(&json!({
            "type": "Euler", "angleY": 2, "order": "zyx"
        })) else {
            panic!("expected Euler");
        };
        assert_eq!(y, Value::Constant(2.0));
        assert_eq!(order, EulerOrder::Zyx);
        let RotationValue::AxisAngle { axis, angle } = convert_rotation(&json!({
            "type": "AxisAngle", "axis": [0, 1, 0], "angle": 1.5
        })) else {
            panic!("expected AxisAngle");
        };
        assert_eq!(axis[1], Value::Constant(1.0));
        assert_eq!(angle, Value::Constant(1.5));
        assert_eq!(
            convert_rotation(&json!({ "type": "RandomQuat" })),
            RotationValue::RandomQuat
        );
        assert_eq!(convert_rotation(&json!({ "type": "Spin" })), RotationValue::default());
    }
}
