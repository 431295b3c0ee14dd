//! Particle system configuration data model.
//!
//! A [`ParticleSystemConfig`] is the fully resolved, backend-neutral
//! description of one emitter. It is built once (by the JSON converter, a
//! preset, or by hand) and handed to either particle backend. Everything here
//! serializes through serde so presets can live in RON files.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::gradient::{ColorGradient, GradientKey, NumberGradient};
use crate::value::{Value, ValueRange};

// ---------------------------------------------------------------------------
// Backend selection & rendering flags
// ---------------------------------------------------------------------------

/// Which execution backend simulates an emitter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum SystemKind {
    /// Native lightweight sprite primitive with gradient tracks.
    #[default]
    Billboard,
    /// Custom loop over a fixed pool of mesh instances.
    Solid,
}

impl SystemKind {
    pub const ALL: [Self; 2] = [Self::Billboard, Self::Solid];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Billboard => "Billboard",
            Self::Solid => "Solid",
        }
    }
}

/// How a billboard quad is oriented toward the camera.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum BillboardMode {
    /// Faces the camera on every axis.
    #[default]
    All,
    /// Rotates around the world Y axis only.
    Y,
    /// Stretched along the velocity direction.
    Stretched,
}

impl BillboardMode {
    pub const ALL: [Self; 3] = [Self::All, Self::Y, Self::Stretched];

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Y => "Y Axis",
            Self::Stretched => "Stretched",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum BlendMode {
    Opaque,
    #[default]
    Alpha,
    Additive,
}

impl BlendMode {
    pub const ALL: [Self; 3] = [Self::Opaque, Self::Alpha, Self::Additive];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Opaque => "Opaque",
            Self::Alpha => "Alpha",
            Self::Additive => "Additive",
        }
    }
}

/// Sprite sheet layout for billboard particles.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpriteSheet {
    pub u_tiles: u32,
    pub v_tiles: u32,
    pub start_tile: Value,
    pub blend_tiles: bool,
}

impl Default for SpriteSheet {
    fn default() -> Self {
        Self {
            u_tiles: 1,
            v_tiles: 1,
            start_tile: Value::Constant(0.0),
            blend_tiles: false,
        }
    }
}

impl SpriteSheet {
    pub fn cell_count(&self) -> u32 {
        self.u_tiles.max(1) * self.v_tiles.max(1)
    }

    pub fn is_animated(&self) -> bool {
        self.u_tiles > 1 || self.v_tiles > 1
    }
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// Color gradient as authored: color keys plus optional independent alpha
/// keys.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ColorGradientDef {
    pub color_keys: Vec<GradientKey<LinearRgba>>,
    /// When empty, alpha comes from the color keys.
    pub alpha_keys: Vec<GradientKey<f32>>,
}

impl ColorGradientDef {
    pub fn from_colors(keys: Vec<GradientKey<LinearRgba>>) -> Self {
        Self {
            color_keys: keys,
            alpha_keys: Vec::new(),
        }
    }

    /// Merge color and alpha keys into one RGBA track.
    ///
    /// Keys land on the union of both key sets' positions; rgb is
    /// interpolated from the color keys and alpha from the alpha keys.
    pub fn bake(&self) -> ColorGradient {
        let colors = ColorGradient::from_keys(self.color_keys.clone());
        if self.alpha_keys.is_empty() {
            return colors;
        }
        let alphas = NumberGradient::from_keys(self.alpha_keys.clone());

        let mut positions: Vec<f32> = self
            .color_keys
            .iter()
            .map(|k| k.position)
            .chain(self.alpha_keys.iter().map(|k| k.position))
            .collect();
        positions.sort_by(f32::total_cmp);
        positions.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

        let keys = positions
            .into_iter()
            .map(|position| {
                let rgb = colors.sample_or(position, LinearRgba::WHITE);
                let alpha = alphas.sample_or(position, rgb.alpha);
                GradientKey::new(position, rgb.with_alpha(alpha))
            })
            .collect();
        ColorGradient::from_keys(keys)
    }

    pub fn is_empty(&self) -> bool {
        self.color_keys.is_empty() && self.alpha_keys.is_empty()
    }
}

/// Color property encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ColorValue {
    Constant(LinearRgba),
    /// Blend between `a` and `b` with one random factor per particle.
    Range { a: LinearRgba, b: LinearRgba },
    Gradient(ColorGradientDef),
    /// Each channel picked independently between `a` and `b`.
    Random { a: LinearRgba, b: LinearRgba },
    /// Only `gradient1` is evaluated; `gradient2` is carried but unused.
    RandomBetweenGradient {
        gradient1: ColorGradientDef,
        gradient2: ColorGradientDef,
    },
}

impl Default for ColorValue {
    fn default() -> Self {
        ColorValue::Constant(LinearRgba::WHITE)
    }
}

impl ColorValue {
    /// Spawn color at normalized emission time `t`.
    pub fn sample(&self, t: f32) -> LinearRgba {
        match self {
            ColorValue::Constant(c) => *c,
            ColorValue::Range { a, b } => lerp_rgba(*a, *b, fastrand::f32()),
            ColorValue::Random { a, b } => LinearRgba::new(
                a.red + (b.red - a.red) * fastrand::f32(),
                a.green + (b.green - a.green) * fastrand::f32(),
                a.blue + (b.blue - a.blue) * fastrand::f32(),
                a.alpha + (b.alpha - a.alpha) * fastrand::f32(),
            ),
            ColorValue::Gradient(g) | ColorValue::RandomBetweenGradient { gradient1: g, .. } => {
                g.bake().sample_or(t, LinearRgba::WHITE)
            }
        }
    }

    /// The two colors a native sprite primitive blends between at spawn.
    pub fn endpoints(&self) -> (LinearRgba, LinearRgba) {
        match self {
            ColorValue::Constant(c) => (*c, *c),
            ColorValue::Range { a, b } | ColorValue::Random { a, b } => (*a, *b),
            ColorValue::Gradient(g) | ColorValue::RandomBetweenGradient { gradient1: g, .. } => {
                let baked = g.bake();
                let first = baked.keys.first().map_or(LinearRgba::WHITE, |k| k.value);
                (first, first)
            }
        }
    }

    /// A life-ratio track, when this encoding has one.
    pub fn gradient(&self) -> Option<ColorGradient> {
        match self {
            ColorValue::Gradient(g) | ColorValue::RandomBetweenGradient { gradient1: g, .. } => {
                let baked = g.bake();
                (!baked.is_empty()).then_some(baked)
            }
            _ => None,
        }
    }
}

pub(crate) fn lerp_rgba(a: LinearRgba, b: LinearRgba, t: f32) -> LinearRgba {
    LinearRgba::new(
        a.red + (b.red - a.red) * t,
        a.green + (b.green - a.green) * t,
        a.blue + (b.blue - a.blue) * t,
        a.alpha + (b.alpha - a.alpha) * t,
    )
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Intrinsic axis order of an Euler rotation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum EulerOrder {
    #[default]
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl EulerOrder {
    pub fn parse(order: &str) -> Option<Self> {
        match order.to_ascii_uppercase().as_str() {
            "XYZ" => Some(Self::Xyz),
            "XZY" => Some(Self::Xzy),
            "YXZ" => Some(Self::Yxz),
            "YZX" => Some(Self::Yzx),
            "ZXY" => Some(Self::Zxy),
            "ZYX" => Some(Self::Zyx),
            _ => None,
        }
    }

    /// Build a quaternion from per-axis angles applied in this order.
    pub fn quat(self, angles: Vec3) -> Quat {
        let Vec3 { x, y, z } = angles;
        match self {
            Self::Xyz => Quat::from_euler(EulerRot::XYZ, x, y, z),
            Self::Xzy => Quat::from_euler(EulerRot::XZY, x, z, y),
            Self::Yxz => Quat::from_euler(EulerRot::YXZ, y, x, z),
            Self::Yzx => Quat::from_euler(EulerRot::YZX, y, z, x),
            Self::Zxy => Quat::from_euler(EulerRot::ZXY, z, x, y),
            Self::Zyx => Quat::from_euler(EulerRot::ZYX, z, y, x),
        }
    }
}

/// Start rotation encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum RotationValue {
    /// In-plane (Z) angle in radians.
    Angle(Value),
    Euler {
        x: Value,
        y: Value,
        z: Value,
        order: EulerOrder,
    },
    AxisAngle { axis: [Value; 3], angle: Value },
    RandomQuat,
}

impl Default for RotationValue {
    fn default() -> Self {
        RotationValue::Angle(Value::Constant(0.0))
    }
}

/// A sampled start rotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampledRotation {
    /// Euler angles; Z doubles as the billboard's in-plane angle.
    Euler(Vec3),
    Orientation(Quat),
}

impl RotationValue {
    pub fn sample(&self, t: f32) -> SampledRotation {
        match self {
            RotationValue::Angle(v) => SampledRotation::Euler(Vec3::new(0.0, 0.0, v.sample(t))),
            RotationValue::Euler { x, y, z, order } => {
                let angles = Vec3::new(x.sample(t), y.sample(t), z.sample(t));
                if *order == EulerOrder::Xyz {
                    SampledRotation::Euler(angles)
                } else {
                    SampledRotation::Orientation(order.quat(angles))
                }
            }
            RotationValue::AxisAngle { axis, angle } => {
                let axis = Vec3::new(axis[0].sample(t), axis[1].sample(t), axis[2].sample(t));
                let axis = axis.try_normalize().unwrap_or(Vec3::Z);
                SampledRotation::Orientation(Quat::from_axis_angle(axis, angle.sample(t)))
            }
            RotationValue::RandomQuat => SampledRotation::Orientation(random_quat()),
        }
    }

    /// In-plane angle range used by billboard sprites.
    pub fn z_range(&self) -> ValueRange {
        match self {
            RotationValue::Angle(v) => v.evaluate_interval(),
            RotationValue::Euler { z, .. } => z.evaluate_interval(),
            RotationValue::AxisAngle { angle, .. } => angle.evaluate_interval(),
            RotationValue::RandomQuat => ValueRange::new(0.0, TAU),
        }
    }
}

/// Uniformly distributed orientation from four uniform variates.
pub fn random_quat() -> Quat {
    let u1 = fastrand::f32();
    let u2 = fastrand::f32() * TAU;
    let u3 = fastrand::f32() * TAU;
    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    Quat::from_xyzw(a * u2.sin(), a * u2.cos(), b * u3.sin(), b * u3.cos())
}

// ---------------------------------------------------------------------------
// Emitter shape
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum ShapeKind {
    #[default]
    Point,
    Sphere,
    Cone,
    Box,
    Hemisphere,
    Cylinder,
}

impl ShapeKind {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "sphere" => Self::Sphere,
            "cone" => Self::Cone,
            "box" => Self::Box,
            "hemisphere" => Self::Hemisphere,
            "cylinder" => Self::Cylinder,
            _ => Self::Point,
        }
    }
}

/// Emitter volume descriptor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ShapeConfig {
    pub kind: ShapeKind,
    pub radius: f32,
    /// Angular extent around the emission axis, radians.
    pub arc: f32,
    /// 1 = whole volume, 0 = surface only.
    pub thickness: f32,
    /// Cone half angle, radians.
    pub angle: f32,
    pub height: f32,
    pub radius_range: f32,
    pub direction_randomizer: f32,
    pub box_min: Vec3,
    pub box_max: Vec3,
    pub direction1: Vec3,
    pub direction2: Vec3,
    /// Overrides the system's start speed when set.
    pub speed: Option<Value>,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Point,
            radius: 1.0,
            arc: TAU,
            thickness: 1.0,
            angle: PI / 6.0,
            height: 1.0,
            radius_range: 1.0,
            direction_randomizer: 0.0,
            box_min: Vec3::splat(-0.5),
            box_max: Vec3::splat(0.5),
            direction1: Vec3::Y,
            direction2: Vec3::Y,
            speed: None,
        }
    }
}

impl ShapeConfig {
    pub fn of_kind(kind: ShapeKind) -> Self {
        Self { kind, ..default() }
    }
}

// ---------------------------------------------------------------------------
// Bursts & tracks
// ---------------------------------------------------------------------------

/// One-shot spawn at a time within the emitter's duration, in seconds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmissionBurst {
    pub time: Value,
    pub count: Value,
}

impl EmissionBurst {
    pub fn at(time: f32, count: f32) -> Self {
        Self {
            time: Value::Constant(time),
            count: Value::Constant(count),
        }
    }
}

/// A scalar track over a ratio: either a [`Value`] or explicit keys.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum FloatTrack {
    Value(Value),
    Keys(NumberGradient),
}

impl FloatTrack {
    /// Evaluate at `ratio`. Intervals resolve to their midpoint.
    pub fn sample(&self, ratio: f32) -> f32 {
        match self {
            FloatTrack::Value(v) => v.evaluate_bezier_at(ratio),
            FloatTrack::Keys(g) => g.sample_or(ratio, 0.0),
        }
    }

    pub fn has_keys(&self) -> bool {
        matches!(self, FloatTrack::Keys(g) if !g.is_empty())
    }

    /// Convert to a gradient track; curves go through the lossy
    /// segment-endpoint reduction.
    pub fn to_gradient(&self) -> NumberGradient {
        match self {
            FloatTrack::Keys(g) => g.clone(),
            FloatTrack::Value(v) => v
                .parse_value_to_min_max()
                .gradient
                .unwrap_or_else(|| NumberGradient::constant(v.evaluate_constant())),
        }
    }

    pub fn range(&self) -> ValueRange {
        match self {
            FloatTrack::Value(v) => v.evaluate_interval(),
            FloatTrack::Keys(g) => g
                .min_max()
                .map_or(ValueRange::default(), |(lo, hi)| ValueRange::new(lo, hi)),
        }
    }
}

impl From<Value> for FloatTrack {
    fn from(v: Value) -> Self {
        FloatTrack::Value(v)
    }
}

/// Force with independently optional axes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ForceVector {
    pub x: Option<Value>,
    pub y: Option<Value>,
    pub z: Option<Value>,
}

impl ForceVector {
    pub fn new(force: Vec3) -> Self {
        Self {
            x: Some(Value::Constant(force.x)),
            y: Some(Value::Constant(force.y)),
            z: Some(Value::Constant(force.z)),
        }
    }

    /// Absent axes are zero.
    pub fn resolve(&self) -> Vec3 {
        let axis = |v: &Option<Value>| v.as_ref().map_or(0.0, Value::evaluate_constant);
        Vec3::new(axis(&self.x), axis(&self.y), axis(&self.z))
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// Speed window used by the `*BySpeed` behaviors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SpeedRange {
    pub min_speed: f32,
    pub max_speed: f32,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self {
            min_speed: 0.0,
            max_speed: 1.0,
        }
    }
}

impl SpeedRange {
    pub fn new(min_speed: f32, max_speed: f32) -> Self {
        Self { min_speed, max_speed }
    }

    /// Clamped position of `speed` inside the window. A zero-width window
    /// divides by one.
    pub fn ratio(&self, speed: f32) -> f32 {
        let span = self.max_speed - self.min_speed;
        let span = if span == 0.0 { 1.0 } else { span };
        ((speed - self.min_speed) / span).clamp(0.0, 1.0)
    }
}

/// Per-emitter behavior. Absent fields make the behavior a no-op.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Behavior {
    ColorOverLife {
        color: Option<ColorValue>,
    },
    SizeOverLife {
        size: Option<FloatTrack>,
    },
    RotationOverLife {
        angular_velocity: Option<Value>,
    },
    Rotation3DOverLife {
        angular_velocity: Option<Value>,
    },
    ForceOverLife {
        force: ForceVector,
    },
    ApplyForce {
        force: ForceVector,
    },
    GravityForce {
        gravity: Option<Value>,
    },
    SpeedOverLife {
        speed: Option<FloatTrack>,
    },
    FrameOverLife {
        frame: Option<FloatTrack>,
    },
    LimitSpeedOverLife {
        speed: Option<FloatTrack>,
        dampen: Option<f32>,
    },
    ColorBySpeed {
        color: Option<ColorGradientDef>,
        speed_range: SpeedRange,
    },
    SizeBySpeed {
        size: Option<NumberGradient>,
        speed_range: SpeedRange,
    },
    RotationBySpeed {
        angular_velocity: Option<FloatTrack>,
        speed_range: SpeedRange,
    },
    OrbitOverLife {
        orbit_speed: Option<Value>,
        center: Vec3,
        radius: Option<FloatTrack>,
    },
    /// Unrecognized tag, carried through untouched.
    Unknown { type_name: String, raw: String },
}

impl Behavior {
    pub fn type_name(&self) -> &str {
        match self {
            Behavior::ColorOverLife { .. } => "ColorOverLife",
            Behavior::SizeOverLife { .. } => "SizeOverLife",
            Behavior::RotationOverLife { .. } => "RotationOverLife",
            Behavior::Rotation3DOverLife { .. } => "Rotation3DOverLife",
            Behavior::ForceOverLife { .. } => "ForceOverLife",
            Behavior::ApplyForce { .. } => "ApplyForce",
            Behavior::GravityForce { .. } => "GravityForce",
            Behavior::SpeedOverLife { .. } => "SpeedOverLife",
            Behavior::FrameOverLife { .. } => "FrameOverLife",
            Behavior::LimitSpeedOverLife { .. } => "LimitSpeedOverLife",
            Behavior::ColorBySpeed { .. } => "ColorBySpeed",
            Behavior::SizeBySpeed { .. } => "SizeBySpeed",
            Behavior::RotationBySpeed { .. } => "RotationBySpeed",
            Behavior::OrbitOverLife { .. } => "OrbitOverLife",
            Behavior::Unknown { type_name, .. } => type_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Particle system configuration
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ParticleSystemConfig {
    pub kind: SystemKind,
    /// Emission cycle length in seconds.
    pub duration: f32,
    pub looping: bool,
    /// Seconds until emission stops; 0 = infinite (looping).
    pub target_stop_duration: f32,
    pub pre_warm_cycles: u32,
    pub pre_warm_step: f32,
    /// Particles follow the emitter transform after spawn.
    pub is_local: bool,
    /// Stop and release once a one-shot system has finished.
    pub dispose_on_stop: bool,

    pub start_life: Value,
    pub start_speed: Value,
    pub start_size: Value,
    pub start_rotation: Option<RotationValue>,
    pub start_color: ColorValue,

    /// Particles per second.
    pub emission_over_time: Value,
    /// Particles per meter travelled by the emitter.
    pub emission_over_distance: Option<Value>,
    pub emission_bursts: Vec<EmissionBurst>,

    pub shape: ShapeConfig,
    pub behaviors: Vec<Behavior>,
    pub gravity: Vec3,

    pub billboard_mode: BillboardMode,
    pub render_order: i32,
    pub layers: u32,
    pub sprite: Option<SpriteSheet>,
    pub blend_mode: Option<BlendMode>,
    /// Referenced material id, resolved by the host.
    pub material: Option<String>,
    /// Referenced geometry id for solid particles.
    pub instancing_geometry: Option<String>,
    pub speed_factor: f32,
    /// Non-uniform particle scale factors.
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for ParticleSystemConfig {
    fn default() -> Self {
        Self {
            kind: SystemKind::Billboard,
            duration: 5.0,
            looping: true,
            target_stop_duration: 0.0,
            pre_warm_cycles: 0,
            pre_warm_step: 1.0 / 60.0,
            is_local: false,
            dispose_on_stop: false,
            start_life: Value::Constant(1.0),
            start_speed: Value::Constant(1.0),
            start_size: Value::Constant(1.0),
            start_rotation: None,
            start_color: ColorValue::default(),
            emission_over_time: Value::Constant(10.0),
            emission_over_distance: None,
            emission_bursts: Vec::new(),
            shape: ShapeConfig::default(),
            behaviors: Vec::new(),
            gravity: Vec3::ZERO,
            billboard_mode: BillboardMode::All,
            render_order: 0,
            layers: 1,
            sprite: None,
            blend_mode: None,
            material: None,
            instancing_geometry: None,
            speed_factor: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl ParticleSystemConfig {
    /// Constant emission rate used for capacity sizing and by hosts that
    /// cannot follow a curve.
    pub fn emission_rate(&self) -> f32 {
        self.emission_over_time.evaluate_constant().max(0.0)
    }

    pub fn max_life(&self) -> f32 {
        self.start_life.max_value().max(0.0)
    }

    /// Sum of every burst's count.
    pub fn total_burst_count(&self) -> u32 {
        self.emission_bursts
            .iter()
            .map(|b| b.count.max_value().max(0.0).ceil() as u32)
            .sum()
    }

    /// Make this a one-shot (or looping) system, keeping
    /// `target_stop_duration` consistent.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        self.target_stop_duration = if looping { 0.0 } else { self.duration };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn bake_merges_alpha_keys() {
        let def = ColorGradientDef {
            color_keys: vec![
                GradientKey::new(0.0, LinearRgba::RED),
                GradientKey::new(1.0, LinearRgba::BLUE),
            ],
            alpha_keys: vec![GradientKey::new(0.0, 1.0), GradientKey::new(0.5, 0.0)],
        };
        let baked = def.bake();
        let positions: Vec<f32> = baked.keys.iter().map(|k| k.position).collect();
        assert_eq!(positions, vec![0.0, 0.5, 1.0]);
        let mid = baked.sample(0.5).unwrap();
        assert!((mid.red - 0.5).abs() < EPS);
        assert!(mid.alpha.abs() < EPS);
        assert!(baked.sample(1.0).unwrap().alpha.abs() < EPS);
    }

    #[test]
    fn bake_without_alpha_keys_uses_color_alpha() {
        let def = ColorGradientDef::from_colors(vec![
            GradientKey::new(0.0, LinearRgba::new(1.0, 1.0, 1.0, 0.25)),
            GradientKey::new(1.0, LinearRgba::new(1.0, 1.0, 1.0, 0.75)),
        ]);
        assert!((def.bake().sample(0.5).unwrap().alpha - 0.5).abs() < EPS);
    }

    #[test]
    fn random_between_gradient_uses_first_gradient() {
        let first = ColorGradientDef::from_colors(vec![GradientKey::new(0.0, LinearRgba::GREEN)]);
        let second = ColorGradientDef::from_colors(vec![GradientKey::new(0.0, LinearRgba::RED)]);
        let color = ColorValue::RandomBetweenGradient {
            gradient1: first,
            gradient2: second,
        };
        for _ in 0..10 {
            assert_eq!(color.sample(0.3), LinearRgba::GREEN);
        }
    }

    #[test]
    fn random_quat_is_unit_length() {
        fastrand::seed(11);
        for _ in 0..100 {
            assert!((random_quat().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn euler_order_matches_glam() {
        let angles = Vec3::new(0.3, -0.7, 1.1);
        let q = EulerOrder::Yxz.quat(angles);
        let expected = Quat::from_rotation_y(angles.y)
            * Quat::from_rotation_x(angles.x)
            * Quat::from_rotation_z(angles.z);
        assert!(q.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn speed_range_ratio_clamps_and_guards_zero_span() {
        let range = SpeedRange::new(0.0, 10.0);
        assert!((range.ratio(5.0) - 0.5).abs() < EPS);
        assert_eq!(range.ratio(-1.0), 0.0);
        assert_eq!(range.ratio(20.0), 1.0);
        assert_eq!(SpeedRange::new(2.0, 2.0).ratio(2.5), 0.5);
    }

    #[test]
    fn force_vector_missing_axes_are_zero() {
        let force = ForceVector {
            x: None,
            y: Some(Value::Constant(-2.0)),
            z: None,
        };
        assert_eq!(force.resolve(), Vec3::new(0.0, -2.0, 0.0));
    }

    #[test]
    fn set_looping_tracks_stop_duration() {
        let mut config = ParticleSystemConfig {
            duration: 3.0,
            ..default()
        };
        config.set_looping(false);
        assert_eq!(config.target_stop_duration, 3.0);
        config.set_looping(true);
        assert_eq!(config.target_stop_duration, 0.0);
    }

    #[test]
    fn config_round_trips_through_ron() {
        let config = ParticleSystemConfig {
            kind: SystemKind::Solid,
            emission_bursts: vec![EmissionBurst::at(2.5, 4.0)],
            behaviors: vec![Behavior::GravityForce {
                gravity: Some(Value::Constant(9.8)),
            }],
            ..default()
        };
        let text = ron::ser::to_string(&config).expect("serialize");
        let back: ParticleSystemConfig = ron::from_str(&text).expect("deserialize");
        assert_eq!(back, config);
    }
}
