//! Scalar value model: constants, uniform intervals and piecewise cubic
//! Bezier curves evaluated over a normalized time.

use serde::{Deserialize, Serialize};

use crate::gradient::{GradientKey, NumberGradient};

/// One cubic segment of a [`Value::PiecewiseBezier`].
///
/// The segment covers `[start, next.start)` (or `[start, 1]` for the last
/// one) and is evaluated with the Bernstein basis over its local time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BezierSegment {
    pub start: f32,
    pub p: [f32; 4],
}

impl BezierSegment {
    pub fn new(start: f32, p: [f32; 4]) -> Self {
        Self { start, p }
    }

    /// A flat segment holding `value` for its whole span.
    pub fn flat(start: f32, value: f32) -> Self {
        Self::new(start, [value; 4])
    }

    fn eval(&self, t: f32) -> f32 {
        let u = 1.0 - t;
        u * u * u * self.p[0]
            + 3.0 * u * u * t * self.p[1]
            + 3.0 * u * t * t * self.p[2]
            + t * t * t * self.p[3]
    }
}

/// Scalar property encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Value {
    Constant(f32),
    /// Uniformly sampled per spawn.
    Interval { min: f32, max: f32 },
    /// Segments sorted ascending by `start`.
    PiecewiseBezier(Vec<BezierSegment>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Constant(0.0)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Constant(v)
    }
}

/// Inclusive range handed to consumers that sample uniformly.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn splat(v: f32) -> Self {
        Self { min: v, max: v }
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) * 0.5
    }

    /// Uniform random pick in `[min, max]`.
    pub fn sample(&self) -> f32 {
        self.min + (self.max - self.min) * fastrand::f32()
    }
}

/// Result of [`Value::parse_value_to_min_max`].
///
/// For curves the gradient holds the curve's value at the start and end of
/// every segment, linearly joined. Curvature inside a segment is lost; the
/// error is bounded by the segment's control-point spread.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MinMaxGradient {
    pub range: ValueRange,
    pub gradient: Option<NumberGradient>,
}

impl Value {
    pub fn interval(min: f32, max: f32) -> Self {
        Value::Interval { min, max }
    }

    /// Single representative number: the constant, the interval midpoint, or
    /// the curve at `t = 0`.
    pub fn evaluate_constant(&self) -> f32 {
        match self {
            Value::Constant(v) => *v,
            Value::Interval { min, max } => (min + max) * 0.5,
            Value::PiecewiseBezier(_) => self.evaluate_bezier_at(0.0),
        }
    }

    pub fn evaluate_interval(&self) -> ValueRange {
        match self {
            Value::Constant(v) => ValueRange::splat(*v),
            Value::Interval { min, max } => ValueRange::new(*min, *max),
            Value::PiecewiseBezier(_) => self.parse_value_to_min_max().range,
        }
    }

    /// Evaluate the curve at `t` (clamped to `[0, 1]`).
    ///
    /// Non-curve values evaluate to [`Value::evaluate_constant`].
    pub fn evaluate_bezier_at(&self, t: f32) -> f32 {
        let segments = match self {
            Value::PiecewiseBezier(segments) => segments,
            _ => return self.evaluate_constant(),
        };
        if segments.is_empty() {
            return 0.0;
        }
        let t = t.clamp(0.0, 1.0);

        // Before the first segment's start, the first segment clamps to p0.
        let index = segments.iter().rposition(|s| s.start <= t).unwrap_or(0);
        let segment = &segments[index];
        let end = segments.get(index + 1).map_or(1.0, |next| next.start);
        let span = end - segment.start;
        let local = if span > 1e-6 {
            ((t - segment.start) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        segment.eval(local)
    }

    /// Reduce to a `{min, max}` range plus, for curves, a discretized
    /// gradient track.
    pub fn parse_value_to_min_max(&self) -> MinMaxGradient {
        match self {
            Value::Constant(v) => MinMaxGradient {
                range: ValueRange::splat(*v),
                gradient: None,
            },
            Value::Interval { min, max } => MinMaxGradient {
                range: ValueRange::new(*min, *max),
                gradient: None,
            },
            Value::PiecewiseBezier(segments) => {
                let mut gradient = NumberGradient::default();
                for (i, segment) in segments.iter().enumerate() {
                    let end = segments.get(i + 1).map_or(1.0, |next| next.start);
                    gradient.keys.push(GradientKey::new(segment.start, segment.p[0]));
                    gradient.keys.push(GradientKey::new(end, segment.p[3]));
                }
                let (min, max) = gradient.min_max().unwrap_or((0.0, 0.0));
                MinMaxGradient {
                    range: ValueRange::new(min, max),
                    gradient: (!gradient.is_empty()).then_some(gradient),
                }
            }
        }
    }

    /// Sample for a spawn or a tick: intervals draw uniformly, curves are
    /// evaluated at `t`.
    pub fn sample(&self, t: f32) -> f32 {
        match self {
            Value::Constant(v) => *v,
            Value::Interval { min, max } => ValueRange::new(*min, *max).sample(),
            Value::PiecewiseBezier(_) => self.evaluate_bezier_at(t),
        }
    }

    /// Spawn-time sample at normalized emission time `t`. Curves follow `t`
    /// only when `timed` (one-shot systems); otherwise they draw uniformly
    /// from the curve's range.
    pub fn sample_spawn(&self, t: f32, timed: bool) -> f32 {
        match self {
            Value::PiecewiseBezier(_) if !timed => self.evaluate_interval().sample(),
            _ => self.sample(t),
        }
    }

    /// Largest value this can produce, used for capacity sizing.
    pub fn max_value(&self) -> f32 {
        match self {
            Value::Constant(v) => *v,
            Value::Interval { min, max } => min.max(*max),
            Value::PiecewiseBezier(segments) => segments
                .iter()
                .flat_map(|s| s.p)
                .fold(f32::MIN, f32::max)
                .max(0.0),
        }
    }

    pub fn is_curve(&self) -> bool {
        matches!(self, Value::PiecewiseBezier(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn two_segments() -> Value {
        Value::PiecewiseBezier(vec![
            BezierSegment::new(0.0, [2.0, 5.0, -1.0, 3.0]),
            BezierSegment::new(0.5, [3.0, 8.0, 8.0, 7.5]),
        ])
    }

    #[test]
    fn bezier_endpoints_match_control_points() {
        let v = two_segments();
        assert!((v.evaluate_bezier_at(0.0) - 2.0).abs() < EPS);
        assert!((v.evaluate_bezier_at(1.0) - 7.5).abs() < EPS);
    }

    #[test]
    fn bezier_endpoints_with_late_first_segment() {
        let v = Value::PiecewiseBezier(vec![BezierSegment::new(0.25, [4.0, 0.0, 0.0, 1.0])]);
        assert!((v.evaluate_bezier_at(0.0) - 4.0).abs() < EPS);
        assert!((v.evaluate_bezier_at(1.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn bezier_clamps_time() {
        let v = two_segments();
        assert_eq!(v.evaluate_bezier_at(-2.0), v.evaluate_bezier_at(0.0));
        assert_eq!(v.evaluate_bezier_at(3.0), v.evaluate_bezier_at(1.0));
    }

    #[test]
    fn bezier_is_continuous_at_segment_boundary() {
        let v = two_segments();
        let before = v.evaluate_bezier_at(0.5 - 1e-4);
        let at = v.evaluate_bezier_at(0.5);
        assert!((before - 3.0).abs() < 1e-2);
        assert!((at - 3.0).abs() < EPS);
    }

    #[test]
    fn empty_curve_is_zero() {
        assert_eq!(Value::PiecewiseBezier(vec![]).evaluate_bezier_at(0.3), 0.0);
    }

    #[test]
    fn constant_and_interval_evaluation() {
        assert_eq!(Value::Constant(3.0).evaluate_constant(), 3.0);
        assert_eq!(Value::interval(2.0, 6.0).evaluate_constant(), 4.0);
        assert_eq!(Value::interval(2.0, 6.0).evaluate_interval(), ValueRange::new(2.0, 6.0));
        assert_eq!(Value::Constant(1.5).evaluate_interval(), ValueRange::splat(1.5));
    }

    #[test]
    fn interval_samples_stay_in_range() {
        fastrand::seed(7);
        let v = Value::interval(-1.0, 2.0);
        for _ in 0..200 {
            let s = v.sample(0.0);
            assert!((-1.0..=2.0).contains(&s));
        }
    }

    #[test]
    fn min_max_reduction_of_curve() {
        let reduced = two_segments().parse_value_to_min_max();
        let gradient = reduced.gradient.expect("curve yields a gradient");
        let positions: Vec<f32> = gradient.keys.iter().map(|k| k.position).collect();
        assert_eq!(positions, vec![0.0, 0.5, 0.5, 1.0]);
        assert_eq!(reduced.range, ValueRange::new(2.0, 7.5));
    }

    #[test]
    fn min_max_reduction_of_scalars_has_no_gradient() {
        assert!(Value::Constant(1.0).parse_value_to_min_max().gradient.is_none());
        let reduced = Value::interval(3.0, 1.0).parse_value_to_min_max();
        assert_eq!(reduced.range, ValueRange::new(3.0, 1.0));
    }
}
