//! Ordered key tracks sampled over a normalized position.
//!
//! A [`Gradient`] is the interpolation primitive shared by both particle
//! backends: life-ratio color/size/speed tracks, speed-ratio tracks for the
//! `*BySpeed` behaviors, and the emit-rate tracks of the billboard primitive.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

/// Types that can be linearly blended between two keys.
pub trait Lerp: Copy {
    fn lerp_to(self, other: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec3 {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }
}

impl Lerp for LinearRgba {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        LinearRgba::new(
            self.red + (other.red - self.red) * t,
            self.green + (other.green - self.green) * t,
            self.blue + (other.blue - self.blue) * t,
            self.alpha + (other.alpha - self.alpha) * t,
        )
    }
}

// ---------------------------------------------------------------------------
// Gradient
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GradientKey<T> {
    /// Normalized position in `[0, 1]`.
    pub position: f32,
    pub value: T,
}

impl<T> GradientKey<T> {
    pub fn new(position: f32, value: T) -> Self {
        Self { position, value }
    }
}

/// An ordered set of keys, linearly interpolated and clamped at both ends.
///
/// Keys are expected in ascending `position`. [`Gradient::add`] keeps that
/// order; keys handed to [`Gradient::from_keys`] are taken as-is, and with
/// duplicate or unsorted positions the first bracketing pair found by the
/// linear scan wins.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Gradient<T> {
    pub keys: Vec<GradientKey<T>>,
}

pub type NumberGradient = Gradient<f32>;
pub type ColorGradient = Gradient<LinearRgba>;

impl<T> Default for Gradient<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T: Lerp> Gradient<T> {
    pub fn from_keys(keys: Vec<GradientKey<T>>) -> Self {
        Self { keys }
    }

    pub fn constant(value: T) -> Self {
        Self {
            keys: vec![GradientKey::new(0.0, value)],
        }
    }

    /// Insert a key after any existing keys at the same or lower position.
    pub fn add(&mut self, position: f32, value: T) {
        let index = self
            .keys
            .iter()
            .position(|k| k.position > position)
            .unwrap_or(self.keys.len());
        self.keys.insert(index, GradientKey::new(position, value));
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Sample at `t` (clamped to `[0, 1]`). Returns `None` when there are no keys.
    pub fn sample(&self, t: f32) -> Option<T> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        let t = t.clamp(0.0, 1.0);

        if self.keys.len() == 1 || t <= first.position {
            return Some(first.value);
        }
        if t >= last.position {
            return Some(last.value);
        }

        for pair in self.keys.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t >= a.position && t <= b.position {
                let span = b.position - a.position;
                if span < 1e-6 {
                    return Some(a.value);
                }
                return Some(a.value.lerp_to(b.value, (t - a.position) / span));
            }
        }

        Some(last.value)
    }

    /// Sample, falling back to `default` for an empty gradient.
    pub fn sample_or(&self, t: f32, default: T) -> T {
        self.sample(t).unwrap_or(default)
    }
}

impl NumberGradient {
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.keys.iter().map(|k| k.value);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}
