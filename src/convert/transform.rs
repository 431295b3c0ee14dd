//! Handedness conversion.
//!
//! three.quarks data is right-handed. The effect graph is left-handed: Z is
//! negated on positions and normals, the quaternion X component is negated,
//! and triangle winding is reversed. This is the only place the flip is
//! applied to imported data; [`mirror_z`] maps simulation space back into
//! Bevy's right-handed world at render time.

use bevy::math::Affine3A;
use bevy::prelude::*;

/// Build a left-handed transform from a column-major matrix, or from
/// discrete position / Euler rotation / scale when no full matrix is given.
pub fn convert_transform(
    matrix: Option<&[f32]>,
    position: Option<&[f32]>,
    rotation: Option<&[f32]>,
    scale: Option<&[f32]>,
) -> Transform {
    if let Some(cols) = matrix.and_then(|m| <&[f32; 16]>::try_from(m.get(..16)?).ok()) {
        let (scale, rotation, translation) =
            Mat4::from_cols_array(cols).to_scale_rotation_translation();
        return Transform {
            translation: flip_position(translation),
            rotation: flip_rotation(rotation),
            scale,
        };
    }

    let component = |v: Option<&[f32]>, i: usize, fallback: f32| {
        v.and_then(|v| v.get(i).copied()).unwrap_or(fallback)
    };

    let mut transform = Transform::IDENTITY;
    if position.is_some() {
        transform.translation = flip_position(Vec3::new(
            component(position, 0, 0.0),
            component(position, 1, 0.0),
            component(position, 2, 0.0),
        ));
    }
    if rotation.is_some() {
        transform.rotation = euler_to_left_handed(Vec3::new(
            component(rotation, 0, 0.0),
            component(rotation, 1, 0.0),
            component(rotation, 2, 0.0),
        ));
    }
    if scale.is_some() {
        transform.scale = Vec3::new(
            component(scale, 0, 1.0),
            component(scale, 1, 1.0),
            component(scale, 2, 1.0),
        );
    }
    transform
}

pub fn flip_position(p: Vec3) -> Vec3 {
    Vec3::new(p.x, p.y, -p.z)
}

pub fn flip_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, q.y, q.z, q.w)
}

/// Yaw (Y), pitch (X), roll (Z) with the roll negated before the quaternion
/// is built and X negated after. The order matters.
pub fn euler_to_left_handed(euler: Vec3) -> Quat {
    flip_rotation(Quat::from_euler(EulerRot::YXZ, euler.y, euler.x, -euler.z))
}

/// Negate every Z component of a packed vector buffer.
pub fn flip_z_components(values: &mut [f32], item_size: usize) {
    if item_size < 3 {
        return;
    }
    for chunk in values.chunks_exact_mut(item_size) {
        chunk[2] = -chunk[2];
    }
}

/// Swap the 2nd and 3rd index of every triangle. A trailing partial
/// triangle is left alone.
pub fn flip_winding(indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

/// Reflection across the XY plane. Simulation space → Bevy world and back
/// (it is its own inverse).
pub fn mirror_z() -> Affine3A {
    Affine3A::from_scale(Vec3::new(1.0, 1.0, -1.0))
}

/// Express a right-handed world transform in left-handed simulation space.
pub fn to_simulation_space(world: Affine3A) -> Affine3A {
    let m = mirror_z();
    m * world * m
}
