//! Quaternion and vector helpers shared by the evaluator and the sizing passes.

use crate::AngleLimits;
use glam::{EulerRot, Quat, Vec3};

pub const EPSILON: f32 = 1.0e-6;

/// Splits `rotation` into `(twist, swing)` with `rotation == swing * twist`, where `twist`
/// rotates about `axis` only.
pub fn separate_twist_by_axis(rotation: Quat, axis: Vec3) -> (Quat, Quat) {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return (Quat::IDENTITY, rotation);
    }
    let projected = axis * rotation.xyz().dot(axis);
    let twist = Quat::from_xyzw(projected.x, projected.y, projected.z, rotation.w);
    if twist.length_squared() <= EPSILON * EPSILON {
        // 180 degree swing: no twist component is recoverable.
        return (Quat::IDENTITY, rotation);
    }
    let twist = twist.normalize();
    let swing = (rotation * twist.inverse()).normalize();
    (twist, swing)
}

/// Keeps only the component of `rotation` about `axis`.
pub fn project_onto_axis(rotation: Quat, axis: Vec3) -> Quat {
    separate_twist_by_axis(rotation, axis).0
}

/// `numerator / denominator`, or 1 when the ratio is degenerate.
pub fn effective_ratio(numerator: f32, denominator: f32) -> f32 {
    if denominator.abs() <= EPSILON {
        return 1.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() && ratio.abs() > EPSILON {
        ratio
    } else {
        1.0
    }
}

/// Unit direction from `from` to `to`, `None` for coincident points.
pub fn direction(from: Vec3, to: Vec3) -> Option<Vec3> {
    let v = to - from;
    (v.length_squared() > EPSILON * EPSILON).then(|| v.normalize())
}

/// Shortest rotation taking direction `from` onto direction `to`; identity when either is
/// degenerate.
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    match (from.try_normalize(), to.try_normalize()) {
        (Some(a), Some(b)) => Quat::from_rotation_arc(a, b),
        _ => Quat::IDENTITY,
    }
}

/// Clamps the XYZ Euler angles of `rotation` into `limits`.
pub fn clamp_euler(rotation: Quat, limits: &AngleLimits) -> Quat {
    let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
    let clamped = Vec3::new(x, y, z).max(limits.min).min(limits.max);
    Quat::from_euler(EulerRot::XYZ, clamped.x, clamped.y, clamped.z)
}

/// Local translation and rotation that place a child at the given global transform under a
/// parent at `parent_position` / `parent_rotation`.
///
/// `rest_offset` is the child's rest offset from its parent; the returned translation is the
/// key offset on top of it.
pub fn rebase(
    parent_position: Vec3,
    parent_rotation: Quat,
    child_position: Vec3,
    child_rotation: Quat,
    rest_offset: Vec3,
) -> (Vec3, Quat) {
    let inverse = parent_rotation.inverse();
    let position = inverse * (child_position - parent_position) - rest_offset;
    let rotation = (inverse * child_rotation).normalize();
    (position, rotation)
}

pub fn near_identity(rotation: Quat, epsilon: f32) -> bool {
    rotation.abs_diff_eq(Quat::IDENTITY, epsilon) || rotation.abs_diff_eq(-Quat::IDENTITY, epsilon)
}

/// Rotations equal up to sign within `epsilon`.
pub fn same_rotation(a: Quat, b: Quat, epsilon: f32) -> bool {
    a.abs_diff_eq(b, epsilon) || a.abs_diff_eq(-b, epsilon)
}

/// Slerp from identity towards `rotation` by `factor`; negative factors invert.
pub fn scale_rotation(rotation: Quat, factor: f32) -> Quat {
    if factor == 1.0 {
        return rotation;
    }
    if factor == 0.0 {
        return Quat::IDENTITY;
    }
    let scaled = Quat::IDENTITY.slerp(rotation, factor.abs());
    if factor < 0.0 {
        scaled.inverse()
    } else {
        scaled
    }
}
