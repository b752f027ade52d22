use crate::AngleLimits;
use crate::math::{
    clamp_euler, direction, effective_ratio, near_identity, project_onto_axis, rebase,
    rotation_between, same_rotation, scale_rotation, separate_twist_by_axis,
};
use glam::{Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn assert_vec_approx(actual: Vec3, expected: Vec3) {
    let diff = actual.distance(expected);
    assert!(
        diff <= 1.0e-5,
        "expected {expected:?}, got {actual:?} (diff {diff})"
    );
}

#[test]
fn twist_and_swing_recompose() {
    let rotation = Quat::from_rotation_z(0.6) * Quat::from_rotation_x(0.9);
    let (twist, swing) = separate_twist_by_axis(rotation, Vec3::X);
    assert!(same_rotation(swing * twist, rotation, 1.0e-5));
    assert!(same_rotation(twist, Quat::from_rotation_x(0.9), 1.0e-5));
    // The swing moves the axis without spinning about it.
    let (swing_twist, _) = separate_twist_by_axis(swing, Vec3::X);
    assert!(near_identity(swing_twist, 1.0e-5));
}

#[test]
fn degenerate_axis_keeps_everything_in_swing() {
    let rotation = Quat::from_rotation_y(0.3);
    let (twist, swing) = separate_twist_by_axis(rotation, Vec3::ZERO);
    assert_eq!(twist, Quat::IDENTITY);
    assert_eq!(swing, rotation);
}

#[test]
fn projection_onto_axis_keeps_axis_component() {
    let projected = project_onto_axis(Quat::from_rotation_y(0.5), Vec3::Y);
    assert!(same_rotation(projected, Quat::from_rotation_y(0.5), 1.0e-5));
    let dropped = project_onto_axis(Quat::from_rotation_y(0.5), Vec3::X);
    assert!(near_identity(dropped, 1.0e-5));
}

#[test]
fn effective_ratio_falls_back_to_one() {
    assert_approx(effective_ratio(3.0, 2.0), 1.5);
    assert_approx(effective_ratio(3.0, 0.0), 1.0);
    assert_approx(effective_ratio(0.0, 2.0), 1.0);
    assert_approx(effective_ratio(f32::INFINITY, 2.0), 1.0);
}

#[test]
fn rotation_between_maps_directions() {
    let from = Vec3::new(1.0, 0.0, 0.0);
    let to = Vec3::new(0.0, 2.0, 0.0);
    let rotation = rotation_between(from, to);
    assert_vec_approx(rotation * from, Vec3::Y);
    assert_eq!(rotation_between(Vec3::ZERO, to), Quat::IDENTITY);
    assert!(direction(Vec3::ONE, Vec3::ONE).is_none());
    assert_vec_approx(direction(Vec3::ZERO, to).unwrap(), Vec3::Y);
}

#[test]
fn clamp_euler_limits_each_axis() {
    let limits = AngleLimits {
        min: Vec3::new(-0.5, 0.0, 0.0),
        max: Vec3::new(0.0, 0.0, 0.0),
    };
    let clamped = clamp_euler(Quat::from_rotation_x(-1.0), &limits);
    assert!(same_rotation(clamped, Quat::from_rotation_x(-0.5), 1.0e-5));
    let clamped = clamp_euler(Quat::from_rotation_x(0.3), &limits);
    assert!(near_identity(clamped, 1.0e-5));
}

#[test]
fn rebase_places_child_under_new_parent() {
    let parent_position = Vec3::new(1.0, 2.0, 3.0);
    let parent_rotation = Quat::from_rotation_y(FRAC_PI_2);
    let child_position = Vec3::new(1.0, 2.0, 1.0);
    let child_rotation = Quat::from_rotation_z(FRAC_PI_4);
    let rest = Vec3::new(1.0, 0.0, 0.0);

    let (local_position, local_rotation) = rebase(
        parent_position,
        parent_rotation,
        child_position,
        child_rotation,
        rest,
    );
    let world_position = parent_position + parent_rotation * (rest + local_position);
    let world_rotation = parent_rotation * local_rotation;
    assert_vec_approx(world_position, child_position);
    assert!(same_rotation(world_rotation, child_rotation, 1.0e-5));
}

#[test]
fn scale_rotation_interpolates_from_identity() {
    let rotation = Quat::from_rotation_z(1.0);
    assert!(same_rotation(scale_rotation(rotation, 0.5), Quat::from_rotation_z(0.5), 1.0e-5));
    assert!(same_rotation(scale_rotation(rotation, -1.0), Quat::from_rotation_z(-1.0), 1.0e-5));
    assert_eq!(scale_rotation(rotation, 0.0), Quat::IDENTITY);
}
