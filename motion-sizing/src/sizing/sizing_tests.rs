use super::test_rig::{
    RigBuilder, assert_vec_approx, humanoid, left, position_key, rotation_key,
    sizing_set,
};
use crate::math::{direction, same_rotation};
use crate::{
    BoneDeltas, DeformOptions, Feature, Joint, Motion, Side, SkeletonData, deform, size_arm_twist,
    size_leg, size_lower, size_shoulder, size_stance, size_upper, stance_offsets,
};
use glam::{Quat, Vec3};

fn bone(model: &SkeletonData, name: &str) -> usize {
    model.bone_index(name).unwrap()
}

fn limb(model: &SkeletonData, deltas: &BoneDeltas, from: &str, to: &str) -> Vec3 {
    direction(
        deltas.filled_global_position(bone(model, from)),
        deltas.filled_global_position(bone(model, to)),
    )
    .unwrap()
}

fn waving() -> Motion {
    let mut motion = Motion::new("wave");
    rotation_key(&mut motion, &left(Joint::Arm), 0, Quat::from_rotation_z(-0.4));
    rotation_key(&mut motion, &left(Joint::Elbow), 0, Quat::from_rotation_y(-0.6));
    rotation_key(&mut motion, &left(Joint::Arm), 30, Quat::from_rotation_z(0.2));
    motion
}

#[test]
fn identical_skeletons_leave_the_motion_untouched() {
    let mut motion = waving();
    position_key(&mut motion, &Joint::Center.trunk(), 0, Vec3::new(0.0, -1.0, 0.5));
    rotation_key(&mut motion, &Joint::UpperBody.trunk(), 0, Quat::from_rotation_x(0.3));
    let features = [
        Feature::ArmStance,
        Feature::FingerStance,
        Feature::ArmTwist,
        Feature::Lower,
        Feature::Leg,
        Feature::Upper,
        Feature::Shoulder,
    ];
    let mut set = sizing_set(humanoid("a"), humanoid("b"), motion, &features);

    assert!(!size_stance(&mut set, 1).unwrap());
    assert!(!size_arm_twist(&mut set, 1).unwrap());
    assert!(!size_lower(&mut set, 1).unwrap());
    assert!(!size_leg(&mut set, 1).unwrap());
    assert!(!size_upper(&mut set, 1).unwrap());
    assert!(!size_shoulder(&mut set, 1).unwrap());

    for feature in features {
        assert!(set.is_done(feature), "{feature:?} still pending");
    }
    assert_eq!(&set.output_motion, set.original_motion.as_ref());
}

#[test]
fn stance_offsets_map_sizing_rest_directions_onto_original() {
    let down = Quat::from_rotation_z(-30f32.to_radians());
    let original = humanoid("t-pose");
    let sizing = RigBuilder::humanoid().turn(&left(Joint::Arm), down).build("a-pose");

    let offsets = stance_offsets(&original, &sizing, true, false);
    let find = |name: String| offsets.iter().find(|o| o.bone == name).unwrap().clone();

    let arm = find(left(Joint::Arm));
    let to_elbow = |model: &SkeletonData| {
        model.bones[bone(model, &left(Joint::Elbow))].position
            - model.bones[bone(model, &left(Joint::Arm))].position
    };
    assert!(same_rotation(arm.pre, Quat::IDENTITY, 1.0e-6));
    assert_vec_approx(
        (arm.post * to_elbow(&sizing)).normalize(),
        to_elbow(&original).normalize(),
    );

    let twist = find(left(Joint::ArmTwist));
    assert!(same_rotation(twist.pre, arm.post.inverse(), 1.0e-5));
    assert!(same_rotation(twist.post, arm.post, 1.0e-5));

    let elbow = find(left(Joint::Elbow));
    assert!(same_rotation(elbow.pre, arm.post.inverse(), 1.0e-5));

    // The right arm was not turned.
    assert!(find(Joint::Arm.sided(Side::Right)).is_identity());
}

#[test]
fn stance_keeps_world_arm_directions() {
    let down = Quat::from_rotation_z(-30f32.to_radians());
    let original = humanoid("t-pose");
    let sizing = RigBuilder::humanoid().turn(&left(Joint::Arm), down).build("a-pose");
    let mut set = sizing_set(original.clone(), sizing.clone(), waving(), &[Feature::ArmStance]);

    assert!(size_stance(&mut set, 1).unwrap());
    assert!(set.is_done(Feature::ArmStance));
    assert!(!set.is_done(Feature::FingerStance));

    for frame in [0, 15, 30] {
        let truth = deform(&original, &set.original_motion, frame, &DeformOptions::ik_off());
        let posed = deform(&sizing, &set.output_motion, frame, &DeformOptions::ik_off());
        for (from, to) in [
            (Joint::Arm, Joint::Elbow),
            (Joint::Elbow, Joint::Wrist),
            (Joint::Wrist, Joint::Middle1),
        ] {
            let (from, to) = (left(from), left(to));
            assert_vec_approx(
                limb(&sizing, &posed, &from, &to),
                limb(&original, &truth, &from, &to),
            );
        }
    }
}

#[test]
fn arm_twist_reaims_a_bent_arm() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid()
        .shift(&left(Joint::Elbow), Vec3::new(0.0, -0.5, 0.0))
        .build("long upper arm");
    let mut set = sizing_set(original.clone(), sizing.clone(), waving(), &[Feature::ArmTwist]);

    assert!(size_arm_twist(&mut set, 1).unwrap());
    assert!(set.is_done(Feature::ArmTwist));

    let truth = deform(&original, &set.original_motion, 0, &DeformOptions::ik_on());
    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_on());
    for (from, to) in [(Joint::Arm, Joint::Elbow), (Joint::Elbow, Joint::Wrist)] {
        let (from, to) = (left(from), left(to));
        assert_vec_approx(
            limb(&sizing, &posed, &from, &to),
            limb(&original, &truth, &from, &to),
        );
    }
}

#[test]
fn arm_twist_needs_both_arms() {
    let sizing = RigBuilder::humanoid()
        .without(&Joint::Elbow.sided(Side::Right))
        .build("one elbow");
    let mut set = sizing_set(humanoid("original"), sizing, waving(), &[Feature::ArmTwist]);

    assert!(!size_arm_twist(&mut set, 1).unwrap());
    assert!(!set.is_done(Feature::ArmTwist));
    assert_eq!(&set.output_motion, set.original_motion.as_ref());
}

#[test]
fn lower_follows_the_original_leg_directions() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid().scaled(1.1).build("tall");
    let mut motion = Motion::new("bow");
    rotation_key(&mut motion, &Joint::LowerBody.trunk(), 0, Quat::from_rotation_x(0.2));
    let mut set = sizing_set(original.clone(), sizing.clone(), motion, &[Feature::Lower]);

    assert!(size_lower(&mut set, 1).unwrap());
    assert!(set.is_done(Feature::Lower));

    let truth = deform(&original, &set.original_motion, 0, &DeformOptions::ik_on());
    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_off());
    for side in Side::BOTH {
        let [leg, knee, ankle] = [Joint::Leg, Joint::Knee, Joint::Ankle].map(|j| j.sided(side));
        assert_vec_approx(
            limb(&sizing, &posed, &leg, &knee),
            limb(&original, &truth, &leg, &knee),
        );
        assert_vec_approx(
            limb(&sizing, &posed, &knee, &ankle),
            limb(&original, &truth, &knee, &ankle),
        );
        assert!(same_rotation(
            posed.filled_global_rotation(bone(&sizing, &ankle)),
            truth.filled_global_rotation(bone(&original, &ankle)),
            1.0e-3
        ));
    }
}

#[test]
fn lower_needs_a_sizing_center() {
    let sizing = RigBuilder::humanoid()
        .scaled(1.1)
        .without(&Joint::Center.trunk())
        .build("no center");
    let mut set = sizing_set(humanoid("original"), sizing, Motion::new("idle"), &[Feature::Lower]);

    assert!(!size_lower(&mut set, 1).unwrap());
    assert!(!set.is_done(Feature::Lower));
}

#[test]
fn leg_scales_center_travel_and_keeps_feet_planted() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid().scaled(1.1).build("tall");
    let mut motion = Motion::new("crouch");
    position_key(&mut motion, &Joint::Center.trunk(), 0, Vec3::new(0.0, -1.0, 0.0));
    let mut set = sizing_set(original, sizing.clone(), motion, &[Feature::Leg]);

    assert!(size_leg(&mut set, 1).unwrap());
    assert!(set.is_done(Feature::Leg));

    // Center travel scales with the legs; the ground offset only absorbs IK residue.
    let center = set.output_motion.bone_frame(&Joint::Center.trunk(), 0);
    assert!(
        center.position.distance(Vec3::new(0.0, -1.1, 0.0)) <= 1.0e-2,
        "center key {:?}",
        center.position
    );

    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_on());
    let ankle = posed.filled_global_position(bone(&sizing, &left(Joint::Ankle)));
    assert!(
        ankle.distance(Vec3::new(1.1, 1.1, 0.0)) <= 0.05,
        "left ankle at {ankle:?}"
    );

    // Leg IK now sits on the baked ankle.
    let leg_ik = posed.filled_global_position(bone(&sizing, &left(Joint::LegIk)));
    assert_vec_approx(leg_ik, ankle);
}

#[test]
fn leg_keeps_shorter_shins_on_the_ground() {
    let original = humanoid("original");
    let mut rig = RigBuilder::humanoid();
    for side in Side::BOTH {
        rig = rig
            .shift(&Joint::Knee.sided(side), Vec3::new(0.0, -0.5, 0.0))
            .shift(&Joint::LegIk.sided(side), Vec3::new(0.0, -0.5, 0.0));
    }
    let sizing = rig.build("low ankles");
    let mut motion = Motion::new("idle");
    position_key(&mut motion, &Joint::Center.trunk(), 0, Vec3::ZERO);
    let mut set = sizing_set(original, sizing.clone(), motion, &[Feature::Leg]);

    assert!(size_leg(&mut set, 1).unwrap());

    let center = set.output_motion.bone_frame(&Joint::Center.trunk(), 0);
    assert_vec_approx(center.position, Vec3::ZERO);

    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_on());
    for side in Side::BOTH {
        let ankle = bone(&sizing, &Joint::Ankle.sided(side));
        assert_vec_approx(
            posed.filled_global_position(ankle),
            sizing.bones[ankle].position,
        );
        // Sole direction follows the original ankle -> toe.
        let (ankle, toe) = (Joint::Ankle.sided(side), Joint::Toe.sided(side));
        assert_vec_approx(
            limb(&sizing, &posed, &ankle, &toe),
            Vec3::new(0.0, -1.0, -1.0).normalize(),
        );
    }
}

#[test]
fn shoulder_keeps_arm_direction_and_rotation() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid()
        .shift(&left(Joint::Arm), Vec3::new(0.5, 0.5, 0.0))
        .build("raised shoulder");
    let mut motion = Motion::new("shrug");
    rotation_key(&mut motion, &left(Joint::Shoulder), 0, Quat::from_rotation_z(0.2));
    let mut set = sizing_set(original, sizing.clone(), motion, &[Feature::Shoulder]);

    assert!(size_shoulder(&mut set, 1).unwrap());

    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_on());
    let shoulder_to_arm = limb(&sizing, &posed, &left(Joint::Shoulder), &left(Joint::Arm));
    assert_vec_approx(shoulder_to_arm, Quat::from_rotation_z(0.2) * Vec3::X);

    let arm = posed.filled_global_rotation(bone(&sizing, &left(Joint::Arm)));
    assert!(same_rotation(arm, Quat::from_rotation_z(0.2), 1.0e-3));
}

#[test]
fn upper_scales_reach_by_torso_ratio() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid()
        .shift(&Joint::UpperBody2.trunk(), Vec3::new(0.0, 0.0, -0.5))
        .build("hunched");
    let mut motion = Motion::new("lean");
    rotation_key(&mut motion, &Joint::UpperBody.trunk(), 0, Quat::from_rotation_x(0.3));
    let mut set = sizing_set(original.clone(), sizing.clone(), motion, &[Feature::Upper]);

    assert!(size_upper(&mut set, 1).unwrap());

    let truth = deform(&original, &set.original_motion, 0, &DeformOptions::ik_on());
    let posed = deform(&sizing, &set.output_motion, 0, &DeformOptions::ik_on());
    let (upper, neck) = (Joint::UpperBody.trunk(), Joint::Neck.trunk());
    let reach = |model: &SkeletonData, deltas: &BoneDeltas| {
        deltas.filled_global_position(bone(model, &neck))
            - deltas.filled_global_position(bone(model, &upper))
    };
    let ratio = sizing.rest_distance(bone(&sizing, &upper), bone(&sizing, &neck)) / 4.0;
    let expected = reach(&original, &truth) * ratio;
    let actual = reach(&sizing, &posed);
    assert!(
        actual.distance(expected) <= 1.0e-2,
        "neck reach {actual:?}, expected {expected:?}"
    );

    // The neck keeps its world rotation.
    assert!(same_rotation(
        posed.filled_global_rotation(bone(&sizing, &neck)),
        Quat::from_rotation_x(0.3),
        1.0e-3
    ));
}
