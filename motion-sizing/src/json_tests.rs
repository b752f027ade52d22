use crate::{
    BoneTail, Error, Feature, FeatureFlags, Joint, Motion, Side, SizingConfig, SkeletonData,
};
use glam::{Quat, Vec3};

const SKELETON: &str = r#"{
  "name": "test",
  "bones": [
    { "name": "left knee", "parent": "left leg", "position": [1, 5, -0.2] },
    { "name": "left leg", "position": [1, 10, 0], "tailBone": "left knee" },
    { "name": "left ankle", "parent": "left knee", "position": [1, 1, 0] },
    {
      "name": "left leg IK",
      "position": [1, 1, 0],
      "translatable": true,
      "ik": {
        "target": "left ankle",
        "loopCount": 20,
        "unitRotation": 0.5,
        "links": [
          { "bone": "left knee", "limits": { "min": [-180, 0, 0], "max": [-0.5, 0, 0] } },
          { "bone": "left leg" }
        ]
      }
    },
    {
      "name": "left twist",
      "parent": "left leg",
      "position": [1, 8, 0],
      "fixedAxis": [0, -1, 0],
      "effector": { "source": "left leg", "factor": 0.5, "rotation": true }
    }
  ],
  "morphs": [
    { "name": "bend", "bones": [ { "bone": "left knee", "rotation": [0, 0, 0, 2] } ] }
  ]
}"#;

#[test]
fn skeleton_resolves_forward_references() {
    let skeleton = SkeletonData::from_json_str(SKELETON).unwrap();
    assert_eq!(skeleton.name, "test");
    assert_eq!(skeleton.bones.len(), 5);

    let knee = skeleton.bone_index("left knee").unwrap();
    let leg = skeleton.bone_index("left leg").unwrap();
    assert_eq!(skeleton.bones[knee].parent, Some(leg));
    assert_eq!(skeleton.bones[leg].tail, BoneTail::Bone(knee));
    assert_eq!(skeleton.sided(Joint::Knee, Side::Left), Some(knee));

    let ik = skeleton.bone("left leg IK").unwrap().ik.as_ref().unwrap();
    assert_eq!(ik.target, skeleton.bone_index("left ankle").unwrap());
    assert_eq!(ik.loop_count, 20);
    assert_eq!(ik.links.len(), 2);
    let limits = ik.links[0].limits.unwrap();
    assert!((limits.min.x + std::f32::consts::PI).abs() < 1.0e-5);
    assert!(ik.links[1].limits.is_none());

    let twist = skeleton.bone("left twist").unwrap();
    assert_eq!(twist.fixed_axis, Some(Vec3::new(0.0, -1.0, 0.0)));
    let effector = twist.effector.unwrap();
    assert_eq!(effector.source, leg);
    assert!(effector.rotation && !effector.translation);

    let morph = skeleton.morph("bend").unwrap();
    assert_eq!(morph.offsets[0].rotation, Quat::IDENTITY);
}

#[test]
fn unknown_parent_is_reported() {
    let input = r#"{ "bones": [ { "name": "a", "parent": "ghost" } ] }"#;
    match SkeletonData::from_json_str(input) {
        Err(Error::JsonUnknownBoneParent { bone, parent }) => {
            assert_eq!(bone, "a");
            assert_eq!(parent, "ghost");
        }
        other => panic!("unexpected result: {:?}", other.map(|s| s.bones.len())),
    }
}

#[test]
fn unknown_ik_target_is_reported() {
    let input = r#"{ "bones": [ { "name": "a", "ik": { "target": "ghost" } } ] }"#;
    assert!(matches!(
        SkeletonData::from_json_str(input),
        Err(Error::JsonUnknownBone { ref name, .. }) if name == "ghost"
    ));
}

#[test]
fn duplicate_bone_names_fail_model_construction() {
    let input = r#"{ "bones": [ { "name": "a" }, { "name": "a" } ] }"#;
    assert!(matches!(
        SkeletonData::from_json_str(input),
        Err(Error::DuplicateBoneName { .. })
    ));
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert!(matches!(
        SkeletonData::from_json_str("{ bones: "),
        Err(Error::JsonParse { .. })
    ));
    assert!(matches!(
        Motion::from_json_str(r#"{ "bones": 3 }"#),
        Err(Error::JsonParse { .. })
    ));
}

const MOTION: &str = r#"{
  "name": "walk",
  "bones": [
    {
      "name": "center",
      "frames": [
        { "frame": 10, "position": [0, 1, 0] },
        { "frame": 0, "position": [0, 0, 0], "rotation": [0, 0, 0, 1] }
      ]
    },
    {
      "name": "left arm",
      "frames": [
        {
          "frame": 5,
          "rotation": [0, 0, 0.38268343, 0.9238795],
          "curves": { "rotate": [0.5, 0, 0.5, 1] }
        }
      ]
    }
  ],
  "morphs": [ { "name": "smile", "frames": [ { "frame": 3, "ratio": 0.25 } ] } ],
  "disabledIk": [ "left leg IK" ]
}"#;

#[test]
fn motion_loads_registered_keys() {
    let motion = Motion::from_json_str(MOTION).unwrap();
    assert_eq!(motion.name, "walk");
    assert_eq!(motion.registered_frames(&["center", "left arm"]), vec![0, 5, 10]);
    assert!((motion.bone_frame("center", 5).position.y - 0.5).abs() < 1.0e-5);

    let arm = motion.bone_track("left arm").unwrap().get(5).unwrap();
    assert!(!arm.curves.rotate.is_linear());
    assert!(arm.curves.translate_x.is_linear());
    assert!(
        arm.rotation
            .abs_diff_eq(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4), 1.0e-5)
    );

    assert!(!motion.is_ik_enabled("left leg IK"));
    assert!((motion.morph_track("smile").unwrap().ratio(3) - 0.25).abs() < 1.0e-6);
}

#[test]
fn motion_survives_a_write_and_read() {
    let motion = Motion::from_json_str(MOTION).unwrap();
    let written = motion.to_json_string().unwrap();
    let reread = Motion::from_json_str(&written).unwrap();
    assert_eq!(reread.name, motion.name);

    for track in motion.bone_tracks() {
        let copy = reread.bone_track(&track.name).unwrap();
        assert_eq!(copy.len(), track.len());
        for (frame, key) in track.frames() {
            let other = copy.get(frame).unwrap();
            assert!(other.position.abs_diff_eq(key.position, 1.0e-6));
            assert!(other.rotation.abs_diff_eq(key.rotation, 1.0e-6));
            assert_eq!(other.curves, key.curves);
            assert!(other.registered);
        }
    }
    assert_eq!(reread.morph_tracks().count(), 1);
    assert_eq!(reread.disabled_iks().collect::<Vec<_>>(), vec!["left leg IK"]);
}

#[test]
fn config_enables_listed_features() {
    let config = SizingConfig::from_json_str(
        r#"{ "features": ["clean_root", "arm_twist", "leg"], "setCount": 3 }"#,
    )
    .unwrap();
    assert_eq!(config.set_count, 3);
    assert_eq!(
        config.features.enabled().collect::<Vec<_>>(),
        vec![Feature::CleanRoot, Feature::ArmTwist, Feature::Leg]
    );
}

#[test]
fn config_defaults_to_every_feature() {
    let config = SizingConfig::from_json_str(r#"{ "disabled": ["clean_grip"] }"#).unwrap();
    assert_eq!(config.set_count, 1);
    let mut expected = FeatureFlags::all();
    expected.set_enabled(Feature::CleanGrip, false);
    assert_eq!(config.features, expected);
}

#[test]
fn config_rejects_unknown_features() {
    let result = SizingConfig::from_json_str(r#"{ "features": ["clean_tail"] }"#);
    assert!(matches!(
        result,
        Err(Error::JsonUnknownFeature { ref name }) if name == "clean_tail"
    ));
}
