use super::test_rig::{RigBuilder, humanoid, left, position_key, rotation_key, sizing_set};
use crate::{Feature, FeatureFlags, Joint, Motion, SizingSet, run_pipeline, run_pipelines};
use glam::{Quat, Vec3};
use std::sync::Arc;

fn dance() -> Motion {
    let mut motion = Motion::new("dance");
    rotation_key(&mut motion, &Joint::Waist.trunk(), 0, Quat::IDENTITY);
    rotation_key(&mut motion, &Joint::Waist.trunk(), 20, Quat::from_rotation_y(0.4));
    rotation_key(&mut motion, &left(Joint::Arm), 0, Quat::from_rotation_z(-0.5));
    rotation_key(&mut motion, &left(Joint::Arm), 20, Quat::from_rotation_z(0.1));
    position_key(&mut motion, &Joint::Center.trunk(), 10, Vec3::new(0.0, -0.5, 0.3));
    motion
}

#[test]
fn pipeline_runs_every_enabled_pass_once() {
    let model = humanoid("model");
    let mut set = SizingSet::new(0, model.clone(), model, Arc::new(dance()))
        .with_features(FeatureFlags::all());

    assert!(run_pipeline(&mut set, 1).unwrap());
    for feature in Feature::ALL {
        assert!(set.is_done(feature), "{feature:?} still pending");
    }
    assert!(!set.output_motion.contains_bone_track(&Joint::Waist.trunk()));

    let first = set.output_motion.clone();
    assert!(!run_pipeline(&mut set, 1).unwrap());
    assert_eq!(set.output_motion, first);
}

#[test]
fn disabled_features_stay_pending() {
    let model = humanoid("model");
    let mut features = FeatureFlags::all();
    features.set_enabled(Feature::CleanWaist, false);
    let mut set = SizingSet::new(0, model.clone(), model, Arc::new(dance())).with_features(features);

    run_pipeline(&mut set, 1).unwrap();
    assert!(!set.is_done(Feature::CleanWaist));
    assert!(set.output_motion.contains_bone_track(&Joint::Waist.trunk()));
}

#[test]
fn passes_missing_bones_stay_pending() {
    let original = humanoid("original");
    let sizing = RigBuilder::humanoid()
        .without(&Joint::Center.trunk())
        .build("no center");
    let features = [Feature::CleanRoot, Feature::Lower, Feature::Leg, Feature::Upper];
    let mut set = sizing_set(original, sizing, dance(), &features);

    run_pipeline(&mut set, 1).unwrap();
    assert!(set.is_done(Feature::CleanRoot));
    assert!(set.is_done(Feature::Upper));
    assert!(!set.is_done(Feature::Lower));
    assert!(!set.is_done(Feature::Leg));
}

#[test]
fn sets_run_independently() {
    let model = humanoid("model");
    let tall = RigBuilder::humanoid().scaled(1.2).build("tall");
    let source = Arc::new(dance());
    let mut sets = vec![
        SizingSet::new(0, model.clone(), model.clone(), source.clone()),
        SizingSet::new(1, model.clone(), tall, source.clone())
            .with_features(FeatureFlags::from_features([Feature::Leg])),
        SizingSet::new(2, model.clone(), model, source)
            .with_features(FeatureFlags::from_features([Feature::CleanWaist])),
    ];

    let results = run_pipelines(&mut sets);
    assert_eq!(results.len(), 3);
    assert!(!*results[0].as_ref().unwrap());
    assert!(*results[1].as_ref().unwrap());
    assert!(*results[2].as_ref().unwrap());

    assert_eq!(&sets[0].output_motion, sets[0].original_motion.as_ref());
    assert!(sets[1].is_done(Feature::Leg));
    assert!(!sets[1].is_done(Feature::CleanWaist));
    assert!(sets[2].is_done(Feature::CleanWaist));
    assert!(!sets[2].output_motion.contains_bone_track(&Joint::Waist.trunk()));
}
