use super::common::{
    CLEANUP_THRESHOLD, DriftCheck, FramePlan, FrameSolution, KeyWrite, bone_names,
    require_bones, sided,
};
use super::set::{Feature, SizingSet};
use crate::{DeformOptions, Error, Joint, Side, SkeletonData, deform};
use log::debug;

/// Folds the grip and spread effector rotation into the finger bones under each wrist and
/// deletes the grip and spread tracks.
pub fn clean_grip(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanGrip) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let mut wrists = Vec::with_capacity(2);
    for side in Side::BOTH {
        let Some(bones) =
            require_bones(Feature::CleanGrip, &model, "original", &[sided(Joint::Wrist, side)])
        else {
            return Ok(false);
        };
        wrists.push((side, bones[0]));
    }

    let mut output = set.output_motion.clone();
    let mut changed = false;
    for (side, wrist) in wrists {
        let drivers: Vec<usize> = [Joint::Grip, Joint::Spread]
            .into_iter()
            .filter_map(|joint| model.sided(joint, side))
            .filter(|&bone| output.contains_bone_track(&model.bones[bone].name))
            .collect();
        if drivers.is_empty() {
            continue;
        }
        let fingers = driven_fingers(&model, wrist, &drivers);
        let tips = finger_tips(&model, side);

        if !fingers.is_empty() {
            let mut tracks = drivers.clone();
            tracks.extend_from_slice(&fingers);
            let snapshot = output.clone();
            let frames = snapshot.registered_frames(&bone_names(&model, &tracks));

            let mut evaluated = fingers.clone();
            evaluated.extend_from_slice(&tips);
            let options = DeformOptions::ik_off().with_bones(evaluated);
            let solve = |frame| {
                let deltas = deform(&model, &snapshot, frame, &options);
                FrameSolution {
                    writes: fingers
                        .iter()
                        .map(|&finger| KeyWrite::from_rotation(&model, &deltas, finger))
                        .collect(),
                    expected: tips
                        .iter()
                        .map(|&tip| deltas.filled_global_position(tip))
                        .collect(),
                }
            };
            let plan = FramePlan::solve(frames, set_count, &solve)?;
            plan.write(&mut output);
            for &driver in &drivers {
                output.remove_bone_track(&model.bones[driver].name);
            }
            let check = DriftCheck {
                model: &model,
                bones: tips.clone(),
                ik: false,
                threshold: CLEANUP_THRESHOLD,
            };
            let inserted = plan.repair(&mut output, &check, &solve)?;
            debug!(
                "clean_grip: set {} {side:?} folded {} fingers, {inserted} drift keys",
                set.index,
                fingers.len()
            );
        } else {
            for &driver in &drivers {
                output.remove_bone_track(&model.bones[driver].name);
            }
        }
        changed = true;
    }

    set.commit(Feature::CleanGrip, output);
    Ok(changed)
}

/// Bones under `wrist` whose rotation is inherited from one of `drivers`.
fn driven_fingers(model: &SkeletonData, wrist: usize, drivers: &[usize]) -> Vec<usize> {
    model
        .deform_order()
        .iter()
        .copied()
        .filter(|&bone| model.is_ancestor_of(wrist, bone))
        .filter(|&bone| {
            model.bones[bone]
                .effector
                .is_some_and(|e| e.rotation && drivers.contains(&e.source))
        })
        .collect()
}

/// Last present joint of each finger chain.
fn finger_tips(model: &SkeletonData, side: Side) -> Vec<usize> {
    Joint::FINGERS
        .iter()
        .filter_map(|chain| chain.iter().rev().find_map(|&joint| model.sided(joint, side)))
        .collect()
}
