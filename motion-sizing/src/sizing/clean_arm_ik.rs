use super::common::{
    CLEANUP_THRESHOLD, DriftCheck, FramePlan, FrameSolution, KeyWrite, bone_names,
    require_bones, sided,
};
use super::set::{Feature, SizingSet};
use crate::{DeformOptions, Error, Joint, Motion, Side, SkeletonData, deform};
use log::debug;

/// Bakes the IK-resolved arm chain into FK keys and switches the arm IK off.
///
/// Sides without an arm IK bone, or whose arm IK is already disabled, are left alone.
pub fn clean_arm_ik(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanArmIk) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    for side in Side::BOTH {
        let required = [sided(Joint::Arm, side), sided(Joint::Wrist, side)];
        if require_bones(Feature::CleanArmIk, &model, "original", &required).is_none() {
            return Ok(false);
        }
    }

    let mut output = set.output_motion.clone();
    let mut changed = false;
    for side in Side::BOTH {
        let Some(arm_ik) = model.sided(Joint::ArmIk, side) else {
            continue;
        };
        let name = model.bones[arm_ik].name.clone();
        if model.bones[arm_ik].ik.is_none() || !output.is_ik_enabled(&name) {
            continue;
        }
        let inserted = bake_side(&model, &mut output, arm_ik, set_count)?;
        output.remove_bone_track(&name);
        debug!("clean_arm_ik: set {} baked `{name}`, {inserted} drift keys", set.index);
        changed = true;
    }

    set.commit(Feature::CleanArmIk, output);
    Ok(changed)
}

fn bake_side(
    model: &SkeletonData,
    motion: &mut Motion,
    arm_ik: usize,
    set_count: usize,
) -> Result<usize, Error> {
    let Some(ik) = model.bones[arm_ik].ik.as_ref() else {
        return Ok(0);
    };
    let links: Vec<usize> = ik.links.iter().map(|link| link.bone).collect();
    let target = ik.target;

    let mut tracks = vec![arm_ik, target];
    tracks.extend_from_slice(&links);
    let snapshot = motion.clone();
    let frames = snapshot.registered_frames(&bone_names(model, &tracks));

    let options = DeformOptions::ik_on().with_bones(tracks.iter().copied());
    let solve = |frame| {
        let deltas = deform(model, &snapshot, frame, &options);
        FrameSolution {
            writes: links
                .iter()
                .map(|&link| KeyWrite::from_rotation(model, &deltas, link))
                .collect(),
            expected: vec![deltas.filled_global_position(target)],
        }
    };
    let plan = FramePlan::solve(frames, set_count, &solve)?;
    plan.write(motion);

    // Drift is measured on the FK pose the keys now describe.
    motion.set_ik_enabled(&model.bones[arm_ik].name, false);
    let check = DriftCheck {
        model,
        bones: vec![target],
        ik: true,
        threshold: CLEANUP_THRESHOLD,
    };
    plan.repair(motion, &check, &solve)
}
