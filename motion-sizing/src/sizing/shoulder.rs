use super::common::{
    Aim, DriftCheck, FramePlan, FrameSolution, JointRef, KeyWrite, authored_ik, bone_names,
    local_for_global, models_match, require_bones, sided,
};
use super::set::{Feature, SizingSet};
use crate::math::effective_ratio;
use crate::{DeformOptions, Error, IkData, Joint, Motion, Side, SkeletonData, deform, join_sides};
use log::debug;

const SHOULDER_THRESHOLD: f32 = 0.01;

/// Turns each shoulder so the arm joint sits where the original shoulder puts it, scaled by
/// the shoulder-to-arm length ratio, keeping the arm's world rotation.
pub fn size_shoulder(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::Shoulder) {
        return Ok(false);
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();

    let mut sides = Vec::with_capacity(2);
    for side in Side::BOTH {
        let required = [sided(Joint::Shoulder, side), sided(Joint::Arm, side)];
        let Some(o) = require_bones(Feature::Shoulder, &original, "original", &required) else {
            return Ok(false);
        };
        let Some(s) = require_bones(Feature::Shoulder, &sizing, "sizing", &required) else {
            return Ok(false);
        };
        let scale = effective_ratio(
            sizing.rest_distance(s[0], s[1]),
            original.rest_distance(o[0], o[1]),
        );
        sides.push(ShoulderSide {
            original_shoulder: o[0],
            original_arm: o[1],
            shoulder: s[0],
            arm: s[1],
            scale,
            settings: authored_ik(&sizing, &[sided(Joint::ArmIk, side), sided(Joint::LegIk, side)])
                .cloned(),
        });
    }

    let compared: Vec<JointRef> = Side::BOTH
        .into_iter()
        .flat_map(|side| [sided(Joint::Shoulder, side), sided(Joint::Arm, side)])
        .collect();
    if models_match(&original, &sizing, &compared) {
        set.complete(Feature::Shoulder);
        return Ok(false);
    }

    let snapshot = set.output_motion.clone();
    let source = set.original_motion.clone();
    let plan_side = |side: &ShoulderSide| {
        let frames = snapshot.registered_frames(&bone_names(&sizing, &side.tracks(&sizing)));
        FramePlan::solve(frames, set_count * 2, &|frame| {
            side.solve(&original, &source, &sizing, &snapshot, frame)
        })
    };
    let (left, right) = join_sides(|| plan_side(&sides[0]), || plan_side(&sides[1]))?;
    let plans = [left?, right?];

    let mut output = snapshot.clone();
    let mut inserted = 0;
    for (side, plan) in sides.iter().zip(&plans) {
        plan.write(&mut output);
        let check = DriftCheck {
            model: &sizing,
            bones: vec![side.arm],
            ik: true,
            threshold: SHOULDER_THRESHOLD,
        };
        inserted += plan.repair(&mut output, &check, &|frame| {
            side.solve(&original, &source, &sizing, &snapshot, frame)
        })?;
    }
    debug!("shoulder: set {} resized shoulders, {inserted} drift keys", set.index);

    set.commit(Feature::Shoulder, output);
    Ok(true)
}

struct ShoulderSide {
    original_shoulder: usize,
    original_arm: usize,
    shoulder: usize,
    arm: usize,
    scale: f32,
    settings: Option<IkData>,
}

impl ShoulderSide {
    fn tracks(&self, sizing: &SkeletonData) -> Vec<usize> {
        let mut tracks = vec![self.shoulder, self.arm];
        tracks.extend(sizing.bones[self.shoulder].parent);
        tracks
    }

    fn solve(
        &self,
        original: &SkeletonData,
        source: &Motion,
        sizing: &SkeletonData,
        motion: &Motion,
        frame: u32,
    ) -> FrameSolution {
        let truth = deform(
            original,
            source,
            frame,
            &DeformOptions::ik_on().with_bones([self.original_shoulder, self.original_arm]),
        );
        let bones = [self.shoulder, self.arm];
        let aim = Aim {
            model: sizing,
            motion,
            bones: &bones,
            settings: self.settings.as_ref(),
        };
        let before = deform(
            sizing,
            motion,
            frame,
            &DeformOptions::ik_on().with_bones(bones),
        );

        let reach = (truth.filled_global_position(self.original_arm)
            - truth.filled_global_position(self.original_shoulder))
            * self.scale;
        let goal = before.filled_global_position(self.shoulder) + reach;
        let mut deltas = aim.toward(before.clone(), self.arm, vec![self.shoulder], goal);

        let arm = local_for_global(sizing, &deltas, self.arm, before.filled_global_rotation(self.arm));
        deltas.override_rotation(self.arm, arm);
        let deltas = aim.refresh(&deltas);

        FrameSolution {
            writes: vec![
                KeyWrite::from_rotation(sizing, &deltas, self.shoulder),
                KeyWrite::from_rotation(sizing, &deltas, self.arm),
            ],
            expected: vec![deltas.filled_global_position(self.arm)],
        }
    }
}
