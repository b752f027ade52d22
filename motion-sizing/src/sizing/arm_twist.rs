use super::common::{
    Aim, DriftCheck, FramePlan, FrameSolution, JointRef, KeyWrite, authored_ik, bone_names,
    models_match, pose_direction, require_bones, sided,
};
use super::set::{Feature, SizingSet};
use crate::math::{near_identity, separate_twist_by_axis};
use crate::{
    BoneDeltas, DeformOptions, Error, IkData, Joint, Motion, Side, SkeletonData, deform,
    join_sides,
};
use log::debug;

const ARM_TWIST_THRESHOLD: f32 = 0.02;

/// Re-aims each arm on the sizing skeleton so elbow, wrist and hand point where the
/// original skeleton's do, pushing twist into the twist bones.
///
/// Stages per side run strictly in order, each solving on the previous stage's pose:
/// separate twist from arm and elbow, aim the arm at the elbow, aim elbow plus arm twist at
/// the wrist, turn the wrist twist toward the thumb, aim the wrist at the middle finger.
pub fn size_arm_twist(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::ArmTwist) {
        return Ok(false);
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();

    let mut chains = Vec::with_capacity(2);
    for side in Side::BOTH {
        let required = [
            sided(Joint::Arm, side),
            sided(Joint::Elbow, side),
            sided(Joint::Wrist, side),
        ];
        let Some(o) = require_bones(Feature::ArmTwist, &original, "original", &required) else {
            return Ok(false);
        };
        let Some(s) = require_bones(Feature::ArmTwist, &sizing, "sizing", &required) else {
            return Ok(false);
        };
        chains.push(ArmChain::resolve(&original, &sizing, side, &o, &s));
    }

    let compared: Vec<JointRef> = Side::BOTH
        .into_iter()
        .flat_map(|side| {
            [
                Joint::Arm,
                Joint::ArmTwist,
                Joint::Elbow,
                Joint::WristTwist,
                Joint::Wrist,
                Joint::Thumb0,
                Joint::Thumb1,
                Joint::Middle1,
            ]
            .map(|joint| sided(joint, side))
        })
        .collect();
    if models_match(&original, &sizing, &compared) {
        set.complete(Feature::ArmTwist);
        return Ok(false);
    }

    let snapshot = set.output_motion.clone();
    let source = set.original_motion.clone();
    let plan_side = |chain: &ArmChain| {
        let frames = snapshot.registered_frames(&bone_names(&sizing, &chain.tracks(&sizing)));
        FramePlan::solve(frames, set_count * 2, &|frame| {
            chain.solve(&original, &source, &sizing, &snapshot, frame)
        })
    };
    let (left, right) = join_sides(|| plan_side(&chains[0]), || plan_side(&chains[1]))?;
    let plans = [left?, right?];

    let mut output = snapshot.clone();
    let mut inserted = 0;
    for (chain, plan) in chains.iter().zip(&plans) {
        plan.write(&mut output);
        let check = DriftCheck {
            model: &sizing,
            bones: chain.check_bones(),
            ik: true,
            threshold: ARM_TWIST_THRESHOLD,
        };
        inserted += plan.repair(&mut output, &check, &|frame| {
            chain.solve(&original, &source, &sizing, &snapshot, frame)
        })?;
    }
    debug!("arm_twist: set {} resized arms, {inserted} drift keys", set.index);

    set.commit(Feature::ArmTwist, output);
    Ok(true)
}

/// One side's arm on both skeletons. `original_*` index the original skeleton, the rest
/// the sizing skeleton.
struct ArmChain {
    original_arm: usize,
    original_elbow: usize,
    original_wrist: usize,
    original_thumb: Option<usize>,
    original_middle: Option<usize>,
    arm: usize,
    arm_twist: Option<usize>,
    elbow: usize,
    wrist_twist: Option<usize>,
    wrist: usize,
    thumb: Option<usize>,
    middle: Option<usize>,
    settings: Option<IkData>,
}

impl ArmChain {
    fn resolve(
        original: &SkeletonData,
        sizing: &SkeletonData,
        side: Side,
        o: &[usize],
        s: &[usize],
    ) -> Self {
        let both = |joint: Joint| {
            original
                .sided(joint, side)
                .zip(sizing.sided(joint, side))
        };
        let thumb = both(Joint::Thumb1).or_else(|| both(Joint::Thumb0));
        let middle = both(Joint::Middle1);
        let settings = authored_ik(sizing, &[sided(Joint::ArmIk, side), sided(Joint::LegIk, side)]);
        Self {
            original_arm: o[0],
            original_elbow: o[1],
            original_wrist: o[2],
            original_thumb: thumb.map(|t| t.0),
            original_middle: middle.map(|m| m.0),
            arm: s[0],
            arm_twist: sizing.sided(Joint::ArmTwist, side),
            elbow: s[1],
            wrist_twist: sizing.sided(Joint::WristTwist, side),
            wrist: s[2],
            thumb: thumb.map(|t| t.1),
            middle: middle.map(|m| m.1),
            settings: settings.cloned(),
        }
    }

    fn sizing_bones(&self) -> Vec<usize> {
        let mut bones = vec![self.arm, self.elbow, self.wrist];
        bones.extend(
            [self.arm_twist, self.wrist_twist, self.thumb, self.middle]
                .into_iter()
                .flatten(),
        );
        bones
    }

    fn original_bones(&self) -> Vec<usize> {
        let mut bones = vec![self.original_arm, self.original_elbow, self.original_wrist];
        bones.extend([self.original_thumb, self.original_middle].into_iter().flatten());
        bones
    }

    fn tracks(&self, sizing: &SkeletonData) -> Vec<usize> {
        let mut tracks: Vec<usize> = [self.arm, self.elbow, self.wrist]
            .into_iter()
            .chain([self.arm_twist, self.wrist_twist].into_iter().flatten())
            .collect();
        if let Some(parent) = sizing.bones[self.arm].parent {
            tracks.push(parent);
        }
        tracks
    }

    fn check_bones(&self) -> Vec<usize> {
        vec![self.wrist, self.middle.unwrap_or(self.wrist)]
    }

    /// Link rotations of this frame plus the resulting hand positions.
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
            &DeformOptions::ik_on().with_bones(self.original_bones()),
        );
        let bones = self.sizing_bones();
        let aim = Aim {
            model: sizing,
            motion,
            bones: &bones,
            settings: self.settings.as_ref(),
        };
        let mut deltas = deform(
            sizing,
            motion,
            frame,
            &DeformOptions::ik_on().with_bones(bones.iter().copied()),
        );

        deltas = self.separate_twist(&aim, deltas);
        deltas = aim.along(
            deltas,
            self.elbow,
            vec![self.arm],
            self.arm,
            pose_direction(&truth, self.original_arm, self.original_elbow),
        );
        deltas = aim.along(
            deltas,
            self.wrist,
            [Some(self.elbow), self.arm_twist].into_iter().flatten().collect(),
            self.elbow,
            pose_direction(&truth, self.original_elbow, self.original_wrist),
        );
        if let (Some(thumb), Some(original_thumb), Some(wrist_twist)) =
            (self.thumb, self.original_thumb, self.wrist_twist)
        {
            deltas = aim.along(
                deltas,
                thumb,
                vec![wrist_twist],
                self.wrist,
                pose_direction(&truth, self.original_wrist, original_thumb),
            );
        }
        if let (Some(middle), Some(original_middle)) = (self.middle, self.original_middle) {
            deltas = aim.along(
                deltas,
                middle,
                vec![self.wrist],
                self.wrist,
                pose_direction(&truth, self.original_wrist, original_middle),
            );
        }

        let writes = [self.arm, self.elbow, self.wrist]
            .into_iter()
            .chain([self.arm_twist, self.wrist_twist].into_iter().flatten())
            .map(|bone| KeyWrite::from_rotation(sizing, &deltas, bone))
            .collect();
        FrameSolution {
            writes,
            expected: self
                .check_bones()
                .into_iter()
                .map(|bone| deltas.filled_global_position(bone))
                .collect(),
        }
    }

    /// Moves the twist of arm and elbow about their limb axis into the twist bones below.
    fn separate_twist(&self, aim: &Aim<'_>, mut deltas: BoneDeltas) -> BoneDeltas {
        let sizing = aim.model;
        let pairs = [
            (self.arm, self.arm_twist, self.elbow),
            (self.elbow, self.wrist_twist, self.wrist),
        ];
        let mut changed = false;
        for (bone, twist_bone, next) in pairs {
            let Some(twist_bone) = twist_bone else {
                continue;
            };
            let axis = sizing.bones[twist_bone]
                .fixed_axis
                .unwrap_or_else(|| sizing.bones[next].position - sizing.bones[bone].position);
            let (twist, swing) = separate_twist_by_axis(deltas.filled_local_rotation(bone), axis);
            if near_identity(twist, 1.0e-6) {
                continue;
            }
            let carried = twist * deltas.filled_local_rotation(twist_bone);
            deltas.override_rotation(bone, swing);
            deltas.override_rotation(twist_bone, carried);
            changed = true;
        }
        if changed { aim.refresh(&deltas) } else { deltas }
    }
}
