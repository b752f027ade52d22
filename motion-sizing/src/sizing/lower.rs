use super::common::{
    Aim, DriftCheck, FramePlan, FrameSolution, JointRef, KeyWrite, authored_ik, bone_names,
    local_for_global, models_match, pose_direction, require_bones, sided, trunk,
};
use super::set::{Feature, SizingSet};
use crate::math::rotation_between;
use crate::{BoneDeltas, DeformOptions, Error, IkData, Joint, Motion, Side, SkeletonData, deform};
use glam::Vec3;
use log::debug;

const LOWER_THRESHOLD: f32 = 0.02;

const LEG_CHAIN: [Joint; 3] = [Joint::Leg, Joint::Knee, Joint::Ankle];

/// Re-levels the lower body to the original pelvis slope, re-aims thighs and shins with
/// synthetic IK, copies the original ankle world rotation and shifts center so the legs stay
/// where they were.
pub fn size_lower(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::Lower) {
        return Ok(false);
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();

    let mut required = vec![trunk(Joint::LowerBody)];
    for side in Side::BOTH {
        required.extend(LEG_CHAIN.map(|joint| sided(joint, side)));
    }
    let Some(o) = require_bones(Feature::Lower, &original, "original", &required) else {
        return Ok(false);
    };
    required.push(trunk(Joint::Center));
    let Some(s) = require_bones(Feature::Lower, &sizing, "sizing", &required) else {
        return Ok(false);
    };

    let compared: Vec<JointRef> = required
        .iter()
        .copied()
        .chain([trunk(Joint::Groove), trunk(Joint::Waist)])
        .collect();
    if models_match(&original, &sizing, &compared) {
        set.complete(Feature::Lower);
        return Ok(false);
    }

    let hips = Hips {
        original_lower: o[0],
        original_legs: [[o[1], o[2], o[3]], [o[4], o[5], o[6]]],
        lower: s[0],
        legs: [[s[1], s[2], s[3]], [s[4], s[5], s[6]]],
        center: s[7],
        settings: authored_ik(&sizing, &[sided(Joint::LegIk, Side::Left)]).cloned(),
    };

    let snapshot = set.output_motion.clone();
    let source = set.original_motion.clone();
    let solve = |frame| hips.solve(&original, &source, &sizing, &snapshot, frame);
    let frames = snapshot.registered_frames(&bone_names(&sizing, &hips.tracks(&sizing)));
    let plan = FramePlan::solve(frames, set_count, &solve)?;
    let mut output = snapshot.clone();
    plan.write(&mut output);

    let check = DriftCheck {
        model: &sizing,
        bones: hips.ankles().to_vec(),
        ik: false,
        threshold: LOWER_THRESHOLD,
    };
    let inserted = plan.repair(&mut output, &check, &solve)?;
    debug!("lower: set {} re-leveled, {inserted} drift keys", set.index);

    set.commit(Feature::Lower, output);
    Ok(true)
}

struct Hips {
    original_lower: usize,
    /// Leg, knee, ankle per side.
    original_legs: [[usize; 3]; 2],
    lower: usize,
    legs: [[usize; 3]; 2],
    center: usize,
    settings: Option<IkData>,
}

impl Hips {
    fn ankles(&self) -> [usize; 2] {
        [self.legs[0][2], self.legs[1][2]]
    }

    fn sizing_bones(&self) -> Vec<usize> {
        let mut bones = vec![self.center, self.lower];
        bones.extend(self.legs.iter().flatten());
        bones
    }

    fn tracks(&self, sizing: &SkeletonData) -> Vec<usize> {
        let mut tracks = self.sizing_bones();
        tracks.extend(
            [Joint::Groove, Joint::Waist]
                .into_iter()
                .filter_map(|joint| sizing.trunk(joint)),
        );
        tracks
    }

    fn leg_center(deltas: &BoneDeltas, legs: &[[usize; 3]; 2]) -> Vec3 {
        (deltas.filled_global_position(legs[0][0]) + deltas.filled_global_position(legs[1][0]))
            * 0.5
    }

    fn solve(
        &self,
        original: &SkeletonData,
        source: &Motion,
        sizing: &SkeletonData,
        motion: &Motion,
        frame: u32,
    ) -> FrameSolution {
        let mut original_bones = vec![self.original_lower];
        original_bones.extend(self.original_legs.iter().flatten());
        let truth = deform(
            original,
            source,
            frame,
            &DeformOptions::ik_on().with_bones(original_bones),
        );
        let bones = self.sizing_bones();
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
            &DeformOptions::ik_off().with_bones(bones.iter().copied()),
        );
        let mut deltas = before.clone();

        let original_slope = Self::leg_center(&truth, &self.original_legs)
            - truth.filled_global_position(self.original_lower);
        let sizing_slope =
            Self::leg_center(&deltas, &self.legs) - deltas.filled_global_position(self.lower);
        let level = rotation_between(sizing_slope, original_slope);
        let lower_global = level * deltas.filled_global_rotation(self.lower);
        let lower_local = local_for_global(sizing, &deltas, self.lower, lower_global);
        deltas.override_rotation(self.lower, lower_local);
        deltas = aim.refresh(&deltas);

        let shift = Self::leg_center(&before, &self.legs) - Self::leg_center(&deltas, &self.legs);
        if shift.length_squared() > 0.0 {
            let parent = sizing.bones[self.center]
                .parent
                .map(|p| deltas.filled_global_rotation(p).inverse())
                .unwrap_or_default();
            let moved = deltas.filled_local_position(self.center) + parent * shift;
            deltas.override_position(self.center, moved);
            deltas = aim.refresh(&deltas);
        }

        for (legs, original_legs) in self.legs.iter().zip(&self.original_legs) {
            let [leg, knee, ankle] = *legs;
            let [original_leg, original_knee, original_ankle] = *original_legs;
            deltas = aim.along(
                deltas,
                knee,
                vec![leg],
                leg,
                pose_direction(&truth, original_leg, original_knee),
            );
            deltas = aim.along(
                deltas,
                ankle,
                vec![knee],
                knee,
                pose_direction(&truth, original_knee, original_ankle),
            );
            let local = local_for_global(
                sizing,
                &deltas,
                ankle,
                truth.filled_global_rotation(original_ankle),
            );
            deltas.override_rotation(ankle, local);
        }
        let deltas = aim.refresh(&deltas);

        let mut writes = vec![
            KeyWrite::position(
                sizing.bones[self.center].name.clone(),
                deltas.keyed_position(self.center),
            ),
            KeyWrite::from_rotation(sizing, &deltas, self.lower),
        ];
        writes.extend(
            self.legs
                .iter()
                .flatten()
                .map(|&bone| KeyWrite::from_rotation(sizing, &deltas, bone)),
        );
        FrameSolution {
            writes,
            expected: self
                .ankles()
                .iter()
                .map(|&ankle| deltas.filled_global_position(ankle))
                .collect(),
        }
    }
}
