use super::common::{
    Aim, DriftCheck, FramePlan, FrameSolution, JointRef, KeyWrite, MODEL_EPSILON, authored_ik,
    bone_names, models_match, pose_direction, require_bones, sided, trunk,
};
use super::set::{Feature, SizingSet};
use crate::math::{effective_ratio, rebase};
use crate::{
    BoneDeltas, DeformOptions, Error, IkData, Joint, Motion, Side, SkeletonData, deform,
    deform_from,
};
use glam::{Quat, Vec3};
use log::debug;

const LEG_CHAIN: [Joint; 3] = [Joint::Leg, Joint::Knee, Joint::Ankle];

/// Bakes the IK-resolved legs into FK keys and scales center travel by the leg-height ratio.
///
/// Per frame, the gap between the baked right ankle and the ankle the sizing leg IK solves
/// to is moved into center, then leg IK and toe IK are re-posed onto the FK feet.
pub fn size_leg(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::Leg) {
        return Ok(false);
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();

    let mut required: Vec<JointRef> = Side::BOTH
        .into_iter()
        .flat_map(|side| LEG_CHAIN.map(|joint| sided(joint, side)))
        .collect();
    let Some(o) = require_bones(Feature::Leg, &original, "original", &required) else {
        return Ok(false);
    };
    required.push(trunk(Joint::Center));
    let Some(s) = require_bones(Feature::Leg, &sizing, "sizing", &required) else {
        return Ok(false);
    };

    let mut compared = required.clone();
    compared.push(trunk(Joint::Groove));
    for side in Side::BOTH {
        compared.extend([Joint::Toe, Joint::LegIk, Joint::ToeIk].map(|joint| sided(joint, side)));
    }
    if models_match(&original, &sizing, &compared) {
        set.complete(Feature::Leg);
        return Ok(false);
    }

    let legs = Legs::resolve(&original, &sizing, &o, &s, set.is_done(Feature::Lower));
    let threshold = (sizing.bones[legs.sizing[0].ankle].position.y * 0.05).max(0.01);

    let snapshot = set.output_motion.clone();
    let source = set.original_motion.clone();
    let solve = |frame| legs.solve(&original, &source, &sizing, &snapshot, frame);
    let frames = snapshot.registered_frames(&bone_names(&sizing, &legs.tracks(&sizing)));
    let plan = FramePlan::solve(frames, set_count, &solve)?;
    let mut output = snapshot.clone();
    plan.write(&mut output);

    let check = DriftCheck {
        model: &sizing,
        bones: legs.sizing.iter().map(|leg| leg.ankle).collect(),
        ik: true,
        threshold,
    };
    let inserted = plan.repair(&mut output, &check, &solve)?;
    debug!(
        "leg: set {} ratio {:.4}, {inserted} drift keys",
        set.index, legs.ratio
    );

    set.commit(Feature::Leg, output);
    Ok(true)
}

#[derive(Copy, Clone, Debug)]
struct LegBones {
    leg: usize,
    knee: usize,
    ankle: usize,
    toe: Option<usize>,
    leg_ik: Option<usize>,
    toe_ik: Option<usize>,
}

impl LegBones {
    fn resolve(model: &SkeletonData, side: Side, chain: &[usize]) -> Self {
        Self {
            leg: chain[0],
            knee: chain[1],
            ankle: chain[2],
            toe: model.sided(Joint::Toe, side),
            leg_ik: model.sided(Joint::LegIk, side),
            toe_ik: model.sided(Joint::ToeIk, side),
        }
    }

    fn chain(&self) -> [usize; 3] {
        [self.leg, self.knee, self.ankle]
    }

    fn bones(&self) -> impl Iterator<Item = usize> {
        self.chain()
            .into_iter()
            .chain([self.toe, self.leg_ik, self.toe_ik].into_iter().flatten())
    }
}

struct Legs {
    original: [LegBones; 2],
    sizing: [LegBones; 2],
    center: usize,
    groove: Option<usize>,
    /// Sizing over original leg height.
    ratio: f32,
    /// Reuse the original leg rotations when the lower pass has not re-aimed them.
    copy_truth: bool,
    settings: Option<IkData>,
}

impl Legs {
    fn resolve(
        original: &SkeletonData,
        sizing: &SkeletonData,
        o: &[usize],
        s: &[usize],
        lower_done: bool,
    ) -> Self {
        let original_legs = [
            LegBones::resolve(original, Side::Left, &o[0..3]),
            LegBones::resolve(original, Side::Right, &o[3..6]),
        ];
        let sizing_legs = [
            LegBones::resolve(sizing, Side::Left, &s[0..3]),
            LegBones::resolve(sizing, Side::Right, &s[3..6]),
        ];
        let ratio = effective_ratio(
            sizing.bones[sizing_legs[0].leg].position.y,
            original.bones[original_legs[0].leg].position.y,
        );
        Self {
            original: original_legs,
            sizing: sizing_legs,
            center: s[6],
            groove: sizing
                .trunk(Joint::Groove)
                .filter(|&groove| sizing.bones[groove].parent == Some(s[6])),
            ratio,
            copy_truth: !lower_done,
            settings: authored_ik(sizing, &[sided(Joint::LegIk, Side::Left)]).cloned(),
        }
    }

    fn sizing_bones(&self) -> Vec<usize> {
        let mut bones = vec![self.center];
        bones.extend(self.groove);
        bones.extend(self.sizing.iter().flat_map(LegBones::bones));
        bones
    }

    fn tracks(&self, sizing: &SkeletonData) -> Vec<usize> {
        let mut tracks = self.sizing_bones();
        tracks.extend(sizing.trunk(Joint::LowerBody));
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
            &DeformOptions::ik_on().with_bones(self.original.iter().flat_map(LegBones::bones)),
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

        for (legs, original_legs) in self.sizing.iter().zip(&self.original) {
            for (bone, original_bone) in legs.chain().into_iter().zip(original_legs.chain()) {
                let local = if self.copy_truth {
                    truth.filled_local_rotation(original_bone)
                } else {
                    deltas.filled_local_rotation(bone)
                };
                deltas.override_rotation(bone, local);
            }
        }
        for bone in [Some(self.center), self.groove].into_iter().flatten() {
            let scaled = deltas.filled_local_position(bone) * self.ratio;
            deltas.override_position(bone, scaled);
        }
        deltas = aim.refresh(&deltas);

        let offset = self.ground_offset(sizing, motion, &deltas);
        if offset != Vec3::ZERO {
            let parent = sizing.bones[self.center]
                .parent
                .map(|p| deltas.filled_global_rotation(p).inverse())
                .unwrap_or_default();
            let shifted = deltas.filled_local_position(self.center) + parent * offset;
            deltas.override_position(self.center, shifted);
            deltas = aim.refresh(&deltas);
        }

        for (legs, original_legs) in self.sizing.iter().zip(&self.original) {
            if let (Some(toe), Some(original_toe)) = (legs.toe, original_legs.toe) {
                deltas = aim.along(
                    deltas,
                    toe,
                    vec![legs.ankle],
                    legs.ankle,
                    pose_direction(&truth, original_legs.ankle, original_toe),
                );
            }
        }
        let mut deltas = aim.refresh(&deltas);
        for legs in &self.sizing {
            deltas = self.place_ik(&aim, deltas, legs);
        }

        let mut writes = vec![KeyWrite::position(
            sizing.bones[self.center].name.clone(),
            deltas.keyed_position(self.center),
        )];
        if let Some(groove) = self.groove {
            writes.push(KeyWrite::position(
                sizing.bones[groove].name.clone(),
                deltas.keyed_position(groove),
            ));
        }
        for legs in &self.sizing {
            writes.extend(
                legs.chain()
                    .into_iter()
                    .map(|bone| KeyWrite::from_rotation(sizing, &deltas, bone)),
            );
            for ik in [legs.leg_ik, legs.toe_ik].into_iter().flatten() {
                writes.push(KeyWrite::pose(
                    sizing.bones[ik].name.clone(),
                    deltas.keyed_position(ik),
                    deltas.keyed_rotation(ik),
                ));
            }
        }
        FrameSolution {
            writes,
            expected: self
                .sizing
                .iter()
                .map(|legs| deltas.filled_global_position(legs.ankle))
                .collect(),
        }
    }

    /// World offset from the baked (IK-off) right ankle to where the right leg IK, with its
    /// travel scaled like center, pulls that ankle.
    fn ground_offset(&self, sizing: &SkeletonData, motion: &Motion, baked: &BoneDeltas) -> Vec3 {
        let right = &self.sizing[1];
        let Some(leg_ik) = right.leg_ik else {
            return Vec3::ZERO;
        };
        if !motion.is_ik_enabled(&sizing.bones[leg_ik].name) {
            return Vec3::ZERO;
        }
        let mut seed = baked.clone();
        let scaled = seed.filled_local_position(leg_ik) * self.ratio;
        seed.override_position(leg_ik, scaled);
        let solved = deform_from(
            sizing,
            motion,
            &seed,
            &DeformOptions::ik_on().with_bones([right.ankle, leg_ik]),
        );
        let offset = solved.filled_global_position(right.ankle)
            - baked.filled_global_position(right.ankle);
        if offset.length() <= MODEL_EPSILON {
            Vec3::ZERO
        } else {
            offset
        }
    }

    /// Moves leg IK onto the FK ankle and toe IK onto the FK toe so re-enabling the solver
    /// reproduces the baked pose.
    fn place_ik(&self, aim: &Aim<'_>, mut deltas: BoneDeltas, legs: &LegBones) -> BoneDeltas {
        let sizing = aim.model;
        let Some(leg_ik) = legs.leg_ik else {
            return deltas;
        };
        let (parent_position, parent_rotation) = parent_global(sizing, &deltas, leg_ik);
        let (position, rotation) = rebase(
            parent_position,
            parent_rotation,
            deltas.filled_global_position(legs.ankle),
            deltas.filled_global_rotation(legs.ankle),
            sizing.rest_offset(leg_ik),
        );
        deltas.override_position(leg_ik, position);
        deltas.override_rotation(leg_ik, rotation);
        deltas = aim.refresh(&deltas);

        if let (Some(toe_ik), Some(toe)) = (legs.toe_ik, legs.toe) {
            let (parent_position, parent_rotation) = parent_global(sizing, &deltas, toe_ik);
            let (position, _) = rebase(
                parent_position,
                parent_rotation,
                deltas.filled_global_position(toe),
                Quat::IDENTITY,
                sizing.rest_offset(toe_ik),
            );
            deltas.override_position(toe_ik, position);
            deltas.override_rotation(toe_ik, Quat::IDENTITY);
            deltas = aim.refresh(&deltas);
        }
        deltas
    }
}

fn parent_global(model: &SkeletonData, deltas: &BoneDeltas, bone: usize) -> (Vec3, Quat) {
    match model.bones[bone].parent {
        Some(parent) => (
            deltas.filled_global_position(parent),
            deltas.filled_global_rotation(parent),
        ),
        None => (Vec3::ZERO, Quat::IDENTITY),
    }
}
