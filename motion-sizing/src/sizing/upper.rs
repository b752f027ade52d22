use super::common::{
    Aim, DriftCheck, FramePlan, FrameSolution, KeyWrite, authored_ik, bone_names,
    local_for_global, models_match, require_bones, sided, trunk,
};
use super::set::{Feature, SizingSet};
use crate::math::effective_ratio;
use crate::{DeformOptions, Error, Joint, Motion, Side, SkeletonData, deform};
use log::debug;

const UPPER_THRESHOLD: f32 = 0.01;

/// Re-aims the torso so the neck reaches where the original torso puts it, scaled by the
/// ratio of upper-body-to-neck lengths, then restores the world rotation of the neck and
/// shoulders.
pub fn size_upper(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::Upper) {
        return Ok(false);
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();
    let required = [trunk(Joint::UpperBody), trunk(Joint::Neck)];
    let Some(o) = require_bones(Feature::Upper, &original, "original", &required) else {
        return Ok(false);
    };
    let Some(s) = require_bones(Feature::Upper, &sizing, "sizing", &required) else {
        return Ok(false);
    };

    let compared = [
        trunk(Joint::UpperBody),
        trunk(Joint::UpperBody2),
        trunk(Joint::Neck),
    ];
    if models_match(&original, &sizing, &compared) {
        set.complete(Feature::Upper);
        return Ok(false);
    }

    let torso = Torso::resolve(&sizing, (o[0], o[1]), (s[0], s[1]));
    let ratio = effective_ratio(
        sizing.rest_distance(torso.upper, torso.neck),
        original.rest_distance(torso.original_upper, torso.original_neck),
    );

    let snapshot = set.output_motion.clone();
    let source = set.original_motion.clone();
    let solve = |frame| torso.solve(&original, &source, &sizing, &snapshot, frame, ratio);
    let frames = snapshot.registered_frames(&bone_names(&sizing, &torso.tracks()));
    let plan = FramePlan::solve(frames, set_count, &solve)?;
    let mut output = snapshot.clone();
    plan.write(&mut output);

    let check = DriftCheck {
        model: &sizing,
        bones: vec![torso.neck],
        ik: true,
        threshold: UPPER_THRESHOLD,
    };
    let inserted = plan.repair(&mut output, &check, &solve)?;
    debug!("upper: set {} ratio {ratio:.4}, {inserted} drift keys", set.index);

    set.commit(Feature::Upper, output);
    Ok(true)
}

struct Torso {
    original_upper: usize,
    original_neck: usize,
    upper: usize,
    upper2: Option<usize>,
    neck: usize,
    /// Bones whose world rotation survives the torso solve.
    preserved: Vec<usize>,
}

impl Torso {
    fn resolve(sizing: &SkeletonData, original: (usize, usize), resolved: (usize, usize)) -> Self {
        let mut preserved = vec![resolved.1];
        for side in Side::BOTH {
            let shoulder = sizing
                .sided(Joint::ShoulderP, side)
                .or_else(|| sizing.sided(Joint::Shoulder, side));
            preserved.extend(shoulder);
        }
        Self {
            original_upper: original.0,
            original_neck: original.1,
            upper: resolved.0,
            upper2: sizing.trunk(Joint::UpperBody2),
            neck: resolved.1,
            preserved,
        }
    }

    fn links(&self) -> Vec<usize> {
        self.upper2.into_iter().chain([self.upper]).collect()
    }

    fn tracks(&self) -> Vec<usize> {
        let mut tracks = self.links();
        tracks.extend_from_slice(&self.preserved);
        tracks
    }

    fn solve(
        &self,
        original: &SkeletonData,
        source: &Motion,
        sizing: &SkeletonData,
        motion: &Motion,
        frame: u32,
        ratio: f32,
    ) -> FrameSolution {
        let truth = deform(
            original,
            source,
            frame,
            &DeformOptions::ik_on().with_bones([self.original_upper, self.original_neck]),
        );
        let bones = self.tracks();
        let settings = authored_ik(sizing, &[sided(Joint::LegIk, Side::Left)]);
        let aim = Aim {
            model: sizing,
            motion,
            bones: &bones,
            settings,
        };
        let before = deform(
            sizing,
            motion,
            frame,
            &DeformOptions::ik_on().with_bones(bones.iter().copied()),
        );

        let reach = (truth.filled_global_position(self.original_neck)
            - truth.filled_global_position(self.original_upper))
            * ratio;
        let goal = before.filled_global_position(self.upper) + reach;
        let mut deltas = aim.toward(before.clone(), self.neck, self.links(), goal);

        for &bone in &self.preserved {
            let local = local_for_global(sizing, &deltas, bone, before.filled_global_rotation(bone));
            deltas.override_rotation(bone, local);
        }
        let deltas = aim.refresh(&deltas);

        let writes = self
            .links()
            .into_iter()
            .chain(self.preserved.iter().copied())
            .map(|bone| KeyWrite::from_rotation(sizing, &deltas, bone))
            .collect();
        FrameSolution {
            writes,
            expected: vec![deltas.filled_global_position(self.neck)],
        }
    }
}
