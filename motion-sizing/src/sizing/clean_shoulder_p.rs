use super::common::{Fold, FoldJob, require_bones, sided};
use super::set::{Feature, SizingSet};
use crate::{Error, Joint, Side, SkeletonData, join_sides};
use log::debug;

/// Folds each shoulder P into its shoulder and arm (`root⁻¹ · shoulder`, `shoulder⁻¹ · arm`)
/// and deletes its track. Both sides are solved concurrently; a panic on either side fails
/// the pass and leaves it pending.
pub fn clean_shoulder_p(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanShoulderP) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let mut jobs = Vec::with_capacity(2);
    for side in Side::BOTH {
        let Some(bones) = require_bones(
            Feature::CleanShoulderP,
            &model,
            "original",
            &[
                sided(Joint::ShoulderP, side),
                sided(Joint::Shoulder, side),
                sided(Joint::Arm, side),
                sided(Joint::Elbow, side),
            ],
        ) else {
            return Ok(false);
        };
        jobs.push(side_job(&model, bones[0], bones[1], bones[2], bones[3]));
    }

    let snapshot = set.output_motion.clone();
    let (left, right) = join_sides(
        || jobs[0].plan(&model, &snapshot, set_count * 2),
        || jobs[1].plan(&model, &snapshot, set_count * 2),
    )?;
    let plans = [left?, right?];

    let mut output = snapshot.clone();
    let mut inserted = 0;
    for (job, plan) in jobs.iter().zip(plans) {
        inserted += job.commit(&model, &snapshot, &mut output, plan)?;
    }
    debug!("clean_shoulder_p: set {} folded, {inserted} drift keys", set.index);

    set.commit(Feature::CleanShoulderP, output);
    Ok(true)
}

fn side_job(
    model: &SkeletonData,
    shoulder_p: usize,
    shoulder: usize,
    arm: usize,
    elbow: usize,
) -> FoldJob {
    let mut actions = vec![(shoulder_p, Fold::Remove)];
    actions.extend(
        model
            .children(shoulder_p)
            .iter()
            .filter(|&&child| child != shoulder)
            .map(|&child| (child, Fold::Rebase)),
    );
    actions.push((shoulder, Fold::Rebase));
    actions.push((arm, Fold::Rebase));
    FoldJob::new(actions, vec![arm, elbow])
}
