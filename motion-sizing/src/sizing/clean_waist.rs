use super::common::{Fold, FoldJob, require_bones, trunk};
use super::set::{Feature, SizingSet};
use crate::{Error, Joint, Side};
use log::debug;

/// Folds the waist bone into upper and lower body and deletes its track.
pub fn clean_waist(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanWaist) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let Some(bones) = require_bones(
        Feature::CleanWaist,
        &model,
        "original",
        &[
            trunk(Joint::Waist),
            trunk(Joint::UpperBody),
            trunk(Joint::LowerBody),
        ],
    ) else {
        return Ok(false);
    };
    let (waist, upper, lower) = (bones[0], bones[1], bones[2]);
    let waist_name = &model.bones[waist].name;

    if !set.output_motion.contains_active_bone(waist_name) {
        let removed = set.output_motion.remove_bone_track(waist_name).is_some();
        set.complete(Feature::CleanWaist);
        return Ok(removed);
    }

    let mut actions = vec![(waist, Fold::Remove)];
    actions.extend(model.children(waist).iter().map(|&child| (child, Fold::Rebase)));

    let mut check = vec![model.trunk(Joint::UpperBody2).unwrap_or(upper), lower];
    check.extend(
        Side::BOTH
            .into_iter()
            .filter_map(|side| model.sided(Joint::Leg, side)),
    );

    let mut output = set.output_motion.clone();
    let inserted = FoldJob::new(actions, check).run(&model, &mut output, set_count)?;
    debug!("clean_waist: set {} folded, {inserted} drift keys", set.index);

    set.commit(Feature::CleanWaist, output);
    Ok(true)
}
