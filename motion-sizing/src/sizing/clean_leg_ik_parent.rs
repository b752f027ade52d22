use super::common::{Fold, FoldJob, require_bones, sided};
use super::set::{Feature, SizingSet};
use crate::{Error, Joint, Side};
use log::debug;

/// Folds both leg IK parents into their leg IKs and deletes their tracks.
pub fn clean_leg_ik_parent(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanLegIkParent) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let Some(bones) = require_bones(
        Feature::CleanLegIkParent,
        &model,
        "original",
        &[
            sided(Joint::LegIkParent, Side::Left),
            sided(Joint::LegIk, Side::Left),
            sided(Joint::LegIkParent, Side::Right),
            sided(Joint::LegIk, Side::Right),
        ],
    ) else {
        return Ok(false);
    };
    let parents = [bones[0], bones[2]];
    let leg_iks = vec![bones[1], bones[3]];

    let active = parents
        .iter()
        .any(|&p| set.output_motion.contains_active_bone(&model.bones[p].name));
    if !active {
        let mut removed = false;
        for &parent in &parents {
            removed |= set
                .output_motion
                .remove_bone_track(&model.bones[parent].name)
                .is_some();
        }
        set.complete(Feature::CleanLegIkParent);
        return Ok(removed);
    }

    let mut actions = Vec::new();
    for &parent in &parents {
        actions.push((parent, Fold::Remove));
        actions.extend(model.children(parent).iter().map(|&child| (child, Fold::Rebase)));
    }

    let mut output = set.output_motion.clone();
    let inserted = FoldJob::new(actions, leg_iks).run(&model, &mut output, set_count)?;
    debug!("clean_leg_ik_parent: set {} folded, {inserted} drift keys", set.index);

    set.commit(Feature::CleanLegIkParent, output);
    Ok(true)
}
