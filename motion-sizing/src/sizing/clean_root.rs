use super::common::{Fold, FoldJob, require_bones, trunk};
use super::set::{Feature, SizingSet};
use crate::{Error, Joint, Side};
use log::debug;

/// Folds the all-parent bone into its children (center, leg IK parents or leg IKs) and
/// deletes its track.
pub fn clean_root(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanRoot) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let Some(bones) = require_bones(
        Feature::CleanRoot,
        &model,
        "original",
        &[trunk(Joint::Root), trunk(Joint::Center)],
    ) else {
        return Ok(false);
    };
    let (root, center) = (bones[0], bones[1]);
    let root_name = &model.bones[root].name;

    if !set.output_motion.contains_active_bone(root_name) {
        let removed = set.output_motion.remove_bone_track(root_name).is_some();
        set.complete(Feature::CleanRoot);
        return Ok(removed);
    }

    let mut actions = vec![(root, Fold::Remove)];
    actions.extend(model.children(root).iter().map(|&child| (child, Fold::Rebase)));

    let mut check = vec![center];
    check.extend(
        Side::BOTH
            .into_iter()
            .filter_map(|side| model.sided(Joint::LegIk, side)),
    );

    let job = FoldJob::new(actions, check);
    let mut output = set.output_motion.clone();
    let inserted = job.run(&model, &mut output, set_count)?;
    debug!("clean_root: set {} folded, {inserted} drift keys", set.index);

    set.commit(Feature::CleanRoot, output);
    Ok(true)
}
