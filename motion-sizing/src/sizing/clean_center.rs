use super::common::{Fold, FoldJob, require_bones, trunk};
use super::set::{Feature, SizingSet};
use crate::math::near_identity;
use crate::{Error, Joint, Motion, Side, SkeletonData};
use log::debug;

/// Clears the rotation of center and groove, moving it into the bones below them.
///
/// Groove (or center, without a groove) takes a translation that keeps the waist (or lower
/// body) where it was; the tracks stay.
pub fn clean_center(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    if !set.should_run(Feature::CleanCenter) {
        return Ok(false);
    }
    let model = set.original_model.clone();
    let Some(bones) = require_bones(
        Feature::CleanCenter,
        &model,
        "original",
        &[trunk(Joint::Center), trunk(Joint::UpperBody)],
    ) else {
        return Ok(false);
    };
    let (center, upper) = (bones[0], bones[1]);
    let groove = model
        .trunk(Joint::Groove)
        .filter(|&g| model.bones[g].parent == Some(center));

    let rotated = [Some(center), groove]
        .into_iter()
        .flatten()
        .any(|bone| has_rotation(&set.output_motion, &model.bones[bone].name));
    if !rotated {
        set.complete(Feature::CleanCenter);
        return Ok(false);
    }

    let actions = fold_actions(&model, center, groove);

    let mut check = vec![model.trunk(Joint::Neck).unwrap_or(upper)];
    check.extend(
        Side::BOTH
            .into_iter()
            .filter_map(|side| model.sided(Joint::Leg, side)),
    );

    let mut output = set.output_motion.clone();
    let inserted = FoldJob::new(actions, check).run(&model, &mut output, set_count)?;
    debug!("clean_center: set {} folded, {inserted} drift keys", set.index);

    set.commit(Feature::CleanCenter, output);
    Ok(true)
}

fn fold_actions(model: &SkeletonData, center: usize, groove: Option<usize>) -> Vec<(usize, Fold)> {
    let last = groove.unwrap_or(center);
    let anchor = [Joint::Waist, Joint::LowerBody, Joint::UpperBody]
        .into_iter()
        .filter_map(|joint| model.trunk(joint))
        .find(|&bone| model.bones[bone].parent == Some(last));

    let mut actions = Vec::new();
    if let Some(groove) = groove {
        actions.push((center, Fold::Flatten));
        actions.extend(
            model
                .children(center)
                .iter()
                .filter(|&&child| child != groove)
                .map(|&child| (child, Fold::Rebase)),
        );
    }
    actions.push((
        last,
        match anchor {
            Some(child) => Fold::Anchor(child),
            None => Fold::Flatten,
        },
    ));
    actions.extend(model.children(last).iter().map(|&child| (child, Fold::Rebase)));
    actions
}

fn has_rotation(motion: &Motion, name: &str) -> bool {
    motion.bone_track(name).is_some_and(|track| {
        track
            .frames()
            .any(|(_, key)| !near_identity(key.rotation, 1.0e-6))
    })
}
