use super::{
    clean_arm_ik, clean_center, clean_grip, clean_leg_ik_parent, clean_root, clean_shoulder_p,
    clean_waist, size_arm_twist, size_leg, size_lower, size_shoulder, size_stance, size_upper,
};
use super::set::SizingSet;
use crate::Error;
use log::{debug, info};
use rayon::prelude::*;

type Pass = fn(&mut SizingSet, usize) -> Result<bool, Error>;

/// Passes in execution order. Cleanups run before any sizing so the sizing passes see the
/// simplified hierarchy.
const PASSES: [(&str, Pass); 13] = [
    ("clean_root", clean_root),
    ("clean_center", clean_center),
    ("clean_waist", clean_waist),
    ("clean_leg_ik_parent", clean_leg_ik_parent),
    ("clean_shoulder_p", clean_shoulder_p),
    ("clean_arm_ik", clean_arm_ik),
    ("clean_grip", clean_grip),
    ("stance", size_stance),
    ("arm_twist", size_arm_twist),
    ("lower", size_lower),
    ("leg", size_leg),
    ("upper", size_upper),
    ("shoulder", size_shoulder),
];

/// Runs every enabled, pending pass on `set`.
///
/// The first error aborts the remaining passes; the failing pass stays pending. Returns
/// whether any pass changed the output motion.
pub fn run_pipeline(set: &mut SizingSet, set_count: usize) -> Result<bool, Error> {
    let mut changed = false;
    for (name, pass) in PASSES {
        debug!("set {}: {name}", set.index);
        if pass(set, set_count)? {
            changed = true;
        }
    }
    info!(
        "set {}: sizing finished ({})",
        set.index,
        if changed { "modified" } else { "unchanged" }
    );
    Ok(changed)
}

/// Runs the pipeline of every set concurrently; one result per set, in order.
pub fn run_pipelines(sets: &mut [SizingSet]) -> Vec<Result<bool, Error>> {
    let set_count = sets.len().max(1);
    sets.par_iter_mut()
        .map(|set| run_pipeline(set, set_count))
        .collect()
}
