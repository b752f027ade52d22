use super::common::{JointRef, models_match, require_bones, sided};
use super::set::{Feature, SizingSet};
use crate::math::{near_identity, rotation_between};
use crate::{Error, Joint, Motion, Side, SkeletonData};
use glam::{Quat, Vec3};
use log::debug;

/// `pre · local · post` conversion of one bone's keys from the original skeleton's rest
/// directions to the sizing skeleton's.
#[derive(Clone, Debug, PartialEq)]
pub struct StanceOffset {
    pub bone: String,
    pub pre: Quat,
    pub post: Quat,
}

impl StanceOffset {
    fn new(bone: impl Into<String>, pre: Quat, post: Quat) -> Self {
        Self {
            bone: bone.into(),
            pre,
            post,
        }
    }

    pub fn apply(&self, rotation: Quat) -> Quat {
        (self.pre * rotation * self.post).normalize()
    }

    pub fn is_identity(&self) -> bool {
        near_identity(self.pre, 1.0e-6) && near_identity(self.post, 1.0e-6)
    }
}

const ARM_CHAIN: [Joint; 3] = [Joint::Arm, Joint::Elbow, Joint::Wrist];

/// Rotates arm and finger keys so limbs keep their world direction on a skeleton whose rest
/// stance differs (e.g. A-pose vs T-pose). One pass; arm and finger stance complete
/// separately.
pub fn size_stance(set: &mut SizingSet, _set_count: usize) -> Result<bool, Error> {
    let arm = set.should_run(Feature::ArmStance);
    let finger = set.should_run(Feature::FingerStance);
    if !arm && !finger {
        return Ok(false);
    }
    let feature = if arm {
        Feature::ArmStance
    } else {
        Feature::FingerStance
    };

    let mut required: Vec<JointRef> = Vec::new();
    for side in Side::BOTH {
        if arm {
            required.extend(ARM_CHAIN.map(|joint| sided(joint, side)));
        } else {
            required.push(sided(Joint::Wrist, side));
        }
    }
    let original = set.original_model.clone();
    let sizing = set.sizing_model.clone();
    if require_bones(feature, &original, "original", &required).is_none()
        || require_bones(feature, &sizing, "sizing", &required).is_none()
    {
        return Ok(false);
    }

    let offsets = stance_offsets(&original, &sizing, arm, finger);
    let mut written = 0;
    for offset in offsets.iter().filter(|o| !o.is_identity()) {
        written += apply_offset(&mut set.output_motion, offset);
    }
    debug!("stance: set {} rewrote {written} keys", set.index);

    if arm {
        set.complete(Feature::ArmStance);
    }
    if finger {
        set.complete(Feature::FingerStance);
    }
    Ok(written > 0)
}

/// Builds the per-bone offsets for both sides, chained so each bone's `pre` undoes its
/// parent's `post`.
pub fn stance_offsets(
    original: &SkeletonData,
    sizing: &SkeletonData,
    arm: bool,
    finger: bool,
) -> Vec<StanceOffset> {
    let mut offsets = Vec::new();
    for side in Side::BOTH {
        let mut wrist_post = Quat::IDENTITY;

        if arm {
            let mut parent_post = Quat::IDENTITY;
            for (i, &joint) in ARM_CHAIN.iter().enumerate() {
                let next = match ARM_CHAIN.get(i + 1) {
                    Some(&next) => Some(next),
                    None => Some(Joint::Middle1),
                };
                let post = stance_rotation(original, sizing, joint, next, side);
                offsets.push(StanceOffset::new(
                    joint.sided(side),
                    parent_post.inverse(),
                    post,
                ));
                let twist = match joint {
                    Joint::Arm => Some(Joint::ArmTwist),
                    Joint::Elbow => Some(Joint::WristTwist),
                    _ => None,
                };
                if let Some(twist) = twist.filter(|&t| present(original, sizing, t, side)) {
                    offsets.push(StanceOffset::new(twist.sided(side), post.inverse(), post));
                }
                parent_post = post;
            }
            wrist_post = parent_post;
        }

        if finger {
            for chain in Joint::FINGERS {
                let joints: Vec<Joint> = chain
                    .into_iter()
                    .filter(|&joint| present(original, sizing, joint, side))
                    .collect();
                let mut parent_post = wrist_post;
                for (i, &joint) in joints.iter().enumerate() {
                    let post =
                        stance_rotation(original, sizing, joint, joints.get(i + 1).copied(), side);
                    offsets.push(StanceOffset::new(
                        joint.sided(side),
                        parent_post.inverse(),
                        post,
                    ));
                    parent_post = post;
                }
            }
        }
    }
    offsets
}

fn present(original: &SkeletonData, sizing: &SkeletonData, joint: Joint, side: Side) -> bool {
    original.sided(joint, side).is_some() && sizing.sided(joint, side).is_some()
}

/// Rotation taking the sizing bone's rest direction onto the original bone's.
fn stance_rotation(
    original: &SkeletonData,
    sizing: &SkeletonData,
    joint: Joint,
    next: Option<Joint>,
    side: Side,
) -> Quat {
    if models_match(original, sizing, &[sided(joint, side)])
        && next.is_none_or(|n| models_match(original, sizing, &[sided(n, side)]))
    {
        return Quat::IDENTITY;
    }
    let direction = |model: &SkeletonData| -> Option<Vec3> {
        let bone = model.sided(joint, side)?;
        let to = next
            .filter(|&n| present(original, sizing, n, side))
            .and_then(|n| model.sided(n, side))
            .map(|n| model.bones[n].position)
            .unwrap_or_else(|| model.tail_position(bone));
        Some(to - model.bones[bone].position)
    };
    match (direction(sizing), direction(original)) {
        (Some(from), Some(to)) => rotation_between(from, to),
        _ => Quat::IDENTITY,
    }
}

/// Applies `offset` to every key of its track; an empty track gets a key at frame 0 when the
/// offset alone changes the rest rotation. Returns the number of keys written.
fn apply_offset(motion: &mut Motion, offset: &StanceOffset) -> usize {
    let keys: Vec<_> = motion
        .bone_track(&offset.bone)
        .map(|track| track.frames().map(|(f, key)| (f, key.clone())).collect())
        .unwrap_or_default();

    if keys.is_empty() {
        let rotation = offset.apply(Quat::IDENTITY);
        if near_identity(rotation, 1.0e-6) {
            return 0;
        }
        let mut key = motion.bone_frame(&offset.bone, 0);
        key.rotation = rotation;
        motion.insert_bone_frame(&offset.bone, 0, key);
        return 1;
    }

    let count = keys.len();
    let track = motion.bone_track_mut(&offset.bone);
    for (frame, mut key) in keys {
        key.rotation = offset.apply(key.rotation);
        track.insert(frame, key);
    }
    count
}
