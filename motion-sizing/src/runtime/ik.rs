use super::deform::Evaluator;
use crate::IkData;
use crate::math::clamp_euler;
use glam::{Quat, Vec3};

const GOAL_EPSILON: f32 = 1.0e-5;
const ANGLE_EPSILON: f32 = 1.0e-6;

impl Evaluator<'_> {
    /// Cyclic coordinate descent over `ik.links` until the target bone reaches `goal`.
    ///
    /// Each step rotates one link in its own frame; the solved rotation replaces the link's
    /// local rotation and every evaluated bone below the link is re-posed before the next step.
    pub(crate) fn solve_ik(&mut self, ik: &IkData, goal: Vec3) {
        if ik.links.is_empty() {
            return;
        }
        let skeleton = self.skeleton;
        let affected: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&bone| {
                ik.links
                    .iter()
                    .any(|l| l.bone == bone || skeleton.is_ancestor_of(l.bone, bone))
            })
            .collect();
        if !affected.contains(&ik.target) {
            return;
        }

        for _ in 0..ik.loop_count.max(1) {
            let mut moved = false;
            for link in &ik.links {
                let effector = self.deltas.filled_global_position(ik.target);
                if effector.distance_squared(goal) <= GOAL_EPSILON * GOAL_EPSILON {
                    return;
                }

                let link_position = self.deltas.filled_global_position(link.bone);
                let inverse = self.deltas.filled_global_rotation(link.bone).inverse();
                let to_effector = inverse * (effector - link_position);
                let to_goal = inverse * (goal - link_position);

                let delta = match skeleton.bones[link.bone].fixed_axis {
                    Some(axis) => axis_step(to_effector, to_goal, axis, ik.unit_rotation),
                    None => free_step(to_effector, to_goal, ik.unit_rotation),
                };
                let Some(delta) = delta else {
                    continue;
                };

                let current = self.deltas.filled_local_rotation(link.bone);
                let mut next = (current * delta).normalize();
                if let Some(limits) = link.limits.as_ref() {
                    next = clamp_euler(next, limits);
                }
                self.deltas.override_rotation(link.bone, next);

                for &bone in &affected {
                    self.update_local(bone);
                    self.update_global(bone);
                }
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }
}

fn free_step(to_effector: Vec3, to_goal: Vec3, unit_rotation: f32) -> Option<Quat> {
    let from = to_effector.try_normalize()?;
    let to = to_goal.try_normalize()?;
    let angle = from.dot(to).clamp(-1.0, 1.0).acos();
    if angle <= ANGLE_EPSILON {
        return None;
    }
    let axis = from.cross(to).try_normalize()?;
    Some(Quat::from_axis_angle(axis, limit_angle(angle, unit_rotation)))
}

fn axis_step(to_effector: Vec3, to_goal: Vec3, axis: Vec3, unit_rotation: f32) -> Option<Quat> {
    let axis = axis.try_normalize()?;
    let from = (to_effector - axis * to_effector.dot(axis)).try_normalize()?;
    let to = (to_goal - axis * to_goal.dot(axis)).try_normalize()?;
    let angle = from.dot(to).clamp(-1.0, 1.0).acos();
    if angle <= ANGLE_EPSILON {
        return None;
    }
    let sign = if from.cross(to).dot(axis) < 0.0 { -1.0 } else { 1.0 };
    Some(Quat::from_axis_angle(axis, sign * limit_angle(angle, unit_rotation)))
}

fn limit_angle(angle: f32, unit_rotation: f32) -> f32 {
    if unit_rotation > 0.0 {
        angle.min(unit_rotation)
    } else {
        angle
    }
}
