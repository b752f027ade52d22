use crate::math::{project_onto_axis, scale_rotation};
use crate::{IkData, Motion, SkeletonData};
use glam::{Mat4, Quat, Vec3};

/// Resolved state of one bone for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneDelta {
    /// Keyed translation offset.
    pub frame_position: Vec3,
    /// Keyed rotation, before parent composition.
    pub frame_rotation: Quat,
    pub morph_position: Vec3,
    pub morph_rotation: Quat,
    /// Final local rotation set by an IK solve or an explicit override.
    pub solved_rotation: Option<Quat>,
    pub local_position: Vec3,
    pub local_rotation: Quat,
    pub global_position: Vec3,
    pub global_rotation: Quat,
    pub evaluated: bool,
}

impl BoneDelta {
    fn rest(position: Vec3) -> Self {
        Self {
            frame_position: Vec3::ZERO,
            frame_rotation: Quat::IDENTITY,
            morph_position: Vec3::ZERO,
            morph_rotation: Quat::IDENTITY,
            solved_rotation: None,
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            global_position: position,
            global_rotation: Quat::IDENTITY,
            evaluated: false,
        }
    }
}

/// Per-frame deform result. Bones a restricted evaluation did not reach keep their rest pose,
/// which is what the `filled_*` accessors report for them.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneDeltas {
    pub frame: u32,
    deltas: Vec<BoneDelta>,
}

impl BoneDeltas {
    pub fn rest(skeleton: &SkeletonData, frame: u32) -> Self {
        Self {
            frame,
            deltas: skeleton
                .bones
                .iter()
                .map(|bone| BoneDelta::rest(bone.position))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoneDelta> {
        self.deltas.get(index)
    }

    pub fn filled_global_position(&self, index: usize) -> Vec3 {
        self.deltas
            .get(index)
            .map(|d| d.global_position)
            .unwrap_or(Vec3::ZERO)
    }

    pub fn filled_global_rotation(&self, index: usize) -> Quat {
        self.deltas
            .get(index)
            .map(|d| d.global_rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn filled_frame_rotation(&self, index: usize) -> Quat {
        self.deltas
            .get(index)
            .map(|d| d.frame_rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn filled_local_rotation(&self, index: usize) -> Quat {
        self.deltas
            .get(index)
            .map(|d| d.local_rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn filled_local_position(&self, index: usize) -> Vec3 {
        self.deltas
            .get(index)
            .map(|d| d.local_position)
            .unwrap_or(Vec3::ZERO)
    }

    pub fn filled_global_matrix(&self, index: usize) -> Mat4 {
        Mat4::from_rotation_translation(
            self.filled_global_rotation(index),
            self.filled_global_position(index),
        )
    }

    /// Rotation to key so that the bone ends up with its current local rotation, i.e. the
    /// local rotation with the morph contribution removed.
    pub fn keyed_rotation(&self, index: usize) -> Quat {
        self.deltas
            .get(index)
            .map(|d| (d.morph_rotation.inverse() * d.local_rotation).normalize())
            .unwrap_or(Quat::IDENTITY)
    }

    /// Translation to key so that the bone ends up with its current local offset.
    pub fn keyed_position(&self, index: usize) -> Vec3 {
        self.deltas
            .get(index)
            .map(|d| d.local_position - d.morph_position)
            .unwrap_or(Vec3::ZERO)
    }

    /// Key rotation that yields `local` once the bone's morph rotation is applied.
    pub fn to_key_rotation(&self, index: usize, local: Quat) -> Quat {
        self.deltas
            .get(index)
            .map(|d| (d.morph_rotation.inverse() * local).normalize())
            .unwrap_or(local)
    }

    /// Pins the final local rotation of a bone; takes effect on the next evaluation seeded
    /// from these deltas.
    pub fn override_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some(d) = self.deltas.get_mut(index) {
            d.solved_rotation = Some(rotation.normalize());
        }
    }

    /// Replaces the local translation (key plus morph) of a bone for the next evaluation.
    pub fn override_position(&mut self, index: usize, position: Vec3) {
        if let Some(d) = self.deltas.get_mut(index) {
            d.frame_position = position - d.morph_position;
        }
    }
}

/// Bone morph contributions for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphDeltas {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

pub fn deform_morph(skeleton: &SkeletonData, motion: &Motion, frame: u32) -> MorphDeltas {
    let count = skeleton.bones.len();
    let mut deltas = MorphDeltas {
        positions: vec![Vec3::ZERO; count],
        rotations: vec![Quat::IDENTITY; count],
    };
    for track in motion.morph_tracks() {
        let Some(morph) = skeleton.morph(&track.name) else {
            continue;
        };
        let ratio = track.ratio(frame);
        if ratio == 0.0 {
            continue;
        }
        for offset in &morph.offsets {
            deltas.positions[offset.bone] += offset.position * ratio;
            deltas.rotations[offset.bone] =
                (scale_rotation(offset.rotation, ratio) * deltas.rotations[offset.bone]).normalize();
        }
    }
    deltas
}

#[derive(Clone, Debug, Default)]
pub struct DeformOptions {
    /// Resolve the skeleton's IK bones.
    pub ik: bool,
    /// Include bones deformed after physics. Without them those bones keep their rest pose,
    /// whether or not a bone subset is requested.
    pub after_physics: bool,
    /// Evaluate only these bones (plus everything they depend on).
    pub bones: Option<Vec<usize>>,
}

impl DeformOptions {
    pub fn ik_on() -> Self {
        Self {
            ik: true,
            after_physics: true,
            bones: None,
        }
    }

    pub fn ik_off() -> Self {
        Self {
            ik: false,
            after_physics: true,
            bones: None,
        }
    }

    pub fn before_physics(mut self) -> Self {
        self.after_physics = false;
        self
    }

    pub fn with_bones(mut self, bones: impl IntoIterator<Item = usize>) -> Self {
        self.bones = Some(bones.into_iter().collect());
        self
    }
}

/// Evaluates global transforms of `skeleton` posed by `motion` at `frame`.
pub fn deform(
    skeleton: &SkeletonData,
    motion: &Motion,
    frame: u32,
    options: &DeformOptions,
) -> BoneDeltas {
    let mut evaluator = Evaluator::new(skeleton, motion, frame, None, options);
    evaluator.run();
    evaluator.deltas
}

/// Re-evaluates a pose whose local state (keys, overrides) comes from `base`.
pub fn deform_from(
    skeleton: &SkeletonData,
    motion: &Motion,
    base: &BoneDeltas,
    options: &DeformOptions,
) -> BoneDeltas {
    let mut evaluator = Evaluator::new(skeleton, motion, base.frame, Some(base), options);
    evaluator.run();
    evaluator.deltas
}

/// Solves a single IK chain toward `goal` on top of the FK pose (or `base`), leaving all
/// other IK bones unsolved.
#[allow(clippy::too_many_arguments)]
pub fn deform_ik(
    skeleton: &SkeletonData,
    motion: &Motion,
    base: Option<&BoneDeltas>,
    frame: u32,
    ik: &IkData,
    goal: Vec3,
    bones: Option<&[usize]>,
) -> BoneDeltas {
    let mut options = DeformOptions::ik_off();
    if let Some(bones) = bones {
        let mut required = bones.to_vec();
        required.push(ik.target);
        required.extend(ik.links.iter().map(|l| l.bone));
        options.bones = Some(required);
    }
    let mut evaluator = Evaluator::new(skeleton, motion, frame, base, &options);
    evaluator.run();
    evaluator.solve_ik(ik, goal);
    evaluator.deltas
}

pub(crate) struct Evaluator<'a> {
    pub(crate) skeleton: &'a SkeletonData,
    motion: &'a Motion,
    pub(crate) deltas: BoneDeltas,
    pub(crate) order: Vec<usize>,
    ik: bool,
}

impl<'a> Evaluator<'a> {
    fn new(
        skeleton: &'a SkeletonData,
        motion: &'a Motion,
        frame: u32,
        base: Option<&BoneDeltas>,
        options: &DeformOptions,
    ) -> Self {
        let active = required_bones(skeleton, motion, options);
        let order: Vec<usize> = skeleton
            .deform_order()
            .iter()
            .copied()
            .filter(|&i| active[i])
            .collect();

        let mut deltas = BoneDeltas::rest(skeleton, frame);
        let morphs = (motion.morph_tracks().next().is_some() && !skeleton.morphs.is_empty())
            .then(|| deform_morph(skeleton, motion, frame));

        for &index in &order {
            let delta = &mut deltas.deltas[index];
            match base.and_then(|b| b.deltas.get(index)).filter(|d| d.evaluated) {
                Some(seed) => {
                    delta.frame_position = seed.frame_position;
                    delta.frame_rotation = seed.frame_rotation;
                    delta.morph_position = seed.morph_position;
                    delta.morph_rotation = seed.morph_rotation;
                    delta.solved_rotation = seed.solved_rotation;
                }
                None => {
                    let key = motion.bone_frame(&skeleton.bones[index].name, frame);
                    delta.frame_position = key.position;
                    delta.frame_rotation = key.rotation;
                    if let Some(morphs) = morphs.as_ref() {
                        delta.morph_position = morphs.positions[index];
                        delta.morph_rotation = morphs.rotations[index];
                    }
                }
            }
            delta.evaluated = true;
        }

        Self {
            skeleton,
            motion,
            deltas,
            order,
            ik: options.ik,
        }
    }

    fn run(&mut self) {
        for position in 0..self.order.len() {
            let index = self.order[position];
            self.update_local(index);
            self.update_global(index);

            if !self.ik {
                continue;
            }
            let bone = &self.skeleton.bones[index];
            let Some(ik) = bone.ik.as_ref() else {
                continue;
            };
            if !self.motion.is_ik_enabled(&bone.name) {
                continue;
            }
            let goal = self.deltas.deltas[index].global_position;
            self.solve_ik(ik, goal);
        }
    }

    pub(crate) fn update_local(&mut self, index: usize) {
        let bone = &self.skeleton.bones[index];
        let d = &self.deltas.deltas[index];

        let mut position = d.frame_position + d.morph_position;
        let mut rotation = match d.solved_rotation {
            Some(solved) => solved,
            None => d.morph_rotation * d.frame_rotation,
        };

        if let Some(effector) = bone.effector {
            let source = &self.deltas.deltas[effector.source];
            if effector.rotation && d.solved_rotation.is_none() {
                rotation = scale_rotation(source.local_rotation, effector.factor) * rotation;
            }
            if effector.translation {
                position += source.local_position * effector.factor;
            }
        }
        if d.solved_rotation.is_none() {
            if let Some(axis) = bone.fixed_axis {
                rotation = project_onto_axis(rotation, axis);
            }
        }

        let d = &mut self.deltas.deltas[index];
        d.local_position = position;
        d.local_rotation = rotation.normalize();
    }

    pub(crate) fn update_global(&mut self, index: usize) {
        let rest = self.skeleton.rest_offset(index);
        let (parent_position, parent_rotation) = match self.skeleton.bones[index].parent {
            Some(parent) => {
                let p = &self.deltas.deltas[parent];
                (p.global_position, p.global_rotation)
            }
            None => (Vec3::ZERO, Quat::IDENTITY),
        };
        let d = &mut self.deltas.deltas[index];
        d.global_position = parent_position + parent_rotation * (rest + d.local_position);
        d.global_rotation = (parent_rotation * d.local_rotation).normalize();
    }
}

/// Marks the bones an evaluation has to touch: the requested set closed over parents,
/// effector sources and (with IK on) the IK bones driving any of them.
fn required_bones(skeleton: &SkeletonData, motion: &Motion, options: &DeformOptions) -> Vec<bool> {
    let count = skeleton.bones.len();
    let mut active = vec![false; count];
    let skipped = |index: usize| !options.after_physics && skeleton.bones[index].after_physics;

    let mut stack: Vec<usize> = match options.bones.as_ref() {
        Some(bones) => bones.iter().copied().filter(|&i| i < count).collect(),
        None => (0..count).collect(),
    };

    loop {
        while let Some(index) = stack.pop() {
            if active[index] || skipped(index) {
                continue;
            }
            active[index] = true;
            let bone = &skeleton.bones[index];
            if let Some(parent) = bone.parent {
                stack.push(parent);
            }
            if let Some(effector) = bone.effector {
                stack.push(effector.source);
            }
        }

        if !options.ik {
            break;
        }
        for (index, bone) in skeleton.bones.iter().enumerate() {
            let Some(ik) = bone.ik.as_ref() else {
                continue;
            };
            if active[index] || !motion.is_ik_enabled(&bone.name) {
                continue;
            }
            let drives_active = active[ik.target] || ik.links.iter().any(|l| active[l.bone]);
            if drives_active {
                stack.push(index);
                stack.push(ik.target);
                stack.extend(ik.links.iter().map(|l| l.bone));
            }
        }
        if stack.is_empty() {
            break;
        }
    }
    active
}
