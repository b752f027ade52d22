use crate::math::rebase;
use crate::{
    BoneDeltas, DeformOptions, Error, Feature, IkData, Joint, Motion, Side, SkeletonData,
    deform, deform_from, deform_ik, iter_parallel_by_list,
};
use glam::{Quat, Vec3};
use log::{info, warn};

/// Drift threshold of the fold passes, in model units.
pub(crate) const CLEANUP_THRESHOLD: f32 = 0.01;

/// Rest positions closer than this count as the same skeleton.
pub(crate) const MODEL_EPSILON: f32 = 1.0e-4;

pub(crate) type JointRef = (Joint, Option<Side>);

pub(crate) fn trunk(joint: Joint) -> JointRef {
    (joint, None)
}

pub(crate) fn sided(joint: Joint, side: Side) -> JointRef {
    (joint, Some(side))
}

/// Resolves `joints` on `model`, in order.
///
/// A missing bone is logged and yields `None`; the caller skips the pass without touching
/// the output motion.
pub(crate) fn require_bones(
    feature: Feature,
    model: &SkeletonData,
    role: &str,
    joints: &[JointRef],
) -> Option<Vec<usize>> {
    let mut indices = Vec::with_capacity(joints.len());
    for &(joint, side) in joints {
        match model.joint(joint, side) {
            Some(index) => indices.push(index),
            None => {
                warn!(
                    "{}: bone `{}` missing from {role} model `{}`, skipping",
                    feature.name(),
                    joint.bone_name(side),
                    model.name
                );
                return None;
            }
        }
    }
    Some(indices)
}

/// Both skeletons place every listed joint at the same rest position.
pub(crate) fn models_match(a: &SkeletonData, b: &SkeletonData, joints: &[JointRef]) -> bool {
    joints.iter().all(|&(joint, side)| {
        match (a.joint(joint, side), b.joint(joint, side)) {
            (Some(x), Some(y)) => a.bones[x]
                .position
                .abs_diff_eq(b.bones[y].position, MODEL_EPSILON),
            (None, None) => true,
            _ => false,
        }
    })
}

pub(crate) fn bone_names(model: &SkeletonData, bones: &[usize]) -> Vec<String> {
    bones.iter().map(|&b| model.bones[b].name.clone()).collect()
}

/// A key to merge into the output motion: `None` components keep whatever the track holds
/// (or interpolates) at that frame.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct KeyWrite {
    pub bone: String,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
}

impl KeyWrite {
    pub fn rotation(bone: impl Into<String>, rotation: Quat) -> Self {
        Self {
            bone: bone.into(),
            position: None,
            rotation: Some(rotation),
        }
    }

    pub fn position(bone: impl Into<String>, position: Vec3) -> Self {
        Self {
            bone: bone.into(),
            position: Some(position),
            rotation: None,
        }
    }

    pub fn pose(bone: impl Into<String>, position: Vec3, rotation: Quat) -> Self {
        Self {
            bone: bone.into(),
            position: Some(position),
            rotation: Some(rotation),
        }
    }

    /// Key reproducing the resolved local rotation of `index` in `deltas`.
    pub fn from_rotation(model: &SkeletonData, deltas: &BoneDeltas, index: usize) -> Self {
        Self::rotation(model.bones[index].name.clone(), deltas.keyed_rotation(index))
    }
}

/// Fetch-or-create the key at `frame`, overwrite the given components, insert registered.
pub(crate) fn write_key(motion: &mut Motion, frame: u32, write: &KeyWrite) {
    let mut key = motion.bone_frame(&write.bone, frame);
    if let Some(position) = write.position {
        key.position = position;
    }
    if let Some(rotation) = write.rotation {
        key.rotation = rotation.normalize();
    }
    motion.insert_bone_frame(&write.bone, frame, key);
}

/// Corrected keys for one frame plus where the drift-check bones should end up.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct FrameSolution {
    pub writes: Vec<KeyWrite>,
    pub expected: Vec<Vec3>,
}

impl FrameSolution {
    pub fn apply(&self, motion: &mut Motion, frame: u32) {
        for write in &self.writes {
            write_key(motion, frame, write);
        }
    }
}

/// How the output pose of a drift-check frame is measured.
pub(crate) struct DriftCheck<'a> {
    pub model: &'a SkeletonData,
    pub bones: Vec<usize>,
    pub ik: bool,
    pub threshold: f32,
}

impl DriftCheck<'_> {
    fn measure(&self, motion: &Motion, frame: u32, expected: &[Vec3]) -> f32 {
        if expected.is_empty() {
            return 0.0;
        }
        let options = DeformOptions {
            ik: self.ik,
            after_physics: true,
            bones: Some(self.bones.clone()),
        };
        let deltas = deform(self.model, motion, frame, &options);
        self.bones
            .iter()
            .zip(expected)
            .map(|(&bone, &position)| deltas.filled_global_position(bone).distance(position))
            .fold(0.0, f32::max)
    }
}

/// Inserts keys between the resolved `frames` wherever the interpolated pose strays from the
/// per-frame solution by more than the check threshold.
///
/// Each round measures every open interval in parallel, keys the worst frame of each
/// interval that exceeds the threshold and re-measures only the intervals it split.
/// Returns the number of inserted frames.
pub(crate) fn repair_drift<F>(
    motion: &mut Motion,
    frames: &[u32],
    check: &DriftCheck<'_>,
    block: usize,
    solve: &F,
) -> Result<usize, Error>
where
    F: Fn(u32) -> FrameSolution + Sync + Send,
{
    let mut windows: Vec<(u32, u32)> = frames
        .windows(2)
        .map(|w| (w[0], w[1]))
        .filter(|&(prev, next)| next > prev + 1)
        .collect();
    let mut inserted = 0;

    while !windows.is_empty() {
        let candidates: Vec<u32> = windows
            .iter()
            .flat_map(|&(prev, next)| prev + 1..next)
            .collect();
        let current: &Motion = motion;
        let mut measured = iter_parallel_by_list(&candidates, block, |_, &frame| {
            let solution = solve(frame);
            let drift = check.measure(current, frame, &solution.expected);
            (drift, solution)
        })?;

        let mut keyed = Vec::new();
        let mut split = Vec::new();
        let mut cursor = 0;
        for &(prev, next) in &windows {
            let span = (next - prev - 1) as usize;
            let window = &mut measured[cursor..cursor + span];
            cursor += span;

            let worst = window
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.0.total_cmp(&b.0))
                .map(|(i, (drift, _))| (i, *drift));
            let Some((offset, drift)) = worst else {
                continue;
            };
            if drift <= check.threshold {
                continue;
            }
            let frame = prev + 1 + offset as u32;
            keyed.push((frame, std::mem::take(&mut window[offset].1)));
            for (a, b) in [(prev, frame), (frame, next)] {
                if b > a + 1 {
                    split.push((a, b));
                }
            }
        }

        for (frame, solution) in &keyed {
            info!("drift {frame}: inserted {} keys", solution.writes.len());
            solution.apply(motion, *frame);
        }
        inserted += keyed.len();
        windows = split;
    }
    Ok(inserted)
}

/// Per-bone rewrite used by the fold passes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Fold {
    /// Zero the bone; its track is deleted by the pass.
    Remove,
    /// Clear the rotation, keep the bone's own world position.
    Flatten,
    /// Clear the rotation, keep the world position of the given child.
    Anchor(usize),
    /// Keep the world rotation (and position, for translatable bones) under the new parent pose.
    Rebase,
}

/// Rewrites the listed bones of one frame so the bones below them keep their world pose.
///
/// Bones are processed parents first; each rewrite sees the ones before it. `expected`
/// holds the pre-fold world positions of `check`.
pub(crate) fn fold_bones(
    model: &SkeletonData,
    motion: &Motion,
    frame: u32,
    actions: &[(usize, Fold)],
    check: &[usize],
) -> FrameSolution {
    let mut bones: Vec<usize> = actions.iter().map(|&(bone, _)| bone).collect();
    bones.extend_from_slice(check);
    bones.extend(actions.iter().filter_map(|&(_, fold)| match fold {
        Fold::Anchor(child) => Some(child),
        _ => None,
    }));
    let before = deform(model, motion, frame, &DeformOptions::ik_off().with_bones(bones));
    let mut base = before.clone();

    let mut ordered = actions.to_vec();
    ordered.sort_by_key(|&(bone, _)| deform_rank(model, bone));

    let mut writes = Vec::new();
    for (bone, fold) in ordered {
        let (parent_position, parent_rotation) = parent_pose(model, motion, &base, bone);
        let rest = model.rest_offset(bone);
        let name = model.bones[bone].name.clone();

        match fold {
            Fold::Remove => {
                base.override_rotation(bone, Quat::IDENTITY);
                base.override_position(bone, Vec3::ZERO);
            }
            Fold::Flatten => {
                let (position, _) = rebase(
                    parent_position,
                    parent_rotation,
                    before.filled_global_position(bone),
                    Quat::IDENTITY,
                    rest,
                );
                base.override_rotation(bone, Quat::IDENTITY);
                base.override_position(bone, position);
                writes.push(flattened_key(&base, bone, name));
            }
            Fold::Anchor(child) => {
                let child_offset = model.rest_offset(child) + before.filled_local_position(child);
                let target = before.filled_global_position(child) - parent_rotation * child_offset;
                let (position, _) =
                    rebase(parent_position, parent_rotation, target, Quat::IDENTITY, rest);
                base.override_rotation(bone, Quat::IDENTITY);
                base.override_position(bone, position);
                writes.push(flattened_key(&base, bone, name));
            }
            Fold::Rebase => {
                let (position, rotation) = rebase(
                    parent_position,
                    parent_rotation,
                    before.filled_global_position(bone),
                    before.filled_global_rotation(bone),
                    rest,
                );
                base.override_rotation(bone, rotation);
                let key_rotation = base.to_key_rotation(bone, rotation);
                if model.bones[bone].flags.translatable {
                    base.override_position(bone, position);
                    let key_position = base.get(bone).map(|d| d.frame_position).unwrap_or(position);
                    writes.push(KeyWrite::pose(name, key_position, key_rotation));
                } else {
                    writes.push(KeyWrite::rotation(name, key_rotation));
                }
            }
        }
    }

    FrameSolution {
        writes,
        expected: check
            .iter()
            .map(|&bone| before.filled_global_position(bone))
            .collect(),
    }
}

fn flattened_key(base: &BoneDeltas, bone: usize, name: String) -> KeyWrite {
    let position = base.get(bone).map(|d| d.frame_position).unwrap_or(Vec3::ZERO);
    KeyWrite::pose(name, position, base.to_key_rotation(bone, Quat::IDENTITY))
}

fn deform_rank(model: &SkeletonData, bone: usize) -> usize {
    model
        .deform_order()
        .iter()
        .position(|&b| b == bone)
        .unwrap_or(usize::MAX)
}

/// World pose of the parent of `bone` under the (partially rewritten) `base` deltas.
pub(crate) fn parent_pose(
    model: &SkeletonData,
    motion: &Motion,
    base: &BoneDeltas,
    bone: usize,
) -> (Vec3, Quat) {
    match model.bones[bone].parent {
        Some(parent) => {
            let posed = deform_from(
                model,
                motion,
                base,
                &DeformOptions::ik_off().with_bones([parent]),
            );
            (
                posed.filled_global_position(parent),
                posed.filled_global_rotation(parent),
            )
        }
        None => (Vec3::ZERO, Quat::IDENTITY),
    }
}

/// Solutions of one pass step, computed against a snapshot and not yet written.
pub(crate) struct FramePlan {
    pub frames: Vec<u32>,
    pub solutions: Vec<FrameSolution>,
    pub block: usize,
}

impl FramePlan {
    /// Solves every frame in parallel.
    pub fn solve<F>(frames: Vec<u32>, set_count: usize, solve: &F) -> Result<Self, Error>
    where
        F: Fn(u32) -> FrameSolution + Sync + Send,
    {
        let block = crate::block_size(frames.len(), set_count);
        let solutions = iter_parallel_by_list(&frames, block, |_, &frame| solve(frame))?;
        Ok(Self {
            frames,
            solutions,
            block,
        })
    }

    pub fn write(&self, motion: &mut Motion) {
        for (&frame, solution) in self.frames.iter().zip(&self.solutions) {
            solution.apply(motion, frame);
        }
    }

    /// Repairs drift between the planned frames; returns the number of inserted frames.
    pub fn repair<F>(&self, motion: &mut Motion, check: &DriftCheck<'_>, solve: &F) -> Result<usize, Error>
    where
        F: Fn(u32) -> FrameSolution + Sync + Send,
    {
        repair_drift(motion, &self.frames, check, self.block, solve)
    }
}

/// Body of a fold pass: rewrite `actions` at every keyed frame of their tracks, delete the
/// tracks of removed bones, then repair drift on `check`.
pub(crate) struct FoldJob {
    pub actions: Vec<(usize, Fold)>,
    pub check: Vec<usize>,
}

impl FoldJob {
    pub fn new(actions: Vec<(usize, Fold)>, check: Vec<usize>) -> Self {
        Self { actions, check }
    }

    fn removed(&self) -> impl Iterator<Item = usize> + '_ {
        self.actions
            .iter()
            .filter(|(_, fold)| *fold == Fold::Remove)
            .map(|&(bone, _)| bone)
    }

    fn solve(&self, model: &SkeletonData, snapshot: &Motion, frame: u32) -> FrameSolution {
        fold_bones(model, snapshot, frame, &self.actions, &self.check)
    }

    /// Solves all keyed frames against `snapshot` without writing anything.
    pub fn plan(
        &self,
        model: &SkeletonData,
        snapshot: &Motion,
        set_count: usize,
    ) -> Result<FramePlan, Error> {
        let tracks: Vec<usize> = self.actions.iter().map(|&(bone, _)| bone).collect();
        let frames = snapshot.registered_frames(&bone_names(model, &tracks));
        FramePlan::solve(frames, set_count, &|frame| self.solve(model, snapshot, frame))
    }

    /// Writes a plan into `motion`; returns the number of drift keys inserted.
    pub fn commit(
        &self,
        model: &SkeletonData,
        snapshot: &Motion,
        motion: &mut Motion,
        plan: FramePlan,
    ) -> Result<usize, Error> {
        plan.write(motion);
        for bone in self.removed() {
            motion.remove_bone_track(&model.bones[bone].name);
        }
        let check = DriftCheck {
            model,
            bones: self.check.clone(),
            ik: false,
            threshold: CLEANUP_THRESHOLD,
        };
        plan.repair(motion, &check, &|frame| self.solve(model, snapshot, frame))
    }

    pub fn run(
        &self,
        model: &SkeletonData,
        motion: &mut Motion,
        set_count: usize,
    ) -> Result<usize, Error> {
        let snapshot = motion.clone();
        let plan = self.plan(model, &snapshot, set_count)?;
        self.commit(model, &snapshot, motion, plan)
    }
}

/// IK iteration settings of the first authored IK found among `joints`.
pub(crate) fn authored_ik<'a>(
    model: &'a SkeletonData,
    joints: &[JointRef],
) -> Option<&'a IkData> {
    joints
        .iter()
        .filter_map(|&(joint, side)| model.joint(joint, side))
        .find_map(|bone| model.bones[bone].ik.as_ref())
}

/// Synthetic IK stages on one skeleton: each call rotates a transient link chain so a target
/// bone keeps its rest distance from an origin bone along a requested direction.
pub(crate) struct Aim<'a> {
    pub model: &'a SkeletonData,
    pub motion: &'a Motion,
    /// Bones every stage evaluates.
    pub bones: &'a [usize],
    pub settings: Option<&'a IkData>,
}

impl Aim<'_> {
    pub fn along(
        &self,
        deltas: BoneDeltas,
        target: usize,
        links: Vec<usize>,
        origin: usize,
        direction: Option<Vec3>,
    ) -> BoneDeltas {
        let Some(direction) = direction.and_then(Vec3::try_normalize) else {
            return deltas;
        };
        let length = self.model.rest_distance(origin, target);
        let goal = deltas.filled_global_position(origin) + direction * length;
        self.toward(deltas, target, links, goal)
    }

    /// Rotates `links` until `target` reaches `goal`.
    pub fn toward(
        &self,
        deltas: BoneDeltas,
        target: usize,
        links: Vec<usize>,
        goal: Vec3,
    ) -> BoneDeltas {
        let ik = IkData::new(target, links).with_settings_of(self.settings);
        deform_ik(
            self.model,
            self.motion,
            Some(&deltas),
            deltas.frame,
            &ik,
            goal,
            Some(self.bones),
        )
    }

    /// Re-evaluates `deltas` after manual overrides.
    pub fn refresh(&self, deltas: &BoneDeltas) -> BoneDeltas {
        deform_from(
            self.model,
            self.motion,
            deltas,
            &DeformOptions::ik_off().with_bones(self.bones.iter().copied()),
        )
    }
}

/// World direction `from -> to` in an evaluated pose.
pub(crate) fn pose_direction(deltas: &BoneDeltas, from: usize, to: usize) -> Option<Vec3> {
    crate::math::direction(
        deltas.filled_global_position(from),
        deltas.filled_global_position(to),
    )
}

/// Local rotation that gives `bone` the world rotation `global` under its parent in `deltas`.
pub(crate) fn local_for_global(
    model: &SkeletonData,
    deltas: &BoneDeltas,
    bone: usize,
    global: Quat,
) -> Quat {
    let parent = model.bones[bone]
        .parent
        .map(|p| deltas.filled_global_rotation(p))
        .unwrap_or(Quat::IDENTITY);
    (parent.inverse() * global).normalize()
}
