use crate::{BoneData, Effector, IkData, Joint, Motion, Side, SizingSet, SkeletonData};
use glam::{Quat, Vec3};
use std::sync::Arc;

pub(super) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(super) fn assert_vec_approx(actual: Vec3, expected: Vec3) {
    let diff = actual.distance(expected);
    assert!(
        diff <= 1.0e-3,
        "expected {expected:?}, got {actual:?} (diff {diff})"
    );
}

/// Standard humanoid bone table, editable before building.
pub(super) struct RigBuilder {
    bones: Vec<BoneData>,
}

impl RigBuilder {
    pub fn humanoid() -> Self {
        let mut rig = Self { bones: Vec::new() };
        let root = rig.push(Joint::Root.trunk(), None, Vec3::ZERO);
        rig.bones[root].flags.translatable = true;
        let center = rig.push(Joint::Center.trunk(), Some(root), Vec3::new(0.0, 8.0, 0.0));
        rig.bones[center].flags.translatable = true;
        let groove = rig.push(Joint::Groove.trunk(), Some(center), Vec3::new(0.0, 8.2, 0.0));
        rig.bones[groove].flags.translatable = true;
        let waist = rig.push(Joint::Waist.trunk(), Some(groove), Vec3::new(0.0, 10.0, 0.0));
        let upper = rig.push(Joint::UpperBody.trunk(), Some(waist), Vec3::new(0.0, 11.0, 0.0));
        let upper2 = rig.push(
            Joint::UpperBody2.trunk(),
            Some(upper),
            Vec3::new(0.0, 12.5, 0.0),
        );
        let neck = rig.push(Joint::Neck.trunk(), Some(upper2), Vec3::new(0.0, 15.0, 0.0));
        rig.push(Joint::Head.trunk(), Some(neck), Vec3::new(0.0, 16.0, 0.0));
        let lower = rig.push(Joint::LowerBody.trunk(), Some(waist), Vec3::new(0.0, 11.0, 0.0));

        for side in Side::BOTH {
            let s = match side {
                Side::Left => 1.0,
                Side::Right => -1.0,
            };
            let at = |x: f32, y: f32, z: f32| Vec3::new(s * x, y, z);

            let leg = rig.push(Joint::Leg.sided(side), Some(lower), at(1.0, 10.0, 0.0));
            let knee = rig.push(Joint::Knee.sided(side), Some(leg), at(1.0, 5.5, -0.2));
            let ankle = rig.push(Joint::Ankle.sided(side), Some(knee), at(1.0, 1.0, 0.0));
            let toe = rig.push(Joint::Toe.sided(side), Some(ankle), at(1.0, 0.0, -1.0));

            let ik_parent = rig.push(Joint::LegIkParent.sided(side), Some(root), at(1.0, 0.0, 0.0));
            rig.bones[ik_parent].flags.translatable = true;
            let leg_ik = rig.push(Joint::LegIk.sided(side), Some(ik_parent), at(1.0, 1.0, 0.0));
            rig.bones[leg_ik].flags.translatable = true;
            rig.bones[leg_ik].ik = Some(IkData::new(ankle, [knee, leg]));
            let toe_ik = rig.push(Joint::ToeIk.sided(side), Some(leg_ik), at(1.0, 0.0, -1.0));
            rig.bones[toe_ik].flags.translatable = true;
            rig.bones[toe_ik].ik = Some(IkData::new(toe, [ankle]));

            let shoulder_p = rig.push(Joint::ShoulderP.sided(side), Some(upper2), at(1.0, 14.0, 0.0));
            let shoulder = rig.push(Joint::Shoulder.sided(side), Some(shoulder_p), at(1.0, 14.0, 0.0));
            let arm = rig.push(Joint::Arm.sided(side), Some(shoulder), at(2.0, 14.0, 0.0));
            let arm_twist = rig.push(Joint::ArmTwist.sided(side), Some(arm), at(3.5, 14.0, 0.0));
            rig.bones[arm_twist].fixed_axis = Some(at(1.0, 0.0, 0.0));
            let elbow = rig.push(Joint::Elbow.sided(side), Some(arm_twist), at(5.0, 14.0, 0.0));
            let wrist_twist = rig.push(Joint::WristTwist.sided(side), Some(elbow), at(6.5, 14.0, 0.0));
            rig.bones[wrist_twist].fixed_axis = Some(at(1.0, 0.0, 0.0));
            let wrist = rig.push(Joint::Wrist.sided(side), Some(wrist_twist), at(8.0, 14.0, 0.0));

            let thumb0 = rig.push(Joint::Thumb0.sided(side), Some(wrist), at(8.3, 14.0, -0.5));
            let thumb1 = rig.push(Joint::Thumb1.sided(side), Some(thumb0), at(8.8, 14.0, -0.8));
            rig.push(Joint::Thumb2.sided(side), Some(thumb1), at(9.2, 14.0, -1.0));
            let index1 = rig.push(Joint::Index1.sided(side), Some(wrist), at(9.0, 14.0, -0.3));
            let index2 = rig.push(Joint::Index2.sided(side), Some(index1), at(9.5, 14.0, -0.3));
            rig.push(Joint::Index3.sided(side), Some(index2), at(10.0, 14.0, -0.3));
            let middle1 = rig.push(Joint::Middle1.sided(side), Some(wrist), at(9.0, 14.0, 0.0));
            let middle2 = rig.push(Joint::Middle2.sided(side), Some(middle1), at(9.5, 14.0, 0.0));
            rig.push(Joint::Middle3.sided(side), Some(middle2), at(10.0, 14.0, 0.0));
        }
        rig
    }

    pub fn push(&mut self, name: String, parent: Option<usize>, position: Vec3) -> usize {
        self.bones.push(BoneData::new(name, parent, position));
        self.bones.len() - 1
    }

    pub fn index(&self, name: &str) -> usize {
        self.bones
            .iter()
            .position(|bone| bone.name == name)
            .unwrap_or_else(|| panic!("no bone `{name}` in test rig"))
    }

    pub fn bone_mut(&mut self, name: &str) -> &mut BoneData {
        let index = self.index(name);
        &mut self.bones[index]
    }

    /// Shifts a bone and all its descendants by `offset`.
    pub fn shift(mut self, name: &str, offset: Vec3) -> Self {
        let root = self.index(name);
        for index in 0..self.bones.len() {
            if index == root || self.descends_from(index, root) {
                self.bones[index].position += offset;
            }
        }
        self
    }

    /// Rotates everything below a bone about its rest position, fixed axes included.
    pub fn turn(mut self, name: &str, rotation: Quat) -> Self {
        let root = self.index(name);
        let pivot = self.bones[root].position;
        for index in 0..self.bones.len() {
            if !self.descends_from(index, root) {
                continue;
            }
            let bone = &mut self.bones[index];
            bone.position = pivot + rotation * (bone.position - pivot);
            bone.fixed_axis = bone.fixed_axis.map(|axis| rotation * axis);
        }
        self
    }

    /// Uniformly scales every rest position about the origin.
    pub fn scaled(mut self, factor: f32) -> Self {
        for bone in &mut self.bones {
            bone.position *= factor;
        }
        self
    }

    /// Removes a bone, reparenting its children to its parent.
    pub fn without(mut self, name: &str) -> Self {
        let removed = self.index(name);
        let parent = self.bones[removed].parent;
        self.bones.remove(removed);
        let remap = |index: usize| if index > removed { index - 1 } else { index };
        for bone in &mut self.bones {
            bone.parent = match bone.parent {
                Some(p) if p == removed => parent.map(remap),
                Some(p) => Some(remap(p)),
                None => None,
            };
            if let Some(ik) = bone.ik.as_mut() {
                ik.target = remap(ik.target);
                ik.links.retain(|link| link.bone != removed);
                for link in &mut ik.links {
                    link.bone = remap(link.bone);
                }
            }
            if let Some(effector) = bone.effector.as_mut() {
                effector.source = remap(effector.source);
            }
        }
        self
    }

    /// Adds arm IK bones driving elbow and arm toward the wrist.
    pub fn with_arm_ik(mut self) -> Self {
        for side in Side::BOTH {
            let upper2 = self.index(&Joint::UpperBody2.trunk());
            let wrist = self.index(&Joint::Wrist.sided(side));
            let elbow = self.index(&Joint::Elbow.sided(side));
            let arm = self.index(&Joint::Arm.sided(side));
            let position = self.bones[wrist].position;
            let ik = self.push(Joint::ArmIk.sided(side), Some(upper2), position);
            self.bones[ik].flags.translatable = true;
            self.bones[ik].ik = Some(IkData::new(wrist, [elbow, arm]));
        }
        self
    }

    /// Adds grip bones whose rotation the index and middle fingers inherit.
    pub fn with_grip(mut self) -> Self {
        for side in Side::BOTH {
            let wrist = self.index(&Joint::Wrist.sided(side));
            let position = self.bones[wrist].position;
            let grip = self.push(Joint::Grip.sided(side), Some(wrist), position);
            // Evaluated ahead of the fingers that inherit from it.
            self.bones[grip].layer = -1;
            for joint in [Joint::Index1, Joint::Index2, Joint::Middle1, Joint::Middle2] {
                self.bone_mut(&joint.sided(side)).effector = Some(Effector {
                    source: grip,
                    factor: 1.0,
                    rotation: true,
                    translation: false,
                });
            }
        }
        self
    }

    pub fn build(self, name: &str) -> Arc<SkeletonData> {
        SkeletonData::new(name, self.bones, Vec::new()).expect("test rig is valid")
    }

    fn descends_from(&self, bone: usize, ancestor: usize) -> bool {
        let mut current = self.bones[bone].parent;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.bones[index].parent;
        }
        false
    }
}

pub(super) fn humanoid(name: &str) -> Arc<SkeletonData> {
    RigBuilder::humanoid().build(name)
}

pub(super) fn rotation_key(motion: &mut Motion, bone: &str, frame: u32, rotation: Quat) {
    let mut key = motion.bone_frame(bone, frame);
    key.rotation = rotation;
    motion.insert_bone_frame(bone, frame, key);
}

pub(super) fn position_key(motion: &mut Motion, bone: &str, frame: u32, position: Vec3) {
    let mut key = motion.bone_frame(bone, frame);
    key.position = position;
    motion.insert_bone_frame(bone, frame, key);
}

pub(super) fn sizing_set(
    original: Arc<SkeletonData>,
    sizing: Arc<SkeletonData>,
    motion: Motion,
    features: &[crate::Feature],
) -> SizingSet {
    SizingSet::new(0, original, sizing, Arc::new(motion))
        .with_features(crate::FeatureFlags::from_features(features.iter().copied()))
}

pub(super) fn left(joint: Joint) -> String {
    joint.sided(Side::Left)
}
