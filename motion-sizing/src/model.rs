use crate::{Error, Joint, Rig, Side};
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

/// Euler (XYZ, radians) bounds applied to an IK link after every solver step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AngleLimits {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IkLink {
    pub bone: usize,
    pub limits: Option<AngleLimits>,
}

impl IkLink {
    pub fn new(bone: usize) -> Self {
        Self { bone, limits: None }
    }
}

/// An IK chain: rotate `links` (ordered from the target's parent upwards) until `target`
/// reaches the goal position.
///
/// Stored on IK bones of a skeleton, or built on the fly for one-off solves through
/// [`crate::deform_ik`]; the latter is never registered in a skeleton's bone table.
#[derive(Clone, Debug, PartialEq)]
pub struct IkData {
    pub target: usize,
    pub loop_count: u32,
    pub unit_rotation: f32,
    pub links: Vec<IkLink>,
}

impl IkData {
    pub const DEFAULT_LOOP_COUNT: u32 = 40;
    pub const DEFAULT_UNIT_ROTATION: f32 = 1.0;

    pub fn new(target: usize, links: impl IntoIterator<Item = usize>) -> Self {
        Self {
            target,
            loop_count: Self::DEFAULT_LOOP_COUNT,
            unit_rotation: Self::DEFAULT_UNIT_ROTATION,
            links: links.into_iter().map(IkLink::new).collect(),
        }
    }

    /// Copies iteration settings from an authored IK so a synthetic chain converges the
    /// same way the skeleton's own solver does.
    pub fn with_settings_of(mut self, other: Option<&IkData>) -> Self {
        if let Some(other) = other {
            self.loop_count = other.loop_count.max(1);
            self.unit_rotation = other.unit_rotation;
        }
        self
    }
}

/// Additive ("effector") inheritance from another bone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Effector {
    pub source: usize,
    pub factor: f32,
    pub rotation: bool,
    pub translation: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalAxis {
    pub x: Vec3,
    pub z: Vec3,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BoneTail {
    Offset(Vec3),
    Bone(usize),
}

impl Default for BoneTail {
    fn default() -> Self {
        BoneTail::Offset(Vec3::ZERO)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoneFlags {
    pub rotatable: bool,
    pub translatable: bool,
    pub manipulable: bool,
    pub visible: bool,
}

impl Default for BoneFlags {
    fn default() -> Self {
        Self {
            rotatable: true,
            translatable: false,
            manipulable: true,
            visible: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest-pose position in model space.
    pub position: Vec3,
    pub tail: BoneTail,
    pub flags: BoneFlags,
    pub layer: i32,
    pub after_physics: bool,
    pub ik: Option<IkData>,
    pub effector: Option<Effector>,
    pub fixed_axis: Option<Vec3>,
    pub local_axis: Option<LocalAxis>,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            position,
            tail: BoneTail::default(),
            flags: BoneFlags::default(),
            layer: 0,
            after_physics: false,
            ik: None,
            effector: None,
            fixed_axis: None,
            local_axis: None,
        }
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_bone_name(&self.name)
    }

    pub fn is_ik(&self) -> bool {
        self.ik.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoneMorphOffset {
    pub bone: usize,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Clone, Debug)]
pub struct MorphData {
    pub name: String,
    pub offsets: Vec<BoneMorphOffset>,
}

#[derive(Clone, Debug)]
pub struct SkeletonData {
    pub name: String,
    pub bones: Vec<BoneData>,
    pub morphs: Vec<MorphData>,
    bone_index: HashMap<String, usize>,
    morph_index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    deform_order: Vec<usize>,
    rig: Rig,
}

impl SkeletonData {
    pub fn new(
        name: impl Into<String>,
        bones: Vec<BoneData>,
        morphs: Vec<MorphData>,
    ) -> Result<Arc<Self>, Error> {
        let count = bones.len();
        let check = |bone: &BoneData, field: &'static str, index: usize| {
            if index < count {
                Ok(())
            } else {
                Err(Error::InvalidBoneIndex {
                    bone: bone.name.clone(),
                    field,
                    index,
                })
            }
        };

        let mut bone_index = HashMap::with_capacity(count);
        let mut children = vec![Vec::new(); count];
        for (index, bone) in bones.iter().enumerate() {
            if bone_index.insert(bone.name.clone(), index).is_some() {
                return Err(Error::DuplicateBoneName {
                    name: bone.name.clone(),
                });
            }
            if let Some(parent) = bone.parent {
                check(bone, "parent", parent)?;
                children[parent].push(index);
            }
            if let Some(effector) = bone.effector {
                check(bone, "effector", effector.source)?;
            }
            if let BoneTail::Bone(tail) = bone.tail {
                check(bone, "tail", tail)?;
            }
            if let Some(ik) = bone.ik.as_ref() {
                check(bone, "IK target", ik.target)?;
                for link in &ik.links {
                    check(bone, "IK link", link.bone)?;
                }
            }
        }

        let mut morph_index = HashMap::with_capacity(morphs.len());
        for (index, morph) in morphs.iter().enumerate() {
            for offset in &morph.offsets {
                if offset.bone >= count {
                    return Err(Error::UnknownMorphBone {
                        morph: morph.name.clone(),
                        name: format!("#{}", offset.bone),
                    });
                }
            }
            morph_index.insert(morph.name.clone(), index);
        }

        let mut deform_order: Vec<usize> = (0..count).collect();
        deform_order.sort_by_key(|&i| (bones[i].after_physics, bones[i].layer, i));

        let rig = Rig::resolve(&bone_index);

        Ok(Arc::new(Self {
            name: name.into(),
            bones,
            morphs,
            bone_index,
            morph_index,
            children,
            deform_order,
            rig,
        }))
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bone_index.get(name).copied()
    }

    pub fn bone(&self, name: &str) -> Option<&BoneData> {
        self.bone_index(name).map(|i| &self.bones[i])
    }

    pub fn contains_bone(&self, name: &str) -> bool {
        self.bone_index.contains_key(name)
    }

    pub fn morph(&self, name: &str) -> Option<&MorphData> {
        self.morph_index.get(name).map(|&i| &self.morphs[i])
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    /// Index of the bone playing `joint`; `side` is ignored for trunk joints.
    pub fn joint(&self, joint: Joint, side: Option<Side>) -> Option<usize> {
        self.rig.get(joint, side)
    }

    pub fn sided(&self, joint: Joint, side: Side) -> Option<usize> {
        self.rig.get(joint, Some(side))
    }

    pub fn trunk(&self, joint: Joint) -> Option<usize> {
        self.rig.get(joint, None)
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bones in evaluation order: before-physics first, then by layer, then by index.
    pub fn deform_order(&self) -> &[usize] {
        &self.deform_order
    }

    /// Rest-pose offset of a bone from its parent (from the origin for roots).
    pub fn rest_offset(&self, index: usize) -> Vec3 {
        let bone = &self.bones[index];
        match bone.parent {
            Some(parent) => bone.position - self.bones[parent].position,
            None => bone.position,
        }
    }

    /// Rest-pose position of the bone tail in model space.
    pub fn tail_position(&self, index: usize) -> Vec3 {
        let bone = &self.bones[index];
        match bone.tail {
            BoneTail::Offset(offset) => bone.position + offset,
            BoneTail::Bone(tail) => self.bones[tail].position,
        }
    }

    pub fn is_ancestor_of(&self, ancestor: usize, bone: usize) -> bool {
        let mut current = self.bones.get(bone).and_then(|b| b.parent);
        let mut guard = self.bones.len();
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            guard = match guard.checked_sub(1) {
                Some(g) => g,
                None => return false,
            };
            current = self.bones[index].parent;
        }
        false
    }

    /// Distance between two bones in the rest pose.
    pub fn rest_distance(&self, from: usize, to: usize) -> f32 {
        self.bones[from].position.distance(self.bones[to].position)
    }
}
