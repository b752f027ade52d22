//! Canonical humanoid joint roles and their bone names.

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn prefix(self) -> &'static str {
        match self {
            Side::Left => "left ",
            Side::Right => "right ",
        }
    }

    /// Derives the side of a bone from its name prefix.
    pub fn from_bone_name(name: &str) -> Option<Side> {
        if name.starts_with(Side::Left.prefix()) {
            Some(Side::Left)
        } else if name.starts_with(Side::Right.prefix()) {
            Some(Side::Right)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Joint {
    Root,
    Center,
    Groove,
    Waist,
    LowerBody,
    UpperBody,
    UpperBody2,
    Neck,
    Head,

    LegIkParent,
    LegIk,
    ToeIk,
    Leg,
    Knee,
    Ankle,
    Toe,

    ShoulderP,
    Shoulder,
    ShoulderC,
    Arm,
    ArmTwist,
    Elbow,
    WristTwist,
    Wrist,
    ArmIk,

    Thumb0,
    Thumb1,
    Thumb2,
    Index1,
    Index2,
    Index3,
    Middle1,
    Middle2,
    Middle3,
    Ring1,
    Ring2,
    Ring3,
    Pinky1,
    Pinky2,
    Pinky3,

    Grip,
    Spread,
}

impl Joint {
    pub const TRUNK: [Joint; 9] = [
        Joint::Root,
        Joint::Center,
        Joint::Groove,
        Joint::Waist,
        Joint::LowerBody,
        Joint::UpperBody,
        Joint::UpperBody2,
        Joint::Neck,
        Joint::Head,
    ];

    pub const SIDED: [Joint; 33] = [
        Joint::LegIkParent,
        Joint::LegIk,
        Joint::ToeIk,
        Joint::Leg,
        Joint::Knee,
        Joint::Ankle,
        Joint::Toe,
        Joint::ShoulderP,
        Joint::Shoulder,
        Joint::ShoulderC,
        Joint::Arm,
        Joint::ArmTwist,
        Joint::Elbow,
        Joint::WristTwist,
        Joint::Wrist,
        Joint::ArmIk,
        Joint::Thumb0,
        Joint::Thumb1,
        Joint::Thumb2,
        Joint::Index1,
        Joint::Index2,
        Joint::Index3,
        Joint::Middle1,
        Joint::Middle2,
        Joint::Middle3,
        Joint::Ring1,
        Joint::Ring2,
        Joint::Ring3,
        Joint::Pinky1,
        Joint::Pinky2,
        Joint::Pinky3,
        Joint::Grip,
        Joint::Spread,
    ];

    /// Finger chains from the base joint to the tip joint.
    pub const FINGERS: [[Joint; 3]; 5] = [
        [Joint::Thumb0, Joint::Thumb1, Joint::Thumb2],
        [Joint::Index1, Joint::Index2, Joint::Index3],
        [Joint::Middle1, Joint::Middle2, Joint::Middle3],
        [Joint::Ring1, Joint::Ring2, Joint::Ring3],
        [Joint::Pinky1, Joint::Pinky2, Joint::Pinky3],
    ];

    pub fn base_name(self) -> &'static str {
        match self {
            Joint::Root => "all parent",
            Joint::Center => "center",
            Joint::Groove => "groove",
            Joint::Waist => "waist",
            Joint::LowerBody => "lower body",
            Joint::UpperBody => "upper body",
            Joint::UpperBody2 => "upper body2",
            Joint::Neck => "neck",
            Joint::Head => "head",
            Joint::LegIkParent => "leg IK parent",
            Joint::LegIk => "leg IK",
            Joint::ToeIk => "toe IK",
            Joint::Leg => "leg",
            Joint::Knee => "knee",
            Joint::Ankle => "ankle",
            Joint::Toe => "toe",
            Joint::ShoulderP => "shoulder P",
            Joint::Shoulder => "shoulder",
            Joint::ShoulderC => "shoulder C",
            Joint::Arm => "arm",
            Joint::ArmTwist => "arm twist",
            Joint::Elbow => "elbow",
            Joint::WristTwist => "wrist twist",
            Joint::Wrist => "wrist",
            Joint::ArmIk => "arm IK",
            Joint::Thumb0 => "thumb0",
            Joint::Thumb1 => "thumb1",
            Joint::Thumb2 => "thumb2",
            Joint::Index1 => "index1",
            Joint::Index2 => "index2",
            Joint::Index3 => "index3",
            Joint::Middle1 => "middle1",
            Joint::Middle2 => "middle2",
            Joint::Middle3 => "middle3",
            Joint::Ring1 => "ring1",
            Joint::Ring2 => "ring2",
            Joint::Ring3 => "ring3",
            Joint::Pinky1 => "pinky1",
            Joint::Pinky2 => "pinky2",
            Joint::Pinky3 => "pinky3",
            Joint::Grip => "grip",
            Joint::Spread => "spread",
        }
    }

    pub fn is_sided(self) -> bool {
        !Self::TRUNK.contains(&self)
    }

    /// Full bone name, e.g. `"left arm"` for `Joint::Arm` on the left side.
    ///
    /// Trunk joints ignore `side`.
    pub fn bone_name(self, side: Option<Side>) -> String {
        match side {
            Some(side) if self.is_sided() => format!("{}{}", side.prefix(), self.base_name()),
            _ => self.base_name().to_string(),
        }
    }

    pub fn sided(self, side: Side) -> String {
        self.bone_name(Some(side))
    }

    pub fn trunk(self) -> String {
        self.bone_name(None)
    }
}

/// Resolution table from joint roles to bone indices of one skeleton.
#[derive(Clone, Debug, Default)]
pub struct Rig {
    indices: HashMap<(Joint, Option<Side>), usize>,
}

impl Rig {
    pub(crate) fn resolve(bone_index: &HashMap<String, usize>) -> Self {
        let mut indices = HashMap::new();
        for joint in Joint::TRUNK {
            if let Some(&index) = bone_index.get(joint.base_name()) {
                indices.insert((joint, None), index);
            }
        }
        for joint in Joint::SIDED {
            for side in Side::BOTH {
                if let Some(&index) = bone_index.get(&joint.sided(side)) {
                    indices.insert((joint, Some(side)), index);
                }
            }
        }
        Self { indices }
    }

    pub fn get(&self, joint: Joint, side: Option<Side>) -> Option<usize> {
        let side = if joint.is_sided() { side } else { None };
        self.indices.get(&(joint, side)).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
