use crate::{
    AngleLimits, BoneCurves, BoneData, BoneFlags, BoneFrame, BoneMorphOffset, BoneTail, Curve,
    Effector, Error, Feature, FeatureFlags, IkData, IkLink, LocalAxis, MorphData, Motion,
    SizingConfig, SkeletonData,
};
use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct SkeletonDef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    bones: Vec<BoneDef>,
    #[serde(default)]
    morphs: Vec<MorphDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoneDef {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    position: [f32; 3],
    #[serde(default)]
    tail: Option<[f32; 3]>,
    #[serde(default)]
    tail_bone: Option<String>,
    #[serde(default = "default_true")]
    rotatable: bool,
    #[serde(default)]
    translatable: bool,
    #[serde(default = "default_true")]
    manipulable: bool,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    layer: i32,
    #[serde(default)]
    after_physics: bool,
    #[serde(default)]
    ik: Option<IkDef>,
    #[serde(default)]
    effector: Option<EffectorDef>,
    #[serde(default)]
    fixed_axis: Option<[f32; 3]>,
    #[serde(default)]
    local_axis: Option<LocalAxisDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IkDef {
    target: String,
    #[serde(default = "default_loop_count")]
    loop_count: u32,
    #[serde(default = "default_unit_rotation")]
    unit_rotation: f32,
    #[serde(default)]
    links: Vec<IkLinkDef>,
}

#[derive(Debug, Deserialize)]
struct IkLinkDef {
    bone: String,
    #[serde(default)]
    limits: Option<LimitsDef>,
}

/// Euler XYZ bounds in degrees.
#[derive(Debug, Deserialize)]
struct LimitsDef {
    min: [f32; 3],
    max: [f32; 3],
}

#[derive(Debug, Deserialize)]
struct EffectorDef {
    source: String,
    #[serde(default = "default_one")]
    factor: f32,
    #[serde(default)]
    rotation: bool,
    #[serde(default)]
    translation: bool,
}

#[derive(Debug, Deserialize)]
struct LocalAxisDef {
    x: [f32; 3],
    z: [f32; 3],
}

#[derive(Debug, Deserialize)]
struct MorphDef {
    name: String,
    #[serde(default)]
    bones: Vec<MorphOffsetDef>,
}

#[derive(Debug, Deserialize)]
struct MorphOffsetDef {
    bone: String,
    #[serde(default)]
    position: [f32; 3],
    #[serde(default = "identity")]
    rotation: [f32; 4],
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

fn default_loop_count() -> u32 {
    IkData::DEFAULT_LOOP_COUNT
}

fn default_unit_rotation() -> f32 {
    IkData::DEFAULT_UNIT_ROTATION
}

fn identity() -> [f32; 4] {
    Quat::IDENTITY.to_array()
}

fn quat(q: [f32; 4]) -> Quat {
    let q = Quat::from_array(q);
    if q.length_squared() > 0.0 && q.is_finite() {
        q.normalize()
    } else {
        Quat::IDENTITY
    }
}

fn parse_error(e: serde_json::Error) -> Error {
    Error::JsonParse {
        message: e.to_string(),
    }
}

impl SkeletonData {
    /// Parses a skeleton from its JSON description. Bones may reference bones declared later
    /// in the list.
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: SkeletonDef = serde_json::from_str(input).map_err(parse_error)?;
        let index: HashMap<&str, usize> = def
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();
        let lookup = |context: &str, name: &str| {
            index.get(name).copied().ok_or_else(|| Error::JsonUnknownBone {
                context: context.to_string(),
                name: name.to_string(),
            })
        };

        let mut bones = Vec::with_capacity(def.bones.len());
        for bone in &def.bones {
            let parent = match bone.parent.as_deref() {
                Some(parent) => Some(index.get(parent).copied().ok_or_else(|| {
                    Error::JsonUnknownBoneParent {
                        bone: bone.name.clone(),
                        parent: parent.to_string(),
                    }
                })?),
                None => None,
            };
            let context = format!("bone '{}'", bone.name);

            let mut data = BoneData::new(bone.name.clone(), parent, Vec3::from_array(bone.position));
            data.tail = match (&bone.tail_bone, bone.tail) {
                (Some(tail), _) => BoneTail::Bone(lookup(&context, tail)?),
                (None, Some(offset)) => BoneTail::Offset(Vec3::from_array(offset)),
                (None, None) => BoneTail::default(),
            };
            data.flags = BoneFlags {
                rotatable: bone.rotatable,
                translatable: bone.translatable,
                manipulable: bone.manipulable,
                visible: bone.visible,
            };
            data.layer = bone.layer;
            data.after_physics = bone.after_physics;
            data.fixed_axis = bone.fixed_axis.map(Vec3::from_array);
            data.local_axis = bone.local_axis.as_ref().map(|axis| LocalAxis {
                x: Vec3::from_array(axis.x),
                z: Vec3::from_array(axis.z),
            });
            if let Some(effector) = bone.effector.as_ref() {
                data.effector = Some(Effector {
                    source: lookup(&context, &effector.source)?,
                    factor: effector.factor,
                    rotation: effector.rotation,
                    translation: effector.translation,
                });
            }
            if let Some(ik) = bone.ik.as_ref() {
                let mut links = Vec::with_capacity(ik.links.len());
                for link in &ik.links {
                    links.push(IkLink {
                        bone: lookup(&context, &link.bone)?,
                        limits: link.limits.as_ref().map(|limits| AngleLimits {
                            min: Vec3::from_array(limits.min.map(f32::to_radians)),
                            max: Vec3::from_array(limits.max.map(f32::to_radians)),
                        }),
                    });
                }
                data.ik = Some(IkData {
                    target: lookup(&context, &ik.target)?,
                    loop_count: ik.loop_count,
                    unit_rotation: ik.unit_rotation,
                    links,
                });
            }
            bones.push(data);
        }

        let mut morphs = Vec::with_capacity(def.morphs.len());
        for morph in &def.morphs {
            let context = format!("morph '{}'", morph.name);
            let mut offsets = Vec::with_capacity(morph.bones.len());
            for offset in &morph.bones {
                offsets.push(BoneMorphOffset {
                    bone: lookup(&context, &offset.bone)?,
                    position: Vec3::from_array(offset.position),
                    rotation: quat(offset.rotation),
                });
            }
            morphs.push(MorphData {
                name: morph.name.clone(),
                offsets,
            });
        }

        SkeletonData::new(def.name, bones, morphs)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct MotionDef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    bones: Vec<BoneTrackDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    morphs: Vec<MorphTrackDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    disabled_ik: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct BoneTrackDef {
    name: String,
    #[serde(default)]
    frames: Vec<BoneFrameDef>,
}

#[derive(Debug, Deserialize, Serialize)]
struct BoneFrameDef {
    frame: u32,
    #[serde(default)]
    position: [f32; 3],
    #[serde(default = "identity")]
    rotation: [f32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    curves: Option<CurvesDef>,
}

/// VMD-style control points `[x1, y1, x2, y2]` in `0..=1`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurvesDef {
    #[serde(default = "linear")]
    translate_x: [f32; 4],
    #[serde(default = "linear")]
    translate_y: [f32; 4],
    #[serde(default = "linear")]
    translate_z: [f32; 4],
    #[serde(default = "linear")]
    rotate: [f32; 4],
}

#[derive(Debug, Deserialize, Serialize)]
struct MorphTrackDef {
    name: String,
    #[serde(default)]
    frames: Vec<MorphFrameDef>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MorphFrameDef {
    frame: u32,
    ratio: f32,
}

fn linear() -> [f32; 4] {
    curve_points(&Curve::LINEAR)
}

fn curve_points(curve: &Curve) -> [f32; 4] {
    [curve.start.x, curve.start.y, curve.end.x, curve.end.y]
}

fn curve(points: [f32; 4]) -> Curve {
    Curve::new(
        Vec2::new(points[0], points[1]),
        Vec2::new(points[2], points[3]),
    )
}

impl CurvesDef {
    fn from_curves(curves: &BoneCurves) -> Option<Self> {
        let all = [
            curves.translate_x,
            curves.translate_y,
            curves.translate_z,
            curves.rotate,
        ];
        if all.iter().all(Curve::is_linear) {
            return None;
        }
        Some(Self {
            translate_x: curve_points(&curves.translate_x),
            translate_y: curve_points(&curves.translate_y),
            translate_z: curve_points(&curves.translate_z),
            rotate: curve_points(&curves.rotate),
        })
    }

    fn to_curves(&self) -> BoneCurves {
        BoneCurves {
            translate_x: curve(self.translate_x),
            translate_y: curve(self.translate_y),
            translate_z: curve(self.translate_z),
            rotate: curve(self.rotate),
        }
    }
}

impl Motion {
    /// Parses a motion; every listed key becomes a registered key.
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let def: MotionDef = serde_json::from_str(input).map_err(parse_error)?;
        let mut motion = Motion::new(def.name);
        for track in &def.bones {
            // Keep tracks that are declared without keys.
            motion.bone_track_mut(&track.name);
            let mut frames: Vec<&BoneFrameDef> = track.frames.iter().collect();
            frames.sort_by_key(|key| key.frame);
            for key in frames {
                let mut frame = BoneFrame::new(Vec3::from_array(key.position), quat(key.rotation));
                if let Some(curves) = key.curves.as_ref() {
                    frame.curves = curves.to_curves();
                }
                // Keys arrive in order, so no curve is split on the way in.
                motion.insert_bone_frame(&track.name, key.frame, frame);
            }
        }
        for track in &def.morphs {
            for key in &track.frames {
                motion.insert_morph_frame(&track.name, key.frame, key.ratio);
            }
        }
        for name in &def.disabled_ik {
            motion.set_ik_enabled(name, false);
        }
        Ok(motion)
    }

    pub fn to_json_string(&self) -> Result<String, Error> {
        let def = MotionDef {
            name: self.name.clone(),
            bones: self
                .bone_tracks()
                .map(|track| BoneTrackDef {
                    name: track.name.clone(),
                    frames: track
                        .frames()
                        .map(|(frame, key)| BoneFrameDef {
                            frame,
                            position: key.position.to_array(),
                            rotation: key.rotation.to_array(),
                            curves: CurvesDef::from_curves(&key.curves),
                        })
                        .collect(),
                })
                .collect(),
            morphs: self
                .morph_tracks()
                .map(|track| MorphTrackDef {
                    name: track.name.clone(),
                    frames: track
                        .frames()
                        .map(|(frame, key)| MorphFrameDef {
                            frame,
                            ratio: key.ratio,
                        })
                        .collect(),
                })
                .collect(),
            disabled_ik: self.disabled_iks().map(str::to_string).collect(),
        };
        serde_json::to_string_pretty(&def).map_err(|e| Error::JsonWrite {
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDef {
    #[serde(default)]
    features: Option<Vec<String>>,
    #[serde(default)]
    disabled: Vec<String>,
    #[serde(default = "default_set_count")]
    set_count: usize,
}

fn default_set_count() -> usize {
    1
}

fn feature(name: &str) -> Result<Feature, Error> {
    Feature::from_name(name).ok_or_else(|| Error::JsonUnknownFeature {
        name: name.to_string(),
    })
}

impl SizingConfig {
    /// Parses a job configuration.
    ///
    /// `features` lists the enabled features (all when absent); `disabled` switches
    /// features off afterwards.
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let def: ConfigDef = serde_json::from_str(input).map_err(parse_error)?;
        let mut features = match def.features.as_ref() {
            Some(names) => FeatureFlags::from_features(
                names
                    .iter()
                    .map(|name| feature(name))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => FeatureFlags::all(),
        };
        for name in &def.disabled {
            features.set_enabled(feature(name)?, false);
        }
        Ok(Self {
            features,
            set_count: def.set_count.max(1),
        })
    }
}
