use crate::BoneCurves;
use glam::{Quat, Vec3};
use std::collections::{BTreeMap, BTreeSet};

const ACTIVE_EPSILON: f32 = 1.0e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct BoneFrame {
    pub position: Vec3,
    pub rotation: Quat,
    pub curves: BoneCurves,
    /// `true` for explicitly authored keys, `false` for interpolated samples.
    pub registered: bool,
}

impl Default for BoneFrame {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            curves: BoneCurves::default(),
            registered: false,
        }
    }
}

impl BoneFrame {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        let moved = self.position.length_squared() > ACTIVE_EPSILON * ACTIVE_EPSILON;
        let rotated = !self.rotation.abs_diff_eq(Quat::IDENTITY, ACTIVE_EPSILON)
            && !self.rotation.abs_diff_eq(-Quat::IDENTITY, ACTIVE_EPSILON);
        moved || rotated
    }
}

/// Sparse keyframe track of one bone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneTrack {
    pub name: String,
    frames: BTreeMap<u32, BoneFrame>,
}

impl BoneTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: u32) -> Option<&BoneFrame> {
        self.frames.get(&frame)
    }

    pub fn frames(&self) -> impl Iterator<Item = (u32, &BoneFrame)> {
        self.frames.iter().map(|(&f, key)| (f, key))
    }

    pub fn registered_frames(&self) -> impl Iterator<Item = u32> + '_ {
        self.frames
            .iter()
            .filter(|(_, key)| key.registered)
            .map(|(&f, _)| f)
    }

    pub fn first_frame(&self) -> Option<u32> {
        self.frames.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.frames.keys().next_back().copied()
    }

    pub fn contains_active(&self) -> bool {
        self.frames.values().any(BoneFrame::is_active)
    }

    pub fn sample(&self, frame: u32) -> BoneFrame {
        if let Some(key) = self.frames.get(&frame) {
            return key.clone();
        }
        self.sample_time(frame as f32)
    }

    /// Samples the track at a possibly fractional frame time.
    pub fn sample_time(&self, time: f32) -> BoneFrame {
        let time = time.max(0.0);
        let floor = time.floor() as u32;
        let prev = self.frames.range(..=floor).next_back();
        if let Some((&f, key)) = prev {
            if f as f32 == time {
                return key.clone();
            }
        }
        let next = self.frames.range(floor.saturating_add(1)..).next();

        let mut sample = match (prev, next) {
            (None, None) => BoneFrame::default(),
            (Some((_, p)), None) => p.clone(),
            (None, Some((_, n))) => n.clone(),
            (Some((&pf, p)), Some((&nf, n))) => {
                let progress = (time - pf as f32) / (nf - pf) as f32;
                let weight = |c: &crate::Curve| c.evaluate(progress);
                let position = Vec3::new(
                    lerp(p.position.x, n.position.x, weight(&n.curves.translate_x)),
                    lerp(p.position.y, n.position.y, weight(&n.curves.translate_y)),
                    lerp(p.position.z, n.position.z, weight(&n.curves.translate_z)),
                );
                let rotation = p
                    .rotation
                    .slerp(n.rotation, weight(&n.curves.rotate))
                    .normalize();
                BoneFrame {
                    position,
                    rotation,
                    curves: n.curves,
                    registered: false,
                }
            }
        };
        sample.registered = false;
        sample
    }

    /// Inserts or overwrites a key and marks it registered.
    ///
    /// A new key landing strictly between two keys splits the following key's curves so the
    /// easing of the surrounding interval keeps its shape.
    pub fn insert(&mut self, frame: u32, mut key: BoneFrame) {
        key.registered = true;
        if !self.frames.contains_key(&frame) {
            let prev = self.frames.range(..frame).next_back().map(|(&f, _)| f);
            let next = self
                .frames
                .range(frame.saturating_add(1)..)
                .next()
                .map(|(&f, _)| f);
            if let (Some(pf), Some(nf)) = (prev, next) {
                let progress = (frame - pf) as f32 / (nf - pf) as f32;
                if let Some(next_key) = self.frames.get_mut(&nf) {
                    let (head, tail) = next_key.curves.split(progress);
                    key.curves = head;
                    next_key.curves = tail;
                }
            }
        }
        self.frames.insert(frame, key);
    }

    pub fn remove(&mut self, frame: u32) -> Option<BoneFrame> {
        self.frames.remove(&frame)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MorphFrame {
    pub ratio: f32,
    pub registered: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphTrack {
    pub name: String,
    frames: BTreeMap<u32, MorphFrame>,
}

impl MorphTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = (u32, &MorphFrame)> {
        self.frames.iter().map(|(&f, key)| (f, key))
    }

    pub fn insert(&mut self, frame: u32, ratio: f32) {
        self.frames.insert(
            frame,
            MorphFrame {
                ratio,
                registered: true,
            },
        );
    }

    pub fn ratio(&self, frame: u32) -> f32 {
        if let Some(key) = self.frames.get(&frame) {
            return key.ratio;
        }
        let prev = self.frames.range(..frame).next_back();
        let next = self.frames.range(frame..).next();
        match (prev, next) {
            (None, None) => 0.0,
            (Some((_, p)), None) => p.ratio,
            (None, Some((_, n))) => n.ratio,
            (Some((&pf, p)), Some((&nf, n))) => {
                let t = (frame - pf) as f32 / (nf - pf) as f32;
                lerp(p.ratio, n.ratio, t)
            }
        }
    }
}

/// A named motion: bone tracks, morph tracks and whole-motion IK switches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Motion {
    pub name: String,
    bones: BTreeMap<String, BoneTrack>,
    morphs: BTreeMap<String, MorphTrack>,
    disabled_iks: BTreeSet<String>,
}

impl Motion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bone_track(&self, name: &str) -> Option<&BoneTrack> {
        self.bones.get(name)
    }

    pub fn bone_tracks(&self) -> impl Iterator<Item = &BoneTrack> {
        self.bones.values()
    }

    pub fn bone_track_mut(&mut self, name: &str) -> &mut BoneTrack {
        self.bones
            .entry(name.to_string())
            .or_insert_with(|| BoneTrack::new(name))
    }

    /// Key at `frame`, interpolated (and unregistered) when the frame is not keyed.
    pub fn bone_frame(&self, name: &str, frame: u32) -> BoneFrame {
        self.bones
            .get(name)
            .map(|track| track.sample(frame))
            .unwrap_or_default()
    }

    pub fn insert_bone_frame(&mut self, name: &str, frame: u32, key: BoneFrame) {
        self.bone_track_mut(name).insert(frame, key);
    }

    pub fn remove_bone_track(&mut self, name: &str) -> Option<BoneTrack> {
        self.bones.remove(name)
    }

    pub fn contains_bone_track(&self, name: &str) -> bool {
        self.bones.get(name).is_some_and(|t| !t.is_empty())
    }

    pub fn contains_active_bone(&self, name: &str) -> bool {
        self.bones.get(name).is_some_and(BoneTrack::contains_active)
    }

    /// Sorted, de-duplicated union of the registered frames of the named tracks.
    pub fn registered_frames<S: AsRef<str>>(&self, names: &[S]) -> Vec<u32> {
        let mut frames = BTreeSet::new();
        for name in names {
            if let Some(track) = self.bones.get(name.as_ref()) {
                frames.extend(track.registered_frames());
            }
        }
        frames.into_iter().collect()
    }

    pub fn max_frame(&self) -> u32 {
        let bones = self.bones.values().filter_map(BoneTrack::last_frame);
        let morphs = self
            .morphs
            .values()
            .filter_map(|t| t.frames.keys().next_back().copied());
        bones.chain(morphs).max().unwrap_or(0)
    }

    pub fn morph_track(&self, name: &str) -> Option<&MorphTrack> {
        self.morphs.get(name)
    }

    pub fn morph_tracks(&self) -> impl Iterator<Item = &MorphTrack> {
        self.morphs.values()
    }

    pub fn insert_morph_frame(&mut self, name: &str, frame: u32, ratio: f32) {
        self.morphs
            .entry(name.to_string())
            .or_insert_with(|| MorphTrack::new(name))
            .insert(frame, ratio);
    }

    pub fn is_ik_enabled(&self, name: &str) -> bool {
        !self.disabled_iks.contains(name)
    }

    pub fn set_ik_enabled(&mut self, name: &str, enabled: bool) {
        if enabled {
            self.disabled_iks.remove(name);
        } else {
            self.disabled_iks.insert(name.to_string());
        }
    }

    pub fn disabled_iks(&self) -> impl Iterator<Item = &str> {
        self.disabled_iks.iter().map(String::as_str)
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
