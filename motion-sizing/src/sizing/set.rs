use crate::{Motion, SkeletonData};
use std::sync::Arc;

/// Independently toggleable correction of the sizing pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Feature {
    CleanRoot,
    CleanCenter,
    CleanWaist,
    CleanLegIkParent,
    CleanShoulderP,
    CleanArmIk,
    CleanGrip,
    ArmStance,
    FingerStance,
    ArmTwist,
    Lower,
    Leg,
    Upper,
    Shoulder,
}

impl Feature {
    pub const ALL: [Feature; 14] = [
        Feature::CleanRoot,
        Feature::CleanCenter,
        Feature::CleanWaist,
        Feature::CleanLegIkParent,
        Feature::CleanShoulderP,
        Feature::CleanArmIk,
        Feature::CleanGrip,
        Feature::ArmStance,
        Feature::FingerStance,
        Feature::ArmTwist,
        Feature::Lower,
        Feature::Leg,
        Feature::Upper,
        Feature::Shoulder,
    ];

    /// Configuration name, e.g. `"clean_shoulder_p"`.
    pub fn name(self) -> &'static str {
        match self {
            Feature::CleanRoot => "clean_root",
            Feature::CleanCenter => "clean_center",
            Feature::CleanWaist => "clean_waist",
            Feature::CleanLegIkParent => "clean_leg_ik_parent",
            Feature::CleanShoulderP => "clean_shoulder_p",
            Feature::CleanArmIk => "clean_arm_ik",
            Feature::CleanGrip => "clean_grip",
            Feature::ArmStance => "arm_stance",
            Feature::FingerStance => "finger_stance",
            Feature::ArmTwist => "arm_twist",
            Feature::Lower => "lower",
            Feature::Leg => "leg",
            Feature::Upper => "upper",
            Feature::Shoulder => "shoulder",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Per-feature `Enabled` switch plus the `Pending -> Done` state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FeatureFlags {
    enabled: u32,
    done: u32,
}

impl FeatureFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::from_features(Feature::ALL)
    }

    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut flags = Self::default();
        for feature in features {
            flags.set_enabled(feature, true);
        }
        flags
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled & feature.bit() != 0
    }

    pub fn set_enabled(&mut self, feature: Feature, enabled: bool) {
        if enabled {
            self.enabled |= feature.bit();
        } else {
            self.enabled &= !feature.bit();
        }
    }

    pub fn is_done(&self, feature: Feature) -> bool {
        self.done & feature.bit() != 0
    }

    pub fn should_run(&self, feature: Feature) -> bool {
        self.is_enabled(feature) && !self.is_done(feature)
    }

    fn complete(&mut self, feature: Feature) {
        self.done |= feature.bit();
    }

    pub fn enabled(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|&f| self.is_enabled(f))
    }
}

/// Job-level settings, loadable from JSON with the `json` feature.
#[derive(Clone, Debug, PartialEq)]
pub struct SizingConfig {
    pub features: FeatureFlags,
    /// Number of sizing sets sharing the worker pool.
    pub set_count: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            features: FeatureFlags::all(),
            set_count: 1,
        }
    }
}

/// One retarget job: read-only source data plus the output motion the passes rewrite.
#[derive(Clone, Debug)]
pub struct SizingSet {
    pub index: usize,
    pub original_model: Arc<SkeletonData>,
    pub sizing_model: Arc<SkeletonData>,
    pub original_motion: Arc<Motion>,
    pub output_motion: Motion,
    features: FeatureFlags,
}

impl SizingSet {
    pub fn new(
        index: usize,
        original_model: Arc<SkeletonData>,
        sizing_model: Arc<SkeletonData>,
        original_motion: Arc<Motion>,
    ) -> Self {
        let output_motion = original_motion.as_ref().clone();
        Self {
            index,
            original_model,
            sizing_model,
            original_motion,
            output_motion,
            features: FeatureFlags::none(),
        }
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    pub fn set_enabled(&mut self, feature: Feature, enabled: bool) {
        self.features.set_enabled(feature, enabled);
    }

    /// The single gate every pass checks before touching the output motion.
    pub fn should_run(&self, feature: Feature) -> bool {
        self.features.should_run(feature)
    }

    pub fn is_done(&self, feature: Feature) -> bool {
        self.features.is_done(feature)
    }

    pub(crate) fn complete(&mut self, feature: Feature) {
        self.features.complete(feature);
    }

    /// Installs the corrected working copy as the output motion and marks `feature` done.
    ///
    /// Passes edit a copy of the output motion, so a pass that fails part way leaves the
    /// output motion untouched and the feature pending.
    pub(crate) fn commit(&mut self, feature: Feature, output: Motion) {
        self.output_motion = output;
        self.complete(feature);
    }
}
