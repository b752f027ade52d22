mod arm_twist;
mod clean_arm_ik;
mod clean_center;
mod clean_grip;
mod clean_leg_ik_parent;
mod clean_root;
mod clean_shoulder_p;
mod clean_waist;
mod common;
mod leg;
mod lower;
mod pipeline;
mod set;
mod shoulder;
mod stance;
mod upper;

pub use arm_twist::size_arm_twist;
pub use clean_arm_ik::clean_arm_ik;
pub use clean_center::clean_center;
pub use clean_grip::clean_grip;
pub use clean_leg_ik_parent::clean_leg_ik_parent;
pub use clean_root::clean_root;
pub use clean_shoulder_p::clean_shoulder_p;
pub use clean_waist::clean_waist;
pub use leg::size_leg;
pub use lower::size_lower;
pub use pipeline::{run_pipeline, run_pipelines};
pub use set::*;
pub use shoulder::size_shoulder;
pub use stance::{StanceOffset, size_stance, stance_offsets};
pub use upper::size_upper;

#[cfg(test)]
mod test_rig;


#[cfg(test)]
mod sizing_tests;

#[cfg(test)]
mod pipeline_tests;
