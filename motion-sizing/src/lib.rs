//! Retargets ("sizes") humanoid skeletal motions authored for one skeleton onto a skeleton
//! with different proportions or rest stance.
//!
//! A [`SizingSet`] pairs the original skeleton and motion with a sizing skeleton; the
//! passes of [`run_pipeline`] first simplify the motion's bone hierarchy on the original
//! skeleton, then rewrite it so the sizing skeleton reproduces the original's poses.

#![forbid(unsafe_code)]

mod curve;
mod error;
mod humanoid;
mod model;
mod motion;
mod runtime;
mod sizing;

pub mod math;

#[cfg(feature = "json")]
mod json;

pub use curve::*;
pub use error::*;
pub use humanoid::*;
pub use model::*;
pub use motion::*;
pub use runtime::*;
pub use sizing::*;



#[cfg(test)]
mod math_tests;

#[cfg(all(test, feature = "json"))]
mod json_tests;
