mod deform;
mod ik;
mod parallel;

pub use deform::*;
pub use parallel::*;
