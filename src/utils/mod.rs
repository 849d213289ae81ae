//! Numerical helpers shared by features, models and metrics.

pub mod optimization;
pub mod stats;

pub use optimization::{minimize_in_box, Minimum, SimplexSettings};
pub use stats::{quantile_normal, z_for_level};
