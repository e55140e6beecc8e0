pub mod fft;
pub mod geometry;
pub mod stats;

pub use fft::FftHelper;
pub use geometry::{unit_direction, Vec3};
pub use stats::StatsHelper;
