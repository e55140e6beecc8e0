//! Signal-processing and guidance core for the ultrasonic intercept sonar.
//!
//! Each acquisition cycle runs calibration, pulse compression, delay-and-sum
//! angular search and multi-target clustering over fixed buffers, then turns
//! the estimate into a proportional-navigation command and a thrust mix.

pub mod config;
pub mod guidance;
pub mod interface;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use config::SystemConfig;
pub use pipeline::{CycleReport, SonarPipeline};
pub use prelude::{ChannelMatrix, Detection, MissReason, SonarError, SonarResult};
