use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::interface::TargetEstimate;

/// Per-microphone sample buffers, one row per channel.
pub type ChannelMatrix = Array2<f32>;

/// Common error type for the sonar core.
#[derive(thiserror::Error, Debug)]
pub enum SonarError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("buffer exhaustion: {0}")]
    BufferExhaustion(String),
    #[error("calibration failure: {0}")]
    Calibration(String),
    #[error("hardware failure: {0}")]
    Hardware(String),
}

pub type SonarResult<T> = Result<T, SonarError>;

/// Why a cycle produced no target. Expected, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MissReason {
    BelowThreshold { peak: f32 },
    OutOfRange { range_cm: f32 },
}

/// Outcome of a single-target search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    Found(TargetEstimate),
    Missed(MissReason),
}

impl Detection {
    pub fn target(&self) -> Option<&TargetEstimate> {
        match self {
            Detection::Found(estimate) => Some(estimate),
            Detection::Missed(_) => None,
        }
    }

    /// Estimate to hand to guidance; invalid when nothing was found.
    pub fn estimate(&self) -> TargetEstimate {
        match self {
            Detection::Found(estimate) => *estimate,
            Detection::Missed(_) => TargetEstimate::invalid(),
        }
    }
}
