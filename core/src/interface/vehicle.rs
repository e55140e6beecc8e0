use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Kinematic state supplied by the vehicle-state collaborator each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }
}

impl VehicleState {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }
}

/// Acceleration demand in m/s² and the intercept flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuidanceCommand {
    pub acceleration: Vec3,
    pub intercept: bool,
}

impl Default for GuidanceCommand {
    fn default() -> Self {
        Self {
            acceleration: Vec3::zeros(),
            intercept: false,
        }
    }
}

impl GuidanceCommand {
    pub fn intercepted() -> Self {
        Self {
            acceleration: Vec3::zeros(),
            intercept: true,
        }
    }
}

/// Normalized thrust for the four rotors: front-left, front-right, rear-left, rear-right.
pub type ThrustMix = [f32; 4];
