use crate::config::GuidanceConfig;
use crate::guidance::mixer::ThrustMixer;
use crate::interface::{GuidanceCommand, TargetEstimate, ThrustMix, VehicleState};
use crate::math::{unit_direction, Vec3};

/// Proportional navigation against a stationary target, plus the rotor mix.
pub struct GuidanceLaw {
    navigation_constant: f32,
    max_acceleration: f32,
    min_intercept_range_m: f32,
    mixer: ThrustMixer,
}

impl GuidanceLaw {
    pub fn new(config: &GuidanceConfig) -> Self {
        Self {
            navigation_constant: config.navigation_constant,
            max_acceleration: config.max_acceleration,
            min_intercept_range_m: config.min_intercept_range_cm / 100.0,
            mixer: ThrustMixer::new(config),
        }
    }

    pub fn to_thrust(&self, command: &GuidanceCommand) -> ThrustMix {
        self.mixer.to_thrust(command)
    }

    /// Cartesian target position in metres from a spherical estimate.
    pub fn target_position(target: &TargetEstimate) -> Vec3 {
        unit_direction(target.azimuth_rad, target.elevation_rad) * (target.range_cm / 100.0)
    }

    /// `None` when the estimate is not valid; no command is issued that cycle.
    pub fn compute(&self, vehicle: &VehicleState, target: &TargetEstimate) -> Option<GuidanceCommand> {
        if !target.valid {
            return None;
        }

        let relative_position = Self::target_position(target) - vehicle.position;
        let range = relative_position.norm();
        if range < self.min_intercept_range_m {
            return Some(GuidanceCommand::intercepted());
        }

        let line_of_sight = relative_position * (1.0 / range);
        let relative_velocity = -vehicle.velocity;
        let closing_velocity = line_of_sight.dot(&relative_velocity);
        let los_rate = (relative_velocity - line_of_sight * closing_velocity) * (1.0 / range);

        let acceleration = (los_rate * (self.navigation_constant * closing_velocity))
            .cap_magnitude(self.max_acceleration);

        Some(GuidanceCommand {
            acceleration,
            intercept: false,
        })
    }
}
