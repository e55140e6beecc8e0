use crate::config::GuidanceConfig;
use crate::interface::{GuidanceCommand, ThrustMix};

/// Linear X-configuration mix of an acceleration demand around hover thrust.
pub struct ThrustMixer {
    hover_thrust: f32,
    gain: f32,
}

impl ThrustMixer {
    pub fn new(config: &GuidanceConfig) -> Self {
        Self {
            hover_thrust: config.hover_thrust,
            gain: config.mix_gain,
        }
    }

    /// Front-left, front-right, rear-left, rear-right, each clamped to `[0, 1]`.
    pub fn to_thrust(&self, command: &GuidanceCommand) -> ThrustMix {
        let a = command.acceleration;
        let (x, y, z) = (a.x * self.gain, a.y * self.gain, a.z * self.gain);
        let base = self.hover_thrust + z;
        [base + x + y, base - x + y, base + x - y, base - x - y].map(|t| t.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn mixer() -> ThrustMixer {
        ThrustMixer::new(&GuidanceConfig::default())
    }

    #[test]
    fn zero_demand_hovers() {
        assert_eq!(mixer().to_thrust(&GuidanceCommand::default()), [0.5; 4]);
    }

    #[test]
    fn lateral_demand_differentiates_rotors() {
        let command = GuidanceCommand {
            acceleration: Vec3::new(0.4, 0.0, 0.0),
            intercept: false,
        };
        let thrust = mixer().to_thrust(&command);
        for (actual, expected) in thrust.iter().zip([0.6, 0.4, 0.6, 0.4]) {
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn thrust_is_clamped_to_unit_range() {
        let command = GuidanceCommand {
            acceleration: Vec3::new(9.0, 9.0, 0.0),
            intercept: false,
        };
        assert_eq!(mixer().to_thrust(&command), [1.0, 0.5, 0.5, 0.0]);
    }
}
