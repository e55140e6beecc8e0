use serde::{Deserialize, Serialize};

/// Steering direction in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SteeringDirection {
    pub azimuth_rad: f32,
    pub elevation_rad: f32,
}

impl SteeringDirection {
    pub fn new(azimuth_rad: f32, elevation_rad: f32) -> Self {
        Self {
            azimuth_rad,
            elevation_rad,
        }
    }

    pub fn from_degrees(azimuth_deg: f32, elevation_deg: f32) -> Self {
        Self::new(azimuth_deg.to_radians(), elevation_deg.to_radians())
    }
}

/// Single-target estimate produced fresh every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetEstimate {
    pub range_cm: f32,
    pub azimuth_rad: f32,
    pub elevation_rad: f32,
    pub confidence: f32,
    pub valid: bool,
}

impl TargetEstimate {
    pub fn new(range_cm: f32, direction: SteeringDirection, confidence: f32) -> Self {
        Self {
            range_cm,
            azimuth_rad: direction.azimuth_rad,
            elevation_rad: direction.elevation_rad,
            confidence: confidence.clamp(0.0, 1.0),
            valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            range_cm: 0.0,
            azimuth_rad: 0.0,
            elevation_rad: 0.0,
            confidence: 0.0,
            valid: false,
        }
    }
}

/// Range cluster reported by the multi-target detector.
///
/// Angles stay `None` unless a follow-up directional search resolved them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetCluster {
    pub range_cm: f32,
    pub power: f32,
    pub sample_count: usize,
    pub peak_index: usize,
    pub azimuth_rad: Option<f32>,
    pub elevation_rad: Option<f32>,
}

impl TargetCluster {
    pub fn seeded(range_cm: f32, power: f32, peak_index: usize) -> Self {
        Self {
            range_cm,
            power,
            sample_count: 1,
            peak_index,
            azimuth_rad: None,
            elevation_rad: None,
        }
    }

    /// Fold another peak into the running mean range and max power.
    pub fn merge(&mut self, range_cm: f32, power: f32) {
        let count = self.sample_count as f32;
        self.range_cm = (self.range_cm * count + range_cm) / (count + 1.0);
        self.power = self.power.max(power);
        self.sample_count += 1;
    }

    pub fn resolve(&mut self, direction: SteeringDirection) {
        self.azimuth_rad = Some(direction.azimuth_rad);
        self.elevation_rad = Some(direction.elevation_rad);
    }
}

/// Per-channel signal quality from a diagnostics pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelDiagnostics {
    pub channel: usize,
    pub signal_power: f32,
    pub noise_floor: f32,
    pub snr_db: f32,
}
