use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::analysis::performance::Shot;
use crate::workflow::config::WorkflowConfig;

/// Setting varied by [`parameter_sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    /// Chirp length in milliseconds.
    ChirpDuration,
    /// Chirp bandwidth in Hz, centred on the configured band.
    ChirpBandwidth,
    /// Scenario noise standard deviation.
    NoiseStd,
}

impl SweepParameter {
    fn apply(self, config: &mut WorkflowConfig, value: f32) {
        let sonar = &mut config.system.sonar;
        match self {
            SweepParameter::ChirpDuration => sonar.chirp_duration_ms = value,
            SweepParameter::ChirpBandwidth => {
                let centre = sonar.center_frequency_hz();
                sonar.chirp_f0_hz = centre - value / 2.0;
                sonar.chirp_f1_hz = centre + value / 2.0;
            }
            SweepParameter::NoiseStd => config.scenario.noise_std = value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPoint {
    pub parameter: SweepParameter,
    pub value: f32,
    pub detected: bool,
    pub range_error_cm: Option<f32>,
    pub angle_error_deg: Option<f32>,
    /// Range error plus the cross-range error the angle error causes at the
    /// target range, in metres.
    pub total_error_m: Option<f32>,
}

/// One detection per value with `parameter` set to it; everything else
/// stays as configured.
pub fn parameter_sweep(
    config: &WorkflowConfig,
    parameter: SweepParameter,
    values: &[f32],
) -> anyhow::Result<Vec<SweepPoint>> {
    let target_range_m = config.analysis.target_range_m;
    values
        .iter()
        .map(|&value| -> anyhow::Result<SweepPoint> {
            let mut trial = config.clone();
            parameter.apply(&mut trial, value);
            trial
                .system
                .validate()
                .with_context(|| format!("{:?} = {}", parameter, value))?;
            let mut shot = Shot::new(&trial, &trial.scenario)
                .with_context(|| format!("{:?} = {}", parameter, value))?;
            let error = shot.fire()?;
            Ok(SweepPoint {
                parameter,
                value,
                detected: error.is_some(),
                range_error_cm: error.map(|e| e.range_cm),
                angle_error_deg: error.map(|e| e.angle_deg),
                total_error_m: error
                    .map(|e| e.range_cm / 100.0 + e.angle_deg.to_radians() * target_range_m),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::quick_config;

    #[test]
    fn duration_sweep_detects_at_every_length() {
        let cfg = quick_config();
        let points = parameter_sweep(&cfg, SweepParameter::ChirpDuration, &[0.5, 1.0, 2.0]).unwrap();
        assert_eq!(points.len(), 3);
        for point in &points {
            assert!(point.detected, "missed at {} ms", point.value);
            assert!(point.range_error_cm.unwrap() < 3.0);
            assert!(point.total_error_m.unwrap() < 0.05);
        }
    }

    #[test]
    fn bandwidth_is_centred_on_the_band() {
        let mut cfg = quick_config();
        SweepParameter::ChirpBandwidth.apply(&mut cfg, 8000.0);
        assert_eq!(cfg.system.sonar.chirp_f0_hz, 36_000.0);
        assert_eq!(cfg.system.sonar.chirp_f1_hz, 44_000.0);
    }

    #[test]
    fn invalid_value_fails_the_sweep() {
        let cfg = quick_config();
        assert!(parameter_sweep(&cfg, SweepParameter::ChirpBandwidth, &[-1000.0]).is_err());
        assert!(parameter_sweep(&cfg, SweepParameter::ChirpDuration, &[20.0]).is_err());
    }
}
