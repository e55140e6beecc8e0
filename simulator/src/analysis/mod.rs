//! Offline performance analysis over the same synthesizer and core the
//! intercept runner uses: Monte-Carlo detection statistics across noise
//! levels, chirp parameter sweeps and the array's angular response.

pub mod beam_pattern;
pub mod performance;
pub mod sweep;

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use sonarcore::math::{unit_direction, Vec3};

use self::beam_pattern::BeamPattern;
use self::performance::NoiseLevelResult;
use self::sweep::{SweepParameter, SweepPoint};
use crate::workflow::config::WorkflowConfig;

/// Single stationary target and the parameter grids every analysis runs over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub trials: usize,
    pub target_range_m: f32,
    pub target_azimuth_deg: f32,
    pub target_elevation_deg: f32,
    pub noise_levels: Vec<f32>,
    pub chirp_durations_ms: Vec<f32>,
    pub chirp_bandwidths_hz: Vec<f32>,
    /// Points per axis of the beam-pattern grid.
    pub beam_points: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trials: 20,
            target_range_m: 2.0,
            target_azimuth_deg: 0.0,
            target_elevation_deg: 0.0,
            noise_levels: vec![2.0, 20.0, 200.0],
            chirp_durations_ms: vec![0.5, 1.0, 2.0, 4.0],
            chirp_bandwidths_hz: vec![1000.0, 2000.0, 4000.0, 8000.0],
            beam_points: 21,
        }
    }
}

impl AnalysisConfig {
    /// Target position relative to the array, in metres.
    pub fn target_position(&self) -> Vec3 {
        unit_direction(
            self.target_azimuth_deg.to_radians(),
            self.target_elevation_deg.to_radians(),
        ) * self.target_range_m
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.trials > 0, "analysis needs at least one trial");
        anyhow::ensure!(
            self.target_range_m > 0.0 && self.target_range_m.is_finite(),
            "analysis target range must be positive"
        );
        anyhow::ensure!(
            self.beam_points >= 2,
            "beam pattern needs at least two points per axis"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub performance: Vec<NoiseLevelResult>,
    pub duration_sweep: Vec<SweepPoint>,
    pub bandwidth_sweep: Vec<SweepPoint>,
    pub beam_pattern: BeamPattern,
}

pub fn run(config: &WorkflowConfig) -> anyhow::Result<AnalysisReport> {
    let analysis = &config.analysis;
    analysis.validate()?;

    let performance =
        performance::detection_performance(config).context("detection performance")?;
    let duration_sweep = sweep::parameter_sweep(
        config,
        SweepParameter::ChirpDuration,
        &analysis.chirp_durations_ms,
    )
    .context("chirp duration sweep")?;
    let bandwidth_sweep = sweep::parameter_sweep(
        config,
        SweepParameter::ChirpBandwidth,
        &analysis.chirp_bandwidths_hz,
    )
    .context("chirp bandwidth sweep")?;
    let beam_pattern = beam_pattern::beam_pattern(config).context("beam pattern")?;

    info!(
        "analysis done: {} noise levels, {} + {} sweep points, {}x{} beam grid",
        performance.len(),
        duration_sweep.len(),
        bandwidth_sweep.len(),
        beam_pattern.azimuth_deg.len(),
        beam_pattern.elevation_deg.len()
    );
    Ok(AnalysisReport {
        performance,
        duration_sweep,
        bandwidth_sweep,
        beam_pattern,
    })
}

#[cfg(test)]
pub(crate) fn quick_config() -> WorkflowConfig {
    let mut cfg = WorkflowConfig::from_args(1, 20.0);
    cfg.system.sonar.max_range_cm = 300.0;
    cfg.system.search.azimuth_steps = 6;
    cfg.system.search.elevation_steps = 4;
    cfg.analysis.trials = 3;
    cfg.analysis.noise_levels = vec![1.0, 50.0];
    cfg.analysis.chirp_durations_ms = vec![0.5, 2.0];
    cfg.analysis.chirp_bandwidths_hz = vec![2000.0, 6000.0];
    cfg.analysis.beam_points = 7;
    cfg
}
