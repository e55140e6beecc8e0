use anyhow::Context;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sonarcore::math::Vec3;
use sonarcore::processing::calibration::speed_of_sound;
use sonarcore::SonarPipeline;
use std::ops::Range;

use crate::generator::profile::{EchoSynthesizer, ScenarioConfig};
use crate::workflow::config::WorkflowConfig;
use crate::workflow::runner::calibrate_with_reference;

/// Leading samples treated as noise when measuring SNR.
const NOISE_WINDOW_SAMPLES: usize = 1000;

/// Signal-to-noise ratio in dB between mean powers of two windows of
/// `samples`. Infinite for a silent noise window.
pub fn calculate_snr(samples: &[f32], signal: Range<usize>, noise: Range<usize>) -> f32 {
    let power = |window: Range<usize>| {
        let end = window.end.min(samples.len());
        let start = window.start.min(end);
        let slice = &samples[start..end];
        if slice.is_empty() {
            return 0.0;
        }
        slice.iter().map(|&v| v * v).sum::<f32>() / slice.len() as f32
    };
    let noise_power = power(noise);
    if noise_power == 0.0 {
        return f32::INFINITY;
    }
    10.0 * (power(signal) / noise_power).log10()
}

/// Detection error against the known target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotError {
    pub range_cm: f32,
    pub angle_deg: f32,
}

/// One pipeline and synthesizer pair firing single-target captures.
pub(crate) struct Shot {
    pub pipeline: SonarPipeline,
    synthesizer: EchoSynthesizer,
    capture: Array2<f32>,
    target: Vec3,
    truth_azimuth: f32,
    truth_elevation: f32,
    reference: usize,
    signal_window: Range<usize>,
    noise_window: Range<usize>,
}

impl Shot {
    pub fn new(config: &WorkflowConfig, scenario: &ScenarioConfig) -> anyhow::Result<Self> {
        let mut pipeline =
            SonarPipeline::new(config.system.clone()).context("initializing sonar pipeline")?;
        let mut synthesizer =
            EchoSynthesizer::new(&config.system, scenario).context("building echo synthesizer")?;
        if config.calibrate {
            calibrate_with_reference(&mut pipeline, &mut synthesizer);
        }

        let analysis = &config.analysis;
        let target = analysis.target_position();
        let array = &config.system.array;
        let reference = array.reference_channel;
        let two_way = target.norm() + (target - array.positions[reference]).norm();
        let arrival = (two_way / speed_of_sound(scenario.temperature_c)
            * config.system.sonar.sample_rate())
        .round() as usize;
        let capture = Array2::zeros(pipeline.buffer_shape());
        let noise_end = NOISE_WINDOW_SAMPLES.min(capture.ncols() / 10);

        Ok(Self {
            pipeline,
            synthesizer,
            capture,
            target,
            truth_azimuth: analysis.target_azimuth_deg.to_radians(),
            truth_elevation: analysis.target_elevation_deg.to_radians(),
            reference,
            signal_window: arrival..arrival + config.system.sonar.chirp_samples(),
            noise_window: 0..noise_end,
        })
    }

    /// Synthesizes a fresh capture and runs it through the core; `None` on a miss.
    pub fn fire(&mut self) -> anyhow::Result<Option<ShotError>> {
        self.synthesizer
            .synthesize(&[(self.target, 1.0)], &mut self.capture);
        let (detection, _) = self
            .pipeline
            .process(self.capture.view())
            .context("processing analysis capture")?;
        Ok(detection.target().map(|estimate| {
            let d_az = estimate.azimuth_rad - self.truth_azimuth;
            let d_el = estimate.elevation_rad - self.truth_elevation;
            ShotError {
                range_cm: (estimate.range_cm - self.target.norm() * 100.0).abs(),
                angle_deg: (d_az * d_az + d_el * d_el).sqrt().to_degrees(),
            }
        }))
    }

    /// SNR of the last raw capture on the reference channel.
    pub fn snr_db(&self) -> f32 {
        let row = self.capture.row(self.reference);
        match row.as_slice() {
            Some(samples) => {
                calculate_snr(samples, self.signal_window.clone(), self.noise_window.clone())
            }
            None => f32::NAN,
        }
    }
}

/// Monte-Carlo statistics for one noise level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseLevelResult {
    pub noise_std: f32,
    pub trials: usize,
    pub detection_rate: f32,
    /// `None` when no trial detected the target.
    pub range_rmse_cm: Option<f32>,
    pub angle_rmse_deg: Option<f32>,
    pub mean_snr_db: f32,
}

/// Repeats single-target detection `trials` times per configured noise level.
pub fn detection_performance(config: &WorkflowConfig) -> anyhow::Result<Vec<NoiseLevelResult>> {
    let analysis = &config.analysis;
    let mut results = Vec::with_capacity(analysis.noise_levels.len());

    for &noise_std in &analysis.noise_levels {
        let scenario = ScenarioConfig {
            noise_std,
            ..config.scenario.clone()
        };
        let mut shot = Shot::new(config, &scenario)
            .with_context(|| format!("noise level {}", noise_std))?;

        let mut detections = 0usize;
        let mut range_sq = 0.0f32;
        let mut angle_sq = 0.0f32;
        let mut snr_sum = 0.0f32;
        for _ in 0..analysis.trials {
            if let Some(error) = shot.fire()? {
                detections += 1;
                range_sq += error.range_cm * error.range_cm;
                angle_sq += error.angle_deg * error.angle_deg;
            }
            snr_sum += shot.snr_db();
        }

        let rmse = |sum_sq: f32| (detections > 0).then(|| (sum_sq / detections as f32).sqrt());
        results.push(NoiseLevelResult {
            noise_std,
            trials: analysis.trials,
            detection_rate: detections as f32 / analysis.trials as f32,
            range_rmse_cm: rmse(range_sq),
            angle_rmse_deg: rmse(angle_sq),
            mean_snr_db: snr_sum / analysis.trials as f32,
        });
    }
    Ok(results)
}
