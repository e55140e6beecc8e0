use anyhow::Context;
use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sonarcore::interface::ChannelDiagnostics;
use sonarcore::math::Vec3;
use sonarcore::telemetry::{JsonLinesSink, LogSink, MetricsSnapshot, RecordSink, TelemetryRecord};
use sonarcore::SonarPipeline;
use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;

use crate::generator::profile::{EchoSynthesizer, ScenarioConfig};
use crate::workflow::config::WorkflowConfig;
use crate::workflow::hardware::SimulatedHardware;

/// Offset of the calibration reference pulse within the capture.
const REFERENCE_PULSE_START: usize = 100;

/// Per-cycle line of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub truth_range_cm: Option<f32>,
    pub range_cm: Option<f32>,
    pub azimuth_deg: Option<f32>,
    pub elevation_deg: Option<f32>,
    pub confidence: Option<f32>,
    pub clusters: usize,
    pub acceleration: Option<Vec3>,
    pub thrust: Option<[f32; 4]>,
    pub latency_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub scenario: Option<String>,
    pub cycles: Vec<CycleSummary>,
    pub calibrated: bool,
    pub intercepted: bool,
    pub intercept_cycle: Option<u64>,
    pub final_distance_m: Option<f32>,
    pub channels: Vec<ChannelDiagnostics>,
    pub metrics: MetricsSnapshot,
}

impl WorkflowResult {
    pub fn detection_count(&self) -> usize {
        self.cycles.iter().filter(|c| c.range_cm.is_some()).count()
    }
}

/// Calibrates `pipeline` against a synthesized common reference pulse.
/// A failed pass is logged and leaves the pipeline uncalibrated.
pub fn calibrate_with_reference(
    pipeline: &mut SonarPipeline,
    synthesizer: &mut EchoSynthesizer,
) -> bool {
    let mut reference = Array2::zeros(pipeline.buffer_shape());
    synthesizer.reference_capture(&mut reference, REFERENCE_PULSE_START);
    match pipeline.calibrate(reference.view()) {
        Ok(()) => true,
        Err(err) => {
            warn!("continuing uncalibrated: {}", err);
            false
        }
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        self.execute_scenario(&self.config.scenario)
    }

    /// Runs the configured cycle loop against `scenario`.
    pub fn execute_scenario(&self, scenario: &ScenarioConfig) -> anyhow::Result<WorkflowResult> {
        let config = &self.config;
        let mut pipeline =
            SonarPipeline::new(config.system.clone()).context("initializing sonar pipeline")?;
        let synthesizer =
            EchoSynthesizer::new(&config.system, scenario).context("building echo synthesizer")?;
        let mut hardware =
            SimulatedHardware::new(synthesizer, scenario.targets.clone(), config.vehicle);
        let mut sink = self.open_sink()?;

        let calibrated =
            config.calibrate && calibrate_with_reference(&mut pipeline, hardware.synthesizer_mut());

        let dt = config.cycle_period_s();
        let mut cycles = Vec::with_capacity(config.cycles);
        let mut intercept_cycle = None;

        for _ in 0..config.cycles {
            let truth_range_cm = hardware.nearest_target_m().map(|d| d * 100.0);
            let report = pipeline
                .run_cycle(&mut hardware, sink.as_mut())
                .context("running detection cycle")?;

            let estimate = report.detection.target().copied();
            let acceleration = report.command.map(|c| c.acceleration);
            cycles.push(CycleSummary {
                cycle: report.cycle,
                truth_range_cm,
                range_cm: estimate.map(|e| e.range_cm),
                azimuth_deg: estimate.map(|e| e.azimuth_rad.to_degrees()),
                elevation_deg: estimate.map(|e| e.elevation_rad.to_degrees()),
                confidence: estimate.map(|e| e.confidence),
                clusters: report.cluster_count,
                acceleration,
                thrust: report.thrust,
                latency_us: report.latency.as_micros().min(u64::MAX as u128) as u64,
            });

            let guidance_intercept = report.command.map_or(false, |c| c.intercept);
            hardware.integrate(acceleration.unwrap_or(Vec3::zeros()), dt);
            let within_radius = hardware
                .nearest_target_m()
                .map_or(false, |d| d <= config.intercept_radius_m);
            if guidance_intercept || within_radius {
                info!("intercept after cycle {}", report.cycle);
                intercept_cycle = Some(report.cycle);
                break;
            }
        }

        let channels = pipeline.diagnostics().context("computing channel diagnostics")?;
        sink.append(TelemetryRecord::Diagnostic {
            cycle: cycles.last().map_or(0, |c| c.cycle),
            channels: Cow::Borrowed(&channels),
        })
        .context("recording channel diagnostics")?;
        sink.flush().context("flushing telemetry")?;

        Ok(WorkflowResult {
            scenario: scenario.name.clone(),
            cycles,
            calibrated,
            intercepted: intercept_cycle.is_some(),
            intercept_cycle,
            final_distance_m: hardware.nearest_target_m(),
            channels,
            metrics: pipeline.metrics().snapshot(),
        })
    }

    fn open_sink(&self) -> anyhow::Result<Box<dyn RecordSink>> {
        match &self.config.telemetry_path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating telemetry file {}", path.display()))?;
                Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
            }
            None => Ok(Box::new(LogSink::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(40, 20.0);
        cfg.system.sonar.max_range_cm = 300.0;
        cfg.system.search.azimuth_steps = 6;
        cfg.system.search.elevation_steps = 4;
        cfg
    }

    #[test]
    fn runner_closes_on_boresight_target() {
        let cfg = quick_config();
        let result = Runner::new(cfg).execute().unwrap();

        assert!(result.calibrated);
        assert!(result.intercepted);
        let first = &result.cycles[0];
        let range = first.range_cm.expect("first cycle should detect");
        assert!((range - first.truth_range_cm.unwrap()).abs() < 3.0);
        assert!(first.azimuth_deg.unwrap().abs() < 1e-3);
        assert!(first.elevation_deg.unwrap().abs() < 1e-3);
        assert!(result.final_distance_m.unwrap() <= 0.1);
        assert_eq!(result.metrics.cycles as usize, result.cycles.len());
        assert_eq!(result.channels.len(), 4);
    }

    #[test]
    fn empty_scene_yields_only_misses() {
        let mut cfg = quick_config();
        cfg.cycles = 3;
        let scenario = ScenarioConfig {
            targets: Vec::new(),
            ..cfg.scenario.clone()
        };
        let result = Runner::new(cfg).execute_scenario(&scenario).unwrap();
        assert_eq!(result.cycles.len(), 3);
        assert_eq!(result.detection_count(), 0);
        assert!(!result.intercepted);
        assert!(result.final_distance_m.is_none());
        assert!(result.cycles.iter().all(|c| c.thrust.is_none()));
    }

    #[test]
    fn telemetry_export_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let mut cfg = quick_config();
        cfg.cycles = 2;
        cfg.telemetry_path = Some(path.clone());
        Runner::new(cfg).execute().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().count() >= 3);
        assert!(text.lines().any(|l| l.contains("\"kind\":\"diagnostic\"")));
    }
}
