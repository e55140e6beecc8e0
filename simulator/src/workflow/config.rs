use anyhow::Context;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use sonarcore::config::{CorrelationMethod, MicArrayGeometry, SystemConfig};
use sonarcore::interface::VehicleState;
use sonarcore::math::Vec3;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::AnalysisConfig;
use crate::generator::profile::ScenarioConfig;

/// Everything one simulated intercept run needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub system: SystemConfig,
    pub scenario: ScenarioConfig,
    /// Initial vehicle kinematics in world coordinates.
    pub vehicle: VehicleState,
    pub cycles: usize,
    pub cycle_rate_hz: f32,
    /// True distance at which the run counts as an intercept.
    pub intercept_radius_m: f32,
    pub calibrate: bool,
    /// 0 off, 1 error, 2 warn, 3 info, 4 debug.
    pub log_level: u8,
    /// JSON-lines telemetry export; records go to the log when absent.
    pub telemetry_path: Option<PathBuf>,
    pub analysis: AnalysisConfig,
}

/// Tetrahedral array with 5 cm arms; resolves both angles on the default grid.
pub fn tetra_array(arm_m: f32) -> MicArrayGeometry {
    MicArrayGeometry {
        positions: vec![
            Vec3::zeros(),
            Vec3::new(arm_m, 0.0, 0.0),
            Vec3::new(0.0, arm_m, 0.0),
            Vec3::new(0.0, 0.0, arm_m),
        ],
        reference_channel: 0,
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let mut system = SystemConfig::default();
        system.array = tetra_array(0.05);
        system.sonar.correlation = CorrelationMethod::Fft;
        system.detector.max_peaks = 200;

        Self {
            system,
            scenario: ScenarioConfig::default(),
            vehicle: VehicleState::new(Vec3::zeros(), Vec3::new(1.5, 0.0, 0.0)),
            cycles: 60,
            cycle_rate_hz: 20.0,
            intercept_radius_m: 0.1,
            calibrate: true,
            log_level: 2,
            telemetry_path: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(cycles: usize, temperature_c: f32) -> Self {
        let mut config = Self::default();
        config.apply_overrides(Some(cycles), Some(temperature_c));
        config
    }

    /// Command-line overrides; temperature applies to both the scene and
    /// the core's speed-of-sound model.
    pub fn apply_overrides(&mut self, cycles: Option<usize>, temperature_c: Option<f32>) {
        if let Some(cycles) = cycles {
            self.cycles = cycles;
        }
        if let Some(temperature) = temperature_c {
            self.scenario.temperature_c = temperature;
            self.system.calibration.temperature_c = temperature;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cycles > 0, "cycle count must be positive");
        anyhow::ensure!(self.cycle_rate_hz > 0.0, "cycle rate must be positive");
        anyhow::ensure!(
            self.intercept_radius_m >= 0.0,
            "intercept radius must be non-negative"
        );
        self.system.validate().context("core configuration")?;
        self.analysis.validate().context("analysis configuration")?;
        Ok(())
    }

    pub fn cycle_period_s(&self) -> f32 {
        1.0 / self.cycle_rate_hz
    }

    pub fn log_filter(&self) -> LevelFilter {
        match self.log_level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}
