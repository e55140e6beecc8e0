//! Validated configuration surface for the core.
//!
//! Defaults reproduce the flight firmware: 200 kHz sampling, a 1 ms
//! 38-42 kHz chirp, a 2x2 microphone square with 1 cm spacing and a
//! 20x20 angular grid.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::interface::SteeringDirection;
use crate::math::Vec3;
use crate::prelude::{SonarError, SonarResult};
use crate::processing::calibration::speed_of_sound;

/// Pulse-compression implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Direct,
    Fft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    pub sample_rate_hz: u32,
    pub chirp_duration_ms: f32,
    pub chirp_f0_hz: f32,
    pub chirp_f1_hz: f32,
    pub detection_threshold: f32,
    pub min_range_cm: f32,
    pub max_range_cm: f32,
    pub correlation: CorrelationMethod,
    pub latency_budget_ms: f32,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 200_000,
            chirp_duration_ms: 1.0,
            chirp_f0_hz: 38_000.0,
            chirp_f1_hz: 42_000.0,
            detection_threshold: 1000.0,
            min_range_cm: 10.0,
            max_range_cm: 500.0,
            correlation: CorrelationMethod::Direct,
            latency_budget_ms: 50.0,
        }
    }
}

impl SonarConfig {
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate_hz as f32
    }

    /// Matched-filter kernel length in samples.
    pub fn chirp_samples(&self) -> usize {
        (self.sample_rate() * self.chirp_duration_ms / 1000.0).round() as usize
    }

    /// Samples per channel whose last index reaches `max_range_cm` at the
    /// given speed of sound (m/s).
    pub fn samples_per_channel(&self, speed_of_sound: f32) -> usize {
        let last = self.sample_rate() * self.max_range_cm * 2.0 / (speed_of_sound * 100.0);
        last.ceil() as usize + 1
    }

    pub fn center_frequency_hz(&self) -> f32 {
        0.5 * (self.chirp_f0_hz + self.chirp_f1_hz)
    }
}

/// Uniform azimuth/elevation grid, bounds in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub azimuth_min_deg: f32,
    pub azimuth_max_deg: f32,
    pub azimuth_steps: usize,
    pub elevation_min_deg: f32,
    pub elevation_max_deg: f32,
    pub elevation_steps: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            azimuth_min_deg: -90.0,
            azimuth_max_deg: 90.0,
            azimuth_steps: 20,
            elevation_min_deg: -45.0,
            elevation_max_deg: 45.0,
            elevation_steps: 20,
        }
    }
}

impl SearchConfig {
    pub fn azimuth_step_rad(&self) -> f32 {
        (self.azimuth_max_deg - self.azimuth_min_deg).to_radians() / self.azimuth_steps as f32
    }

    pub fn elevation_step_rad(&self) -> f32 {
        (self.elevation_max_deg - self.elevation_min_deg).to_radians() / self.elevation_steps as f32
    }

    pub fn azimuth_at(&self, index: usize) -> f32 {
        self.azimuth_min_deg.to_radians() + index as f32 * self.azimuth_step_rad()
    }

    pub fn elevation_at(&self, index: usize) -> f32 {
        self.elevation_min_deg.to_radians() + index as f32 * self.elevation_step_rad()
    }

    pub fn grid_points(&self) -> usize {
        self.azimuth_steps * self.elevation_steps
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub enabled: bool,
    pub threshold_factor: f32,
    pub max_peaks: usize,
    pub max_clusters: usize,
    pub min_separation_cm: f32,
    /// Fixed look direction; the best-found search direction when absent.
    pub steering: Option<SteeringDirection>,
    /// Run a windowed angular search per cluster to fill its angles.
    pub resolve_angles: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_factor: 3.0,
            max_peaks: 10,
            max_clusters: 5,
            min_separation_cm: 20.0,
            steering: None,
            resolve_angles: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub navigation_constant: f32,
    pub max_acceleration: f32,
    pub min_intercept_range_cm: f32,
    pub hover_thrust: f32,
    pub mix_gain: f32,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            navigation_constant: 3.0,
            max_acceleration: 9.81,
            min_intercept_range_cm: 5.0,
            hover_thrust: 0.5,
            mix_gain: 0.25,
        }
    }
}

/// Fixed microphone positions in metres, one per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicArrayGeometry {
    pub positions: Vec<Vec3>,
    pub reference_channel: usize,
}

impl Default for MicArrayGeometry {
    fn default() -> Self {
        Self::square(0.01)
    }
}

impl MicArrayGeometry {
    /// 2x2 planar square in the x/y plane centred on the origin.
    pub fn square(spacing_m: f32) -> Self {
        let half = spacing_m / 2.0;
        Self {
            positions: vec![
                Vec3::new(-half, -half, 0.0),
                Vec3::new(half, -half, 0.0),
                Vec3::new(-half, half, 0.0),
                Vec3::new(half, half, 0.0),
            ],
            reference_channel: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.positions.len()
    }

    pub fn max_spacing(&self) -> f32 {
        let mut widest = 0.0f32;
        for (i, a) in self.positions.iter().enumerate() {
            for b in &self.positions[i + 1..] {
                widest = widest.max((*a - *b).norm());
            }
        }
        widest
    }

    fn is_collinear(&self) -> bool {
        let origin = self.positions[0];
        let axis = self
            .positions
            .iter()
            .map(|p| *p - origin)
            .find(|d| d.norm() > f32::EPSILON);
        match axis {
            None => true,
            Some(axis) => self
                .positions
                .iter()
                .all(|p| axis.cross(&(*p - origin)).norm() <= 1e-9),
        }
    }

    pub fn validate(&self) -> SonarResult<()> {
        if self.positions.len() < 3 {
            return Err(SonarError::InvalidConfig(format!(
                "need at least 3 microphones, got {}",
                self.positions.len()
            )));
        }
        if self.reference_channel >= self.positions.len() {
            return Err(SonarError::InvalidConfig(format!(
                "reference channel {} out of range",
                self.reference_channel
            )));
        }
        if self.is_collinear() {
            return Err(SonarError::InvalidConfig(
                "microphone positions are collinear".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub temperature_c: f32,
    pub noise_window_fraction: f32,
    pub max_alignment_lag_samples: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            noise_window_fraction: 0.1,
            max_alignment_lag_samples: 16,
        }
    }
}

/// Complete configuration accepted by [`crate::SonarPipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub sonar: SonarConfig,
    pub search: SearchConfig,
    pub detector: DetectorConfig,
    pub guidance: GuidanceConfig,
    pub array: MicArrayGeometry,
    pub calibration: CalibrationSettings,
    pub memory_budget_samples: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sonar: SonarConfig::default(),
            search: SearchConfig::default(),
            detector: DetectorConfig::default(),
            guidance: GuidanceConfig::default(),
            array: MicArrayGeometry::default(),
            calibration: CalibrationSettings::default(),
            memory_budget_samples: 1 << 20,
        }
    }
}

fn reject(message: impl Into<String>) -> SonarResult<()> {
    Err(SonarError::InvalidConfig(message.into()))
}

impl SystemConfig {
    /// Speed of sound in m/s at the configured ambient temperature.
    pub fn speed_of_sound(&self) -> f32 {
        speed_of_sound(self.calibration.temperature_c)
    }

    /// Acquisition length per channel at the configured temperature.
    pub fn samples_per_channel(&self) -> usize {
        self.sonar.samples_per_channel(self.speed_of_sound())
    }

    pub fn validate(&self) -> SonarResult<()> {
        let sonar = &self.sonar;
        if !(100_000..=500_000).contains(&sonar.sample_rate_hz) {
            return reject(format!(
                "sample rate {} Hz outside [100000, 500000]",
                sonar.sample_rate_hz
            ));
        }
        if !(sonar.chirp_duration_ms > 0.0 && sonar.chirp_duration_ms <= 10.0) {
            return reject(format!(
                "chirp duration {} ms outside (0, 10]",
                sonar.chirp_duration_ms
            ));
        }
        if !(sonar.chirp_f0_hz > 0.0 && sonar.chirp_f0_hz < sonar.chirp_f1_hz) {
            return reject("chirp start frequency must be below end frequency");
        }
        if !(sonar.min_range_cm >= 0.0 && sonar.min_range_cm < sonar.max_range_cm)
            || !sonar.max_range_cm.is_finite()
        {
            return reject("min range must be below max range");
        }
        if !(sonar.detection_threshold > 0.0) {
            return reject("detection threshold must be positive");
        }
        if !(sonar.latency_budget_ms > 0.0 && sonar.latency_budget_ms.is_finite()) {
            return reject("latency budget must be positive");
        }
        if sonar.chirp_samples() < 2 {
            return reject("chirp shorter than two samples");
        }

        let guidance = &self.guidance;
        if !(1.0..=10.0).contains(&guidance.navigation_constant) {
            return reject(format!(
                "navigation constant {} outside [1, 10]",
                guidance.navigation_constant
            ));
        }
        if !(guidance.max_acceleration > 0.0) {
            return reject("max acceleration must be positive");
        }

        let search = &self.search;
        if search.azimuth_steps == 0 || search.elevation_steps == 0 {
            return reject("search grid needs at least one step per axis");
        }
        if !(search.azimuth_min_deg < search.azimuth_max_deg
            && search.elevation_min_deg < search.elevation_max_deg)
        {
            return reject("search bounds must be ordered min < max");
        }
        if search.elevation_min_deg < -90.0 || search.elevation_max_deg > 90.0 {
            return reject("elevation bounds must stay inside [-90, 90] degrees");
        }

        let detector = &self.detector;
        if detector.max_peaks == 0 || detector.max_clusters == 0 {
            return reject("detector caps must be positive");
        }
        if !(detector.threshold_factor >= 0.0 && detector.min_separation_cm > 0.0) {
            return reject("detector threshold factor and separation must be non-negative");
        }

        let calibration = &self.calibration;
        if !(calibration.noise_window_fraction > 0.0 && calibration.noise_window_fraction <= 1.0) {
            return reject("noise window fraction outside (0, 1]");
        }
        let speed = self.speed_of_sound();
        if !(speed.is_finite() && speed > 0.0) {
            return reject(format!(
                "temperature {} C yields speed of sound {} m/s",
                calibration.temperature_c, speed
            ));
        }

        self.array.validate()?;
        self.warn_on_spatial_aliasing();
        Ok(())
    }

    fn warn_on_spatial_aliasing(&self) {
        let shortest_wavelength = self.speed_of_sound() / self.sonar.chirp_f1_hz;
        let spacing = self.array.max_spacing();
        if spacing > shortest_wavelength / 2.0 {
            warn!(
                "array spacing {:.4} m exceeds half wavelength {:.4} m; grating lobes possible",
                spacing,
                shortest_wavelength / 2.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::round_trip_range_cm;

    #[test]
    fn defaults_are_valid() {
        let config = SystemConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sonar.chirp_samples(), 200);
        assert_eq!(config.samples_per_channel(), 5825);
    }

    #[test]
    fn cold_air_lengthens_acquisition_to_keep_max_range() {
        let mut config = SystemConfig::default();
        config.calibration.temperature_c = -20.0;
        config.validate().unwrap();
        let samples = config.samples_per_channel();
        assert!(samples > SystemConfig::default().samples_per_channel());
        let last_range = round_trip_range_cm(
            samples - 1,
            config.sonar.sample_rate(),
            config.speed_of_sound(),
        );
        assert!(last_range >= config.sonar.max_range_cm);
    }

    #[test]
    fn rejects_temperatures_without_positive_speed_of_sound() {
        let mut config = SystemConfig::default();
        config.calibration.temperature_c = -600.0;
        assert!(matches!(config.validate(), Err(SonarError::InvalidConfig(_))));
        config.calibration.temperature_c = f32::NAN;
        assert!(config.validate().is_err());
        config.calibration.temperature_c = f32::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_frequencies_and_ranges() {
        let mut config = SystemConfig::default();
        config.sonar.chirp_f0_hz = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.sonar.chirp_f1_hz = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.sonar.min_range_cm = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.sonar.max_range_cm = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.search.azimuth_max_deg = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_sample_rate_outside_band() {
        let mut config = SystemConfig::default();
        config.sonar.sample_rate_hz = 50_000;
        assert!(matches!(config.validate(), Err(SonarError::InvalidConfig(_))));
        config.sonar.sample_rate_hz = 600_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_frequencies_and_ranges() {
        let mut config = SystemConfig::default();
        config.sonar.chirp_f0_hz = 42_000.0;
        config.sonar.chirp_f1_hz = 38_000.0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.sonar.min_range_cm = 600.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_guidance_out_of_bounds() {
        let mut config = SystemConfig::default();
        config.guidance.navigation_constant = 0.5;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.guidance.max_acceleration = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_collinear_array() {
        let mut config = SystemConfig::default();
        config.array.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.01, 0.0, 0.0),
            Vec3::new(0.02, 0.0, 0.0),
        ];
        assert!(config.validate().is_err());

        config.array.positions.truncate(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn search_grid_excludes_upper_bound() {
        let search = SearchConfig::default();
        assert!((search.azimuth_at(0) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        let last = search.azimuth_at(search.azimuth_steps - 1);
        assert!((last - 81.0f32.to_radians()).abs() < 1e-5);
    }
}
