use anyhow::Context;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sonarcore::config::SystemConfig;
use sonarcore::math::Vec3;
use sonarcore::processing::calibration::speed_of_sound;
use sonarcore::processing::ChirpGenerator;

/// A stationary reflector in world coordinates (metres).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimTarget {
    pub position: Vec3,
    #[serde(default = "unit_reflectivity")]
    pub reflectivity: f32,
}

fn unit_reflectivity() -> f32 {
    1.0
}

/// Echo scene and sensor imperfections for one simulated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub targets: Vec<SimTarget>,
    /// Received amplitude of a unit reflector at 1 m; falls off with range squared.
    pub echo_amplitude: f32,
    pub noise_std: f32,
    /// Per-channel gain drawn uniformly from `1 ± gain_error`.
    pub gain_error: f32,
    /// Per-channel DC offset drawn uniformly from `± dc_error`.
    pub dc_error: f32,
    pub reference_amplitude: f32,
    pub temperature_c: f32,
    pub seed: u64,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            targets: vec![SimTarget {
                position: Vec3::new(2.0, 0.0, 0.0),
                reflectivity: 1.0,
            }],
            echo_amplitude: 2000.0,
            noise_std: 2.0,
            gain_error: 0.1,
            dc_error: 5.0,
            reference_amplitude: 500.0,
            temperature_c: 20.0,
            seed: 0,
            name: None,
            description: None,
        }
    }
}

/// Renders microphone captures for targets around the array.
///
/// Range delay is the exact two-way path to the reference microphone;
/// inter-channel delays use the far-field approximation rounded to whole
/// samples.
pub struct EchoSynthesizer {
    chirp: Vec<f32>,
    positions: Vec<Vec3>,
    reference: usize,
    sample_rate: f32,
    speed_of_sound: f32,
    gain: Vec<f32>,
    dc: Vec<f32>,
    noise: Normal<f32>,
    scenario: ScenarioConfig,
    rng: StdRng,
}

impl EchoSynthesizer {
    pub fn new(system: &SystemConfig, scenario: &ScenarioConfig) -> anyhow::Result<Self> {
        let sonar = &system.sonar;
        let waveform = ChirpGenerator::generate(
            sonar.chirp_samples(),
            sonar.sample_rate(),
            sonar.chirp_f0_hz,
            sonar.chirp_f1_hz,
        )
        .context("generating simulator chirp")?;

        let noise = Normal::new(0.0, scenario.noise_std)
            .with_context(|| format!("invalid noise std {}", scenario.noise_std))?;
        let mut rng = StdRng::seed_from_u64(scenario.seed);
        let channels = system.array.channels();
        let gain = (0..channels)
            .map(|_| 1.0 + rng.gen_range(-1.0f32..=1.0) * scenario.gain_error)
            .collect();
        let dc = (0..channels)
            .map(|_| rng.gen_range(-1.0f32..=1.0) * scenario.dc_error)
            .collect();

        Ok(Self {
            chirp: waveform.samples().to_vec(),
            positions: system.array.positions.clone(),
            reference: system.array.reference_channel,
            sample_rate: sonar.sample_rate(),
            speed_of_sound: speed_of_sound(scenario.temperature_c),
            gain,
            dc,
            noise,
            scenario: scenario.clone(),
            rng,
        })
    }

    pub fn channel_gains(&self) -> &[f32] {
        &self.gain
    }

    /// Fills `capture` with echoes from targets at `relative` positions
    /// (sonar at the origin), plus channel errors and noise.
    pub fn synthesize(&mut self, relative: &[(Vec3, f32)], capture: &mut Array2<f32>) {
        capture.fill(0.0);
        let origin = self.positions[self.reference];
        for &(target, reflectivity) in relative {
            let range = target.norm();
            if range <= f32::EPSILON {
                continue;
            }
            let direction = target * (1.0 / range);
            let two_way = range + (target - origin).norm();
            let arrival = (two_way / self.speed_of_sound * self.sample_rate).round() as isize;
            let amplitude = self.scenario.echo_amplitude * reflectivity / (range * range);

            for (channel, mut row) in capture.outer_iter_mut().enumerate() {
                let lead = (self.positions[channel] - origin).dot(&direction) / self.speed_of_sound
                    * self.sample_rate;
                let start = arrival - lead.round() as isize;
                add_pulse(row.as_slice_mut(), &self.chirp, start, amplitude);
            }
        }
        self.apply_channel_errors(capture);
    }

    /// A common reference pulse reaching every microphone at the same sample.
    pub fn reference_capture(&mut self, capture: &mut Array2<f32>, start: usize) {
        capture.fill(0.0);
        let amplitude = self.scenario.reference_amplitude;
        for mut row in capture.outer_iter_mut() {
            add_pulse(row.as_slice_mut(), &self.chirp, start as isize, amplitude);
        }
        self.apply_channel_errors(capture);
    }

    fn apply_channel_errors(&mut self, capture: &mut Array2<f32>) {
        for (channel, mut row) in capture.outer_iter_mut().enumerate() {
            let (gain, dc) = (self.gain[channel], self.dc[channel]);
            for sample in row.iter_mut() {
                *sample = *sample * gain + dc + self.noise.sample(&mut self.rng);
            }
        }
    }
}

fn add_pulse(row: Option<&mut [f32]>, pulse: &[f32], start: isize, amplitude: f32) {
    let Some(row) = row else {
        return;
    };
    for (i, &value) in pulse.iter().enumerate() {
        let index = start + i as isize;
        if index >= 0 && (index as usize) < row.len() {
            row[index as usize] += amplitude * value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonarcore::math::StatsHelper;

    fn quiet() -> ScenarioConfig {
        ScenarioConfig {
            noise_std: 0.0,
            gain_error: 0.0,
            dc_error: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn echo_lands_at_two_way_delay() {
        let system = SystemConfig::default();
        let mut synth = EchoSynthesizer::new(&system, &quiet()).unwrap();
        let mut capture = Array2::zeros((4, system.samples_per_channel()));
        let target = Vec3::new(1.0, 0.0, 0.0);
        synth.synthesize(&[(target, 1.0)], &mut capture);

        let origin = system.array.positions[0];
        let two_way = 1.0 + (target - origin).norm();
        let expected = (two_way / speed_of_sound(20.0) * 200_000.0).round() as usize;
        let row = capture.row(0).to_vec();
        let first = row.iter().position(|v| v.abs() > 0.0).unwrap();
        assert!(first >= expected && first < expected + 5);
        assert!(StatsHelper::peak_abs(&row).unwrap().1 <= 2000.0);
    }

    #[test]
    fn reference_capture_is_common_to_all_channels() {
        let system = SystemConfig::default();
        let mut synth = EchoSynthesizer::new(&system, &quiet()).unwrap();
        let mut capture = Array2::zeros((4, 1000));
        synth.reference_capture(&mut capture, 100);
        assert_eq!(capture.row(0), capture.row(3));
        assert_eq!(capture[[0, 99]], 0.0);
    }

    #[test]
    fn seeded_channel_errors_are_reproducible() {
        let system = SystemConfig::default();
        let scenario = ScenarioConfig {
            seed: 42,
            ..Default::default()
        };
        let a = EchoSynthesizer::new(&system, &scenario).unwrap();
        let b = EchoSynthesizer::new(&system, &scenario).unwrap();
        assert_eq!(a.channel_gains(), b.channel_gains());
        assert!(a.channel_gains().iter().all(|g| (0.9..=1.1).contains(g)));
    }

    #[test]
    fn noise_matches_configured_deviation() {
        let system = SystemConfig::default();
        let scenario = ScenarioConfig {
            noise_std: 4.0,
            gain_error: 0.0,
            dc_error: 0.0,
            seed: 3,
            ..Default::default()
        };
        let mut synth = EchoSynthesizer::new(&system, &scenario).unwrap();
        let mut capture = Array2::zeros((4, 5000));
        synth.synthesize(&[], &mut capture);
        let row = capture.row(1).to_vec();
        assert!(StatsHelper::mean(&row).abs() < 0.3);
        assert!((StatsHelper::std_dev(&row) - 4.0).abs() < 0.3);
    }

    #[test]
    fn rejects_negative_noise_deviation() {
        let scenario = ScenarioConfig {
            noise_std: -1.0,
            ..Default::default()
        };
        assert!(EchoSynthesizer::new(&SystemConfig::default(), &scenario).is_err());
    }
}
