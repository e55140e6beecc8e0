use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::prelude::{SonarError, SonarResult};

/// Immutable transmit waveform, synthesized once at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: f32,
    f0_hz: f32,
    f1_hz: f32,
}

impl Waveform {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn start_frequency(&self) -> f32 {
        self.f0_hz
    }

    pub fn end_frequency(&self) -> f32 {
        self.f1_hz
    }

    pub fn duration_s(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate
    }

    /// Matched-filter kernel: the waveform reversed in time.
    pub fn kernel(&self) -> Vec<f32> {
        self.samples.iter().rev().copied().collect()
    }

    /// Unwrapped phase in radians at sample `index`.
    pub fn instantaneous_phase(&self, index: usize) -> f64 {
        chirp_phase(
            index,
            self.sample_rate as f64,
            self.f0_hz as f64,
            self.chirp_rate(),
        )
    }

    fn chirp_rate(&self) -> f64 {
        (self.f1_hz as f64 - self.f0_hz as f64) / self.duration_s() as f64
    }
}

fn chirp_phase(index: usize, sample_rate: f64, f0: f64, rate: f64) -> f64 {
    let t = index as f64 / sample_rate;
    2.0 * PI * (f0 * t + 0.5 * rate * t * t)
}

/// Synthesizes Hann-tapered linear FM chirps.
pub struct ChirpGenerator;

impl ChirpGenerator {
    pub fn generate(length: usize, sample_rate: f32, f0: f32, f1: f32) -> SonarResult<Waveform> {
        if length < 2 {
            return Err(SonarError::InvalidArgument(format!(
                "chirp length {} below 2 samples",
                length
            )));
        }
        if f1 <= f0 {
            return Err(SonarError::InvalidArgument(format!(
                "chirp end frequency {} must exceed start {}",
                f1, f0
            )));
        }
        if sample_rate <= 0.0 {
            return Err(SonarError::InvalidArgument("sample rate must be positive".into()));
        }

        let fs = sample_rate as f64;
        let duration = length as f64 / fs;
        let rate = (f1 as f64 - f0 as f64) / duration;
        let taper_span = (length - 1) as f64;

        let samples = (0..length)
            .map(|i| {
                let phase = chirp_phase(i, fs, f0 as f64, rate);
                let window = 0.5 * (1.0 - (2.0 * PI * i as f64 / taper_span).cos());
                (phase.cos() * window) as f32
            })
            .collect();

        Ok(Waveform {
            samples,
            sample_rate,
            f0_hz: f0,
            f1_hz: f1,
        })
    }
}
