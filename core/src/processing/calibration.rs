use ndarray::{ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::interface::ChannelDiagnostics;
use crate::math::StatsHelper;
use crate::prelude::{SonarError, SonarResult};

const SPEED_OF_SOUND_BASE: f32 = 331.3;
const SPEED_OF_SOUND_PER_DEG_C: f32 = 0.606;

/// Speed of sound in m/s for an ambient temperature in Celsius.
pub fn speed_of_sound(temperature_c: f32) -> f32 {
    SPEED_OF_SOUND_BASE + SPEED_OF_SOUND_PER_DEG_C * temperature_c
}

/// Per-channel corrections plus the temperature-derived speed of sound.
///
/// Mutated only by an explicit calibration pass; read-only during cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub gain: Vec<f32>,
    pub dc_offset: Vec<f32>,
    /// Radians at the chirp centre frequency, relative to the reference channel.
    pub phase_offset: Vec<f32>,
    pub temperature_c: f32,
    pub speed_of_sound: f32,
    pub calibrated: bool,
}

impl CalibrationProfile {
    pub fn new(channels: usize, temperature_c: f32) -> Self {
        Self {
            gain: vec![1.0; channels],
            dc_offset: vec![0.0; channels],
            phase_offset: vec![0.0; channels],
            temperature_c,
            speed_of_sound: speed_of_sound(temperature_c),
            calibrated: false,
        }
    }

    pub fn channels(&self) -> usize {
        self.gain.len()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn set_temperature(&mut self, temperature_c: f32) -> SonarResult<()> {
        let speed = speed_of_sound(temperature_c);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(SonarError::InvalidArgument(format!(
                "temperature {} C yields no positive speed of sound",
                temperature_c
            )));
        }
        self.temperature_c = temperature_c;
        self.speed_of_sound = speed;
        Ok(())
    }

    /// Per-channel timing correction in seconds derived from the phase offsets.
    pub fn timing_offsets_s(&self, carrier_hz: f32) -> impl Iterator<Item = f32> + '_ {
        self.phase_offset
            .iter()
            .map(move |&phase| phase / (2.0 * PI * carrier_hz))
    }

    fn validate(&self) -> SonarResult<()> {
        let channels = self.channels();
        if self.dc_offset.len() != channels || self.phase_offset.len() != channels {
            return Err(SonarError::Calibration(
                "profile vectors disagree on channel count".into(),
            ));
        }
        if let Some(bad) = self.gain.iter().position(|g| !(g.is_finite() && *g > 0.0)) {
            return Err(SonarError::Calibration(format!(
                "channel {} gain {} is not strictly positive",
                bad, self.gain[bad]
            )));
        }
        Ok(())
    }
}

pub struct Calibrator;

impl Calibrator {
    /// `calibrated = (raw - dc) * gain` per channel; a copy when uncalibrated.
    pub fn apply(
        raw: ArrayView2<f32>,
        profile: &CalibrationProfile,
        mut calibrated: ArrayViewMut2<f32>,
    ) -> SonarResult<()> {
        if raw.is_empty() {
            return Err(SonarError::InvalidArgument("no samples to calibrate".into()));
        }
        if raw.dim() != calibrated.dim() {
            return Err(SonarError::InvalidArgument(format!(
                "calibration shapes differ: {:?} vs {:?}",
                raw.dim(),
                calibrated.dim()
            )));
        }
        if profile.channels() != raw.nrows() {
            return Err(SonarError::InvalidArgument(format!(
                "profile covers {} channels, buffers have {}",
                profile.channels(),
                raw.nrows()
            )));
        }

        if !profile.calibrated {
            calibrated.assign(&raw);
            return Ok(());
        }

        for (channel, (input, mut output)) in raw
            .outer_iter()
            .zip(calibrated.outer_iter_mut())
            .enumerate()
        {
            let gain = profile.gain[channel];
            let dc = profile.dc_offset[channel];
            output.zip_mut_with(&input, |out, &sample| *out = (sample - dc) * gain);
        }
        Ok(())
    }

    /// Per-channel power, noise floor over the leading `noise_fraction` of
    /// samples and their ratio in dB.
    pub fn diagnostics(
        signals: ArrayView2<f32>,
        noise_fraction: f32,
    ) -> SonarResult<Vec<ChannelDiagnostics>> {
        if signals.is_empty() {
            return Err(SonarError::Calibration("no samples for diagnostics".into()));
        }
        let noise_samples = (signals.ncols() as f32 * noise_fraction) as usize;

        signals
            .outer_iter()
            .enumerate()
            .map(|(channel, row)| {
                let samples = row.to_vec();
                let rms = StatsHelper::rms(&samples);
                let signal_power = rms * rms;
                let noise_floor = if noise_samples > 0 {
                    let noise_rms = StatsHelper::rms(&samples[..noise_samples]);
                    noise_rms * noise_rms
                } else {
                    signal_power
                };
                let snr_db = if noise_floor > 0.0 {
                    10.0 * (signal_power / noise_floor).log10()
                } else {
                    0.0
                };
                Ok(ChannelDiagnostics {
                    channel,
                    signal_power,
                    noise_floor,
                    snr_db,
                })
            })
            .collect()
    }

    /// Derives DC, gain and timing corrections from a capture of a common
    /// reference signal on every channel.
    ///
    /// Gains equalize each channel to the reference channel's RMS; timing is
    /// the lag within `max_lag` that best aligns each channel to the reference.
    pub fn calibrate(
        profile: &mut CalibrationProfile,
        capture: ArrayView2<f32>,
        reference_channel: usize,
        sample_rate: f32,
        carrier_hz: f32,
        max_lag: usize,
    ) -> SonarResult<()> {
        if capture.ncols() == 0 || capture.nrows() != profile.channels() {
            return Err(SonarError::Calibration(format!(
                "reference capture shape {:?} does not match {} channels",
                capture.dim(),
                profile.channels()
            )));
        }
        if reference_channel >= capture.nrows() {
            return Err(SonarError::Calibration(format!(
                "reference channel {} out of range",
                reference_channel
            )));
        }

        let dc_offset: Vec<f32> = capture
            .mean_axis(Axis(1))
            .map(|means| means.to_vec())
            .ok_or_else(|| SonarError::Calibration("empty reference capture".into()))?;
        let centred: Vec<Vec<f32>> = capture
            .outer_iter()
            .zip(&dc_offset)
            .map(|(row, &dc)| row.iter().map(|&v| v - dc).collect())
            .collect();

        let reference_rms = StatsHelper::rms(&centred[reference_channel]);
        if reference_rms <= 0.0 {
            return Err(SonarError::Calibration(
                "reference channel carries no energy".into(),
            ));
        }

        let mut gain = Vec::with_capacity(centred.len());
        let mut phase_offset = Vec::with_capacity(centred.len());
        for (channel, samples) in centred.iter().enumerate() {
            let rms = StatsHelper::rms(samples);
            if rms <= 0.0 {
                return Err(SonarError::Calibration(format!(
                    "channel {} carries no energy",
                    channel
                )));
            }
            gain.push(reference_rms / rms);
            let lag = best_alignment_lag(&centred[reference_channel], samples, max_lag);
            phase_offset.push(2.0 * PI * carrier_hz * lag as f32 / sample_rate);
        }

        let candidate = CalibrationProfile {
            gain,
            dc_offset,
            phase_offset,
            temperature_c: profile.temperature_c,
            speed_of_sound: profile.speed_of_sound,
            calibrated: true,
        };
        candidate.validate()?;
        *profile = candidate;
        Ok(())
    }
}

/// Lag `d` maximizing `sum reference[n] * channel[n + d]`; positive when the
/// channel lags the reference.
fn best_alignment_lag(reference: &[f32], channel: &[f32], max_lag: usize) -> isize {
    let max_lag = max_lag.min(reference.len().saturating_sub(1)) as isize;
    let len = reference.len().min(channel.len()) as isize;
    let mut best_lag = 0isize;
    let mut best_score = f32::NEG_INFINITY;
    for lag in -max_lag..=max_lag {
        let mut score = 0.0f32;
        for n in 0..len {
            let m = n + lag;
            if m >= 0 && m < len {
                score += reference[n as usize] * channel[m as usize];
            }
        }
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    best_lag
}
