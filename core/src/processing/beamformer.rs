use ndarray::ArrayView2;

use crate::config::MicArrayGeometry;
use crate::interface::SteeringDirection;
use crate::math::{unit_direction, Vec3};
use crate::prelude::{SonarError, SonarResult};

/// Delay-and-sum beamformer over a fixed microphone array.
///
/// Shifted samples falling outside the buffer contribute zero, so echoes
/// within the largest inter-channel delay of either buffer edge lose gain.
pub struct Beamformer {
    positions: Vec<Vec3>,
    reference: usize,
    sample_rate: f32,
    timing_offsets_s: Vec<f32>,
    shifts: Vec<isize>,
}

impl Beamformer {
    pub fn new(geometry: &MicArrayGeometry, sample_rate: f32) -> Self {
        let channels = geometry.channels();
        Self {
            positions: geometry.positions.clone(),
            reference: geometry.reference_channel,
            sample_rate,
            timing_offsets_s: vec![0.0; channels],
            shifts: vec![0; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.positions.len()
    }

    /// Per-channel hardware latency (seconds) removed from every steering delay.
    pub fn set_timing_offsets<I>(&mut self, offsets: I) -> SonarResult<()>
    where
        I: IntoIterator<Item = f32>,
    {
        let offsets: Vec<f32> = offsets.into_iter().collect();
        if offsets.len() != self.channels() {
            return Err(SonarError::InvalidArgument(format!(
                "{} timing offsets for {} channels",
                offsets.len(),
                self.channels()
            )));
        }
        self.timing_offsets_s = offsets;
        Ok(())
    }

    /// Integer sample shift per channel for `direction`, reference channel at zero.
    pub fn sample_shifts(&mut self, direction: SteeringDirection, speed_of_sound: f32) -> &[isize] {
        let steering = unit_direction(direction.azimuth_rad, direction.elevation_rad);
        let delay = |channel: usize| {
            self.positions[channel].dot(&steering) / speed_of_sound - self.timing_offsets_s[channel]
        };
        let reference_delay = delay(self.reference);
        for channel in 0..self.positions.len() {
            let tau = delay(channel) - reference_delay;
            self.shifts[channel] = (tau * self.sample_rate).round() as isize;
        }
        &self.shifts
    }

    /// Steers `channels` toward `direction` and writes the averaged sum.
    pub fn delay_and_sum(
        &mut self,
        channels: ArrayView2<f32>,
        speed_of_sound: f32,
        direction: SteeringDirection,
        output: &mut [f32],
    ) -> SonarResult<()> {
        let (count, len) = channels.dim();
        if count != self.channels() || len == 0 {
            return Err(SonarError::InvalidArgument(format!(
                "expected {} non-empty channels, got shape {:?}",
                self.channels(),
                channels.dim()
            )));
        }
        if output.len() != len {
            return Err(SonarError::InvalidArgument(format!(
                "beam output holds {} samples, channels have {}",
                output.len(),
                len
            )));
        }
        if speed_of_sound <= 0.0 {
            return Err(SonarError::InvalidArgument(
                "speed of sound must be positive".into(),
            ));
        }

        self.sample_shifts(direction, speed_of_sound);
        output.fill(0.0);

        let len_i = len as isize;
        for (row, &shift) in channels.outer_iter().zip(&self.shifts) {
            let samples = row.as_slice().ok_or_else(|| {
                SonarError::InvalidArgument("channel rows must be contiguous".into())
            })?;
            // out[j] += samples[j - shift] for every j with an in-range source.
            let start = shift.clamp(0, len_i) as usize;
            let end = (len_i + shift).clamp(0, len_i) as usize;
            if start >= end {
                continue;
            }
            let src_start = (start as isize - shift) as usize;
            for (out, &sample) in output[start..end]
                .iter_mut()
                .zip(&samples[src_start..src_start + (end - start)])
            {
                *out += sample;
            }
        }

        let scale = 1.0 / count as f32;
        output.iter_mut().for_each(|v| *v *= scale);
        Ok(())
    }
}
