use ndarray::ArrayView2;
use std::ops::Range;

use crate::config::{SearchConfig, SonarConfig};
use crate::interface::{SteeringDirection, TargetEstimate};
use crate::math::StatsHelper;
use crate::prelude::{Detection, MissReason, SonarError, SonarResult};
use crate::processing::beamformer::Beamformer;
use crate::processing::round_trip_range_cm;

/// Strongest beamformed sample found over the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamPeak {
    pub direction: SteeringDirection,
    pub value: f32,
    pub index: usize,
}

/// Exhaustive azimuth/elevation scan for the single dominant echo.
///
/// Cost is `azimuth_steps * elevation_steps * channels * samples`, which
/// dominates the cycle; size the grid against the latency budget.
pub struct AngularSearch {
    grid: SearchConfig,
    beamformer: Beamformer,
    beam: Vec<f32>,
}

impl AngularSearch {
    pub fn new(grid: SearchConfig, beamformer: Beamformer, beam: Vec<f32>) -> Self {
        Self {
            grid,
            beamformer,
            beam,
        }
    }

    pub fn grid(&self) -> &SearchConfig {
        &self.grid
    }

    pub fn beamformer_mut(&mut self) -> &mut Beamformer {
        &mut self.beamformer
    }

    /// Most recent beamformed signal.
    pub fn beam(&self) -> &[f32] {
        &self.beam
    }

    /// Beamforms toward one direction and returns the combined signal.
    pub fn steer(
        &mut self,
        channels: ArrayView2<f32>,
        speed_of_sound: f32,
        direction: SteeringDirection,
    ) -> SonarResult<&[f32]> {
        let len = self.checked_len(channels)?;
        self.beamformer
            .delay_and_sum(channels, speed_of_sound, direction, &mut self.beam[..len])?;
        Ok(&self.beam[..len])
    }

    /// Grid scan keeping the largest `|sample|` within `window`.
    ///
    /// Ties keep the first grid point visited (azimuth-major order).
    pub fn scan(
        &mut self,
        channels: ArrayView2<f32>,
        speed_of_sound: f32,
        window: Range<usize>,
    ) -> SonarResult<BeamPeak> {
        let len = self.checked_len(channels)?;
        if window.start >= window.end || window.end > len {
            return Err(SonarError::InvalidArgument(format!(
                "scan window {:?} outside 0..{}",
                window, len
            )));
        }

        let mut best: Option<BeamPeak> = None;
        for az_idx in 0..self.grid.azimuth_steps {
            let azimuth = self.grid.azimuth_at(az_idx);
            for el_idx in 0..self.grid.elevation_steps {
                let direction = SteeringDirection::new(azimuth, self.grid.elevation_at(el_idx));
                self.beamformer.delay_and_sum(
                    channels,
                    speed_of_sound,
                    direction,
                    &mut self.beam[..len],
                )?;
                let Some((offset, value)) = StatsHelper::peak_abs(&self.beam[window.clone()])
                else {
                    continue;
                };
                if best.map_or(true, |peak| value > peak.value) {
                    best = Some(BeamPeak {
                        direction,
                        value,
                        index: window.start + offset,
                    });
                }
            }
        }

        best.ok_or_else(|| SonarError::InvalidArgument("empty search grid".into()))
    }

    /// Full-buffer scan followed by threshold and range gating.
    pub fn detect(
        &mut self,
        channels: ArrayView2<f32>,
        speed_of_sound: f32,
        sonar: &SonarConfig,
    ) -> SonarResult<(Detection, BeamPeak)> {
        let len = self.checked_len(channels)?;
        let peak = self.scan(channels, speed_of_sound, 0..len)?;
        Ok((classify(&peak, speed_of_sound, sonar), peak))
    }

    fn checked_len(&self, channels: ArrayView2<f32>) -> SonarResult<usize> {
        let len = channels.ncols();
        if len == 0 {
            return Err(SonarError::InvalidArgument("no samples to search".into()));
        }
        if len > self.beam.len() {
            return Err(SonarError::InvalidArgument(format!(
                "{} samples exceed beam capacity {}",
                len,
                self.beam.len()
            )));
        }
        Ok(len)
    }
}

/// Threshold, range-gate and score a grid peak.
pub fn classify(peak: &BeamPeak, speed_of_sound: f32, sonar: &SonarConfig) -> Detection {
    if !(peak.value >= sonar.detection_threshold) {
        return Detection::Missed(MissReason::BelowThreshold { peak: peak.value });
    }
    let range_cm = round_trip_range_cm(peak.index, sonar.sample_rate(), speed_of_sound);
    if !(range_cm >= sonar.min_range_cm && range_cm <= sonar.max_range_cm) {
        return Detection::Missed(MissReason::OutOfRange { range_cm });
    }
    let confidence = (peak.value / (sonar.detection_threshold * 10.0)).min(1.0);
    Detection::Found(TargetEstimate::new(range_cm, peak.direction, confidence))
}
