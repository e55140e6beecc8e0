use anyhow::Context;
use serde::{Deserialize, Serialize};
use sonarcore::interface::SteeringDirection;

use crate::analysis::performance::Shot;
use crate::workflow::config::WorkflowConfig;

/// Peak beamformed magnitude over an azimuth/elevation grid, one row per
/// elevation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeamPattern {
    pub azimuth_deg: Vec<f32>,
    pub elevation_deg: Vec<f32>,
    pub power: Vec<Vec<f32>>,
    pub peak_azimuth_deg: f32,
    pub peak_elevation_deg: f32,
}

/// `points` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f32, end: f32, points: usize) -> Vec<f32> {
    let step = (end - start) / (points.max(2) - 1) as f32;
    (0..points).map(|i| start + i as f32 * step).collect()
}

/// Angular response to one echo from the configured target, scanned over
/// the search bounds.
pub fn beam_pattern(config: &WorkflowConfig) -> anyhow::Result<BeamPattern> {
    let points = config.analysis.beam_points;
    anyhow::ensure!(points >= 2, "beam pattern needs at least two points per axis");

    let mut shot = Shot::new(config, &config.scenario)?;
    shot.fire()?;

    let search = &config.system.search;
    let azimuth_deg = linspace(search.azimuth_min_deg, search.azimuth_max_deg, points);
    let elevation_deg = linspace(search.elevation_min_deg, search.elevation_max_deg, points);

    let mut pattern = BeamPattern {
        azimuth_deg,
        elevation_deg,
        power: Vec::with_capacity(points),
        ..Default::default()
    };
    let mut strongest = f32::NEG_INFINITY;
    for &elevation in &pattern.elevation_deg {
        let mut row = Vec::with_capacity(points);
        for &azimuth in &pattern.azimuth_deg {
            let response = shot
                .pipeline
                .beam_response(SteeringDirection::from_degrees(azimuth, elevation))
                .with_context(|| format!("steering to az {} el {}", azimuth, elevation))?;
            if response > strongest {
                strongest = response;
                pattern.peak_azimuth_deg = azimuth;
                pattern.peak_elevation_deg = elevation;
            }
            row.push(response);
        }
        pattern.power.push(row);
    }
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::quick_config;

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(-90.0, 90.0, 7), vec![-90.0, -60.0, -30.0, 0.0, 30.0, 60.0, 90.0]);
    }

    #[test]
    fn pattern_peaks_at_the_target_direction() {
        let cfg = quick_config();
        let pattern = beam_pattern(&cfg).unwrap();
        assert_eq!(pattern.azimuth_deg.len(), 7);
        assert_eq!(pattern.elevation_deg.len(), 7);
        assert!(pattern.power.iter().all(|row| row.len() == 7));
        assert!(pattern.peak_azimuth_deg.abs() < 1e-3);
        assert!(pattern.peak_elevation_deg.abs() < 1e-3);

        let boresight = pattern.power[3][3];
        let edge = pattern.power[0][0];
        assert!(boresight > edge);
    }
}
