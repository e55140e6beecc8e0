use crate::config::DetectorConfig;
use crate::interface::TargetCluster;
use crate::math::StatsHelper;
use crate::prelude::{SonarError, SonarResult};
use crate::processing::round_trip_range_cm;

/// `mean + factor * std` over the whole signal.
pub fn adaptive_threshold(signal: &[f32], factor: f32) -> SonarResult<f32> {
    if signal.is_empty() {
        return Err(SonarError::InvalidArgument("empty signal for threshold".into()));
    }
    Ok(StatsHelper::mean(signal) + factor * StatsHelper::std_dev(signal))
}

/// Strict local maxima of `|signal|` above `threshold`, boundary samples
/// excluded, stopping after `max_peaks`.
pub fn find_peaks(signal: &[f32], threshold: f32, max_peaks: usize, peaks: &mut Vec<usize>) {
    peaks.clear();
    if signal.len() < 3 {
        return;
    }
    for i in 1..signal.len() - 1 {
        if peaks.len() >= max_peaks {
            break;
        }
        let value = signal[i].abs();
        if value > threshold && value > signal[i - 1].abs() && value > signal[i + 1].abs() {
            peaks.push(i);
        }
    }
}

/// Range gating parameters shared by the clustering pass.
#[derive(Debug, Clone, Copy)]
pub struct ClusterGeometry {
    pub sample_rate: f32,
    pub speed_of_sound: f32,
    pub min_separation_cm: f32,
    pub max_clusters: usize,
}

/// Greedy clustering in peak order: each unmerged peak seeds a cluster and
/// absorbs every later peak within `min_separation_cm` of the cluster's
/// running mean range.
pub fn cluster_peaks(
    peaks: &[usize],
    signal: &[f32],
    geometry: ClusterGeometry,
    merged: &mut Vec<bool>,
    clusters: &mut Vec<TargetCluster>,
) {
    clusters.clear();
    merged.clear();
    merged.resize(peaks.len(), false);

    let range_of = |index: usize| {
        round_trip_range_cm(index, geometry.sample_rate, geometry.speed_of_sound)
    };

    for i in 0..peaks.len() {
        if clusters.len() >= geometry.max_clusters {
            break;
        }
        if merged[i] {
            continue;
        }
        merged[i] = true;
        let mut cluster = TargetCluster::seeded(range_of(peaks[i]), signal[peaks[i]].abs(), peaks[i]);

        for j in i + 1..peaks.len() {
            if merged[j] {
                continue;
            }
            let range = range_of(peaks[j]);
            if (range - cluster.range_cm).abs() < geometry.min_separation_cm {
                cluster.merge(range, signal[peaks[j]].abs());
                merged[j] = true;
            }
        }
        clusters.push(cluster);
    }
}

/// Adaptive-threshold peak picking and range clustering over one beam.
///
/// Working storage is sized from the configured caps up front.
pub struct MultiTargetDetector {
    threshold_factor: f32,
    max_peaks: usize,
    max_clusters: usize,
    min_separation_cm: f32,
    threshold: f32,
    peaks: Vec<usize>,
    merged: Vec<bool>,
    clusters: Vec<TargetCluster>,
}

impl MultiTargetDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            threshold_factor: config.threshold_factor,
            max_peaks: config.max_peaks,
            max_clusters: config.max_clusters,
            min_separation_cm: config.min_separation_cm,
            threshold: 0.0,
            peaks: Vec::with_capacity(config.max_peaks),
            merged: Vec::with_capacity(config.max_peaks),
            clusters: Vec::with_capacity(config.max_clusters),
        }
    }

    /// Runs the full pass; zero peaks yields zero clusters.
    pub fn detect(
        &mut self,
        signal: &[f32],
        sample_rate: f32,
        speed_of_sound: f32,
    ) -> SonarResult<&[TargetCluster]> {
        self.threshold = adaptive_threshold(signal, self.threshold_factor)?;
        find_peaks(signal, self.threshold, self.max_peaks, &mut self.peaks);
        cluster_peaks(
            &self.peaks,
            signal,
            ClusterGeometry {
                sample_rate,
                speed_of_sound,
                min_separation_cm: self.min_separation_cm,
                max_clusters: self.max_clusters,
            },
            &mut self.merged,
            &mut self.clusters,
        );
        Ok(&self.clusters)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn peaks(&self) -> &[usize] {
        &self.peaks
    }

    pub fn clusters(&self) -> &[TargetCluster] {
        &self.clusters
    }

    pub fn clusters_mut(&mut self) -> &mut [TargetCluster] {
        &mut self.clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 200_000.0;
    const SPEED: f32 = 343.0;

    fn samples_for_cm(range_cm: f32) -> usize {
        (range_cm * 2.0 / (SPEED * 100.0) * FS).round() as usize
    }

    fn geometry() -> ClusterGeometry {
        ClusterGeometry {
            sample_rate: FS,
            speed_of_sound: SPEED,
            min_separation_cm: 20.0,
            max_clusters: 5,
        }
    }

    #[test]
    fn threshold_is_mean_plus_factor_std() {
        let signal = [1.0, 2.0, 3.0, 4.0, 10.0];
        let mean = 4.0f32;
        let std = ((9.0 + 4.0 + 1.0 + 0.0 + 36.0) / 4.0f32).sqrt();
        let threshold = adaptive_threshold(&signal, 2.5).unwrap();
        assert!((threshold - (mean + 2.5 * std)).abs() < 1e-5);
        assert!(adaptive_threshold(&[], 3.0).is_err());
    }

    #[test]
    fn peaks_are_strict_interior_maxima_of_magnitude() {
        let signal = [9.0, 1.0, -5.0, 1.0, 4.0, 4.0, 1.0, 6.0, 0.0, 7.0];
        let mut peaks = Vec::new();
        find_peaks(&signal, 2.0, 10, &mut peaks);
        assert_eq!(peaks, vec![2, 7]);

        find_peaks(&signal, 2.0, 1, &mut peaks);
        assert_eq!(peaks, vec![2]);
    }

    #[test]
    fn close_peaks_merge_and_distant_peaks_stay_apart() {
        let near_a = samples_for_cm(100.0);
        let near_b = samples_for_cm(110.0);
        let far = samples_for_cm(150.0);
        let mut signal = vec![0.0f32; far + 10];
        signal[near_a] = 5.0;
        signal[near_b] = -8.0;
        signal[far] = 3.0;

        let mut merged = Vec::new();
        let mut clusters = Vec::new();
        cluster_peaks(&[near_a, near_b, far], &signal, geometry(), &mut merged, &mut clusters);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].sample_count, 2);
        assert!((clusters[0].range_cm - 105.0).abs() < 0.1);
        assert_eq!(clusters[0].power, 8.0);
        assert_eq!(clusters[1].sample_count, 1);
        assert!((clusters[1].range_cm - 150.0).abs() < 0.1);
        assert!(clusters.iter().all(|c| c.azimuth_rad.is_none()));
    }

    #[test]
    fn cluster_count_is_capped() {
        let peaks: Vec<usize> = (0..8).map(|k| samples_for_cm(50.0 + 40.0 * k as f32)).collect();
        let signal = vec![1.0f32; peaks[7] + 1];
        let mut merged = Vec::new();
        let mut clusters = Vec::new();
        cluster_peaks(&peaks, &signal, geometry(), &mut merged, &mut clusters);
        assert_eq!(clusters.len(), 5);
    }

    #[test]
    fn detector_reports_two_separated_echoes() {
        let mut signal = vec![0.0f32; 4000];
        let first = samples_for_cm(80.0);
        let second = samples_for_cm(160.0);
        signal[first - 1] = 20.0;
        signal[first] = 50.0;
        signal[first + 1] = 20.0;
        signal[second] = 40.0;

        let config = DetectorConfig::default();
        let mut detector = MultiTargetDetector::new(&config);
        let clusters = detector.detect(&signal, FS, SPEED).unwrap().to_vec();
        assert_eq!(clusters.len(), 2);
        assert!((clusters[0].range_cm - 80.0).abs() < 0.1);
        assert!((clusters[1].range_cm - 160.0).abs() < 0.1);
        assert!(detector.threshold() > 0.0);
    }

    #[test]
    fn flat_signal_yields_no_clusters() {
        let mut detector = MultiTargetDetector::new(&DetectorConfig::default());
        let clusters = detector.detect(&[1.0; 64], FS, SPEED).unwrap();
        assert!(clusters.is_empty());
        assert!(detector.detect(&[], FS, SPEED).is_err());
    }
}
