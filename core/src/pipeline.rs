//! Per-cycle orchestration: acquisition, detection, guidance and actuation.
//!
//! Every buffer is carved out of a [`BufferPool`] in [`SonarPipeline::new`];
//! `process` and `run_cycle` only reuse them.

use log::{debug, info, warn};
use ndarray::ArrayView2;
use std::borrow::Cow;
use std::time::{Duration, Instant};

use crate::config::SystemConfig;
use crate::guidance::GuidanceLaw;
use crate::interface::{
    ChannelDiagnostics, GuidanceCommand, SonarHardware, SteeringDirection, TargetCluster, ThrustMix,
};
use crate::math::StatsHelper;
use crate::prelude::{ChannelMatrix, Detection, SonarError, SonarResult};
use crate::processing::{
    AngularSearch, BeamPeak, Beamformer, BufferPool, CalibrationProfile, Calibrator,
    ChirpGenerator, MatchedFilter, MultiTargetDetector, Waveform,
};
use crate::telemetry::{CycleMetrics, RecordSink, TelemetryRecord};

/// Outcome of one `run_cycle`.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub detection: Detection,
    pub peak: BeamPeak,
    pub cluster_count: usize,
    pub command: Option<GuidanceCommand>,
    pub thrust: Option<ThrustMix>,
    pub latency: Duration,
    pub over_budget: bool,
}

pub struct SonarPipeline {
    config: SystemConfig,
    waveform: Waveform,
    profile: CalibrationProfile,
    raw: ChannelMatrix,
    calibrated: ChannelMatrix,
    filtered: ChannelMatrix,
    filter: MatchedFilter,
    search: AngularSearch,
    detector: MultiTargetDetector,
    guidance: GuidanceLaw,
    metrics: CycleMetrics,
    pool: BufferPool,
    cycle: u64,
}

impl SonarPipeline {
    pub fn new(config: SystemConfig) -> SonarResult<Self> {
        config.validate()?;
        let sonar = &config.sonar;
        let channels = config.array.channels();
        let samples = config.samples_per_channel();
        let chirp_samples = sonar.chirp_samples();
        if chirp_samples > samples {
            return Err(SonarError::InvalidConfig(format!(
                "chirp of {} samples exceeds the {}-sample echo window",
                chirp_samples, samples
            )));
        }

        let waveform = ChirpGenerator::generate(
            chirp_samples,
            sonar.sample_rate(),
            sonar.chirp_f0_hz,
            sonar.chirp_f1_hz,
        )?;

        let mut pool = BufferPool::with_capacity(config.memory_budget_samples);
        pool.charge(waveform.len())?;
        let raw = pool.checkout_channels(channels, samples)?;
        let calibrated = pool.checkout_channels(channels, samples)?;
        let filtered = pool.checkout_channels(channels, samples)?;
        let beam = pool.checkout(samples)?;
        let filter = MatchedFilter::new(&waveform.kernel(), samples, sonar.correlation, &mut pool)?;
        let search = AngularSearch::new(
            config.search.clone(),
            Beamformer::new(&config.array, sonar.sample_rate()),
            beam,
        );
        let detector = MultiTargetDetector::new(&config.detector);
        let guidance = GuidanceLaw::new(&config.guidance);
        let profile = CalibrationProfile::new(channels, config.calibration.temperature_c);

        info!(
            "sonar pipeline ready: {} channels x {} samples, {}-sample chirp, {} grid points, {} of {} budgeted samples",
            channels,
            samples,
            chirp_samples,
            config.search.grid_points(),
            pool.allocated(),
            config.memory_budget_samples
        );

        Ok(Self {
            config,
            waveform,
            profile,
            raw,
            calibrated,
            filtered,
            filter,
            search,
            detector,
            guidance,
            metrics: CycleMetrics::new(),
            pool,
            cycle: 0,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn metrics(&self) -> &CycleMetrics {
        &self.metrics
    }

    pub fn allocated_samples(&self) -> usize {
        self.pool.allocated()
    }

    /// `(channels, samples)` every acquisition must fill.
    pub fn buffer_shape(&self) -> (usize, usize) {
        self.raw.dim()
    }

    /// Clusters from the most recent multi-target pass.
    pub fn last_clusters(&self) -> &[TargetCluster] {
        self.detector.clusters()
    }

    /// Most recent beamformed signal.
    pub fn last_beam(&self) -> &[f32] {
        self.search.beam()
    }

    /// Peak `|beam|` of the last processed capture steered toward `direction`.
    pub fn beam_response(&mut self, direction: SteeringDirection) -> SonarResult<f32> {
        let beam = self
            .search
            .steer(self.filtered.view(), self.profile.speed_of_sound, direction)?;
        Ok(StatsHelper::peak_abs(beam).map_or(0.0, |(_, value)| value))
    }

    /// Buffers keep their configured length; colder air than configured
    /// shortens the reachable range.
    pub fn set_temperature(&mut self, temperature_c: f32) -> SonarResult<()> {
        self.profile.set_temperature(temperature_c)?;
        let needed = self
            .config
            .sonar
            .samples_per_channel(self.profile.speed_of_sound);
        if needed > self.raw.ncols() {
            warn!(
                "at {} C the {}-sample echo window ends short of {} cm",
                temperature_c,
                self.raw.ncols(),
                self.config.sonar.max_range_cm
            );
        }
        Ok(())
    }

    /// Runs a calibration pass against a capture of a common reference
    /// signal. On failure the previous profile stays in force.
    pub fn calibrate(&mut self, reference: ArrayView2<f32>) -> SonarResult<()> {
        let carrier = self.config.sonar.center_frequency_hz();
        let result = Calibrator::calibrate(
            &mut self.profile,
            reference,
            self.config.array.reference_channel,
            self.config.sonar.sample_rate(),
            carrier,
            self.config.calibration.max_alignment_lag_samples,
        );
        if let Err(err) = result {
            warn!("calibration failed, keeping previous profile: {}", err);
            return Err(err);
        }
        self.search
            .beamformer_mut()
            .set_timing_offsets(self.profile.timing_offsets_s(carrier))?;
        info!("calibration applied: gains {:?}", self.profile.gain);
        Ok(())
    }

    /// Per-channel power and SNR of the last calibrated acquisition.
    pub fn diagnostics(&self) -> SonarResult<Vec<ChannelDiagnostics>> {
        Calibrator::diagnostics(
            self.calibrated.view(),
            self.config.calibration.noise_window_fraction,
        )
    }

    /// Calibrate, compress, search and cluster one externally supplied capture.
    pub fn process(&mut self, raw: ArrayView2<f32>) -> SonarResult<(Detection, BeamPeak)> {
        if raw.dim() != self.calibrated.dim() {
            return Err(SonarError::InvalidArgument(format!(
                "capture shape {:?} differs from configured {:?}",
                raw.dim(),
                self.calibrated.dim()
            )));
        }
        Calibrator::apply(raw, &self.profile, self.calibrated.view_mut())?;
        self.analyze()
    }

    /// One full cycle against the hardware adapter.
    pub fn run_cycle<H: SonarHardware>(
        &mut self,
        hardware: &mut H,
        sink: &mut dyn RecordSink,
    ) -> SonarResult<CycleReport> {
        let started = Instant::now();
        let report = self.cycle_stages(hardware, sink, started);
        match &report {
            Ok(report) => {
                self.metrics.record_cycle(
                    report.detection.target().is_some(),
                    report.latency,
                    report.over_budget,
                );
            }
            Err(err) => {
                warn!("cycle {} failed: {}", self.cycle, err);
                self.metrics.record_error();
            }
        }
        self.cycle += 1;
        report
    }

    fn cycle_stages<H: SonarHardware>(
        &mut self,
        hardware: &mut H,
        sink: &mut dyn RecordSink,
        started: Instant,
    ) -> SonarResult<CycleReport> {
        let cycle = self.cycle;
        hardware.transmit(&self.waveform)?;
        hardware.acquire_samples(&mut self.raw)?;
        if self.raw.dim() != self.calibrated.dim() {
            return Err(SonarError::Hardware(format!(
                "receiver resized buffers to {:?}",
                self.raw.dim()
            )));
        }
        Calibrator::apply(self.raw.view(), &self.profile, self.calibrated.view_mut())?;
        let (detection, peak) = self.analyze()?;

        if self.config.detector.enabled && !self.detector.clusters().is_empty() {
            sink.append(TelemetryRecord::Clusters {
                cycle,
                clusters: Cow::Borrowed(self.detector.clusters()),
            })?;
        }

        let (command, thrust) = match detection {
            Detection::Found(estimate) => {
                sink.append(TelemetryRecord::Target { cycle, estimate })?;
                let vehicle = hardware.vehicle_state();
                match self.guidance.compute(&vehicle, &estimate) {
                    Some(command) => {
                        let thrust = self.guidance.to_thrust(&command);
                        hardware.apply_thrust(thrust)?;
                        sink.append(TelemetryRecord::Guidance {
                            cycle,
                            command,
                            thrust,
                        })?;
                        (Some(command), Some(thrust))
                    }
                    None => (None, None),
                }
            }
            Detection::Missed(reason) => {
                debug!("cycle {}: no target ({:?})", cycle, reason);
                (None, None)
            }
        };

        let latency = started.elapsed();
        let budget = Duration::from_secs_f32(self.config.sonar.latency_budget_ms / 1000.0);
        let over_budget = latency > budget;
        if over_budget {
            warn!(
                "cycle {} took {:.1} ms, over the {:.1} ms budget",
                cycle,
                latency.as_secs_f32() * 1000.0,
                self.config.sonar.latency_budget_ms
            );
        }

        Ok(CycleReport {
            cycle,
            detection,
            peak,
            cluster_count: self.detector.clusters().len(),
            command,
            thrust,
            latency,
            over_budget,
        })
    }

    /// Stages after calibration, reading `self.calibrated`.
    fn analyze(&mut self) -> SonarResult<(Detection, BeamPeak)> {
        self.filter
            .compress_channels(self.calibrated.view(), self.filtered.view_mut())?;

        let speed = self.profile.speed_of_sound;
        let (detection, peak) = self
            .search
            .detect(self.filtered.view(), speed, &self.config.sonar)?;
        debug!(
            "grid peak {:.1} at sample {} az {:.3} el {:.3}",
            peak.value, peak.index, peak.direction.azimuth_rad, peak.direction.elevation_rad
        );

        if self.config.detector.enabled {
            let direction = self.config.detector.steering.unwrap_or(peak.direction);
            let beam = self.search.steer(self.filtered.view(), speed, direction)?;
            self.detector
                .detect(beam, self.config.sonar.sample_rate(), speed)?;

            if self.config.detector.resolve_angles {
                let len = self.filtered.ncols();
                let half_window = self.filter.kernel().len();
                for cluster in self.detector.clusters_mut() {
                    let start = cluster.peak_index.saturating_sub(half_window);
                    let end = (cluster.peak_index + half_window + 1).min(len);
                    let local = self.search.scan(self.filtered.view(), speed, start..end)?;
                    cluster.resolve(local.direction);
                }
            }
        }

        Ok((detection, peak))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{
        ChirpTransmitter, EchoReceiver, ThrustActuator, VehicleState, VehicleStateSource,
    };
    use crate::config::CorrelationMethod;
    use crate::math::Vec3;
    use crate::prelude::MissReason;
    use crate::processing::round_trip_range_cm;
    use crate::telemetry::MemorySink;
    use ndarray::Array2;

    fn small_config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.sonar.max_range_cm = 150.0;
        config.search.azimuth_steps = 6;
        config.search.elevation_steps = 4;
        config.detector.max_peaks = 200;
        config
    }

    /// Echo of the configured chirp reaching the reference microphone
    /// `delay` samples after transmission, plane wave from `direction`.
    fn synthetic_capture(
        config: &SystemConfig,
        direction: SteeringDirection,
        delay: usize,
        amplitude: f32,
    ) -> Array2<f32> {
        let sonar = &config.sonar;
        let chirp = ChirpGenerator::generate(
            sonar.chirp_samples(),
            sonar.sample_rate(),
            sonar.chirp_f0_hz,
            sonar.chirp_f1_hz,
        )
        .unwrap();
        let speed = crate::processing::calibration::speed_of_sound(config.calibration.temperature_c);
        let shifts = Beamformer::new(&config.array, sonar.sample_rate())
            .sample_shifts(direction, speed)
            .to_vec();

        let mut capture = Array2::zeros((config.array.channels(), config.samples_per_channel()));
        for (channel, shift) in shifts.iter().enumerate() {
            let start = (delay as isize - shift) as usize;
            for (i, &s) in chirp.samples().iter().enumerate() {
                capture[[channel, start + i]] = amplitude * s;
            }
        }
        capture
    }

    struct MockHardware {
        capture: Array2<f32>,
        transmissions: usize,
        thrust: Vec<ThrustMix>,
        vehicle: VehicleState,
        fail_acquire: bool,
    }

    impl MockHardware {
        fn new(capture: Array2<f32>) -> Self {
            Self {
                capture,
                transmissions: 0,
                thrust: Vec::new(),
                vehicle: VehicleState::new(Vec3::zeros(), Vec3::new(0.5, 0.2, 0.0)),
                fail_acquire: false,
            }
        }
    }

    impl ChirpTransmitter for MockHardware {
        fn transmit(&mut self, _waveform: &Waveform) -> SonarResult<()> {
            self.transmissions += 1;
            Ok(())
        }
    }

    impl EchoReceiver for MockHardware {
        fn acquire_samples(&mut self, buffers: &mut ChannelMatrix) -> SonarResult<()> {
            if self.fail_acquire {
                return Err(SonarError::Hardware("adc timeout".into()));
            }
            buffers.assign(&self.capture);
            Ok(())
        }
    }

    impl ThrustActuator for MockHardware {
        fn apply_thrust(&mut self, thrust: ThrustMix) -> SonarResult<()> {
            self.thrust.push(thrust);
            Ok(())
        }
    }

    impl VehicleStateSource for MockHardware {
        fn vehicle_state(&mut self) -> VehicleState {
            self.vehicle
        }
    }

    #[test]
    fn buffers_are_sized_from_config() {
        let pipeline = SonarPipeline::new(small_config()).unwrap();
        assert_eq!(pipeline.buffer_shape(), (4, 1749));
        assert_eq!(pipeline.waveform().len(), 200);
        assert!(pipeline.allocated_samples() >= 3 * 4 * 1749 + 1749);
    }

    #[test]
    fn tiny_memory_budget_is_exhaustion() {
        let mut config = small_config();
        config.memory_budget_samples = 1000;
        assert!(matches!(
            SonarPipeline::new(config),
            Err(SonarError::BufferExhaustion(_))
        ));
    }

    #[test]
    fn fft_buffers_count_against_memory_budget() {
        let direct = SonarPipeline::new(small_config()).unwrap();
        let direct_cost = direct.allocated_samples();

        let mut config = small_config();
        config.sonar.correlation = CorrelationMethod::Fft;
        let fft = SonarPipeline::new(config.clone()).unwrap();
        assert!(fft.allocated_samples() >= direct_cost + 2 * 2 * 2048);

        config.memory_budget_samples = direct_cost;
        assert!(matches!(
            SonarPipeline::new(config),
            Err(SonarError::BufferExhaustion(_))
        ));
    }

    #[test]
    fn cold_configuration_extends_buffers() {
        let mut config = small_config();
        config.calibration.temperature_c = -20.0;
        let pipeline = SonarPipeline::new(config).unwrap();
        let (_, samples) = pipeline.buffer_shape();
        assert!(samples > 1749);
        let last_range =
            round_trip_range_cm(samples - 1, 200_000.0, pipeline.profile().speed_of_sound);
        assert!(last_range >= 150.0);
    }

    #[test]
    fn unphysical_temperature_is_rejected_at_runtime() {
        let mut pipeline = SonarPipeline::new(small_config()).unwrap();
        assert!(pipeline.set_temperature(f32::NAN).is_err());
        assert!(pipeline.set_temperature(-600.0).is_err());
        assert!(pipeline.set_temperature(-20.0).is_ok());
        assert!((pipeline.profile().speed_of_sound - 319.18).abs() < 1e-3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = small_config();
        config.sonar.chirp_f1_hz = 30_000.0;
        assert!(matches!(
            SonarPipeline::new(config),
            Err(SonarError::InvalidConfig(_))
        ));
    }

    #[test]
    fn process_locates_synthetic_echo() {
        let config = small_config();
        let truth = SteeringDirection::new(config.search.azimuth_at(2), config.search.elevation_at(1));
        let capture = synthetic_capture(&config, truth, 600, 100.0);

        let mut pipeline = SonarPipeline::new(config).unwrap();
        let (detection, peak) = pipeline.process(capture.view()).unwrap();
        let estimate = detection.target().copied().expect("echo should be detected");

        assert_eq!(peak.index, 600);
        let expected = round_trip_range_cm(600, 200_000.0, pipeline.profile().speed_of_sound);
        assert!((estimate.range_cm - expected).abs() < 1e-3);
        assert!(estimate.confidence > 0.0);

        let clusters = pipeline.last_clusters();
        assert!(!clusters.is_empty());
        assert!((clusters[0].range_cm - expected).abs() < 20.0);
        assert!(clusters[0].azimuth_rad.is_none());
    }

    #[test]
    fn beam_response_peaks_toward_the_echo() {
        let config = small_config();
        let truth = SteeringDirection::new(config.search.azimuth_at(2), config.search.elevation_at(1));
        let away = SteeringDirection::new(config.search.azimuth_at(5), config.search.elevation_at(3));
        let capture = synthetic_capture(&config, truth, 600, 100.0);

        let mut pipeline = SonarPipeline::new(config).unwrap();
        let (_, peak) = pipeline.process(capture.view()).unwrap();
        let toward = pipeline.beam_response(truth).unwrap();
        assert!((toward - peak.value).abs() <= 1e-3 * peak.value);
        assert!(pipeline.beam_response(away).unwrap() <= toward);
    }

    #[test]
    fn resolve_angles_fills_cluster_directions() {
        let mut config = small_config();
        config.detector.resolve_angles = true;
        let capture = synthetic_capture(&config, SteeringDirection::default(), 600, 100.0);

        let mut pipeline = SonarPipeline::new(config).unwrap();
        pipeline.process(capture.view()).unwrap();
        assert!(!pipeline.last_clusters().is_empty());
        assert!(pipeline
            .last_clusters()
            .iter()
            .all(|c| c.azimuth_rad.is_some() && c.elevation_rad.is_some()));
    }

    #[test]
    fn process_rejects_wrong_shape() {
        let mut pipeline = SonarPipeline::new(small_config()).unwrap();
        let capture = Array2::<f32>::zeros((3, 1749));
        assert!(matches!(
            pipeline.process(capture.view()),
            Err(SonarError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cycle_with_echo_drives_thrust_and_telemetry() {
        let config = small_config();
        let capture = synthetic_capture(&config, SteeringDirection::default(), 600, 100.0);
        let mut pipeline = SonarPipeline::new(config).unwrap();
        let mut hardware = MockHardware::new(capture);
        let mut sink = MemorySink::default();

        let report = pipeline.run_cycle(&mut hardware, &mut sink).unwrap();

        assert_eq!(report.cycle, 0);
        assert_eq!(hardware.transmissions, 1);
        assert!(report.command.is_some());
        let thrust = report.thrust.unwrap();
        assert_eq!(hardware.thrust, vec![thrust]);
        assert!(thrust.iter().all(|t| (0.0..=1.0).contains(t)));

        assert!(sink
            .records()
            .any(|r| matches!(r, TelemetryRecord::Target { .. })));
        assert!(sink
            .records()
            .any(|r| matches!(r, TelemetryRecord::Guidance { .. })));
        assert!(sink.records().all(|r| r.cycle() == 0));

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.detections, 1);
    }

    #[test]
    fn silent_cycle_is_a_miss_without_thrust() {
        let config = small_config();
        let capture = Array2::zeros(SonarPipeline::new(config.clone()).unwrap().buffer_shape());
        let mut pipeline = SonarPipeline::new(config).unwrap();
        let mut hardware = MockHardware::new(capture);
        let mut sink = MemorySink::default();

        let report = pipeline.run_cycle(&mut hardware, &mut sink).unwrap();
        assert!(matches!(
            report.detection,
            Detection::Missed(MissReason::BelowThreshold { .. })
        ));
        assert!(report.thrust.is_none());
        assert!(hardware.thrust.is_empty());
        assert!(sink.is_empty());
        assert_eq!(pipeline.metrics().snapshot().misses, 1);
    }

    #[test]
    fn hardware_failure_counts_as_error_and_advances_cycle() {
        let config = small_config();
        let capture = Array2::zeros(SonarPipeline::new(config.clone()).unwrap().buffer_shape());
        let mut pipeline = SonarPipeline::new(config).unwrap();
        let mut hardware = MockHardware::new(capture);
        hardware.fail_acquire = true;
        let mut sink = MemorySink::default();

        assert!(matches!(
            pipeline.run_cycle(&mut hardware, &mut sink),
            Err(SonarError::Hardware(_))
        ));
        hardware.fail_acquire = false;
        let report = pipeline.run_cycle(&mut hardware, &mut sink).unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(pipeline.metrics().snapshot().errors, 1);
    }

    #[test]
    fn failed_calibration_keeps_pass_through_profile() {
        let mut pipeline = SonarPipeline::new(small_config()).unwrap();
        let reference = Array2::<f32>::zeros(pipeline.buffer_shape());
        assert!(matches!(
            pipeline.calibrate(reference.view()),
            Err(SonarError::Calibration(_))
        ));
        assert!(!pipeline.profile().is_calibrated());
    }

    #[test]
    fn calibration_equalizes_channel_gains() {
        let config = small_config();
        let mut reference = synthetic_capture(&config, SteeringDirection::default(), 300, 1.0);
        reference.row_mut(1).mapv_inplace(|v| v * 2.0);
        let mut pipeline = SonarPipeline::new(config).unwrap();

        pipeline.calibrate(reference.view()).unwrap();
        assert!(pipeline.profile().is_calibrated());
        assert!((pipeline.profile().gain[1] - 0.5).abs() < 0.05);

        pipeline.process(reference.view()).unwrap();
        let diagnostics = pipeline.diagnostics().unwrap();
        assert_eq!(diagnostics.len(), 4);
        assert!((diagnostics[1].signal_power - diagnostics[0].signal_power).abs()
            < 0.1 * diagnostics[0].signal_power);
    }
}
