pub mod angular_search;
pub mod beamformer;
pub mod buffer_pool;
pub mod calibration;
pub mod chirp;
pub mod matched_filter;
pub mod multi_target;

pub use angular_search::{AngularSearch, BeamPeak};
pub use beamformer::Beamformer;
pub use buffer_pool::BufferPool;
pub use calibration::{CalibrationProfile, Calibrator};
pub use chirp::{ChirpGenerator, Waveform};
pub use matched_filter::MatchedFilter;
pub use multi_target::MultiTargetDetector;

/// Round-trip range in centimetres for a time-of-flight sample index.
pub fn round_trip_range_cm(sample_index: usize, sample_rate: f32, speed_of_sound: f32) -> f32 {
    (sample_index as f32 / sample_rate) * speed_of_sound * 100.0 / 2.0
}
