use ndarray::Array2;
use num_complex::Complex32;

use crate::prelude::{SonarError, SonarResult};

/// Budgeted one-shot allocator for the pipeline's fixed buffers.
///
/// The budget is counted in `f32` samples; a complex value costs two.
/// Every buffer is carved out at initialization; exceeding the budget or
/// failing to reserve memory is reported as `BufferExhaustion`.
pub struct BufferPool {
    allocated: usize,
    max_samples: usize,
}

impl BufferPool {
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            allocated: 0,
            max_samples,
        }
    }

    fn admit(&self, samples: usize) -> SonarResult<usize> {
        self.allocated
            .checked_add(samples)
            .filter(|&total| total <= self.max_samples)
            .ok_or_else(|| {
                SonarError::BufferExhaustion(format!(
                    "request for {} samples exceeds budget ({} of {} used)",
                    samples, self.allocated, self.max_samples
                ))
            })
    }

    fn reserve<T>(&mut self, length: usize, samples_per_item: usize) -> SonarResult<Vec<T>> {
        let samples = length.checked_mul(samples_per_item).ok_or_else(|| {
            SonarError::BufferExhaustion(format!("request for {} items overflows", length))
        })?;
        let total = self.admit(samples)?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(length).map_err(|err| {
            SonarError::BufferExhaustion(format!("allocating {} samples: {}", samples, err))
        })?;
        self.allocated = total;
        Ok(buffer)
    }

    /// Counts a buffer allocated elsewhere, such as the transmit waveform.
    pub fn charge(&mut self, samples: usize) -> SonarResult<()> {
        self.allocated = self.admit(samples)?;
        Ok(())
    }

    /// Zeroed sample buffer of `length`.
    pub fn checkout(&mut self, length: usize) -> SonarResult<Vec<f32>> {
        let mut buffer = self.reserve(length, 1)?;
        buffer.resize(length, 0.0);
        Ok(buffer)
    }

    /// Budgeted copy of `source`.
    pub fn checkout_copy(&mut self, source: &[f32]) -> SonarResult<Vec<f32>> {
        let mut buffer = self.reserve(source.len(), 1)?;
        buffer.extend_from_slice(source);
        Ok(buffer)
    }

    /// Zeroed complex buffer of `length`.
    pub fn checkout_complex(&mut self, length: usize) -> SonarResult<Vec<Complex32>> {
        let mut buffer = self.reserve(length, 2)?;
        buffer.resize(length, Complex32::new(0.0, 0.0));
        Ok(buffer)
    }

    /// Zeroed `channels x length` matrix in standard (row-contiguous) layout.
    pub fn checkout_channels(&mut self, channels: usize, length: usize) -> SonarResult<Array2<f32>> {
        let count = channels.checked_mul(length).ok_or_else(|| {
            SonarError::BufferExhaustion("channel matrix size overflows".into())
        })?;
        let buffer = self.checkout(count)?;
        Array2::from_shape_vec((channels, length), buffer)
            .map_err(|err| SonarError::BufferExhaustion(err.to_string()))
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn remaining(&self) -> usize {
        self.max_samples - self.allocated
    }

    pub fn reset(&mut self) {
        self.allocated = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_tracks_budget() {
        let mut pool = BufferPool::with_capacity(100);
        let buffer = pool.checkout(40).unwrap();
        assert_eq!(buffer.len(), 40);
        let matrix = pool.checkout_channels(3, 20).unwrap();
        assert_eq!(matrix.dim(), (3, 20));
        assert!(matrix.is_standard_layout());
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn exceeding_budget_is_exhaustion() {
        let mut pool = BufferPool::with_capacity(10);
        pool.checkout(8).unwrap();
        assert!(matches!(
            pool.checkout(3),
            Err(SonarError::BufferExhaustion(_))
        ));
        assert_eq!(pool.allocated(), 8);
        pool.reset();
        assert!(pool.checkout(10).is_ok());
    }

    #[test]
    fn complex_values_cost_two_samples() {
        let mut pool = BufferPool::with_capacity(10);
        let spectrum = pool.checkout_complex(4).unwrap();
        assert_eq!(spectrum.len(), 4);
        assert_eq!(pool.allocated(), 8);
        assert!(pool.checkout_complex(2).is_err());
        assert_eq!(pool.checkout_copy(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn charge_counts_without_allocating() {
        let mut pool = BufferPool::with_capacity(10);
        pool.charge(7).unwrap();
        assert!(matches!(
            pool.charge(4),
            Err(SonarError::BufferExhaustion(_))
        ));
        assert_eq!(pool.allocated(), 7);
    }
}
