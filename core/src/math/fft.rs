use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

use crate::prelude::{SonarError, SonarResult};
use crate::processing::BufferPool;

/// Frequency-domain linear convolution against a fixed kernel.
///
/// Plans, spectra and scratch space are sized once for the largest input and
/// drawn from the pipeline's [`BufferPool`], so `convolve` never allocates.
pub struct FftHelper {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    kernel_spectrum: Vec<Complex32>,
    kernel_len: usize,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FftHelper {
    pub fn new(kernel: &[f32], max_input_len: usize, pool: &mut BufferPool) -> SonarResult<Self> {
        if kernel.is_empty() {
            return Err(SonarError::InvalidArgument("empty convolution kernel".into()));
        }
        let size = Self::planned_size(kernel.len(), max_input_len);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let mut scratch = pool.checkout_complex(scratch_len)?;

        let mut kernel_spectrum = pool.checkout_complex(size)?;
        for (slot, &tap) in kernel_spectrum.iter_mut().zip(kernel) {
            *slot = Complex32::new(tap, 0.0);
        }
        forward.process_with_scratch(&mut kernel_spectrum, &mut scratch);
        let buffer = pool.checkout_complex(size)?;

        Ok(Self {
            forward,
            inverse,
            kernel_spectrum,
            kernel_len: kernel.len(),
            buffer,
            scratch,
        })
    }

    /// Power-of-two transform length covering a full linear convolution.
    pub fn planned_size(kernel_len: usize, max_input_len: usize) -> usize {
        (max_input_len + kernel_len).saturating_sub(1).max(1).next_power_of_two()
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Full linear convolution of `input` with the kernel; `output` receives
    /// `input.len() + kernel_len - 1` samples.
    pub fn convolve(&mut self, input: &[f32], output: &mut [f32]) -> SonarResult<()> {
        let full_len = input.len() + self.kernel_len - 1;
        if full_len > self.buffer.len() {
            return Err(SonarError::InvalidArgument(format!(
                "input of {} samples exceeds planned FFT size {}",
                input.len(),
                self.buffer.len()
            )));
        }
        if output.len() < full_len {
            return Err(SonarError::InvalidArgument(format!(
                "output holds {} samples, need {}",
                output.len(),
                full_len
            )));
        }

        for (idx, slot) in self.buffer.iter_mut().enumerate() {
            *slot = match input.get(idx) {
                Some(&value) => Complex32::new(value, 0.0),
                None => Complex32::zero(),
            };
        }
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (bin, kernel_bin) in self.buffer.iter_mut().zip(&self.kernel_spectrum) {
            *bin = *bin * *kernel_bin;
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.buffer.len() as f32;
        for (out, bin) in output[..full_len].iter_mut().zip(&self.buffer) {
            *out = bin.re * scale;
        }
        Ok(())
    }
}
