use ndarray::{ArrayView2, ArrayViewMut2};

use crate::config::CorrelationMethod;
use crate::math::FftHelper;
use crate::prelude::{SonarError, SonarResult};
use crate::processing::BufferPool;

/// Full linear correlation of `channel` with the waveform whose time reversal
/// is `kernel`, i.e. the convolution `channel * kernel`.
///
/// Output index `n` holds lag `n - (kernel.len() - 1)`.
pub fn correlate_into(channel: &[f32], kernel: &[f32], output: &mut [f32]) -> SonarResult<()> {
    if channel.is_empty() || kernel.is_empty() {
        return Err(SonarError::InvalidArgument(
            "correlation needs non-empty channel and kernel".into(),
        ));
    }
    let full_len = channel.len() + kernel.len() - 1;
    if output.len() < full_len {
        return Err(SonarError::InvalidArgument(format!(
            "correlation output holds {} samples, need {}",
            output.len(),
            full_len
        )));
    }

    for (n, out) in output[..full_len].iter_mut().enumerate() {
        let first = n.saturating_sub(channel.len() - 1);
        let last = n.min(kernel.len() - 1);
        let mut acc = 0.0f32;
        for m in first..=last {
            acc += channel[n - m] * kernel[m];
        }
        *out = acc;
    }
    Ok(())
}

/// Allocating form of [`correlate_into`].
pub fn correlate(channel: &[f32], kernel: &[f32]) -> SonarResult<Vec<f32>> {
    if channel.is_empty() || kernel.is_empty() {
        return Err(SonarError::InvalidArgument(
            "correlation needs non-empty channel and kernel".into(),
        ));
    }
    let mut output = vec![0.0; channel.len() + kernel.len() - 1];
    correlate_into(channel, kernel, &mut output)?;
    Ok(output)
}

/// Pulse compression against the transmit kernel.
///
/// `compress` keeps only non-negative lags so output index equals the
/// two-way time of flight in samples. The kernel copy, the full-length
/// correlation buffer and any FFT spectra come from the caller's pool.
pub struct MatchedFilter {
    kernel: Vec<f32>,
    method: CorrelationMethod,
    fft: Option<FftHelper>,
    full: Vec<f32>,
}

impl MatchedFilter {
    pub fn new(
        kernel: &[f32],
        max_channel_len: usize,
        method: CorrelationMethod,
        pool: &mut BufferPool,
    ) -> SonarResult<Self> {
        if kernel.is_empty() || max_channel_len == 0 {
            return Err(SonarError::InvalidArgument(
                "matched filter needs a kernel and a channel length".into(),
            ));
        }
        let full = pool.checkout(max_channel_len + kernel.len() - 1)?;
        let fft = match method {
            CorrelationMethod::Direct => None,
            CorrelationMethod::Fft => Some(FftHelper::new(kernel, max_channel_len, pool)?),
        };
        let kernel = pool.checkout_copy(kernel)?;
        Ok(Self {
            kernel,
            method,
            fft,
            full,
        })
    }

    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    pub fn method(&self) -> CorrelationMethod {
        self.method
    }

    /// Full-length correlation into the internal buffer.
    pub fn correlate(&mut self, channel: &[f32]) -> SonarResult<&[f32]> {
        let full_len = channel.len() + self.kernel.len() - 1;
        if full_len > self.full.len() {
            return Err(SonarError::InvalidArgument(format!(
                "channel of {} samples exceeds filter capacity",
                channel.len()
            )));
        }
        match self.fft.as_mut() {
            Some(fft) => fft.convolve(channel, &mut self.full)?,
            None => correlate_into(channel, &self.kernel, &mut self.full)?,
        }
        Ok(&self.full[..full_len])
    }

    /// Lag-aligned compression: `output[n]` is the correlation at lag `n`.
    pub fn compress(&mut self, channel: &[f32], output: &mut [f32]) -> SonarResult<()> {
        if output.len() != channel.len() {
            return Err(SonarError::InvalidArgument(format!(
                "compressed output length {} differs from channel length {}",
                output.len(),
                channel.len()
            )));
        }
        let offset = self.kernel.len() - 1;
        let full = self.correlate(channel)?;
        output.copy_from_slice(&full[offset..offset + channel.len()]);
        Ok(())
    }

    /// Compresses every row of `input` into the matching row of `output`.
    pub fn compress_channels(
        &mut self,
        input: ArrayView2<f32>,
        mut output: ArrayViewMut2<f32>,
    ) -> SonarResult<()> {
        if input.dim() != output.dim() {
            return Err(SonarError::InvalidArgument(format!(
                "channel shapes differ: {:?} vs {:?}",
                input.dim(),
                output.dim()
            )));
        }
        for (raw, mut filtered) in input.outer_iter().zip(output.outer_iter_mut()) {
            let (Some(raw), Some(filtered)) = (raw.as_slice(), filtered.as_slice_mut()) else {
                return Err(SonarError::InvalidArgument(
                    "channel rows must be contiguous".into(),
                ));
            };
            self.compress(raw, filtered)?;
        }
        Ok(())
    }
}
