pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    pub fn mean(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    /// Sample standard deviation (n - 1 denominator), zero below two samples.
    pub fn std_dev(samples: &[f32]) -> f32 {
        let n = samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let sum_sq: f32 = samples.iter().map(|&v| (v - mean) * (v - mean)).sum();
        (sum_sq / (n - 1) as f32).sqrt()
    }

    /// Largest absolute value and its first index.
    pub fn peak_abs(samples: &[f32]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &value) in samples.iter().enumerate() {
            let magnitude = value.abs();
            match best {
                Some((_, peak)) if magnitude <= peak => {}
                _ => best = Some((idx, magnitude)),
            }
        }
        best
    }
}
