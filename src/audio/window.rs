use rustfft::num_complex::Complex;

use crate::config::check_fft_size;
use crate::error::ConfigError;

/// Precomputed Hann taper for a fixed frame length.
#[derive(Debug, Clone)]
pub struct HannWindow {
    coefficients: Vec<f32>,
}

impl HannWindow {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        check_fft_size(size)?;
        Ok(Self {
            coefficients: hann_window(size),
        })
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Taper `samples` into `out` as complex values with zero imaginary part.
    pub fn apply(&self, samples: &[f32], out: &mut [Complex<f32>]) {
        assert_eq!(samples.len(), self.coefficients.len());
        assert_eq!(out.len(), self.coefficients.len());
        for ((dst, &s), &w) in out.iter_mut().zip(samples).zip(&self.coefficients) {
            *dst = Complex::new(s * w, 0.0);
        }
    }
}

/// w(i) = 0.5 - 0.5 cos(2 pi i / (N - 1)); N must be at least 2.
fn hann_window(size: usize) -> Vec<f32> {
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}
