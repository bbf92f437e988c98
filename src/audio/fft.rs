//! Recursive radix-2 decimation-in-time FFT.
//!
//! The engine owns two equally sized buffers, `output` and `scratch`. Both
//! start as copies of the input; each recursion level reads the interleaved
//! halves from one buffer and writes the combined result into the other, so
//! the roles swap at every level and the top level leaves the spectrum in
//! `output`.

use rustfft::num_complex::Complex;

use crate::config::check_fft_size;
use crate::error::ConfigError;

pub struct FftEngine {
    size: usize,
    /// e^(-2 pi i k / N) for k in [0, N/2)
    twiddles: Vec<Complex<f32>>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftEngine {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        check_fft_size(size)?;
        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * std::f64::consts::PI * k as f64 / size as f64;
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        Ok(Self {
            size,
            twiddles,
            output: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform `input` and return the spectrum held in the engine.
    pub fn process(&mut self, input: &[Complex<f32>]) -> &[Complex<f32>] {
        assert_eq!(input.len(), self.size, "FFT input length mismatch");
        self.output.copy_from_slice(input);
        self.scratch.copy_from_slice(input);
        butterfly(&mut self.output, &mut self.scratch, &self.twiddles, 0, 1);
        &self.output
    }

    /// Transform `data` in place using the engine's buffers.
    pub fn process_in_place(&mut self, data: &mut [Complex<f32>]) {
        let spectrum = self.process(data);
        data.copy_from_slice(spectrum);
    }

    /// Most recent spectrum.
    pub fn output(&self) -> &[Complex<f32>] {
        &self.output
    }

    pub fn clear(&mut self) {
        self.output.fill(Complex::new(0.0, 0.0));
        self.scratch.fill(Complex::new(0.0, 0.0));
    }
}

/// Transform the stride-`step` subsequence starting at `offset`, reading
/// from `src` and writing into `dst`. Both slices span the full frame.
fn butterfly(
    dst: &mut [Complex<f32>],
    src: &mut [Complex<f32>],
    twiddles: &[Complex<f32>],
    offset: usize,
    step: usize,
) {
    let n = dst.len();
    if step >= n {
        return;
    }

    // Sub-transforms land in `src`, which is then combined into `dst`.
    butterfly(src, dst, twiddles, offset, step * 2);
    butterfly(src, dst, twiddles, offset + step, step * 2);

    for i in (0..n).step_by(2 * step) {
        let t = twiddles[i / 2] * src[offset + i + step];
        let even = src[offset + i];
        dst[offset + i / 2] = even + t;
        dst[offset + (i + n) / 2] = even - t;
    }
}
