//! Logarithmic bin grouping ("squashing") with per-frame normalization.
//!
//! Only the lower half of the spectrum is used. Groups start at bin 1 and
//! grow geometrically: a cursor `f` advances via `ceil(f * step)` and each
//! group covers `[floor(f), floor(f_next))`. Low frequencies therefore get
//! one output per FFT bin while high frequencies are pooled.

use std::ops::Range;

use rustfft::num_complex::Complex;

use crate::config::check_fft_size;
use crate::error::ConfigError;

/// Normalization never divides by less than this.
const NORMALIZATION_FLOOR: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct SpectralReducer {
    fft_size: usize,
    groups: Vec<Range<usize>>,
    log_compress: bool,
}

impl SpectralReducer {
    pub fn new(fft_size: usize, group_step: f32, log_compress: bool) -> Result<Self, ConfigError> {
        check_fft_size(fft_size)?;
        if !group_step.is_finite() || group_step <= 1.0 {
            return Err(ConfigError::GroupStepTooSmall(group_step));
        }
        Ok(Self {
            fft_size,
            groups: group_schedule(fft_size / 2, group_step),
            log_compress,
        })
    }

    /// Number of output bins.
    pub fn bin_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[Range<usize>] {
        &self.groups
    }

    pub fn log_compress(&self) -> bool {
        self.log_compress
    }

    /// Index of the group holding FFT bin `bin`, if any.
    pub fn group_of(&self, bin: usize) -> Option<usize> {
        let idx = self.groups.partition_point(|g| g.end <= bin);
        self.groups.get(idx).filter(|g| g.contains(&bin)).map(|_| idx)
    }

    /// Reduce a full spectrum into `out` (length [`bin_count`](Self::bin_count)).
    ///
    /// Each group takes the peak magnitude of its bins, optionally
    /// log-compressed. The frame maximum is found first and every value is
    /// then divided by it, so outputs stay in [0, 1].
    pub fn reduce(&self, spectrum: &[Complex<f32>], out: &mut [f32]) {
        assert_eq!(spectrum.len(), self.fft_size, "spectrum length mismatch");
        assert_eq!(out.len(), self.groups.len(), "reduced length mismatch");

        let mut frame_max = NORMALIZATION_FLOOR;
        for (slot, group) in out.iter_mut().zip(&self.groups) {
            let peak = spectrum[group.clone()]
                .iter()
                .map(|c| c.norm())
                .fold(0.0f32, f32::max);
            let value = if self.log_compress { (1.0 + peak).log10() } else { peak };
            frame_max = frame_max.max(value);
            *slot = value;
        }

        for slot in out.iter_mut() {
            *slot /= frame_max;
        }
    }
}

fn group_schedule(half: usize, step: f32) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut f = 1.0f32;
    while (f as usize) < half {
        // Rounding at large `f` can stall the cursor; always move a whole bin.
        let next = (f * step).ceil().max(f.floor() + 1.0);
        let start = f as usize;
        let end = (next as usize).min(half);
        if end > start {
            groups.push(start..end);
        }
        f = next;
    }
    groups
}
