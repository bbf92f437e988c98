use thiserror::Error;

/// Rejected pipeline configuration. Fatal to construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("fft_size must be at least 2, got {0}")]
    FftSizeTooSmall(usize),

    #[error("fft_size must be a power of two, got {0}")]
    FftSizeNotPowerOfTwo(usize),

    #[error("waveform_size must be non-zero")]
    WaveformSizeZero,

    #[error("group_step must be a finite value greater than 1.0, got {0}")]
    GroupStepTooSmall(f32),
}
