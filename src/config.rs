use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

/// On-disk configuration (`sonoscope.toml`).
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Analysis pipeline settings. Fixed once the pipeline is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// Analysis history length, power of two
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Raw waveform history length
    #[serde(default = "default_waveform_size")]
    pub waveform_size: usize,
    /// Growth factor between successive frequency groups (> 1.0)
    #[serde(default = "default_group_step")]
    pub group_step: f32,
    /// Apply log10(1 + x) to each group peak before normalizing
    #[serde(default = "default_log_compress")]
    pub log_compress: bool,
    /// Analyze left and right on separate rayon workers
    #[serde(default)]
    pub parallel_channels: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fft_size(self.fft_size)?;
        if self.waveform_size == 0 {
            return Err(ConfigError::WaveformSizeZero);
        }
        if !self.group_step.is_finite() || self.group_step <= 1.0 {
            return Err(ConfigError::GroupStepTooSmall(self.group_step));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            waveform_size: default_waveform_size(),
            group_step: default_group_step(),
            log_compress: default_log_compress(),
            parallel_channels: false,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            block_size: default_block_size(),
        }
    }
}

/// FFT-sized stages need a power of two of at least 2.
pub(crate) fn check_fft_size(size: usize) -> Result<(), ConfigError> {
    if size < 2 {
        return Err(ConfigError::FftSizeTooSmall(size));
    }
    if !size.is_power_of_two() {
        return Err(ConfigError::FftSizeNotPowerOfTwo(size));
    }
    Ok(())
}

fn default_fft_size() -> usize { 1 << 13 }
fn default_waveform_size() -> usize { 1024 }
fn default_group_step() -> f32 { 1.06 }
fn default_log_compress() -> bool { true }
fn default_fps() -> u32 { 60 }
fn default_block_size() -> usize { 512 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}
