//! Real-time stereo spectrum analysis for audio visualizers.
//!
//! An audio thread feeds interleaved stereo blocks into a [`Pipeline`]; the
//! render loop calls [`Pipeline::process`] once per frame and reads back
//! normalized, logarithmically grouped magnitude bins for each channel.

pub mod audio;
pub mod config;
pub mod error;

pub use audio::{Channel, Ingestor, Pipeline, StereoSpectrum, WaveformSnapshot};
pub use config::PipelineConfig;
pub use error::ConfigError;
