//! Audio analysis: sample history, Hann window, radix-2 FFT and
//! logarithmic spectrum reduction, tied together by [`Pipeline`].

pub mod decode;
pub mod fft;
pub mod history;
pub mod pipeline;
pub mod reducer;
pub mod window;

pub use pipeline::{Channel, Ingestor, Pipeline, StereoSpectrum, WaveformSnapshot};
