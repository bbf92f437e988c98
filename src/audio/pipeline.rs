//! Stereo analysis pipeline.
//!
//! The audio thread writes through an [`Ingestor`]; the render thread owns the
//! [`Pipeline`] and calls [`Pipeline::process`] once per frame. Both histories
//! (analysis and waveform, for both channels) sit behind a single mutex, so
//! every ingest block and every snapshot is atomic with respect to the other.
//! Everything downstream of the snapshot (window, FFT, reduction) works on
//! buffers owned by the pipeline and allocated once in [`Pipeline::new`].

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use rustfft::num_complex::Complex;

use super::fft::FftEngine;
use super::history::SampleHistory;
use super::reducer::SpectralReducer;
use super::window::HannWindow;
use crate::config::PipelineConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Left, Channel::Right];

    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

/// Sample histories for both channels.
struct StereoHistory {
    /// FFT-length history per channel
    analysis: [SampleHistory; 2],
    /// Waveform-display history per channel
    waveform: [SampleHistory; 2],
}

impl StereoHistory {
    fn new(fft_size: usize, waveform_size: usize) -> Self {
        Self {
            analysis: [SampleHistory::new(fft_size), SampleHistory::new(fft_size)],
            waveform: [SampleHistory::new(waveform_size), SampleHistory::new(waveform_size)],
        }
    }

    #[inline]
    fn push(&mut self, left: f32, right: f32) {
        self.analysis[0].push(left);
        self.analysis[1].push(right);
        self.waveform[0].push(left);
        self.waveform[1].push(right);
    }

    fn ingest(&mut self, block: &[(f32, f32)]) {
        for &(left, right) in block {
            self.push(left, right);
        }
    }

    fn ingest_interleaved(&mut self, samples: &[f32]) {
        for frame in samples.chunks_exact(2) {
            self.push(frame[0], frame[1]);
        }
    }

    fn clear(&mut self) {
        for h in self.analysis.iter_mut().chain(self.waveform.iter_mut()) {
            h.clear();
        }
    }
}

type SharedHistory = Arc<Mutex<StereoHistory>>;

fn lock(history: &SharedHistory) -> MutexGuard<'_, StereoHistory> {
    // A panic elsewhere cannot leave sample data in an invalid state.
    history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write handle for the audio-producer thread.
#[derive(Clone)]
pub struct Ingestor {
    history: SharedHistory,
}

impl Ingestor {
    /// Append a block of (left, right) frames to every history.
    pub fn ingest(&self, block: &[(f32, f32)]) {
        lock(&self.history).ingest(block);
    }

    /// Append an interleaved `L R L R ...` buffer. A trailing odd sample is ignored.
    pub fn ingest_interleaved(&self, samples: &[f32]) {
        lock(&self.history).ingest_interleaved(samples);
    }
}

/// Per-channel working buffers, sized once from the configuration.
struct ChannelAnalyzer {
    snapshot: Vec<f32>,
    windowed: Vec<Complex<f32>>,
    fft: FftEngine,
    reduced: Vec<f32>,
}

impl ChannelAnalyzer {
    fn new(fft_size: usize, bin_count: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            snapshot: vec![0.0; fft_size],
            windowed: vec![Complex::new(0.0, 0.0); fft_size],
            fft: FftEngine::new(fft_size)?,
            reduced: vec![0.0; bin_count],
        })
    }

    fn run(&mut self, window: &HannWindow, reducer: &SpectralReducer) {
        window.apply(&self.snapshot, &mut self.windowed);
        let spectrum = self.fft.process(&self.windowed);
        reducer.reduce(spectrum, &mut self.reduced);
    }

    fn clear(&mut self) {
        self.snapshot.fill(0.0);
        self.windowed.fill(Complex::new(0.0, 0.0));
        self.fft.clear();
        self.reduced.fill(0.0);
    }
}

/// Reduced spectra for one frame, index-aligned across channels.
#[derive(Debug, Clone, Copy)]
pub struct StereoSpectrum<'a> {
    pub left: &'a [f32],
    pub right: &'a [f32],
}

impl<'a> StereoSpectrum<'a> {
    pub fn bin_count(&self) -> usize {
        self.left.len()
    }

    pub fn channel(&self, channel: Channel) -> &'a [f32] {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
        }
    }
}

/// Raw waveform history, oldest sample first.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSnapshot {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl WaveformSnapshot {
    pub fn channel(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    /// Largest absolute sample per channel.
    pub fn peak(&self, channel: Channel) -> f32 {
        self.channel(channel).iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    history: SharedHistory,
    window: HannWindow,
    reducer: SpectralReducer,
    channels: [ChannelAnalyzer; 2],
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let window = HannWindow::new(config.fft_size)?;
        let reducer = SpectralReducer::new(config.fft_size, config.group_step, config.log_compress)?;
        let bins = reducer.bin_count();
        let channels = [
            ChannelAnalyzer::new(config.fft_size, bins)?,
            ChannelAnalyzer::new(config.fft_size, bins)?,
        ];

        log::debug!(
            "Pipeline: fft_size={}, waveform_size={}, group_step={}, log_compress={}, groups={}",
            config.fft_size,
            config.waveform_size,
            config.group_step,
            config.log_compress,
            bins
        );

        Ok(Self {
            history: Arc::new(Mutex::new(StereoHistory::new(config.fft_size, config.waveform_size))),
            config,
            window,
            reducer,
            channels,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle for feeding samples from another thread.
    pub fn ingestor(&self) -> Ingestor {
        Ingestor {
            history: Arc::clone(&self.history),
        }
    }

    pub fn ingest(&self, block: &[(f32, f32)]) {
        lock(&self.history).ingest(block);
    }

    pub fn ingest_interleaved(&self, samples: &[f32]) {
        lock(&self.history).ingest_interleaved(samples);
    }

    /// Zero all history and derived buffers (track change, seek).
    pub fn reset(&mut self) {
        lock(&self.history).clear();
        for channel in &mut self.channels {
            channel.clear();
        }
        log::debug!("Pipeline reset");
    }

    /// Window, transform and reduce the current history of both channels.
    pub fn process(&mut self) -> StereoSpectrum<'_> {
        {
            let history = lock(&self.history);
            for (analyzer, source) in self.channels.iter_mut().zip(&history.analysis) {
                source.copy_ordered(&mut analyzer.snapshot);
            }
        }

        let window = &self.window;
        let reducer = &self.reducer;
        let [left, right] = &mut self.channels;
        if self.config.parallel_channels {
            rayon::join(|| left.run(window, reducer), || right.run(window, reducer));
        } else {
            left.run(window, reducer);
            right.run(window, reducer);
        }
        log::trace!("Processed frame: {} bins per channel", reducer.bin_count());

        self.spectrum()
    }

    /// Output of the most recent [`process`](Self::process) call.
    pub fn spectrum(&self) -> StereoSpectrum<'_> {
        StereoSpectrum {
            left: &self.channels[0].reduced,
            right: &self.channels[1].reduced,
        }
    }

    /// Full-length FFT output of the most recent process call.
    pub fn raw_spectrum(&self, channel: Channel) -> &[Complex<f32>] {
        self.channels[channel.index()].fft.output()
    }

    pub fn waveform_snapshot(&self) -> WaveformSnapshot {
        let history = lock(&self.history);
        WaveformSnapshot {
            left: history.waveform[0].to_vec(),
            right: history.waveform[1].to_vec(),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.reducer.bin_count()
    }

    /// FFT bins covered by reduced bin `index`.
    pub fn group_range(&self, index: usize) -> Option<Range<usize>> {
        self.reducer.groups().get(index).cloned()
    }

    /// Reduced bin holding FFT bin `bin`.
    pub fn group_of(&self, bin: usize) -> Option<usize> {
        self.reducer.group_of(bin)
    }

    /// Center frequency of FFT bin `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.config.fft_size as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn config(fft_size: usize, waveform_size: usize) -> PipelineConfig {
        PipelineConfig {
            fft_size,
            waveform_size,
            group_step: 1.01,
            log_compress: true,
            parallel_channels: false,
        }
    }

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<(f32, f32)> {
        (0..len)
            .map(|i| {
                let s = (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin();
                (s, s)
            })
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn rejects_invalid_config() {
        assert_eq!(
            Pipeline::new(config(1000, 64)).err(),
            Some(ConfigError::FftSizeNotPowerOfTwo(1000))
        );
        let mut cfg = config(1024, 64);
        cfg.group_step = 1.0;
        assert!(Pipeline::new(cfg).is_err());
    }

    #[test]
    fn sine_peaks_in_the_expected_group() {
        let mut pipeline = Pipeline::new(config(1024, 256)).unwrap();
        pipeline.ingest(&sine(440.0, 44100.0, 1024));

        let expected_bin = (440.0f32 * 1024.0 / 44100.0).round() as usize;
        assert_eq!(expected_bin, 10);
        let group = pipeline.group_of(expected_bin).unwrap();

        let spectrum = pipeline.process();
        for bins in [spectrum.left, spectrum.right] {
            assert_eq!(argmax(bins), group);
            assert_eq!(bins[group], 1.0);
        }
        assert_eq!(spectrum.left, spectrum.right);
        assert!(pipeline.group_range(group).unwrap().contains(&expected_bin));
    }

    #[test]
    fn channels_stay_independent() {
        let mut pipeline = Pipeline::new(config(1024, 64)).unwrap();
        let block: Vec<(f32, f32)> = sine(440.0, 44100.0, 1024)
            .into_iter()
            .zip(sine(3000.0, 44100.0, 1024))
            .map(|((l, _), (r, _))| (l, r))
            .collect();
        pipeline.ingest(&block);

        let spectrum = pipeline.process();
        let left_peak = argmax(spectrum.left);
        let right_peak = argmax(spectrum.right);
        assert_eq!(Some(left_peak), pipeline.group_of(10));
        let right_range = pipeline.group_range(right_peak).unwrap();
        assert!(right_range.contains(&70), "right peak at {:?}", right_range);
    }

    #[test]
    fn silence_yields_zero_bins() {
        let mut pipeline = Pipeline::new(config(512, 64)).unwrap();
        pipeline.ingest(&vec![(0.0, 0.0); 2048]);
        let bins = pipeline.bin_count();
        let spectrum = pipeline.process();
        assert_eq!(spectrum.bin_count(), bins);
        assert!(spectrum.left.iter().chain(spectrum.right).all(|&v| v == 0.0));
    }

    #[test]
    fn process_is_repeatable() {
        let mut pipeline = Pipeline::new(config(2048, 64)).unwrap();
        let noise: Vec<(f32, f32)> = (0..3000u32)
            .map(|i| {
                let x = (i.wrapping_mul(2654435761) >> 8) as f32 / (1u32 << 24) as f32;
                (x - 0.5, 0.5 - x)
            })
            .collect();
        pipeline.ingest(&noise);

        let first = pipeline.process();
        let (left, right) = (first.left.to_vec(), first.right.to_vec());
        let second = pipeline.process();
        assert_eq!(second.left, left.as_slice());
        assert_eq!(second.right, right.as_slice());
    }

    #[test]
    fn parallel_channels_match_sequential() {
        let block: Vec<(f32, f32)> = sine(1234.0, 48000.0, 4096)
            .into_iter()
            .zip(sine(220.0, 48000.0, 4096))
            .map(|((l, _), (r, _))| (l, 0.3 * r))
            .collect();

        let mut sequential = Pipeline::new(config(4096, 64)).unwrap();
        let mut cfg = config(4096, 64);
        cfg.parallel_channels = true;
        let mut parallel = Pipeline::new(cfg).unwrap();

        sequential.ingest(&block);
        parallel.ingest(&block);
        let a = sequential.process();
        let b = parallel.process();
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, b.right);
    }

    #[test]
    fn reduced_bins_are_normalized() {
        let mut pipeline = Pipeline::new(config(1024, 64)).unwrap();
        let block: Vec<(f32, f32)> = (0..1024)
            .map(|i| {
                let t = i as f32 / 44100.0;
                let l = (2.0 * std::f32::consts::PI * 100.0 * t).sin()
                    + 0.5 * (2.0 * std::f32::consts::PI * 5000.0 * t).sin();
                (l, 0.2 * l)
            })
            .collect();
        pipeline.ingest(&block);
        let spectrum = pipeline.process();
        for channel in Channel::ALL {
            let bins = spectrum.channel(channel);
            assert!(bins.iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert!(bins.iter().any(|&v| v == 1.0), "{:?} has no unit peak", channel);
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut pipeline = Pipeline::new(config(1024, 128)).unwrap();
        pipeline.ingest(&sine(440.0, 44100.0, 1500));
        pipeline.process();
        pipeline.reset();

        assert!(pipeline.spectrum().left.iter().all(|&v| v == 0.0));
        assert!(pipeline
            .raw_spectrum(Channel::Right)
            .iter()
            .all(|c| c.re == 0.0 && c.im == 0.0));
        let waveform = pipeline.waveform_snapshot();
        assert!(waveform.left.iter().chain(&waveform.right).all(|&s| s == 0.0));

        let spectrum = pipeline.process();
        assert!(spectrum.left.iter().chain(spectrum.right).all(|&v| v == 0.0));
    }

    #[test]
    fn waveform_has_its_own_length() {
        let pipeline = Pipeline::new(config(1024, 5)).unwrap();
        pipeline.ingest(&[(1.0, -1.0), (2.0, -2.0), (3.0, -3.0)]);
        let waveform = pipeline.waveform_snapshot();
        assert_eq!(waveform.left, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(waveform.right, vec![0.0, 0.0, -1.0, -2.0, -3.0]);
        assert_eq!(waveform.peak(Channel::Right), 3.0);
    }

    #[test]
    fn interleaved_input_matches_pairs() {
        let a = Pipeline::new(config(64, 8)).unwrap();
        let b = Pipeline::new(config(64, 8)).unwrap();
        a.ingest(&[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);
        b.ingest_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);
        assert_eq!(a.waveform_snapshot(), b.waveform_snapshot());
    }

    #[test]
    fn bin_frequency_scales_with_rate() {
        let pipeline = Pipeline::new(config(1024, 8)).unwrap();
        assert_eq!(pipeline.bin_frequency(0, 44100), 0.0);
        assert!((pipeline.bin_frequency(512, 44100) - 22050.0).abs() < 1e-3);
    }

    /// Every block written by the producer is constant-valued and
    /// `BLOCK` frames long, and the waveform length is a multiple of it, so
    /// any consistent snapshot is made of whole runs of `BLOCK` equal values.
    #[test]
    fn concurrent_ingest_never_tears_snapshots() {
        const BLOCK: usize = 64;
        const WAVEFORM: usize = BLOCK * 8;
        const BLOCKS: usize = 4000;

        let mut pipeline = Pipeline::new(config(1024, WAVEFORM)).unwrap();
        let ingestor = pipeline.ingestor();
        let done = Arc::new(AtomicBool::new(false));
        let writer_done = Arc::clone(&done);

        let writer = thread::spawn(move || {
            for k in 1..=BLOCKS {
                let value = k as f32;
                ingestor.ingest(&vec![(value, -value); BLOCK]);
            }
            writer_done.store(true, Ordering::Release);
        });

        let mut checked = 0usize;
        while !done.load(Ordering::Acquire) || checked == 0 {
            let snapshot = pipeline.waveform_snapshot();
            assert_eq!(snapshot.left.len(), WAVEFORM);

            let checksum_left: f64 = snapshot.left.iter().map(|&v| v as f64).sum();
            let checksum_right: f64 = snapshot.right.iter().map(|&v| v as f64).sum();
            assert_eq!(checksum_left, -checksum_right);

            for run in snapshot.left.chunks(BLOCK) {
                assert!(run.iter().all(|&v| v == run[0]), "torn block: {:?}", run);
            }

            let spectrum = pipeline.process();
            assert_eq!(spectrum.left, spectrum.right);
            assert!(spectrum.left.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
            checked += 1;
        }

        writer.join().unwrap();
        assert!(checked > 0);
    }
}
