mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cli::Cli;
use sonoscope::audio::decode::{decode_stereo, StereoAudio};
use sonoscope::config::{self, Config, PlaybackConfig};
use sonoscope::{Channel, Ingestor, Pipeline, StereoSpectrum};

/// One rendered frame, as written to `--output`.
#[derive(Serialize)]
struct FrameRecord<'a> {
    track: usize,
    frame: usize,
    time: f32,
    left: &'a [f32],
    right: &'a [f32],
    waveform_peak: [f32; 2],
}

/// Per-track tally of which reduced bin was loudest.
struct TrackSummary {
    frames: usize,
    dominant: Vec<[usize; 2]>,
}

impl TrackSummary {
    fn new(bin_count: usize) -> Self {
        Self {
            frames: 0,
            dominant: vec![[0, 0]; bin_count],
        }
    }

    fn record(&mut self, spectrum: &StereoSpectrum<'_>) {
        self.frames += 1;
        for channel in Channel::ALL {
            if let Some(bin) = loudest(spectrum.channel(channel)) {
                self.dominant[bin][channel.index()] += 1;
            }
        }
    }

    fn most_common(&self, channel: Channel) -> Option<usize> {
        let (bin, count) = self
            .dominant
            .iter()
            .enumerate()
            .map(|(bin, counts)| (bin, counts[channel.index()]))
            .max_by_key(|&(_, count)| count)?;
        (count > 0).then_some(bin)
    }
}

/// Index of the largest non-zero bin.
fn loudest(bins: &[f32]) -> Option<usize> {
    bins.iter()
        .enumerate()
        .filter(|(_, v)| **v > 0.0)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Optional JSON Lines frame writer.
struct FrameSink {
    writer: Option<BufWriter<File>>,
}

impl FrameSink {
    fn open(path: Option<&PathBuf>) -> Result<Self> {
        let writer = match path {
            Some(path) => Some(BufWriter::new(
                File::create(path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?,
            )),
            None => None,
        };
        Ok(Self { writer })
    }

    fn write(&mut self, record: &FrameRecord<'_>) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            serde_json::to_writer(&mut *writer, record).context("Failed to serialize frame")?;
            writer.write_all(b"\n").context("Failed to write frame")?;
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if let Some(mut writer) = self.writer {
            writer.flush().context("Failed to flush output")?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Explicit --config path, or auto-detect sonoscope.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("sonoscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("sonoscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("sonoscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut cfg = Config::default();
    if let Some(ref path) = config_path {
        if let Some(loaded) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    apply_overrides(&cli, &mut cfg);

    let mut pipeline = Pipeline::new(cfg.pipeline.clone()).context("Invalid pipeline configuration")?;
    log::info!(
        "Pipeline: fft_size={}, waveform_size={}, {} groups (step {}), {} scale",
        cfg.pipeline.fft_size,
        cfg.pipeline.waveform_size,
        pipeline.bin_count(),
        cfg.pipeline.group_step,
        if cfg.pipeline.log_compress { "log" } else { "linear" }
    );
    log::info!(
        "Playback: {}fps, {} frame blocks, {}",
        cfg.playback.fps,
        cfg.playback.block_size,
        if cli.realtime { "realtime" } else { "offline" }
    );

    let mut sink = FrameSink::open(cli.output.as_ref())?;

    for (track_idx, path) in cli.tracks.iter().enumerate() {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
        log::info!("Track {}: {}", track_idx, path.display());
        let audio = decode_stereo(path)?;

        if track_idx > 0 {
            pipeline.reset();
        }

        let summary = if cli.realtime {
            play_realtime(&mut pipeline, &audio, &cfg.playback, track_idx, &mut sink)?
        } else {
            play_offline(&mut pipeline, &audio, &cfg.playback, track_idx, &mut sink)?
        };
        log_summary(&pipeline, &summary, audio.sample_rate);
    }

    sink.finish()?;
    if let Some(ref output) = cli.output {
        log::info!("Done! Output: {}", output.display());
    }
    Ok(())
}

fn apply_overrides(cli: &Cli, cfg: &mut Config) {
    if let Some(fps) = cli.fps {
        cfg.playback.fps = fps;
    }
    if let Some(block_size) = cli.block_size {
        cfg.playback.block_size = block_size;
    }
    if let Some(fft_size) = cli.fft_size {
        cfg.pipeline.fft_size = fft_size;
    }
    if let Some(waveform_size) = cli.waveform_size {
        cfg.pipeline.waveform_size = waveform_size;
    }
    if let Some(group_step) = cli.group_step {
        cfg.pipeline.group_step = group_step;
    }
    if cli.linear {
        cfg.pipeline.log_compress = false;
    }
    if cli.parallel {
        cfg.pipeline.parallel_channels = true;
    }
    cfg.playback.fps = cfg.playback.fps.max(1);
    cfg.playback.block_size = cfg.playback.block_size.max(1);
}

fn progress_bar(total_frames: usize) -> ProgressBar {
    let pb = ProgressBar::new(total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Analyze and emit one frame from the pipeline's current state.
fn render_frame(
    pipeline: &mut Pipeline,
    track: usize,
    frame: usize,
    time: f32,
    sink: &mut FrameSink,
    summary: &mut TrackSummary,
) -> Result<()> {
    let waveform = pipeline.waveform_snapshot();
    let spectrum = pipeline.process();
    summary.record(&spectrum);
    sink.write(&FrameRecord {
        track,
        frame,
        time,
        left: spectrum.left,
        right: spectrum.right,
        waveform_peak: [waveform.peak(Channel::Left), waveform.peak(Channel::Right)],
    })
}

/// Deterministic playback: each frame ingests exactly one frame's worth of audio.
fn play_offline(
    pipeline: &mut Pipeline,
    audio: &StereoAudio,
    playback: &PlaybackConfig,
    track: usize,
    sink: &mut FrameSink,
) -> Result<TrackSummary> {
    let samples_per_frame = (audio.sample_rate as usize / playback.fps as usize).max(1);
    let total_frames = audio.frames.len().div_ceil(samples_per_frame);
    let mut summary = TrackSummary::new(pipeline.bin_count());
    let pb = progress_bar(total_frames);

    let mut consumed = 0usize;
    for (frame_idx, chunk) in audio.frames.chunks(samples_per_frame).enumerate() {
        for block in chunk.chunks(playback.block_size) {
            pipeline.ingest(block);
        }
        consumed += chunk.len();
        let time = consumed as f32 / audio.sample_rate as f32;
        render_frame(pipeline, track, frame_idx, time, sink, &mut summary)?;
        pb.set_position(frame_idx as u64 + 1);
    }

    pb.finish_and_clear();
    Ok(summary)
}

/// Feed `frames` to the pipeline one block at a time, paced at the audio
/// rate. Returns early once `stop` is raised; `finished` is set either way.
fn feed_blocks(
    ingestor: Ingestor,
    frames: &[(f32, f32)],
    block_size: usize,
    sample_rate: u32,
    stop: &AtomicBool,
    finished: &AtomicBool,
) {
    let block_duration = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);
    let start = Instant::now();
    for (i, block) in frames.chunks(block_size).enumerate() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        ingestor.ingest(block);
        let due = start + block_duration.mul_f64((i + 1) as f64);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
    finished.store(true, Ordering::Release);
}

/// Producer thread feeds blocks at the audio cadence while this thread
/// renders at the configured frame rate.
fn play_realtime(
    pipeline: &mut Pipeline,
    audio: &StereoAudio,
    playback: &PlaybackConfig,
    track: usize,
    sink: &mut FrameSink,
) -> Result<TrackSummary> {
    let finished = AtomicBool::new(false);
    let stop = AtomicBool::new(false);
    let total_frames = (audio.duration() * playback.fps as f32).ceil() as usize;
    let mut summary = TrackSummary::new(pipeline.bin_count());
    let pb = progress_bar(total_frames);

    thread::scope(|scope| -> Result<()> {
        let ingestor = pipeline.ingestor();
        let (finished, stop) = (&finished, &stop);
        let frames = &audio.frames;
        let block_size = playback.block_size;
        let sample_rate = audio.sample_rate;
        scope.spawn(move || feed_blocks(ingestor, frames, block_size, sample_rate, stop, finished));

        let mut render = || -> Result<()> {
            let frame_duration = Duration::from_secs_f64(1.0 / playback.fps as f64);
            let start = Instant::now();
            let mut frame_idx = 0usize;
            while !finished.load(Ordering::Acquire) {
                let time = start.elapsed().as_secs_f32();
                render_frame(pipeline, track, frame_idx, time, sink, &mut summary)?;
                frame_idx += 1;
                pb.set_position(frame_idx as u64);

                let due = start + frame_duration.mul_f64(frame_idx as f64);
                if let Some(wait) = due.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
            // The last blocks can land after the previous frame was taken.
            let time = start.elapsed().as_secs_f32();
            render_frame(pipeline, track, frame_idx, time, sink, &mut summary)?;
            pb.set_position(frame_idx as u64 + 1);
            Ok(())
        };
        let rendered = render();
        stop.store(true, Ordering::Release);
        rendered
    })?;

    pb.finish_and_clear();
    Ok(summary)
}

fn log_summary(pipeline: &Pipeline, summary: &TrackSummary, sample_rate: u32) {
    let describe = |channel: Channel| match summary
        .most_common(channel)
        .and_then(|bin| pipeline.group_range(bin).map(|range| (bin, range)))
    {
        Some((bin, range)) => format!(
            "bin {} ({:.0}-{:.0} Hz)",
            bin,
            pipeline.bin_frequency(range.start, sample_rate),
            pipeline.bin_frequency(range.end, sample_rate)
        ),
        None => "silent".to_string(),
    };

    log::info!(
        "Rendered {} frames; most frequent peak L: {}, R: {}",
        summary.frames,
        describe(Channel::Left),
        describe(Channel::Right)
    );
}
