use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sonoscope", about = "Stereo spectrum analyzer for music visualizers")]
pub struct Cli {
    /// Audio files to play in order (WAV, MP3, FLAC, OGG)
    #[arg(required = true)]
    pub tracks: Vec<PathBuf>,

    /// Write one JSON object per rendered frame to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./sonoscope.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Rendered frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Frames per ingested audio block
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Analysis window length (power of two)
    #[arg(long)]
    pub fft_size: Option<usize>,

    /// Waveform history length
    #[arg(long)]
    pub waveform_size: Option<usize>,

    /// Growth factor between frequency groups (> 1.0)
    #[arg(long)]
    pub group_step: Option<f32>,

    /// Skip log compression of group peaks
    #[arg(long)]
    pub linear: bool,

    /// Analyze left and right channels on separate threads
    #[arg(long)]
    pub parallel: bool,

    /// Feed audio from a producer thread at playback speed
    #[arg(long)]
    pub realtime: bool,
}
