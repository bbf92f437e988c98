use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded track as (left, right) frames.
pub struct StereoAudio {
    pub frames: Vec<(f32, f32)>,
    pub sample_rate: u32,
}

impl StereoAudio {
    pub fn duration(&self) -> f32 {
        self.frames.len() as f32 / self.sample_rate as f32
    }
}

pub fn decode_stereo(path: &Path) -> Result<StereoAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut frames: Vec<(f32, f32)> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log::debug!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        frames.extend(to_stereo(sample_buf.samples(), spec.channels.count()));
    }

    let audio = StereoAudio { frames, sample_rate };
    log::info!(
        "Decoded audio: {} frames, {} channel(s), {}Hz, {:.1}s",
        audio.frames.len(),
        channels,
        sample_rate,
        audio.duration()
    );

    Ok(audio)
}

/// Mono is duplicated to both sides; channels past the second are dropped.
fn to_stereo(interleaved: &[f32], channels: usize) -> impl Iterator<Item = (f32, f32)> + '_ {
    interleaved.chunks_exact(channels.max(1)).map(|frame| match frame {
        [mono] => (*mono, *mono),
        [left, right, ..] => (*left, *right),
        [] => (0.0, 0.0),
    })
}
