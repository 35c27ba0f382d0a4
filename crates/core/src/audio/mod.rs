//! PCM buffers plus the decode and export paths used by the normalizer.

use std::fmt;
use std::fs::File;
use std::path::Path;

use flacenc::component::BitRepr;
use flacenc::error::Verify;
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::{MixerError, Result};

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Integer width used when the source carries no bit depth (lossy codecs).
pub const DEFAULT_BIT_DEPTH: u16 = 16;

/// Decoded, interleaved PCM audio held entirely in memory.
///
/// Samples are normalised to `[-1.0, 1.0]`. `bit_depth` remembers the integer
/// width of the source so that export can quantize back to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    bit_depth: u16,
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// Builds a buffer after checking the sample-rate range, the channel
    /// layout and that the samples split into whole frames.
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16, samples: Vec<f32>) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(MixerError::UnsupportedFormat(format!(
                "sample rate {sample_rate} Hz outside {MIN_SAMPLE_RATE}-{MAX_SAMPLE_RATE} Hz"
            )));
        }
        if !(1..=2).contains(&channels) {
            return Err(MixerError::UnsupportedFormat(format!(
                "{channels} channels; only mono and stereo are supported"
            )));
        }
        if samples.is_empty() {
            return Err(MixerError::EmptyInput("audio contains no samples".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(MixerError::UnsupportedFormat(format!(
                "{} samples do not form whole {channels}-channel frames",
                samples.len()
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            bit_depth: quantization_depth(bit_depth),
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Copies one channel out of the interleaved data.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels as usize)
            .map(|&sample| sample as f64)
            .collect()
    }
}

/// Integer widths export can reproduce; anything else falls back to 16 bit.
fn quantization_depth(bits: u16) -> u16 {
    match bits {
        8 | 16 | 24 | 32 => bits,
        _ => DEFAULT_BIT_DEPTH,
    }
}

/// Decodes an entire audio file into memory.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(MixerError::NotFound(path.to_path_buf()));
    }
    debug!(path = %path.display(), "decoding audio file");

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| MixerError::UnsupportedFormat(format!("cannot read container of {}: {err}", path.display())))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MixerError::UnsupportedFormat("no audio track found".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|err| MixerError::UnsupportedFormat(format!("no decoder: {err}")))?;

    let mut sample_rate = params.sample_rate;
    let mut channels = params.channels.map(|layout| layout.count());
    let bit_depth = params
        .bits_per_sample
        .map(|bits| bits as u16)
        .unwrap_or(DEFAULT_BIT_DEPTH);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(MixerError::UnsupportedFormat(format!(
                    "failed reading packet: {err}"
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());

                let mut block = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                block.copy_interleaved_ref(decoded);
                samples.extend_from_slice(block.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "skipping undecodable packet");
            }
            Err(err) => {
                return Err(MixerError::UnsupportedFormat(format!("decode failed: {err}")));
            }
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| MixerError::UnsupportedFormat("sample rate unknown".into()))?;
    let channels = channels
        .ok_or_else(|| MixerError::UnsupportedFormat("channel layout unknown".into()))?;
    let channels = u16::try_from(channels)
        .map_err(|_| MixerError::UnsupportedFormat(format!("{channels} channels")))?;

    debug!(
        sample_rate,
        channels,
        bit_depth,
        frames = samples.len() / channels.max(1) as usize,
        "decoded audio"
    );

    AudioBuffer::new(sample_rate, channels, bit_depth, samples)
}

/// Fixed bitrate used for lossy targets.
pub const LOSSY_BITRATE_KBPS: u32 = 192;

/// Widest sample the FLAC encoder accepts.
const MAX_FLAC_BIT_DEPTH: u16 = 24;

/// Container and codec inferred from an output path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    Flac,
    Mp3,
}

/// Lossy containers symphonia can read but nothing here can write.
const UNENCODABLE_EXTENSIONS: &[&str] = &["ogg", "oga", "aac", "m4a", "opus"];

impl OutputFormat {
    /// Infers the format from the extension of `path`, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("wav") | Some("wave") => Ok(Self::Wav),
            Some("flac") => Ok(Self::Flac),
            Some("mp3") => Ok(Self::Mp3),
            Some(ext) if UNENCODABLE_EXTENSIONS.contains(&ext) => Err(MixerError::EncodeFailure(
                format!("no encoder available for `{ext}` output"),
            )),
            Some(ext) => Err(MixerError::EncodeFailure(format!(
                "unknown output container `{ext}`"
            ))),
            None => Err(MixerError::EncodeFailure(format!(
                "cannot infer output container for {}",
                path.display()
            ))),
        }
    }

    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Mp3)
    }

    /// Bitrate the encoder is pinned to, for lossy formats only.
    pub fn bitrate_kbps(self) -> Option<u32> {
        self.is_lossy().then_some(LOSSY_BITRATE_KBPS)
    }
}

/// Encodes `buffer` to `path` in `format`.
pub fn write_audio(path: &Path, buffer: &AudioBuffer, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), ?format, bit_depth = buffer.bit_depth(), "encoding audio");
    match format {
        OutputFormat::Wav => write_wav(path, buffer),
        OutputFormat::Flac => write_flac(path, buffer),
        OutputFormat::Mp3 => write_mp3(path, buffer),
    }
}

/// Writes `buffer` to `path` as integer PCM WAV at the buffer's bit depth.
/// Out of range samples are clamped to full scale.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: buffer.bit_depth(),
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    match buffer.bit_depth() {
        8 => {
            for &sample in buffer.samples() {
                writer.write_sample(quantize(sample, 8) as i8)?;
            }
        }
        16 => {
            for &sample in buffer.samples() {
                writer.write_sample(quantize(sample, 16) as i16)?;
            }
        }
        bits => {
            for &sample in buffer.samples() {
                writer.write_sample(quantize(sample, bits))?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Writes `buffer` as FLAC. 32-bit sources are stored at 24 bits.
pub fn write_flac(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let bits = buffer.bit_depth().min(MAX_FLAC_BIT_DEPTH);
    let samples: Vec<i32> = buffer
        .samples()
        .iter()
        .map(|&sample| quantize(sample, bits))
        .collect();

    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, err)| MixerError::EncodeFailure(format!("flac config: {err:?}")))?;
    let source = flacenc::source::MemSource::from_samples(
        &samples,
        buffer.channels() as usize,
        bits as usize,
        buffer.sample_rate() as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|err| MixerError::EncodeFailure(format!("flac encode: {err:?}")))?;

    let mut sink = flacenc::bitsink::ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|_| MixerError::EncodeFailure("flac stream could not be serialized".into()))?;
    std::fs::write(path, sink.as_slice())?;
    Ok(())
}

/// Writes `buffer` as constant-bitrate MP3 at [`LOSSY_BITRATE_KBPS`].
pub fn write_mp3(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let lame = |err: &dyn fmt::Debug| MixerError::EncodeFailure(format!("mp3 encoder: {err:?}"));

    let mut builder = Builder::new()
        .ok_or_else(|| MixerError::EncodeFailure("mp3 encoder could not be allocated".into()))?;
    builder
        .set_num_channels(buffer.channels() as u8)
        .map_err(|err| lame(&err))?;
    builder
        .set_sample_rate(buffer.sample_rate())
        .map_err(|err| lame(&err))?;
    builder.set_brate(Bitrate::Kbps192).map_err(|err| lame(&err))?;
    let mut encoder = builder.build().map_err(|err| lame(&err))?;

    let pcm: Vec<i16> = buffer
        .samples()
        .iter()
        .map(|&sample| quantize(sample, 16) as i16)
        .collect();

    let mut encoded = Vec::new();
    match buffer.channels() {
        1 => encoder.encode_to_vec(MonoPcm(&pcm), &mut encoded),
        _ => encoder.encode_to_vec(InterleavedPcm(&pcm), &mut encoded),
    }
    .map_err(|err| lame(&err))?;
    encoder
        .flush_to_vec::<FlushNoGap>(&mut encoded)
        .map_err(|err| lame(&err))?;

    std::fs::write(path, encoded)?;
    Ok(())
}

fn quantize(sample: f32, bits: u16) -> i32 {
    let scale = (1_u64 << (bits - 1)) as f64;
    (sample as f64 * scale).round().clamp(-scale, scale - 1.0) as i32
}
