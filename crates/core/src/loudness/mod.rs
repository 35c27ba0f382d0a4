//! Integrated loudness measurement and the fixed-target normalizer.
//!
//! Measurement is the gated ITU-R BS.1770 / EBU R128 integrated loudness as
//! computed by `ebur128`; this module only applies the resulting gain.

use std::path::{Path, PathBuf};

use ebur128::{EbuR128, Mode};
use tracing::{debug, info, warn};

use crate::audio::{self, AudioBuffer, OutputFormat};
use crate::{MixerError, Result};

/// Loudness every normalized file is moved to.
pub const TARGET_LOUDNESS_LUFS: f64 = -14.0;

/// Preset used when the caller does not name one.
pub const DEFAULT_PRESET: &str = "car-wash";

/// Measures the gated integrated loudness of `buffer` in LUFS.
///
/// Fails with [`MixerError::EmptyInput`] when no 400 ms block clears the
/// absolute gate (digital silence or a clip shorter than one block), since
/// the meter then reports negative infinity.
pub fn integrated_loudness(buffer: &AudioBuffer) -> Result<f64> {
    let mut meter = EbuR128::new(buffer.channels() as u32, buffer.sample_rate(), Mode::I)
        .map_err(|err| MixerError::UnsupportedFormat(format!("loudness meter: {err}")))?;
    meter
        .add_frames_f32(buffer.samples())
        .map_err(|err| MixerError::UnsupportedFormat(format!("loudness meter: {err}")))?;

    let loudness = meter
        .loudness_global()
        .map_err(|err| MixerError::UnsupportedFormat(format!("loudness meter: {err}")))?;
    if !loudness.is_finite() {
        return Err(MixerError::EmptyInput(format!(
            "no audible 400 ms block in {:.3}s of audio",
            buffer.duration_seconds()
        )));
    }

    debug!(
        frames = buffer.frames(),
        channels = buffer.channels(),
        loudness,
        "measured integrated loudness"
    );
    Ok(loudness)
}

/// Linear gain that moves `measured` LUFS to `target` LUFS.
pub fn gain_for(measured: f64, target: f64) -> f64 {
    10f64.powf((target - measured) / 20.0)
}

/// Scales every sample in place and returns how many ended up beyond full
/// scale. Export clamps those samples.
pub fn apply_gain(buffer: &mut AudioBuffer, gain: f64) -> usize {
    let mut clipped = 0;
    for sample in buffer.samples_mut() {
        let scaled = (*sample as f64 * gain) as f32;
        if scaled.abs() > 1.0 {
            clipped += 1;
        }
        *sample = scaled;
    }
    clipped
}

/// Normalizes `input` to [`TARGET_LOUDNESS_LUFS`] and writes it to `output`.
///
/// Returns the loudness measured *before* normalization. `preset` is recorded
/// in the logs only. The result is written to a sibling `.partial` file and
/// renamed into place, so a failed run leaves no file at `output`.
pub fn normalize(input: &Path, output: &Path, preset: &str) -> Result<f64> {
    let format = OutputFormat::from_path(output)?;
    let mut buffer = audio::decode_file(input)?;

    let original = integrated_loudness(&buffer)?;
    let gain = gain_for(original, TARGET_LOUDNESS_LUFS);

    let clipped = apply_gain(&mut buffer, gain);
    if clipped > 0 {
        warn!(clipped, "normalization pushed samples past full scale; clamping");
    }

    let partial = partial_path(output);
    let written = audio::write_audio(&partial, &buffer, format).and_then(|_| std::fs::rename(&partial, output).map_err(MixerError::from));

    if let Err(err) = written {
        let _ = std::fs::remove_file(&partial);
        return Err(match err {
            MixerError::Io(io) => MixerError::EncodeFailure(io.to_string()),
            other => other,
        });
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        preset,
        ?format,
        original_lufs = original,
        gain_db = 20.0 * gain.log10(),
        "normalized audio"
    );
    Ok(original)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(sample_rate: u32, channels: u16, seconds: f64, amplitude: f64) -> Vec<f32> {
        let frames = (sample_rate as f64 * seconds) as usize;
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for n in 0..frames {
            let value = amplitude * (2.0 * PI * 1000.0 * n as f64 / sample_rate as f64).sin();
            for _ in 0..channels {
                samples.push(value as f32);
            }
        }
        samples
    }

    fn write_sine(path: &Path, sample_rate: u32, bits: u16, amplitude: f64) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let scale = (1_i64 << (bits - 1)) as f32 - 1.0;
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for sample in sine(sample_rate, 2, 3.0, amplitude) {
            let value = (sample * scale).round() as i32;
            if bits == 16 {
                writer.write_sample(value as i16).unwrap();
            } else {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn measure(path: &Path) -> f64 {
        integrated_loudness(&audio::decode_file(path).unwrap()).unwrap()
    }

    #[test]
    fn reference_tone_reads_its_level() {
        // Stereo 1 kHz tone at -23 dBFS reads -23 LUFS.
        let amplitude = 10f64.powf(-23.0 / 20.0);
        let buffer = AudioBuffer::new(48_000, 2, 16, sine(48_000, 2, 3.0, amplitude)).unwrap();

        let loudness = integrated_loudness(&buffer).unwrap();
        assert!((loudness - -23.0).abs() < 0.2, "measured {loudness}");
    }

    #[test]
    fn measurement_tracks_gain() {
        let quiet = AudioBuffer::new(44_100, 1, 16, sine(44_100, 1, 2.0, 0.05)).unwrap();
        let loud = AudioBuffer::new(44_100, 1, 16, sine(44_100, 1, 2.0, 0.1)).unwrap();

        let delta = integrated_loudness(&loud).unwrap() - integrated_loudness(&quiet).unwrap();
        assert!((delta - 6.02).abs() < 0.05, "delta {delta}");
    }

    #[test]
    fn silence_and_short_clips_are_empty() {
        let silent = AudioBuffer::new(48_000, 2, 16, vec![0.0; 48_000 * 2]).unwrap();
        assert!(matches!(
            integrated_loudness(&silent),
            Err(MixerError::EmptyInput(_))
        ));

        let short = AudioBuffer::new(48_000, 1, 16, sine(48_000, 1, 0.1, 0.5)).unwrap();
        assert!(matches!(
            integrated_loudness(&short),
            Err(MixerError::EmptyInput(_))
        ));
    }

    #[test]
    fn gain_counts_clipped_samples() {
        let mut buffer = AudioBuffer::new(8_000, 1, 16, vec![0.25, -0.5, 0.75, 0.0]).unwrap();
        let clipped = apply_gain(&mut buffer, 2.0);
        assert_eq!(clipped, 1);
        assert_eq!(buffer.samples(), &[0.5, -1.0, 1.5, 0.0]);
    }

    #[test]
    fn normalizes_file_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_sine(&input, 48_000, 16, 0.1);

        let original = normalize(&input, &output, DEFAULT_PRESET).unwrap();
        assert!((original - -20.0).abs() < 0.2, "original {original}");
        assert!(!partial_path(&output).exists());

        let rendered = audio::decode_file(&output).unwrap();
        assert_eq!(rendered.channels(), 2);
        assert_eq!(rendered.bit_depth(), 16);
        let after = measure(&output);
        assert!((after - TARGET_LOUDNESS_LUFS).abs() < 0.1, "after {after}");
    }

    #[test]
    fn keeps_24_bit_sources_at_24_bits() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in24.wav");
        let output = dir.path().join("out24.wav");
        write_sine(&input, 48_000, 24, 0.1);

        normalize(&input, &output, DEFAULT_PRESET).unwrap();

        let rendered = audio::decode_file(&output).unwrap();
        assert_eq!(rendered.bit_depth(), 24);
        let after = integrated_loudness(&rendered).unwrap();
        assert!((after - TARGET_LOUDNESS_LUFS).abs() < 0.1, "after {after}");
    }

    #[test]
    fn normalizes_into_flac_and_mp3() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_sine(&input, 48_000, 16, 0.1);

        let flac = dir.path().join("out.flac");
        normalize(&input, &flac, DEFAULT_PRESET).unwrap();
        let after = measure(&flac);
        assert!((after - TARGET_LOUDNESS_LUFS).abs() < 0.1, "flac {after}");

        let mp3 = dir.path().join("out.mp3");
        normalize(&input, &mp3, DEFAULT_PRESET).unwrap();
        assert!(!partial_path(&mp3).exists());
        let after = measure(&mp3);
        assert!((after - TARGET_LOUDNESS_LUFS).abs() < 0.5, "mp3 {after}");
    }

    #[test]
    fn unencodable_output_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.ogg");
        write_sine(&input, 48_000, 16, 0.1);

        let err = normalize(&input, &output, DEFAULT_PRESET).unwrap_err();
        assert!(matches!(err, MixerError::EncodeFailure(_)));
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn missing_output_directory_is_an_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("no/such/dir/out.wav");
        write_sine(&input, 48_000, 16, 0.1);

        let err = normalize(&input, &output, DEFAULT_PRESET).unwrap_err();
        assert!(matches!(err, MixerError::EncodeFailure(_)));
    }
}
