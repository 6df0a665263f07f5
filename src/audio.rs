//! Audio decoding: any container symphonia understands in, 16 kHz mono
//! f32 samples out, which is the only input format the model accepts.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Decoded source audio, already mixed down and resampled for the model.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples at [`WHISPER_SAMPLE_RATE`].
    pub samples: Vec<f32>,
    /// Length of the source audio, from the source sample rate.
    pub duration_seconds: f64,
}

impl DecodedAudio {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds / 60.0
    }
}

/// Decode a local audio file to mono 16 kHz samples.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("Failed to probe audio format of {}: {}", path.display(), e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No audio track in {}", path.display()))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("Failed to create decoder: {}", e))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(err) => return Err(anyhow!("Decode error: {}", err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => mono.extend(mix_to_mono(decoded)),
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => decoder.reset(),
            Err(err) => return Err(anyhow!("Decode error: {}", err)),
        }
    }

    if mono.is_empty() {
        bail!("No audio samples decoded from {}", path.display());
    }

    let duration_seconds = mono.len() as f64 / sample_rate as f64;
    let samples = resample(&mono, WHISPER_SAMPLE_RATE as f32 / sample_rate as f32);

    Ok(DecodedAudio {
        samples,
        duration_seconds,
    })
}

/// Average the channel planes position-wise into one mono stream.
fn mix_to_mono(buffer: AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => mix_planes(buf.planes().planes(), |s| s),
        AudioBufferRef::F64(buf) => mix_planes(buf.planes().planes(), |s| s as f32),
        AudioBufferRef::S32(buf) => {
            mix_planes(buf.planes().planes(), |s| s as f32 / i32::MAX as f32)
        }
        AudioBufferRef::S16(buf) => {
            mix_planes(buf.planes().planes(), |s| s as f32 / i16::MAX as f32)
        }
        // Remaining sample layouts do not occur in the audio we ingest.
        _ => Vec::new(),
    }
}

fn mix_planes<S: Copy>(planes: &[&[S]], to_f32: impl Fn(S) -> f32) -> Vec<f32> {
    let frames = match planes.first() {
        Some(first) => first.len(),
        None => return Vec::new(),
    };
    let mut mono = Vec::with_capacity(frames);
    for i in 0..frames {
        let sum: f32 = planes.iter().map(|plane| to_f32(plane[i])).sum();
        mono.push(sum / planes.len() as f32);
    }
    mono
}

/// Linear-interpolation resampler; good enough for speech into the model.
fn resample(samples: &[f32], ratio: f32) -> Vec<f32> {
    if ratio == 1.0 {
        return samples.to_vec();
    }

    let new_len = (samples.len() as f32 * ratio) as usize;
    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx as usize;
        let frac = src_idx - idx as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.last().copied().unwrap_or(0.0)
        };
        resampled.push(sample);
    }
    resampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, frames: usize) -> PathBuf {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = dir.join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            // Left: a 440 Hz tone; right (if present): its inverse.
            let t = i as f32 / sample_rate as f32;
            let tone = (0.8 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 32767.0) as i16;
            writer.write_sample(tone).unwrap();
            if channels == 2 {
                writer.write_sample(-tone).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn mono_16k_decodes_without_resampling() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 1, WHISPER_SAMPLE_RATE, 16_000);

        let decoded = decode_audio(&path).unwrap();
        assert_eq!(decoded.samples.len(), 16_000);
        assert!((decoded.duration_seconds - 1.0).abs() < 1e-6);
        assert!((decoded.duration_minutes() - 1.0 / 60.0).abs() < 1e-6);

        let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.5, "expected real signal, peak was {}", peak);
    }

    #[test]
    fn stereo_is_mixed_down_and_resampled() {
        let dir = tempfile::tempdir().unwrap();
        // Opposite-phase channels cancel to silence in the mono mix.
        let path = write_wav(dir.path(), "stereo.wav", 2, 32_000, 32_000);

        let decoded = decode_audio(&path).unwrap();
        assert!((decoded.duration_seconds - 1.0).abs() < 1e-3);
        let expected_len = (32_000.0f32 * 0.5) as usize;
        assert!((decoded.samples.len() as i64 - expected_len as i64).abs() <= 1);

        let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak < 1e-3, "mix of opposite channels should cancel, peak was {}", peak);
    }

    #[test]
    fn resample_is_identity_at_ratio_one() {
        let samples = vec![0.0, 0.5, -0.5, 0.25];
        assert_eq!(resample(&samples, 1.0), samples);
    }

    #[test]
    fn resample_halves_and_doubles_length() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 100.0).sin()).collect();
        assert_eq!(resample(&samples, 0.5).len(), 500);
        assert_eq!(resample(&samples, 2.0).len(), 2000);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(decode_audio(Path::new("/nonexistent/audio.m4a")).is_err());
    }
}
