//! PCM-to-WAV container encoding.
//!
//! The recognition service accepts self-contained audio files, so each
//! scheduled chunk of float PCM is packed into a 16-bit WAV. Encoding never
//! fails: a degenerate input still yields a valid, decodable container, and
//! a writer failure falls back to a hand-assembled empty-audio file. A bad
//! chunk costs one recognition window; an error here would stall the
//! pipeline.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Encodes float samples in [-1, 1] as a 16-bit mono/stereo WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels: channels.max(1),
        sample_rate: sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let result = (|| -> Result<(), hound::Error> {
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for &sample in samples {
            let clamped = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(clamped)?;
        }
        writer.finalize()
    })();

    match result {
        Ok(()) => buffer.into_inner(),
        Err(e) => {
            tracing::warn!(target: "audio", "WAV encode failed ({}), emitting empty container", e);
            empty_wav(sample_rate, channels)
        }
    }
}

/// Hand-assembled minimal RIFF/WAVE file with zero data bytes.
///
/// Last-resort fallback so downstream code always receives a parseable
/// container.
pub fn empty_wav(sample_rate: u32, channels: u16) -> Vec<u8> {
    let channels = u32::from(channels.max(1));
    let sample_rate = sample_rate.max(1);
    let byte_rate = sample_rate * channels * 2;
    let block_align = (channels * 2) as u16;

    let mut out = Vec::with_capacity(44);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&36u32.to_le_bytes()); // total size minus 8, no data
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // PCM fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM format tag
    out.extend_from_slice(&(channels as u16).to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Simple linear interpolation resampling for capture backends that cannot
/// deliver the pipeline rate natively.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
