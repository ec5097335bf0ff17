// Audio ingestion
// Reads WAV bytes, normalizes samples to f32, and slices mono frames for
// the analysis pipeline.

use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use thiserror::Error;

use crate::events::AudioFrame;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read WAV data: {0}")]
    WavRead(#[from] hound::Error),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Decoded audio with interleaved samples normalized to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub duration_ms: i64,
    pub frame_count: usize,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Mix down to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        let channels = self.channels as usize;
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Slice the mono mixdown into analysis frames of `frame_size`
    /// samples. A trailing partial frame is dropped; detectors need the
    /// full window anyway.
    pub fn frames(&self, frame_size: usize) -> Vec<AudioFrame> {
        if frame_size == 0 || self.sample_rate == 0 {
            return Vec::new();
        }
        let mono = self.to_mono();
        let ms_per_frame = frame_size as f64 * 1000.0 / self.sample_rate as f64;
        mono.chunks_exact(frame_size)
            .enumerate()
            .map(|(i, chunk)| {
                AudioFrame::new(i as f64 * ms_per_frame, self.sample_rate, chunk.to_vec())
            })
            .collect()
    }
}

/// Decode a WAV file from raw bytes.
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let cursor = Cursor::new(data);
    let mut reader = WavReader::new(cursor)?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;

    let samples: Vec<f32> = match (spec.sample_format, bit_depth) {
        (SampleFormat::Int, 8) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 2_147_483_648.0)
            .collect(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                spec.sample_format, bit_depth
            )));
        }
    };

    let frame_count = if channels > 0 {
        samples.len() / channels as usize
    } else {
        0
    };
    let duration_ms = if sample_rate > 0 {
        (frame_count as f64 / sample_rate as f64 * 1000.0) as i64
    } else {
        0
    };

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        bit_depth,
        duration_ms,
        frame_count,
    })
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in samples {
            let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(int_sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_to_mono_averages_channels() {
        let audio = AudioData {
            samples: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            duration_ms: 1,
            frame_count: 3,
        };
        let mono = audio.to_mono();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.15).abs() < 1e-6);
        assert!((mono[2] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn wav_round_trip() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let bytes = encode_wav(&samples, 44100).unwrap();
        let decoded = ingest_wav(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frame_count, 4410);
        assert_eq!(decoded.duration_ms, 100);
        // 16-bit quantization keeps samples within ~1e-4 of the source
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn frames_are_sliced_with_timestamps() {
        let audio = AudioData {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            duration_ms: 1000,
            frame_count: 44100,
        };
        let frames = audio.frames(1024);
        assert_eq!(frames.len(), 43); // trailing partial frame dropped
        assert_eq!(frames[0].timestamp_ms, 0.0);
        let expected = 1024.0 * 1000.0 / 44100.0;
        assert!((frames[1].timestamp_ms - expected).abs() < 1e-9);
        assert!(frames.iter().all(|f| f.samples.len() == 1024));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(ingest_wav(b"not a wav file").is_err());
    }
}
