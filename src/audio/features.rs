// Spectral features and onset detection
// Streaming spectral flux with an adaptive mean + k*sigma threshold,
// computed frame by frame as the extractor consumes audio.

use realfft::{RealFftPlanner, RealToComplex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Root mean square amplitude of a frame.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Apply a Hann window in place to reduce spectral leakage.
pub fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n == 0 {
        return;
    }
    for (i, sample) in samples.iter_mut().enumerate() {
        let window_val = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *sample *= window_val;
    }
}

/// Configuration for streaming onset detection.
#[derive(Debug, Clone)]
pub struct OnsetConfig {
    /// Threshold = mean(flux) + threshold_factor * std(flux) over the
    /// recent history window.
    pub threshold_factor: f32,

    /// Minimum time between reported onsets.
    pub min_onset_gap_ms: f64,

    /// Number of recent flux values kept for the adaptive threshold
    /// (~1 s at 1024-sample frames / 44.1 kHz).
    pub history_frames: usize,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            threshold_factor: 1.5,
            min_onset_gap_ms: 30.0,
            history_frames: 43,
        }
    }
}

/// A detected onset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Onset {
    pub timestamp_ms: f64,

    /// Strength relative to the adaptive threshold, clamped to [0, 1].
    pub strength: f32,
}

/// Frames the detector must see before it starts reporting onsets.
const WARMUP_FRAMES: usize = 4;

/// Streaming spectral-flux onset detector.
///
/// Feed it every frame in order; it keeps the previous magnitude spectrum
/// and a short flux history for the adaptive threshold.
pub struct OnsetDetector {
    config: OnsetConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    frame_size: usize,
    prev_spectrum: Option<Vec<f32>>,
    prev_flux: f32,
    flux_history: VecDeque<f32>,
    last_onset_ms: Option<f64>,
}

impl OnsetDetector {
    pub fn new(frame_size: usize, config: OnsetConfig) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size.max(2));
        OnsetDetector {
            config,
            fft,
            frame_size: frame_size.max(2),
            prev_spectrum: None,
            prev_flux: 0.0,
            flux_history: VecDeque::new(),
            last_onset_ms: None,
        }
    }

    /// Process one frame. Must be called for every frame, in order, even
    /// when the caller does not care about the result, so the spectrum
    /// history stays contiguous.
    pub fn process(&mut self, samples: &[f32], timestamp_ms: f64) -> Option<Onset> {
        let spectrum = self.magnitude_spectrum(samples);

        let flux = match &self.prev_spectrum {
            Some(prev) => spectrum
                .iter()
                .zip(prev.iter())
                .map(|(curr, prev)| (curr - prev).max(0.0))
                .sum(),
            None => 0.0,
        };
        self.prev_spectrum = Some(spectrum);

        let history_ready = self.flux_history.len() >= WARMUP_FRAMES;
        let (mean, std_dev) = history_stats(&self.flux_history);

        self.flux_history.push_back(flux);
        if self.flux_history.len() > self.config.history_frames {
            self.flux_history.pop_front();
        }

        let rising = flux > self.prev_flux;
        self.prev_flux = flux;

        if !history_ready || !rising {
            return None;
        }

        let threshold = mean + self.config.threshold_factor * std_dev;
        if flux <= threshold {
            return None;
        }

        if let Some(last) = self.last_onset_ms {
            if timestamp_ms - last < self.config.min_onset_gap_ms {
                return None;
            }
        }
        self.last_onset_ms = Some(timestamp_ms);

        let strength = (flux - threshold) / (std_dev + 1e-6);
        Some(Onset {
            timestamp_ms,
            strength: strength.clamp(0.0, 1.0),
        })
    }

    /// Hann-windowed magnitude spectrum of one frame, zero-padded or
    /// truncated to the detector's frame size.
    fn magnitude_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let mut windowed = vec![0.0f32; self.frame_size];
        let copy_len = samples.len().min(self.frame_size);
        windowed[..copy_len].copy_from_slice(&samples[..copy_len]);
        apply_hann_window(&mut windowed);

        let mut spectrum = self.fft.make_output_vec();
        // Length invariants hold by construction, so this cannot fail.
        self.fft
            .process(&mut windowed, &mut spectrum)
            .expect("FFT buffer lengths match the plan");

        spectrum.iter().map(|c| c.norm()).collect()
    }
}

fn history_stats(history: &VecDeque<f32>) -> (f32, f32) {
    if history.is_empty() {
        return (0.0, 0.0);
    }
    let mean = history.iter().sum::<f32>() / history.len() as f32;
    let variance =
        history.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / history.len() as f32;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_frame(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn rms_of_known_signal() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0, 0.0]), 0.0);
        // RMS of a full-scale square wave is 1.0
        assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
        // RMS of a sine is amplitude / sqrt(2)
        let frame = sine_frame(100.0, 44100, 4410, 0.8);
        assert!((rms(&frame) - 0.8 / 2.0f32.sqrt()).abs() < 0.01);
    }

    #[test]
    fn hann_window_tapers_edges() {
        let mut samples = vec![1.0; 100];
        apply_hann_window(&mut samples);
        assert!(samples[0] < 0.1);
        assert!(samples[99] < 0.1);
        assert!(samples[50] > 0.9);
    }

    #[test]
    fn burst_after_silence_is_an_onset() {
        let mut detector = OnsetDetector::new(512, OnsetConfig::default());
        let mut onsets = Vec::new();

        for i in 0..30 {
            let frame = vec![0.0f32; 512];
            if let Some(onset) = detector.process(&frame, i as f64 * 11.6) {
                onsets.push(onset);
            }
        }
        assert!(onsets.is_empty(), "silence must not produce onsets");

        let burst = sine_frame(880.0, 44100, 512, 0.9);
        let onset = detector.process(&burst, 30.0 * 11.6);
        assert!(onset.is_some(), "burst after silence must be an onset");
        assert!(onset.unwrap().strength > 0.0);
    }

    #[test]
    fn sustained_tone_does_not_retrigger() {
        let mut detector = OnsetDetector::new(512, OnsetConfig::default());
        let burst = sine_frame(440.0, 44100, 512, 0.9);

        for i in 0..10 {
            detector.process(&vec![0.0f32; 512], i as f64 * 11.6);
        }
        let mut count = 0;
        for i in 10..40 {
            if detector.process(&burst, i as f64 * 11.6).is_some() {
                count += 1;
            }
        }
        assert_eq!(count, 1, "a held tone is one onset, not many");
    }

    #[test]
    fn short_frames_are_padded() {
        let mut detector = OnsetDetector::new(512, OnsetConfig::default());
        // Shorter and longer frames than the FFT size must not panic.
        detector.process(&vec![0.1f32; 100], 0.0);
        detector.process(&vec![0.1f32; 1000], 11.6);
    }
}
