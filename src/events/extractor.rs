// Feature extractor
// Turns raw audio frames into feature events: pitch, probability, RMS and
// onset flags. Frames with no detectable pitch produce no event.

use crate::audio::features::{rms, OnsetConfig, OnsetDetector};
use crate::audio::pitch::{PitchAlgorithm, PitchDetector};
use crate::events::types::{AudioFrame, FeatureEvent};

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub algorithm: PitchAlgorithm,
    pub frame_size: usize,
    pub onset: OnsetConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            algorithm: PitchAlgorithm::default(),
            frame_size: crate::audio::DEFAULT_FRAME_SIZE,
            onset: OnsetConfig::default(),
        }
    }
}

/// Stateful per-stream extractor. Feed it every frame in order; onset
/// detection depends on the running spectrum history.
pub struct FeatureExtractor {
    detector: PitchDetector,
    onsets: OnsetDetector,
    sequence: u64,
}

impl FeatureExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        FeatureExtractor {
            detector: PitchDetector::new(config.algorithm),
            onsets: OnsetDetector::new(config.frame_size, config.onset.clone()),
            sequence: 0,
        }
    }

    pub fn algorithm(&self) -> PitchAlgorithm {
        self.detector.algorithm()
    }

    /// Number of feature events produced so far.
    pub fn events_emitted(&self) -> u64 {
        self.sequence
    }

    /// Analyze one frame. The onset detector always sees the frame; a
    /// feature event is only produced when a pitch was detected.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> Option<FeatureEvent> {
        let onset = self.onsets.process(&frame.samples, frame.timestamp_ms);
        let estimate = self.detector.detect(&frame.samples, frame.sample_rate)?;

        let event = FeatureEvent {
            sequence: self.sequence,
            timestamp_ms: frame.timestamp_ms,
            frequency_hz: estimate.frequency_hz,
            probability: estimate.clarity,
            rms: rms(&frame.samples),
            onset: onset.is_some(),
            onset_strength: onset.map(|o| o.strength).unwrap_or(0.0),
        };
        self.sequence += 1;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone_frame(freq: f32, timestamp_ms: f64) -> AudioFrame {
        let samples: Vec<f32> = (0..1024)
            .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin() * 0.7)
            .collect();
        AudioFrame::new(timestamp_ms, 44100, samples)
    }

    #[test]
    fn tone_frames_produce_sequenced_events() {
        let mut extractor = FeatureExtractor::new(&ExtractorConfig::default());
        let mut events = Vec::new();
        for i in 0..10 {
            let frame = tone_frame(440.0, i as f64 * 23.2);
            if let Some(event) = extractor.process_frame(&frame) {
                events.push(event);
            }
        }
        assert_eq!(events.len(), 10);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64);
            assert!((event.frequency_hz - 440.0).abs() < 5.0);
            assert!(event.probability > 0.8);
            assert!(event.rms > 0.4);
        }
        assert_eq!(extractor.events_emitted(), 10);
    }

    #[test]
    fn silent_frames_produce_no_events() {
        let mut extractor = FeatureExtractor::new(&ExtractorConfig::default());
        let frame = AudioFrame::new(0.0, 44100, vec![0.0; 1024]);
        assert!(extractor.process_frame(&frame).is_none());
        assert_eq!(extractor.events_emitted(), 0);
    }

    #[test]
    fn tone_after_silence_flags_an_onset() {
        let mut extractor = FeatureExtractor::new(&ExtractorConfig::default());
        for i in 0..10 {
            let frame = AudioFrame::new(i as f64 * 23.2, 44100, vec![0.0; 1024]);
            extractor.process_frame(&frame);
        }
        let event = extractor
            .process_frame(&tone_frame(440.0, 10.0 * 23.2))
            .unwrap();
        assert!(event.onset, "tone after silence should carry an onset");
        assert!(event.onset_strength > 0.0);
    }
}
