// Pipeline event types
// The frame/feature structures that flow from capture through the ring

use serde::{Deserialize, Serialize};

/// A fixed-size block of mono samples handed to the feature extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Milliseconds from the start of the capture or file.
    pub timestamp_ms: f64,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(timestamp_ms: f64, sample_rate: u32, samples: Vec<f32>) -> Self {
        AudioFrame {
            timestamp_ms,
            sample_rate,
            samples,
        }
    }

    /// Duration this frame covers in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// One audio-analysis observation, published to the event ring.
///
/// Preallocated in ring slots, so it must be cheap to clone and have a
/// meaningful `Default` (an empty, never-published observation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureEvent {
    /// Monotonic number assigned by the extractor; equals the ring
    /// sequence when the extractor is the only publisher.
    pub sequence: u64,

    /// Milliseconds from the start of the capture or file.
    pub timestamp_ms: f64,

    /// Detected fundamental frequency in Hz.
    pub frequency_hz: f32,

    /// Detector clarity/probability in [0.0, 1.0].
    pub probability: f32,

    /// Root mean square amplitude of the source frame.
    pub rms: f32,

    /// Whether an onset landed in this frame.
    pub onset: bool,

    /// Onset strength in [0.0, 1.0]; zero when `onset` is false.
    pub onset_strength: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(0.0, 44100, vec![0.0; 441]);
        assert!((frame.duration_ms() - 10.0).abs() < 1e-9);

        let broken = AudioFrame::new(0.0, 0, vec![0.0; 441]);
        assert_eq!(broken.duration_ms(), 0.0);
    }

    #[test]
    fn default_event_is_empty() {
        let event = FeatureEvent::default();
        assert_eq!(event.sequence, 0);
        assert_eq!(event.frequency_hz, 0.0);
        assert!(!event.onset);
    }
}
