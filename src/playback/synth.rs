// Note synthesis
// A small additive oscillator with an ADSR envelope, rendered to a sample
// buffer for playback. Not a general-purpose synth: it only needs to sound
// one riddle note at a time, piano-ish enough to sing back.

/// Envelope timing, all in samples.
#[derive(Debug, Clone, Copy)]
pub struct AdsrEnvelope {
    attack: usize,
    decay: usize,
    sustain_level: f32,
    release: usize,
}

impl AdsrEnvelope {
    pub fn new(attack: usize, decay: usize, sustain_level: f32, release: usize) -> Self {
        AdsrEnvelope {
            attack: attack.max(1),
            decay: decay.max(1),
            sustain_level: sustain_level.clamp(0.0, 1.0),
            release: release.max(1),
        }
    }

    /// Envelope timings for a note player at the given sample rate:
    /// 10 ms attack, 60 ms decay, 80 ms release.
    pub fn for_note(sample_rate: u32) -> Self {
        let per_ms = sample_rate as f32 / 1000.0;
        AdsrEnvelope::new(
            (10.0 * per_ms) as usize,
            (60.0 * per_ms) as usize,
            0.75,
            (80.0 * per_ms) as usize,
        )
    }

    /// Amplitude at sample `position` of a note `total` samples long.
    /// The release phase occupies the final `release` samples.
    pub fn amplitude(&self, position: usize, total: usize) -> f32 {
        if position >= total {
            return 0.0;
        }
        let release_start = total.saturating_sub(self.release);
        if position >= release_start {
            let into_release = (position - release_start) as f32 / self.release as f32;
            return self.level_before_release(release_start) * (1.0 - into_release);
        }
        self.level_before_release(position)
    }

    fn level_before_release(&self, position: usize) -> f32 {
        if position < self.attack {
            position as f32 / self.attack as f32
        } else if position < self.attack + self.decay {
            let into_decay = (position - self.attack) as f32 / self.decay as f32;
            1.0 - into_decay * (1.0 - self.sustain_level)
        } else {
            self.sustain_level
        }
    }
}

/// Render a note as mono f32 samples: fundamental plus two soft harmonics
/// through the envelope.
pub fn render_note(frequency_hz: f64, duration_ms: f64, sample_rate: u32) -> Vec<f32> {
    if frequency_hz <= 0.0 || duration_ms <= 0.0 || sample_rate == 0 {
        return Vec::new();
    }
    let total = (duration_ms / 1000.0 * sample_rate as f64) as usize;
    let envelope = AdsrEnvelope::for_note(sample_rate);

    let step = 2.0 * std::f64::consts::PI * frequency_hz / sample_rate as f64;
    (0..total)
        .map(|i| {
            let phase = step * i as f64;
            let tone = phase.sin() + 0.5 * (2.0 * phase).sin() + 0.2 * (3.0 * phase).sin();
            (tone * 0.4) as f32 * envelope.amplitude(i, total)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let envelope = AdsrEnvelope::new(100, 100, 0.5, 100);
        let total = 1000;

        assert_eq!(envelope.amplitude(0, total), 0.0);
        assert!((envelope.amplitude(50, total) - 0.5).abs() < 0.02); // mid-attack
        assert!((envelope.amplitude(100, total) - 1.0).abs() < 0.02); // peak
        assert!((envelope.amplitude(500, total) - 0.5).abs() < 0.02); // sustain
        assert!(envelope.amplitude(950, total) < 0.5); // releasing
        assert_eq!(envelope.amplitude(1000, total), 0.0);
    }

    #[test]
    fn rendered_note_is_bounded_and_tapered() {
        let samples = render_note(440.0, 500.0, 44100);
        assert_eq!(samples.len(), 22050);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
        // Starts and ends silent
        assert!(samples[0].abs() < 1e-6);
        assert!(samples[samples.len() - 1].abs() < 0.05);
        // Loud somewhere in the middle
        assert!(samples.iter().any(|s| s.abs() > 0.3));
    }

    #[test]
    fn degenerate_inputs_render_nothing() {
        assert!(render_note(0.0, 500.0, 44100).is_empty());
        assert!(render_note(440.0, 0.0, 44100).is_empty());
        assert!(render_note(440.0, 500.0, 0).is_empty());
    }
}
