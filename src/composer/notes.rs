// Note model: chromas, octaves, equal temperament, nearest-note matching

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference tuning: A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI number of A4.
pub const A4_MIDI: i32 = 69;

/// Default matching window in cents. 50 cents = nearest semitone wins.
pub const MATCH_TOLERANCE_CENTS: f64 = 50.0;

/// One of the twelve pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chroma {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl Chroma {
    pub const ALL: [Chroma; 12] = [
        Chroma::C,
        Chroma::Cs,
        Chroma::D,
        Chroma::Ds,
        Chroma::E,
        Chroma::F,
        Chroma::Fs,
        Chroma::G,
        Chroma::Gs,
        Chroma::A,
        Chroma::As,
        Chroma::B,
    ];

    /// Semitone offset from C, 0..12.
    pub fn index(&self) -> u8 {
        match self {
            Chroma::C => 0,
            Chroma::Cs => 1,
            Chroma::D => 2,
            Chroma::Ds => 3,
            Chroma::E => 4,
            Chroma::F => 5,
            Chroma::Fs => 6,
            Chroma::G => 7,
            Chroma::Gs => 8,
            Chroma::A => 9,
            Chroma::As => 10,
            Chroma::B => 11,
        }
    }

    /// Inverse of `index`, taken modulo 12.
    pub fn from_index(index: u8) -> Chroma {
        Chroma::ALL[(index % 12) as usize]
    }

    /// Letter name with sharps ("C", "C#", ...).
    pub fn letter(&self) -> &'static str {
        match self {
            Chroma::C => "C",
            Chroma::Cs => "C#",
            Chroma::D => "D",
            Chroma::Ds => "D#",
            Chroma::E => "E",
            Chroma::F => "F",
            Chroma::Fs => "F#",
            Chroma::G => "G",
            Chroma::Gs => "G#",
            Chroma::A => "A",
            Chroma::As => "A#",
            Chroma::B => "B",
        }
    }

    /// Chromatic solfege name (movable-do with raised alterations).
    pub fn solfege(&self) -> &'static str {
        match self {
            Chroma::C => "Do",
            Chroma::Cs => "Di",
            Chroma::D => "Re",
            Chroma::Ds => "Ri",
            Chroma::E => "Mi",
            Chroma::F => "Fa",
            Chroma::Fs => "Fi",
            Chroma::G => "So",
            Chroma::Gs => "Se",
            Chroma::A => "La",
            Chroma::As => "Li",
            Chroma::B => "Si",
        }
    }

    /// Whether this chroma belongs to the C major (diatonic) scale.
    pub fn is_diatonic(&self) -> bool {
        matches!(
            self,
            Chroma::C | Chroma::D | Chroma::E | Chroma::F | Chroma::G | Chroma::A | Chroma::B
        )
    }

    /// Parse a letter name ("C", "C#", "db" is not supported - sharps only).
    pub fn parse(s: &str) -> Option<Chroma> {
        Chroma::ALL
            .iter()
            .copied()
            .find(|c| c.letter().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// A concrete pitch: chroma plus octave (scientific pitch notation, C4 = middle C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub chroma: Chroma,
    pub octave: i8,
}

impl Note {
    pub fn new(chroma: Chroma, octave: i8) -> Self {
        Note { chroma, octave }
    }

    /// MIDI note number. C4 = 60, A4 = 69.
    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.chroma.index() as i32
    }

    /// Build a note from a MIDI number in 0..=127.
    pub fn from_midi(midi: i32) -> Option<Note> {
        if !(0..=127).contains(&midi) {
            return None;
        }
        Some(Note {
            chroma: Chroma::from_index((midi % 12) as u8),
            octave: (midi / 12 - 1) as i8,
        })
    }

    /// Equal-temperament frequency relative to A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        A4_FREQUENCY * 2f64.powf((self.midi() - A4_MIDI) as f64 / 12.0)
    }

    /// Solfege name with octave, e.g. "Di4".
    pub fn solfege_name(&self) -> String {
        format!("{}{}", self.chroma.solfege(), self.octave)
    }

    /// Parse a note name like "C#4" or "a3".
    pub fn parse(s: &str) -> Option<Note> {
        let split = s.find(|ch: char| ch.is_ascii_digit() || ch == '-')?;
        let chroma = Chroma::parse(&s[..split])?;
        let octave = s[split..].parse::<i8>().ok()?;
        Some(Note { chroma, octave })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.chroma.letter(), self.octave)
    }
}

/// Result of matching a raw frequency against the note table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteMatch {
    pub note: Note,
    /// Signed distance from the note's exact frequency, in cents.
    pub cents_off: f64,
}

/// Convert a frequency to the nearest MIDI note plus fine-tune cents.
pub fn freq_to_midi_cents(freq: f64, a4_freq: f64) -> Option<(i32, f64)> {
    if freq <= 0.0 || a4_freq <= 0.0 {
        return None;
    }
    let midi_float = A4_MIDI as f64 + 12.0 * (freq / a4_freq).log2();
    let midi = midi_float.round() as i32;
    Some((midi, (midi_float - midi as f64) * 100.0))
}

/// Match a frequency against the nearest note within `tolerance_cents`.
///
/// Frequencies that land outside the playable MIDI range are rejected
/// rather than clamped, so subsonic rumble and harmonics above B8 never
/// turn into note events.
pub fn match_note_within(frequency_hz: f64, tolerance_cents: f64) -> Option<NoteMatch> {
    let (midi, cents_off) = freq_to_midi_cents(frequency_hz, A4_FREQUENCY)?;
    if cents_off.abs() > tolerance_cents {
        return None;
    }
    let note = Note::from_midi(midi)?;
    Some(NoteMatch { note, cents_off })
}

/// Match with the default +-50 cent window (nearest semitone).
pub fn match_note(frequency_hz: f64) -> Option<NoteMatch> {
    match_note_within(frequency_hz, MATCH_TOLERANCE_CENTS)
}
