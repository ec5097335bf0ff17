// Scale pools for riddle selection
// Chromatic or diatonic notes over the singable octave range, with the
// extremes of the range trimmed off.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::composer::{Chroma, Note};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Chromatic,
    Diatonic,
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Diatonic
    }
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Chromatic => "chromatic",
            Scale::Diatonic => "diatonic",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromatic" => Ok(Scale::Chromatic),
            "diatonic" => Ok(Scale::Diatonic),
            other => Err(format!("unknown scale: {other}")),
        }
    }
}

/// Octaves riddles are drawn from.
pub const LOW_OCTAVE: i8 = 3;
pub const HIGH_OCTAVE: i8 = 7;

/// The bottom of octave 3 sits under most voices and the top of octave 7
/// above them, so both ends of the range are trimmed.
fn is_excluded(note: Note) -> bool {
    match note.octave {
        LOW_OCTAVE => note.chroma.index() <= Chroma::Ds.index(),
        HIGH_OCTAVE => note.chroma.index() >= Chroma::Ds.index(),
        _ => false,
    }
}

/// All candidate riddle notes for a scale, in ascending order.
pub fn note_pool(scale: Scale) -> Vec<Note> {
    let mut pool = Vec::new();
    for octave in LOW_OCTAVE..=HIGH_OCTAVE {
        for chroma in Chroma::ALL {
            if scale == Scale::Diatonic && !chroma.is_diatonic() {
                continue;
            }
            let note = Note::new(chroma, octave);
            if !is_excluded(note) {
                pool.push(note);
            }
        }
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromatic_pool_size() {
        // 5 octaves x 12 chromas, minus 4 trimmed at the bottom and 9 at
        // the top.
        assert_eq!(note_pool(Scale::Chromatic).len(), 47);
    }

    #[test]
    fn diatonic_pool_size() {
        // 5 octaves x 7 naturals, minus C3/D3 and E7/F7/G7/A7/B7.
        assert_eq!(note_pool(Scale::Diatonic).len(), 28);
    }

    #[test]
    fn pools_respect_the_trim() {
        let pool = note_pool(Scale::Chromatic);
        assert!(!pool.contains(&Note::new(Chroma::C, 3)));
        assert!(!pool.contains(&Note::new(Chroma::Ds, 3)));
        assert!(pool.contains(&Note::new(Chroma::E, 3)));
        assert!(pool.contains(&Note::new(Chroma::D, 7)));
        assert!(!pool.contains(&Note::new(Chroma::Ds, 7)));
        assert!(!pool.contains(&Note::new(Chroma::B, 7)));
    }

    #[test]
    fn diatonic_pool_has_no_accidentals() {
        assert!(note_pool(Scale::Diatonic)
            .iter()
            .all(|note| note.chroma.is_diatonic()));
    }

    #[test]
    fn scale_parsing() {
        assert_eq!("chromatic".parse::<Scale>().unwrap(), Scale::Chromatic);
        assert_eq!("Diatonic".parse::<Scale>().unwrap(), Scale::Diatonic);
        assert!("pentatonic".parse::<Scale>().is_err());
    }
}
