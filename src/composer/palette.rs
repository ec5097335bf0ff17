// Chroma color palette
// Fixed mapping from pitch class to display color, used by API consumers
// to render riddle/guess feedback.

use serde::{Deserialize, Serialize};

use super::notes::Chroma;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChromaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ChromaColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        ChromaColor { r, g, b }
    }

    /// CSS hex form, e.g. "#fdcb03".
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Display color for a pitch class.
///
/// The assignment is arbitrary but stable: consumers rely on e.g. Do
/// always rendering amber and So always rendering red.
pub fn color_for(chroma: Chroma) -> ChromaColor {
    match chroma {
        Chroma::C => ChromaColor::new(253, 203, 3),    // Do - amber
        Chroma::Cs => ChromaColor::new(116, 3, 75),    // Di - plum
        Chroma::D => ChromaColor::new(3, 179, 253),    // Re - sky blue
        Chroma::Ds => ChromaColor::new(255, 113, 0),   // Ri - orange
        Chroma::E => ChromaColor::new(250, 111, 252),  // Mi - magenta
        Chroma::F => ChromaColor::new(2, 252, 37),     // Fa - green
        Chroma::Fs => ChromaColor::new(3, 88, 69),     // Fi - pine
        Chroma::G => ChromaColor::new(252, 2, 2),      // So - red
        Chroma::Gs => ChromaColor::new(16, 24, 106),   // Se - navy
        Chroma::A => ChromaColor::new(251, 245, 173),  // La - cream
        Chroma::As => ChromaColor::new(2, 243, 252),   // Li - cyan
        Chroma::B => ChromaColor::new(219, 192, 244),  // Si - lavender
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chroma_has_a_distinct_color() {
        let mut seen = std::collections::HashSet::new();
        for chroma in Chroma::ALL {
            assert!(seen.insert(color_for(chroma)), "duplicate color for {chroma}");
        }
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(color_for(Chroma::C).hex(), "#fdcb03");
        assert_eq!(color_for(Chroma::G).hex(), "#fc0202");
    }
}
