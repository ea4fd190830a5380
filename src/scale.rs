//! Musical vocabulary shared by the quantized parameters and the engine.

/// The twelve root notes, indexed the way the root-note parameter counts.
pub const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// Looks up a note index by name.
pub fn note_index(name: &str) -> Option<usize> {
    NOTE_NAMES.iter().position(|&note| note == name)
}

/// The scales the scale parameter can select, in parameter index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    Major,
    NaturalMinor,
    HarmonicMinor,
    MelodicMinor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    PentatonicMajor,
    #[default]
    PentatonicMinor,
    Blues,
    WholeTone,
    HungarianMinor,
    Chromatic,
}

impl Scale {
    pub const ALL: [Scale; 15] = [
        Scale::Major,
        Scale::NaturalMinor,
        Scale::HarmonicMinor,
        Scale::MelodicMinor,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::PentatonicMajor,
        Scale::PentatonicMinor,
        Scale::Blues,
        Scale::WholeTone,
        Scale::HungarianMinor,
        Scale::Chromatic,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Scale> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Major => "Major",
            Scale::NaturalMinor => "Natural Minor",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::MelodicMinor => "Melodic Minor",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
            Scale::Locrian => "Locrian",
            Scale::PentatonicMajor => "Pentatonic Major",
            Scale::PentatonicMinor => "Pentatonic Minor",
            Scale::Blues => "Blues",
            Scale::WholeTone => "Whole Tone",
            Scale::HungarianMinor => "Hungarian Minor",
            Scale::Chromatic => "Chromatic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_declaration_order() {
        for (index, scale) in Scale::ALL.iter().enumerate() {
            assert_eq!(scale.index(), index);
            assert_eq!(Scale::from_index(index), Some(*scale));
        }
        assert_eq!(Scale::from_index(Scale::COUNT), None);
        assert_eq!(Scale::default().index(), 10);
    }

    #[test]
    fn test_note_lookup() {
        assert_eq!(note_index("A"), Some(0));
        assert_eq!(note_index("G#"), Some(11));
        assert_eq!(note_index("H"), None);
    }
}
