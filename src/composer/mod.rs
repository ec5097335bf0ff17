// Composition mapper module
// Note model, pitch matching, event-to-note mapping and MIDI export

pub mod mapper;
pub mod midi;
pub mod notes;
pub mod palette;

pub use mapper::{Composition, CompositionMapper, MapperConfig, MapperStage, NoteEvent};
pub use midi::{export_midi, MidiError, MidiExportOptions};
pub use notes::{
    freq_to_midi_cents, match_note, match_note_within, Chroma, Note, NoteMatch, A4_FREQUENCY,
};
pub use palette::{color_for, ChromaColor};
