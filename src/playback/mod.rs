// Playback module
// Riddle-note synthesis and the NotePlayer boundary

pub mod player;
pub mod synth;

pub use player::{default_player, NotePlayer, NullPlayer, PlaybackError, SynthPlayer};
pub use synth::{render_note, AdsrEnvelope};
