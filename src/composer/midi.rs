// MIDI export - convert compositions to MIDI files using the midly crate
// Produces DAW-friendly files with tempo metadata and proper timing

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mapper::Composition;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to write MIDI data: {0}")]
    Write(String),

    #[error("composition is empty")]
    EmptyComposition,
}

/// MIDI export options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiExportOptions {
    /// Pulses per quarter note; 480 gives ~1 ms resolution at 120 BPM.
    pub ppq: u16,

    /// Tempo stamped into the file. Timestamps are wall-clock, so this
    /// only affects how a DAW bars up the result.
    pub bpm: f64,

    /// General MIDI program for the melody track (0 = acoustic piano).
    pub program: u8,

    /// Include a track name meta event.
    pub track_name: bool,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            bpm: 120.0,
            program: 0,
            track_name: true,
        }
    }
}

/// Export a composition to MIDI file bytes.
pub fn export_midi(
    composition: &Composition,
    options: &MidiExportOptions,
) -> Result<Vec<u8>, MidiError> {
    if composition.notes.is_empty() {
        return Err(MidiError::EmptyComposition);
    }

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(options.ppq.into()),
    };
    let ticks_per_ms = ticks_per_ms(options.bpm, options.ppq);

    // Track 0: tempo metadata
    let mut meta_track = Track::new();
    let us_per_quarter = (60_000_000.0 / options.bpm) as u32;
    meta_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
    meta_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    // Track 1: the melody
    let mut events: Vec<(u32, TrackEventKind)> = Vec::new();
    if options.track_name {
        events.push((
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(composition.name.as_bytes())),
        ));
    }
    events.push((
        0,
        TrackEventKind::Midi {
            channel: 0.into(),
            message: MidiMessage::ProgramChange {
                program: options.program.min(127).into(),
            },
        },
    ));

    for note in &composition.notes {
        let key = note.note.midi().clamp(0, 127) as u8;
        let velocity = velocity_to_midi(note.velocity);
        let tick_on = (note.onset_ms * ticks_per_ms) as u32;
        let tick_off = ((note.onset_ms + note.duration_ms) * ticks_per_ms) as u32;

        events.push((
            tick_on,
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: velocity.into(),
                },
            },
        ));
        events.push((
            tick_off.max(tick_on + 1),
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    events.sort_by_key(|(tick, _)| *tick);

    let mut melody_track = Track::new();
    let mut last_tick = 0u32;
    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick);
        melody_track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
        last_tick = tick;
    }
    melody_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header,
        tracks: vec![meta_track, melody_track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| MidiError::Write(e.to_string()))?;
    Ok(bytes)
}

fn ticks_per_ms(bpm: f64, ppq: u16) -> f64 {
    let ms_per_quarter = 60_000.0 / bpm;
    ppq as f64 / ms_per_quarter
}

/// Map normalized velocity to MIDI 1..=127 (0 would read as note-off).
fn velocity_to_midi(velocity: f32) -> u8 {
    ((velocity.clamp(0.0, 1.0) * 126.0) as u8) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::mapper::NoteEvent;
    use crate::composer::notes::{Chroma, Note};
    use uuid::Uuid;

    fn composition() -> Composition {
        Composition {
            id: Uuid::new_v4(),
            name: "take one".to_string(),
            notes: vec![
                NoteEvent {
                    note: Note::new(Chroma::A, 4),
                    onset_ms: 0.0,
                    duration_ms: 500.0,
                    velocity: 0.8,
                },
                NoteEvent {
                    note: Note::new(Chroma::C, 5),
                    onset_ms: 500.0,
                    duration_ms: 250.0,
                    velocity: 0.4,
                },
            ],
        }
    }

    #[test]
    fn exported_midi_parses_back() {
        let bytes = export_midi(&composition(), &MidiExportOptions::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.tracks.len(), 2);

        let note_ons: Vec<_> = smf.tracks[1]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } => Some((key.as_int(), vel.as_int())),
                _ => None,
            })
            .collect();

        assert_eq!(note_ons.len(), 2);
        assert_eq!(note_ons[0].0, 69); // A4
        assert_eq!(note_ons[1].0, 72); // C5
        assert!(note_ons[0].1 > note_ons[1].1, "louder note, higher velocity");
    }

    #[test]
    fn note_timing_survives_export() {
        let options = MidiExportOptions::default();
        let bytes = export_midi(&composition(), &options).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        // At 120 BPM / 480 PPQ one ms is 0.96 ticks; the second NoteOn
        // lands 500 ms in.
        let mut absolute = 0u32;
        let mut second_on_tick = None;
        let mut note_ons_seen = 0;
        for event in &smf.tracks[1] {
            absolute += event.delta.as_int();
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            } = event.kind
            {
                note_ons_seen += 1;
                if note_ons_seen == 2 {
                    second_on_tick = Some(absolute);
                }
            }
        }
        assert_eq!(second_on_tick, Some(480)); // 500 ms * 0.96 ticks/ms
    }

    #[test]
    fn empty_composition_is_an_error() {
        let empty = Composition {
            id: Uuid::new_v4(),
            name: "empty".to_string(),
            notes: vec![],
        };
        assert!(matches!(
            export_midi(&empty, &MidiExportOptions::default()),
            Err(MidiError::EmptyComposition)
        ));
    }

    #[test]
    fn velocity_mapping_bounds() {
        assert_eq!(velocity_to_midi(0.0), 1);
        assert_eq!(velocity_to_midi(1.0), 127);
        assert_eq!(velocity_to_midi(2.0), 127);
    }
}
