// Composition mapper
// Consumes feature events from the ring and folds runs of agreeing pitch
// detections into note events, accumulating an ordered composition.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::notes::{match_note, Note};
use crate::events::FeatureEvent;
use crate::ring::Stage;

/// A mapped note with timing and dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: Note,
    pub onset_ms: f64,
    pub duration_ms: f64,
    /// Normalized dynamics in [0.0, 1.0], derived from frame RMS.
    pub velocity: f32,
}

/// An ordered sequence of mapped notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Composition {
    pub id: Uuid,
    pub name: String,
    pub notes: Vec<NoteEvent>,
}

impl Composition {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// End of the last note, in milliseconds from the start.
    pub fn duration_ms(&self) -> f64 {
        self.notes
            .iter()
            .map(|n| n.onset_ms + n.duration_ms)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Events below this probability are ignored.
    pub min_probability: f32,

    /// Consecutive agreeing events required before a note opens. Filters
    /// single-frame detector flukes.
    pub debounce_frames: usize,

    /// Notes shorter than this are dropped at close time.
    pub min_note_ms: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            min_probability: 0.5,
            debounce_frames: 2,
            min_note_ms: 40.0,
        }
    }
}

struct ActiveNote {
    note: Note,
    onset_ms: f64,
    peak_rms: f32,
}

struct Candidate {
    note: Note,
    count: usize,
    first_ms: f64,
    peak_rms: f32,
}

/// Stateful event-to-note folder.
pub struct CompositionMapper {
    config: MapperConfig,
    active: Option<ActiveNote>,
    candidate: Option<Candidate>,
    notes: Vec<NoteEvent>,
    last_timestamp_ms: f64,
}

impl CompositionMapper {
    pub fn new(config: MapperConfig) -> Self {
        CompositionMapper {
            config,
            active: None,
            candidate: None,
            notes: Vec::new(),
            last_timestamp_ms: 0.0,
        }
    }

    pub fn handle_event(&mut self, event: &FeatureEvent) {
        self.last_timestamp_ms = event.timestamp_ms;

        if event.probability < self.config.min_probability {
            self.candidate = None;
            return;
        }
        let matched = match match_note(event.frequency_hz as f64) {
            Some(m) => m,
            None => {
                self.candidate = None;
                return;
            }
        };

        let continues_active = self
            .active
            .as_ref()
            .map(|a| a.note == matched.note)
            .unwrap_or(false);
        if continues_active {
            self.candidate = None;
            if event.onset {
                // Re-articulation of the same pitch: split the note.
                if let Some(active) = self.active.take() {
                    self.close_note(active, event.timestamp_ms);
                }
                self.active = Some(ActiveNote {
                    note: matched.note,
                    onset_ms: event.timestamp_ms,
                    peak_rms: event.rms,
                });
            } else if let Some(active) = &mut self.active {
                active.peak_rms = active.peak_rms.max(event.rms);
            }
            return;
        }

        // A different pitch than the active note: count agreement.
        let confirmed = match &mut self.candidate {
            Some(candidate) if candidate.note == matched.note => {
                candidate.count += 1;
                candidate.peak_rms = candidate.peak_rms.max(event.rms);
                candidate.count >= self.config.debounce_frames
            }
            _ => {
                self.candidate = Some(Candidate {
                    note: matched.note,
                    count: 1,
                    first_ms: event.timestamp_ms,
                    peak_rms: event.rms,
                });
                self.config.debounce_frames <= 1
            }
        };

        if confirmed {
            if let Some(candidate) = self.candidate.take() {
                if let Some(active) = self.active.take() {
                    self.close_note(active, candidate.first_ms);
                }
                self.active = Some(ActiveNote {
                    note: candidate.note,
                    onset_ms: candidate.first_ms,
                    peak_rms: candidate.peak_rms,
                });
            }
        }
    }

    /// Close any open note and hand back the finished composition,
    /// resetting the mapper for the next take.
    pub fn finish(&mut self, name: &str) -> Composition {
        if let Some(active) = self.active.take() {
            self.close_note(active, self.last_timestamp_ms);
        }
        self.candidate = None;
        Composition {
            id: Uuid::new_v4(),
            name: name.to_string(),
            notes: std::mem::take(&mut self.notes),
        }
    }

    pub fn notes_so_far(&self) -> usize {
        self.notes.len()
    }

    fn close_note(&mut self, active: ActiveNote, end_ms: f64) {
        let duration_ms = end_ms - active.onset_ms;
        if duration_ms < self.config.min_note_ms {
            return;
        }
        // RMS of a full-scale sine is 1/sqrt(2); rescale so it maps to 1.0.
        let velocity = (active.peak_rms * std::f32::consts::SQRT_2).clamp(0.0, 1.0);
        self.notes.push(NoteEvent {
            note: active.note,
            onset_ms: active.onset_ms,
            duration_ms,
            velocity,
        });
    }
}

impl Default for CompositionMapper {
    fn default() -> Self {
        Self::new(MapperConfig::default())
    }
}

/// Ring stage wrapper; the pipeline keeps the shared handle to collect the
/// composition after the ring closes.
pub struct MapperStage {
    mapper: Arc<Mutex<CompositionMapper>>,
}

impl MapperStage {
    pub fn new(mapper: Arc<Mutex<CompositionMapper>>) -> Self {
        MapperStage { mapper }
    }
}

impl Stage<FeatureEvent> for MapperStage {
    fn on_event(&mut self, event: &FeatureEvent, _sequence: u64, _end_of_batch: bool) {
        self.mapper.lock().unwrap().handle_event(event);
    }
}
