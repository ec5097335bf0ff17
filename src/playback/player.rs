// Note playback
// The quiz engine talks to a NotePlayer trait; the real implementation
// renders the synth tone and plays it through rodio on a dedicated thread
// (the output stream is not Send).

use rodio::buffer::SamplesBuffer;
use rodio::OutputStream;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

use super::synth::render_note;
use crate::composer::Note;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output available: {0}")]
    OutputUnavailable(String),

    #[error("playback thread stopped")]
    ThreadStopped,
}

/// Something that can sound a note. The engine never blocks on playback.
pub trait NotePlayer: Send + Sync {
    fn play_note(&self, note: Note, duration_ms: f64) -> Result<(), PlaybackError>;
}

const PLAYBACK_SAMPLE_RATE: u32 = 44100;

struct PlayRequest {
    frequency_hz: f64,
    duration_ms: f64,
}

/// Plays synthesized tones through the default output device.
pub struct SynthPlayer {
    requests: Sender<PlayRequest>,
}

impl SynthPlayer {
    /// Open the default output device. Fails fast (rather than on first
    /// note) when no output is available.
    pub fn new() -> Result<Self, PlaybackError> {
        let (requests, playlist) = mpsc::channel::<PlayRequest>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("note-player".to_string())
            .spawn(move || {
                // The stream must live on this thread for the whole loop.
                let stream = match OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let (_stream, handle) = stream;

                while let Ok(request) = playlist.recv() {
                    let samples = render_note(
                        request.frequency_hz,
                        request.duration_ms,
                        PLAYBACK_SAMPLE_RATE,
                    );
                    if samples.is_empty() {
                        continue;
                    }
                    let source = SamplesBuffer::new(1, PLAYBACK_SAMPLE_RATE, samples);
                    if let Err(e) = handle.play_raw(source) {
                        log::warn!("failed to play note: {e}");
                    }
                }
            })
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(SynthPlayer { requests }),
            Ok(Err(message)) => Err(PlaybackError::OutputUnavailable(message)),
            Err(_) => Err(PlaybackError::ThreadStopped),
        }
    }
}

impl NotePlayer for SynthPlayer {
    fn play_note(&self, note: Note, duration_ms: f64) -> Result<(), PlaybackError> {
        self.requests
            .send(PlayRequest {
                frequency_hz: note.frequency(),
                duration_ms,
            })
            .map_err(|_| PlaybackError::ThreadStopped)
    }
}

/// Records played notes instead of sounding them. Used in tests and as a
/// fallback when no output device exists.
#[derive(Default)]
pub struct NullPlayer {
    played: Arc<Mutex<Vec<Note>>>,
}

impl NullPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of everything "played" so far.
    pub fn played(&self) -> Arc<Mutex<Vec<Note>>> {
        Arc::clone(&self.played)
    }
}

impl NotePlayer for NullPlayer {
    fn play_note(&self, note: Note, _duration_ms: f64) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push(note);
        Ok(())
    }
}

/// A SynthPlayer when audio output exists, otherwise a NullPlayer.
pub fn default_player() -> Box<dyn NotePlayer> {
    match SynthPlayer::new() {
        Ok(player) => Box::new(player),
        Err(e) => {
            log::warn!("audio output unavailable ({e}); riddle notes will be silent");
            Box::new(NullPlayer::new())
        }
    }
}
