// Quiz engine
// Plays a riddle note, watches confirmed detections from the ring, and
// advances when the sung-back chroma matches.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::scales::{note_pool, Scale};
use crate::composer::{color_for, match_note, Note};
use crate::events::FeatureEvent;
use crate::playback::NotePlayer;
use crate::ring::Stage;
use crate::state::{self, DbConnection};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    pub scale: Scale,

    /// Octave slack when judging a guess. The default is wide enough to
    /// make the game octave-agnostic: singers answer in whatever octave
    /// their voice reaches.
    pub octave_tolerance: i32,

    /// Expected octave offset between riddle and answer (singers tend to
    /// land one octave under the synth tone).
    pub octave_correction: i32,

    /// Detections below this probability are never judged.
    pub min_probability: f32,

    /// Consecutive same-chroma detections required before a guess counts.
    pub detection_threshold: usize,

    /// How long riddle notes are sounded, in milliseconds.
    pub note_duration_ms: f64,
}

impl Default for QuizConfig {
    fn default() -> Self {
        QuizConfig {
            scale: Scale::default(),
            octave_tolerance: 9,
            octave_correction: -1,
            min_probability: 0.5,
            detection_threshold: 4,
            note_duration_ms: 700.0,
        }
    }
}

/// One judged guess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub riddle: Note,
    pub guess: Note,
    pub frequency_hz: f32,
    pub probability: f32,
    pub correct: bool,
    pub at: DateTime<Utc>,
}

/// What the API may reveal about a running quiz: the riddle's color and
/// solfege chroma, never the exact note.
#[derive(Debug, Clone, Serialize)]
pub struct QuizSnapshot {
    pub running: bool,
    pub scale: Scale,
    pub riddle_chroma: Option<String>,
    pub riddle_color: Option<String>,
    pub attempts: u64,
    pub correct: u64,
}

pub struct QuizEngine {
    config: QuizConfig,
    rng: StdRng,
    player: Box<dyn NotePlayer>,
    pool: Vec<Note>,
    riddle: Option<Note>,
    prev_riddle: Option<Note>,
    streak: Option<(Note, usize)>,
    running: bool,
    attempts: u64,
    correct: u64,
}

impl QuizEngine {
    pub fn new(config: QuizConfig, player: Box<dyn NotePlayer>) -> Self {
        Self::with_rng(config, player, StdRng::from_entropy())
    }

    /// Deterministic riddle order for tests.
    pub fn with_seed(config: QuizConfig, player: Box<dyn NotePlayer>, seed: u64) -> Self {
        Self::with_rng(config, player, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: QuizConfig, player: Box<dyn NotePlayer>, rng: StdRng) -> Self {
        let pool = note_pool(config.scale);
        QuizEngine {
            config,
            rng,
            player,
            pool,
            riddle: None,
            prev_riddle: None,
            streak: None,
            running: false,
            attempts: 0,
            correct: 0,
        }
    }

    /// Begin the game: pick and sound the first riddle.
    pub fn start(&mut self) {
        self.running = true;
        if self.riddle.is_none() {
            self.pick_riddle();
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume; replays the current riddle as a reminder.
    pub fn resume(&mut self) {
        self.running = true;
        if let Some(riddle) = self.riddle {
            self.play(riddle);
        } else {
            self.pick_riddle();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn riddle(&self) -> Option<Note> {
        self.riddle
    }

    /// Switch scale pools. The current riddle stays in play; the new pool
    /// applies from the next riddle on.
    pub fn set_scale(&mut self, scale: Scale) {
        self.config.scale = scale;
        self.pool = note_pool(scale);
    }

    pub fn snapshot(&self) -> QuizSnapshot {
        QuizSnapshot {
            running: self.running,
            scale: self.config.scale,
            riddle_chroma: self.riddle.map(|r| r.chroma.solfege().to_string()),
            riddle_color: self.riddle.map(|r| color_for(r.chroma).hex()),
            attempts: self.attempts,
            correct: self.correct,
        }
    }

    /// Feed one feature event. Returns a judged attempt once a guess has
    /// been confirmed by enough consecutive detections.
    pub fn handle_event(&mut self, event: &FeatureEvent) -> Option<Attempt> {
        if !self.running {
            return None;
        }
        let guess = match_note(event.frequency_hz as f64)?.note;

        // Debounce: a guess only counts after detection_threshold
        // consecutive frames agree on the chroma.
        let streak = match self.streak.take() {
            Some((note, count)) if note.chroma == guess.chroma => (guess, count + 1),
            _ => (guess, 1),
        };
        if streak.1 < self.config.detection_threshold {
            self.streak = Some(streak);
            return None;
        }
        self.streak = None;

        if event.probability <= self.config.min_probability {
            return None;
        }
        let riddle = self.riddle?;

        let octave_delta = guess.octave as i32 - riddle.octave as i32 - self.config.octave_correction;
        let correct =
            guess.chroma == riddle.chroma && octave_delta.abs() <= self.config.octave_tolerance;

        let attempt = Attempt {
            riddle,
            guess,
            frequency_hz: event.frequency_hz,
            probability: event.probability,
            correct,
            at: Utc::now(),
        };
        self.attempts += 1;

        if correct {
            log::info!("[{}] solved with {}", riddle.chroma.solfege(), guess);
            self.correct += 1;
            // Confirmation replay, then a fresh riddle.
            self.play(riddle);
            self.prev_riddle = Some(riddle);
            self.riddle = None;
            self.pick_riddle();
        } else {
            log::info!(
                "[{}] {} is wrong ({:.2} Hz, {:.2})",
                riddle.chroma.solfege(),
                guess,
                event.frequency_hz,
                event.probability
            );
            // Remind the player what they are hunting for.
            self.play(riddle);
        }
        Some(attempt)
    }

    /// Pick a random riddle whose chroma differs from the previous one,
    /// and sound it.
    fn pick_riddle(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        for _ in 0..256 {
            let candidate = self.pool[self.rng.gen_range(0..self.pool.len())];
            let repeats_chroma = self
                .prev_riddle
                .map(|prev| prev.chroma == candidate.chroma)
                .unwrap_or(false);
            if repeats_chroma {
                continue;
            }
            log::info!("[{}] is the new riddle", candidate.chroma.solfege());
            self.riddle = Some(candidate);
            self.play(candidate);
            return;
        }
    }

    fn play(&self, note: Note) {
        if let Err(e) = self.player.play_note(note, self.config.note_duration_ms) {
            log::warn!("riddle playback failed: {e}");
        }
    }
}

/// Ring stage: drives the shared engine and records judged attempts.
pub struct QuizStage {
    engine: Arc<Mutex<QuizEngine>>,
    db: DbConnection,
    session_id: Uuid,
}

impl QuizStage {
    pub fn new(engine: Arc<Mutex<QuizEngine>>, db: DbConnection, session_id: Uuid) -> Self {
        QuizStage {
            engine,
            db,
            session_id,
        }
    }
}

impl Stage<FeatureEvent> for QuizStage {
    fn on_event(&mut self, event: &FeatureEvent, _sequence: u64, _end_of_batch: bool) {
        let attempt = self.engine.lock().unwrap().handle_event(event);
        if let Some(attempt) = attempt {
            if let Err(e) = state::record_attempt(&self.db, &self.session_id, &attempt) {
                log::error!("failed to record attempt: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Chroma;
    use crate::playback::NullPlayer;

    fn engine_with_player() -> (QuizEngine, Arc<Mutex<Vec<Note>>>) {
        let player = NullPlayer::new();
        let played = player.played();
        let engine = QuizEngine::with_seed(QuizConfig::default(), Box::new(player), 7);
        (engine, played)
    }

    fn event_for(note: Note, probability: f32) -> FeatureEvent {
        FeatureEvent {
            sequence: 0,
            timestamp_ms: 0.0,
            frequency_hz: note.frequency() as f32,
            probability,
            rms: 0.4,
            onset: false,
            onset_strength: 0.0,
        }
    }

    fn confirm(engine: &mut QuizEngine, note: Note, probability: f32) -> Option<Attempt> {
        let mut last = None;
        for _ in 0..QuizConfig::default().detection_threshold {
            last = engine.handle_event(&event_for(note, probability));
        }
        last
    }

    #[test]
    fn start_plays_the_first_riddle() {
        let (mut engine, played) = engine_with_player();
        engine.start();

        let riddle = engine.riddle().expect("riddle picked");
        assert_eq!(*played.lock().unwrap(), vec![riddle]);
    }

    #[test]
    fn correct_guess_advances_the_riddle() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        let attempt = confirm(&mut engine, riddle, 0.9).expect("judged");
        assert!(attempt.correct);
        assert_eq!(attempt.riddle, riddle);

        let next = engine.riddle().expect("new riddle picked");
        assert_ne!(next.chroma, riddle.chroma, "chroma never repeats");
    }

    #[test]
    fn any_octave_counts_by_default() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        // Same chroma, two octaves down (clamped into range).
        let octave = (riddle.octave - 2).max(1);
        let guess = Note::new(riddle.chroma, octave);
        let attempt = confirm(&mut engine, guess, 0.9).expect("judged");
        assert!(attempt.correct);
    }

    #[test]
    fn wrong_chroma_keeps_the_riddle() {
        let (mut engine, played) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        let wrong_chroma = Chroma::from_index(riddle.chroma.index() + 1);
        let wrong = Note::new(wrong_chroma, 4);
        let attempt = confirm(&mut engine, wrong, 0.9).expect("judged");

        assert!(!attempt.correct);
        assert_eq!(engine.riddle(), Some(riddle));
        // Start + reminder replay
        assert_eq!(played.lock().unwrap().len(), 2);
    }

    #[test]
    fn fewer_detections_than_threshold_are_not_judged() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        for _ in 0..QuizConfig::default().detection_threshold - 1 {
            assert!(engine.handle_event(&event_for(riddle, 0.9)).is_none());
        }
        assert_eq!(engine.riddle(), Some(riddle), "riddle unchanged");
    }

    #[test]
    fn low_probability_guesses_are_not_judged() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        assert!(confirm(&mut engine, riddle, 0.3).is_none());
        assert_eq!(engine.riddle(), Some(riddle));
    }

    #[test]
    fn paused_engine_ignores_events() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();
        engine.pause();

        assert!(confirm(&mut engine, riddle, 0.9).is_none());
        engine.resume();
        assert!(engine.is_running());
    }

    #[test]
    fn strict_octave_mode() {
        let config = QuizConfig {
            octave_tolerance: 0,
            octave_correction: 0,
            ..QuizConfig::default()
        };
        let mut engine = QuizEngine::with_seed(config, Box::new(NullPlayer::new()), 7);
        engine.start();
        let riddle = engine.riddle().unwrap();

        let off_octave = Note::new(riddle.chroma, riddle.octave - 1);
        let attempt = confirm(&mut engine, off_octave, 0.9).expect("judged");
        assert!(!attempt.correct);

        let attempt = confirm(&mut engine, riddle, 0.9).expect("judged");
        assert!(attempt.correct);
    }

    #[test]
    fn snapshot_reveals_chroma_not_note() {
        let (mut engine, _) = engine_with_player();
        engine.start();
        let riddle = engine.riddle().unwrap();

        let snapshot = engine.snapshot();
        assert!(snapshot.running);
        assert_eq!(
            snapshot.riddle_chroma.as_deref(),
            Some(riddle.chroma.solfege())
        );
        assert!(snapshot.riddle_color.unwrap().starts_with('#'));
        assert_eq!(snapshot.attempts, 0);
    }
}
