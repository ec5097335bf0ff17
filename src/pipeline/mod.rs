// Pipeline orchestration
// Wires capture/ingest -> feature extractor -> event ring -> stages
// (composition mapper, quiz engine, live feed), and persists results.

pub mod trace;

pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};

use serde::Serialize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use uuid::Uuid;

use crate::audio::{AudioCapture, AudioData, AudioError, CaptureError};
use crate::composer::{
    color_for, export_midi, match_note, Composition, CompositionMapper, MapperConfig, MapperStage,
    MidiError, MidiExportOptions,
};
use crate::events::{AudioFrame, ExtractorConfig, FeatureEvent, FeatureExtractor};
use crate::game::{QuizConfig, QuizEngine, QuizStage};
use crate::playback::NotePlayer;
use crate::ring::{spawn_stage, EventRing, RingError, Stage, WaitStrategy};
use crate::state::{
    self, ArtifactKind, ArtifactStore, CompositionRecord, DbConnection, DbError, Session,
    StorageError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("MIDI export error: {0}")]
    Midi(#[from] MidiError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a pipeline stage panicked")]
    StagePanicked,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ring_capacity: usize,
    pub wait_strategy: WaitStrategy,
    pub extractor: ExtractorConfig,
    pub mapper: MapperConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            ring_capacity: 1024,
            wait_strategy: WaitStrategy::default(),
            extractor: ExtractorConfig::default(),
            mapper: MapperConfig::default(),
        }
    }
}

/// What `/live` reports: the latest observation plus its note reading.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub sequence: u64,
    pub timestamp_ms: f64,
    pub frequency_hz: f32,
    pub probability: f32,
    pub rms: f32,
    pub onset: bool,
    pub note: Option<String>,
    pub chroma: Option<String>,
    pub color: Option<String>,
    pub cents_off: Option<f64>,
}

impl LiveSnapshot {
    fn from_event(event: &FeatureEvent) -> Self {
        let matched = match_note(event.frequency_hz as f64);
        LiveSnapshot {
            sequence: event.sequence,
            timestamp_ms: event.timestamp_ms,
            frequency_hz: event.frequency_hz,
            probability: event.probability,
            rms: event.rms,
            onset: event.onset,
            note: matched.map(|m| m.note.to_string()),
            chroma: matched.map(|m| m.note.chroma.solfege().to_string()),
            color: matched.map(|m| color_for(m.note.chroma).hex()),
            cents_off: matched.map(|m| m.cents_off),
        }
    }
}

/// Shared latest-observation cell, the API's side-channel view of the ring.
#[derive(Clone, Default)]
pub struct LiveFeed {
    inner: Arc<RwLock<Option<LiveSnapshot>>>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, event: &FeatureEvent) {
        *self.inner.write().unwrap() = Some(LiveSnapshot::from_event(event));
    }

    pub fn snapshot(&self) -> Option<LiveSnapshot> {
        self.inner.read().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }
}

/// Ring stage keeping the live feed current.
pub struct FeedStage {
    feed: LiveFeed,
}

impl FeedStage {
    pub fn new(feed: LiveFeed) -> Self {
        FeedStage { feed }
    }
}

impl Stage<FeatureEvent> for FeedStage {
    fn on_event(&mut self, event: &FeatureEvent, _sequence: u64, _end_of_batch: bool) {
        self.feed.update(event);
    }
}

/// Result of offline analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub composition: Composition,
    pub frames: usize,
    pub events: usize,
}

/// Run decoded audio through the full extractor -> ring -> mapper path and
/// return the mapped composition. This is the hardware-free pipeline used
/// by the analyze endpoint and by tests.
pub fn analyze_audio(
    audio: &AudioData,
    name: &str,
    config: &PipelineConfig,
    tracer: Option<&TraceWriter>,
) -> Result<AnalysisReport, PipelineError> {
    let frames = audio.frames(config.extractor.frame_size);
    write_trace(
        tracer,
        TraceEntry::new("extract", 0.0, format!("{} frames", frames.len())),
    );

    let mut ring = EventRing::<FeatureEvent>::new(config.ring_capacity, config.wait_strategy)?;
    let mapper = Arc::new(Mutex::new(CompositionMapper::new(config.mapper.clone())));
    let stage_handle = spawn_stage(
        ring.subscribe("mapper"),
        MapperStage::new(Arc::clone(&mapper)),
    )?;

    let mut producer = ring.producer();
    let mut extractor = FeatureExtractor::new(&config.extractor);
    let mut events = 0usize;
    for frame in &frames {
        if let Some(event) = extractor.process_frame(frame) {
            producer.publish(event)?;
            events += 1;
        }
    }
    drop(producer);
    stage_handle.join().map_err(|_| PipelineError::StagePanicked)?;

    let composition = mapper.lock().unwrap().finish(name);
    write_trace(
        tracer,
        TraceEntry::new("map", 1.0, format!("{} notes", composition.note_count()))
            .with_data(serde_json::json!({ "events": events })),
    );

    Ok(AnalysisReport {
        composition,
        frames: frames.len(),
        events,
    })
}

fn write_trace(tracer: Option<&TraceWriter>, entry: TraceEntry) {
    if let Some(tracer) = tracer {
        if let Err(e) = tracer.write(&entry) {
            log::warn!("trace write failed: {e}");
        }
    }
}

/// Depth of the capture -> extractor frame queue. Capture drops frames
/// (with a warning) when the extractor falls this far behind.
const FRAME_QUEUE_DEPTH: usize = 16;

/// A running live pipeline: microphone capture feeding the ring, with the
/// mapper, quiz and feed stages consuming.
pub struct LiveSession {
    session_id: Uuid,
    capture: AudioCapture,
    extractor_handle: Option<JoinHandle<()>>,
    stage_handles: Vec<JoinHandle<()>>,
    mapper: Arc<Mutex<CompositionMapper>>,
    engine: Arc<Mutex<QuizEngine>>,
    feed: LiveFeed,
}

/// Start capturing and analyzing for a stored session. The quiz engine
/// picks and sounds its first riddle immediately.
pub fn start_live(
    config: &PipelineConfig,
    db: &DbConnection,
    session: &Session,
    player: Box<dyn NotePlayer>,
) -> Result<LiveSession, PipelineError> {
    let mut extractor_config = config.extractor.clone();
    extractor_config.algorithm = session.algorithm;

    let quiz_config = QuizConfig {
        scale: session.scale,
        ..QuizConfig::default()
    };
    let engine = Arc::new(Mutex::new(QuizEngine::new(quiz_config, player)));

    let mut ring = EventRing::<FeatureEvent>::new(config.ring_capacity, config.wait_strategy)?;
    let mapper = Arc::new(Mutex::new(CompositionMapper::new(config.mapper.clone())));
    let feed = LiveFeed::new();

    let stage_handles = vec![
        spawn_stage(
            ring.subscribe("mapper"),
            MapperStage::new(Arc::clone(&mapper)),
        )?,
        spawn_stage(
            ring.subscribe("quiz"),
            QuizStage::new(Arc::clone(&engine), db.clone(), session.id),
        )?,
        spawn_stage(ring.subscribe("feed"), FeedStage::new(feed.clone()))?,
    ];
    let mut producer = ring.producer();

    let (frames_tx, frames_rx) = mpsc::sync_channel::<AudioFrame>(FRAME_QUEUE_DEPTH);
    let capture = AudioCapture::new(extractor_config.frame_size);
    capture.start(frames_tx)?;

    engine.lock().unwrap().start();

    let extractor_handle = thread::Builder::new()
        .name("extractor".to_string())
        .spawn(move || {
            let mut extractor = FeatureExtractor::new(&extractor_config);
            while let Ok(frame) = frames_rx.recv() {
                if let Some(event) = extractor.process_frame(&frame) {
                    if producer.publish(event).is_err() {
                        break;
                    }
                }
            }
            // Producer drops here; the ring closes and stages drain.
        })?;

    log::info!("live session {} started", session.id);
    Ok(LiveSession {
        session_id: session.id,
        capture,
        extractor_handle: Some(extractor_handle),
        stage_handles,
        mapper,
        engine,
        feed,
    })
}

impl LiveSession {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn feed(&self) -> LiveFeed {
        self.feed.clone()
    }

    pub fn engine(&self) -> Arc<Mutex<QuizEngine>> {
        Arc::clone(&self.engine)
    }

    pub fn capture_level(&self) -> f32 {
        self.capture.level()
    }

    /// Stop capture, drain every stage, then persist what was sung as a
    /// composition (when any notes were mapped).
    pub fn stop(
        mut self,
        db: &DbConnection,
        store: &ArtifactStore,
    ) -> Result<Option<CompositionRecord>, PipelineError> {
        self.engine.lock().unwrap().pause();
        self.capture.stop();
        if let Some(handle) = self.extractor_handle.take() {
            handle.join().map_err(|_| PipelineError::StagePanicked)?;
        }
        for handle in self.stage_handles.drain(..) {
            handle.join().map_err(|_| PipelineError::StagePanicked)?;
        }
        self.feed.clear();

        let composition = self.mapper.lock().unwrap().finish("live take");
        if composition.notes.is_empty() {
            log::info!("live session {} ended with no notes", self.session_id);
            return Ok(None);
        }
        let record = persist_composition(db, store, Some(&self.session_id), &composition)?;
        log::info!(
            "live session {} ended: {} notes persisted",
            self.session_id,
            record.note_count
        );
        Ok(Some(record))
    }
}

/// Store a composition row plus its artifacts: the notes as a JSON
/// metadata file and, when exportable, a MIDI rendition.
pub fn persist_composition(
    db: &DbConnection,
    store: &ArtifactStore,
    session_id: Option<&Uuid>,
    composition: &Composition,
) -> Result<CompositionRecord, PipelineError> {
    let record = state::create_composition(db, session_id, composition)?;

    let notes_json = serde_json::to_vec_pretty(composition)?;
    let (path, sha256) = store.store(&record.id, "composition.json", &notes_json)?;
    state::create_artifact(
        db,
        &record.id,
        ArtifactKind::Metadata,
        path.display().to_string(),
        sha256,
        notes_json.len() as i64,
    )?;

    match export_midi(composition, &MidiExportOptions::default()) {
        Ok(bytes) => {
            let (path, sha256) = store.store(&record.id, "composition.mid", &bytes)?;
            state::create_artifact(
                db,
                &record.id,
                ArtifactKind::Midi,
                path.display().to_string(),
                sha256,
                bytes.len() as i64,
            )?;
        }
        Err(MidiError::EmptyComposition) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{Chroma, Note, NoteEvent};
    use crate::state::init_db_in_memory;
    use std::f32::consts::PI;
    use tempfile::TempDir;

    fn two_tone_audio() -> AudioData {
        // Half a second of A4 followed by half a second of C5.
        let sr = 44100u32;
        let mut samples = Vec::with_capacity(sr as usize);
        for i in 0..sr / 2 {
            samples.push((2.0 * PI * 440.0 * i as f32 / sr as f32).sin() * 0.6);
        }
        for i in 0..sr / 2 {
            samples.push((2.0 * PI * 523.25 * i as f32 / sr as f32).sin() * 0.6);
        }
        AudioData {
            frame_count: samples.len(),
            duration_ms: 1000,
            samples,
            sample_rate: sr,
            channels: 1,
            bit_depth: 16,
        }
    }

    #[test]
    fn offline_analysis_maps_two_notes() {
        let report =
            analyze_audio(&two_tone_audio(), "test take", &PipelineConfig::default(), None)
                .unwrap();

        assert!(report.frames > 40);
        assert!(report.events > 30, "events: {}", report.events);
        assert_eq!(report.composition.note_count(), 2);
        assert_eq!(report.composition.notes[0].note, Note::new(Chroma::A, 4));
        assert_eq!(report.composition.notes[1].note, Note::new(Chroma::C, 5));
    }

    #[test]
    fn offline_analysis_of_silence_is_empty() {
        let audio = AudioData {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            duration_ms: 1000,
            frame_count: 44100,
        };
        let report =
            analyze_audio(&audio, "silence", &PipelineConfig::default(), None).unwrap();
        assert_eq!(report.events, 0);
        assert_eq!(report.composition.note_count(), 0);
    }

    #[test]
    fn analysis_writes_trace_entries() {
        let dir = TempDir::new().unwrap();
        let tracer = TraceWriter::new(dir.path().join("trace.jsonl"));
        analyze_audio(
            &two_tone_audio(),
            "traced",
            &PipelineConfig::default(),
            Some(&tracer),
        )
        .unwrap();

        let entries = read_trace_file(tracer.path()).unwrap();
        assert!(entries.len() >= 2);
        assert_eq!(entries[0].stage, "extract");
        assert_eq!(entries.last().unwrap().stage, "map");
    }

    #[test]
    fn persisted_composition_has_artifacts_on_disk() {
        let db = init_db_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::at(dir.path().join("data")).unwrap();

        let composition = Composition {
            id: uuid::Uuid::new_v4(),
            name: "persisted".to_string(),
            notes: vec![NoteEvent {
                note: Note::new(Chroma::G, 4),
                onset_ms: 0.0,
                duration_ms: 300.0,
                velocity: 0.6,
            }],
        };

        let record = persist_composition(&db, &store, None, &composition).unwrap();
        let stored = state::get_composition_with_artifacts(&db, &record.id)
            .unwrap()
            .unwrap();

        assert_eq!(stored.artifacts.len(), 2);
        for artifact in &stored.artifacts {
            assert!(
                std::path::Path::new(&artifact.path).exists(),
                "missing artifact file {}",
                artifact.path
            );
        }
        let midi = state::find_artifact(&db, &record.id, ArtifactKind::Midi)
            .unwrap()
            .unwrap();
        let bytes = store.read(&midi.path).unwrap();
        assert_eq!(state::calculate_sha256(&bytes), midi.sha256);
    }

    #[test]
    fn live_snapshot_reads_notes() {
        let feed = LiveFeed::new();
        assert!(feed.snapshot().is_none());

        let event = FeatureEvent {
            sequence: 3,
            timestamp_ms: 70.0,
            frequency_hz: 440.0,
            probability: 0.9,
            rms: 0.4,
            onset: true,
            onset_strength: 0.8,
        };
        feed.update(&event);

        let snapshot = feed.snapshot().unwrap();
        assert_eq!(snapshot.sequence, 3);
        assert_eq!(snapshot.note.as_deref(), Some("A4"));
        assert_eq!(snapshot.chroma.as_deref(), Some("La"));
        assert!(snapshot.onset);

        feed.clear();
        assert!(feed.snapshot().is_none());
    }
}
