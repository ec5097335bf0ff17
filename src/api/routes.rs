// HTTP handlers
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::audio::{ingest_wav, PitchAlgorithm};
use crate::composer::{color_for, Chroma, ChromaColor, Composition};
use crate::game::{QuizSnapshot, Scale};
use crate::pipeline::{self, LiveSnapshot, PipelineError};
use crate::playback;
use crate::state::{
    self, AttemptRecord, CompositionRecord, CompositionWithArtifacts, Session, SessionStatus,
    SessionSummary,
};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ==================== SESSIONS ====================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub scale: Option<Scale>,
    #[serde(default)]
    pub algorithm: Option<PitchAlgorithm>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateSessionRequest>,
) -> ApiResult<Json<Session>> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("session name must not be empty"));
    }
    let session = state::create_session(
        &state.db,
        input.name,
        input.scale.unwrap_or_default(),
        input.algorithm.unwrap_or_default(),
    )?;
    log::info!("created session {} ({})", session.id, session.name);
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state::list_sessions(&state.db)?))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    state::get_session(&state.db, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("session not found"))
}

pub async fn session_attempts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AttemptRecord>>> {
    if state::get_session(&state.db, &id)?.is_none() {
        return Err(ApiError::not_found("session not found"));
    }
    Ok(Json(state::list_attempts(&state.db, &id)?))
}

// ==================== LIVE PIPELINE ====================

pub async fn listen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = state::get_session(&state.db, &id)?
        .ok_or_else(|| ApiError::not_found("session not found"))?;

    let mut live = state.live.lock().unwrap();
    if live.is_some() {
        return Err(ApiError::conflict("a live session is already running"));
    }
    let player = playback::default_player();
    let started = pipeline::start_live(&state.pipeline, &state.db, &session, player)?;
    *live = Some(started);
    drop(live);

    state::update_session_status(&state.db, &id, SessionStatus::Active)?;
    Ok(Json(json!({ "listening": true, "session_id": id })))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<CompositionRecord>>> {
    let session = {
        let mut live = state.live.lock().unwrap();
        match live.take() {
            Some(session) if session.session_id() == id => session,
            Some(other) => {
                *live = Some(other);
                return Err(ApiError::conflict("another session is live"));
            }
            None => return Err(ApiError::conflict("no live session")),
        }
    };

    let state_for_stop = Arc::clone(&state);
    let record = tokio::task::spawn_blocking(
        move || -> Result<Option<CompositionRecord>, PipelineError> {
            session.stop(&state_for_stop.db, &state_for_stop.store)
        },
    )
    .await??;

    state::update_session_status(&state.db, &id, SessionStatus::Finished)?;
    Ok(Json(record))
}

pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizSnapshot>> {
    let snapshot = with_live_engine(&state, &id, |engine| {
        engine.pause();
        engine.snapshot()
    })?;
    state::update_session_status(&state.db, &id, SessionStatus::Paused)?;
    Ok(Json(snapshot))
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizSnapshot>> {
    let snapshot = with_live_engine(&state, &id, |engine| {
        engine.resume();
        engine.snapshot()
    })?;
    state::update_session_status(&state.db, &id, SessionStatus::Active)?;
    Ok(Json(snapshot))
}

pub async fn quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizSnapshot>> {
    let snapshot = with_live_engine(&state, &id, |engine| engine.snapshot())?;
    Ok(Json(snapshot))
}

fn with_live_engine<T>(
    state: &AppState,
    id: &Uuid,
    f: impl FnOnce(&mut crate::game::QuizEngine) -> T,
) -> ApiResult<T> {
    let live = state.live.lock().unwrap();
    match live.as_ref() {
        Some(session) if session.session_id() == *id => {
            let engine = session.engine();
            let mut engine = engine.lock().unwrap();
            Ok(f(&mut engine))
        }
        Some(_) => Err(ApiError::conflict("another session is live")),
        None => Err(ApiError::conflict("no live session")),
    }
}

pub async fn live(State(state): State<Arc<AppState>>) -> Json<Option<LiveSnapshot>> {
    Json(state.feed_snapshot())
}

// ==================== OFFLINE ANALYSIS ====================

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub record: Option<CompositionRecord>,
    pub composition: Composition,
    pub frames: usize,
    pub events: usize,
}

/// Upload WAV bytes, run them through the full extractor -> ring ->
/// mapper pipeline, and persist the resulting composition.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> ApiResult<Json<AnalyzeResponse>> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body must be a WAV file"));
    }
    let name = params.name.unwrap_or_else(|| "uploaded take".to_string());

    let state_for_analysis = Arc::clone(&state);
    let response = tokio::task::spawn_blocking(move || -> Result<AnalyzeResponse, PipelineError> {
        let audio = ingest_wav(&body)?;
        let report =
            pipeline::analyze_audio(&audio, &name, &state_for_analysis.pipeline, None)?;
        let record = if report.composition.notes.is_empty() {
            None
        } else {
            Some(pipeline::persist_composition(
                &state_for_analysis.db,
                &state_for_analysis.store,
                None,
                &report.composition,
            )?)
        };
        Ok(AnalyzeResponse {
            record,
            composition: report.composition,
            frames: report.frames,
            events: report.events,
        })
    })
    .await??;

    Ok(Json(response))
}

// ==================== COMPOSITIONS ====================

pub async fn get_composition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CompositionWithArtifacts>> {
    state::get_composition_with_artifacts(&state.db, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("composition not found"))
}

pub async fn composition_midi(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let artifact = state::find_artifact(&state.db, &id, state::ArtifactKind::Midi)?
        .ok_or_else(|| ApiError::not_found("no MIDI artifact for this composition"))?;
    let bytes = state.store.read(&artifact.path)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/midi".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"composition.mid\"".to_string(),
            ),
        ],
        bytes,
    ))
}

// ==================== PALETTE ====================

#[derive(Debug, Serialize)]
pub struct PaletteEntry {
    pub letter: &'static str,
    pub solfege: &'static str,
    pub color: String,
    pub rgb: ChromaColor,
}

pub async fn palette() -> Json<Vec<PaletteEntry>> {
    Json(
        Chroma::ALL
            .iter()
            .map(|&chroma| PaletteEntry {
                letter: chroma.letter(),
                solfege: chroma.solfege(),
                color: color_for(chroma).hex(),
                rgb: color_for(chroma),
            })
            .collect(),
    )
}
