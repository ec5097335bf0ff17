// API layer
// The axum HTTP boundary: sessions and the quiz, the live feed, offline
// analysis, composition downloads.

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};

use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};

use crate::pipeline::{LiveSession, LiveSnapshot, PipelineConfig};
use crate::state::{ArtifactStore, DbConnection};

/// Shared application state behind every handler.
pub struct AppState {
    pub db: DbConnection,
    pub store: ArtifactStore,
    pub pipeline: PipelineConfig,
    /// At most one live (microphone) session at a time.
    pub live: Mutex<Option<LiveSession>>,
}

impl AppState {
    pub fn new(db: DbConnection, store: ArtifactStore, pipeline: PipelineConfig) -> Self {
        AppState {
            db,
            store,
            pipeline,
            live: Mutex::new(None),
        }
    }

    /// Latest observation from the live pipeline, if one is running.
    pub fn feed_snapshot(&self) -> Option<LiveSnapshot> {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|session| session.feed().snapshot())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/sessions",
            post(routes::create_session).get(routes::list_sessions),
        )
        .route("/sessions/:id", get(routes::get_session))
        .route("/sessions/:id/listen", post(routes::listen))
        .route("/sessions/:id/stop", post(routes::stop))
        .route("/sessions/:id/pause", post(routes::pause))
        .route("/sessions/:id/resume", post(routes::resume))
        .route("/sessions/:id/attempts", get(routes::session_attempts))
        .route("/sessions/:id/quiz", get(routes::quiz))
        .route("/live", get(routes::live))
        .route("/analyze", post(routes::analyze))
        .route("/compositions/:id", get(routes::get_composition))
        .route("/compositions/:id/midi", get(routes::composition_midi))
        .route("/palette", get(routes::palette))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::init_db_in_memory;
    use tempfile::TempDir;

    #[test]
    fn router_builds_with_fresh_state() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(
            init_db_in_memory().unwrap(),
            ArtifactStore::at(dir.path()).unwrap(),
            PipelineConfig::default(),
        ));
        let _router = router(Arc::clone(&state));

        assert!(state.feed_snapshot().is_none());
        assert!(state.live.lock().unwrap().is_none());
    }
}
