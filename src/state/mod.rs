// State management module
// SQLite persistence and artifact storage

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, init_db_in_memory, DbConnection, DbError, DbResult};
pub use models::{
    Artifact, ArtifactKind, AttemptRecord, CompositionRecord, CompositionWithArtifacts, Session,
    SessionStatus, SessionSummary,
};
pub use queries::{
    create_artifact, create_composition, create_session, find_artifact, get_composition,
    get_composition_with_artifacts, get_session, list_artifacts, list_attempts, list_sessions,
    record_attempt, update_session_status,
};
pub use storage::{calculate_sha256, ArtifactStore, StorageError};
