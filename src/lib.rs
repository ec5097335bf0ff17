// Pitches - pitch-training game and audio-analysis pipeline
// Module declarations and the top-level run loop

pub mod api;
pub mod audio;
pub mod composer;
pub mod events;
pub mod game;
pub mod pipeline;
pub mod playback;
pub mod ring;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use api::AppState;
use pipeline::PipelineConfig;
use ring::WaitStrategy;
use state::ArtifactStore;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("storage error: {0}")]
    Storage(#[from] state::StorageError),

    #[error("database error: {0}")]
    Db(#[from] state::DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PitchesConfig {
    /// Address the API binds to.
    pub bind_addr: String,

    /// Data directory override; platform default when unset.
    pub data_dir: Option<PathBuf>,

    pub pipeline: PipelineConfig,
}

impl Default for PitchesConfig {
    fn default() -> Self {
        PitchesConfig {
            bind_addr: "127.0.0.1:7600".to_string(),
            data_dir: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl PitchesConfig {
    /// Defaults with environment overrides: `PITCHES_ADDR`,
    /// `PITCHES_DATA_DIR`, `PITCHES_ALGORITHM` (yin|mpm),
    /// `PITCHES_RING_CAPACITY`, `PITCHES_WAIT_STRATEGY`
    /// (blocking|busy_spin).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("PITCHES_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("PITCHES_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(value) = std::env::var("PITCHES_ALGORITHM") {
            match value.parse() {
                Ok(algorithm) => config.pipeline.extractor.algorithm = algorithm,
                Err(e) => log::warn!("ignoring PITCHES_ALGORITHM: {e}"),
            }
        }
        if let Ok(value) = std::env::var("PITCHES_RING_CAPACITY") {
            match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.pipeline.ring_capacity = capacity,
                _ => log::warn!("ignoring PITCHES_RING_CAPACITY: {value}"),
            }
        }
        if let Ok(value) = std::env::var("PITCHES_WAIT_STRATEGY") {
            match value.as_str() {
                "blocking" => config.pipeline.wait_strategy = WaitStrategy::Blocking,
                "busy_spin" => config.pipeline.wait_strategy = WaitStrategy::BusySpin,
                other => log::warn!("ignoring PITCHES_WAIT_STRATEGY: {other}"),
            }
        }
        config
    }
}

/// Open storage and the database, then serve the API until the process
/// exits.
pub fn run(config: PitchesConfig) -> Result<(), RunError> {
    let store = match &config.data_dir {
        Some(dir) => ArtifactStore::at(dir)?,
        None => ArtifactStore::open_default()?,
    };
    log::info!("data directory: {}", store.root().display());

    let db = state::init_db(store.db_path())?;
    let state = Arc::new(AppState::new(db, store, config.pipeline.clone()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(api::serve(state, &config.bind_addr))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = PitchesConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:7600");
        assert!(config.data_dir.is_none());
        assert_eq!(config.pipeline.ring_capacity, 1024);
    }
}
