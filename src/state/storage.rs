// Artifact storage
// Files live under a per-composition directory inside the app data root;
// every stored file is content-hashed for the artifact table.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to resolve an app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// SHA-256 of raw bytes, hex encoded.
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Disk layout rooted at a data directory:
/// `<root>/pitches.db`, `<root>/compositions/<id>/<filename>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store under the platform data directory (`~/.local/share/pitches`
    /// on Linux).
    pub fn open_default() -> StorageResult<Self> {
        let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
        Self::at(data_dir.join("pitches"))
    }

    /// Store rooted at an explicit directory; created if missing.
    pub fn at(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ArtifactStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("pitches.db")
    }

    fn composition_dir(&self, composition_id: &Uuid) -> StorageResult<PathBuf> {
        let dir = self
            .root
            .join("compositions")
            .join(composition_id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write an artifact file and return its path plus content hash.
    pub fn store(
        &self,
        composition_id: &Uuid,
        filename: &str,
        data: &[u8],
    ) -> StorageResult<(PathBuf, String)> {
        let dir = self.composition_dir(composition_id)?;
        let path = dir.join(filename);
        fs::write(&path, data)?;
        Ok((path, calculate_sha256(data)))
    }

    pub fn read(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}
