// Data models for persisted sessions, attempts, compositions and artifacts
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::PitchAlgorithm;
use crate::game::Scale;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub scale: Scale,
    pub algorithm: PitchAlgorithm,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Finished => "finished",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "paused" => SessionStatus::Paused,
            "finished" => SessionStatus::Finished,
            _ => SessionStatus::Active,
        }
    }
}

/// A judged guess, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub riddle_note: String,
    pub guess_note: String,
    pub frequency_hz: f64,
    pub probability: f64,
    pub correct: bool,
}

/// Summary row for a stored composition; the notes themselves live in a
/// metadata artifact on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub note_count: i64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub composition_id: Uuid,
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Midi,
    Wav,
    Metadata,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Midi => "midi",
            ArtifactKind::Wav => "wav",
            ArtifactKind::Metadata => "metadata",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "midi" => ArtifactKind::Midi,
            "wav" => ArtifactKind::Wav,
            _ => ArtifactKind::Metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub attempt_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionWithArtifacts {
    pub composition: CompositionRecord,
    pub artifacts: Vec<Artifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Finished,
        ] {
            assert_eq!(SessionStatus::from_str_lossy(status.as_str()), status);
        }
        assert_eq!(
            SessionStatus::from_str_lossy("garbage"),
            SessionStatus::Active
        );
    }

    #[test]
    fn artifact_kind_round_trip() {
        for kind in [ArtifactKind::Midi, ArtifactKind::Wav, ArtifactKind::Metadata] {
            assert_eq!(ArtifactKind::from_str_lossy(kind.as_str()), kind);
        }
    }
}
