// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{
    Artifact, ArtifactKind, AttemptRecord, CompositionRecord, CompositionWithArtifacts, Session,
    SessionStatus, SessionSummary,
};
use crate::audio::PitchAlgorithm;
use crate::composer::Composition;
use crate::game::{Attempt, Scale};

/// Column parse failures surface as conversion errors instead of panics.
fn parse_uuid(index: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

fn parse_datetime(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    value.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

// ==================== SESSIONS ====================

pub fn create_session(
    db: &DbConnection,
    name: String,
    scale: Scale,
    algorithm: PitchAlgorithm,
) -> DbResult<Session> {
    let session = Session {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        name,
        scale,
        algorithm,
        status: SessionStatus::Active,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO sessions (id, created_at, name, scale, algorithm, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.created_at.to_rfc3339(),
            session.name,
            session.scale.as_str(),
            session.algorithm.as_str(),
            session.status.as_str(),
        ],
    )?;

    Ok(session)
}

pub fn get_session(db: &DbConnection, id: &Uuid) -> DbResult<Option<Session>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, created_at, name, scale, algorithm, status
         FROM sessions WHERE id = ?1",
    )?;

    let result = stmt.query_row([id.to_string()], |row| {
        Ok(Session {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            created_at: parse_datetime(1, &row.get::<_, String>(1)?)?,
            name: row.get(2)?,
            scale: row
                .get::<_, String>(3)?
                .parse()
                .unwrap_or_default(),
            algorithm: row
                .get::<_, String>(4)?
                .parse()
                .unwrap_or_default(),
            status: SessionStatus::from_str_lossy(&row.get::<_, String>(5)?),
        })
    });

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_sessions(db: &DbConnection) -> DbResult<Vec<SessionSummary>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.created_at, s.status, COUNT(a.id) as attempt_count
         FROM sessions s
         LEFT JOIN attempts a ON s.id = a.session_id
         GROUP BY s.id
         ORDER BY s.created_at DESC",
    )?;

    let sessions = stmt
        .query_map([], |row| {
            Ok(SessionSummary {
                id: parse_uuid(0, &row.get::<_, String>(0)?)?,
                name: row.get(1)?,
                created_at: parse_datetime(2, &row.get::<_, String>(2)?)?,
                status: SessionStatus::from_str_lossy(&row.get::<_, String>(3)?),
                attempt_count: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

pub fn update_session_status(
    db: &DbConnection,
    id: &Uuid,
    status: SessionStatus,
) -> DbResult<()> {
    let conn = db.lock();
    conn.execute(
        "UPDATE sessions SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    Ok(())
}

// ==================== ATTEMPTS ====================

pub fn record_attempt(
    db: &DbConnection,
    session_id: &Uuid,
    attempt: &Attempt,
) -> DbResult<AttemptRecord> {
    let record = AttemptRecord {
        id: Uuid::new_v4(),
        session_id: *session_id,
        created_at: attempt.at,
        riddle_note: attempt.riddle.to_string(),
        guess_note: attempt.guess.to_string(),
        frequency_hz: attempt.frequency_hz as f64,
        probability: attempt.probability as f64,
        correct: attempt.correct,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO attempts
         (id, session_id, created_at, riddle_note, guess_note, frequency_hz, probability, correct)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id.to_string(),
            record.session_id.to_string(),
            record.created_at.to_rfc3339(),
            record.riddle_note,
            record.guess_note,
            record.frequency_hz,
            record.probability,
            record.correct as i64,
        ],
    )?;

    Ok(record)
}

pub fn list_attempts(db: &DbConnection, session_id: &Uuid) -> DbResult<Vec<AttemptRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, session_id, created_at, riddle_note, guess_note, frequency_hz, probability, correct
         FROM attempts WHERE session_id = ?1
         ORDER BY created_at ASC",
    )?;

    let attempts = stmt
        .query_map([session_id.to_string()], |row| {
            Ok(AttemptRecord {
                id: parse_uuid(0, &row.get::<_, String>(0)?)?,
                session_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
                created_at: parse_datetime(2, &row.get::<_, String>(2)?)?,
                riddle_note: row.get(3)?,
                guess_note: row.get(4)?,
                frequency_hz: row.get(5)?,
                probability: row.get(6)?,
                correct: row.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(attempts)
}

// ==================== COMPOSITIONS ====================

pub fn create_composition(
    db: &DbConnection,
    session_id: Option<&Uuid>,
    composition: &Composition,
) -> DbResult<CompositionRecord> {
    let record = CompositionRecord {
        id: composition.id,
        session_id: session_id.copied(),
        created_at: Utc::now(),
        name: composition.name.clone(),
        note_count: composition.note_count() as i64,
        duration_ms: composition.duration_ms(),
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO compositions (id, session_id, created_at, name, note_count, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.session_id.map(|id| id.to_string()),
            record.created_at.to_rfc3339(),
            record.name,
            record.note_count,
            record.duration_ms,
        ],
    )?;

    Ok(record)
}

pub fn get_composition(db: &DbConnection, id: &Uuid) -> DbResult<Option<CompositionRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, session_id, created_at, name, note_count, duration_ms
         FROM compositions WHERE id = ?1",
    )?;

    let result = stmt.query_row([id.to_string()], |row| {
        let session_id = match row.get::<_, Option<String>>(1)? {
            Some(value) => Some(parse_uuid(1, &value)?),
            None => None,
        };
        Ok(CompositionRecord {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            session_id,
            created_at: parse_datetime(2, &row.get::<_, String>(2)?)?,
            name: row.get(3)?,
            note_count: row.get(4)?,
            duration_ms: row.get(5)?,
        })
    });

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_composition_with_artifacts(
    db: &DbConnection,
    id: &Uuid,
) -> DbResult<Option<CompositionWithArtifacts>> {
    let composition = match get_composition(db, id)? {
        Some(composition) => composition,
        None => return Ok(None),
    };
    let artifacts = list_artifacts(db, id)?;
    Ok(Some(CompositionWithArtifacts {
        composition,
        artifacts,
    }))
}

// ==================== ARTIFACTS ====================

pub fn create_artifact(
    db: &DbConnection,
    composition_id: &Uuid,
    kind: ArtifactKind,
    path: String,
    sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        composition_id: *composition_id,
        kind,
        path,
        sha256,
        bytes,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO artifacts (id, composition_id, kind, path, sha256, bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            artifact.id.to_string(),
            artifact.composition_id.to_string(),
            artifact.kind.as_str(),
            artifact.path,
            artifact.sha256,
            artifact.bytes,
        ],
    )?;

    Ok(artifact)
}

pub fn list_artifacts(db: &DbConnection, composition_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, composition_id, kind, path, sha256, bytes
         FROM artifacts WHERE composition_id = ?1",
    )?;

    let artifacts = stmt
        .query_map([composition_id.to_string()], |row| {
            Ok(Artifact {
                id: parse_uuid(0, &row.get::<_, String>(0)?)?,
                composition_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
                kind: ArtifactKind::from_str_lossy(&row.get::<_, String>(2)?),
                path: row.get(3)?,
                sha256: row.get(4)?,
                bytes: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}

/// Find one artifact of a given kind, e.g. the MIDI export for download.
pub fn find_artifact(
    db: &DbConnection,
    composition_id: &Uuid,
    kind: ArtifactKind,
) -> DbResult<Option<Artifact>> {
    Ok(list_artifacts(db, composition_id)?
        .into_iter()
        .find(|a| a.kind == kind))
}
