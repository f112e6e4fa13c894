//! Voice samples and the voice models cloned from them.

use crate::sql::{
    bump_attempts, finish_row, status_column, ts_column, ts_stored, ts_to_sql, Finish,
};
use crate::DbError;
use chrono::{DateTime, Utc};
use reconn_types::{LatestVoiceModel, Status, VoiceModel, VoiceSample};
use rusqlite::{params, Connection, OptionalExtension, Row};

const VOICE_MODEL_COLUMNS: &str = "id, voice_sample_id, status, file_name, timestamp, attempts, error";

fn map_sample(row: &Row<'_>) -> rusqlite::Result<VoiceSample> {
    Ok(VoiceSample {
        id: row.get(0)?,
        ai_persona_id: row.get(1)?,
        file_name: row.get(2)?,
        timestamp: ts_column(row, 3)?,
    })
}

/// Maps the seven voice model columns starting at `offset`.
fn map_model_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<VoiceModel> {
    Ok(VoiceModel {
        id: row.get(offset)?,
        voice_sample_id: row.get(offset + 1)?,
        status: status_column(row, offset + 2)?,
        file_name: row.get(offset + 3)?,
        timestamp: ts_column(row, offset + 4)?,
        attempts: row.get(offset + 5)?,
        error: row.get(offset + 6)?,
    })
}

pub fn create_voice_sample(
    conn: &Connection,
    ai_persona_id: i64,
    file_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<VoiceSample, DbError> {
    create_voice_sample_named(conn, ai_persona_id, timestamp, |_| file_name.to_string())
}

/// Inserts a voice sample whose file name is derived from its own id.
///
/// The insert and the naming commit together, so the row never carries
/// a name another sample could also receive.
pub fn create_voice_sample_named(
    conn: &Connection,
    ai_persona_id: i64,
    timestamp: DateTime<Utc>,
    file_name: impl FnOnce(i64) -> String,
) -> Result<VoiceSample, DbError> {
    let timestamp = ts_stored(timestamp);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO voice_samples (ai_person_id, file_name, timestamp) VALUES (?1, '', ?2)",
        params![ai_persona_id, ts_to_sql(&timestamp)],
    )?;
    let id = tx.last_insert_rowid();
    let file_name = file_name(id);
    tx.execute(
        "UPDATE voice_samples SET file_name = ?1 WHERE id = ?2",
        params![file_name, id],
    )?;
    tx.commit()?;
    Ok(VoiceSample {
        id,
        ai_persona_id,
        file_name,
        timestamp,
    })
}

/// Removes a sample that no voice model references yet.
pub fn delete_voice_sample(conn: &Connection, id: i64) -> Result<(), DbError> {
    let count = conn.execute(
        "DELETE FROM voice_samples
         WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM voice_models WHERE voice_sample_id = ?1)",
        [id],
    )?;
    if count == 0 {
        return Err(DbError::NotFound(format!("unreferenced voice sample {id}")));
    }
    Ok(())
}

pub fn get_voice_sample(conn: &Connection, id: i64) -> Result<VoiceSample, DbError> {
    conn.query_row(
        "SELECT id, ai_person_id, file_name, timestamp FROM voice_samples WHERE id = ?1",
        [id],
        map_sample,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("voice sample {id}")))
}

/// Lists a persona's voice samples, newest first.
pub fn list_voice_samples(
    conn: &Connection,
    ai_persona_id: i64,
) -> Result<Vec<VoiceSample>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, ai_person_id, file_name, timestamp FROM voice_samples
         WHERE ai_person_id = ?1 ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt.query_map([ai_persona_id], map_sample)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Inserts a voice model row. It is visible to readers immediately.
pub fn create_voice_model(
    conn: &Connection,
    voice_sample_id: i64,
    status: Status,
    file_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<VoiceModel, DbError> {
    let timestamp = ts_stored(timestamp);
    conn.execute(
        "INSERT INTO voice_models (voice_sample_id, status, file_name, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![voice_sample_id, status.as_str(), file_name, ts_to_sql(&timestamp)],
    )?;
    Ok(VoiceModel {
        id: conn.last_insert_rowid(),
        voice_sample_id,
        status,
        file_name: file_name.to_string(),
        timestamp,
        attempts: 0,
        error: None,
    })
}

pub fn get_voice_model(conn: &Connection, id: i64) -> Result<VoiceModel, DbError> {
    conn.query_row(
        &format!("SELECT {VOICE_MODEL_COLUMNS} FROM voice_models WHERE id = ?1"),
        [id],
        |row| map_model_at(row, 0),
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("voice model {id}")))
}

/// Returns the persona's most recent `ready` voice model along with the
/// persona's context prompt.
///
/// "Most recent" is by model timestamp, ties broken by the higher id.
pub fn get_latest_ready_voice_model(
    conn: &Connection,
    ai_persona_id: i64,
) -> Result<LatestVoiceModel, DbError> {
    conn.query_row(
        "SELECT p.id, p.context_prompt,
                m.id, m.voice_sample_id, m.status, m.file_name, m.timestamp, m.attempts, m.error
         FROM ai_persons p
         JOIN voice_samples s ON s.ai_person_id = p.id
         JOIN voice_models m ON m.voice_sample_id = s.id
         WHERE p.id = ?1 AND m.status = 'ready'
         ORDER BY m.timestamp DESC, m.id DESC
         LIMIT 1",
        [ai_persona_id],
        |row| {
            Ok(LatestVoiceModel {
                ai_persona_id: row.get(0)?,
                context_prompt: row.get(1)?,
                model: map_model_at(row, 2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("ready voice model for ai person {ai_persona_id}")))
}

/// Moves a `processing` voice model to `ready` with its real file name.
pub fn complete_voice_model(
    conn: &Connection,
    id: i64,
    file_name: &str,
) -> Result<VoiceModel, DbError> {
    finish_row(conn, "voice_models", "voice model", id, Finish::Ready { file_name })?;
    get_voice_model(conn, id)
}

/// Moves a `processing` voice model to `failed`, recording why.
pub fn fail_voice_model(conn: &Connection, id: i64, error: &str) -> Result<VoiceModel, DbError> {
    finish_row(conn, "voice_models", "voice model", id, Finish::Failed { error })?;
    get_voice_model(conn, id)
}

/// Counts a worker attempt against a `processing` voice model and returns the
/// row as it is now. Terminal rows come back unchanged.
pub fn record_voice_model_attempt(conn: &Connection, id: i64) -> Result<VoiceModel, DbError> {
    bump_attempts(conn, "voice_models", id)?;
    get_voice_model(conn, id)
}
