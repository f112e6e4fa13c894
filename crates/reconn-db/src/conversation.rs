//! User prompts, persona replies, and reply voices.

use crate::sql::{
    bump_attempts, finish_row, opt_status_column, status_column, ts_column, ts_stored, ts_to_sql,
    Finish,
};
use crate::DbError;
use chrono::{DateTime, Utc};
use reconn_types::{
    AiPersonReply, AiPersonReplyVoice, ConversationRow, Status, UserPrompt, UserTextPrompt,
    UserVoicePrompt,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn map_reply(row: &Row<'_>) -> rusqlite::Result<AiPersonReply> {
    Ok(AiPersonReply {
        id: row.get(0)?,
        user_prompt_id: row.get(1)?,
        status: status_column(row, 2)?,
        message: row.get(3)?,
        timestamp: ts_column(row, 4)?,
    })
}

fn map_reply_voice(row: &Row<'_>) -> rusqlite::Result<AiPersonReplyVoice> {
    Ok(AiPersonReplyVoice {
        id: row.get(0)?,
        ai_person_reply_id: row.get(1)?,
        status: status_column(row, 2)?,
        file_name: row.get(3)?,
        attempts: row.get(4)?,
        error: row.get(5)?,
    })
}

fn map_conversation_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        user_prompt_id: row.get(0)?,
        timestamp: ts_column(row, 1)?,
        text_message: row.get(2)?,
        voice_file_name: row.get(3)?,
        voice_transcription: row.get(4)?,
        reply_id: row.get(5)?,
        reply_message: row.get(6)?,
        reply_voice_id: row.get(7)?,
        reply_voice_status: opt_status_column(row, 8)?,
        reply_voice_file_name: row.get(9)?,
    })
}

fn insert_prompt(
    conn: &Connection,
    ai_persona_id: i64,
    timestamp: DateTime<Utc>,
) -> Result<UserPrompt, DbError> {
    let timestamp = ts_stored(timestamp);
    conn.execute(
        "INSERT INTO user_prompts (ai_person_id, timestamp) VALUES (?1, ?2)",
        params![ai_persona_id, ts_to_sql(&timestamp)],
    )?;
    Ok(UserPrompt {
        id: conn.last_insert_rowid(),
        ai_persona_id,
        timestamp,
    })
}

/// Creates a prompt envelope together with its text sub-record.
///
/// Both rows are written in one transaction so a prompt never exists
/// without exactly one sub-record.
pub fn create_text_prompt(
    conn: &Connection,
    ai_persona_id: i64,
    timestamp: DateTime<Utc>,
    message: &str,
) -> Result<(UserPrompt, UserTextPrompt), DbError> {
    let tx = conn.unchecked_transaction()?;
    let prompt = insert_prompt(&tx, ai_persona_id, timestamp)?;
    tx.execute(
        "INSERT INTO user_text_prompts (user_prompt_id, message) VALUES (?1, ?2)",
        params![prompt.id, message],
    )?;
    let text = UserTextPrompt {
        id: tx.last_insert_rowid(),
        user_prompt_id: prompt.id,
        message: message.to_string(),
    };
    tx.commit()?;
    Ok((prompt, text))
}

/// Creates a prompt envelope together with its voice sub-record.
pub fn create_voice_prompt(
    conn: &Connection,
    ai_persona_id: i64,
    timestamp: DateTime<Utc>,
    status: Status,
    file_name: &str,
    transcription: Option<&str>,
) -> Result<(UserPrompt, UserVoicePrompt), DbError> {
    create_voice_prompt_named(
        conn,
        ai_persona_id,
        timestamp,
        status,
        |_| file_name.to_string(),
        transcription,
    )
}

/// Like [`create_voice_prompt`], with the audio file name derived from the
/// new user prompt id.
pub fn create_voice_prompt_named(
    conn: &Connection,
    ai_persona_id: i64,
    timestamp: DateTime<Utc>,
    status: Status,
    file_name: impl FnOnce(i64) -> String,
    transcription: Option<&str>,
) -> Result<(UserPrompt, UserVoicePrompt), DbError> {
    let tx = conn.unchecked_transaction()?;
    let prompt = insert_prompt(&tx, ai_persona_id, timestamp)?;
    let file_name = file_name(prompt.id);
    tx.execute(
        "INSERT INTO user_voice_prompts (user_prompt_id, status, file_name, transcription)
         VALUES (?1, ?2, ?3, ?4)",
        params![prompt.id, status.as_str(), file_name, transcription],
    )?;
    let voice = UserVoicePrompt {
        id: tx.last_insert_rowid(),
        user_prompt_id: prompt.id,
        status,
        file_name,
        transcription: transcription.map(str::to_string),
    };
    tx.commit()?;
    Ok((prompt, voice))
}

pub fn get_user_prompt(conn: &Connection, id: i64) -> Result<UserPrompt, DbError> {
    conn.query_row(
        "SELECT id, ai_person_id, timestamp FROM user_prompts WHERE id = ?1",
        [id],
        |row| {
            Ok(UserPrompt {
                id: row.get(0)?,
                ai_persona_id: row.get(1)?,
                timestamp: ts_column(row, 2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("user prompt {id}")))
}

/// Returns up to `limit` exchanges of a persona, newest prompt first.
pub fn list_conversation(
    conn: &Connection,
    ai_persona_id: i64,
    limit: u32,
) -> Result<Vec<ConversationRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.timestamp, t.message, v.file_name, v.transcription,
                r.id, r.message, rv.id, rv.status, rv.file_name
         FROM user_prompts p
         LEFT JOIN user_text_prompts t ON t.user_prompt_id = p.id
         LEFT JOIN user_voice_prompts v ON v.user_prompt_id = p.id
         LEFT JOIN ai_person_replies r ON r.user_prompt_id = p.id
         LEFT JOIN ai_person_reply_voices rv ON rv.ai_person_reply_id = r.id
         WHERE p.ai_person_id = ?1
         ORDER BY p.timestamp DESC, p.id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![ai_persona_id, limit], map_conversation_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn create_reply(
    conn: &Connection,
    user_prompt_id: i64,
    status: Status,
    message: &str,
    timestamp: DateTime<Utc>,
) -> Result<AiPersonReply, DbError> {
    let timestamp = ts_stored(timestamp);
    conn.execute(
        "INSERT INTO ai_person_replies (user_prompt_id, status, message, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_prompt_id, status.as_str(), message, ts_to_sql(&timestamp)],
    )?;
    Ok(AiPersonReply {
        id: conn.last_insert_rowid(),
        user_prompt_id,
        status,
        message: message.to_string(),
        timestamp,
    })
}

pub fn get_reply(conn: &Connection, id: i64) -> Result<AiPersonReply, DbError> {
    conn.query_row(
        "SELECT id, user_prompt_id, status, message, timestamp
         FROM ai_person_replies WHERE id = ?1",
        [id],
        map_reply,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("ai person reply {id}")))
}

/// Inserts a reply voice row. It is visible to readers immediately.
pub fn create_reply_voice(
    conn: &Connection,
    ai_person_reply_id: i64,
    status: Status,
    file_name: &str,
) -> Result<AiPersonReplyVoice, DbError> {
    conn.execute(
        "INSERT INTO ai_person_reply_voices (ai_person_reply_id, status, file_name)
         VALUES (?1, ?2, ?3)",
        params![ai_person_reply_id, status.as_str(), file_name],
    )?;
    Ok(AiPersonReplyVoice {
        id: conn.last_insert_rowid(),
        ai_person_reply_id,
        status,
        file_name: file_name.to_string(),
        attempts: 0,
        error: None,
    })
}

pub fn get_reply_voice(conn: &Connection, id: i64) -> Result<AiPersonReplyVoice, DbError> {
    conn.query_row(
        "SELECT id, ai_person_reply_id, status, file_name, attempts, error
         FROM ai_person_reply_voices WHERE id = ?1",
        [id],
        map_reply_voice,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("ai person reply voice {id}")))
}

pub fn complete_reply_voice(
    conn: &Connection,
    id: i64,
    file_name: &str,
) -> Result<AiPersonReplyVoice, DbError> {
    finish_row(
        conn,
        "ai_person_reply_voices",
        "ai person reply voice",
        id,
        Finish::Ready { file_name },
    )?;
    get_reply_voice(conn, id)
}

pub fn fail_reply_voice(
    conn: &Connection,
    id: i64,
    error: &str,
) -> Result<AiPersonReplyVoice, DbError> {
    finish_row(
        conn,
        "ai_person_reply_voices",
        "ai person reply voice",
        id,
        Finish::Failed { error },
    )?;
    get_reply_voice(conn, id)
}

pub fn record_reply_voice_attempt(
    conn: &Connection,
    id: i64,
) -> Result<AiPersonReplyVoice, DbError> {
    bump_attempts(conn, "ai_person_reply_voices", id)?;
    get_reply_voice(conn, id)
}
