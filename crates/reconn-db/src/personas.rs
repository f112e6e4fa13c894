//! Users and AI personas.

use crate::DbError;
use reconn_types::{AiPersona, User};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn map_persona(row: &Row<'_>) -> rusqlite::Result<AiPersona> {
    Ok(AiPersona {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        context_prompt: row.get(3)?,
    })
}

pub fn create_user(conn: &Connection, name: &str) -> Result<User, DbError> {
    conn.execute("INSERT INTO users (name) VALUES (?1)", [name])?;
    Ok(User {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name FROM users ORDER BY id ASC")?;
    let rows = stmt.query_map([], map_user)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User, DbError> {
    conn.query_row("SELECT id, name FROM users WHERE id = ?1", [id], map_user)
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("user {id}")))
}

pub fn get_user_by_name(conn: &Connection, name: &str) -> Result<User, DbError> {
    conn.query_row(
        "SELECT id, name FROM users WHERE name = ?1",
        [name],
        map_user,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("user {name}")))
}

pub fn create_persona(
    conn: &Connection,
    user_id: i64,
    name: &str,
    context_prompt: &str,
) -> Result<AiPersona, DbError> {
    conn.execute(
        "INSERT INTO ai_persons (user_id, name, context_prompt) VALUES (?1, ?2, ?3)",
        params![user_id, name, context_prompt],
    )?;
    Ok(AiPersona {
        id: conn.last_insert_rowid(),
        user_id,
        name: name.to_string(),
        context_prompt: context_prompt.to_string(),
    })
}

pub fn get_persona(conn: &Connection, id: i64) -> Result<AiPersona, DbError> {
    conn.query_row(
        "SELECT id, user_id, name, context_prompt FROM ai_persons WHERE id = ?1",
        [id],
        map_persona,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("ai person {id}")))
}

pub fn list_personas(conn: &Connection, user_id: i64) -> Result<Vec<AiPersona>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, context_prompt FROM ai_persons
         WHERE user_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([user_id], map_persona)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Replaces the system prompt used for the persona's future completions.
pub fn update_context_prompt(
    conn: &Connection,
    id: i64,
    context_prompt: &str,
) -> Result<AiPersona, DbError> {
    let count = conn.execute(
        "UPDATE ai_persons SET context_prompt = ?1 WHERE id = ?2",
        params![context_prompt, id],
    )?;
    if count == 0 {
        return Err(DbError::NotFound(format!("ai person {id}")));
    }
    get_persona(conn, id)
}
