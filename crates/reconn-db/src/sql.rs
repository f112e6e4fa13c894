//! Column conversions shared by the row mappers.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use reconn_types::Status;
use rusqlite::types::Type;
use rusqlite::Row;

/// Formats a timestamp so that lexical order equals chronological order.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The timestamp exactly as it will read back from the database.
pub(crate) fn ts_stored(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

pub(crate) fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Status>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Terminal outcome written onto a `processing` row.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Finish<'a> {
    Ready { file_name: &'a str },
    Failed { error: &'a str },
}

impl Finish<'_> {
    fn status(self) -> Status {
        match self {
            Self::Ready { .. } => Status::Ready,
            Self::Failed { .. } => Status::Failed,
        }
    }
}

/// Moves a `processing` row of `table` to its terminal status.
///
/// The update is guarded on the current status, so a row can only be
/// finished once; a second attempt reports the transition that was refused.
pub(crate) fn finish_row(
    conn: &rusqlite::Connection,
    table: &'static str,
    entity: &str,
    id: i64,
    finish: Finish<'_>,
) -> Result<(), crate::DbError> {
    use rusqlite::{params, OptionalExtension};

    let count = match finish {
        Finish::Ready { file_name } => conn.execute(
            &format!(
                "UPDATE {table} SET status = 'ready', file_name = ?2, error = NULL
                 WHERE id = ?1 AND status = 'processing'"
            ),
            params![id, file_name],
        )?,
        Finish::Failed { error } => conn.execute(
            &format!(
                "UPDATE {table} SET status = 'failed', error = ?2
                 WHERE id = ?1 AND status = 'processing'"
            ),
            params![id, error],
        )?,
    };
    if count == 1 {
        return Ok(());
    }

    let current = conn
        .query_row(
            &format!("SELECT status FROM {table} WHERE id = ?1"),
            [id],
            |row| status_column(row, 0),
        )
        .optional()?;
    match current {
        None => Err(crate::DbError::NotFound(format!("{entity} {id}"))),
        Some(from) => Err(reconn_types::TransitionError {
            from,
            to: finish.status(),
        }
        .into()),
    }
}

/// Counts one more worker attempt on a `processing` row of `table`.
/// Terminal rows are left untouched.
pub(crate) fn bump_attempts(
    conn: &rusqlite::Connection,
    table: &'static str,
    id: i64,
) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "UPDATE {table} SET attempts = attempts + 1 WHERE id = ?1 AND status = 'processing'"
        ),
        [id],
    )
}
