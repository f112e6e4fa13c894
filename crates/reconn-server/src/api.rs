//! API error mapping and the user / persona handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reconn_db::{
    create_persona, create_user, get_persona, get_user, get_user_by_name, list_personas,
    list_users, update_context_prompt, DbError,
};
use reconn_pipeline::PipelineError;
use reconn_storage::StorageError;
use reconn_types::{AiPersona, User};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::NotFound(what) => ApiError::NotFound(what),
            e @ PipelineError::NoVoiceModel(_) => ApiError::NotFound(e.to_string()),
            PipelineError::Storage(StorageError::NotFound { container, name }) => {
                ApiError::NotFound(format!("{container}/{name}"))
            }
            e @ PipelineError::Storage(StorageError::InvalidName(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            e @ PipelineError::InvalidTransition(_) => ApiError::Conflict(e.to_string()),
            PipelineError::Database(DbError::Database(e)) if is_constraint_violation(&e) => {
                ApiError::Conflict(e.to_string())
            }
            other => {
                tracing::error!(kind = other.kind(), error = %other, "request failed");
                ApiError::InternalServerError(other.to_string())
            }
        }
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonaRequest {
    pub name: String,
    #[serde(default)]
    pub context_prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContextPromptRequest {
    pub context_prompt: String,
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Handler for `POST /api/users`.
pub async fn create_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = required("name", &payload.name)?;
    let user = state
        .pipeline
        .with_conn(move |c| create_user(c, &name))
        .await?;
    tracing::info!(user_id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for `GET /api/users`.
pub async fn list_users_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.pipeline.with_conn(list_users).await?;
    Ok(Json(users))
}

/// Handler for `GET /api/users/by-name/{name}`.
pub async fn get_user_by_name_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .pipeline
        .with_conn(move |c| get_user_by_name(c, &name))
        .await?;
    Ok(Json(user))
}

/// Handler for `POST /api/users/{userId}/personas`.
pub async fn create_persona_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<CreatePersonaRequest>,
) -> Result<(StatusCode, Json<AiPersona>), ApiError> {
    let name = required("name", &payload.name)?;
    let persona = state
        .pipeline
        .with_conn(move |c| {
            get_user(c, user_id)?;
            create_persona(c, user_id, &name, &payload.context_prompt)
        })
        .await?;
    tracing::info!(user_id, persona_id = persona.id, "persona created");
    Ok((StatusCode::CREATED, Json(persona)))
}

/// Handler for `GET /api/users/{userId}/personas`.
pub async fn list_personas_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<AiPersona>>, ApiError> {
    let personas = state
        .pipeline
        .with_conn(move |c| {
            get_user(c, user_id)?;
            list_personas(c, user_id)
        })
        .await?;
    Ok(Json(personas))
}

/// Handler for `GET /api/personas/{personaId}`.
pub async fn get_persona_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
) -> Result<Json<AiPersona>, ApiError> {
    let persona = state
        .pipeline
        .with_conn(move |c| get_persona(c, persona_id))
        .await?;
    Ok(Json(persona))
}

/// Handler for `PUT /api/personas/{personaId}/context-prompt`.
///
/// Applies to completions started after the update; a turn already holding
/// the persona's lock keeps the prompt it read.
pub async fn update_context_prompt_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    Json(payload): Json<UpdateContextPromptRequest>,
) -> Result<Json<AiPersona>, ApiError> {
    let persona = state
        .pipeline
        .with_conn(move |c| update_context_prompt(c, persona_id, &payload.context_prompt))
        .await?;
    Ok(Json(persona))
}
