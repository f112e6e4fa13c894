//! Conversation turn, history, and voice output handlers.

use crate::api::ApiError;
use crate::api_voice::content_type;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Extension, Json, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reconn_db::{get_persona, get_reply_voice, list_conversation};
use reconn_pipeline::validate::check_wav;
use reconn_types::{AiPersonReplyVoice, ConversationRow};
use serde::Deserialize;
use std::sync::Arc;

/// Rows returned by the history endpoint when no `limit` is given.
const DEFAULT_HISTORY_PAGE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct TextTurnRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// Handler for `POST /api/personas/{personaId}/messages/text`.
pub async fn text_turn_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    Json(payload): Json<TextTurnRequest>,
) -> Result<Json<AiPersonReplyVoice>, ApiError> {
    let voice = state
        .pipeline
        .text_turn(persona_id, &payload.message)
        .await?;
    Ok(Json(voice))
}

/// Handler for `POST /api/personas/{personaId}/messages/text/async`.
///
/// Returns the `processing` reply voice; poll
/// `GET /api/reply-voices/{id}` for completion.
pub async fn text_turn_async_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    Json(payload): Json<TextTurnRequest>,
) -> Result<Json<AiPersonReplyVoice>, ApiError> {
    let voice = state
        .pipeline
        .text_turn_async(persona_id, &payload.message)
        .await?;
    Ok(Json(voice))
}

/// Handler for `POST /api/personas/{personaId}/messages/voice`.
pub async fn voice_turn_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AiPersonReplyVoice>, ApiError> {
    check_wav(content_type(&headers), &body)?;
    let voice = state.pipeline.voice_turn(persona_id, &body).await?;
    Ok(Json(voice))
}

/// Handler for `POST /api/personas/{personaId}/messages/voice/async`.
pub async fn voice_turn_async_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AiPersonReplyVoice>, ApiError> {
    check_wav(content_type(&headers), &body)?;
    let voice = state.pipeline.voice_turn_async(persona_id, &body).await?;
    Ok(Json(voice))
}

/// Handler for `GET /api/personas/{personaId}/conversation`.
///
/// Newest exchange first.
pub async fn conversation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ConversationRow>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_PAGE);
    let rows = state
        .pipeline
        .with_conn(move |c| {
            get_persona(c, persona_id)?;
            list_conversation(c, persona_id, limit)
        })
        .await?;
    Ok(Json(rows))
}

/// Handler for `GET /api/reply-voices/{id}`.
pub async fn get_reply_voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AiPersonReplyVoice>, ApiError> {
    let voice = state
        .pipeline
        .with_conn(move |c| get_reply_voice(c, id))
        .await?;
    Ok(Json(voice))
}

/// Final path component of a requested file name, if it has one.
fn base_name(requested: &str) -> Option<&str> {
    requested
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Handler for `GET /api/voice-output/{fileName}`.
///
/// Serves synthesized replies and stored prompt audio from the output
/// container, going through the local artifact cache.
pub async fn voice_output_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<Response, ApiError> {
    let name = base_name(&file_name)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid file name: {file_name:?}")))?;

    let pipeline = &state.pipeline;
    let layout = pipeline.layout();
    let path = pipeline
        .cache()
        .fetch(&layout.output_container, name, &layout.output_dir)
        .await
        .map_err(reconn_pipeline::PipelineError::from)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read cached voice output");
        ApiError::InternalServerError(format!("failed to read voice output: {e}"))
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/wav")],
        Body::from(bytes),
    )
        .into_response())
}
