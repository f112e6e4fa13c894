//! Voice sample and voice model handlers.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json, Path},
    http::{header, HeaderMap, StatusCode},
};
use reconn_db::{get_latest_ready_voice_model, get_persona, get_voice_model, list_voice_samples};
use reconn_pipeline::validate::check_wav;
use reconn_types::{LatestVoiceModel, VoiceModel, VoiceSample};
use std::sync::Arc;

/// The request's `Content-Type`, if present and readable.
pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Handler for `POST /api/personas/{personaId}/voice-samples`.
pub async fn create_voice_sample_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<VoiceSample>), ApiError> {
    check_wav(content_type(&headers), &body)?;
    let sample = state.pipeline.create_voice_sample(persona_id, &body).await?;
    Ok((StatusCode::CREATED, Json(sample)))
}

/// Handler for `GET /api/personas/{personaId}/voice-samples`.
pub async fn list_voice_samples_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
) -> Result<Json<Vec<VoiceSample>>, ApiError> {
    let samples = state
        .pipeline
        .with_conn(move |c| {
            get_persona(c, persona_id)?;
            list_voice_samples(c, persona_id)
        })
        .await?;
    Ok(Json(samples))
}

/// Handler for `GET /api/personas/{personaId}/voice-models/latest`.
pub async fn latest_voice_model_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(persona_id): Path<i64>,
) -> Result<Json<LatestVoiceModel>, ApiError> {
    let latest = state
        .pipeline
        .with_conn(move |c| {
            get_persona(c, persona_id)?;
            get_latest_ready_voice_model(c, persona_id)
        })
        .await?;
    Ok(Json(latest))
}

/// Handler for `GET /api/voice-models/{id}`.
pub async fn get_voice_model_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<VoiceModel>, ApiError> {
    let model = state
        .pipeline
        .with_conn(move |c| get_voice_model(c, id))
        .await?;
    Ok(Json(model))
}

/// Handler for `POST /api/voice-samples/{sampleId}/voice-models`.
pub async fn clone_voice_model_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(sample_id): Path<i64>,
) -> Result<(StatusCode, Json<VoiceModel>), ApiError> {
    let model = state.pipeline.clone_voice_model(sample_id).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

/// Handler for `POST /api/voice-samples/{sampleId}/voice-models/async`.
///
/// Returns the `processing` row; poll `GET /api/voice-models/{id}` for
/// completion.
pub async fn clone_voice_model_async_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(sample_id): Path<i64>,
) -> Result<Json<VoiceModel>, ApiError> {
    let model = state.pipeline.clone_voice_model_async(sample_id).await?;
    Ok(Json(model))
}
