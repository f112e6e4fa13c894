//! Single-shot relays to the language model and the voice service.
//!
//! These endpoints exist for experimenting with the models directly. They
//! write no rows and should not be exposed to the Internet.

use crate::api::ApiError;
use crate::api_voice::content_type;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Extension, Json, Path},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reconn_pipeline::validate::check_wav;
use reconn_types::LocalModel;
use reconn_voice::SynthesisParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub language: String,
    pub content: String,
}

/// Handler for `POST /api/transcribe-rt`.
pub async fn transcribe_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    check_wav(content_type(&headers), &body)?;
    let transcription = state.pipeline.transcribe(&body).await?;
    Ok(Json(TranscriptionResponse {
        language: transcription.language,
        content: transcription.text,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePromptRequest {
    #[serde(default)]
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Serialize)]
pub struct SinglePromptResponse {
    pub reply: String,
}

/// Handler for `POST /api/converse-single-prompt`.
pub async fn single_prompt_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SinglePromptRequest>,
) -> Result<Json<SinglePromptResponse>, ApiError> {
    let reply = state
        .pipeline
        .single_prompt(&payload.system_prompt, &payload.user_prompt)
        .await?;
    Ok(Json(SinglePromptResponse { reply }))
}

#[derive(Debug, Serialize)]
pub struct RelayCloneResponse {
    pub model: String,
}

/// Handler for `POST /api/clone-rt/{key}`.
pub async fn relay_clone_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RelayCloneResponse>, ApiError> {
    check_wav(content_type(&headers), &body)?;
    let model = state.pipeline.relay_clone(&key, &body).await?;
    Ok(Json(RelayCloneResponse { model }))
}

#[derive(Debug, Deserialize)]
pub struct RelaySynthesisRequest {
    pub text: String,
    #[serde(flatten)]
    pub params: SynthesisParams,
}

/// Handler for `POST /api/tts-rt/{key}`. Answers with the wav bytes.
pub async fn relay_synthesis_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    Json(payload): Json<RelaySynthesisRequest>,
) -> Result<Response, ApiError> {
    let audio = state
        .pipeline
        .relay_synthesize(&key, &payload.text, &payload.params)
        .await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/wav")],
        Body::from(audio),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct LocalModelsResponse {
    /// Keyed by model key.
    pub models: BTreeMap<String, LocalModel>,
}

/// Handler for `GET /api/voice-model`.
pub async fn list_local_models_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<LocalModelsResponse>, ApiError> {
    let models = state
        .pipeline
        .list_local_models()
        .await?
        .into_iter()
        .map(|m| (m.key.clone(), m))
        .collect();
    Ok(Json(LocalModelsResponse { models }))
}
