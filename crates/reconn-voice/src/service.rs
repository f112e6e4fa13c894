//! Voice cloning and text-to-speech against the GPU voice service.
//!
//! The service exposes two endpoints:
//! - `POST /clone-rt/{key}` with a wav body, answering `{"model": "<file>.npz"}`
//! - `POST /tts-rt/{key}` with a JSON body, answering wav bytes
//!
//! A model is addressed for synthesis by its filename without the `.npz`
//! suffix (see [`tts_key`]).

use crate::config::VoiceServiceConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "voice service";
/// Suffix of every model file the service writes.
pub const MODEL_SUFFIX: &str = ".npz";

/// Sampling knobs sent with every synthesis request. Missing fields
/// deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisParams {
    pub top_k: u32,
    pub top_p: f32,
    /// Nucleus-filtering threshold.
    #[serde(rename = "mineosP")]
    pub min_eos_p: f32,
    pub semantic_temp: f32,
    pub waveform_temp: f32,
    pub fine_temp: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            top_k: 99,
            top_p: 0.8,
            min_eos_p: 0.01,
            semantic_temp: 0.7,
            waveform_temp: 0.6,
            fine_temp: 0.5,
        }
    }
}

/// Strips the model file suffix to get the key the TTS endpoint expects.
pub fn tts_key(model_file: &str) -> &str {
    model_file.strip_suffix(MODEL_SUFFIX).unwrap_or(model_file)
}

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Clones a voice from a wav sample under `key`, returning the model
    /// filename the service produced.
    async fn clone_voice(&self, key: &str, wav: &[u8]) -> Result<String, VoiceError>;

    /// Renders `text` with the model addressed by `key`, returning wav bytes.
    async fn synthesize(
        &self,
        key: &str,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<u8>, VoiceError>;
}

#[derive(Debug, Clone)]
pub struct VoiceServiceClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CloneResponse {
    model: String,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(flatten)]
    params: &'a SynthesisParams,
}

impl VoiceServiceClient {
    pub fn new(config: &VoiceServiceConfig) -> Result<Self, VoiceError> {
        if config.base_url.trim().is_empty() {
            return Err(VoiceError::Config("voice.base_url must be set".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VoiceProvider for VoiceServiceClient {
    async fn clone_voice(&self, key: &str, wav: &[u8]) -> Result<String, VoiceError> {
        let response = self
            .client
            .post(format!("{}/clone-rt/{}", self.base_url, key))
            .header(CONTENT_TYPE, "audio/wav")
            .body(wav.to_vec())
            .send()
            .await
            .map_err(|e| VoiceError::transport(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(SERVICE, response).await);
        }

        let body: CloneResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::decode(SERVICE, e))?;
        if body.model.trim().is_empty() {
            return Err(VoiceError::decode(SERVICE, "clone response named no model"));
        }
        tracing::info!(key, model = %body.model, "voice cloned");
        Ok(body.model)
    }

    async fn synthesize(
        &self,
        key: &str,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<u8>, VoiceError> {
        let response = self
            .client
            .post(format!("{}/tts-rt/{}", self.base_url, key))
            .json(&SynthesisRequest { text, params })
            .send()
            .await
            .map_err(|e| VoiceError::transport(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(SERVICE, response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::transport(SERVICE, e))?;
        if bytes.is_empty() {
            return Err(VoiceError::decode(SERVICE, "synthesis returned no audio"));
        }
        tracing::debug!(key, bytes = bytes.len(), "speech synthesized");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tts_key_drops_model_suffix() {
        assert_eq!(tts_key("sample-4.npz"), "sample-4");
        assert_eq!(tts_key("already-a-key"), "already-a-key");
    }

    #[test]
    fn synthesis_request_uses_service_field_names() {
        let params = SynthesisParams::default();
        let json = serde_json::to_value(SynthesisRequest {
            text: "hello",
            params: &params,
        })
        .unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["topK"], 99);
        assert!(json.get("mineosP").is_some());
        assert!(json.get("semanticTemp").is_some());
        assert!(json.get("waveformTemp").is_some());
        assert!(json.get("fineTemp").is_some());
    }

    #[test]
    fn partial_params_fill_in_defaults() {
        let params: SynthesisParams =
            serde_json::from_str(r#"{"topK": 50, "mineosP": 0.05}"#).unwrap();
        assert_eq!(params.top_k, 50);
        assert_eq!(params.min_eos_p, 0.05);
        assert_eq!(params.fine_temp, SynthesisParams::default().fine_temp);
    }
}
