//! Chat completion and speech transcription.

use crate::config::LlmConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use reconn_types::Turn;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "language model";

/// Text recognised in an audio clip.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub language: String,
    pub text: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends the ordered turns (system prompt first) and returns the text
    /// of every choice in the response, in order.
    async fn chat_completion(
        &self,
        turns: &[Turn],
        max_tokens: u32,
    ) -> Result<Vec<String>, VoiceError>;

    /// Transcribes a wav clip.
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcription, VoiceError>;
}

/// [`LanguageModel`] over an OpenAI-compatible REST API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, VoiceError> {
        if config.base_url.trim().is_empty() {
            return Err(VoiceError::Config("llm.base_url must be set".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn chat_completion(
        &self,
        turns: &[Turn],
        max_tokens: u32,
    ) -> Result<Vec<String>, VoiceError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: turns,
            max_tokens,
        };
        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::transport(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(SERVICE, response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::decode(SERVICE, e))?;
        tracing::debug!(
            turns = turns.len(),
            choices = body.choices.len(),
            "chat completion returned"
        );
        Ok(body
            .choices
            .into_iter()
            .map(|c| c.message.content.unwrap_or_default())
            .collect())
    }

    async fn transcribe(&self, wav: &[u8]) -> Result<Transcription, VoiceError> {
        let file = Part::bytes(wav.to_vec())
            .file_name("input.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Config(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::transport(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(VoiceError::from_response(SERVICE, response).await);
        }

        let transcription: Transcription = response
            .json()
            .await
            .map_err(|e| VoiceError::decode(SERVICE, e))?;
        tracing::debug!(
            language = %transcription.language,
            chars = transcription.text.len(),
            "transcription returned"
        );
        Ok(transcription)
    }
}
