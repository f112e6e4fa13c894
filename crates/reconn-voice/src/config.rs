use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings for the chat-completion and transcription provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub chat_model: String,
    pub transcription_model: String,
    /// Response length cap attached to every completion request.
    pub max_tokens: u32,
    /// Number of most recent conversation rows replayed as context.
    pub history_limit: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            chat_model: "gpt-4".to_string(),
            transcription_model: "whisper-1".to_string(),
            max_tokens: 50,
            history_limit: 10,
            timeout_secs: 180,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("chat_model", &self.chat_model)
            .field("transcription_model", &self.transcription_model)
            .field("max_tokens", &self.max_tokens)
            .field("history_limit", &self.history_limit)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings for the voice cloning / TTS service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for VoiceServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 300,
        }
    }
}
