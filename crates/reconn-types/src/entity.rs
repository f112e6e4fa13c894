//! Entity snapshots as stored in and returned from the row store.
//!
//! Field names serialize in camelCase because these snapshots are returned
//! verbatim by the HTTP API.

use crate::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account that owns personas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// A configured chat identity with its own system prompt and cloned voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPersona {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// System prompt prepended to every chat completion for this persona.
    pub context_prompt: String,
}

/// A recorded waveform of the voice to clone. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSample {
    pub id: i64,
    pub ai_persona_id: i64,
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
}

/// A voice model cloned from a sample.
///
/// `file_name` is only meaningful once `status` is `Ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceModel {
    pub id: i64,
    pub voice_sample_id: i64,
    pub status: Status,
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
    /// Number of times the GPU worker has picked this row up.
    pub attempts: u32,
    /// Last failure recorded by the worker.
    pub error: Option<String>,
}

/// The newest ready voice model of a persona, joined with the persona's prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestVoiceModel {
    pub ai_persona_id: i64,
    pub context_prompt: String,
    pub model: VoiceModel,
}

/// Envelope for one inbound user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrompt {
    pub id: i64,
    pub ai_persona_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTextPrompt {
    pub id: i64,
    pub user_prompt_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVoicePrompt {
    pub id: i64,
    pub user_prompt_id: i64,
    pub status: Status,
    pub file_name: String,
    pub transcription: Option<String>,
}

/// The language model's answer to one user prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPersonReply {
    pub id: i64,
    pub user_prompt_id: i64,
    pub status: Status,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The synthesized speech of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPersonReplyVoice {
    pub id: i64,
    pub ai_person_reply_id: i64,
    pub status: Status,
    pub file_name: String,
    pub attempts: u32,
    pub error: Option<String>,
}

/// A cloned model file sitting in the local model directory, whether or not
/// any row refers to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalModel {
    pub file_name: String,
    /// The file name without its model suffix, as used for synthesis.
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One back-and-forth of a persona's conversation, flattened for readers.
///
/// Exactly one of `text_message` / `voice_transcription` is set for a
/// well-formed prompt; the reply columns are empty while no reply exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    pub user_prompt_id: i64,
    pub timestamp: DateTime<Utc>,
    pub text_message: Option<String>,
    pub voice_file_name: Option<String>,
    pub voice_transcription: Option<String>,
    pub reply_id: Option<i64>,
    pub reply_message: Option<String>,
    pub reply_voice_id: Option<i64>,
    pub reply_voice_status: Option<Status>,
    pub reply_voice_file_name: Option<String>,
}

impl ConversationRow {
    /// The user's side of the exchange: the transcription of a voice prompt,
    /// or else the text message. Empty strings count as absent.
    pub fn user_utterance(&self) -> Option<&str> {
        self.voice_transcription
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.text_message.as_deref().filter(|s| !s.is_empty()))
    }

    /// The persona's side of the exchange, if a non-empty reply exists.
    pub fn reply(&self) -> Option<&str> {
        self.reply_message.as_deref().filter(|s| !s.is_empty())
    }
}
