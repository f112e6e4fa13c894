//! The GPU task descriptor carried by queue messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding or validating a queue message body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("malformed task body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("task names no work")]
    Empty,
    #[error("task names both a voice model and a reply voice")]
    Ambiguous,
    #[error("task id must be positive: {0}")]
    InvalidId(i64),
}

/// One deferred cloning or synthesis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GpuTask {
    /// Clone the voice sample behind a `processing` voice model row.
    CloneVoice {
        #[serde(rename = "voiceModelId")]
        voice_model_id: i64,
    },
    /// Synthesize the persisted text of a reply into its `processing` voice row.
    SynthesizeReply {
        #[serde(rename = "aiPersonId")]
        ai_person_id: i64,
        #[serde(rename = "replyVoiceId")]
        reply_voice_id: i64,
    },
}

/// Two-optional-field shape produced by older producers.
#[derive(Debug, Default, Deserialize)]
struct LegacyTask {
    #[serde(rename = "VoiceModelID", default)]
    voice_model_id: i64,
    #[serde(rename = "AIReplyPersonID", default)]
    ai_reply_person_id: i64,
    #[serde(rename = "AIReplyVoiceID", default)]
    ai_reply_voice_id: i64,
}

impl LegacyTask {
    fn into_task(self) -> Result<GpuTask, TaskError> {
        let clone = self.voice_model_id > 0;
        let synth = self.ai_reply_person_id > 0 || self.ai_reply_voice_id > 0;
        match (clone, synth) {
            (true, true) => Err(TaskError::Ambiguous),
            (false, false) => Err(TaskError::Empty),
            (true, false) => Ok(GpuTask::CloneVoice {
                voice_model_id: self.voice_model_id,
            }),
            (false, true) => Ok(GpuTask::SynthesizeReply {
                ai_person_id: self.ai_reply_person_id,
                reply_voice_id: self.ai_reply_voice_id,
            }),
        }
    }
}

impl GpuTask {
    /// Serializes the task into a queue message body.
    pub fn encode(&self) -> Result<Vec<u8>, TaskError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a queue message body.
    ///
    /// Accepts the tagged form written by [`GpuTask::encode`] as well as the
    /// legacy shape with optional integer fields, rejecting bodies that name
    /// no work, name both kinds of work, or carry non-positive ids.
    pub fn decode(body: &[u8]) -> Result<Self, TaskError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let task = if value.get("kind").is_some() {
            serde_json::from_value::<GpuTask>(value)?
        } else {
            serde_json::from_value::<LegacyTask>(value)?.into_task()?
        };
        task.validate()
    }

    fn validate(self) -> Result<Self, TaskError> {
        match self {
            Self::CloneVoice { voice_model_id } if voice_model_id <= 0 => {
                Err(TaskError::InvalidId(voice_model_id))
            }
            Self::SynthesizeReply { ai_person_id, .. } if ai_person_id <= 0 => {
                Err(TaskError::InvalidId(ai_person_id))
            }
            Self::SynthesizeReply { reply_voice_id, .. } if reply_voice_id <= 0 => {
                Err(TaskError::InvalidId(reply_voice_id))
            }
            task => Ok(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_body_decodes() {
        let task = GpuTask::SynthesizeReply {
            ai_person_id: 3,
            reply_voice_id: 9,
        };
        let body = task.encode().unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("\"kind\":\"synthesize_reply\""));
        assert_eq!(GpuTask::decode(&body).unwrap(), task);
    }

    #[test]
    fn legacy_body_decodes_to_the_populated_variant() {
        let task = GpuTask::decode(br#"{"VoiceModelID":12,"AIReplyPersonID":0,"AIReplyVoiceID":0}"#)
            .unwrap();
        assert_eq!(task, GpuTask::CloneVoice { voice_model_id: 12 });

        let task = GpuTask::decode(br#"{"AIReplyPersonID":4,"AIReplyVoiceID":5}"#).unwrap();
        assert_eq!(
            task,
            GpuTask::SynthesizeReply {
                ai_person_id: 4,
                reply_voice_id: 5
            }
        );
    }

    #[test]
    fn legacy_body_with_no_or_both_variants_is_rejected() {
        assert!(matches!(
            GpuTask::decode(br#"{"VoiceModelID":0}"#),
            Err(TaskError::Empty)
        ));
        assert!(matches!(
            GpuTask::decode(br#"{"VoiceModelID":1,"AIReplyPersonID":2,"AIReplyVoiceID":3}"#),
            Err(TaskError::Ambiguous)
        ));
    }

    #[test]
    fn half_populated_reply_task_is_rejected() {
        assert!(matches!(
            GpuTask::decode(br#"{"AIReplyPersonID":2}"#),
            Err(TaskError::InvalidId(0))
        ));
        assert!(matches!(
            GpuTask::decode(br#"{"kind":"clone_voice","voiceModelId":-1}"#),
            Err(TaskError::InvalidId(-1))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            GpuTask::decode(b"not json"),
            Err(TaskError::Malformed(_))
        ));
    }
}
