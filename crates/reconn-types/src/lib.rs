//! Shared types for the reconn persona platform.
//!
//! This crate holds the entity snapshots persisted by `reconn-db`, the
//! status lifecycle shared by voice models and synthesized replies, the
//! chat turn types handed to the language model, and the `GpuTask`
//! descriptor exchanged over the job queue. It performs no I/O.

pub mod chat;
pub mod entity;
pub mod task;

pub use chat::{Role, Turn};
pub use entity::{
    AiPersona, AiPersonReply, AiPersonReplyVoice, ConversationRow, LatestVoiceModel, LocalModel,
    User, UserPrompt, UserTextPrompt, UserVoicePrompt, VoiceModel, VoiceSample,
};
pub use task::{GpuTask, TaskError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// File name stored on a `processing` row until the real artifact exists.
pub const PLACEHOLDER_FILE_NAME: &str = "pending";

/// Lifecycle of an artifact-backed row (voice models, reply voices, voice prompts).
///
/// Rows start in `Processing` when their work is deferred to the GPU worker,
/// or are created directly in `Ready` when the work completed inline.
/// `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Work has been accepted but the artifact does not exist yet.
    Processing,
    /// The artifact exists and the row's file name is valid.
    Ready,
    /// The worker gave up; the row's `error` explains why.
    Failed,
}

impl Status {
    /// Returns the string stored in the database for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is allowed out of this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Ready) | (Self::Processing, Self::Failed)
        )
    }

    /// Validates `self -> next`, returning a `TransitionError` when illegal.
    pub fn transition(self, next: Status) -> Result<Status, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string read from storage that is not a known `Status`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// An attempted status change that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}
