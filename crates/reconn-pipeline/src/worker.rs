//! The GPU worker: a single sequential consumer of the job queue.
//!
//! Every task has exactly-once effect on its row even though the queue
//! delivers at least once:
//! - the worker counts the delivery against the row and re-reads it first;
//!   a row already `ready` or `failed` is acknowledged without side effects,
//! - a message is acknowledged only after the terminal status update
//!   commits (or after the row was found terminal),
//! - recoverable failures below `max_attempts` abandon the message so it is
//!   redelivered; anything else marks the row `failed` with the error.
//!
//! Undecodable messages are logged and acknowledged.

use crate::{Pipeline, PipelineError};
use reconn_db::{
    complete_reply_voice, complete_voice_model, fail_reply_voice, fail_voice_model, get_reply,
    get_user_prompt, record_reply_voice_attempt, record_voice_model_attempt, DbError,
};
use reconn_queue::QueueMessage;
use reconn_types::GpuTask;
use std::time::Duration;

/// Pause after the queue itself fails before asking it again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// What to do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Remove the message; its work is settled or can never succeed.
    Complete,
    /// Make the message visible again for another attempt.
    Abandon,
}

/// Consumes the job queue forever, one message at a time.
///
/// There is no cancellation path; the loop ends with the process.
pub async fn run_worker(pipeline: Pipeline) {
    tracing::info!(
        max_attempts = pipeline.settings().max_attempts,
        "starting gpu worker"
    );
    loop {
        if let Err(e) = pipeline.process_next().await {
            tracing::error!(error = %e, "gpu worker queue error");
            tokio::time::sleep(RECEIVE_BACKOFF).await;
        }
    }
}

impl Pipeline {
    /// Receives one message, handles it, and acknowledges or abandons it.
    pub async fn process_next(&self) -> Result<Outcome, PipelineError> {
        let message = self.queue.receive().await?;
        let outcome = self.handle_message(&message).await;
        match outcome {
            Outcome::Complete => self.queue.complete(&message).await?,
            Outcome::Abandon => self.queue.abandon(&message).await?,
        }
        tracing::debug!(message_id = message.id, ?outcome, "gpu task settled");
        Ok(outcome)
    }

    /// Routes one delivery to its handler. Never fails; every error is
    /// folded into the returned [`Outcome`].
    pub async fn handle_message(&self, message: &QueueMessage) -> Outcome {
        let task = match GpuTask::decode(&message.body) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(message_id = message.id, error = %e, "dropping undecodable gpu task");
                return Outcome::Complete;
            }
        };
        tracing::info!(
            message_id = message.id,
            delivery_count = message.delivery_count,
            ?task,
            "processing gpu task"
        );
        match task {
            GpuTask::CloneVoice { voice_model_id } => self.run_clone(voice_model_id).await,
            GpuTask::SynthesizeReply {
                ai_person_id,
                reply_voice_id,
            } => self.run_synthesis(ai_person_id, reply_voice_id).await,
        }
    }

    async fn run_clone(&self, id: i64) -> Outcome {
        let model = match self
            .with_conn(move |c| record_voice_model_attempt(c, id))
            .await
        {
            Ok(model) => model,
            Err(e) => return self.unreadable_row("voice model", id, e),
        };
        if model.status.is_terminal() {
            tracing::info!(voice_model_id = id, status = %model.status, "voice model already settled");
            return Outcome::Complete;
        }

        match self.clone_for_model(&model).await {
            Ok(file_name) => {
                self.settle("voice model", id, move |c| {
                    complete_voice_model(c, id, &file_name).map(drop)
                })
                .await
            }
            Err(e) if self.gives_up(&e, model.attempts) => {
                let message = e.to_string();
                self.settle("voice model", id, move |c| {
                    fail_voice_model(c, id, &message).map(drop)
                })
                .await
            }
            Err(e) => self.retry_later("voice model", id, model.attempts, &e),
        }
    }

    async fn run_synthesis(&self, persona_id: i64, id: i64) -> Outcome {
        let voice = match self
            .with_conn(move |c| record_reply_voice_attempt(c, id))
            .await
        {
            Ok(voice) => voice,
            Err(e) => return self.unreadable_row("reply voice", id, e),
        };
        if voice.status.is_terminal() {
            tracing::info!(reply_voice_id = id, status = %voice.status, "reply voice already settled");
            return Outcome::Complete;
        }

        let reply_id = voice.ai_person_reply_id;
        let owner = self
            .with_conn(move |c| {
                let reply = get_reply(c, reply_id)?;
                let prompt = get_user_prompt(c, reply.user_prompt_id)?;
                Ok((reply, prompt.ai_persona_id))
            })
            .await;
        let result = match owner {
            Ok((_, owner_id)) if owner_id != persona_id => {
                // The row is fine; the message is not. Leave the row for its own task.
                tracing::warn!(
                    reply_voice_id = id,
                    task_persona_id = persona_id,
                    owner_id,
                    "gpu task names the wrong persona, dropping it"
                );
                return Outcome::Complete;
            }
            Ok((reply, _)) => match self.latest_model(persona_id).await {
                Ok(latest) => {
                    self.render_reply(persona_id, &reply, &latest.model.file_name)
                        .await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(file_name) => {
                self.settle("reply voice", id, move |c| {
                    complete_reply_voice(c, id, &file_name).map(drop)
                })
                .await
            }
            Err(e) if self.gives_up(&e, voice.attempts) => {
                let message = e.to_string();
                self.settle("reply voice", id, move |c| {
                    fail_reply_voice(c, id, &message).map(drop)
                })
                .await
            }
            Err(e) => self.retry_later("reply voice", id, voice.attempts, &e),
        }
    }

    fn gives_up(&self, error: &PipelineError, attempts: u32) -> bool {
        !error.is_recoverable() || attempts >= self.settings.max_attempts
    }

    fn retry_later(&self, entity: &'static str, id: i64, attempts: u32, error: &PipelineError) -> Outcome {
        tracing::warn!(
            entity,
            id,
            attempts,
            max_attempts = self.settings.max_attempts,
            error = %error,
            "gpu task failed, will retry"
        );
        Outcome::Abandon
    }

    /// The referenced row could not be loaded before any work started.
    fn unreadable_row(&self, entity: &'static str, id: i64, error: PipelineError) -> Outcome {
        if error.is_recoverable() {
            tracing::error!(entity, id, error = %error, "failed to load gpu task row");
            Outcome::Abandon
        } else {
            tracing::warn!(entity, id, error = %error, "gpu task row is gone, dropping task");
            Outcome::Complete
        }
    }

    /// Commits a terminal status update. A row some other delivery already
    /// settled counts as settled.
    async fn settle<F>(&self, entity: &'static str, id: i64, update: F) -> Outcome
    where
        F: FnOnce(&rusqlite::Connection) -> Result<(), DbError> + Send + 'static,
    {
        match self.with_conn(update).await {
            Ok(()) => {
                tracing::info!(entity, id, "gpu task row settled");
                Outcome::Complete
            }
            Err(PipelineError::InvalidTransition(e)) => {
                tracing::warn!(entity, id, error = %e, "row was settled by another delivery");
                Outcome::Complete
            }
            Err(e) => {
                tracing::error!(entity, id, error = %e, "failed to record gpu task result");
                Outcome::Abandon
            }
        }
    }
}
