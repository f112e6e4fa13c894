//! Conversational turns: user utterance in, persona reply (and its voice) out.

use crate::context::ContextAssembler;
use crate::layout::{prompt_file_name, reply_file_name};
use crate::validate::{check_message, check_wav_body};
use crate::{stage_failed, Pipeline, PipelineError};
use chrono::Utc;
use reconn_db::{
    create_reply, create_reply_voice, create_text_prompt, create_voice_prompt_named,
    fail_reply_voice, get_latest_ready_voice_model, get_persona, list_conversation,
};
use reconn_types::{
    AiPersonReply, AiPersonReplyVoice, GpuTask, LatestVoiceModel, Status, PLACEHOLDER_FILE_NAME,
};
use reconn_voice::{tts_key, VoiceError};

/// What the user said, already reduced to text.
enum Utterance {
    Text(String),
    /// Transcribed speech and the audio it came from.
    Voice { wav: Vec<u8>, text: String },
}

impl Utterance {
    fn text(&self) -> &str {
        match self {
            Utterance::Text(text) => text,
            Utterance::Voice { text, .. } => text,
        }
    }
}

/// Result of the stages shared by the synchronous and asynchronous turns.
struct ComposedReply {
    reply: AiPersonReply,
    model_file: String,
}

impl Pipeline {
    /// Handles a text turn end to end and returns the `ready` reply voice.
    pub async fn text_turn(
        &self,
        persona_id: i64,
        message: &str,
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let message = check_message(message)?.to_string();
        let composed = self
            .compose_reply(persona_id, Utterance::Text(message))
            .await?;
        self.finish_reply_inline(persona_id, composed).await
    }

    /// Handles a text turn up to the persisted reply and defers synthesis to
    /// the GPU worker. Returns the `processing` reply voice.
    pub async fn text_turn_async(
        &self,
        persona_id: i64,
        message: &str,
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let message = check_message(message)?.to_string();
        let composed = self
            .compose_reply(persona_id, Utterance::Text(message))
            .await?;
        self.defer_reply(persona_id, composed.reply).await
    }

    /// Handles a spoken turn end to end and returns the `ready` reply voice.
    pub async fn voice_turn(
        &self,
        persona_id: i64,
        wav: &[u8],
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let utterance = self.ingest_speech(persona_id, wav).await?;
        let composed = self.compose_reply(persona_id, utterance).await?;
        self.finish_reply_inline(persona_id, composed).await
    }

    pub async fn voice_turn_async(
        &self,
        persona_id: i64,
        wav: &[u8],
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let utterance = self.ingest_speech(persona_id, wav).await?;
        let composed = self.compose_reply(persona_id, utterance).await?;
        self.defer_reply(persona_id, composed.reply).await
    }

    /// Transcribes the prompt audio. Nothing is stored yet.
    async fn ingest_speech(&self, persona_id: i64, wav: &[u8]) -> Result<Utterance, PipelineError> {
        check_wav_body(wav)?;
        self.with_conn(move |c| get_persona(c, persona_id)).await?;

        let transcription = self
            .llm
            .transcribe(wav)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("transcribe", persona_id))?;
        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::Validation(
                "no speech recognized in audio".into(),
            ));
        }
        tracing::info!(
            persona_id,
            language = %transcription.language,
            "prompt audio transcribed"
        );
        Ok(Utterance::Voice {
            wav: wav.to_vec(),
            text,
        })
    }

    /// Persists the prompt, asks the language model, and persists the reply.
    ///
    /// Runs under the persona's lock so the history window, the new prompt,
    /// and the reply form one consistent step in the persona's conversation.
    async fn compose_reply(
        &self,
        persona_id: i64,
        utterance: Utterance,
    ) -> Result<ComposedReply, PipelineError> {
        let _guard = self.locks.lock(persona_id).await;

        let latest = self.latest_model(persona_id).await?;
        let limit = self.settings.history_limit;
        let history = self
            .with_conn(move |c| list_conversation(c, persona_id, limit))
            .await
            .map_err(stage_failed("read_history", persona_id))?;

        let now = Utc::now();
        let prompt_id = match &utterance {
            Utterance::Text(message) => {
                let message = message.clone();
                self.with_conn(move |c| create_text_prompt(c, persona_id, now, &message))
                    .await
                    .map_err(stage_failed("persist_prompt", persona_id))?
                    .0
                    .id
            }
            Utterance::Voice { wav, text } => {
                let text = text.clone();
                let (prompt, voice) = self
                    .with_conn(move |c| {
                        create_voice_prompt_named(
                            c,
                            persona_id,
                            now,
                            Status::Ready,
                            |id| prompt_file_name(persona_id, &now, id),
                            Some(text.as_str()),
                        )
                    })
                    .await
                    .map_err(stage_failed("persist_prompt", persona_id))?;
                let layout = self.layout();
                self.cache
                    .publish(&layout.output_container, &voice.file_name, &layout.output_dir, wav)
                    .await
                    .map_err(PipelineError::from)
                    .map_err(stage_failed("store_prompt_audio", persona_id))?;
                prompt.id
            }
        };

        let turns = ContextAssembler::build(&latest.context_prompt, &history, utterance.text());
        let choices = self
            .llm
            .chat_completion(&turns, self.settings.max_tokens)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("chat_completion", persona_id))?;
        let message = choices.join(" ");
        if message.trim().is_empty() {
            let empty = PipelineError::Voice(VoiceError::Decode {
                service: "language model",
                message: "completion returned no text".into(),
            });
            return Err(stage_failed("chat_completion", persona_id)(empty));
        }

        let reply = self
            .with_conn(move |c| create_reply(c, prompt_id, Status::Ready, &message, Utc::now()))
            .await
            .map_err(stage_failed("persist_reply", persona_id))?;
        tracing::info!(
            persona_id,
            prompt_id,
            reply_id = reply.id,
            history = history.len(),
            "reply composed"
        );

        Ok(ComposedReply {
            reply,
            model_file: latest.model.file_name,
        })
    }

    /// Synthesizes the reply inside the current request and records it `ready`.
    async fn finish_reply_inline(
        &self,
        persona_id: i64,
        composed: ComposedReply,
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let file_name = self
            .render_reply(persona_id, &composed.reply, &composed.model_file)
            .await?;
        let reply_id = composed.reply.id;
        self.with_conn(move |c| create_reply_voice(c, reply_id, Status::Ready, &file_name))
            .await
            .map_err(stage_failed("persist_reply_voice", persona_id))
    }

    /// Records a `processing` reply voice and queues its synthesis.
    async fn defer_reply(
        &self,
        persona_id: i64,
        reply: AiPersonReply,
    ) -> Result<AiPersonReplyVoice, PipelineError> {
        let reply_id = reply.id;
        let voice = self
            .with_conn(move |c| {
                create_reply_voice(c, reply_id, Status::Processing, PLACEHOLDER_FILE_NAME)
            })
            .await
            .map_err(stage_failed("persist_reply_voice", persona_id))?;

        let task = GpuTask::SynthesizeReply {
            ai_person_id: persona_id,
            reply_voice_id: voice.id,
        };
        if let Err(e) = self.enqueue(&task).await {
            // Nobody will ever pick this row up; say so instead of leaving it processing.
            let (id, message) = (voice.id, e.to_string());
            if let Err(mark) = self.with_conn(move |c| fail_reply_voice(c, id, &message)).await {
                tracing::error!(reply_voice_id = id, error = %mark, "failed to mark reply voice failed");
            }
            return Err(stage_failed("enqueue", persona_id)(e));
        }
        tracing::info!(persona_id, reply_voice_id = voice.id, "reply synthesis queued");
        Ok(voice)
    }

    /// Fetches the voice model, synthesizes the reply text, and publishes the
    /// waveform. Returns the published file name.
    pub(crate) async fn render_reply(
        &self,
        persona_id: i64,
        reply: &AiPersonReply,
        model_file: &str,
    ) -> Result<String, PipelineError> {
        let layout = self.layout();
        self.cache
            .fetch(&layout.model_container, model_file, &layout.model_dir)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("fetch_voice_model", persona_id))?;

        let audio = self
            .voice
            .synthesize(tts_key(model_file), &reply.message, &self.settings.synthesis)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("synthesize", persona_id))?;

        let file_name = reply_file_name(persona_id, &reply.timestamp, reply.id);
        self.cache
            .publish(&layout.output_container, &file_name, &layout.output_dir, &audio)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("publish_reply_audio", persona_id))?;
        tracing::info!(persona_id, reply_id = reply.id, file_name = %file_name, "reply voiced");
        Ok(file_name)
    }

    /// The persona's latest `ready` voice model and context prompt.
    pub(crate) async fn latest_model(
        &self,
        persona_id: i64,
    ) -> Result<LatestVoiceModel, PipelineError> {
        self.with_conn(move |c| get_persona(c, persona_id)).await?;
        self.with_conn(move |c| get_latest_ready_voice_model(c, persona_id))
            .await
            .map_err(|e| match e {
                PipelineError::NotFound(_) => PipelineError::NoVoiceModel(persona_id),
                other => other,
            })
    }

    pub(crate) async fn enqueue(&self, task: &GpuTask) -> Result<i64, PipelineError> {
        let body = task.encode()?;
        Ok(self.queue.send(&body).await?)
    }
}
