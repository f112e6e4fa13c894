//! One-shot calls straight through to the language model and the voice
//! service. No rows are read or written, and nothing is queued.

use crate::validate::{check_message, check_relay_clone_key, check_voice_key, check_wav_body};
use crate::{Pipeline, PipelineError};
use chrono::{DateTime, Utc};
use reconn_storage::StorageError;
use reconn_types::{LocalModel, Turn};
use reconn_voice::{SynthesisParams, Transcription, VoiceError, MODEL_SUFFIX};

fn relay_failed(stage: &'static str) -> impl FnOnce(PipelineError) -> PipelineError {
    move |e| {
        tracing::error!(stage, kind = e.kind(), error = %e, "relay failed");
        e
    }
}

impl Pipeline {
    /// Transcribes a wav clip.
    pub async fn transcribe(&self, wav: &[u8]) -> Result<Transcription, PipelineError> {
        check_wav_body(wav)?;
        let transcription = self
            .llm
            .transcribe(wav)
            .await
            .map_err(PipelineError::from)
            .map_err(relay_failed("transcribe"))?;
        tracing::info!(language = %transcription.language, "clip transcribed");
        Ok(transcription)
    }

    /// Asks the language model one question under an optional system
    /// prompt, with no conversation history.
    pub async fn single_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PipelineError> {
        let user_prompt = check_message(user_prompt)?;
        let mut turns = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            turns.push(Turn::system(system_prompt));
        }
        turns.push(Turn::user(user_prompt));

        let choices = self
            .llm
            .chat_completion(&turns, self.settings.max_tokens)
            .await
            .map_err(PipelineError::from)
            .map_err(relay_failed("chat_completion"))?;
        let reply = choices.join(" ");
        if reply.trim().is_empty() {
            let empty = PipelineError::Voice(VoiceError::Decode {
                service: "language model",
                message: "completion returned no text".into(),
            });
            return Err(relay_failed("chat_completion")(empty));
        }
        Ok(reply)
    }

    /// Clones a voice under a caller-chosen key and returns the model file
    /// the voice service wrote. The model is not published.
    pub async fn relay_clone(&self, key: &str, wav: &[u8]) -> Result<String, PipelineError> {
        let key = check_relay_clone_key(key)?;
        check_wav_body(wav)?;
        let model_file = self
            .voice
            .clone_voice(key, wav)
            .await
            .map_err(PipelineError::from)
            .map_err(relay_failed("clone"))?;
        tracing::info!(key, model_file = %model_file, "voice cloned by relay");
        Ok(model_file)
    }

    /// Synthesizes `text` with the model under `key` and returns the wav bytes.
    pub async fn relay_synthesize(
        &self,
        key: &str,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<u8>, PipelineError> {
        let key = check_voice_key(key)?;
        let text = check_message(text)?;
        let audio = self
            .voice
            .synthesize(key, text, params)
            .await
            .map_err(PipelineError::from)
            .map_err(relay_failed("synthesize"))?;
        tracing::info!(key, bytes = audio.len(), "text synthesized by relay");
        Ok(audio)
    }

    /// Model files in the local model directory, sorted by name. A missing
    /// directory lists as empty.
    pub async fn list_local_models(&self) -> Result<Vec<LocalModel>, PipelineError> {
        let dir = &self.layout.model_dir;
        let local_io = |source: std::io::Error| {
            PipelineError::Storage(StorageError::LocalIo {
                path: dir.clone(),
                source,
            })
        };
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(local_io(e)),
        };

        let mut models = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(local_io)? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(key) = file_name.strip_suffix(MODEL_SUFFIX).filter(|k| !k.is_empty()) else {
                continue;
            };
            let last_modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            models.push(LocalModel {
                key: key.to_string(),
                file_name,
                last_modified,
            });
        }
        models.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(models)
    }
}
