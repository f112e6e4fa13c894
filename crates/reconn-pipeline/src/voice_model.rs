//! Voice samples and cloning them into voice models.

use crate::layout::{model_clone_key, sample_clone_key, sample_file_name};
use crate::validate::check_wav_body;
use crate::{stage_failed, Pipeline, PipelineError};
use chrono::Utc;
use reconn_db::{
    create_voice_model, create_voice_sample_named, delete_voice_sample, fail_voice_model,
    get_persona, get_voice_sample,
};
use reconn_storage::StorageError;
use reconn_types::{GpuTask, Status, VoiceModel, VoiceSample, PLACEHOLDER_FILE_NAME};

impl Pipeline {
    /// Stores a wav sample of a persona's voice and records it.
    pub async fn create_voice_sample(
        &self,
        persona_id: i64,
        wav: &[u8],
    ) -> Result<VoiceSample, PipelineError> {
        check_wav_body(wav)?;
        self.with_conn(move |c| get_persona(c, persona_id)).await?;

        let now = Utc::now();
        let sample = self
            .with_conn(move |c| {
                create_voice_sample_named(c, persona_id, now, |id| {
                    sample_file_name(persona_id, &now, id)
                })
            })
            .await?;

        let layout = self.layout();
        let stored = self
            .cache
            .publish(&layout.sample_container, &sample.file_name, &layout.sample_dir, wav)
            .await;
        if let Err(e) = stored {
            let id = sample.id;
            if let Err(undo) = self.with_conn(move |c| delete_voice_sample(c, id)).await {
                tracing::error!(sample_id = id, error = %undo, "failed to drop unstored sample");
            }
            return Err(stage_failed("store_sample", persona_id)(e.into()));
        }
        tracing::info!(persona_id, sample_id = sample.id, "voice sample stored");
        Ok(sample)
    }

    /// Clones a sample inside the current request; the model row is created
    /// directly in `ready` state.
    pub async fn clone_voice_model(&self, sample_id: i64) -> Result<VoiceModel, PipelineError> {
        let sample = self
            .with_conn(move |c| get_voice_sample(c, sample_id))
            .await?;
        let model_file = self
            .clone_sample(&sample_clone_key(sample_id), &sample)
            .await?;
        let model = self
            .with_conn(move |c| {
                create_voice_model(c, sample_id, Status::Ready, &model_file, Utc::now())
            })
            .await
            .map_err(stage_failed("persist_voice_model", sample_id))?;
        tracing::info!(sample_id, voice_model_id = model.id, "voice model ready");
        Ok(model)
    }

    /// Records a `processing` voice model and queues the cloning.
    pub async fn clone_voice_model_async(
        &self,
        sample_id: i64,
    ) -> Result<VoiceModel, PipelineError> {
        self.with_conn(move |c| get_voice_sample(c, sample_id))
            .await?;
        let model = self
            .with_conn(move |c| {
                create_voice_model(
                    c,
                    sample_id,
                    Status::Processing,
                    PLACEHOLDER_FILE_NAME,
                    Utc::now(),
                )
            })
            .await
            .map_err(stage_failed("persist_voice_model", sample_id))?;

        let task = GpuTask::CloneVoice {
            voice_model_id: model.id,
        };
        if let Err(e) = self.enqueue(&task).await {
            let (id, message) = (model.id, e.to_string());
            if let Err(mark) = self.with_conn(move |c| fail_voice_model(c, id, &message)).await {
                tracing::error!(voice_model_id = id, error = %mark, "failed to mark voice model failed");
            }
            return Err(stage_failed("enqueue", sample_id)(e));
        }
        tracing::info!(sample_id, voice_model_id = model.id, "voice cloning queued");
        Ok(model)
    }

    /// Relays a sample to the clone service under `key` and publishes the
    /// model file the service wrote into the model directory.
    pub(crate) async fn clone_sample(
        &self,
        key: &str,
        sample: &VoiceSample,
    ) -> Result<String, PipelineError> {
        let layout = self.layout();
        let sample_path = self
            .cache
            .fetch(&layout.sample_container, &sample.file_name, &layout.sample_dir)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("fetch_sample", sample.id))?;
        let wav = tokio::fs::read(&sample_path)
            .await
            .map_err(|source| StorageError::LocalIo {
                path: sample_path.clone(),
                source,
            })?;

        let model_file = self
            .voice
            .clone_voice(key, &wav)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("clone_voice", sample.id))?;

        self.cache
            .publish_from_local_file(&layout.model_container, &model_file, &layout.model_dir)
            .await
            .map_err(PipelineError::from)
            .map_err(stage_failed("publish_voice_model", sample.id))?;
        Ok(model_file)
    }

    /// Worker side of [`clone_voice_model_async`](Self::clone_voice_model_async).
    pub(crate) async fn clone_for_model(&self, model: &VoiceModel) -> Result<String, PipelineError> {
        let sample_id = model.voice_sample_id;
        let sample = self
            .with_conn(move |c| get_voice_sample(c, sample_id))
            .await?;
        self.clone_sample(&model_clone_key(model.id), &sample).await
    }
}
