//! The persona conversation and voice-cloning pipelines.
//!
//! A [`Pipeline`] owns handles to every collaborator a job touches: the row
//! store pool, the artifact cache, the language model, the voice provider,
//! and the GPU job queue. Its operations come in two flavors:
//!
//! - synchronous (`text_turn`, `voice_turn`, `clone_voice_model`) run every
//!   stage inside the caller's request, and
//! - asynchronous (`*_async`) run the cheap stages inline, persist a
//!   `processing` row, and enqueue a [`GpuTask`](reconn_types::GpuTask)
//!   that [`worker::run_worker`] later completes with the same stage code.
//!
//! A few single-shot relays (`transcribe`, `single_prompt`, `relay_clone`,
//! `relay_synthesize`) bypass the row store entirely.

pub mod context;
mod conversation;
mod error;
pub mod layout;
mod locks;
mod relay;
pub mod validate;
mod voice_model;
pub mod worker;

pub use context::{ContextAssembler, HISTORY_LIMIT, MAX_REPLY_TOKENS};
pub use error::PipelineError;
pub use layout::ArtifactLayout;
pub use locks::{PersonaGuard, PersonaLocks};
pub use worker::{run_worker, Outcome};

use reconn_db::{DbError, DbPool};
use reconn_queue::JobQueue;
use reconn_storage::ArtifactCache;
use reconn_voice::{LanguageModel, SynthesisParams, VoiceProvider};
use std::sync::Arc;

/// Tunables that are not tied to one collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_tokens: u32,
    pub history_limit: u32,
    /// Worker deliveries allowed per row before it is marked `failed`.
    pub max_attempts: u32,
    pub synthesis: SynthesisParams,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens: MAX_REPLY_TOKENS,
            history_limit: HISTORY_LIMIT,
            max_attempts: 3,
            synthesis: SynthesisParams::default(),
        }
    }
}

/// Everything a [`Pipeline`] is built from.
pub struct PipelineParts {
    pub pool: DbPool,
    pub cache: ArtifactCache,
    pub llm: Arc<dyn LanguageModel>,
    pub voice: Arc<dyn VoiceProvider>,
    pub queue: Arc<dyn JobQueue>,
    pub layout: ArtifactLayout,
    pub settings: PipelineSettings,
}

#[derive(Clone)]
pub struct Pipeline {
    pool: DbPool,
    cache: ArtifactCache,
    llm: Arc<dyn LanguageModel>,
    voice: Arc<dyn VoiceProvider>,
    queue: Arc<dyn JobQueue>,
    layout: Arc<ArtifactLayout>,
    settings: Arc<PipelineSettings>,
    locks: PersonaLocks,
}

impl Pipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            pool: parts.pool,
            cache: parts.cache,
            llm: parts.llm,
            voice: parts.voice,
            queue: parts.queue,
            layout: Arc::new(parts.layout),
            settings: Arc::new(parts.settings),
            locks: PersonaLocks::new(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Runs a row-store operation on the blocking pool.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, DbError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| PipelineError::Join(e.to_string()))?
        .map_err(PipelineError::from)
    }
}

/// Logs a failed stage with the ids involved and hands the error back.
pub(crate) fn stage_failed(stage: &'static str, id: i64) -> impl FnOnce(PipelineError) -> PipelineError {
    move |e| {
        tracing::error!(stage, id, kind = e.kind(), error = %e, "pipeline stage failed");
        e
    }
}
