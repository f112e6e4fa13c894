#![allow(dead_code)]

use async_trait::async_trait;
use reconn_db::{create_persona, create_pool, create_user, run_migrations, DbPool, DbRuntimeSettings};
use reconn_pipeline::{ArtifactLayout, Pipeline, PipelineParts, PipelineSettings};
use reconn_queue::SqliteQueue;
use reconn_storage::{ArtifactCache, FsObjectStore};
use reconn_types::{Turn, VoiceModel};
use reconn_voice::{LanguageModel, SynthesisParams, Transcription, VoiceError, VoiceProvider};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Language model double that records every request.
pub struct MockLlm {
    pub chats: Mutex<Vec<Vec<Turn>>>,
    pub transcriptions: AtomicUsize,
    pub choices: Vec<String>,
    pub heard: String,
    pub delay: Duration,
    /// Answer with the user's last message instead of `choices`.
    pub echo: bool,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(Vec::new()),
            transcriptions: AtomicUsize::new(0),
            choices: vec!["Hello".to_string(), "there".to_string()],
            heard: "good morning".to_string(),
            delay: Duration::ZERO,
            echo: false,
        }
    }

    pub fn chats(&self) -> Vec<Vec<Turn>> {
        self.chats.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn chat_completion(
        &self,
        turns: &[Turn],
        _max_tokens: u32,
    ) -> Result<Vec<String>, VoiceError> {
        self.chats.lock().unwrap().push(turns.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.echo {
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            return Ok(vec![last]);
        }
        Ok(self.choices.clone())
    }

    async fn transcribe(&self, _wav: &[u8]) -> Result<Transcription, VoiceError> {
        self.transcriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Transcription {
            language: "english".to_string(),
            text: self.heard.clone(),
        })
    }
}

/// Voice service double. Cloning writes `<key>.npz` into the shared model
/// directory the way the real service does.
pub struct MockVoice {
    pub model_dir: PathBuf,
    pub clones: Mutex<Vec<String>>,
    pub syntheses: Mutex<Vec<(String, String)>>,
    pub fail_synthesis: AtomicBool,
}

impl MockVoice {
    pub fn clones(&self) -> Vec<String> {
        self.clones.lock().unwrap().clone()
    }

    pub fn syntheses(&self) -> Vec<(String, String)> {
        self.syntheses.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceProvider for MockVoice {
    async fn clone_voice(&self, key: &str, wav: &[u8]) -> Result<String, VoiceError> {
        self.clones.lock().unwrap().push(key.to_string());
        let file = format!("{key}.npz");
        std::fs::write(self.model_dir.join(&file), wav).unwrap();
        Ok(file)
    }

    async fn synthesize(
        &self,
        key: &str,
        text: &str,
        _params: &SynthesisParams,
    ) -> Result<Vec<u8>, VoiceError> {
        self.syntheses
            .lock()
            .unwrap()
            .push((key.to_string(), text.to_string()));
        if self.fail_synthesis.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport {
                service: "voice service",
                message: "connection refused".to_string(),
            });
        }
        let mut audio = b"RIFF".to_vec();
        audio.extend_from_slice(text.as_bytes());
        Ok(audio)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub pool: DbPool,
    pub pipeline: Pipeline,
    pub llm: Arc<MockLlm>,
    pub voice: Arc<MockVoice>,
    pub queue: SqliteQueue,
    users: AtomicUsize,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_llm(MockLlm::new())
    }

    pub fn with_llm(llm: MockLlm) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reconn.db");
        let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();

        let local = dir.path().join("local");
        let layout = ArtifactLayout {
            sample_container: "samples".to_string(),
            model_container: "models".to_string(),
            output_container: "outputs".to_string(),
            sample_dir: local.join("samples"),
            model_dir: local.join("models"),
            output_dir: local.join("outputs"),
        };
        layout.ensure_local_dirs().unwrap();

        let llm = Arc::new(llm);
        let voice = Arc::new(MockVoice {
            model_dir: layout.model_dir.clone(),
            clones: Mutex::new(Vec::new()),
            syntheses: Mutex::new(Vec::new()),
            fail_synthesis: AtomicBool::new(false),
        });
        let queue = SqliteQueue::with_timing(
            pool.clone(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
        .with_retry_backoff(Duration::ZERO);
        let store = FsObjectStore::new(dir.path().join("remote"));

        let pipeline = Pipeline::new(PipelineParts {
            pool: pool.clone(),
            cache: ArtifactCache::new(Arc::new(store)),
            llm: llm.clone(),
            voice: voice.clone(),
            queue: Arc::new(queue.clone()),
            layout,
            settings: PipelineSettings::default(),
        });

        Self {
            dir,
            pool,
            pipeline,
            llm,
            voice,
            queue,
            users: AtomicUsize::new(0),
        }
    }

    /// Object as stored remotely, if present.
    pub fn remote(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.dir.path().join("remote").join(container).join(name)).ok()
    }

    pub fn local_output(&self, name: &str) -> PathBuf {
        self.pipeline.layout().output_dir.join(name)
    }

    pub fn persona(&self, context_prompt: &str) -> i64 {
        let n = self.users.fetch_add(1, Ordering::SeqCst);
        let conn = self.pool.get().unwrap();
        let user = create_user(&conn, &format!("user-{n}")).unwrap();
        create_persona(&conn, user.id, &format!("persona-{n}"), context_prompt)
            .unwrap()
            .id
    }

    /// A persona with one `ready` voice model cloned synchronously.
    pub async fn persona_with_voice(&self, context_prompt: &str) -> (i64, VoiceModel) {
        let persona_id = self.persona(context_prompt);
        let sample = self
            .pipeline
            .create_voice_sample(persona_id, &wav())
            .await
            .unwrap();
        let model = self.pipeline.clone_voice_model(sample.id).await.unwrap();
        (persona_id, model)
    }
}

/// A body that passes wav validation.
pub fn wav() -> Vec<u8> {
    wav_filled(0)
}

/// A valid wav body whose payload bytes are all `fill`.
pub fn wav_filled(fill: u8) -> Vec<u8> {
    let mut body = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    body.resize(256, fill);
    body
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
