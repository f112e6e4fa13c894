//! Where artifacts live and what they are called.

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;

/// Object-store containers and local cache directories, one pair per
/// artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub sample_container: String,
    pub model_container: String,
    pub output_container: String,
    pub sample_dir: PathBuf,
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ArtifactLayout {
    /// Creates every local cache directory that does not exist yet.
    pub fn ensure_local_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.sample_dir, &self.model_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn rfc3339_secs(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The row id keeps two uploads in the same second apart.
pub fn sample_file_name(persona_id: i64, ts: &DateTime<Utc>, sample_id: i64) -> String {
    format!("{}-{}-{}.wav", persona_id, rfc3339_secs(ts), sample_id)
}

pub fn prompt_file_name(persona_id: i64, ts: &DateTime<Utc>, user_prompt_id: i64) -> String {
    format!("prompt-{}-{}-{}.wav", persona_id, rfc3339_secs(ts), user_prompt_id)
}

/// Derived from the persisted reply row, so every attempt at
/// synthesizing one reply writes the same artifact.
pub fn reply_file_name(persona_id: i64, reply_ts: &DateTime<Utc>, reply_id: i64) -> String {
    format!("reply-{}-{}-{}.wav", persona_id, rfc3339_secs(reply_ts), reply_id)
}

pub fn sample_clone_key(sample_id: i64) -> String {
    format!("sample-{sample_id}")
}

pub fn model_clone_key(voice_model_id: i64) -> String {
    format!("model-{voice_model_id}")
}
