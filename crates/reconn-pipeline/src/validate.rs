//! Ingestion checks shared by every entry point that accepts user input.

use crate::PipelineError;

/// Bodies shorter than this cannot hold a wav header plus any audio.
pub const MIN_WAV_BYTES: usize = 100;

pub const MIN_MESSAGE_CHARS: usize = 2;

const WAV_CONTENT_TYPES: [&str; 3] = ["audio/wav", "audio/x-wav", "audio/wave"];

/// Accepts the wav media types, ignoring parameters and case.
pub fn is_wav_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    WAV_CONTENT_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(essence))
}

pub fn check_wav(content_type: Option<&str>, body: &[u8]) -> Result<(), PipelineError> {
    match content_type {
        Some(ct) if is_wav_content_type(ct) => {}
        Some(ct) => {
            return Err(PipelineError::Validation(format!(
                "expected an audio/wav body, got {ct}"
            )))
        }
        None => {
            return Err(PipelineError::Validation(
                "missing content type, expected audio/wav".into(),
            ))
        }
    }
    check_wav_body(body)
}

pub fn check_wav_body(body: &[u8]) -> Result<(), PipelineError> {
    if body.len() < MIN_WAV_BYTES {
        return Err(PipelineError::Validation(format!(
            "wav body too short: {} bytes (minimum {MIN_WAV_BYTES})",
            body.len()
        )));
    }
    Ok(())
}

/// Returns the trimmed message if it is long enough to send.
pub fn check_message(message: &str) -> Result<&str, PipelineError> {
    let trimmed = message.trim();
    if trimmed.chars().count() < MIN_MESSAGE_CHARS {
        return Err(PipelineError::Validation(format!(
            "message must be at least {MIN_MESSAGE_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

/// Prefixes of the keys the pipelines clone under. A relayed clone may not
/// take one, or it would replace a persona's model.
const RESERVED_KEY_PREFIXES: [&str; 2] = ["sample-", "model-"];

/// Accepts a voice service key made of ASCII letters, digits, `-` and `_`.
pub fn check_voice_key(key: &str) -> Result<&str, PipelineError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(PipelineError::Validation(format!("invalid voice key {key:?}")));
    }
    Ok(key)
}

/// A [`check_voice_key`] key that no pipeline clones under.
pub fn check_relay_clone_key(key: &str) -> Result<&str, PipelineError> {
    let key = check_voice_key(key)?;
    if RESERVED_KEY_PREFIXES.iter().any(|p| key.starts_with(p)) {
        return Err(PipelineError::Validation(format!(
            "voice key {key:?} is reserved"
        )));
    }
    Ok(key)
}
