//! Clients for the two external model services a persona depends on.
//!
//! A [`LanguageModel`] produces chat completions and transcribes speech;
//! a [`VoiceProvider`] clones a voice from a wav sample and renders text
//! in a cloned voice. Both sit behind traits so the pipelines can run
//! against test doubles, with one HTTP implementation each:
//! [`OpenAiClient`] and [`VoiceServiceClient`].

pub mod config;
pub mod error;
pub mod llm;
pub mod service;

pub use config::{LlmConfig, VoiceServiceConfig};
pub use error::VoiceError;
pub use llm::{LanguageModel, OpenAiClient, Transcription};
pub use service::{tts_key, SynthesisParams, VoiceProvider, VoiceServiceClient, MODEL_SUFFIX};
