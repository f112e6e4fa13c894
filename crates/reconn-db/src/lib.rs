//! Row store for the reconn platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and typed create/read/update operations for every
//! persisted entity. Operations are plain functions over a borrowed
//! `rusqlite::Connection`; async callers run them inside
//! `tokio::task::spawn_blocking`.
//!
//! Status columns are only ever moved forward: the `complete_*` and `fail_*`
//! updates are guarded on `status = 'processing'` and report
//! [`DbError::InvalidTransition`] for anything else.

mod conversation;
mod error;
mod migrations;
mod personas;
mod pool;
mod sql;
mod voice;

pub use conversation::{
    complete_reply_voice, create_reply, create_reply_voice, create_text_prompt,
    create_voice_prompt, create_voice_prompt_named, fail_reply_voice, get_reply, get_reply_voice,
    get_user_prompt, list_conversation, record_reply_voice_attempt,
};
pub use error::DbError;
pub use migrations::run_migrations;
pub use personas::{
    create_persona, create_user, get_persona, get_user, get_user_by_name, list_personas,
    list_users, update_context_prompt,
};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use voice::{
    complete_voice_model, create_voice_model, create_voice_sample, create_voice_sample_named,
    delete_voice_sample, fail_voice_model, get_latest_ready_voice_model, get_voice_model,
    get_voice_sample, list_voice_samples, record_voice_model_attempt,
};
