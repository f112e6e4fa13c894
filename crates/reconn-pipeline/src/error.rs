use reconn_db::DbError;
use reconn_queue::QueueError;
use reconn_storage::StorageError;
use reconn_types::{TaskError, TransitionError};
use reconn_voice::VoiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad caller input. Nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ai person {0} has no ready voice model")]
    NoVoiceModel(i64),

    #[error(transparent)]
    Database(DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("invalid gpu task: {0}")]
    InvalidTask(#[from] TaskError),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<DbError> for PipelineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::InvalidTransition(e) => Self::InvalidTransition(e),
            other => Self::Database(other),
        }
    }
}

impl PipelineError {
    /// Whether running the same work again could succeed.
    ///
    /// Dependency failures are recoverable; missing rows, bad input, and
    /// malformed tasks are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(_)
            | Self::Storage(_)
            | Self::Voice(_)
            | Self::Queue(_)
            | Self::Join(_) => true,
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::NoVoiceModel(_)
            | Self::InvalidTask(_)
            | Self::InvalidTransition(_) => false,
        }
    }

    /// Short label of the error class, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::NoVoiceModel(_) => "no_voice_model",
            Self::Database(_) => "database",
            Self::Storage(_) => "storage",
            Self::Voice(_) => "voice",
            Self::Queue(_) => "queue",
            Self::InvalidTask(_) => "invalid_task",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Join(_) => "join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconn_types::Status;

    #[test]
    fn db_errors_are_classified() {
        let not_found: PipelineError = DbError::NotFound("voice model 9".into()).into();
        assert!(matches!(not_found, PipelineError::NotFound(_)));
        assert!(!not_found.is_recoverable());

        let transition: PipelineError = DbError::InvalidTransition(TransitionError {
            from: Status::Ready,
            to: Status::Failed,
        })
        .into();
        assert!(matches!(transition, PipelineError::InvalidTransition(_)));

        let busy: PipelineError = DbError::Database(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(busy.is_recoverable());
    }

    #[test]
    fn dependency_errors_are_recoverable() {
        let storage = PipelineError::from(StorageError::Unavailable("down".into()));
        assert!(storage.is_recoverable());
        assert!(!PipelineError::NoVoiceModel(3).is_recoverable());
        assert!(!PipelineError::from(TaskError::Empty).is_recoverable());
    }
}
