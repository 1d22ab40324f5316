//! Worker error types.

use std::time::Duration;
use thiserror::Error;

use proctor_models::{RunId, SessionId};

pub type WorkerResult<T> = Result<T, WorkerError>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`FlagStore`](crate::store::FlagStore).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The run no longer owns the session; a newer run superseded it.
    #[error("Run {run_id} is stale for session {session_id}")]
    StaleRun { session_id: SessionId, run_id: RunId },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn stale_run(session_id: &SessionId, run_id: RunId) -> Self {
        Self::StaleRun {
            session_id: session_id.clone(),
            run_id,
        }
    }

    pub fn is_stale_run(&self) -> bool {
        matches!(self, StoreError::StaleRun { .. })
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] proctor_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] proctor_models::ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn analysis_failed(msg: impl Into<String>) -> Self {
        Self::AnalysisFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if the error means the run was replaced by a newer one.
    pub fn is_superseded(&self) -> bool {
        match self {
            WorkerError::Store(e) => e.is_stale_run(),
            WorkerError::Media(proctor_media::MediaError::Cancelled) => true,
            _ => false,
        }
    }
}
