//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Unknown signal type: {0}")]
    UnknownSignal(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Score out of range (expected 0.00-10.00): {0}")]
    ScoreOutOfRange(String),

    #[error("Invalid score: {0}")]
    InvalidScore(String),

    #[error("Invalid flag window: {0}")]
    InvalidFlagWindow(String),
}
