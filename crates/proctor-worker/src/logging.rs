//! Structured logging for analysis runs.
//!
//! Every line a run writes carries the session and run identifiers so a
//! single interview can be followed through the worker logs.

use tracing::{error, info, warn, Span};

use proctor_models::{RunId, SessionId};

/// Lifecycle logger for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisLogger {
    session_id: String,
    run_id: String,
}

impl AnalysisLogger {
    pub fn new(session_id: &SessionId, run_id: RunId) -> Self {
        Self {
            session_id: session_id.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            run_id = %self.run_id,
            "Analysis started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            run_id = %self.run_id,
            "Analysis progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            run_id = %self.run_id,
            "Analysis warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            run_id = %self.run_id,
            "Analysis error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            run_id = %self.run_id,
            "Analysis completed: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span wrapping the whole run, so detector and tracker logs inherit
    /// the identifiers.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "analysis",
            session_id = %self.session_id,
            run_id = %self.run_id
        )
    }
}
