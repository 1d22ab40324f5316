//! Interview session analysis state.
//!
//! The review dashboard polls these records instead of relying on a push
//! channel, so every analysis run leaves an explicit status behind.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::flag::FlagWindow;
use crate::recommendation::{Recommendation, RecommendationPolicy};
use crate::score::InterviewScore;

/// Unique identifier for a recorded interview session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one analysis run. A newer run supersedes older ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Analysis lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// No analysis has been requested yet
    #[default]
    NotStarted,
    /// A run is in flight
    InProgress,
    /// Flags for the current run are committed
    Completed,
    /// The current run aborted; no flags are committed
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::NotStarted => "not_started",
            AnalysisStatus::InProgress => "in_progress",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted status of the latest analysis run for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisStatusRecord {
    pub status: AnalysisStatus,
    /// Run that owns the session's flag collection
    pub run_id: Option<RunId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub flag_count: usize,
}

impl Default for AnalysisStatusRecord {
    fn default() -> Self {
        Self {
            status: AnalysisStatus::NotStarted,
            run_id: None,
            started_at: None,
            finished_at: None,
            error_message: None,
            flag_count: 0,
        }
    }
}

impl AnalysisStatusRecord {
    /// Record for a freshly started run.
    pub fn started(run_id: RunId) -> Self {
        Self {
            status: AnalysisStatus::InProgress,
            run_id: Some(run_id),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the run as completed with the given number of committed flags.
    pub fn complete(&mut self, flag_count: usize) {
        self.status = AnalysisStatus::Completed;
        self.flag_count = flag_count;
        self.error_message = None;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = AnalysisStatus::Failed;
        self.flag_count = 0;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_owned_by(&self, run_id: RunId) -> bool {
        self.run_id == Some(run_id)
    }
}

/// Snapshot of everything the review dashboard shows for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionAnalysis {
    pub session_id: SessionId,
    pub analysis: AnalysisStatusRecord,
    pub final_score: Option<InterviewScore>,
    pub flags: Vec<FlagWindow>,
    pub recommendation: Option<Recommendation>,
}

impl SessionAnalysis {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            analysis: AnalysisStatusRecord::default(),
            final_score: None,
            flags: Vec::new(),
            recommendation: None,
        }
    }

    /// Recompute the recommendation from the current score and flags.
    ///
    /// Replaces any previous value. Stays `None` until a score is known and
    /// the flag set is committed.
    pub fn recompute(&mut self, policy: &RecommendationPolicy) -> Option<Recommendation> {
        self.recommendation = match (self.final_score, self.analysis.status) {
            (Some(score), AnalysisStatus::Completed) => Some(policy.decide(score, &self.flags)),
            _ => None,
        };
        self.recommendation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Severity, SignalType};

    #[test]
    fn test_status_record_transitions() {
        let run = RunId::new();
        let mut record = AnalysisStatusRecord::started(run);
        assert_eq!(record.status, AnalysisStatus::InProgress);
        assert!(record.is_owned_by(run));
        assert!(!record.is_owned_by(RunId::new()));

        record.complete(3);
        assert!(record.status.is_terminal());
        assert_eq!(record.flag_count, 3);

        record.fail("decode error");
        assert_eq!(record.status, AnalysisStatus::Failed);
        assert_eq!(record.flag_count, 0);
        assert_eq!(record.error_message.as_deref(), Some("decode error"));
    }

    #[test]
    fn test_recompute_replaces_recommendation() {
        let mut session = SessionAnalysis::new(SessionId::from("s-1"));
        let policy = RecommendationPolicy::default();
        session.final_score = Some(InterviewScore::from_f64(8.2).unwrap());

        // Flags not committed yet
        assert_eq!(session.recompute(&policy), None);

        session.analysis.complete(0);
        assert_eq!(session.recompute(&policy), Some(Recommendation::Pass));

        session.flags = vec![
            FlagWindow::try_new(SignalType::FaceCount, 0.0, 3.0, 1.0, Severity::High).unwrap(),
            FlagWindow::try_new(SignalType::FaceCount, 30.0, 33.0, 1.0, Severity::High).unwrap(),
        ];
        assert_eq!(session.recompute(&policy), Some(Recommendation::Fail));
        assert_eq!(session.recommendation, Some(Recommendation::Fail));
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&AnalysisStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
