//! Persistence seam for session flags, scores and analysis status.
//!
//! A session's flag collection is owned by exactly one run at a time.
//! `begin_run` hands ownership to a new run and clears whatever an older run
//! committed; `commit_run` and `fail_run` only succeed for the current owner,
//! so a superseded run can never overwrite a newer result.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use proctor_models::flag::sort_timeline;
use proctor_models::{
    AnalysisStatus, AnalysisStatusRecord, FlagWindow, InterviewScore, RecommendationPolicy, RunId,
    SessionAnalysis, SessionId,
};

use crate::error::{StoreError, StoreResult};

/// Storage for per-session analysis results.
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Make `run_id` the owner of the session's flags, clearing any flags and
    /// recommendation left by earlier runs.
    async fn begin_run(&self, session: &SessionId, run_id: RunId) -> StoreResult<AnalysisStatusRecord>;

    /// Atomically replace the session's flag set with `flags`.
    ///
    /// Fails with [`StoreError::StaleRun`] unless `run_id` still owns the
    /// session and is in progress.
    async fn commit_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        flags: Vec<FlagWindow>,
    ) -> StoreResult<SessionAnalysis>;

    /// Mark the owning run as failed. Leaves no flags behind.
    async fn fail_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        error: &str,
    ) -> StoreResult<AnalysisStatusRecord>;

    /// Record the externally produced score and recompute the recommendation.
    async fn record_score(&self, session: &SessionId, score: InterviewScore) -> StoreResult<SessionAnalysis>;

    /// Current status; `NotStarted` for unknown sessions.
    async fn status(&self, session: &SessionId) -> StoreResult<AnalysisStatusRecord>;

    /// Committed flags in timeline order.
    async fn flags(&self, session: &SessionId) -> StoreResult<Vec<FlagWindow>>;

    /// Full view of one session.
    async fn snapshot(&self, session: &SessionId) -> StoreResult<SessionAnalysis>;
}

/// Process-local [`FlagStore`].
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    sessions: RwLock<HashMap<SessionId, SessionAnalysis>>,
    policy: RecommendationPolicy,
}

impl InMemoryFlagStore {
    pub fn new(policy: RecommendationPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RecommendationPolicy {
        &self.policy
    }

    fn owned_in_progress<'a>(
        sessions: &'a mut HashMap<SessionId, SessionAnalysis>,
        session: &SessionId,
        run_id: RunId,
    ) -> StoreResult<&'a mut SessionAnalysis> {
        let entry = sessions
            .get_mut(session)
            .ok_or_else(|| StoreError::SessionNotFound(session.clone()))?;
        if !entry.analysis.is_owned_by(run_id) || entry.analysis.status != AnalysisStatus::InProgress {
            return Err(StoreError::stale_run(session, run_id));
        }
        Ok(entry)
    }
}

#[async_trait]
impl FlagStore for InMemoryFlagStore {
    async fn begin_run(&self, session: &SessionId, run_id: RunId) -> StoreResult<AnalysisStatusRecord> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(session.clone())
            .or_insert_with(|| SessionAnalysis::new(session.clone()));

        if let Some(previous) = entry.analysis.run_id {
            debug!(session_id = %session, previous_run = %previous, run_id = %run_id, "Run superseded");
        }
        entry.analysis = AnalysisStatusRecord::started(run_id);
        entry.flags.clear();
        entry.recompute(&self.policy);
        Ok(entry.analysis.clone())
    }

    async fn commit_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        mut flags: Vec<FlagWindow>,
    ) -> StoreResult<SessionAnalysis> {
        let mut sessions = self.sessions.write().await;
        let entry = Self::owned_in_progress(&mut sessions, session, run_id)?;

        sort_timeline(&mut flags);
        entry.analysis.complete(flags.len());
        entry.flags = flags;
        entry.recompute(&self.policy);
        Ok(entry.clone())
    }

    async fn fail_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        error: &str,
    ) -> StoreResult<AnalysisStatusRecord> {
        let mut sessions = self.sessions.write().await;
        let entry = Self::owned_in_progress(&mut sessions, session, run_id)?;

        entry.analysis.fail(error);
        entry.flags.clear();
        entry.recompute(&self.policy);
        Ok(entry.analysis.clone())
    }

    async fn record_score(&self, session: &SessionId, score: InterviewScore) -> StoreResult<SessionAnalysis> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(session.clone())
            .or_insert_with(|| SessionAnalysis::new(session.clone()));
        entry.final_score = Some(score);
        entry.recompute(&self.policy);
        Ok(entry.clone())
    }

    async fn status(&self, session: &SessionId) -> StoreResult<AnalysisStatusRecord> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .map(|s| s.analysis.clone())
            .unwrap_or_default())
    }

    async fn flags(&self, session: &SessionId) -> StoreResult<Vec<FlagWindow>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session).map(|s| s.flags.clone()).unwrap_or_default())
    }

    async fn snapshot(&self, session: &SessionId) -> StoreResult<SessionAnalysis> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .cloned()
            .unwrap_or_else(|| SessionAnalysis::new(session.clone())))
    }
}
