//! Per-session background analysis.
//!
//! `trigger` never blocks on the analysis itself: it registers the run with
//! the store, spawns a task and returns. At most one run per session is live;
//! a forced re-run cancels the previous one, and the store's run guard
//! discards anything the superseded run still tries to commit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use proctor_media::MediaError;
use proctor_models::{AnalysisStatus, AnalysisStatusRecord, InterviewScore, RunId, SessionAnalysis, SessionId};

use crate::analysis::SessionAnalyzer;
use crate::config::WorkerConfig;
use crate::error::{StoreError, WorkerError, WorkerResult};
use crate::logging::AnalysisLogger;
use crate::store::FlagStore;

/// What a call to [`AnalysisCoordinator::trigger`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// A new run was started.
    Started(AnalysisStatusRecord),
    /// A run is already in flight; nothing was started.
    AlreadyRunning(AnalysisStatusRecord),
    /// The session already has a completed analysis; nothing was started.
    AlreadyCompleted(AnalysisStatusRecord),
}

impl TriggerOutcome {
    pub fn status(&self) -> &AnalysisStatusRecord {
        match self {
            TriggerOutcome::Started(s)
            | TriggerOutcome::AlreadyRunning(s)
            | TriggerOutcome::AlreadyCompleted(s) => s,
        }
    }

    pub fn started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.status().run_id
    }
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

type RunRegistry = Arc<Mutex<HashMap<SessionId, ActiveRun>>>;

/// Everything a spawned run needs.
struct RunContext {
    session: SessionId,
    run_id: RunId,
    video_path: PathBuf,
    cancel: CancellationToken,
    config: WorkerConfig,
    store: Arc<dyn FlagStore>,
    analyzer: Arc<dyn SessionAnalyzer>,
    semaphore: Arc<Semaphore>,
    runs: RunRegistry,
}

/// Outcome label for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Superseded,
}

impl RunOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timeout",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Superseded => "superseded",
        }
    }
}

/// Schedules and tracks analysis runs.
pub struct AnalysisCoordinator {
    config: WorkerConfig,
    store: Arc<dyn FlagStore>,
    analyzer: Arc<dyn SessionAnalyzer>,
    semaphore: Arc<Semaphore>,
    runs: RunRegistry,
}

impl AnalysisCoordinator {
    pub fn new(config: WorkerConfig, store: Arc<dyn FlagStore>, analyzer: Arc<dyn SessionAnalyzer>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_analyses.max(1)));
        Self {
            config,
            store,
            analyzer,
            semaphore,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn FlagStore> {
        &self.store
    }

    /// Start analysing a session's recording in the background.
    ///
    /// Without `force` this is idempotent: an in-flight or completed analysis
    /// is reported, not repeated. With `force` any in-flight run is cancelled
    /// and superseded by a new one.
    pub async fn trigger(
        &self,
        session: &SessionId,
        video_path: impl Into<PathBuf>,
        force: bool,
    ) -> WorkerResult<TriggerOutcome> {
        let mut runs = self.runs.lock().await;

        if let Some(active) = runs.get(session) {
            if !force {
                let status = self.store.status(session).await?;
                return Ok(TriggerOutcome::AlreadyRunning(status));
            }
            info!(
                session_id = %session,
                run_id = %active.run_id,
                "Cancelling superseded analysis run"
            );
            active.cancel.cancel();
        } else if !force {
            let status = self.store.status(session).await?;
            if status.status == AnalysisStatus::Completed {
                return Ok(TriggerOutcome::AlreadyCompleted(status));
            }
        }

        let run_id = RunId::new();
        let status = self.store.begin_run(session, run_id).await?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let ctx = RunContext {
            session: session.clone(),
            run_id,
            video_path: video_path.into(),
            cancel: cancel.clone(),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            analyzer: Arc::clone(&self.analyzer),
            semaphore: Arc::clone(&self.semaphore),
            runs: Arc::clone(&self.runs),
        };

        let logger = AnalysisLogger::new(session, run_id);
        let span = logger.create_span();
        tokio::spawn(
            async move {
                execute_run(ctx, logger).await;
                let _ = done_tx.send(true);
            }
            .instrument(span),
        );

        runs.insert(
            session.clone(),
            ActiveRun {
                run_id,
                cancel,
                done: done_rx,
            },
        );

        Ok(TriggerOutcome::Started(status))
    }

    /// Cancel the session's in-flight run, if any. Returns whether a run was cancelled.
    pub async fn cancel(&self, session: &SessionId) -> bool {
        let runs = self.runs.lock().await;
        match runs.get(session) {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, session: &SessionId) -> bool {
        self.runs.lock().await.contains_key(session)
    }

    /// Wait until the session has no run in flight.
    pub async fn wait(&self, session: &SessionId) {
        loop {
            let (run_id, mut done) = {
                let runs = self.runs.lock().await;
                match runs.get(session) {
                    Some(active) => (active.run_id, active.done.clone()),
                    None => return,
                }
            };

            if done.wait_for(|finished| *finished).await.is_err() {
                // The task died without reporting back; drop its registration.
                let mut runs = self.runs.lock().await;
                if runs.get(session).is_some_and(|active| active.run_id == run_id) {
                    runs.remove(session);
                }
            }
        }
    }

    /// Cancel every in-flight run and wait for them to wind down.
    pub async fn shutdown(&self) {
        let sessions: Vec<SessionId> = {
            let runs = self.runs.lock().await;
            for active in runs.values() {
                active.cancel.cancel();
            }
            runs.keys().cloned().collect()
        };
        for session in &sessions {
            self.wait(session).await;
        }
        info!(runs = sessions.len(), "Analysis coordinator stopped");
    }

    pub async fn status(&self, session: &SessionId) -> WorkerResult<AnalysisStatusRecord> {
        Ok(self.store.status(session).await?)
    }

    /// Record the external interview score; the recommendation is recomputed.
    pub async fn record_score(&self, session: &SessionId, score: InterviewScore) -> WorkerResult<SessionAnalysis> {
        Ok(self.store.record_score(session, score).await?)
    }

    pub async fn snapshot(&self, session: &SessionId) -> WorkerResult<SessionAnalysis> {
        Ok(self.store.snapshot(session).await?)
    }
}

async fn execute_run(ctx: RunContext, logger: AnalysisLogger) {
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            logger.log_warning("cancelled before a worker slot was free");
            settle_failure(&ctx, &logger, "Analysis cancelled", RunOutcome::Cancelled).await
        }
        permit = Arc::clone(&ctx.semaphore).acquire_owned() => match permit {
            Ok(_permit) => run_analysis(&ctx, &logger).await,
            Err(_) => {
                settle_failure(&ctx, &logger, "Worker is shutting down", RunOutcome::Failed).await
            }
        },
    };

    histogram!("proctor_analysis_duration_seconds").record(started.elapsed().as_secs_f64());
    counter!("proctor_analysis_runs_total", "outcome" => outcome.as_str()).increment(1);

    let mut runs = ctx.runs.lock().await;
    if runs.get(&ctx.session).is_some_and(|active| active.run_id == ctx.run_id) {
        runs.remove(&ctx.session);
    }
}

async fn run_analysis(ctx: &RunContext, logger: &AnalysisLogger) -> RunOutcome {
    logger.log_start(&ctx.video_path.display().to_string());

    let analysis = tokio::time::timeout(
        ctx.config.analysis_timeout,
        ctx.analyzer.analyze(&ctx.session, &ctx.video_path, &ctx.cancel),
    )
    .await;

    let outcome = match analysis {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(MediaError::Cancelled)) => {
            return settle_failure(ctx, logger, "Analysis cancelled", RunOutcome::Cancelled).await;
        }
        Ok(Err(e)) => {
            let message = e.to_string();
            return settle_failure(ctx, logger, &message, RunOutcome::Failed).await;
        }
        Err(_) => {
            ctx.cancel.cancel();
            let message = WorkerError::Timeout(ctx.config.analysis_timeout).to_string();
            return settle_failure(ctx, logger, &message, RunOutcome::TimedOut).await;
        }
    };

    if outcome.fps_was_estimated {
        logger.log_warning(&format!("frame rate unknown, assumed {} fps", outcome.fps));
    }
    logger.log_progress(&format!(
        "{} frames sampled of {} decoded, {} flags",
        outcome.frames_sampled,
        outcome.frames_decoded,
        outcome.flags.len()
    ));

    match ctx.store.commit_run(&ctx.session, ctx.run_id, outcome.flags).await {
        Ok(snapshot) => {
            logger.log_completion(&format!(
                "{} flags committed, recommendation {:?}",
                snapshot.flags.len(),
                snapshot.recommendation
            ));
            RunOutcome::Completed
        }
        Err(StoreError::StaleRun { .. }) => {
            logger.log_warning("superseded by a newer run, results discarded");
            RunOutcome::Superseded
        }
        Err(e) => {
            let message = format!("Failed to commit flags: {}", e);
            settle_failure(ctx, logger, &message, RunOutcome::Failed).await
        }
    }
}

/// Record a failed run. A superseded run leaves the store alone.
async fn settle_failure(
    ctx: &RunContext,
    logger: &AnalysisLogger,
    message: &str,
    outcome: RunOutcome,
) -> RunOutcome {
    match ctx.store.fail_run(&ctx.session, ctx.run_id, message).await {
        Ok(_) => {
            logger.log_error(message);
            outcome
        }
        Err(e) if e.is_stale_run() => {
            logger.log_warning("superseded by a newer run");
            RunOutcome::Superseded
        }
        Err(e) => {
            logger.log_error(&format!("{} (status not recorded: {})", message, e));
            outcome
        }
    }
}
