//! End-to-end analysis runs through the coordinator.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use proctor_media::sampling::{Frame, MemoryFrameSource};
use proctor_media::{
    AnalysisOutcome, AnalyzerConfig, DetectorBank, IntegrityAnalyzer, MediaError, MediaResult,
    SignalDetector,
};
use proctor_models::{
    AnalysisStatus, AnalysisStatusRecord, DetectionResult, FlagWindow, InterviewScore, Recommendation,
    RunId, SessionAnalysis, SessionId, Severity, SignalType,
};
use proctor_worker::{
    AnalysisCoordinator, FlagStore, InMemoryFlagStore, SessionAnalyzer, StoreResult, TriggerOutcome,
    WorkerConfig,
};

/// Reports a fixed confidence inside the given time spans.
struct Scripted {
    signal: SignalType,
    spans: Vec<(f64, f64, f64)>,
}

impl SignalDetector for Scripted {
    fn signal_type(&self) -> SignalType {
        self.signal
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&self, _frame: &Frame, timestamp: f64) -> Option<DetectionResult> {
        self.spans
            .iter()
            .find(|(from, to, _)| timestamp >= *from && timestamp < *to)
            .map(|(_, _, conf)| DetectionResult::new(self.signal, *conf, timestamp))
    }
}

/// Real pipeline over 53 s of synthetic 30 fps frames. Paths ending in
/// `corrupt.mp4` fail halfway through decoding.
struct SyntheticAnalyzer {
    inner: IntegrityAnalyzer,
    calls: AtomicUsize,
}

impl SyntheticAnalyzer {
    fn new() -> Self {
        let bank = DetectorBank::new()
            .with_detector(Scripted {
                signal: SignalType::PhoneObject,
                spans: vec![(10.0, 14.0, 0.8)],
            })
            .with_detector(Scripted {
                signal: SignalType::FaceCount,
                spans: vec![(20.0, 21.0, 1.0)],
            });
        Self {
            inner: IntegrityAnalyzer::new(bank, AnalyzerConfig::default()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionAnalyzer for SyntheticAnalyzer {
    async fn analyze(
        &self,
        _session: &SessionId,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut source = MemoryFrameSource::repeat(Some(30.0), 1590, RgbImage::new(8, 8));
        if video_path.to_string_lossy().ends_with("corrupt.mp4") {
            source = source.with_failure_at(800);
        }
        self.inner.analyze(source, cancel).await
    }
}

/// First call blocks until released and ignores cancellation; later calls
/// return immediately with no flags.
struct GatedAnalyzer {
    calls: AtomicUsize,
    release: Notify,
}

impl GatedAnalyzer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        }
    }

    fn outcome(flags: Vec<FlagWindow>) -> AnalysisOutcome {
        AnalysisOutcome {
            flags,
            frames_decoded: 300,
            frames_sampled: 20,
            fps: 30.0,
            fps_was_estimated: false,
            duration: 10.0,
            rejected_observations: 0,
        }
    }
}

#[async_trait]
impl SessionAnalyzer for GatedAnalyzer {
    async fn analyze(
        &self,
        _session: &SessionId,
        _video_path: &Path,
        _cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
            let flag = FlagWindow::try_new(SignalType::PhoneObject, 3.0, 7.0, 0.9, Severity::High).unwrap();
            return Ok(Self::outcome(vec![flag]));
        }
        Ok(Self::outcome(Vec::new()))
    }
}

/// Never finishes on its own; stops when cancelled.
struct StuckAnalyzer;

#[async_trait]
impl SessionAnalyzer for StuckAnalyzer {
    async fn analyze(
        &self,
        _session: &SessionId,
        _video_path: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        cancel.cancelled().await;
        Err(MediaError::Cancelled)
    }
}

/// Store wrapper counting commits rejected as stale.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryFlagStore,
    stale_commits: AtomicUsize,
}

#[async_trait]
impl FlagStore for CountingStore {
    async fn begin_run(&self, session: &SessionId, run_id: RunId) -> StoreResult<AnalysisStatusRecord> {
        self.inner.begin_run(session, run_id).await
    }

    async fn commit_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        flags: Vec<FlagWindow>,
    ) -> StoreResult<SessionAnalysis> {
        let result = self.inner.commit_run(session, run_id, flags).await;
        if matches!(&result, Err(e) if e.is_stale_run()) {
            self.stale_commits.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn fail_run(
        &self,
        session: &SessionId,
        run_id: RunId,
        error: &str,
    ) -> StoreResult<AnalysisStatusRecord> {
        self.inner.fail_run(session, run_id, error).await
    }

    async fn record_score(&self, session: &SessionId, score: InterviewScore) -> StoreResult<SessionAnalysis> {
        self.inner.record_score(session, score).await
    }

    async fn status(&self, session: &SessionId) -> StoreResult<AnalysisStatusRecord> {
        self.inner.status(session).await
    }

    async fn flags(&self, session: &SessionId) -> StoreResult<Vec<FlagWindow>> {
        self.inner.flags(session).await
    }

    async fn snapshot(&self, session: &SessionId) -> StoreResult<SessionAnalysis> {
        self.inner.snapshot(session).await
    }
}

fn coordinator_with(analyzer: Arc<dyn SessionAnalyzer>, config: WorkerConfig) -> AnalysisCoordinator {
    AnalysisCoordinator::new(config, Arc::new(InMemoryFlagStore::default()), analyzer)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_analysis_commits_flags() {
    let analyzer = Arc::new(SyntheticAnalyzer::new());
    let coordinator = coordinator_with(analyzer.clone(), WorkerConfig::default());
    let session = SessionId::from("interview-1");

    let outcome = coordinator.trigger(&session, "interview.mp4", false).await.unwrap();
    assert!(outcome.started());
    assert_eq!(outcome.status().status, AnalysisStatus::InProgress);

    coordinator.wait(&session).await;

    let snapshot = coordinator.snapshot(&session).await.unwrap();
    assert_eq!(snapshot.analysis.status, AnalysisStatus::Completed);
    assert_eq!(snapshot.analysis.run_id, outcome.run_id());
    assert_eq!(snapshot.analysis.flag_count, 2);

    let flags: Vec<(SignalType, f64, f64)> = snapshot
        .flags
        .iter()
        .map(|f| (f.signal_type, f.t_start, f.t_end))
        .collect();
    assert_eq!(
        flags,
        vec![
            (SignalType::PhoneObject, 8.0, 13.5),
            (SignalType::FaceCount, 19.0, 22.0),
        ]
    );
    assert!(snapshot.flags.iter().all(|f| f.is_within(53.0)));
    // No score yet
    assert_eq!(snapshot.recommendation, None);
}

#[tokio::test]
async fn test_score_and_flags_drive_recommendation() {
    let coordinator = coordinator_with(Arc::new(SyntheticAnalyzer::new()), WorkerConfig::default());
    let session = SessionId::from("interview-2");

    coordinator
        .record_score(&session, "8.20".parse().unwrap())
        .await
        .unwrap();
    coordinator.trigger(&session, "interview.mp4", false).await.unwrap();
    coordinator.wait(&session).await;

    // Two HIGH flags fail the candidate regardless of the score.
    let snapshot = coordinator.snapshot(&session).await.unwrap();
    assert_eq!(snapshot.recommendation, Some(Recommendation::Fail));
}

#[tokio::test]
async fn test_retrigger_while_running_is_noop() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let coordinator = coordinator_with(analyzer.clone(), WorkerConfig::default());
    let session = SessionId::from("interview-3");

    let first = coordinator.trigger(&session, "a.mp4", false).await.unwrap();
    let second = coordinator.trigger(&session, "a.mp4", false).await.unwrap();
    assert!(first.started());
    assert!(matches!(second, TriggerOutcome::AlreadyRunning(_)));
    assert_eq!(second.run_id(), first.run_id());

    analyzer.release.notify_one();
    coordinator.wait(&session).await;

    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.status(&session).await.unwrap().flag_count, 1);
}

#[tokio::test]
async fn test_completed_session_is_not_rerun() {
    let analyzer = Arc::new(SyntheticAnalyzer::new());
    let coordinator = coordinator_with(analyzer.clone(), WorkerConfig::default());
    let session = SessionId::from("interview-4");

    coordinator.trigger(&session, "interview.mp4", false).await.unwrap();
    coordinator.wait(&session).await;

    let again = coordinator.trigger(&session, "interview.mp4", false).await.unwrap();
    assert!(matches!(again, TriggerOutcome::AlreadyCompleted(_)));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);

    let forced = coordinator.trigger(&session, "interview.mp4", true).await.unwrap();
    assert!(forced.started());
    coordinator.wait(&session).await;
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);

    // Identical input, identical flags.
    assert_eq!(coordinator.status(&session).await.unwrap().flag_count, 2);
}

#[tokio::test]
async fn test_forced_rerun_discards_superseded_flags() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let store = Arc::new(CountingStore::default());
    let coordinator = AnalysisCoordinator::new(WorkerConfig::default(), store.clone(), analyzer.clone());
    let session = SessionId::from("interview-5");

    let first = coordinator.trigger(&session, "a.mp4", false).await.unwrap();
    eventually(|| analyzer.calls.load(Ordering::SeqCst) == 1).await;

    let second = coordinator.trigger(&session, "a.mp4", true).await.unwrap();
    assert!(second.started());
    assert_ne!(first.run_id(), second.run_id());
    coordinator.wait(&session).await;

    let status = coordinator.status(&session).await.unwrap();
    assert_eq!(status.status, AnalysisStatus::Completed);
    assert_eq!(status.run_id, second.run_id());

    // The superseded run now finishes and tries to commit its flag.
    analyzer.release.notify_one();
    eventually(|| store.stale_commits.load(Ordering::SeqCst) == 1).await;

    let snapshot = coordinator.snapshot(&session).await.unwrap();
    assert!(snapshot.flags.is_empty());
    assert_eq!(snapshot.analysis.run_id, second.run_id());
}

#[tokio::test]
async fn test_corrupt_source_marks_failed() {
    let coordinator = coordinator_with(Arc::new(SyntheticAnalyzer::new()), WorkerConfig::default());
    let session = SessionId::from("interview-6");

    coordinator.trigger(&session, "corrupt.mp4", false).await.unwrap();
    coordinator.wait(&session).await;

    let snapshot = coordinator.snapshot(&session).await.unwrap();
    assert_eq!(snapshot.analysis.status, AnalysisStatus::Failed);
    assert!(snapshot.flags.is_empty());
    let message = snapshot.analysis.error_message.unwrap_or_default();
    assert!(message.contains("Decode failed"), "unexpected message: {}", message);

    // A failed session may be retried without force.
    let retry = coordinator.trigger(&session, "interview.mp4", false).await.unwrap();
    assert!(retry.started());
    coordinator.wait(&session).await;
    assert_eq!(coordinator.status(&session).await.unwrap().status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn test_timeout_fails_run() {
    let config = WorkerConfig {
        analysis_timeout: Duration::from_millis(50),
        ..WorkerConfig::default()
    };
    let coordinator = coordinator_with(Arc::new(StuckAnalyzer), config);
    let session = SessionId::from("interview-7");

    coordinator.trigger(&session, "slow.mp4", false).await.unwrap();
    coordinator.wait(&session).await;

    let status = coordinator.status(&session).await.unwrap();
    assert_eq!(status.status, AnalysisStatus::Failed);
    assert!(status.error_message.unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn test_cancel_marks_failed() {
    let coordinator = coordinator_with(Arc::new(StuckAnalyzer), WorkerConfig::default());
    let session = SessionId::from("interview-8");

    coordinator.trigger(&session, "slow.mp4", false).await.unwrap();
    assert!(coordinator.is_running(&session).await);
    assert!(coordinator.cancel(&session).await);
    coordinator.wait(&session).await;

    let status = coordinator.status(&session).await.unwrap();
    assert_eq!(status.status, AnalysisStatus::Failed);
    assert_eq!(status.error_message.as_deref(), Some("Analysis cancelled"));
    assert!(!coordinator.cancel(&session).await);
}

#[tokio::test]
async fn test_concurrency_limit_queues_runs() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let config = WorkerConfig {
        max_concurrent_analyses: 1,
        ..WorkerConfig::default()
    };
    let coordinator = coordinator_with(analyzer.clone(), config);
    let a = SessionId::from("interview-9a");
    let b = SessionId::from("interview-9b");

    coordinator.trigger(&a, "a.mp4", false).await.unwrap();
    eventually(|| analyzer.calls.load(Ordering::SeqCst) == 1).await;

    let queued = coordinator.trigger(&b, "b.mp4", false).await.unwrap();
    assert!(queued.started());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.status(&b).await.unwrap().status, AnalysisStatus::InProgress);

    analyzer.release.notify_one();
    coordinator.wait(&a).await;
    coordinator.wait(&b).await;
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.status(&b).await.unwrap().status, AnalysisStatus::Completed);
}
