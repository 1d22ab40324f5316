//! Frames in, flags out: one analysis run over one recording.

use proctor_models::flag::sort_timeline;
use proctor_models::{FlagWindow, Metadata, SignalType};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::classifier::SeverityTable;
use super::config::TrackerConfigTable;
use super::tracker::FlagTracker;
use crate::detection::DetectorBank;
use crate::error::{MediaError, MediaResult};
use crate::sampling::{FfmpegFrameSource, FfmpegSourceConfig, FrameSampler, FrameSource, SamplerConfig};

/// Settings for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    pub sampler: SamplerConfig,
    pub decoder: FfmpegSourceConfig,
    pub trackers: TrackerConfigTable,
    pub severity: SeverityTable,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// Flags clamped to `duration`, in timeline order
    pub flags: Vec<FlagWindow>,
    pub frames_decoded: u64,
    pub frames_sampled: u64,
    pub fps: f64,
    pub fps_was_estimated: bool,
    /// Effective recording length used for clamping
    pub duration: f64,
    pub rejected_observations: u64,
}

/// Runs the detector bank over sampled frames and debounces the results.
pub struct IntegrityAnalyzer {
    bank: Arc<DetectorBank>,
    config: AnalyzerConfig,
}

impl IntegrityAnalyzer {
    pub fn new(bank: DetectorBank, config: AnalyzerConfig) -> Self {
        Self {
            bank: Arc::new(bank),
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn signals(&self) -> Vec<SignalType> {
        self.bank.signals()
    }

    /// Decode a video file with FFmpeg and analyse it.
    pub async fn analyze_file(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        let source = FfmpegFrameSource::open(path, &self.config.decoder).await?;
        self.analyze(source, cancel).await
    }

    /// Analyse any frame source.
    ///
    /// Frames are processed strictly in order. Cancellation is checked
    /// between frames and discards everything emitted so far.
    pub async fn analyze<S: FrameSource>(
        &self,
        source: S,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        let started = Instant::now();
        let mut sampler = FrameSampler::new(source, &self.config.sampler)?;
        let reported_duration = sampler.reported_duration();

        let mut trackers: BTreeMap<SignalType, FlagTracker> = self
            .bank
            .signals()
            .into_iter()
            .map(|signal| {
                let tracker = FlagTracker::new(
                    signal,
                    self.config.trackers.get(signal),
                    self.config.severity,
                )
                .with_duration_limit(reported_duration);
                (signal, tracker)
            })
            .collect();

        let mut flags = Vec::new();

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MediaError::Cancelled),
                next = sampler.next() => next?,
            };
            let Some(frame) = frame else { break };

            let timestamp = frame.timestamp_seconds;
            let bank = Arc::clone(&self.bank);
            let results = tokio::task::spawn_blocking(move || bank.detect_all(&frame))
                .await
                .map_err(|e| MediaError::internal(format!("Detection task failed: {}", e)))?;

            for (signal, result) in results {
                let Some(tracker) = trackers.get_mut(&signal) else {
                    continue;
                };
                let (confidence, metadata) = match result {
                    Some(det) => (det.confidence, det.metadata),
                    None => (0.0, Metadata::new()),
                };
                if let Some(flag) = tracker.update(timestamp, confidence, metadata) {
                    flags.push(flag);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let duration = reported_duration.unwrap_or_else(|| sampler.observed_duration());
        let mut flags: Vec<FlagWindow> = flags.into_iter().map(|f| f.clamp_to(duration)).collect();
        sort_timeline(&mut flags);

        let rejected_observations = trackers.values().map(|t| t.rejected_count()).sum();
        for tracker in trackers.values() {
            debug!(
                signal = %tracker.signal_type(),
                emitted = tracker.emitted_count(),
                rejected = tracker.rejected_count(),
                "Tracker finished"
            );
        }

        info!(
            frames_decoded = sampler.frames_decoded(),
            frames_sampled = sampler.frames_emitted(),
            fps = sampler.fps(),
            duration,
            flags = flags.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Integrity analysis finished"
        );

        Ok(AnalysisOutcome {
            flags,
            frames_decoded: sampler.frames_decoded(),
            frames_sampled: sampler.frames_emitted(),
            fps: sampler.fps(),
            fps_was_estimated: sampler.fps_was_estimated(),
            duration,
            rejected_observations,
        })
    }
}
