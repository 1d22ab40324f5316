//! Head-pose detection from yaw/pitch telemetry.
//!
//! Pose angles are captured upstream (by the live client) and handed to the
//! analyzer as a timeline. The detector only decides whether the head is
//! turned away far enough at a given moment.

use proctor_models::{DetectionResult, SignalType};
use serde::{Deserialize, Serialize};

use super::SignalDetector;
use crate::sampling::Frame;

/// One head-pose observation, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPoseSample {
    pub timestamp_seconds: f64,
    pub yaw: f64,
    pub pitch: f64,
}

impl HeadPoseSample {
    pub fn new(timestamp_seconds: f64, yaw: f64, pitch: f64) -> Self {
        Self {
            timestamp_seconds,
            yaw,
            pitch,
        }
    }
}

/// Supplies head-pose samples by video timestamp.
#[cfg_attr(test, mockall::automock)]
pub trait HeadPoseSource: Send + Sync {
    /// Sample closest to `timestamp`, if one is close enough to be meaningful.
    fn sample_at(&self, timestamp: f64) -> Option<HeadPoseSample>;
}

/// In-memory pose samples sorted by time.
#[derive(Debug, Clone, Default)]
pub struct PoseTimeline {
    samples: Vec<HeadPoseSample>,
    tolerance: f64,
}

impl PoseTimeline {
    /// Default lookup tolerance in seconds.
    pub const DEFAULT_TOLERANCE: f64 = 0.5;

    /// Build a timeline. Samples with non-finite values are dropped.
    pub fn new(samples: impl IntoIterator<Item = HeadPoseSample>) -> Self {
        let mut samples: Vec<HeadPoseSample> = samples
            .into_iter()
            .filter(|s| s.timestamp_seconds.is_finite() && s.yaw.is_finite() && s.pitch.is_finite())
            .collect();
        samples.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));
        Self {
            samples,
            tolerance: Self::DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl HeadPoseSource for PoseTimeline {
    fn sample_at(&self, timestamp: f64) -> Option<HeadPoseSample> {
        if !timestamp.is_finite() || self.samples.is_empty() {
            return None;
        }

        let idx = self
            .samples
            .partition_point(|s| s.timestamp_seconds < timestamp);

        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let after = self.samples.get(idx);

        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp_seconds <= a.timestamp_seconds - timestamp {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        ((nearest.timestamp_seconds - timestamp).abs() <= self.tolerance).then_some(*nearest)
    }
}

/// Reports a looking-away signal when yaw or pitch exceeds its threshold.
pub struct HeadPoseDetector<P: HeadPoseSource> {
    source: P,
    yaw_threshold: f64,
    pitch_threshold: f64,
}

impl<P: HeadPoseSource> HeadPoseDetector<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            yaw_threshold: 30.0,
            pitch_threshold: 25.0,
        }
    }

    pub fn with_thresholds(mut self, yaw: f64, pitch: f64) -> Self {
        self.yaw_threshold = yaw;
        self.pitch_threshold = pitch;
        self
    }

    fn ratio(angle: f64, threshold: f64) -> f64 {
        if threshold > 0.0 {
            angle.abs() / threshold
        } else {
            0.0
        }
    }
}

impl<P: HeadPoseSource> SignalDetector for HeadPoseDetector<P> {
    fn signal_type(&self) -> SignalType {
        SignalType::HeadPose
    }

    fn name(&self) -> &'static str {
        "head_pose"
    }

    fn detect(&self, _frame: &Frame, timestamp: f64) -> Option<DetectionResult> {
        let sample = self.source.sample_at(timestamp)?;

        let yaw_ratio = Self::ratio(sample.yaw, self.yaw_threshold);
        let pitch_ratio = Self::ratio(sample.pitch, self.pitch_threshold);
        let ratio = yaw_ratio.max(pitch_ratio);
        if ratio <= 1.0 {
            return None;
        }

        let confidence = (0.5 + 0.5 * (ratio - 1.0)).min(1.0);
        let direction = if yaw_ratio >= pitch_ratio { "yaw" } else { "pitch" };

        Some(
            DetectionResult::new(SignalType::HeadPose, confidence, timestamp)
                .with_meta("yaw", sample.yaw)
                .with_meta("pitch", sample.pitch)
                .with_meta("direction", direction),
        )
    }
}
