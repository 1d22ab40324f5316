//! Severity classification of emitted episodes.

use proctor_models::{Severity, SignalType};
use serde::{Deserialize, Serialize};

/// How extra-face episodes are graded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FaceCountSeverity {
    /// Any extra face is HIGH.
    #[default]
    AlwaysHigh,
    /// Grade by how long the extra face stayed in view.
    DurationTiered { high_after: f64, moderate_after: f64 },
}

/// Severity rules for every signal type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityTable {
    pub face_count: FaceCountSeverity,
    /// Phone confidence at or above which the episode is HIGH
    pub phone_high_confidence: f64,
    /// Head-turn duration thresholds in seconds
    pub head_pose_high_after: f64,
    pub head_pose_moderate_after: f64,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            face_count: FaceCountSeverity::AlwaysHigh,
            phone_high_confidence: 0.75,
            head_pose_high_after: 10.0,
            head_pose_moderate_after: 5.0,
        }
    }
}

impl SeverityTable {
    pub fn with_face_count(mut self, face_count: FaceCountSeverity) -> Self {
        self.face_count = face_count;
        self
    }

    /// Grade an episode. Total: NaN inputs fall through to the lowest tier
    /// the signal can produce.
    pub fn classify(&self, signal: SignalType, confidence: f64, duration: f64) -> Severity {
        match signal {
            SignalType::FaceCount => match self.face_count {
                FaceCountSeverity::AlwaysHigh => Severity::High,
                FaceCountSeverity::DurationTiered {
                    high_after,
                    moderate_after,
                } => tier(duration, high_after, moderate_after),
            },
            SignalType::PhoneObject => {
                if confidence >= self.phone_high_confidence {
                    Severity::High
                } else {
                    Severity::Moderate
                }
            }
            SignalType::HeadPose => tier(
                duration,
                self.head_pose_high_after,
                self.head_pose_moderate_after,
            ),
        }
    }
}

fn tier(duration: f64, high_after: f64, moderate_after: f64) -> Severity {
    if duration >= high_after {
        Severity::High
    } else if duration >= moderate_after {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

/// Classify with the default table.
pub fn classify(signal: SignalType, confidence: f64, duration: f64) -> Severity {
    SeverityTable::default().classify(signal, confidence, duration)
}
