//! Per-frame detection results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signal::SignalType;

/// Free-form detector metadata.
///
/// Ordered so that serialized flags compare equal across identical runs.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Single observation produced by a detector for one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    pub signal_type: SignalType,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Position of the frame in the video, in seconds
    pub timestamp_seconds: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DetectionResult {
    /// Create a detection result. Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(signal_type: SignalType, confidence: f64, timestamp_seconds: f64) -> Self {
        Self {
            signal_type,
            confidence: clamp_confidence(confidence),
            timestamp_seconds,
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Clamp a raw confidence into [0, 1].
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
