//! Per-frame signal detectors.
//!
//! Every detector implements [`SignalDetector`]: it looks at one sampled
//! frame and reports at most one [`DetectionResult`]. Detectors are total;
//! a frame they cannot read yields `None`, never an error, so the tracker
//! sees it as a dropout.
//!
//! Heuristic and learned detectors are interchangeable behind the trait.

#[cfg(feature = "opencv")]
mod cv;
mod face_count;
mod head_pose;
#[cfg(feature = "opencv")]
mod phone_object;
#[cfg(feature = "opencv")]
mod yunet;

pub use face_count::{merge_overlapping, FaceCountDetector, FaceLocator};
pub use head_pose::{HeadPoseDetector, HeadPoseSample, HeadPoseSource, PoseTimeline};
#[cfg(feature = "opencv")]
pub use phone_object::{PhoneObjectConfig, PhoneObjectDetector};
#[cfg(feature = "opencv")]
pub use yunet::YuNetFaceLocator;

#[cfg(test)]
pub use face_count::MockFaceLocator;
#[cfg(test)]
pub use head_pose::MockHeadPoseSource;

use proctor_models::{DetectionResult, SignalType};
use serde::{Deserialize, Serialize};

use crate::sampling::Frame;

/// Capability shared by all detectors.
pub trait SignalDetector: Send + Sync {
    /// Signal this detector reports.
    fn signal_type(&self) -> SignalType;

    /// Detector name for logging.
    fn name(&self) -> &'static str;

    /// Inspect one frame. `timestamp` is the frame's position in seconds.
    fn detect(&self, frame: &Frame, timestamp: f64) -> Option<DetectionResult>;
}

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox::new(x, y, self.x2().max(other.x2()) - x, self.y2().max(other.y2()) - y)
    }

    /// Box as a JSON object for detection metadata.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "x": self.x,
            "y": self.y,
            "width": self.width,
            "height": self.height,
        })
    }
}

/// A located face and the locator's score for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub bbox: BoundingBox,
    pub score: f64,
}

impl FaceBox {
    pub fn new(bbox: BoundingBox, score: f64) -> Self {
        Self { bbox, score }
    }
}

/// The set of detectors consulted for every sampled frame.
#[derive(Default)]
pub struct DetectorBank {
    detectors: Vec<Box<dyn SignalDetector>>,
}

impl DetectorBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(mut self, detector: impl SignalDetector + 'static) -> Self {
        self.push(Box::new(detector));
        self
    }

    /// Add a detector. A detector for an already-registered signal replaces it.
    pub fn push(&mut self, detector: Box<dyn SignalDetector>) {
        let signal = detector.signal_type();
        self.detectors.retain(|d| d.signal_type() != signal);
        self.detectors.push(detector);
        self.detectors.sort_by_key(|d| d.signal_type());
    }

    /// Signals covered by the bank, in stable order.
    pub fn signals(&self) -> Vec<SignalType> {
        self.detectors.iter().map(|d| d.signal_type()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector against one frame.
    ///
    /// Returns one entry per detector, in signal order; `None` where the
    /// detector saw nothing.
    pub fn detect_all(&self, frame: &Frame) -> Vec<(SignalType, Option<DetectionResult>)> {
        self.detectors
            .iter()
            .map(|detector| {
                let result = detector
                    .detect(frame, frame.timestamp_seconds)
                    .filter(|r| r.signal_type == detector.signal_type());
                (detector.signal_type(), result)
            })
            .collect()
    }
}
