//! Extra-person detection by counting distinct faces.

use proctor_models::{DetectionResult, SignalType};
use tracing::debug;

use super::{FaceBox, SignalDetector};
use crate::error::MediaResult;
use crate::sampling::Frame;

/// Boxes overlapping more than this are treated as the same face.
const MERGE_IOU: f64 = 0.5;

/// Locates faces in a frame.
#[cfg_attr(test, mockall::automock)]
pub trait FaceLocator: Send + Sync {
    fn locate(&self, frame: &Frame) -> MediaResult<Vec<FaceBox>>;

    fn name(&self) -> &'static str;
}

/// Merge boxes that overlap above the IoU threshold, highest score first.
pub fn merge_overlapping(mut faces: Vec<FaceBox>) -> Vec<FaceBox> {
    faces.retain(|f| f.bbox.width > 0.0 && f.bbox.height > 0.0);
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut merged: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if let Some(existing) = merged.iter_mut().find(|m| m.bbox.iou(&face.bbox) > MERGE_IOU) {
            existing.bbox = existing.bbox.union(&face.bbox);
        } else {
            merged.push(face);
        }
    }
    merged
}

/// Reports a violation whenever more than one distinct face is visible.
pub struct FaceCountDetector<L: FaceLocator> {
    locator: L,
}

impl<L: FaceLocator> FaceCountDetector<L> {
    pub fn new(locator: L) -> Self {
        Self { locator }
    }
}

impl<L: FaceLocator> SignalDetector for FaceCountDetector<L> {
    fn signal_type(&self) -> SignalType {
        SignalType::FaceCount
    }

    fn name(&self) -> &'static str {
        "face_count"
    }

    fn detect(&self, frame: &Frame, timestamp: f64) -> Option<DetectionResult> {
        if frame.is_empty() {
            return None;
        }

        let faces = match self.locator.locate(frame) {
            Ok(faces) => merge_overlapping(faces),
            Err(e) => {
                debug!(
                    locator = self.locator.name(),
                    frame = frame.index,
                    error = %e,
                    "Face locator failed, skipping frame"
                );
                return None;
            }
        };

        if faces.len() <= 1 {
            return None;
        }

        let boxes: Vec<serde_json::Value> = faces.iter().map(|f| f.bbox.to_json()).collect();
        Some(
            DetectionResult::new(SignalType::FaceCount, 1.0, timestamp)
                .with_meta("face_count", faces.len())
                .with_meta("locator", self.locator.name())
                .with_meta("faces", boxes),
        )
    }
}
