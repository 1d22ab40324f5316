//! OpenCV YuNet face locator.
//!
//! Wraps `FaceDetectorYN`. The detector is stateful (`detect` takes `&mut`),
//! so it sits behind a mutex and the locator can be shared across the
//! blocking pool.

use opencv::core::{Mat, Ptr, Size};
use opencv::objdetect::FaceDetectorYN;
use opencv::prelude::{FaceDetectorYNTrait, MatTraitConst};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::cv::frame_to_bgr;
use super::face_count::FaceLocator;
use super::{BoundingBox, FaceBox};
use crate::error::{MediaError, MediaResult};
use crate::sampling::Frame;

const SCORE_THRESHOLD: f32 = 0.6;
const NMS_THRESHOLD: f32 = 0.3;
const TOP_K: i32 = 10;

/// Files smaller than this are truncated downloads, not models.
const MIN_MODEL_BYTES: u64 = 50_000;

struct YuNetState {
    detector: Ptr<FaceDetectorYN>,
    input_size: (i32, i32),
}

/// Face locator backed by the YuNet ONNX model.
pub struct YuNetFaceLocator {
    state: Mutex<YuNetState>,
    model_path: String,
}

impl YuNetFaceLocator {
    /// Load the model for frames of the given analysis size.
    pub fn new(model_path: impl AsRef<Path>, frame_width: u32, frame_height: u32) -> MediaResult<Self> {
        let model_path = model_path.as_ref();
        let metadata = std::fs::metadata(model_path)
            .map_err(|_| MediaError::model_not_found(model_path.display().to_string()))?;
        if metadata.len() < MIN_MODEL_BYTES {
            return Err(MediaError::detection_failed(format!(
                "YuNet model file appears corrupted ({} bytes)",
                metadata.len()
            )));
        }

        let path_str = model_path.to_string_lossy().to_string();
        let input_size = (frame_width as i32, frame_height as i32);
        let detector = Self::create_detector(&path_str, input_size)?;

        info!(
            model = %path_str,
            input_size = format!("{}x{}", input_size.0, input_size.1),
            "YuNet face locator initialized"
        );

        Ok(Self {
            state: Mutex::new(YuNetState {
                detector,
                input_size,
            }),
            model_path: path_str,
        })
    }

    fn create_detector(model_path: &str, input_size: (i32, i32)) -> MediaResult<Ptr<FaceDetectorYN>> {
        use opencv::dnn::{DNN_BACKEND_DEFAULT, DNN_BACKEND_OPENCV, DNN_TARGET_CPU};

        let mut last_error = String::new();
        for (backend_id, target_id, backend_name) in [
            (DNN_BACKEND_DEFAULT, DNN_TARGET_CPU, "default"),
            (DNN_BACKEND_OPENCV, DNN_TARGET_CPU, "opencv"),
        ] {
            match FaceDetectorYN::create(
                model_path,
                "",
                Size::new(input_size.0, input_size.1),
                SCORE_THRESHOLD,
                NMS_THRESHOLD,
                TOP_K,
                backend_id,
                target_id,
            ) {
                Ok(detector) => {
                    debug!(backend = backend_name, "YuNet created");
                    return Ok(detector);
                }
                Err(e) => {
                    warn!(backend = backend_name, error = %e, "YuNet backend failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(MediaError::detection_failed(format!(
            "Failed to create YuNet detector with any backend: {}",
            last_error
        )))
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }
}

impl FaceLocator for YuNetFaceLocator {
    fn locate(&self, frame: &Frame) -> MediaResult<Vec<FaceBox>> {
        let mat = frame_to_bgr(frame)?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| MediaError::internal("YuNet detector lock poisoned"))?;

        let size = (frame.width() as i32, frame.height() as i32);
        if state.input_size != size {
            state
                .detector
                .set_input_size(Size::new(size.0, size.1))
                .map_err(|e| MediaError::detection_failed(e.to_string()))?;
            state.input_size = size;
        }

        let mut faces = Mat::default();
        state
            .detector
            .detect(&mat, &mut faces)
            .map_err(|e| MediaError::detection_failed(format!("YuNet detection failed: {}", e)))?;

        // Row layout: x, y, w, h, 5 landmark pairs, score
        if faces.rows() > 0 && faces.cols() < 15 {
            return Err(MediaError::detection_failed(format!(
                "Unexpected YuNet output: {} columns",
                faces.cols()
            )));
        }

        let (fw, fh) = (size.0 as f64, size.1 as f64);
        let mut out = Vec::with_capacity(faces.rows().max(0) as usize);
        for i in 0..faces.rows() {
            let value = |col: i32| faces.at_2d::<f32>(i, col).map(|v| *v as f64).ok();
            let (Some(x), Some(y), Some(w), Some(h), Some(score)) =
                (value(0), value(1), value(2), value(3), value(14))
            else {
                continue;
            };

            let x0 = x.max(0.0);
            let y0 = y.max(0.0);
            let w = (x + w).min(fw) - x0;
            let h = (y + h).min(fh) - y0;
            if w > 0.0 && h > 0.0 {
                out.push(FaceBox::new(BoundingBox::new(x0, y0, w, h), score));
            }
        }

        Ok(out)
    }

    fn name(&self) -> &'static str {
        "yunet"
    }
}
