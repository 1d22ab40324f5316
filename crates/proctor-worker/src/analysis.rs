//! Wiring between the worker and the media analyzer.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use proctor_media::detection::{HeadPoseDetector, HeadPoseSample, PoseTimeline};
use proctor_media::{AnalysisOutcome, DetectorBank, IntegrityAnalyzer, MediaResult};
use proctor_models::SessionId;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Runs the detection pipeline over one session's recording.
#[async_trait]
pub trait SessionAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        session: &SessionId,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome>;
}

#[async_trait]
impl SessionAnalyzer for IntegrityAnalyzer {
    async fn analyze(
        &self,
        _session: &SessionId,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<AnalysisOutcome> {
        self.analyze_file(video_path, cancel).await
    }
}

/// Load head-pose telemetry from a JSON array of samples.
pub async fn load_pose_timeline(path: &Path) -> WorkerResult<PoseTimeline> {
    let bytes = tokio::fs::read(path).await?;
    let samples: Vec<HeadPoseSample> = serde_json::from_slice(&bytes)?;
    Ok(PoseTimeline::new(samples))
}

/// Build the detector bank the worker runs.
///
/// Face count and the phone heuristic always run and need the `opencv`
/// feature plus a YuNet model. Head pose runs when telemetry is available.
pub fn build_detector_bank(config: &WorkerConfig, telemetry: Option<PoseTimeline>) -> WorkerResult<DetectorBank> {
    let mut bank = DetectorBank::new();
    add_frame_detectors(&mut bank, config)?;
    add_pose_detector(&mut bank, telemetry);
    Ok(bank)
}

fn add_pose_detector(bank: &mut DetectorBank, telemetry: Option<PoseTimeline>) {
    match telemetry {
        Some(timeline) if !timeline.is_empty() => {
            info!(samples = timeline.len(), "Head-pose telemetry loaded");
            bank.push(Box::new(HeadPoseDetector::new(timeline)));
        }
        _ => info!("No head-pose telemetry, head-pose detector disabled"),
    }
}

#[cfg(feature = "opencv")]
fn add_frame_detectors(bank: &mut DetectorBank, config: &WorkerConfig) -> WorkerResult<()> {
    use proctor_media::detection::{FaceCountDetector, PhoneObjectDetector, YuNetFaceLocator};
    use proctor_media::sampling::analysis_dimensions;

    let model = config
        .face_model_path()
        .ok_or_else(|| WorkerError::config_error("YuNet model not found; set PROCTOR_YUNET_MODEL"))?;
    // The locator adapts its input size per frame; start at the common 16:9 size.
    let (width, height) = analysis_dimensions(1280, 720, config.analysis_width);
    let locator = YuNetFaceLocator::new(&model, width, height)?;

    bank.push(Box::new(FaceCountDetector::new(locator)));
    bank.push(Box::new(PhoneObjectDetector::default()));
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn add_frame_detectors(_bank: &mut DetectorBank, _config: &WorkerConfig) -> WorkerResult<()> {
    Err(WorkerError::config_error(
        "worker built without the opencv feature: face-count and phone detectors unavailable",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_models::SignalType;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_pose_timeline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"timestamp_seconds": 1.0, "yaw": 40.0, "pitch": 0.0}},
                {{"timestamp_seconds": 0.5, "yaw": 0.0, "pitch": 2.0}}]"#
        )
        .unwrap();

        let timeline = load_pose_timeline(file.path()).await.unwrap();
        assert_eq!(timeline.len(), 2);
    }

    #[tokio::test]
    async fn test_load_pose_timeline_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_pose_timeline(file.path()).await.is_err());
    }

    #[test]
    fn test_pose_detector_needs_telemetry() {
        let mut bank = DetectorBank::new();
        add_pose_detector(&mut bank, None);
        add_pose_detector(&mut bank, Some(PoseTimeline::new(Vec::new())));
        assert!(bank.is_empty());

        let timeline = PoseTimeline::new(vec![HeadPoseSample::new(0.0, 0.0, 0.0)]);
        add_pose_detector(&mut bank, Some(timeline));
        assert_eq!(bank.signals(), vec![SignalType::HeadPose]);
    }

    #[test]
    fn test_bank_fails_without_face_model() {
        let config = WorkerConfig {
            yunet_model_path: Some("/nonexistent/yunet.onnx".into()),
            ..WorkerConfig::default()
        };
        assert!(matches!(
            build_detector_bank(&config, None),
            Err(WorkerError::ConfigError(_))
        ));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_bank_rejects_truncated_model() {
        let mut model = tempfile::NamedTempFile::new().unwrap();
        write!(model, "not an onnx model").unwrap();
        let config = WorkerConfig {
            yunet_model_path: Some(model.path().to_path_buf()),
            ..WorkerConfig::default()
        };
        assert!(matches!(
            build_detector_bank(&config, None),
            Err(WorkerError::Media(_))
        ));
    }
}
