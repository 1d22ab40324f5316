//! Worker configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use proctor_media::integrity::{FaceCountSeverity, SeverityTable, TrackerConfigTable};
use proctor_media::sampling::FfmpegSourceConfig;
use proctor_media::{AnalyzerConfig, SamplerConfig};
use proctor_models::{InterviewScore, RecommendationPolicy};

use crate::error::{WorkerError, WorkerResult};

/// Where the YuNet model is looked for when `PROCTOR_YUNET_MODEL` is unset.
pub const DEFAULT_YUNET_MODEL_PATHS: &[&str] = &[
    "models/face_detection_yunet_2023mar.onnx",
    "/app/models/face_detection_yunet_2023mar.onnx",
    "/app/models/face_detection/yunet/face_detection_yunet_2023mar.onnx",
    "/app/models/face_detection/yunet/face_detection_yunet_2023mar_int8.onnx",
];

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum analyses running at once
    pub max_concurrent_analyses: usize,
    /// Per-run timeout
    pub analysis_timeout: Duration,
    /// Sampled frames per second of video
    pub sample_rate: f64,
    /// Frame rate assumed when the video reports none
    pub default_fps: f64,
    /// Width frames are downscaled to before detection
    pub analysis_width: u32,
    /// Minimum sustained seconds before an extra face is flagged
    pub face_min_duration: f64,
    /// Grade extra-face flags by duration instead of always HIGH
    pub face_duration_tiers: Option<(f64, f64)>,
    /// YuNet ONNX model for the face-count detector
    pub yunet_model_path: Option<PathBuf>,
    pub policy: RecommendationPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: 2,
            analysis_timeout: Duration::from_secs(1800), // 30 minutes
            sample_rate: 2.0,
            default_fps: 30.0,
            analysis_width: 640,
            face_min_duration: 0.0,
            face_duration_tiers: None,
            yunet_model_path: None,
            policy: RecommendationPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup (environment, `.env` map, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            max_concurrent_analyses: parse_or(&lookup, "PROCTOR_MAX_CONCURRENT", defaults.max_concurrent_analyses),
            analysis_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PROCTOR_ANALYSIS_TIMEOUT_SECS",
                defaults.analysis_timeout.as_secs(),
            )),
            sample_rate: parse_or(&lookup, "PROCTOR_SAMPLE_RATE", defaults.sample_rate),
            default_fps: parse_or(&lookup, "PROCTOR_DEFAULT_FPS", defaults.default_fps),
            analysis_width: parse_or(&lookup, "PROCTOR_ANALYSIS_WIDTH", defaults.analysis_width),
            face_min_duration: parse_or(&lookup, "PROCTOR_FACE_MIN_DURATION", defaults.face_min_duration),
            face_duration_tiers: parse("PROCTOR_FACE_HIGH_AFTER")
                .zip(parse("PROCTOR_FACE_MODERATE_AFTER")),
            yunet_model_path: lookup("PROCTOR_YUNET_MODEL").map(PathBuf::from),
            policy: RecommendationPolicy {
                high_fail_threshold: parse_or(
                    &lookup,
                    "PROCTOR_HIGH_FAIL_THRESHOLD",
                    defaults.policy.high_fail_threshold,
                ),
                pass_threshold: parse_or(&lookup, "PROCTOR_PASS_THRESHOLD", defaults.policy.pass_threshold),
                moderate_pass_max: parse_or(
                    &lookup,
                    "PROCTOR_MODERATE_PASS_MAX",
                    defaults.policy.moderate_pass_max,
                ),
            },
        }
    }

    /// Check values that would make every run fail.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_analyses == 0 {
            return Err(WorkerError::config_error("PROCTOR_MAX_CONCURRENT must be at least 1"));
        }
        if self.analysis_timeout.is_zero() {
            return Err(WorkerError::config_error("PROCTOR_ANALYSIS_TIMEOUT_SECS must be positive"));
        }
        if self.analysis_width < 16 {
            return Err(WorkerError::config_error(format!(
                "PROCTOR_ANALYSIS_WIDTH too small: {}",
                self.analysis_width
            )));
        }
        if !self.face_min_duration.is_finite() || self.face_min_duration < 0.0 {
            return Err(WorkerError::config_error(format!(
                "PROCTOR_FACE_MIN_DURATION must be >= 0, got {}",
                self.face_min_duration
            )));
        }
        self.sampler_config().validate()?;
        self.check_face_detector()
    }

    /// YuNet model to load: the configured path if it exists, otherwise the
    /// first default location that does.
    pub fn face_model_path(&self) -> Option<PathBuf> {
        match &self.yunet_model_path {
            Some(path) => path.is_file().then(|| path.clone()),
            None => DEFAULT_YUNET_MODEL_PATHS
                .iter()
                .map(Path::new)
                .find(|p| p.is_file())
                .map(Path::to_path_buf),
        }
    }

    #[cfg(feature = "opencv")]
    fn check_face_detector(&self) -> WorkerResult<()> {
        if self.face_model_path().is_none() {
            return Err(WorkerError::config_error(match &self.yunet_model_path {
                Some(path) => format!("YuNet model not found at {}", path.display()),
                None => "YuNet model not found; set PROCTOR_YUNET_MODEL".to_string(),
            }));
        }
        Ok(())
    }

    #[cfg(not(feature = "opencv"))]
    fn check_face_detector(&self) -> WorkerResult<()> {
        Err(WorkerError::config_error(
            "worker built without the opencv feature: face-count and phone detectors unavailable",
        ))
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig::default()
            .with_target_rate(self.sample_rate)
            .with_default_fps(self.default_fps)
    }

    /// Analyzer settings derived from this config.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        let defaults = TrackerConfigTable::default();
        let trackers = TrackerConfigTable {
            face_count: defaults.face_count.with_min_duration(self.face_min_duration),
            ..defaults
        };

        let face_count = match self.face_duration_tiers {
            Some((high_after, moderate_after)) => FaceCountSeverity::DurationTiered {
                high_after,
                moderate_after,
            },
            None => FaceCountSeverity::AlwaysHigh,
        };

        AnalyzerConfig {
            sampler: self.sampler_config(),
            decoder: FfmpegSourceConfig {
                analysis_width: self.analysis_width,
            },
            trackers,
            severity: SeverityTable::default().with_face_count(face_count),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> WorkerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.max_concurrent_analyses, 2);
        assert_eq!(config.sample_rate, 2.0);
        assert_eq!(config.policy, RecommendationPolicy::default());
        assert_eq!(config.yunet_model_path, None);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_validate_requires_face_model() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let path = model.path().to_string_lossy().to_string();
        let config = config_from(&[("PROCTOR_YUNET_MODEL", path.as_str())]);
        assert_eq!(config.face_model_path().as_deref(), Some(model.path()));
        assert!(config.validate().is_ok());

        let missing = config_from(&[("PROCTOR_YUNET_MODEL", "/nonexistent/yunet.onnx")]);
        assert_eq!(missing.face_model_path(), None);
        let err = missing.validate().unwrap_err();
        assert!(err.to_string().contains("YuNet model not found"));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_validate_fails_without_detectors() {
        assert!(config_from(&[]).validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PROCTOR_MAX_CONCURRENT", "4"),
            ("PROCTOR_PASS_THRESHOLD", "7.50"),
            ("PROCTOR_FACE_MIN_DURATION", "1.5"),
            ("PROCTOR_FACE_HIGH_AFTER", "3"),
            ("PROCTOR_FACE_MODERATE_AFTER", "1"),
            ("PROCTOR_ANALYSIS_TIMEOUT_SECS", "60"),
        ]);
        assert_eq!(config.max_concurrent_analyses, 4);
        assert_eq!(config.policy.pass_threshold.hundredths(), 750);
        assert_eq!(config.analysis_timeout, Duration::from_secs(60));

        let analyzer = config.analyzer_config();
        assert_eq!(analyzer.trackers.face_count.min_duration, 1.5);
        assert_eq!(
            analyzer.severity.face_count,
            FaceCountSeverity::DurationTiered {
                high_after: 3.0,
                moderate_after: 1.0
            }
        );
    }

    #[test]
    fn test_invalid_values_fall_back_or_fail_validation() {
        let config = config_from(&[("PROCTOR_PASS_THRESHOLD", "eleven"), ("PROCTOR_SAMPLE_RATE", "0")]);
        assert_eq!(config.policy.pass_threshold, RecommendationPolicy::default().pass_threshold);
        assert!(config.validate().is_err());

        assert!(config_from(&[("PROCTOR_MAX_CONCURRENT", "0")]).validate().is_err());
    }
}
