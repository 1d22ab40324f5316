//! Media side of the interview integrity pipeline.
//!
//! This crate provides:
//! - FFprobe probing and FFmpeg frame decoding
//! - Fixed-rate frame sampling with position-derived timestamps
//! - Signal detectors (face count, phone-like object, head pose)
//! - Per-signal hysteresis tracking and severity classification
//! - [`IntegrityAnalyzer`], which runs all of the above over one recording

pub mod detection;
pub mod error;
pub mod integrity;
pub mod probe;
pub mod sampling;

pub use detection::{DetectorBank, SignalDetector};
pub use error::{MediaError, MediaResult};
pub use integrity::{AnalysisOutcome, AnalyzerConfig, IntegrityAnalyzer};
pub use probe::{probe_video, VideoInfo};
pub use sampling::{Frame, FrameSampler, FrameSource, SamplerConfig};
