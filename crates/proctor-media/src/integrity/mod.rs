//! Turning per-frame detections into debounced, graded flags.

mod classifier;
mod config;
mod pipeline;
mod tracker;

pub use classifier::{classify, FaceCountSeverity, SeverityTable};
pub use config::{TrackerConfig, TrackerConfigTable};
pub use pipeline::{AnalysisOutcome, AnalyzerConfig, IntegrityAnalyzer};
pub use tracker::FlagTracker;
