//! Shared data models for the interview integrity pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Signal types and severity tiers
//! - Per-frame detection results
//! - Flag windows persisted per session
//! - Interview scores and the recommendation policy
//! - Session analysis status

pub mod detection;
pub mod error;
pub mod flag;
pub mod recommendation;
pub mod score;
pub mod session;
pub mod signal;

// Re-export common types
pub use detection::{DetectionResult, Metadata};
pub use error::{ModelError, ModelResult};
pub use flag::FlagWindow;
pub use recommendation::{decide, Recommendation, RecommendationPolicy};
pub use score::InterviewScore;
pub use session::{AnalysisStatus, AnalysisStatusRecord, RunId, SessionAnalysis, SessionId};
pub use signal::{Severity, SignalType};
