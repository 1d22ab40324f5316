//! Background integrity analysis for interview sessions.
//!
//! This crate provides:
//! - Environment-driven worker configuration
//! - The [`FlagStore`] persistence seam and an in-memory implementation
//! - [`AnalysisCoordinator`]: one cancellable background run per session,
//!   idempotent triggering and guarded commits
//! - Score recording and recommendation recompute

pub mod analysis;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod store;

pub use analysis::{build_detector_bank, load_pose_timeline, SessionAnalyzer};
pub use config::WorkerConfig;
pub use coordinator::{AnalysisCoordinator, TriggerOutcome};
pub use error::{StoreError, StoreResult, WorkerError, WorkerResult};
pub use logging::AnalysisLogger;
pub use store::{FlagStore, InMemoryFlagStore};
