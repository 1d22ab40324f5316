//! Integrity analysis worker binary.
//!
//! Runs one analysis from environment configuration:
//! - `PROCTOR_VIDEO_PATH` (required): recording to analyse
//! - `PROCTOR_SESSION_ID`: session identifier (random if unset)
//! - `PROCTOR_POSE_TELEMETRY`: JSON head-pose samples
//! - `PROCTOR_SCORE`: external interview score, 0.00-10.00
//! - `PROCTOR_YUNET_MODEL`: YuNet face model (default locations are searched)
//!
//! The resulting session snapshot is logged as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use proctor_media::IntegrityAnalyzer;
use proctor_models::{AnalysisStatus, InterviewScore, SessionId};
use proctor_worker::{
    build_detector_bank, load_pose_timeline, AnalysisCoordinator, InMemoryFlagStore, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting proctor-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker finished");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["proctor_worker=info", "proctor_media=info"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    let video_path: PathBuf = std::env::var("PROCTOR_VIDEO_PATH")
        .context("PROCTOR_VIDEO_PATH must point at the recording to analyse")?
        .into();
    let session = std::env::var("PROCTOR_SESSION_ID")
        .map(SessionId::from_string)
        .unwrap_or_default();
    let score = std::env::var("PROCTOR_SCORE")
        .ok()
        .map(|s| s.parse::<InterviewScore>())
        .transpose()
        .context("PROCTOR_SCORE is not a valid score")?;

    let telemetry = match std::env::var("PROCTOR_POSE_TELEMETRY") {
        Ok(path) => Some(
            load_pose_timeline(Path::new(&path))
                .await
                .with_context(|| format!("Failed to load head-pose telemetry from {}", path))?,
        ),
        Err(_) => None,
    };

    let bank = build_detector_bank(&config, telemetry)?;
    let analyzer = Arc::new(IntegrityAnalyzer::new(bank, config.analyzer_config()));
    let store = Arc::new(InMemoryFlagStore::new(config.policy));
    let coordinator = AnalysisCoordinator::new(config, store, analyzer);

    if let Some(score) = score {
        coordinator.record_score(&session, score).await?;
    }

    let outcome = coordinator.trigger(&session, video_path, false).await?;
    info!(session_id = %session, run_id = ?outcome.run_id(), "Analysis triggered");

    tokio::select! {
        _ = coordinator.wait(&session) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            coordinator.shutdown().await;
        }
    }

    let snapshot = coordinator.snapshot(&session).await?;
    info!(
        session_id = %session,
        snapshot = %serde_json::to_string(&snapshot)?,
        "Session analysis"
    );

    if snapshot.analysis.status != AnalysisStatus::Completed {
        anyhow::bail!(
            "analysis {}: {}",
            snapshot.analysis.status,
            snapshot.analysis.error_message.unwrap_or_default()
        );
    }
    Ok(())
}
