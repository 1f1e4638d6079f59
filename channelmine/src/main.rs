//! Pipeline entry point.
//!
//! Invoked once per day by an external scheduler; `--test` selects the
//! isolated test target and the synthetic fetcher.

use anyhow::Result;
use channelmine::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let test_mode = std::env::args().skip(1).any(|arg| arg == "--test");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = if test_mode { RunMode::Test } else { RunMode::Live };
    let config = PipelineConfig::from_env(mode)?;

    let events: Arc<dyn EventSink> = Arc::new(LoggingEventSink::default());
    let fetcher: Arc<dyn ChannelFetcher> = if mode.is_test() {
        Arc::new(SyntheticFetcher::new())
    } else {
        Arc::new(HttpChannelFetcher::new(
            config.fetch_base_url.clone(),
            config.images_dir(),
        ))
    };
    let detector = Arc::new(CommandDetector::new(config.detector.clone()));
    let transform = Arc::new(CommandJob::new("transform", config.transform_job.clone()));
    let verify = Arc::new(CommandJob::new("verification", config.verify_job.clone()));

    let orchestrator =
        Orchestrator::standard(&config, fetcher, detector, transform, verify, events);
    let report = orchestrator.run().await;

    tracing::info!(
        run_id = %report.run_id,
        state = %report.final_state,
        stages = report.stages.len(),
        "pipeline finished"
    );
    if let Some(error) = &report.error {
        tracing::error!(%error, "pipeline failed");
        std::process::exit(1);
    }
    Ok(())
}
