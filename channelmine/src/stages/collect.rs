//! Collector stage: fetches records per channel and persists one artifact
//! per channel per run date.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::fetch::ChannelFetcher;
use crate::records::SourceRecord;
use crate::stages::PipelineStage;
use crate::status::StatusToken;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Fetches each configured channel in list order and writes one JSON-array
/// artifact per channel.
///
/// A channel whose artifact already exists for the run date is skipped
/// without fetching; an existing day's artifact is never overwritten. One
/// channel's failure is logged and skipped. The stage only fails when every
/// channel that was actually attempted failed.
pub struct CollectorStage {
    config: PipelineConfig,
    fetcher: Arc<dyn ChannelFetcher>,
    events: Arc<dyn EventSink>,
}

impl CollectorStage {
    /// Creates a collector stage.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn ChannelFetcher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            events,
        }
    }

    async fn collect_channel(&self, channel: &str, path: &Path) -> Result<usize, PipelineError> {
        let records = self
            .fetcher
            .fetch(channel, self.config.fetch_limit)
            .await?;
        write_artifact(path, &records)?;
        Ok(records.len())
    }
}

/// Writes the artifact atomically: the file is either fully written or not
/// present at all.
fn write_artifact(path: &Path, records: &[SourceRecord]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl PipelineStage for CollectorStage {
    fn name(&self) -> &str {
        "collector"
    }

    async fn run(&self, _token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        let mut attempted = 0_usize;
        let mut failed = 0_usize;

        for channel in &self.config.channels {
            let path = self.config.artifact_path(channel);
            if path.exists() {
                self.events.emit(
                    "collector.skipped",
                    Some(serde_json::json!({
                        "channel": channel,
                        "path": path.display().to_string(),
                    })),
                );
                continue;
            }

            attempted += 1;
            let started = Instant::now();
            match self.collect_channel(channel, &path).await {
                Ok(count) => {
                    self.events.emit(
                        "collector.channel_collected",
                        Some(serde_json::json!({
                            "channel": channel,
                            "records": count,
                            "duration_ms": started.elapsed().as_secs_f64() * 1000.0,
                        })),
                    );
                }
                Err(err) => {
                    failed += 1;
                    self.events.emit(
                        "collector.channel_failed",
                        Some(serde_json::json!({
                            "channel": channel,
                            "error": err.to_string(),
                        })),
                    );
                }
            }
        }

        if attempted > 0 && failed == attempted {
            return Err(PipelineError::stage(
                self.name(),
                format!("all {attempted} attempted channels failed"),
            ));
        }
        Ok(StatusToken::new("collected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::events::CollectingEventSink;
    use crate::fetch::SyntheticFetcher;
    use pretty_assertions::assert_eq;

    struct FailingFetcher;

    #[async_trait]
    impl ChannelFetcher for FailingFetcher {
        async fn fetch(
            &self,
            channel: &str,
            _limit: usize,
        ) -> Result<Vec<SourceRecord>, PipelineError> {
            Err(PipelineError::stage(
                "fetch",
                format!("connection reset for {channel}"),
            ))
        }
    }

    /// Fails for one channel, synthesizes records for the rest.
    struct PartialFetcher {
        bad_channel: String,
        inner: SyntheticFetcher,
    }

    #[async_trait]
    impl ChannelFetcher for PartialFetcher {
        async fn fetch(
            &self,
            channel: &str,
            limit: usize,
        ) -> Result<Vec<SourceRecord>, PipelineError> {
            if channel == self.bad_channel {
                return Err(PipelineError::stage("fetch", "expired credentials"));
            }
            self.inner.fetch(channel, limit).await
        }
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::new(RunMode::Test).with_data_dir(dir)
    }

    #[tokio::test]
    async fn test_collector_writes_one_artifact_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let events = Arc::new(CollectingEventSink::new());
        let stage = CollectorStage::new(
            config.clone(),
            Arc::new(SyntheticFetcher::new()),
            events.clone(),
        );

        let token = stage.run(None).await.unwrap();
        assert_eq!(token.label(), "collected");

        for channel in &config.channels {
            let path = config.artifact_path(channel);
            assert!(path.exists(), "missing artifact for {channel}");
            let records: Vec<SourceRecord> =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(records.len(), 5);
        }
        assert_eq!(events.events_of_type("collector.channel_collected").len(), 5);
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_artifacts_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let events = Arc::new(CollectingEventSink::new());
        let stage = CollectorStage::new(
            config.clone(),
            Arc::new(SyntheticFetcher::new()),
            events.clone(),
        );

        stage.run(None).await.unwrap();
        let path = config.artifact_path(&config.channels[0]);
        let before = std::fs::read(&path).unwrap();

        events.clear();
        stage.run(None).await.unwrap();

        assert_eq!(events.events_of_type("collector.skipped").len(), 5);
        assert!(events.events_of_type("collector.channel_collected").is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_one_failing_channel_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let events = Arc::new(CollectingEventSink::new());
        let bad = config.channels[2].clone();
        let stage = CollectorStage::new(
            config.clone(),
            Arc::new(PartialFetcher {
                bad_channel: bad.clone(),
                inner: SyntheticFetcher::new(),
            }),
            events.clone(),
        );

        let token = stage.run(None).await.unwrap();
        assert_eq!(token.label(), "collected");
        assert!(!config.artifact_path(&bad).exists());
        assert_eq!(events.events_of_type("collector.channel_failed").len(), 1);
        assert_eq!(events.events_of_type("collector.channel_collected").len(), 4);
    }

    #[tokio::test]
    async fn test_all_channels_failing_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let stage = CollectorStage::new(
            config,
            Arc::new(FailingFetcher),
            Arc::new(CollectingEventSink::new()),
        );

        let err = stage.run(None).await.unwrap_err();
        assert!(err.to_string().contains("collector"));
    }

    #[tokio::test]
    async fn test_all_skipped_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let seed = CollectorStage::new(
            config.clone(),
            Arc::new(SyntheticFetcher::new()),
            Arc::new(CollectingEventSink::new()),
        );
        seed.run(None).await.unwrap();

        // With every artifact present, even a broken fetcher never runs.
        let stage = CollectorStage::new(
            config,
            Arc::new(FailingFetcher),
            Arc::new(CollectingEventSink::new()),
        );
        assert!(stage.run(None).await.is_ok());
    }
}
