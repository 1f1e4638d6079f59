//! Primary loader stage: bulk-inserts collected artifacts into the primary
//! relation.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::records::SourceRecord;
use crate::stages::PipelineStage;
use crate::status::StatusToken;
use crate::storage::Storage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drops and recreates the primary relation, then loads every artifact the
/// collector wrote for the current run date.
///
/// A parse or insert failure for one artifact is logged and that artifact
/// is skipped; a storage connection failure is fatal.
pub struct PrimaryLoaderStage {
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
}

impl PrimaryLoaderStage {
    /// Creates a primary loader stage.
    #[must_use]
    pub fn new(config: PipelineConfig, events: Arc<dyn EventSink>) -> Self {
        Self { config, events }
    }
}

fn artifact_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_artifact(storage: &Storage, path: &Path) -> Result<usize, PipelineError> {
    let text = std::fs::read_to_string(path)?;
    let records: Vec<SourceRecord> = serde_json::from_str(&text)?;
    storage.insert_messages(&records)
}

#[async_trait]
impl PipelineStage for PrimaryLoaderStage {
    fn name(&self) -> &str {
        "primary_loader"
    }

    async fn run(&self, token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        self.events.emit(
            "loader.started",
            Some(serde_json::json!({
                "after": token.map(StatusToken::label),
            })),
        );

        let storage = Storage::open(&self.config.database_path)?;
        storage.replace_messages_table()?;

        let dir = self.config.artifact_dir();
        let files = if dir.is_dir() {
            artifact_files(&dir)?
        } else {
            self.events.emit(
                "loader.no_artifacts",
                Some(serde_json::json!({ "dir": dir.display().to_string() })),
            );
            Vec::new()
        };

        let mut total = 0_usize;
        for path in &files {
            match load_artifact(&storage, path) {
                Ok(count) => total += count,
                Err(err) => {
                    self.events.emit(
                        "loader.artifact_failed",
                        Some(serde_json::json!({
                            "path": path.display().to_string(),
                            "error": err.to_string(),
                        })),
                    );
                }
            }
        }

        self.events.emit(
            "loader.completed",
            Some(serde_json::json!({
                "artifacts": files.len(),
                "rows": total,
            })),
        );
        Ok(StatusToken::new("loaded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::events::CollectingEventSink;
    use crate::fetch::SyntheticFetcher;
    use crate::stages::CollectorStage;
    use pretty_assertions::assert_eq;

    async fn collect_into(config: &PipelineConfig) {
        let stage = CollectorStage::new(
            config.clone(),
            Arc::new(SyntheticFetcher::new()),
            Arc::new(CollectingEventSink::new()),
        );
        stage.run(None).await.unwrap();
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::new(RunMode::Test)
            .with_data_dir(dir)
            .with_database_path(dir.join("channelmine_test.db"))
    }

    #[tokio::test]
    async fn test_loads_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        collect_into(&config).await;

        let stage = PrimaryLoaderStage::new(config.clone(), Arc::new(CollectingEventSink::new()));
        let token = stage.run(None).await.unwrap();
        assert_eq!(token.label(), "loaded");

        let storage = Storage::open(&config.database_path).unwrap();
        assert_eq!(storage.message_count().unwrap(), 25);
    }

    #[tokio::test]
    async fn test_rerun_replaces_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        collect_into(&config).await;

        let stage = PrimaryLoaderStage::new(config.clone(), Arc::new(CollectingEventSink::new()));
        stage.run(None).await.unwrap();
        stage.run(None).await.unwrap();

        let storage = Storage::open(&config.database_path).unwrap();
        assert_eq!(storage.message_count().unwrap(), 25);
    }

    #[tokio::test]
    async fn test_bad_artifact_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        collect_into(&config).await;
        std::fs::write(config.artifact_path(&config.channels[0]), "not json").unwrap();

        let events = Arc::new(CollectingEventSink::new());
        let stage = PrimaryLoaderStage::new(config.clone(), events.clone());
        stage.run(None).await.unwrap();

        assert_eq!(events.events_of_type("loader.artifact_failed").len(), 1);
        let storage = Storage::open(&config.database_path).unwrap();
        assert_eq!(storage.message_count().unwrap(), 20);
    }

    #[tokio::test]
    async fn test_missing_artifact_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let events = Arc::new(CollectingEventSink::new());
        let stage = PrimaryLoaderStage::new(config.clone(), events.clone());
        stage.run(None).await.unwrap();

        assert_eq!(events.events_of_type("loader.no_artifacts").len(), 1);
        let storage = Storage::open(&config.database_path).unwrap();
        assert_eq!(storage.message_count().unwrap(), 0);
    }
}
