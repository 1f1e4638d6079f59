//! Enrichment stage: runs detection over every stored image referenced by
//! the primary relation.

use crate::config::{message_key, PipelineConfig};
use crate::detect::Detector;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::records::DetectionRecord;
use crate::stages::PipelineStage;
use crate::status::StatusToken;
use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::Arc;

/// Queries the primary relation for records with images, runs the detection
/// capability against each image, and writes all detection records as one
/// artifact.
///
/// A missing image or a failed detection is logged and skipped. When no
/// detections are produced at all, no output file is written: downstream
/// treats an absent artifact exactly like zero detections.
pub struct EnrichmentStage {
    config: PipelineConfig,
    detector: Arc<dyn Detector>,
    events: Arc<dyn EventSink>,
}

impl EnrichmentStage {
    /// Creates an enrichment stage.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        detector: Arc<dyn Detector>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            detector,
            events,
        }
    }
}

#[async_trait]
impl PipelineStage for EnrichmentStage {
    fn name(&self) -> &str {
        "enricher"
    }

    async fn run(&self, _token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        let storage = Storage::open(&self.config.database_path)?;
        let photos = storage.photo_messages()?;

        let mut results: Vec<DetectionRecord> = Vec::new();
        for (channel, id) in &photos {
            let key = message_key(channel, *id);
            let image = self.config.image_path(&key);
            if !image.exists() {
                self.events.emit(
                    "enricher.missing_image",
                    Some(serde_json::json!({ "path": image.display().to_string() })),
                );
                continue;
            }
            match self.detector.detect(&image).await {
                Ok(detections) => {
                    for det in detections {
                        results.push(DetectionRecord::new(
                            &key,
                            det.label,
                            det.confidence,
                            det.bbox,
                        ));
                    }
                }
                Err(err) => {
                    self.events.emit(
                        "enricher.detection_failed",
                        Some(serde_json::json!({
                            "message_id": key,
                            "error": err.to_string(),
                        })),
                    );
                }
            }
        }

        self.events.emit(
            "enricher.processed",
            Some(serde_json::json!({
                "images": photos.len(),
                "detections": results.len(),
            })),
        );

        if results.is_empty() {
            self.events.emit("enricher.no_detections", None);
            return Ok(StatusToken::new("enriched"));
        }

        let path = self.config.detections_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(&results)?)?;
        self.events.emit(
            "enricher.saved",
            Some(serde_json::json!({
                "detections": results.len(),
                "path": path.display().to_string(),
            })),
        );
        Ok(StatusToken::new("enriched"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::detect::{Detection, FixtureDetector};
    use crate::events::CollectingEventSink;
    use crate::records::{MediaKind, SourceRecord};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn record(channel: &str, id: i64, media_type: MediaKind) -> SourceRecord {
        SourceRecord {
            channel_title: channel.to_string(),
            channel_username: format!("@{channel}"),
            id,
            text: String::new(),
            date: Utc::now(),
            views: 0,
            media_type,
            media_path: None,
        }
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::new(RunMode::Test)
            .with_data_dir(dir)
            .with_database_path(dir.join("channelmine_test.db"))
    }

    fn seed_messages(config: &PipelineConfig, records: &[SourceRecord]) {
        let storage = Storage::open(&config.database_path).unwrap();
        storage.replace_messages_table().unwrap();
        storage.insert_messages(records).unwrap();
    }

    fn seed_image(config: &PipelineConfig, key: &str) {
        let path = config.image_path(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"jpeg-bytes").unwrap();
    }

    fn sample_detection() -> Detection {
        Detection {
            label: "bottle".to_string(),
            confidence: 0.912_345,
            bbox: [5.0, 5.0, 50.0, 80.0],
        }
    }

    #[tokio::test]
    async fn test_detections_keyed_by_queried_ids_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_messages(
            &config,
            &[
                record("pharma", 1, MediaKind::Photo),
                record("pharma", 2, MediaKind::Document),
                record("food", 3, MediaKind::Photo),
            ],
        );
        seed_image(&config, "pharma_1");
        seed_image(&config, "food_3");
        // An unrelated image on disk must never produce a record.
        seed_image(&config, "stray_99");

        let stage = EnrichmentStage::new(
            config.clone(),
            Arc::new(FixtureDetector::new(vec![sample_detection()])),
            Arc::new(CollectingEventSink::new()),
        );
        stage.run(None).await.unwrap();

        let written: Vec<DetectionRecord> = serde_json::from_str(
            &std::fs::read_to_string(config.detections_path()).unwrap(),
        )
        .unwrap();
        let ids: Vec<&str> = written.iter().map(|d| d.message_id.as_str()).collect();
        assert_eq!(ids, vec!["pharma_1", "food_3"]);
        assert_eq!(written[0].confidence_score, 0.9123);
    }

    #[tokio::test]
    async fn test_missing_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_messages(
            &config,
            &[
                record("pharma", 1, MediaKind::Photo),
                record("food", 2, MediaKind::Photo),
            ],
        );
        seed_image(&config, "food_2");

        let events = Arc::new(CollectingEventSink::new());
        let stage = EnrichmentStage::new(
            config.clone(),
            Arc::new(FixtureDetector::new(vec![sample_detection()])),
            events.clone(),
        );
        stage.run(None).await.unwrap();

        assert_eq!(events.events_of_type("enricher.missing_image").len(), 1);
        let written: Vec<DetectionRecord> = serde_json::from_str(
            &std::fs::read_to_string(config.detections_path()).unwrap(),
        )
        .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].message_id, "food_2");
    }

    #[tokio::test]
    async fn test_zero_detections_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_messages(&config, &[record("pharma", 1, MediaKind::Photo)]);
        seed_image(&config, "pharma_1");

        let events = Arc::new(CollectingEventSink::new());
        let stage = EnrichmentStage::new(
            config.clone(),
            Arc::new(FixtureDetector::empty()),
            events.clone(),
        );
        let token = stage.run(None).await.unwrap();

        assert_eq!(token.label(), "enriched");
        assert!(!config.detections_path().exists());
        assert_eq!(events.events_of_type("enricher.no_detections").len(), 1);
    }

    #[tokio::test]
    async fn test_detection_failure_is_skipped() {
        struct BrokenDetector;

        #[async_trait]
        impl Detector for BrokenDetector {
            async fn detect(&self, _image: &Path) -> Result<Vec<Detection>, PipelineError> {
                Err(PipelineError::stage("detector", "model crashed"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_messages(&config, &[record("pharma", 1, MediaKind::Photo)]);
        seed_image(&config, "pharma_1");

        let events = Arc::new(CollectingEventSink::new());
        let stage = EnrichmentStage::new(config.clone(), Arc::new(BrokenDetector), events.clone());
        let token = stage.run(None).await.unwrap();

        assert_eq!(token.label(), "enriched");
        assert_eq!(events.events_of_type("enricher.detection_failed").len(), 1);
        assert!(!config.detections_path().exists());
    }
}
