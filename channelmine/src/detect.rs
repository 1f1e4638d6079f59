//! Object detection capability.
//!
//! The model itself is opaque: given an image path it yields labeled,
//! scored, localized objects. The command implementation shells out to a
//! configured detector program; the fixture implementation returns canned
//! results for tests.

use crate::config::JobSpec;
use crate::errors::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;

/// One object found in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Label assigned by the model.
    pub label: String,
    /// Confidence in `0.0..=1.0`, as reported by the model.
    pub confidence: f64,
    /// Bounding box as `[x1, y1, x2, y2]`.
    pub bbox: [f64; 4],
}

/// Capability: image in, detected objects out.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Runs detection against one image.
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, PipelineError>;
}

/// Detector that invokes an external command with the image path appended,
/// expecting a JSON array of detections on stdout.
pub struct CommandDetector {
    spec: JobSpec,
}

impl CommandDetector {
    /// Creates a command detector.
    #[must_use]
    pub fn new(spec: JobSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, PipelineError> {
        let output = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg(image)
            .output()
            .await?;
        if !output.status.success() {
            return Err(PipelineError::JobFailed {
                name: self.spec.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let detections = serde_json::from_slice(&output.stdout)?;
        Ok(detections)
    }
}

/// Detector returning a fixed result for every image. Testing aid.
#[derive(Debug, Clone, Default)]
pub struct FixtureDetector {
    detections: Vec<Detection>,
}

impl FixtureDetector {
    /// Creates a fixture detector that reports the given detections for
    /// every image.
    #[must_use]
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Creates a fixture detector that never detects anything.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Detector for FixtureDetector {
    async fn detect(&self, _image: &Path) -> Result<Vec<Detection>, PipelineError> {
        Ok(self.detections.clone())
    }
}
