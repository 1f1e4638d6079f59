//! Pipeline configuration.
//!
//! All ambient state — storage target, data directories, channel list,
//! external job invocations — is assembled into one [`PipelineConfig`] at
//! startup and passed down into stage constructors. Stages never read the
//! process environment themselves.

use crate::errors::PipelineError;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether the pipeline runs against live sources or synthetic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Fetch from live channels into the production data tree.
    Live,
    /// Synthesize deterministic records into the isolated test tree.
    Test,
}

impl RunMode {
    /// Returns true for test mode.
    #[must_use]
    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }
}

/// Invocation of an opaque external job: a program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Program to invoke.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl JobSpec {
    /// Creates a new job spec.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Creates a job spec for a transformation tool subcommand pointed at a
    /// project directory and profile, e.g. `dbt run --project-dir X --profile Y`.
    #[must_use]
    pub fn tool_subcommand(
        program: impl Into<String>,
        subcommand: impl Into<String>,
        project_dir: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args: vec![
                subcommand.into(),
                "--project-dir".to_string(),
                project_dir.into(),
                "--profile".to_string(),
                profile.into(),
            ],
        }
    }
}

/// The pipeline's complete configuration, assembled once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Live or test mode.
    pub mode: RunMode,
    /// Calendar date partitioning this run's collector artifacts.
    pub run_date: NaiveDate,
    /// Root of the data tree.
    pub data_dir: PathBuf,
    /// Ordered list of channel handles to collect, each with a leading `@`.
    pub channels: Vec<String>,
    /// Per-channel record limit.
    pub fetch_limit: usize,
    /// Path of the SQLite storage target.
    pub database_path: PathBuf,
    /// Identifying name the storage target must report.
    pub expected_target: String,
    /// Base URL of the live channel feed service.
    pub fetch_base_url: String,
    /// Detection command; invoked with the image path appended.
    pub detector: JobSpec,
    /// Transformation job.
    pub transform_job: JobSpec,
    /// Verification job.
    pub verify_job: JobSpec,
}

impl PipelineConfig {
    /// Creates a configuration with per-mode defaults.
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        let (channels, fetch_limit, database_path, expected_target) = match mode {
            RunMode::Test => (
                vec![
                    "@mock_pharma".to_string(),
                    "@mock_food".to_string(),
                    "@mock_optics".to_string(),
                    "@mock_care".to_string(),
                    "@mock_labs".to_string(),
                ],
                1,
                PathBuf::from("data/channelmine_test.db"),
                "channelmine_test".to_string(),
            ),
            RunMode::Live => (
                Vec::new(),
                10_000,
                PathBuf::from("data/channelmine.db"),
                "channelmine".to_string(),
            ),
        };

        Self {
            mode,
            run_date: Utc::now().date_naive(),
            data_dir: PathBuf::from("data"),
            channels,
            fetch_limit,
            database_path,
            expected_target,
            fetch_base_url: "http://localhost:8900".to_string(),
            detector: JobSpec::new("channelmine-detect", Vec::new()),
            transform_job: JobSpec::tool_subcommand("dbt", "run", "transform", "channelmine"),
            verify_job: JobSpec::tool_subcommand("dbt", "test", "transform", "channelmine"),
        }
    }

    /// Creates a configuration with per-mode defaults, overlaid with any
    /// `CHANNELMINE_*` environment variables that are set.
    pub fn from_env(mode: RunMode) -> Result<Self, PipelineError> {
        let mut config = Self::new(mode);

        if let Ok(dir) = std::env::var("CHANNELMINE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        let db_var = if mode.is_test() {
            "CHANNELMINE_DB_TEST"
        } else {
            "CHANNELMINE_DB"
        };
        if let Ok(path) = std::env::var(db_var) {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(target) = std::env::var("CHANNELMINE_EXPECTED_TARGET") {
            config.expected_target = target;
        }
        if let Ok(channels) = std::env::var("CHANNELMINE_CHANNELS") {
            config.channels = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(limit) = std::env::var("CHANNELMINE_FETCH_LIMIT") {
            config.fetch_limit = limit
                .parse()
                .map_err(|_| PipelineError::config(format!("invalid fetch limit: {limit}")))?;
        }
        if let Ok(url) = std::env::var("CHANNELMINE_FETCH_URL") {
            config.fetch_base_url = url;
        }

        if config.channels.is_empty() {
            return Err(PipelineError::config(
                "no channels configured; set CHANNELMINE_CHANNELS",
            ));
        }

        Ok(config)
    }

    /// Sets the run date.
    #[must_use]
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    /// Sets the data directory root.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the channel list.
    #[must_use]
    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the storage target path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Sets the required storage target name.
    #[must_use]
    pub fn with_expected_target(mut self, name: impl Into<String>) -> Self {
        self.expected_target = name.into();
        self
    }

    /// Directory holding this run date's collector artifacts.
    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        let root = match self.mode {
            RunMode::Test => self.data_dir.join("test"),
            RunMode::Live => self.data_dir.join("raw").join("channel_messages"),
        };
        root.join(self.run_date.format("%Y-%m-%d").to_string())
    }

    /// Artifact path for one channel on this run date.
    #[must_use]
    pub fn artifact_path(&self, channel: &str) -> PathBuf {
        self.artifact_dir()
            .join(format!("{}.json", channel_stem(channel)))
    }

    /// Directory holding downloaded message images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        match self.mode {
            RunMode::Test => self.data_dir.join("test").join("images"),
            RunMode::Live => self.data_dir.join("images"),
        }
    }

    /// Path of the enrichment stage's output artifact.
    #[must_use]
    pub fn detections_path(&self) -> PathBuf {
        match self.mode {
            RunMode::Test => self.data_dir.join("test").join("image_detections.json"),
            RunMode::Live => self
                .data_dir
                .join("processed")
                .join("image_detections.json"),
        }
    }

    /// Expected local image path for a message id.
    #[must_use]
    pub fn image_path(&self, message_id: &str) -> PathBuf {
        self.images_dir().join(format!("{message_id}.jpg"))
    }
}

/// Strips the leading `@` from a channel handle.
#[must_use]
pub fn channel_stem(channel: &str) -> &str {
    channel.strip_prefix('@').unwrap_or(channel)
}

/// Builds the stable message id used to key images and detections.
#[must_use]
pub fn message_key(channel: &str, id: i64) -> String {
    format!("{}_{id}", channel_stem(channel))
}
