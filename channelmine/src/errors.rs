//! Error types for the channelmine pipeline.
//!
//! The taxonomy separates fatal errors, which abort the whole run, from
//! recoverable per-item failures, which are logged and swallowed inside the
//! stage that observed them and never cross a stage boundary.

use thiserror::Error;

/// The main error type for pipeline operations.
///
/// Every variant here is fatal to the enclosing stage: the orchestrator
/// transitions to its failed state on the first one it sees. Per-item
/// failures (one channel, one artifact, one image) are not represented
/// here — stages report those through the event sink and continue.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The storage connection resolved to a target other than the expected
    /// isolated one. Raised by the environment guard before any
    /// destructive stage runs.
    #[error("wrong storage target: connected to '{actual}', expected '{expected}'")]
    WrongTarget {
        /// The target name required by configuration.
        expected: String,
        /// The target name the connection actually reported.
        actual: String,
    },

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stage failed with a captured diagnostic message.
    #[error("stage '{stage}' failed: {message}")]
    Stage {
        /// The stage that failed.
        stage: String,
        /// The underlying diagnostic text.
        message: String,
    },

    /// An external job exited with a failure signal.
    #[error("external job '{name}' failed: {stderr}")]
    JobFailed {
        /// The job name.
        name: String,
        /// The job's captured error output.
        stderr: String,
    },

    /// An HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Creates a stage failure error.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
