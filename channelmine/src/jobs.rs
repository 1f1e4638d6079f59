//! Opaque external job contract.
//!
//! Transform and verification are invocations of jobs the pipeline knows
//! nothing about beyond a name and an exit signal. The outcome is a tagged
//! success/failure variant carrying captured diagnostic text.

use crate::config::JobSpec;
use async_trait::async_trait;
use tokio::process::Command;

/// Result of running an external job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job exited with a success signal.
    Success {
        /// Captured standard output.
        stdout: String,
    },
    /// The job exited with a failure signal, or could not be launched.
    Failure {
        /// Captured error output, or the launch error.
        stderr: String,
    },
}

impl JobOutcome {
    /// Returns true for a success outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the captured diagnostic text for either variant.
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Success { stdout } => stdout,
            Self::Failure { stderr } => stderr,
        }
    }
}

/// Capability: run an opaque job to completion and report its outcome.
#[async_trait]
pub trait ExternalJob: Send + Sync {
    /// The job's name, used in stage failure messages.
    fn name(&self) -> &str;

    /// Runs the job to completion. Never returns an error: launch failures
    /// and non-zero exits both surface as [`JobOutcome::Failure`].
    async fn run(&self) -> JobOutcome;
}

/// External job backed by a subprocess, waited on synchronously with
/// captured output.
pub struct CommandJob {
    name: String,
    spec: JobSpec,
}

impl CommandJob {
    /// Creates a command job.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

#[async_trait]
impl ExternalJob for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> JobOutcome {
        let output = match Command::new(&self.spec.program)
            .args(&self.spec.args)
            .output()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                return JobOutcome::Failure {
                    stderr: format!("failed to launch '{}': {err}", self.spec.program),
                }
            }
        };

        if output.status.success() {
            JobOutcome::Success {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            }
        } else {
            JobOutcome::Failure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
    }
}

/// Job returning a fixed outcome. Testing aid.
pub struct FixtureJob {
    name: String,
    outcome: JobOutcome,
}

impl FixtureJob {
    /// Creates a job that always succeeds.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: JobOutcome::Success {
                stdout: String::new(),
            },
        }
    }

    /// Creates a job that always fails with the given diagnostic.
    #[must_use]
    pub fn failing(name: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: JobOutcome::Failure {
                stderr: stderr.into(),
            },
        }
    }
}

#[async_trait]
impl ExternalJob for FixtureJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> JobOutcome {
        self.outcome.clone()
    }
}
