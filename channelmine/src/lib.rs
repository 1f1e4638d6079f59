//! # Channelmine
//!
//! A fixed-topology ingestion pipeline for public channel messages and
//! images:
//!
//! - **Collector**: fetches records per channel, one artifact per channel
//!   per run date, skipping channels already collected today
//! - **Primary loader**: bulk-inserts the day's artifacts into the primary
//!   relation, replacing prior contents
//! - **Enricher**: runs object detection over every referenced image
//! - **Enriched loader**: bulk-inserts detection records into the secondary
//!   relation, replacing prior contents
//! - **Transform / verification**: opaque external jobs
//!
//! An [`orchestrator::Orchestrator`] sequences the stages as an explicit
//! state machine, threading a [`status::StatusToken`] through each and
//! halting the run on the first stage failure. The environment guard
//! verifies the storage target before anything destructive runs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use channelmine::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new(RunMode::Test);
//! let events: Arc<dyn EventSink> = Arc::new(LoggingEventSink::default());
//! let orchestrator = Orchestrator::standard(
//!     &config,
//!     Arc::new(SyntheticFetcher::new()),
//!     Arc::new(CommandDetector::new(config.detector.clone())),
//!     Arc::new(CommandJob::new("transform", config.transform_job.clone())),
//!     Arc::new(CommandJob::new("verification", config.verify_job.clone())),
//!     events,
//! );
//! let report = orchestrator.run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod detect;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod guard;
pub mod jobs;
pub mod orchestrator;
pub mod queries;
pub mod records;
pub mod stages;
pub mod status;
pub mod storage;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{channel_stem, message_key, JobSpec, PipelineConfig, RunMode};
    pub use crate::detect::{CommandDetector, Detection, Detector, FixtureDetector};
    pub use crate::errors::PipelineError;
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::fetch::{ChannelFetcher, HttpChannelFetcher, SyntheticFetcher};
    pub use crate::guard::EnvironmentGuard;
    pub use crate::jobs::{CommandJob, ExternalJob, FixtureJob, JobOutcome};
    pub use crate::orchestrator::{Orchestrator, RunReport, StageReport};
    pub use crate::records::{DetectionRecord, MediaKind, SourceRecord};
    pub use crate::stages::{
        CollectorStage, EnrichedLoaderStage, EnrichmentStage, ExternalJobStage,
        GuardStage, PipelineStage, PrimaryLoaderStage,
    };
    pub use crate::status::{PipelineState, StatusToken};
    pub use crate::storage::Storage;
}
