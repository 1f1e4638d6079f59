//! Channel fetch capability.
//!
//! The collector stage is written against [`ChannelFetcher`]; the live
//! implementation talks HTTP to a feed service and downloads photo media,
//! while the synthetic implementation fabricates a small fixed batch of
//! deterministic records for test mode. The variant is selected once at
//! startup, never branched on inline.

use crate::config::{channel_stem, message_key};
use crate::errors::PipelineError;
use crate::records::{MediaKind, SourceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::PathBuf;

/// Capability: given a channel handle, returns a sequence of message
/// records, optionally downloading associated media to a local path.
#[async_trait]
pub trait ChannelFetcher: Send + Sync {
    /// Fetches up to `limit` records for the channel.
    async fn fetch(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, PipelineError>;
}

/// Wire shape of one message from the feed service.
#[derive(Debug, Deserialize)]
struct WireMessage {
    channel_title: String,
    id: i64,
    #[serde(default)]
    text: Option<String>,
    date: DateTime<Utc>,
    #[serde(default)]
    views: Option<i64>,
    #[serde(default)]
    media_type: MediaKind,
    #[serde(default)]
    media_url: Option<String>,
}

/// Live fetcher backed by an HTTP feed service.
pub struct HttpChannelFetcher {
    client: reqwest::Client,
    base_url: String,
    images_dir: PathBuf,
}

impl HttpChannelFetcher {
    /// Creates a live fetcher.
    #[must_use]
    pub fn new(base_url: impl Into<String>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            images_dir: images_dir.into(),
        }
    }

    async fn download_media(&self, url: &str, file_name: &str) -> Result<PathBuf, PipelineError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        std::fs::create_dir_all(&self.images_dir)?;
        let path = self.images_dir.join(file_name);
        std::fs::write(&path, &bytes)?;
        Ok(path)
    }
}

#[async_trait]
impl ChannelFetcher for HttpChannelFetcher {
    async fn fetch(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, PipelineError> {
        let url = format!(
            "{}/channels/{}/messages?limit={limit}",
            self.base_url,
            channel_stem(channel)
        );
        let wire: Vec<WireMessage> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut records = Vec::with_capacity(wire.len());
        for msg in wire {
            let mut record = SourceRecord {
                channel_title: msg.channel_title,
                channel_username: channel.to_string(),
                id: msg.id,
                text: msg.text.unwrap_or_default(),
                date: msg.date,
                views: msg.views.unwrap_or(0),
                media_type: msg.media_type,
                media_path: None,
            };
            if record.media_type == MediaKind::Photo {
                if let Some(media_url) = msg.media_url.as_deref() {
                    let file_name = format!("{}.jpg", message_key(channel, record.id));
                    let path = self.download_media(media_url, &file_name).await?;
                    record.media_path = Some(path.to_string_lossy().into_owned());
                }
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// Synthetic fetcher for test mode: no network I/O, a fixed batch of five
/// deterministic placeholder records per channel.
pub struct SyntheticFetcher {
    anchor: DateTime<Utc>,
}

impl SyntheticFetcher {
    /// Number of placeholder records fabricated per channel.
    pub const RECORDS_PER_CHANNEL: i64 = 5;

    /// Creates a synthetic fetcher anchored at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::anchored(Utc::now())
    }

    /// Creates a synthetic fetcher with a fixed time anchor, so repeated
    /// fetches produce identical records.
    #[must_use]
    pub fn anchored(anchor: DateTime<Utc>) -> Self {
        Self { anchor }
    }
}

impl Default for SyntheticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelFetcher for SyntheticFetcher {
    async fn fetch(
        &self,
        channel: &str,
        _limit: usize,
    ) -> Result<Vec<SourceRecord>, PipelineError> {
        let stem = channel_stem(channel);
        let mut records = Vec::with_capacity(Self::RECORDS_PER_CHANNEL as usize);
        for i in 1..=Self::RECORDS_PER_CHANNEL {
            let media_type = if i == 3 {
                MediaKind::Document
            } else if i % 2 == 1 {
                MediaKind::Photo
            } else {
                MediaKind::None
            };
            let media_path = (media_type == MediaKind::Photo)
                .then(|| format!("/mock/path/{stem}_{i}.jpg"));
            records.push(SourceRecord {
                channel_title: format!("Mock Channel {stem}"),
                channel_username: channel.to_string(),
                id: 1000 + i,
                text: format!("This is mock message #{i} from {channel}"),
                date: self.anchor - Duration::minutes(i * 5),
                views: i * 10,
                media_type,
                media_path,
            });
        }
        Ok(records)
    }
}
