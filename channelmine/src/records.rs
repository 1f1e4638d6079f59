//! Record types flowing through the pipeline.
//!
//! A [`SourceRecord`] is one fetched message; a [`DetectionRecord`] is one
//! object found in a message's image. Both are created by exactly one stage,
//! consumed by exactly one successor, and never mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of media attached to a source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// No media attached.
    #[default]
    None,
    /// A photo; the collector downloads the binary alongside the record.
    Photo,
    /// A document; recorded but not downloaded.
    Document,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Photo => write!(f, "photo"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// One fetched message from a public channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Human-readable title of the origin channel.
    pub channel_title: String,
    /// Stable channel handle, including the leading `@`.
    pub channel_username: String,
    /// Stable numeric id of the message within its channel.
    pub id: i64,
    /// Free-text message body.
    pub text: String,
    /// When the message was posted.
    pub date: DateTime<Utc>,
    /// View count at fetch time.
    pub views: i64,
    /// Kind of attached media.
    pub media_type: MediaKind,
    /// Local path of the downloaded media, when one was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
}

impl SourceRecord {
    /// Returns true if this record references a stored image.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.media_type == MediaKind::Photo
    }
}

/// One detected object within one message's image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Id of the parent message, as `<channel-stem>_<message-id>`.
    pub message_id: String,
    /// Label assigned by the detection capability.
    pub detected_object: String,
    /// Confidence in `0.0..=1.0`, rounded to 4 decimal places.
    pub confidence_score: f64,
    /// Bounding box as `[x1, y1, x2, y2]`.
    pub bbox: [f64; 4],
}

impl DetectionRecord {
    /// Creates a detection record, rounding the confidence.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        detected_object: impl Into<String>,
        confidence_score: f64,
        bbox: [f64; 4],
    ) -> Self {
        Self {
            message_id: message_id.into(),
            detected_object: detected_object.into(),
            confidence_score: round_confidence(confidence_score),
            bbox,
        }
    }
}

/// Rounds a confidence score to 4 decimal places.
#[must_use]
pub fn round_confidence(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record(media_type: MediaKind) -> SourceRecord {
        SourceRecord {
            channel_title: "Mock Channel pharma".to_string(),
            channel_username: "@mock_pharma".to_string(),
            id: 1001,
            text: "This is a message".to_string(),
            date: Utc::now(),
            views: 10,
            media_type,
            media_path: None,
        }
    }

    #[test]
    fn test_media_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MediaKind::Photo).unwrap(),
            r#""photo""#
        );
        assert_eq!(serde_json::to_string(&MediaKind::None).unwrap(), r#""none""#);
    }

    #[test]
    fn test_has_image_only_for_photos() {
        assert!(sample_record(MediaKind::Photo).has_image());
        assert!(!sample_record(MediaKind::Document).has_image());
        assert!(!sample_record(MediaKind::None).has_image());
    }

    #[test]
    fn test_source_record_roundtrip() {
        let record = sample_record(MediaKind::Photo);
        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_media_path_omitted_when_absent() {
        let json = serde_json::to_string(&sample_record(MediaKind::None)).unwrap();
        assert!(!json.contains("media_path"));
    }

    #[test]
    fn test_detection_record_rounds_confidence() {
        let det = DetectionRecord::new("mock_pharma_1001", "bottle", 0.873_456_9, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(det.confidence_score, 0.8735);
    }

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.123_449), 0.1234);
        assert_eq!(round_confidence(0.123_45), 0.1235);
        assert_eq!(round_confidence(1.0), 1.0);
    }
}
