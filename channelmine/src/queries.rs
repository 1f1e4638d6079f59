//! Read-only analytical lookups over the loaded relations.
//!
//! Parameterized SQL passthrough with no logic beyond shaping result rows.
//! These assume both loader stages have run; the serving surface in front
//! of them is an external collaborator.

use crate::errors::PipelineError;
use crate::storage::Storage;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One detected object class, aggregated across all images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Detected object label.
    pub object_class: String,
    /// Number of detections with this label.
    pub count: i64,
    /// Average confidence, rounded to 3 decimal places.
    pub avg_confidence: f64,
}

/// One day of activity for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelActivity {
    /// Calendar day.
    pub date_day: NaiveDate,
    /// Messages posted that day.
    pub message_count: i64,
    /// Total views across those messages.
    pub total_views: i64,
}

/// Detection attached to a search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Detected object label.
    pub object: String,
    /// Confidence, rounded to 3 decimal places.
    pub confidence: f64,
}

/// One free-text search hit with its detection summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHit {
    /// Stable message id, `<channel-stem>_<id>`.
    pub message_id: String,
    /// Origin channel handle.
    pub channel_username: String,
    /// When the message was posted.
    pub posted_at: DateTime<Utc>,
    /// Detections found in the message's image, if any.
    pub detections: Vec<DetectionSummary>,
    /// First non-empty lines of the message text, at most 15.
    pub text_preview: Vec<String>,
}

/// Returns the distinct channel handles present in the primary relation.
pub fn channel_list(storage: &Storage) -> Result<Vec<String>, PipelineError> {
    let mut stmt = storage.conn().prepare(
        "SELECT DISTINCT channel_username FROM raw_channel_messages
         ORDER BY channel_username",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Returns the top detected objects by count, with average confidence.
pub fn top_objects(storage: &Storage, limit: i64) -> Result<Vec<ObjectSummary>, PipelineError> {
    let mut stmt = storage.conn().prepare(
        "SELECT detected_object, COUNT(*) AS count,
                ROUND(AVG(confidence_score), 3) AS avg_confidence
         FROM enriched_image_detections
         GROUP BY detected_object
         ORDER BY count DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(ObjectSummary {
            object_class: row.get(0)?,
            count: row.get(1)?,
            avg_confidence: row.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Returns daily message and view counts for one channel, oldest first.
pub fn channel_activity(
    storage: &Storage,
    channel: &str,
) -> Result<Vec<ChannelActivity>, PipelineError> {
    let mut stmt = storage.conn().prepare(
        "SELECT DATE(date) AS date_day, COUNT(*) AS message_count,
                SUM(COALESCE(views, 0)) AS total_views
         FROM raw_channel_messages
         WHERE channel_username = ?1
         GROUP BY date_day
         ORDER BY date_day ASC",
    )?;
    let rows = stmt.query_map(params![channel], |row| {
        Ok(ChannelActivity {
            date_day: row.get(0)?,
            message_count: row.get(1)?,
            total_views: row.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Case-insensitive free-text search over message bodies, newest first,
/// capped at 50 hits, each with its detection summary embedded.
pub fn search_messages(storage: &Storage, query: &str) -> Result<Vec<MessageHit>, PipelineError> {
    let pattern = format!("%{}%", query.trim().to_lowercase());
    let mut stmt = storage.conn().prepare(
        "SELECT ltrim(channel_username, '@') || '_' || CAST(id AS TEXT) AS message_id,
                channel_username, date, text
         FROM raw_channel_messages
         WHERE text IS NOT NULL AND LOWER(text) LIKE ?1
         ORDER BY date DESC
         LIMIT 50",
    )?;
    let rows = stmt.query_map(params![pattern], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, DateTime<Utc>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut hits = Vec::new();
    for row in rows {
        let (message_id, channel_username, posted_at, text) = row?;
        hits.push(MessageHit {
            detections: detections_for(storage, &message_id)?,
            text_preview: preview(&text),
            message_id,
            channel_username,
            posted_at,
        });
    }
    Ok(hits)
}

fn detections_for(
    storage: &Storage,
    message_id: &str,
) -> Result<Vec<DetectionSummary>, PipelineError> {
    let mut stmt = storage.conn().prepare(
        "SELECT detected_object, ROUND(confidence_score, 3)
         FROM enriched_image_detections
         WHERE message_id = ?1",
    )?;
    let rows = stmt.query_map(params![message_id], |row| {
        Ok(DetectionSummary {
            object: row.get(0)?,
            confidence: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn preview(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(15)
        .map(String::from)
        .collect()
}
