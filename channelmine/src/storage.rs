//! SQLite-backed storage for the pipeline's relations.
//!
//! Both relations are destructively replaced on every loader run: after a
//! successful load the relation contains exactly the just-processed batch,
//! with no carryover. Connections are opened and closed within the scope of
//! a single stage; nothing here is shared across stages.

use crate::errors::PipelineError;
use crate::records::{DetectionRecord, SourceRecord};
use rusqlite::{params, Connection};
use std::path::Path;

/// Name of the primary relation.
pub const MESSAGES_TABLE: &str = "raw_channel_messages";

/// Name of the secondary relation.
pub const DETECTIONS_TABLE: &str = "enriched_image_detections";

/// A handle on the storage target, scoped to one stage.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens the storage target at the given path, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Opens an in-memory storage target.
    pub fn open_in_memory() -> Result<Self, PipelineError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Reads back the connected target's identifying name: the file stem of
    /// the main database, or an empty string for an in-memory target.
    pub fn target_name(&self) -> Result<String, PipelineError> {
        let file: String = self
            .conn
            .query_row("PRAGMA database_list", [], |row| row.get(2))?;
        Ok(Path::new(&file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Drops and recreates the primary relation.
    pub fn replace_messages_table(&self) -> Result<(), PipelineError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS raw_channel_messages;
             CREATE TABLE raw_channel_messages (
                 channel_title TEXT,
                 channel_username TEXT,
                 id INTEGER,
                 text TEXT,
                 date TIMESTAMP,
                 views INTEGER,
                 media_type TEXT
             );",
        )?;
        Ok(())
    }

    /// Inserts one row per source record, returning the number inserted.
    pub fn insert_messages(&self, records: &[SourceRecord]) -> Result<usize, PipelineError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO raw_channel_messages (
                 channel_title, channel_username, id, text, date, views, media_type
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for record in records {
            stmt.execute(params![
                record.channel_title,
                record.channel_username,
                record.id,
                record.text,
                record.date,
                record.views,
                record.media_type.to_string(),
            ])?;
        }
        Ok(records.len())
    }

    /// Returns `(channel_username, id)` for every record flagged as having
    /// an image, in insertion order.
    pub fn photo_messages(&self) -> Result<Vec<(String, i64)>, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT channel_username, id FROM raw_channel_messages
             WHERE media_type = 'photo'",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Counts rows in the primary relation.
    pub fn message_count(&self) -> Result<i64, PipelineError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM raw_channel_messages", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Drops and recreates the secondary relation.
    pub fn replace_detections_table(&self) -> Result<(), PipelineError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS enriched_image_detections;
             CREATE TABLE enriched_image_detections (
                 message_id TEXT,
                 detected_object TEXT,
                 confidence_score REAL,
                 bbox TEXT
             );",
        )?;
        Ok(())
    }

    /// Inserts one row per detection record, bbox serialized as JSON text.
    pub fn insert_detections(&self, records: &[DetectionRecord]) -> Result<usize, PipelineError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO enriched_image_detections (
                 message_id, detected_object, confidence_score, bbox
             ) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for record in records {
            stmt.execute(params![
                record.message_id,
                record.detected_object,
                record.confidence_score,
                serde_json::to_string(&record.bbox)?,
            ])?;
        }
        Ok(records.len())
    }

    /// Counts rows in the secondary relation.
    pub fn detection_count(&self) -> Result<i64, PipelineError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM enriched_image_detections",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Returns true if the given table exists.
    pub fn table_exists(&self, name: &str) -> Result<bool, PipelineError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MediaKind;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn record(channel: &str, id: i64, media_type: MediaKind) -> SourceRecord {
        SourceRecord {
            channel_title: format!("Channel {channel}"),
            channel_username: format!("@{channel}"),
            id,
            text: format!("message {id}"),
            date: Utc::now(),
            views: 7,
            media_type,
            media_path: None,
        }
    }

    #[test]
    fn test_target_name_from_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("channelmine_test.db")).unwrap();
        assert_eq!(storage.target_name().unwrap(), "channelmine_test");
    }

    #[test]
    fn test_in_memory_target_name_is_empty() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.target_name().unwrap(), "");
    }

    #[test]
    fn test_replace_messages_drops_prior_contents() {
        let storage = Storage::open_in_memory().unwrap();
        storage.replace_messages_table().unwrap();
        storage
            .insert_messages(&[record("a", 1, MediaKind::None), record("a", 2, MediaKind::None)])
            .unwrap();
        assert_eq!(storage.message_count().unwrap(), 2);

        storage.replace_messages_table().unwrap();
        storage
            .insert_messages(&[record("b", 3, MediaKind::None)])
            .unwrap();
        assert_eq!(storage.message_count().unwrap(), 1);
    }

    #[test]
    fn test_photo_messages_filters_by_media_type() {
        let storage = Storage::open_in_memory().unwrap();
        storage.replace_messages_table().unwrap();
        storage
            .insert_messages(&[
                record("a", 1, MediaKind::Photo),
                record("a", 2, MediaKind::Document),
                record("b", 3, MediaKind::Photo),
                record("b", 4, MediaKind::None),
            ])
            .unwrap();

        let photos = storage.photo_messages().unwrap();
        assert_eq!(photos, vec![("@a".to_string(), 1), ("@b".to_string(), 3)]);
    }

    #[test]
    fn test_insert_detections_serializes_bbox() {
        let storage = Storage::open_in_memory().unwrap();
        storage.replace_detections_table().unwrap();
        let inserted = storage
            .insert_detections(&[DetectionRecord::new(
                "a_1",
                "bottle",
                0.91,
                [0.0, 1.0, 2.0, 3.0],
            )])
            .unwrap();
        assert_eq!(inserted, 1);

        let bbox: String = storage
            .conn()
            .query_row(
                "SELECT bbox FROM enriched_image_detections WHERE message_id = 'a_1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(bbox, "[0.0,1.0,2.0,3.0]");
    }

    #[test]
    fn test_table_exists() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(!storage.table_exists(MESSAGES_TABLE).unwrap());
        storage.replace_messages_table().unwrap();
        assert!(storage.table_exists(MESSAGES_TABLE).unwrap());
        assert!(!storage.table_exists(DETECTIONS_TABLE).unwrap());
    }
}
