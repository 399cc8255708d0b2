//! Meeting record persistence.
//!
//! The status column drives the processing lifecycle:
//! DRAFT -> PROCESSING -> PROCESSED | FAILED. The transition into PROCESSING
//! is a compare-and-set so two concurrent start requests cannot both win.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
    Draft,
    Processing,
    Processed,
    Failed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            _ => anyhow::bail!("Invalid meeting status: {}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub series_id: Option<String>,
    pub status: MeetingStatus,
    pub audio_path: Option<String>,
    pub scheduled_time: Option<String>,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub agenda: Option<String>,
    pub use_previous_context: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to create a meeting; the rest default.
#[derive(Debug, Default)]
pub struct NewMeeting {
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub series_id: Option<String>,
    pub audio_path: Option<String>,
    pub scheduled_time: Option<String>,
    pub agenda: Option<String>,
    pub use_previous_context: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgendaItem {
    pub id: String,
    pub meeting_id: String,
    pub position: i64,
    pub title: String,
    pub description: Option<String>,
    pub estimated_duration_minutes: Option<i64>,
}

const MEETING_COLUMNS: &str = "id, title, description, owner_id, series_id, status, \
     audio_path, scheduled_time, actual_start_time, actual_end_time, agenda, \
     use_previous_context, created_at, updated_at";

pub struct MeetingRepository;

impl MeetingRepository {
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        conn.execute(
            "INSERT INTO meetings (id, title, description, owner_id, series_id, status, \
             audio_path, scheduled_time, agenda, use_previous_context, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'DRAFT', ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                meeting.title,
                meeting.description,
                meeting.owner_id,
                meeting.series_id,
                meeting.audio_path,
                meeting.scheduled_time,
                meeting.agenda,
                meeting.use_previous_context,
                now,
            ],
        )
        .context("Failed to insert meeting")?;
        Ok(id)
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<MeetingRecord>> {
        conn.query_row(
            &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?1"),
            params![id],
            Self::map_row,
        )
        .optional()
        .context("Failed to query meeting")
    }

    /// Atomically claim the meeting for processing.
    ///
    /// Succeeds only from DRAFT (first run) or FAILED (retry); stamps
    /// `actual_start_time`. Returns false when another invocation won the
    /// race or the meeting is already terminal.
    pub fn claim_for_processing(conn: &Connection, id: &str) -> Result<bool> {
        let now = now_str();
        let affected = conn
            .execute(
                "UPDATE meetings SET status = 'PROCESSING', actual_start_time = ?1, \
                 updated_at = ?1 WHERE id = ?2 AND status IN ('DRAFT', 'FAILED')",
                params![now, id],
            )
            .context("Failed to claim meeting for processing")?;
        Ok(affected == 1)
    }

    /// Move the meeting to a terminal status, stamping `actual_end_time`.
    pub fn finish(conn: &Connection, id: &str, status: MeetingStatus) -> Result<()> {
        debug_assert!(matches!(
            status,
            MeetingStatus::Processed | MeetingStatus::Failed
        ));
        let now = now_str();
        conn.execute(
            "UPDATE meetings SET status = ?1, actual_end_time = ?2, updated_at = ?2 \
             WHERE id = ?3",
            params![status.as_str(), now, id],
        )
        .context("Failed to finish meeting")?;
        Ok(())
    }

    pub fn status(conn: &Connection, id: &str) -> Result<Option<MeetingStatus>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM meetings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query meeting status")?;
        raw.map(|s| MeetingStatus::parse(&s)).transpose()
    }

    pub fn set_audio_path(conn: &Connection, id: &str, audio_path: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET audio_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![audio_path, now_str(), id],
        )
        .context("Failed to set audio path")?;
        Ok(())
    }

    /// Processed sibling meetings in a series, newest first, excluding `exclude_id`.
    pub fn find_processed_in_series(
        conn: &Connection,
        series_id: &str,
        exclude_id: &str,
    ) -> Result<Vec<MeetingRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings \
                 WHERE series_id = ?1 AND status = 'PROCESSED' AND id != ?2 \
                 ORDER BY COALESCE(scheduled_time, created_at) DESC, id DESC"
            ))
            .context("Failed to prepare series query")?;

        let rows = stmt
            .query_map(params![series_id, exclude_id], Self::map_row)
            .context("Failed to query processed meetings in series")?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    pub fn add_agenda_item(
        conn: &Connection,
        meeting_id: &str,
        position: i64,
        title: &str,
        description: Option<&str>,
        estimated_duration_minutes: Option<i64>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO agenda_items (id, meeting_id, position, title, description, \
             estimated_duration_minutes) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                meeting_id,
                position,
                title,
                description,
                estimated_duration_minutes
            ],
        )
        .context("Failed to insert agenda item")?;
        Ok(id)
    }

    pub fn agenda_items(conn: &Connection, meeting_id: &str) -> Result<Vec<AgendaItem>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, position, title, description, \
                 estimated_duration_minutes FROM agenda_items \
                 WHERE meeting_id = ?1 ORDER BY position",
            )
            .context("Failed to prepare agenda query")?;

        let rows = stmt
            .query_map(params![meeting_id], |row| {
                Ok(AgendaItem {
                    id: row.get(0)?,
                    meeting_id: row.get(1)?,
                    position: row.get(2)?,
                    title: row.get(3)?,
                    description: row.get(4)?,
                    estimated_duration_minutes: row.get(5)?,
                })
            })
            .context("Failed to query agenda items")?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeetingRecord> {
        let status: String = row.get(5)?;
        Ok(MeetingRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            owner_id: row.get(3)?,
            series_id: row.get(4)?,
            status: MeetingStatus::parse(&status)
                .map_err(|_| rusqlite::Error::InvalidQuery)?,
            audio_path: row.get(6)?,
            scheduled_time: row.get(7)?,
            actual_start_time: row.get(8)?,
            actual_end_time: row.get(9)?,
            agenda: row.get(10)?,
            use_previous_context: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, UserRepository};

    fn seed_meeting(conn: &Connection, audio: Option<&str>) -> String {
        let owner = UserRepository::insert(conn, "owner@example.com", "Owner").unwrap();
        MeetingRepository::insert(
            conn,
            &NewMeeting {
                title: "Standup".to_string(),
                owner_id: owner,
                audio_path: audio.map(String::from),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        let meeting = MeetingRepository::get(&conn, &id).unwrap().unwrap();
        assert_eq!(meeting.title, "Standup");
        assert_eq!(meeting.status, MeetingStatus::Draft);
        assert_eq!(meeting.audio_path.as_deref(), Some("/tmp/audio.mp3"));
        assert!(meeting.actual_start_time.is_none());
    }

    #[test]
    fn test_claim_for_processing_from_draft() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        assert!(MeetingRepository::claim_for_processing(&conn, &id).unwrap());

        let meeting = MeetingRepository::get(&conn, &id).unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Processing);
        assert!(meeting.actual_start_time.is_some());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        assert!(MeetingRepository::claim_for_processing(&conn, &id).unwrap());
        // Second claim loses: the meeting is already PROCESSING.
        assert!(!MeetingRepository::claim_for_processing(&conn, &id).unwrap());
    }

    #[test]
    fn test_claim_allowed_after_failure() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        assert!(MeetingRepository::claim_for_processing(&conn, &id).unwrap());
        MeetingRepository::finish(&conn, &id, MeetingStatus::Failed).unwrap();
        assert!(MeetingRepository::claim_for_processing(&conn, &id).unwrap());
    }

    #[test]
    fn test_claim_rejected_when_processed() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        MeetingRepository::claim_for_processing(&conn, &id).unwrap();
        MeetingRepository::finish(&conn, &id, MeetingStatus::Processed).unwrap();
        assert!(!MeetingRepository::claim_for_processing(&conn, &id).unwrap());
    }

    #[test]
    fn test_finish_stamps_end_time() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, Some("/tmp/audio.mp3"));

        MeetingRepository::claim_for_processing(&conn, &id).unwrap();
        MeetingRepository::finish(&conn, &id, MeetingStatus::Processed).unwrap();

        let meeting = MeetingRepository::get(&conn, &id).unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Processed);
        assert!(meeting.actual_end_time.is_some());
    }

    #[test]
    fn test_agenda_items_ordered() {
        let conn = open_in_memory();
        let id = seed_meeting(&conn, None);

        MeetingRepository::add_agenda_item(&conn, &id, 2, "Roadmap", None, Some(20)).unwrap();
        MeetingRepository::add_agenda_item(&conn, &id, 1, "Intro", Some("welcome"), Some(5))
            .unwrap();

        let items = MeetingRepository::agenda_items(&conn, &id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Intro");
        assert_eq!(items[1].title, "Roadmap");
    }

    #[test]
    fn test_find_processed_in_series() {
        let conn = open_in_memory();
        let owner = UserRepository::insert(&conn, "owner2@example.com", "Owner").unwrap();
        let series = crate::db::SeriesRepository::insert(&conn, "Weekly sync", None, &owner)
            .unwrap();

        let mut ids = Vec::new();
        for (title, time) in [
            ("First", "2025-01-06T10:00:00"),
            ("Second", "2025-01-13T10:00:00"),
            ("Third", "2025-01-20T10:00:00"),
        ] {
            let id = MeetingRepository::insert(
                &conn,
                &NewMeeting {
                    title: title.to_string(),
                    owner_id: owner.clone(),
                    series_id: Some(series.clone()),
                    scheduled_time: Some(time.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
            MeetingRepository::claim_for_processing(&conn, &id).unwrap();
            MeetingRepository::finish(&conn, &id, MeetingStatus::Processed).unwrap();
            ids.push(id);
        }

        // The third meeting asks for its siblings: newest first, self excluded.
        let siblings =
            MeetingRepository::find_processed_in_series(&conn, &series, &ids[2]).unwrap();
        assert_eq!(siblings.len(), 2);
        assert_eq!(siblings[0].title, "Second");
        assert_eq!(siblings[1].title, "First");
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            MeetingStatus::Draft,
            MeetingStatus::Processing,
            MeetingStatus::Processed,
            MeetingStatus::Failed,
        ] {
            assert_eq!(MeetingStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(MeetingStatus::parse("recording").is_err());
    }
}
