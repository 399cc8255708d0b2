//! Action item persistence.
//!
//! Rows are created in bulk by the pipeline's materialize stage; afterwards
//! only the assignee (status, acknowledgement) or the meeting owner (fields)
//! may mutate them.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => anyhow::bail!("Invalid task status: {}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionItemRecord {
    pub id: String,
    pub meeting_id: String,
    pub description: String,
    pub assigned_user_id: Option<String>,
    pub assigned_email: Option<String>,
    pub deadline: Option<String>,
    pub status: TaskStatus,
    pub priority: i64,
    pub acknowledged: bool,
    pub acknowledged_at: Option<String>,
    pub completed_at: Option<String>,
    pub completion_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row the materializer wants to insert. Assignment is user XOR email,
/// or neither.
#[derive(Debug, Clone, Default)]
pub struct NewActionItem {
    pub meeting_id: String,
    pub description: String,
    pub assigned_user_id: Option<String>,
    pub assigned_email: Option<String>,
    pub deadline: Option<String>,
    pub priority: i64,
}

const COLUMNS: &str = "id, meeting_id, description, assigned_user_id, assigned_email, \
     deadline, status, priority, acknowledged, acknowledged_at, completed_at, \
     completion_notes, created_at, updated_at";

pub struct ActionItemRepository;

impl ActionItemRepository {
    /// Insert a batch of action items in a single transaction; any failure
    /// rolls the whole batch back.
    pub fn insert_batch(conn: &Connection, items: &[NewActionItem]) -> Result<Vec<String>> {
        let tx = conn
            .unchecked_transaction()
            .context("Failed to begin action item transaction")?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = Uuid::new_v4().to_string();
            let now = now_str();
            tx.execute(
                "INSERT INTO action_items (id, meeting_id, description, assigned_user_id, \
                 assigned_email, deadline, status, priority, acknowledged, created_at, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7, 0, ?8, ?8)",
                params![
                    id,
                    item.meeting_id,
                    item.description,
                    item.assigned_user_id,
                    item.assigned_email,
                    item.deadline,
                    item.priority,
                    now,
                ],
            )
            .context("Failed to insert action item")?;
            ids.push(id);
        }

        tx.commit().context("Failed to commit action items")?;
        Ok(ids)
    }

    pub fn for_meeting(conn: &Connection, meeting_id: &str) -> Result<Vec<ActionItemRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM action_items WHERE meeting_id = ?1 \
                 ORDER BY created_at, id"
            ))
            .context("Failed to prepare action item query")?;

        let rows = stmt
            .query_map(params![meeting_id], Self::map_row)
            .context("Failed to query action items")?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<ActionItemRecord>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM action_items WHERE id = ?1"),
            params![id],
            Self::map_row,
        )
        .optional()
        .context("Failed to query action item")
    }

    pub fn count_for_meeting(conn: &Connection, meeting_id: &str) -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM action_items WHERE meeting_id = ?1",
            params![meeting_id],
            |row| row.get(0),
        )
        .context("Failed to count action items")
    }

    pub fn is_assignee(conn: &Connection, meeting_id: &str, user_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM action_items \
                 WHERE meeting_id = ?1 AND assigned_user_id = ?2 LIMIT 1",
                params![meeting_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query action item assignment")?;
        Ok(found.is_some())
    }

    /// Assignee acknowledges the task.
    pub fn acknowledge(conn: &Connection, id: &str) -> Result<()> {
        let now = now_str();
        conn.execute(
            "UPDATE action_items SET acknowledged = 1, acknowledged_at = ?1, updated_at = ?1 \
             WHERE id = ?2",
            params![now, id],
        )
        .context("Failed to acknowledge action item")?;
        Ok(())
    }

    /// Assignee moves the task through its lifecycle. Completion stamps
    /// `completed_at` and records optional notes.
    pub fn update_status(
        conn: &Connection,
        id: &str,
        status: TaskStatus,
        completion_notes: Option<&str>,
    ) -> Result<()> {
        let now = now_str();
        let completed_at = matches!(status, TaskStatus::Completed).then(|| now.clone());
        conn.execute(
            "UPDATE action_items SET status = ?1, completed_at = ?2, \
             completion_notes = COALESCE(?3, completion_notes), updated_at = ?4 \
             WHERE id = ?5",
            params![status.as_str(), completed_at, completion_notes, now, id],
        )
        .context("Failed to update action item status")?;
        Ok(())
    }

    /// Owner-side edit of description, deadline and priority.
    pub fn update_fields(
        conn: &Connection,
        id: &str,
        description: &str,
        deadline: Option<&str>,
        priority: i64,
    ) -> Result<()> {
        conn.execute(
            "UPDATE action_items SET description = ?1, deadline = ?2, priority = ?3, \
             updated_at = ?4 WHERE id = ?5",
            params![description, deadline, priority, now_str(), id],
        )
        .context("Failed to update action item fields")?;
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionItemRecord> {
        let status: String = row.get(6)?;
        Ok(ActionItemRecord {
            id: row.get(0)?,
            meeting_id: row.get(1)?,
            description: row.get(2)?,
            assigned_user_id: row.get(3)?,
            assigned_email: row.get(4)?,
            deadline: row.get(5)?,
            status: TaskStatus::parse(&status).map_err(|_| rusqlite::Error::InvalidQuery)?,
            priority: row.get(7)?,
            acknowledged: row.get(8)?,
            acknowledged_at: row.get(9)?,
            completed_at: row.get(10)?,
            completion_notes: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, MeetingRepository, NewMeeting, UserRepository};

    fn seed(conn: &Connection) -> (String, String) {
        let owner = UserRepository::insert(conn, "owner@example.com", "Owner").unwrap();
        let meeting = MeetingRepository::insert(
            conn,
            &NewMeeting {
                title: "Retro".to_string(),
                owner_id: owner.clone(),
                ..Default::default()
            },
        )
        .unwrap();
        (owner, meeting)
    }

    fn item(meeting_id: &str, description: &str) -> NewActionItem {
        NewActionItem {
            meeting_id: meeting_id.to_string(),
            description: description.to_string(),
            priority: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_batch() {
        let conn = open_in_memory();
        let (_, meeting) = seed(&conn);

        let ids = ActionItemRepository::insert_batch(
            &conn,
            &[item(&meeting, "Write report"), item(&meeting, "Book room")],
        )
        .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ActionItemRepository::count_for_meeting(&conn, &meeting).unwrap(), 2);

        let items = ActionItemRepository::for_meeting(&conn, &meeting).unwrap();
        assert!(items.iter().all(|i| i.status == TaskStatus::Pending));
        assert!(items.iter().all(|i| !i.acknowledged));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let conn = open_in_memory();
        let (owner, meeting) = seed(&conn);

        // Second row violates the user-XOR-email CHECK, so nothing lands.
        let bad = NewActionItem {
            meeting_id: meeting.clone(),
            description: "broken".to_string(),
            assigned_user_id: Some(owner),
            assigned_email: Some("both@example.com".to_string()),
            priority: 2,
            ..Default::default()
        };
        let result =
            ActionItemRepository::insert_batch(&conn, &[item(&meeting, "ok"), bad]);
        assert!(result.is_err());
        assert_eq!(ActionItemRepository::count_for_meeting(&conn, &meeting).unwrap(), 0);
    }

    #[test]
    fn test_acknowledge() {
        let conn = open_in_memory();
        let (_, meeting) = seed(&conn);
        let ids =
            ActionItemRepository::insert_batch(&conn, &[item(&meeting, "Follow up")]).unwrap();

        ActionItemRepository::acknowledge(&conn, &ids[0]).unwrap();

        let record = ActionItemRepository::get(&conn, &ids[0]).unwrap().unwrap();
        assert!(record.acknowledged);
        assert!(record.acknowledged_at.is_some());
    }

    #[test]
    fn test_completion_stamps_time_and_notes() {
        let conn = open_in_memory();
        let (_, meeting) = seed(&conn);
        let ids =
            ActionItemRepository::insert_batch(&conn, &[item(&meeting, "Ship it")]).unwrap();

        ActionItemRepository::update_status(&conn, &ids[0], TaskStatus::InProgress, None)
            .unwrap();
        ActionItemRepository::update_status(
            &conn,
            &ids[0],
            TaskStatus::Completed,
            Some("done in v2"),
        )
        .unwrap();

        let record = ActionItemRepository::get(&conn, &ids[0]).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.completion_notes.as_deref(), Some("done in v2"));
    }

    #[test]
    fn test_is_assignee() {
        let conn = open_in_memory();
        let (owner, meeting) = seed(&conn);

        let assigned = NewActionItem {
            meeting_id: meeting.clone(),
            description: "Review PR".to_string(),
            assigned_user_id: Some(owner.clone()),
            priority: 3,
            ..Default::default()
        };
        ActionItemRepository::insert_batch(&conn, &[assigned]).unwrap();

        assert!(ActionItemRepository::is_assignee(&conn, &meeting, &owner).unwrap());
        assert!(!ActionItemRepository::is_assignee(&conn, &meeting, "other").unwrap());
    }

    #[test]
    fn test_update_fields() {
        let conn = open_in_memory();
        let (_, meeting) = seed(&conn);
        let ids =
            ActionItemRepository::insert_batch(&conn, &[item(&meeting, "Draft plan")]).unwrap();

        ActionItemRepository::update_fields(
            &conn,
            &ids[0],
            "Draft the Q2 plan",
            Some("2025-04-01T23:59:59"),
            3,
        )
        .unwrap();

        let record = ActionItemRepository::get(&conn, &ids[0]).unwrap().unwrap();
        assert_eq!(record.description, "Draft the Q2 plan");
        assert_eq!(record.deadline.as_deref(), Some("2025-04-01T23:59:59"));
        assert_eq!(record.priority, 3);
    }
}
