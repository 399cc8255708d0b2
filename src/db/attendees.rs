//! Attendee persistence.
//!
//! An attendee row is either linked to a registered user or carries an
//! invite email; invite-only rows move onto the user the first time someone
//! logs in with a matching email.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_str;
use super::users::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendeeStatus {
    Invited,
    Confirmed,
    Declined,
    Attended,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invited => "INVITED",
            Self::Confirmed => "CONFIRMED",
            Self::Declined => "DECLINED",
            Self::Attended => "ATTENDED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INVITED" => Ok(Self::Invited),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DECLINED" => Ok(Self::Declined),
            "ATTENDED" => Ok(Self::Attended),
            _ => anyhow::bail!("Invalid attendee status: {}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendeeRecord {
    pub id: String,
    pub meeting_id: String,
    pub user_id: Option<String>,
    pub invite_email: Option<String>,
    pub status: AttendeeStatus,
    pub is_organizer: bool,
    pub invite_token: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AttendeeRepository;

impl AttendeeRepository {
    /// Add a registered user as attendee.
    pub fn insert_user(
        conn: &Connection,
        meeting_id: &str,
        user_id: &str,
        is_organizer: bool,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        conn.execute(
            "INSERT INTO attendees (id, meeting_id, user_id, status, is_organizer, \
             invite_token, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 'INVITED', ?4, ?5, ?6, ?6)",
            params![
                id,
                meeting_id,
                user_id,
                is_organizer,
                Uuid::new_v4().to_string(),
                now
            ],
        )
        .context("Failed to insert attendee")?;
        Ok(id)
    }

    /// Add an external invitee by email; linked to a user on first login.
    pub fn insert_invite(conn: &Connection, meeting_id: &str, email: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        conn.execute(
            "INSERT INTO attendees (id, meeting_id, invite_email, status, is_organizer, \
             invite_token, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 'INVITED', 0, ?4, ?5, ?5)",
            params![id, meeting_id, email, Uuid::new_v4().to_string(), now],
        )
        .context("Failed to insert invited attendee")?;
        Ok(id)
    }

    pub fn set_status(conn: &Connection, id: &str, status: AttendeeStatus) -> Result<()> {
        conn.execute(
            "UPDATE attendees SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_str(), id],
        )
        .context("Failed to update attendee status")?;
        Ok(())
    }

    pub fn for_meeting(conn: &Connection, meeting_id: &str) -> Result<Vec<AttendeeRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, user_id, invite_email, status, is_organizer, \
                 invite_token, created_at, updated_at \
                 FROM attendees WHERE meeting_id = ?1 ORDER BY created_at, id",
            )
            .context("Failed to prepare attendee query")?;

        let rows = stmt
            .query_map(params![meeting_id], |row| {
                let status: String = row.get(4)?;
                Ok(AttendeeRecord {
                    id: row.get(0)?,
                    meeting_id: row.get(1)?,
                    user_id: row.get(2)?,
                    invite_email: row.get(3)?,
                    status: AttendeeStatus::parse(&status)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?,
                    is_organizer: row.get(5)?,
                    invite_token: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .context("Failed to query attendees")?;

        let mut attendees = Vec::new();
        for row in rows {
            attendees.push(row?);
        }
        Ok(attendees)
    }

    /// Registered users attending a meeting (invite-only rows excluded).
    pub fn linked_users(conn: &Connection, meeting_id: &str) -> Result<Vec<UserRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT u.id, u.email, u.name, u.created_at FROM attendees a \
                 JOIN users u ON u.id = a.user_id \
                 WHERE a.meeting_id = ?1",
            )
            .context("Failed to prepare attendee user query")?;

        let rows = stmt
            .query_map(params![meeting_id], |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("Failed to query attendee users")?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn is_attendee(conn: &Connection, meeting_id: &str, user_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM attendees WHERE meeting_id = ?1 AND user_id = ?2 LIMIT 1",
                params![meeting_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query attendee membership")?;
        Ok(found.is_some())
    }

    /// Link invite-email-only rows to a user whose email matches.
    /// Returns how many rows were linked.
    pub fn link_user_by_email(conn: &Connection, user: &UserRecord) -> Result<usize> {
        let affected = conn
            .execute(
                "UPDATE attendees SET user_id = ?1, invite_email = NULL, updated_at = ?2 \
                 WHERE user_id IS NULL AND invite_email = ?3",
                params![user.id, now_str(), user.email],
            )
            .context("Failed to link attendee rows to user")?;
        Ok(affected)
    }
}
