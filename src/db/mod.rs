//! Relational store: raw SQL with rusqlite, no ORM.
//!
//! Each repository is a unit struct with associated functions taking a
//! `&Connection`. Async callers go through [`Db::call`], which opens a fresh
//! connection on the blocking pool; handoffs between pipeline stages go
//! through the store, never through shared in-process state.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub mod action_items;
pub mod attendees;
pub mod meetings;
pub mod series;
pub mod users;

pub use action_items::{ActionItemRecord, ActionItemRepository, NewActionItem, TaskStatus};
pub use attendees::{AttendeeRecord, AttendeeRepository, AttendeeStatus};
pub use meetings::{AgendaItem, MeetingRecord, MeetingRepository, MeetingStatus, NewMeeting};
pub use series::{SeriesRecord, SeriesRepository};
pub use users::{UserRecord, UserRepository};

/// Cloneable handle to the SQLite database file.
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Open (and migrate) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrate(&conn)?;

        Ok(Self { path })
    }

    /// Open the database at the default platform location.
    pub fn open_default() -> Result<Self> {
        Self::new(crate::global::db_file()?)
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).context("Failed to open database connection")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        Ok(conn)
    }

    /// Run `f` with a fresh connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.connect()?;
            f(&conn)
        })
        .await
        .context("Database task panicked")?
    }
}

/// Current UTC timestamp in the storage format.
pub fn now_str() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meeting_series (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            owner_id TEXT NOT NULL REFERENCES users(id),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            owner_id TEXT NOT NULL REFERENCES users(id),
            series_id TEXT REFERENCES meeting_series(id),
            status TEXT NOT NULL DEFAULT 'DRAFT',
            audio_path TEXT,
            scheduled_time TEXT,
            actual_start_time TEXT,
            actual_end_time TEXT,
            agenda TEXT,
            use_previous_context INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_meetings_series ON meetings(series_id, status);
        CREATE INDEX IF NOT EXISTS idx_meetings_owner ON meetings(owner_id);

        CREATE TABLE IF NOT EXISTS agenda_items (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            estimated_duration_minutes INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_agenda_items_meeting
            ON agenda_items(meeting_id, position);

        CREATE TABLE IF NOT EXISTS attendees (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            user_id TEXT REFERENCES users(id),
            invite_email TEXT COLLATE NOCASE,
            status TEXT NOT NULL DEFAULT 'INVITED',
            is_organizer INTEGER NOT NULL DEFAULT 0,
            invite_token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (user_id IS NOT NULL OR invite_email IS NOT NULL)
        );
        CREATE INDEX IF NOT EXISTS idx_attendees_meeting ON attendees(meeting_id);
        CREATE INDEX IF NOT EXISTS idx_attendees_user ON attendees(user_id);

        CREATE TABLE IF NOT EXISTS action_items (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            description TEXT NOT NULL,
            assigned_user_id TEXT REFERENCES users(id),
            assigned_email TEXT,
            deadline TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            priority INTEGER NOT NULL DEFAULT 2,
            acknowledged INTEGER NOT NULL DEFAULT 0,
            acknowledged_at TEXT,
            completed_at TEXT,
            completion_notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (assigned_user_id IS NULL OR assigned_email IS NULL)
        );
        CREATE INDEX IF NOT EXISTS idx_action_items_meeting ON action_items(meeting_id);
        CREATE INDEX IF NOT EXISTS idx_action_items_assignee
            ON action_items(assigned_user_id);

        CREATE TABLE IF NOT EXISTS transcripts (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL UNIQUE,
            raw_text TEXT NOT NULL,
            word_timestamps TEXT NOT NULL DEFAULT '[]',
            processing_time_secs REAL,
            audio_duration_secs REAL,
            confidence_score REAL,
            language TEXT,
            device_used TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS extractions (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL UNIQUE,
            extracted_data TEXT NOT NULL,
            model_version TEXT,
            processing_time_secs REAL,
            confidence_score REAL,
            success INTEGER NOT NULL DEFAULT 1,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS generated_documents (
            id TEXT PRIMARY KEY,
            blob_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            meeting_id TEXT NOT NULL,
            format TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            version INTEGER NOT NULL,
            generated_at TEXT NOT NULL,
            summary TEXT,
            UNIQUE (meeting_id, format, version)
        );
        CREATE INDEX IF NOT EXISTS idx_generated_documents_meeting
            ON generated_documents(meeting_id);",
    )
    .context("Failed to run database migration")?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();
    conn
}
