//! Meeting series persistence.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::now_str;

#[derive(Debug, Clone)]
pub struct SeriesRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub active: bool,
    pub created_at: String,
}

pub struct SeriesRepository;

impl SeriesRepository {
    pub fn insert(
        conn: &Connection,
        title: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO meeting_series (id, title, description, owner_id, active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![id, title, description, owner_id, now_str()],
        )
        .context("Failed to insert meeting series")?;
        Ok(id)
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<SeriesRecord>> {
        conn.query_row(
            "SELECT id, title, description, owner_id, active, created_at \
             FROM meeting_series WHERE id = ?1",
            params![id],
            |row| {
                Ok(SeriesRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    owner_id: row.get(3)?,
                    active: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
        .context("Failed to query meeting series")
    }
}
