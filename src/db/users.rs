//! User record persistence.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::now_str;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

pub struct UserRepository;

impl UserRepository {
    pub fn insert(conn: &Connection, email: &str, name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, name, now_str()],
        )
        .context("Failed to insert user")?;
        Ok(id)
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<UserRecord>> {
        conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
        .context("Failed to query user")
    }

    /// Case-insensitive lookup by email (the column collates NOCASE).
    pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<UserRecord>> {
        conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE email = ?1",
            params![email.trim()],
            Self::map_row,
        )
        .optional()
        .context("Failed to query user by email")
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
        Ok(UserRecord {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
