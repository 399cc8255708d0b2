//! Blob storage for rendered minutes, with a metadata sidecar table.
//!
//! Blobs are append-only files named by opaque ids; superseded document
//! versions are retained. The blob is written before its sidecar row so a
//! sidecar failure leaves an orphaned blob (picked up by a future GC sweep),
//! never a dangling metadata row.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::db::now_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PDF" => Ok(Self::Pdf),
            "DOCX" => Ok(Self::Docx),
            _ => anyhow::bail!("Invalid document format: {}", s),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// Filesystem-backed blob store. Ids are opaque; callers never build paths.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).context("Failed to create blob directory")?;
        Ok(Self { root })
    }

    pub fn open_default() -> Result<Self> {
        Self::new(crate::global::blobs_dir()?)
    }

    pub fn store(&self, bytes: &[u8]) -> Result<String> {
        let blob_id = Uuid::new_v4().to_string();
        let path = self.root.join(&blob_id);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write blob {:?}", path))?;
        Ok(blob_id)
    }

    pub fn read(&self, blob_id: &str) -> Result<Vec<u8>> {
        // Reject ids that are not bare UUIDs before touching the filesystem.
        Uuid::parse_str(blob_id).context("Invalid blob id")?;
        std::fs::read(self.root.join(blob_id))
            .with_context(|| format!("Failed to read blob {}", blob_id))
    }

    pub fn delete(&self, blob_id: &str) -> Result<()> {
        Uuid::parse_str(blob_id).context("Invalid blob id")?;
        std::fs::remove_file(self.root.join(blob_id))
            .with_context(|| format!("Failed to delete blob {}", blob_id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocumentRecord {
    pub id: String,
    pub blob_id: String,
    pub filename: String,
    pub meeting_id: String,
    pub format: DocumentFormat,
    pub content_type: String,
    pub size_bytes: i64,
    pub version: i64,
    pub generated_at: String,
    pub summary: Option<String>,
}

pub struct DocumentRepository;

impl DocumentRepository {
    /// Next version for a (meeting, format) pair: max + 1, starting at 1.
    pub fn next_version(
        conn: &Connection,
        meeting_id: &str,
        format: DocumentFormat,
    ) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(version) FROM generated_documents \
                 WHERE meeting_id = ?1 AND format = ?2",
                params![meeting_id, format.as_str()],
                |row| row.get(0),
            )
            .context("Failed to query document versions")?;
        Ok(max.unwrap_or(0) + 1)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn save_metadata(
        conn: &Connection,
        meeting_id: &str,
        blob_id: &str,
        filename: &str,
        format: DocumentFormat,
        size_bytes: i64,
        version: i64,
        summary: Option<&str>,
    ) -> Result<GeneratedDocumentRecord> {
        let id = Uuid::new_v4().to_string();
        let generated_at = now_str();
        conn.execute(
            "INSERT INTO generated_documents (id, blob_id, filename, meeting_id, format, \
             content_type, size_bytes, version, generated_at, summary) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                blob_id,
                filename,
                meeting_id,
                format.as_str(),
                format.content_type(),
                size_bytes,
                version,
                generated_at,
                summary,
            ],
        )
        .context("Failed to save document metadata")?;

        Ok(GeneratedDocumentRecord {
            id,
            blob_id: blob_id.to_string(),
            filename: filename.to_string(),
            meeting_id: meeting_id.to_string(),
            format,
            content_type: format.content_type().to_string(),
            size_bytes,
            version,
            generated_at,
            summary: summary.map(String::from),
        })
    }

    pub fn for_meeting(
        conn: &Connection,
        meeting_id: &str,
    ) -> Result<Vec<GeneratedDocumentRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, blob_id, filename, meeting_id, format, content_type, \
                 size_bytes, version, generated_at, summary FROM generated_documents \
                 WHERE meeting_id = ?1 ORDER BY generated_at DESC, version DESC",
            )
            .context("Failed to prepare document query")?;

        let rows = stmt
            .query_map(params![meeting_id], Self::map_row)
            .context("Failed to query documents")?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    pub fn latest(
        conn: &Connection,
        meeting_id: &str,
        format: DocumentFormat,
    ) -> Result<Option<GeneratedDocumentRecord>> {
        conn.query_row(
            "SELECT id, blob_id, filename, meeting_id, format, content_type, size_bytes, \
             version, generated_at, summary FROM generated_documents \
             WHERE meeting_id = ?1 AND format = ?2 ORDER BY version DESC LIMIT 1",
            params![meeting_id, format.as_str()],
            Self::map_row,
        )
        .optional()
        .context("Failed to query latest document")
    }

    pub fn exists_for_meeting(conn: &Connection, meeting_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM generated_documents WHERE meeting_id = ?1 LIMIT 1",
                params![meeting_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check document existence")?;
        Ok(found.is_some())
    }

    /// Download URL for the newest minutes document; PDF preferred.
    pub fn url_for_latest(conn: &Connection, meeting_id: &str) -> Result<Option<String>> {
        let preferred = Self::latest(conn, meeting_id, DocumentFormat::Pdf)?
            .or(Self::latest(conn, meeting_id, DocumentFormat::Docx)?);
        Ok(preferred.map(|doc| {
            format!("/meetings/{}/documents/{}/download", meeting_id, doc.id)
        }))
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GeneratedDocumentRecord> {
        let format: String = row.get(4)?;
        Ok(GeneratedDocumentRecord {
            id: row.get(0)?,
            blob_id: row.get(1)?,
            filename: row.get(2)?,
            meeting_id: row.get(3)?,
            format: DocumentFormat::parse(&format)
                .map_err(|_| rusqlite::Error::InvalidQuery)?,
            content_type: row.get(5)?,
            size_bytes: row.get(6)?,
            version: row.get(7)?,
            generated_at: row.get(8)?,
            summary: row.get(9)?,
        })
    }
}
