//! Derived-artifact store: transcripts and extractions.
//!
//! One transcript and one extraction per meeting, enforced by a UNIQUE index
//! on `meeting_id`. Writes are single-statement upserts so concurrent racers
//! collapse onto the same row instead of duplicating it; re-running the
//! pipeline overwrites content and bumps `updated_at` only.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::now_str;

pub mod blobs;

pub use blobs::{BlobStore, DocumentFormat, DocumentRepository, GeneratedDocumentRecord};

/// One word of the transcript with timing, as reported by the AI service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    #[serde(rename = "startTime")]
    pub start_time: f64,
    #[serde(rename = "endTime")]
    pub end_time: f64,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub id: String,
    pub meeting_id: String,
    pub raw_text: String,
    pub word_timestamps: Vec<WordTimestamp>,
    pub processing_time_secs: Option<f64>,
    pub audio_duration_secs: Option<f64>,
    pub confidence_score: Option<f64>,
    pub language: Option<String>,
    pub device_used: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Content fields written by a transcript upsert.
#[derive(Debug, Clone, Default)]
pub struct TranscriptPayload {
    pub raw_text: String,
    pub word_timestamps: Vec<WordTimestamp>,
    pub processing_time_secs: Option<f64>,
    pub audio_duration_secs: Option<f64>,
    pub confidence_score: Option<f64>,
    pub language: Option<String>,
    pub device_used: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedData {
    pub decisions: Vec<ExtractedDecision>,
    pub action_items: Vec<ExtractedActionItem>,
    pub topics_discussed: Vec<DiscussedTopic>,
    pub attendees: Vec<ExtractedAttendee>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedDecision {
    pub topic: String,
    pub decision: String,
    pub context: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedActionItem {
    pub description: String,
    pub assigned_to: Option<String>,
    pub deadline: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussedTopic {
    pub agenda_item: String,
    pub summary: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedAttendee {
    pub name: String,
    pub email: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub id: String,
    pub meeting_id: String,
    pub extracted_data: ExtractedData,
    pub model_version: Option<String>,
    pub processing_time_secs: Option<f64>,
    pub confidence_score: Option<f64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Content fields written by an extraction upsert.
#[derive(Debug, Clone, Default)]
pub struct ExtractionPayload {
    pub extracted_data: ExtractedData,
    pub model_version: Option<String>,
    pub processing_time_secs: Option<f64>,
    pub confidence_score: Option<f64>,
}

pub struct TranscriptRepository;

impl TranscriptRepository {
    pub fn upsert(
        conn: &Connection,
        meeting_id: &str,
        payload: &TranscriptPayload,
    ) -> Result<Transcript> {
        let now = now_str();
        let words = serde_json::to_string(&payload.word_timestamps)
            .context("Failed to serialize word timestamps")?;

        conn.execute(
            "INSERT INTO transcripts (id, meeting_id, raw_text, word_timestamps, \
             processing_time_secs, audio_duration_secs, confidence_score, language, \
             device_used, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) \
             ON CONFLICT(meeting_id) DO UPDATE SET \
                 raw_text = excluded.raw_text, \
                 word_timestamps = excluded.word_timestamps, \
                 processing_time_secs = excluded.processing_time_secs, \
                 audio_duration_secs = excluded.audio_duration_secs, \
                 confidence_score = excluded.confidence_score, \
                 language = excluded.language, \
                 device_used = excluded.device_used, \
                 updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                meeting_id,
                payload.raw_text,
                words,
                payload.processing_time_secs,
                payload.audio_duration_secs,
                payload.confidence_score,
                payload.language,
                payload.device_used,
                now,
            ],
        )
        .context("Failed to upsert transcript")?;

        Self::find_by_meeting(conn, meeting_id)?
            .context("Transcript missing after upsert")
    }

    pub fn find_by_meeting(conn: &Connection, meeting_id: &str) -> Result<Option<Transcript>> {
        conn.query_row(
            "SELECT id, meeting_id, raw_text, word_timestamps, processing_time_secs, \
             audio_duration_secs, confidence_score, language, device_used, created_at, \
             updated_at FROM transcripts WHERE meeting_id = ?1",
            params![meeting_id],
            |row| {
                let words_json: String = row.get(3)?;
                Ok((
                    Transcript {
                        id: row.get(0)?,
                        meeting_id: row.get(1)?,
                        raw_text: row.get(2)?,
                        word_timestamps: Vec::new(),
                        processing_time_secs: row.get(4)?,
                        audio_duration_secs: row.get(5)?,
                        confidence_score: row.get(6)?,
                        language: row.get(7)?,
                        device_used: row.get(8)?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    },
                    words_json,
                ))
            },
        )
        .optional()
        .context("Failed to query transcript")?
        .map(|(mut transcript, words_json)| {
            transcript.word_timestamps = serde_json::from_str(&words_json)
                .context("Failed to parse word timestamps")?;
            Ok(transcript)
        })
        .transpose()
    }

    pub fn exists(conn: &Connection, meeting_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM transcripts WHERE meeting_id = ?1",
                params![meeting_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check transcript existence")?;
        Ok(found.is_some())
    }
}

pub struct ExtractionRepository;

impl ExtractionRepository {
    pub fn upsert(
        conn: &Connection,
        meeting_id: &str,
        payload: &ExtractionPayload,
    ) -> Result<Extraction> {
        let now = now_str();
        let data = serde_json::to_string(&payload.extracted_data)
            .context("Failed to serialize extracted data")?;

        conn.execute(
            "INSERT INTO extractions (id, meeting_id, extracted_data, model_version, \
             processing_time_secs, confidence_score, success, error_message, created_at, \
             updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, NULL, ?7, ?7) \
             ON CONFLICT(meeting_id) DO UPDATE SET \
                 extracted_data = excluded.extracted_data, \
                 model_version = excluded.model_version, \
                 processing_time_secs = excluded.processing_time_secs, \
                 confidence_score = excluded.confidence_score, \
                 success = 1, \
                 error_message = NULL, \
                 updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                meeting_id,
                data,
                payload.model_version,
                payload.processing_time_secs,
                payload.confidence_score,
                now,
            ],
        )
        .context("Failed to upsert extraction")?;

        Self::find_by_meeting(conn, meeting_id)?
            .context("Extraction missing after upsert")
    }

    pub fn find_by_meeting(conn: &Connection, meeting_id: &str) -> Result<Option<Extraction>> {
        conn.query_row(
            "SELECT id, meeting_id, extracted_data, model_version, processing_time_secs, \
             confidence_score, success, error_message, created_at, updated_at \
             FROM extractions WHERE meeting_id = ?1",
            params![meeting_id],
            |row| {
                let data_json: String = row.get(2)?;
                Ok((
                    Extraction {
                        id: row.get(0)?,
                        meeting_id: row.get(1)?,
                        extracted_data: ExtractedData::default(),
                        model_version: row.get(3)?,
                        processing_time_secs: row.get(4)?,
                        confidence_score: row.get(5)?,
                        success: row.get(6)?,
                        error_message: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    },
                    data_json,
                ))
            },
        )
        .optional()
        .context("Failed to query extraction")?
        .map(|(mut extraction, data_json)| {
            extraction.extracted_data = serde_json::from_str(&data_json)
                .context("Failed to parse extracted data")?;
            Ok(extraction)
        })
        .transpose()
    }

    pub fn exists(conn: &Connection, meeting_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM extractions WHERE meeting_id = ?1",
                params![meeting_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check extraction existence")?;
        Ok(found.is_some())
    }
}
