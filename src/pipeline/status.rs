//! Processing status derived from persisted state only.
//!
//! No in-process orchestrator memory is consulted, so the answer stays
//! correct across restarts: a client polling after a crash sees the real
//! pipeline position reconstructed from which artifacts exist.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use crate::artifacts::{DocumentRepository, ExtractionRepository, TranscriptRepository};
use crate::db::{ActionItemRepository, MeetingRecord, MeetingStatus};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatus {
    pub meeting_id: String,
    pub status: MeetingStatus,
    pub progress: u8,
    pub current_step: String,
    pub message: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

pub fn processing_status(conn: &Connection, meeting: &MeetingRecord) -> Result<ProcessingStatus> {
    let progress = match meeting.status {
        MeetingStatus::Draft | MeetingStatus::Failed => 0,
        MeetingStatus::Processing | MeetingStatus::Processed => {
            artifact_progress(conn, &meeting.id)?
        }
    };

    Ok(ProcessingStatus {
        meeting_id: meeting.id.clone(),
        status: meeting.status,
        progress,
        current_step: current_step(meeting.status).to_string(),
        message: status_message(meeting.status).to_string(),
        started_at: meeting.actual_start_time.clone(),
        completed_at: meeting.actual_end_time.clone(),
    })
}

/// Progress from which artifacts actually exist, not from any counter.
fn artifact_progress(conn: &Connection, meeting_id: &str) -> Result<u8> {
    if !TranscriptRepository::exists(conn, meeting_id)? {
        return Ok(25);
    }
    if !ExtractionRepository::exists(conn, meeting_id)? {
        return Ok(50);
    }
    if ActionItemRepository::count_for_meeting(conn, meeting_id)? == 0 {
        return Ok(75);
    }
    if !DocumentRepository::exists_for_meeting(conn, meeting_id)? {
        return Ok(90);
    }
    Ok(100)
}

fn current_step(status: MeetingStatus) -> &'static str {
    match status {
        MeetingStatus::Draft => "WAITING_FOR_PROCESSING",
        MeetingStatus::Processing => "AI_PROCESSING",
        MeetingStatus::Processed => "COMPLETED",
        MeetingStatus::Failed => "FAILED",
    }
}

fn status_message(status: MeetingStatus) -> &'static str {
    match status {
        MeetingStatus::Draft => "Ready for processing - upload audio to start",
        MeetingStatus::Processing => {
            "AI is processing your meeting - this may take a few minutes"
        }
        MeetingStatus::Processed => "Processing completed successfully - minutes are ready",
        MeetingStatus::Failed => "Processing failed - please try again or contact support",
    }
}
