//! Meeting access gate.
//!
//! A single predicate guards every read/write boundary that takes a meeting
//! id from a client: the caller must be the owner, an attendee, or the
//! assignee of one of the meeting's action items.

use anyhow::Result;
use rusqlite::Connection;

use crate::db::{ActionItemRepository, AttendeeRepository, MeetingRecord};

pub fn has_access(conn: &Connection, meeting: &MeetingRecord, user_id: &str) -> Result<bool> {
    if meeting.owner_id == user_id {
        return Ok(true);
    }

    if AttendeeRepository::is_attendee(conn, &meeting.id, user_id)? {
        return Ok(true);
    }

    ActionItemRepository::is_assignee(conn, &meeting.id, user_id)
}
