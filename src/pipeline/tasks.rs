//! Action item materialization.
//!
//! Turns the extraction's action items into persisted task rows in one
//! all-or-nothing batch: assignment via the assignee resolver, deadline via
//! the deadline parser, priority from extraction confidence.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::artifacts::ExtractedActionItem;
use crate::db::{
    ActionItemRepository, AttendeeRepository, MeetingRecord, NewActionItem, UserRepository,
};
use crate::resolve::{parse_deadline, resolve_assignee, Assignment, DirectoryUser, UserDirectory};

/// Priority from extraction confidence: high-confidence items surface first.
fn priority_from_confidence(confidence: Option<f64>) -> i64 {
    match confidence {
        Some(c) if c > 0.8 => 3,
        Some(c) if c > 0.5 => 2,
        Some(_) => 1,
        None => 2,
    }
}

/// Materialize `items` for `meeting`. Returns the ids of the created rows;
/// any single failure aborts the whole batch.
pub fn materialize_action_items(
    conn: &Connection,
    meeting: &MeetingRecord,
    items: &[ExtractedActionItem],
    today: NaiveDate,
) -> Result<Vec<String>> {
    if items.is_empty() {
        info!("No action items extracted for meeting {}", meeting.id);
        return Ok(Vec::new());
    }

    let directory = build_directory(conn, meeting, items)
        .context("Failed to build assignee directory")?;

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let assignment = item
            .assigned_to
            .as_deref()
            .map(|raw| resolve_assignee(raw, &directory))
            .unwrap_or(Assignment::Unassigned);

        let (assigned_user_id, assigned_email) = match assignment {
            Assignment::User(id) => {
                debug!("Action item assigned to user {}", id);
                (Some(id), None)
            }
            Assignment::Email(email) => {
                debug!("Action item assigned to external {}", email);
                (None, Some(email))
            }
            Assignment::Unassigned => (None, None),
        };

        let deadline = item
            .deadline
            .as_deref()
            .and_then(|raw| parse_deadline(raw, today))
            .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string());

        rows.push(NewActionItem {
            meeting_id: meeting.id.clone(),
            description: item.description.clone(),
            assigned_user_id,
            assigned_email,
            deadline,
            priority: priority_from_confidence(item.confidence),
        });
    }

    let ids = ActionItemRepository::insert_batch(conn, &rows)
        .context("Failed to persist action items")?;

    info!(
        "Created {} action items for meeting {}",
        ids.len(),
        meeting.id
    );
    Ok(ids)
}

/// Candidates for the resolver: a point lookup per distinct assignee string
/// plus the meeting's linked attendees.
fn build_directory(
    conn: &Connection,
    meeting: &MeetingRecord,
    items: &[ExtractedActionItem],
) -> Result<UserDirectory> {
    let mut registered = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for item in items {
        let Some(raw) = item.assigned_to.as_deref() else {
            continue;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        if let Some(user) = UserRepository::find_by_email(conn, trimmed)? {
            registered.push(DirectoryUser {
                id: user.id,
                name: user.name,
                email: user.email,
            });
        }
    }

    let attendees = AttendeeRepository::linked_users(conn, &meeting.id)?
        .into_iter()
        .map(|user| DirectoryUser {
            id: user.id,
            name: user.name,
            email: user.email,
        })
        .collect();

    Ok(UserDirectory::new(registered, attendees))
}
