//! Previous-meeting context assembly.
//!
//! Meetings that opt in carry a compact digest of their processed series
//! siblings into the extraction request, so the AI service can connect
//! recurring decisions and follow-ups across meetings.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

use crate::ai::{PreviousActionItem, PreviousContext, PreviousDecision, PreviousMeeting};
use crate::artifacts::ExtractionRepository;
use crate::db::{MeetingRecord, MeetingRepository, SeriesRepository};

/// Build the previous-context payload for `meeting`, or `None` when the
/// meeting opted out, has no series, or no processed siblings exist.
pub fn build_previous_context(
    conn: &Connection,
    meeting: &MeetingRecord,
    siblings_limit: usize,
) -> Result<Option<PreviousContext>> {
    if !meeting.use_previous_context {
        return Ok(None);
    }
    let Some(series_id) = meeting.series_id.as_deref() else {
        return Ok(None);
    };

    let series_title = SeriesRepository::get(conn, series_id)?
        .map(|series| series.title)
        .unwrap_or_default();

    let siblings = MeetingRepository::find_processed_in_series(conn, series_id, &meeting.id)?;
    if siblings.is_empty() {
        debug!("No processed siblings in series {} for context", series_id);
        return Ok(None);
    }

    let total_previous_meetings = siblings.len();

    // Siblings without an extraction are skipped silently.
    let mut previous_meetings = Vec::new();
    for sibling in siblings.into_iter().take(siblings_limit) {
        let Some(extraction) = ExtractionRepository::find_by_meeting(conn, &sibling.id)? else {
            continue;
        };

        let data = extraction.extracted_data;
        previous_meetings.push(PreviousMeeting {
            meeting_id: sibling.id,
            title: sibling.title,
            date: sibling.scheduled_time,
            decisions: data
                .decisions
                .into_iter()
                .map(|decision| PreviousDecision {
                    topic: decision.topic,
                    decision: decision.decision,
                })
                .collect(),
            action_items: data
                .action_items
                .into_iter()
                .map(|item| PreviousActionItem {
                    description: item.description,
                    assigned_to: item.assigned_to,
                    status: "previous".to_string(),
                })
                .collect(),
        });
    }

    debug!(
        "Assembled context from {} of {} previous meetings",
        previous_meetings.len(),
        total_previous_meetings
    );

    Ok(Some(PreviousContext {
        previous_meetings,
        total_previous_meetings,
        series_title,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{
        ExtractedActionItem, ExtractedData, ExtractedDecision, ExtractionPayload,
    };
    use crate::db::{open_in_memory, MeetingStatus, NewMeeting, UserRepository};

    struct Fixture {
        conn: Connection,
        series_id: String,
        owner_id: String,
    }

    fn fixture() -> Fixture {
        let conn = open_in_memory();
        let owner_id = UserRepository::insert(&conn, "owner@example.com", "Owner").unwrap();
        let series_id =
            SeriesRepository::insert(&conn, "Weekly sync", None, &owner_id).unwrap();
        Fixture {
            conn,
            series_id,
            owner_id,
        }
    }

    fn add_meeting(fx: &Fixture, title: &str, time: &str, use_context: bool) -> MeetingRecord {
        let id = MeetingRepository::insert(
            &fx.conn,
            &NewMeeting {
                title: title.to_string(),
                owner_id: fx.owner_id.clone(),
                series_id: Some(fx.series_id.clone()),
                scheduled_time: Some(time.to_string()),
                use_previous_context: use_context,
                ..Default::default()
            },
        )
        .unwrap();
        MeetingRepository::get(&fx.conn, &id).unwrap().unwrap()
    }

    fn mark_processed(fx: &Fixture, meeting_id: &str) {
        MeetingRepository::claim_for_processing(&fx.conn, meeting_id).unwrap();
        MeetingRepository::finish(&fx.conn, meeting_id, MeetingStatus::Processed).unwrap();
    }

    fn add_extraction(fx: &Fixture, meeting_id: &str, topic: &str) {
        ExtractionRepository::upsert(
            &fx.conn,
            meeting_id,
            &ExtractionPayload {
                extracted_data: ExtractedData {
                    decisions: vec![ExtractedDecision {
                        topic: topic.to_string(),
                        decision: format!("decided about {topic}"),
                        context: None,
                        confidence: Some(0.9),
                    }],
                    action_items: vec![ExtractedActionItem {
                        description: "carry over".to_string(),
                        assigned_to: Some("bob@example.com".to_string()),
                        deadline: None,
                        confidence: None,
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_opted_out_meeting_gets_no_context() {
        let fx = fixture();
        let current = add_meeting(&fx, "Current", "2025-01-20T10:00:00", false);
        assert!(build_previous_context(&fx.conn, &current, 3).unwrap().is_none());
    }

    #[test]
    fn test_meeting_without_series_gets_no_context() {
        let fx = fixture();
        let id = MeetingRepository::insert(
            &fx.conn,
            &NewMeeting {
                title: "Standalone".to_string(),
                owner_id: fx.owner_id.clone(),
                use_previous_context: true,
                ..Default::default()
            },
        )
        .unwrap();
        let meeting = MeetingRepository::get(&fx.conn, &id).unwrap().unwrap();
        assert!(build_previous_context(&fx.conn, &meeting, 3).unwrap().is_none());
    }

    #[test]
    fn test_context_is_newest_first_and_capped() {
        let fx = fixture();
        for (i, time) in [
            "2025-01-06T10:00:00",
            "2025-01-13T10:00:00",
            "2025-01-20T10:00:00",
            "2025-01-27T10:00:00",
        ]
        .iter()
        .enumerate()
        {
            let meeting = add_meeting(&fx, &format!("Sync {i}"), time, false);
            mark_processed(&fx, &meeting.id);
            add_extraction(&fx, &meeting.id, &format!("topic-{i}"));
        }

        let current = add_meeting(&fx, "Current", "2025-02-03T10:00:00", true);
        let context = build_previous_context(&fx.conn, &current, 3)
            .unwrap()
            .unwrap();

        assert_eq!(context.series_title, "Weekly sync");
        assert_eq!(context.total_previous_meetings, 4);
        assert_eq!(context.previous_meetings.len(), 3);
        assert_eq!(context.previous_meetings[0].title, "Sync 3");
        assert_eq!(context.previous_meetings[2].title, "Sync 1");
        assert_eq!(
            context.previous_meetings[0].action_items[0].status,
            "previous"
        );
    }

    #[test]
    fn test_sibling_without_extraction_is_skipped() {
        let fx = fixture();
        let processed = add_meeting(&fx, "Has extraction", "2025-01-06T10:00:00", false);
        mark_processed(&fx, &processed.id);
        add_extraction(&fx, &processed.id, "roadmap");

        let bare = add_meeting(&fx, "No extraction", "2025-01-13T10:00:00", false);
        mark_processed(&fx, &bare.id);

        let current = add_meeting(&fx, "Current", "2025-01-20T10:00:00", true);
        let context = build_previous_context(&fx.conn, &current, 3)
            .unwrap()
            .unwrap();

        assert_eq!(context.total_previous_meetings, 2);
        assert_eq!(context.previous_meetings.len(), 1);
        assert_eq!(context.previous_meetings[0].title, "Has extraction");
    }

    #[test]
    fn test_no_processed_siblings_yields_none() {
        let fx = fixture();
        // A DRAFT sibling does not count.
        add_meeting(&fx, "Draft", "2025-01-06T10:00:00", false);
        let current = add_meeting(&fx, "Current", "2025-01-13T10:00:00", true);
        assert!(build_previous_context(&fx.conn, &current, 3).unwrap().is_none());
    }
}
