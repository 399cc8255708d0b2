//! Progress fan-out over per-meeting broadcast topics.
//!
//! Every event is a full snapshot, so subscribers that miss or re-receive
//! one lose nothing; reconnecting clients get authoritative state from the
//! status query instead.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::MeetingStatus;

const TOPIC_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    ProcessingUpdate {
        meeting_id: String,
        status: MeetingStatus,
        progress: u8,
        current_step: String,
        message: String,
        timestamp: String,
        estimated_completion: String,
    },
    ProcessingComplete {
        meeting_id: String,
        status: MeetingStatus,
        progress: u8,
        current_step: String,
        message: String,
        document_url: Option<String>,
        action_items_created: i64,
        timestamp: String,
    },
    ProcessingError {
        meeting_id: String,
        status: MeetingStatus,
        progress: u8,
        current_step: String,
        message: String,
        timestamp: String,
    },
}

impl ProgressEvent {
    pub fn progress(&self) -> u8 {
        match self {
            Self::ProcessingUpdate { progress, .. }
            | Self::ProcessingComplete { progress, .. }
            | Self::ProcessingError { progress, .. } => *progress,
        }
    }

    pub fn meeting_id(&self) -> &str {
        match self {
            Self::ProcessingUpdate { meeting_id, .. }
            | Self::ProcessingComplete { meeting_id, .. }
            | Self::ProcessingError { meeting_id, .. } => meeting_id,
        }
    }
}

/// Per-meeting pub/sub topics carrying [`ProgressEvent`]s.
pub struct ProgressBus {
    topic_prefix: String,
    topics: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn topic_for(&self, meeting_id: &str) -> String {
        format!("{}{}/processing", self.topic_prefix, meeting_id)
    }

    pub fn subscribe(&self, meeting_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut topics = self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(meeting_id.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub fn update(
        &self,
        meeting_id: &str,
        status: MeetingStatus,
        progress: u8,
        current_step: &str,
        message: &str,
    ) {
        let now = Utc::now();
        self.send(
            meeting_id,
            ProgressEvent::ProcessingUpdate {
                meeting_id: meeting_id.to_string(),
                status,
                progress,
                current_step: current_step.to_string(),
                message: message.to_string(),
                timestamp: format_time(now),
                estimated_completion: format_time(now + estimated_remaining(progress)),
            },
        );
        debug!(
            "Progress update for meeting {}: {}% - {}",
            meeting_id, progress, current_step
        );
    }

    pub fn complete(&self, meeting_id: &str, document_url: Option<String>, action_items: i64) {
        self.send(
            meeting_id,
            ProgressEvent::ProcessingComplete {
                meeting_id: meeting_id.to_string(),
                status: MeetingStatus::Processed,
                progress: 100,
                current_step: "COMPLETE".to_string(),
                message: "Meeting processing completed successfully".to_string(),
                document_url,
                action_items_created: action_items,
                timestamp: format_time(Utc::now()),
            },
        );
        self.drop_topic(meeting_id);
    }

    pub fn error(&self, meeting_id: &str, current_step: &str, message: &str) {
        self.send(
            meeting_id,
            ProgressEvent::ProcessingError {
                meeting_id: meeting_id.to_string(),
                status: MeetingStatus::Failed,
                progress: 0,
                current_step: current_step.to_string(),
                message: message.to_string(),
                timestamp: format_time(Utc::now()),
            },
        );
        self.drop_topic(meeting_id);
    }

    fn send(&self, meeting_id: &str, event: ProgressEvent) {
        let mut topics = self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = topics
            .entry(meeting_id.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
        // No subscribers is fine; the event is a snapshot, not a handoff.
        let _ = sender.send(event);
    }

    fn drop_topic(&self, meeting_id: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        topics.remove(meeting_id);
    }
}

/// Remaining time estimate: a full run is budgeted at 30 seconds, scaled by
/// the share of progress still outstanding (rounded up to a whole second).
fn estimated_remaining(progress: u8) -> chrono::Duration {
    let remaining = 100u64.saturating_sub(progress as u64);
    let seconds = (remaining * 30).div_ceil(100);
    chrono::Duration::seconds(seconds as i64)
}

fn format_time(time: chrono::DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name() {
        let bus = ProgressBus::new("/topic/meetings/");
        assert_eq!(bus.topic_for("m-1"), "/topic/meetings/m-1/processing");
    }

    #[tokio::test]
    async fn test_subscriber_receives_updates_in_order() {
        let bus = ProgressBus::new("/topic/meetings/");
        let mut rx = bus.subscribe("m-1");

        bus.update(
            "m-1",
            MeetingStatus::Processing,
            10,
            "PREPARING",
            "Starting audio processing pipeline",
        );
        bus.update(
            "m-1",
            MeetingStatus::Processing,
            25,
            "TRANSCRIBING",
            "Converting audio to text",
        );

        assert_eq!(rx.recv().await.unwrap().progress(), 10);
        assert_eq!(rx.recv().await.unwrap().progress(), 25);
    }

    #[tokio::test]
    async fn test_topics_are_isolated_per_meeting() {
        let bus = ProgressBus::new("/topic/meetings/");
        let mut rx_other = bus.subscribe("m-2");

        bus.update(
            "m-1",
            MeetingStatus::Processing,
            10,
            "PREPARING",
            "starting",
        );

        assert!(matches!(
            rx_other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_complete_event_shape() {
        let bus = ProgressBus::new("/topic/meetings/");
        let mut rx = bus.subscribe("m-1");

        bus.complete("m-1", Some("/meetings/m-1/documents/d-1/download".into()), 4);

        match rx.recv().await.unwrap() {
            ProgressEvent::ProcessingComplete {
                progress,
                current_step,
                action_items_created,
                document_url,
                ..
            } => {
                assert_eq!(progress, 100);
                assert_eq!(current_step, "COMPLETE");
                assert_eq!(action_items_created, 4);
                assert!(document_url.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_event_resets_progress() {
        let bus = ProgressBus::new("/topic/meetings/");
        let mut rx = bus.subscribe("m-1");

        bus.error("m-1", "EXTRACTING", "AI extraction was not successful");

        match rx.recv().await.unwrap() {
            ProgressEvent::ProcessingError {
                progress,
                current_step,
                ..
            } => {
                assert_eq!(progress, 0);
                assert_eq!(current_step, "EXTRACTING");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_estimated_remaining_rounds_up() {
        assert_eq!(estimated_remaining(0).num_seconds(), 30);
        assert_eq!(estimated_remaining(90).num_seconds(), 3);
        assert_eq!(estimated_remaining(99).num_seconds(), 1);
        assert_eq!(estimated_remaining(100).num_seconds(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ProgressEvent::ProcessingUpdate {
            meeting_id: "m-1".to_string(),
            status: MeetingStatus::Processing,
            progress: 50,
            current_step: "EXTRACTING".to_string(),
            message: "Analyzing content".to_string(),
            timestamp: "2025-01-15T10:00:00".to_string(),
            estimated_completion: "2025-01-15T10:00:15".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PROCESSING_UPDATE");
        assert_eq!(json["status"], "PROCESSING");
        assert_eq!(json["progress"], 50);
    }
}
