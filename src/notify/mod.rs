//! Completion notification collaborator.
//!
//! Email templating and delivery live outside this service; the pipeline
//! only fires a notification after finalize. Failures never affect the
//! meeting's terminal state.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::db::{MeetingRecord, UserRecord};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_processing_complete(
        &self,
        user: &UserRecord,
        meeting: &MeetingRecord,
    ) -> Result<()>;
}

/// Default notifier: records the event in the structured log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_processing_complete(
        &self,
        user: &UserRecord,
        meeting: &MeetingRecord,
    ) -> Result<()> {
        info!(
            "Processing complete notification for {} <{}>: meeting {} ({})",
            user.name, user.email, meeting.id, meeting.title
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MeetingStatus;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let user = UserRecord {
            id: "u-1".to_string(),
            email: "owner@example.com".to_string(),
            name: "Owner".to_string(),
            created_at: "2025-01-01T00:00:00".to_string(),
        };
        let meeting = MeetingRecord {
            id: "m-1".to_string(),
            title: "Sync".to_string(),
            description: None,
            owner_id: "u-1".to_string(),
            series_id: None,
            status: MeetingStatus::Processed,
            audio_path: None,
            scheduled_time: None,
            actual_start_time: None,
            actual_end_time: None,
            agenda: None,
            use_previous_context: false,
            created_at: "2025-01-01T00:00:00".to_string(),
            updated_at: "2025-01-01T00:00:00".to_string(),
        };

        assert!(LogNotifier
            .notify_processing_complete(&user, &meeting)
            .await
            .is_ok());
    }
}
