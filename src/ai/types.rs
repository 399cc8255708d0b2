//! Wire types for the transcription / extraction service.

use serde::{Deserialize, Serialize};

use crate::artifacts::{ExtractedData, TranscriptPayload, WordTimestamp};

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResponse {
    pub success: bool,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub word_timestamps: Vec<WordTimestamp>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub device_used: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
}

impl From<TranscriptionResponse> for TranscriptPayload {
    fn from(response: TranscriptionResponse) -> Self {
        Self {
            raw_text: response.raw_text,
            word_timestamps: response.word_timestamps,
            processing_time_secs: response.processing_time,
            audio_duration_secs: response.audio_duration,
            confidence_score: response.confidence_score,
            language: response.language,
            device_used: response.device_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    pub transcript_text: String,
    pub meeting_id: String,
    pub agenda_items: Vec<AgendaItemPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_context: Option<PreviousContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgendaItemPayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "estimatedDuration")]
    pub estimated_duration: Option<i64>,
}

/// Compact context assembled from earlier meetings in the same series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousContext {
    pub previous_meetings: Vec<PreviousMeeting>,
    pub total_previous_meetings: usize,
    pub series_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousMeeting {
    pub meeting_id: String,
    pub title: String,
    pub date: Option<String>,
    #[serde(default)]
    pub decisions: Vec<PreviousDecision>,
    #[serde(default)]
    pub action_items: Vec<PreviousActionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousDecision {
    pub topic: String,
    pub decision: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousActionItem {
    pub description: String,
    pub assigned_to: Option<String>,
    /// Always "previous": marks the item as carried over, not current.
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    pub success: bool,
    #[serde(default)]
    pub extracted_data: ExtractedData,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_response_parses_service_shape() {
        let json = r#"{
            "success": true,
            "raw_text": "Alice will deliver the report by 2025-02-01.",
            "word_timestamps": [
                {"word": "Alice", "startTime": 0.0, "endTime": 0.5, "confidence": 0.99}
            ],
            "processing_time": 4.1,
            "audio_duration": 62.0,
            "confidence_score": 0.97,
            "language": "en",
            "device_used": "cuda",
            "meeting_id": "m-1"
        }"#;

        let response: TranscriptionResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.word_timestamps[0].word, "Alice");
        assert_eq!(response.word_timestamps[0].start_time, 0.0);

        let payload: TranscriptPayload = response.into();
        assert_eq!(payload.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_extraction_request_wire_format() {
        let request = ExtractionRequest {
            transcript_text: "notes".to_string(),
            meeting_id: "m-1".to_string(),
            agenda_items: vec![AgendaItemPayload {
                title: "Intro".to_string(),
                description: None,
                estimated_duration: Some(5),
            }],
            previous_context: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["agenda_items"][0]["estimatedDuration"], 5);
        // Absent context is omitted, not null.
        assert!(json.get("previous_context").is_none());
    }

    #[test]
    fn test_previous_context_roundtrip_is_stable() {
        let context = PreviousContext {
            previous_meetings: vec![PreviousMeeting {
                meeting_id: "m-0".to_string(),
                title: "Kickoff".to_string(),
                date: Some("2025-01-06T10:00:00".to_string()),
                decisions: vec![PreviousDecision {
                    topic: "scope".to_string(),
                    decision: "phase one only".to_string(),
                }],
                action_items: vec![PreviousActionItem {
                    description: "set up repo".to_string(),
                    assigned_to: Some("bob@example.com".to_string()),
                    status: "previous".to_string(),
                }],
            }],
            total_previous_meetings: 1,
            series_title: "Weekly sync".to_string(),
        };

        let json = serde_json::to_string(&context).unwrap();
        let parsed: PreviousContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, context);
    }
}
