//! Processing error taxonomy.
//!
//! Preconditions (`Validation`, `NotFound`, `AccessDenied`, `AlreadyRunning`)
//! are raised synchronously before the background run is scheduled. Everything
//! else surfaces through the progress topic and the status query.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A precondition was violated (no audio, wrong status, bad input).
    #[error("{0}")]
    Validation(String),

    /// The meeting does not exist.
    #[error("meeting not found")]
    NotFound,

    /// The caller may not act on this meeting.
    #[error("access denied to this meeting")]
    AccessDenied,

    /// Another invocation already moved the meeting into PROCESSING.
    #[error("meeting is already being processed")]
    AlreadyRunning,

    /// External AI service unreachable or unsuccessful after retries.
    #[error("AI service unavailable during {step}: {message}")]
    ServiceUnavailable { step: &'static str, message: String },

    /// An internal stage's invariant was violated.
    #[error("processing failed during {step}: {message}")]
    Processing { step: &'static str, message: String },

    /// Operator cancellation observed at a stage boundary.
    #[error("processing was cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProcessingError {
    pub fn stage(step: &'static str, message: impl Into<String>) -> Self {
        Self::Processing {
            step,
            message: message.into(),
        }
    }

    /// Step label carried into the PROCESSING_ERROR event.
    pub fn failed_step(&self) -> &'static str {
        match self {
            Self::Processing { step, .. } | Self::ServiceUnavailable { step, .. } => step,
            Self::Cancelled => "CANCELLED",
            _ => "FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_carries_step() {
        let err = ProcessingError::stage("TRANSCRIBING", "empty transcript");
        assert_eq!(err.failed_step(), "TRANSCRIBING");
        assert!(err.to_string().contains("TRANSCRIBING"));
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = ProcessingError::Validation("no audio file".to_string());
        assert_eq!(err.to_string(), "no audio file");
    }

    #[test]
    fn test_service_unavailable_names_the_stage() {
        let err = ProcessingError::ServiceUnavailable {
            step: "EXTRACTING",
            message: "503 after 3 attempts".to_string(),
        };
        assert_eq!(err.failed_step(), "EXTRACTING");
    }
}
