//! HTTP client for the external transcription / extraction service.
//!
//! A call succeeds iff the HTTP status is 2xx AND the body reports
//! `success: true`. Failures are classified so the retry wrapper knows what
//! is worth another attempt: transport errors and 5xx are retriable, 4xx is
//! not.

use anyhow::Context as _;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod types;

pub use types::{
    AgendaItemPayload, ExtractionRequest, ExtractionResponse, PreviousActionItem,
    PreviousContext, PreviousDecision, PreviousMeeting, TranscriptionResponse,
};

use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    /// Service unreachable, 5xx, or an unsuccessful response body.
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service rejected the request itself; retrying cannot help.
    #[error("AI service rejected request: {0}")]
    BadRequest(String),

    /// The caller cancelled between attempts.
    #[error("AI call cancelled")]
    Cancelled,
}

impl AiError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

/// The external speech-to-text and information-extraction service.
#[async_trait]
pub trait AiService: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        meeting_id: &str,
    ) -> Result<TranscriptionResponse, AiError>;

    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionResponse, AiError>;

    async fn health(&self) -> bool;
}

pub struct HttpAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAiClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build AI service HTTP client")?;

        info!("AI service client pointed at {}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> AiError {
        if status.is_client_error() {
            AiError::BadRequest(format!("status {}: {}", status, body))
        } else {
            AiError::ServiceUnavailable(format!("status {}: {}", status, body))
        }
    }
}

#[async_trait]
impl AiService for HttpAiClient {
    async fn transcribe(
        &self,
        audio_path: &Path,
        meeting_id: &str,
    ) -> Result<TranscriptionResponse, AiError> {
        info!("Sending transcription request for meeting {}", meeting_id);

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| AiError::BadRequest(format!("audio file unreadable: {e}")))?;

        let filename = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            )
            .text("meeting_id", meeting_id.to_string())
            .text("language", "en");

        let url = format!("{}/ai/transcribe", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AiError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::ServiceUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::ServiceUnavailable(format!("malformed response: {e}")))?;

        if !parsed.success {
            return Err(AiError::ServiceUnavailable(
                "transcription reported success=false".to_string(),
            ));
        }

        info!(
            "Transcription succeeded for meeting {}: {} chars",
            meeting_id,
            parsed.raw_text.len()
        );
        Ok(parsed)
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, AiError> {
        info!(
            "Sending extraction request for meeting {} ({} transcript chars)",
            request.meeting_id,
            request.transcript_text.len()
        );

        let url = format!("{}/ai/extract", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AiError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::ServiceUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body));
        }

        let parsed: ExtractionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::ServiceUnavailable(format!("malformed response: {e}")))?;

        if !parsed.success {
            return Err(AiError::ServiceUnavailable(
                "extraction reported success=false".to_string(),
            ));
        }

        info!("Extraction succeeded for meeting {}", request.meeting_id);
        Ok(parsed)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/ai/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("AI service health check failed: {}", e);
                false
            }
        }
    }
}

/// Retry an AI call with exponential backoff: delays of 1s, 2s between the
/// (at most) three attempts by default. Only retriable failures are retried.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AiError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = initial_backoff;

    for attempt in 1..=max_attempts {
        debug!("{} attempt {}/{}", label, attempt, max_attempts);
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < max_attempts => {
                warn!(
                    "{} attempt {}/{} failed, retrying in {:?}: {}",
                    label, attempt, max_attempts, backoff, err
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop returns on the last attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config(base_url: &str) -> AiConfig {
        AiConfig {
            base_url: base_url.to_string(),
            timeout_ms: 5_000,
            connect_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_transcribe_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ai/transcribe")
            .with_status(200)
            .with_body(
                r#"{"success": true, "raw_text": "hello team", "confidence_score": 0.9}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"fake-audio").unwrap();

        let client = HttpAiClient::new(&test_config(&server.url())).unwrap();
        let response = client.transcribe(&audio, "m-1").await.unwrap();

        assert_eq!(response.raw_text, "hello team");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transcribe_unsuccessful_body_is_retriable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ai/transcribe")
            .with_status(200)
            .with_body(r#"{"success": false}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"fake-audio").unwrap();

        let client = HttpAiClient::new(&test_config(&server.url())).unwrap();
        let err = client.transcribe(&audio, "m-1").await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_extract_bad_request_not_retriable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ai/extract")
            .with_status(422)
            .with_body("transcript_text is required")
            .create_async()
            .await;

        let client = HttpAiClient::new(&test_config(&server.url())).unwrap();
        let request = ExtractionRequest {
            transcript_text: String::new(),
            meeting_id: "m-1".to_string(),
            agenda_items: Vec::new(),
            previous_context: None,
        };

        let err = client.extract(&request).await.unwrap_err();
        assert!(matches!(err, AiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ai/health")
            .with_status(200)
            .create_async()
            .await;

        let client = HttpAiClient::new(&test_config(&server.url())).unwrap();
        assert!(client.health().await);
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let client = HttpAiClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        assert!(!client.health().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_flaky_service() {
        let calls = AtomicU32::new(0);
        let result = with_retry("transcription", 3, Duration::from_millis(10), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(AiError::ServiceUnavailable("503".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry("extraction", 3, Duration::from_millis(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AiError::ServiceUnavailable("503".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_bad_requests() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry("extraction", 3, Duration::from_millis(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AiError::BadRequest("missing field".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(AiError::BadRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
