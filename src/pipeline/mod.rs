//! Meeting processing pipeline.
//!
//! Drives a meeting from uploaded audio to generated minutes:
//! prepare → transcribe → extract → materialize → render → finalize.
//!
//! Each run is a background tokio task; pipelines for different meetings
//! interleave freely, stages within one meeting are strictly ordered. All
//! stage handoffs go through the stores, so a crash mid-run loses nothing
//! the status query cannot reconstruct. Cancellation is cooperative through
//! the persisted status flag: in-flight HTTP calls complete naturally and
//! the run stops at the next stage boundary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

pub mod context;
pub mod progress;
pub mod status;
pub mod tasks;

pub use progress::{ProgressBus, ProgressEvent};
pub use status::{processing_status, ProcessingStatus};

use crate::ai::{self, AgendaItemPayload, AiError, AiService, ExtractionRequest};
use crate::artifacts::{
    DocumentRepository, Extraction, ExtractionPayload, ExtractionRepository, Transcript,
    TranscriptPayload, TranscriptRepository,
};
use crate::config::{Config, PipelineConfig};
use crate::db::{
    ActionItemRepository, Db, MeetingRecord, MeetingRepository, MeetingStatus, UserRepository,
};
use crate::error::ProcessingError;
use crate::notify::Notifier;
use crate::render::MinutesRenderer;

pub struct ProcessingPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    db: Db,
    ai: Arc<dyn AiService>,
    renderer: Arc<dyn MinutesRenderer>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<ProgressBus>,
    config: PipelineConfig,
    max_audio_bytes: u64,
}

/// Handle to a spawned pipeline run. Completion is normally observed via the
/// progress topic or the status query; `wait` exists for callers that need
/// to block on the run (tests, CLI).
#[derive(Debug)]
pub struct PipelineHandle {
    join: tokio::task::JoinHandle<()>,
}

impl PipelineHandle {
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!("Pipeline task panicked: {}", e);
        }
    }
}

impl ProcessingPipeline {
    pub fn new(
        db: Db,
        ai: Arc<dyn AiService>,
        renderer: Arc<dyn MinutesRenderer>,
        notifier: Arc<dyn Notifier>,
        progress: Arc<ProgressBus>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                db,
                ai,
                renderer,
                notifier,
                progress,
                config: config.pipeline.clone(),
                max_audio_bytes: config.storage.max_audio_bytes,
            }),
        }
    }

    pub fn progress_bus(&self) -> Arc<ProgressBus> {
        self.inner.progress.clone()
    }

    /// Start processing a meeting. Precondition failures surface here,
    /// synchronously; everything after the claim is reported through the
    /// progress topic and the status query.
    pub async fn start(
        &self,
        meeting_id: &str,
        user_id: &str,
    ) -> Result<PipelineHandle, ProcessingError> {
        let meeting = self.load_meeting(meeting_id).await?;

        if meeting.owner_id != user_id {
            return Err(ProcessingError::AccessDenied);
        }
        if meeting.audio_path.is_none() {
            return Err(ProcessingError::Validation(
                "No audio file found for this meeting".to_string(),
            ));
        }

        // The claim doubles as the double-start fence: only one caller moves
        // the row out of DRAFT/FAILED.
        let id = meeting.id.clone();
        let claimed = self
            .inner
            .db
            .call(move |conn| MeetingRepository::claim_for_processing(conn, &id))
            .await?;

        if !claimed {
            let id = meeting.id.clone();
            let status = self
                .inner
                .db
                .call(move |conn| MeetingRepository::status(conn, &id))
                .await?;
            return Err(match status {
                Some(MeetingStatus::Processing) => ProcessingError::AlreadyRunning,
                Some(MeetingStatus::Processed) => ProcessingError::Validation(
                    "Meeting has already been processed".to_string(),
                ),
                _ => ProcessingError::AlreadyRunning,
            });
        }

        info!("Starting processing pipeline for meeting {}", meeting_id);

        let inner = self.inner.clone();
        let meeting_id = meeting.id.clone();
        let user_id = user_id.to_string();
        let join = tokio::spawn(async move {
            run_to_completion(inner, meeting_id, user_id).await;
        });

        Ok(PipelineHandle { join })
    }

    /// Cancel a running pipeline. The flag flips immediately; the background
    /// run notices at its next stage boundary. No error event is published
    /// for an explicit cancel.
    pub async fn cancel(&self, meeting_id: &str, user_id: &str) -> Result<(), ProcessingError> {
        let meeting = self.load_meeting(meeting_id).await?;

        if meeting.owner_id != user_id {
            return Err(ProcessingError::AccessDenied);
        }
        if meeting.status != MeetingStatus::Processing {
            return Err(ProcessingError::Validation(
                "Meeting is not currently processing".to_string(),
            ));
        }

        let id = meeting.id.clone();
        self.inner
            .db
            .call(move |conn| MeetingRepository::finish(conn, &id, MeetingStatus::Failed))
            .await?;

        info!("Processing cancelled for meeting {}", meeting_id);
        Ok(())
    }

    /// Re-run a failed meeting. Artifact upserts make the second pass land
    /// on the same rows.
    pub async fn retry(
        &self,
        meeting_id: &str,
        user_id: &str,
    ) -> Result<PipelineHandle, ProcessingError> {
        let meeting = self.load_meeting(meeting_id).await?;

        if meeting.owner_id != user_id {
            return Err(ProcessingError::AccessDenied);
        }
        if meeting.status != MeetingStatus::Failed {
            return Err(ProcessingError::Validation(
                "Only failed meetings can be retried".to_string(),
            ));
        }

        info!("Retrying processing for failed meeting {}", meeting_id);
        self.start(meeting_id, user_id).await
    }

    async fn load_meeting(&self, meeting_id: &str) -> Result<MeetingRecord, ProcessingError> {
        let id = meeting_id.to_string();
        self.inner
            .db
            .call(move |conn| MeetingRepository::get(conn, &id))
            .await?
            .ok_or(ProcessingError::NotFound)
    }
}

async fn run_to_completion(inner: Arc<PipelineInner>, meeting_id: String, user_id: String) {
    let audio_path = match run_pipeline(&inner, &meeting_id, &user_id).await {
        Ok(audio_path) => {
            info!("Processing pipeline completed for meeting {}", meeting_id);
            audio_path
        }
        Err((err, audio_path)) => {
            match &err {
                ProcessingError::Cancelled => {
                    // cancel() already flipped the status; stop quietly.
                    info!("Pipeline for meeting {} observed cancellation", meeting_id);
                }
                err => {
                    error!("Processing pipeline failed for meeting {}: {}", meeting_id, err);
                    let id = meeting_id.clone();
                    if let Err(db_err) = inner
                        .db
                        .call(move |conn| {
                            MeetingRepository::finish(conn, &id, MeetingStatus::Failed)
                        })
                        .await
                    {
                        error!("Failed to mark meeting {} as failed: {}", meeting_id, db_err);
                    }
                    inner.progress.error(
                        &meeting_id,
                        err.failed_step(),
                        &format!("Processing failed: {err}"),
                    );
                }
            }
            audio_path
        }
    };

    // Release the temp audio on success and failure paths alike.
    if let Some(path) = audio_path {
        cleanup_audio(&path).await;
    }
}

type StageFailure = (ProcessingError, Option<String>);

/// The staged run. Returns the audio path so the wrapper can release it; on
/// failure the path rides along with the error.
async fn run_pipeline(
    inner: &Arc<PipelineInner>,
    meeting_id: &str,
    user_id: &str,
) -> Result<Option<String>, StageFailure> {
    let meeting = load_meeting(inner, meeting_id)
        .await
        .map_err(|e| (e, None))?;
    let audio_path = meeting.audio_path.clone();

    let result = run_stages(inner, &meeting, user_id).await;
    match result {
        Ok(()) => Ok(audio_path),
        Err(err) => Err((err, audio_path)),
    }
}

async fn run_stages(
    inner: &Arc<PipelineInner>,
    meeting: &MeetingRecord,
    user_id: &str,
) -> Result<(), ProcessingError> {
    let meeting_id = &meeting.id;
    let audio_path = meeting
        .audio_path
        .as_deref()
        .ok_or_else(|| {
            ProcessingError::Validation("No audio file found for this meeting".to_string())
        })?
        .to_string();

    // --- Prepare ---------------------------------------------------------
    inner.progress.update(
        meeting_id,
        MeetingStatus::Processing,
        10,
        "PREPARING",
        "Starting audio processing pipeline",
    );
    let audio_meta = tokio::fs::metadata(&audio_path).await.map_err(|_| {
        ProcessingError::stage("PREPARING", format!("Audio file not found: {audio_path}"))
    })?;
    if audio_meta.len() > inner.max_audio_bytes {
        return Err(ProcessingError::stage(
            "PREPARING",
            format!(
                "Audio file exceeds the {} byte limit",
                inner.max_audio_bytes
            ),
        ));
    }

    // --- Transcribe ------------------------------------------------------
    ensure_still_processing(inner, meeting_id).await?;
    inner.progress.update(
        meeting_id,
        MeetingStatus::Processing,
        25,
        "TRANSCRIBING",
        "Converting audio to text using AI",
    );
    let transcript = transcribe(inner, meeting_id, &audio_path).await?;
    info!(
        "Transcription stored for meeting {}: {} chars",
        meeting_id,
        transcript.raw_text.len()
    );

    // --- Extract ---------------------------------------------------------
    ensure_still_processing(inner, meeting_id).await?;
    inner.progress.update(
        meeting_id,
        MeetingStatus::Processing,
        50,
        "EXTRACTING",
        "Analyzing content and extracting key information",
    );
    let extraction = extract(inner, meeting, &transcript).await?;
    info!("Extraction stored for meeting {}", meeting_id);

    // --- Materialize -----------------------------------------------------
    ensure_still_processing(inner, meeting_id).await?;
    inner.progress.update(
        meeting_id,
        MeetingStatus::Processing,
        75,
        "CREATING_TASKS",
        "Generating action items and assignments",
    );
    materialize(inner, meeting, &extraction).await?;

    // --- Render ----------------------------------------------------------
    ensure_still_processing(inner, meeting_id).await?;
    inner.progress.update(
        meeting_id,
        MeetingStatus::Processing,
        90,
        "GENERATING_DOCUMENTS",
        "Creating PDF and DOCX minutes",
    );
    render_documents(inner, meeting, &extraction, user_id).await?;

    // --- Finalize --------------------------------------------------------
    ensure_still_processing(inner, meeting_id).await?;
    finalize(inner, meeting, user_id).await
}

async fn transcribe(
    inner: &Arc<PipelineInner>,
    meeting_id: &str,
    audio_path: &str,
) -> Result<Transcript, ProcessingError> {
    let response = ai::with_retry(
        "transcription",
        inner.config.max_retry_attempts,
        Duration::from_millis(inner.config.initial_backoff_ms),
        || {
            inner
                .ai
                .transcribe(Path::new(audio_path), meeting_id)
        },
    )
    .await
    .map_err(|e| map_ai_error(e, "TRANSCRIBING"))?;

    if response.raw_text.trim().is_empty() {
        return Err(ProcessingError::stage(
            "TRANSCRIBING",
            "Transcription produced empty text",
        ));
    }
    if response.raw_text.len() < 10 {
        warn!(
            "Transcription for meeting {} seems very short: {} characters",
            meeting_id,
            response.raw_text.len()
        );
    }

    let payload: TranscriptPayload = response.into();
    let id = meeting_id.to_string();
    inner
        .db
        .call(move |conn| TranscriptRepository::upsert(conn, &id, &payload))
        .await
        .map_err(ProcessingError::Internal)
}

async fn extract(
    inner: &Arc<PipelineInner>,
    meeting: &MeetingRecord,
    transcript: &Transcript,
) -> Result<Extraction, ProcessingError> {
    let meeting_for_context = meeting.clone();
    let siblings_limit = inner.config.context_siblings_limit;
    let (agenda_items, previous_context) = inner
        .db
        .call(move |conn| {
            let agenda =
                MeetingRepository::agenda_items(conn, &meeting_for_context.id)?;
            let context = context::build_previous_context(
                conn,
                &meeting_for_context,
                siblings_limit,
            )?;
            Ok((agenda, context))
        })
        .await
        .map_err(ProcessingError::Internal)?;

    let request = ExtractionRequest {
        transcript_text: transcript.raw_text.clone(),
        meeting_id: meeting.id.clone(),
        agenda_items: agenda_items
            .into_iter()
            .map(|item| AgendaItemPayload {
                title: item.title,
                description: item.description,
                estimated_duration: item.estimated_duration_minutes,
            })
            .collect(),
        previous_context,
    };

    let response = ai::with_retry(
        "extraction",
        inner.config.max_retry_attempts,
        Duration::from_millis(inner.config.initial_backoff_ms),
        || inner.ai.extract(&request),
    )
    .await
    .map_err(|e| map_ai_error(e, "EXTRACTING"))?;

    let payload = ExtractionPayload {
        extracted_data: response.extracted_data,
        model_version: response.model_version,
        processing_time_secs: response.processing_time,
        confidence_score: response.confidence_score,
    };
    let id = meeting.id.clone();
    inner
        .db
        .call(move |conn| ExtractionRepository::upsert(conn, &id, &payload))
        .await
        .map_err(ProcessingError::Internal)
}

async fn materialize(
    inner: &Arc<PipelineInner>,
    meeting: &MeetingRecord,
    extraction: &Extraction,
) -> Result<(), ProcessingError> {
    let meeting = meeting.clone();
    let items = extraction.extracted_data.action_items.clone();
    let today = chrono::Local::now().date_naive();
    inner
        .db
        .call(move |conn| tasks::materialize_action_items(conn, &meeting, &items, today))
        .await
        .map_err(|e| ProcessingError::stage("CREATING_TASKS", e.to_string()))?;
    Ok(())
}

async fn render_documents(
    inner: &Arc<PipelineInner>,
    meeting: &MeetingRecord,
    extraction: &Extraction,
    user_id: &str,
) -> Result<(), ProcessingError> {
    let pdf = inner
        .renderer
        .render_pdf(meeting, extraction, user_id)
        .await
        .map_err(|e| {
            ProcessingError::stage("GENERATING_DOCUMENTS", format!("PDF generation failed: {e}"))
        })?;
    let docx = inner
        .renderer
        .render_docx(meeting, extraction, user_id)
        .await
        .map_err(|e| {
            ProcessingError::stage(
                "GENERATING_DOCUMENTS",
                format!("DOCX generation failed: {e}"),
            )
        })?;

    info!(
        "Minutes generated for meeting {} - PDF blob {}, DOCX blob {}",
        meeting.id, pdf, docx
    );
    Ok(())
}

async fn finalize(
    inner: &Arc<PipelineInner>,
    meeting: &MeetingRecord,
    user_id: &str,
) -> Result<(), ProcessingError> {
    let id = meeting.id.clone();
    let (document_url, action_items) = inner
        .db
        .call(move |conn| {
            MeetingRepository::finish(conn, &id, MeetingStatus::Processed)?;
            let url = DocumentRepository::url_for_latest(conn, &id)?;
            let count = ActionItemRepository::count_for_meeting(conn, &id)?;
            Ok((url, count))
        })
        .await
        .map_err(ProcessingError::Internal)?;

    inner
        .progress
        .complete(&meeting.id, document_url, action_items);

    // Fire-and-forget: a notification failure never fails the pipeline.
    let owner_id = user_id.to_string();
    let owner = inner
        .db
        .call(move |conn| UserRepository::get(conn, &owner_id))
        .await;
    match owner {
        Ok(Some(owner)) => {
            if let Err(e) = inner
                .notifier
                .notify_processing_complete(&owner, meeting)
                .await
            {
                warn!("Completion notification failed for meeting {}: {}", meeting.id, e);
            }
        }
        Ok(None) => warn!("Owner {} not found for completion notification", user_id),
        Err(e) => warn!("Failed to load owner for notification: {}", e),
    }

    Ok(())
}

/// Cancellation fence at stage entry: stop when the meeting left PROCESSING.
async fn ensure_still_processing(
    inner: &Arc<PipelineInner>,
    meeting_id: &str,
) -> Result<(), ProcessingError> {
    let id = meeting_id.to_string();
    let status = inner
        .db
        .call(move |conn| MeetingRepository::status(conn, &id))
        .await
        .map_err(ProcessingError::Internal)?;

    match status {
        Some(MeetingStatus::Processing) => Ok(()),
        _ => Err(ProcessingError::Cancelled),
    }
}

async fn load_meeting(
    inner: &Arc<PipelineInner>,
    meeting_id: &str,
) -> Result<MeetingRecord, ProcessingError> {
    let id = meeting_id.to_string();
    inner
        .db
        .call(move |conn| MeetingRepository::get(conn, &id))
        .await
        .map_err(ProcessingError::Internal)?
        .ok_or(ProcessingError::NotFound)
}

fn map_ai_error(err: AiError, step: &'static str) -> ProcessingError {
    match err {
        AiError::ServiceUnavailable(message) => {
            ProcessingError::ServiceUnavailable { step, message }
        }
        AiError::BadRequest(message) => ProcessingError::Processing {
            step,
            message,
        },
        AiError::Cancelled => ProcessingError::Cancelled,
    }
}

async fn cleanup_audio(audio_path: &str) {
    match tokio::fs::remove_file(audio_path).await {
        Ok(()) => info!("Released temp audio file {}", audio_path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to release temp audio file {}: {}", audio_path, e),
    }
}
