//! Service wiring.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::ai::{AiService, HttpAiClient};
use crate::api::{ApiServer, AppState};
use crate::artifacts::BlobStore;
use crate::config::Config;
use crate::db::{Db, MeetingRepository};
use crate::notify::LogNotifier;
use crate::pipeline::{processing_status, ProcessingPipeline, ProgressBus};
use crate::render::PandocRenderer;

fn build_state(config: &Config) -> Result<AppState> {
    let db = Db::open_default()?;
    let blobs = BlobStore::open_default()?;
    std::fs::create_dir_all(config.temp_upload_dir()?)
        .context("Failed to create upload directory")?;

    let ai: Arc<dyn AiService> = Arc::new(HttpAiClient::new(&config.ai)?);
    let progress = Arc::new(ProgressBus::new(
        config.pipeline.progress_topic_prefix.clone(),
    ));
    let renderer = Arc::new(PandocRenderer::new(db.clone(), blobs.clone()));

    let pipeline = Arc::new(ProcessingPipeline::new(
        db.clone(),
        ai.clone(),
        renderer,
        Arc::new(LogNotifier),
        progress.clone(),
        config,
    ));

    Ok(AppState {
        db,
        blobs,
        pipeline,
        progress,
        ai,
    })
}

/// Run the API server until shutdown.
pub async fn run_service() -> Result<()> {
    info!("Starting minuted service");

    let config = Config::load()?;
    let state = build_state(&config)?;

    ApiServer::new(config.server.port, state).start().await
}

/// One-shot AI service health probe for the CLI.
pub async fn check_ai_health() -> Result<bool> {
    let config = Config::load()?;
    let client = HttpAiClient::new(&config.ai)?;
    Ok(client.health().await)
}

/// Run one meeting through the pipeline and wait for it to finish.
/// Used by the CLI; the server path detaches instead.
pub async fn process_meeting_once(meeting_id: &str, user_id: &str) -> Result<()> {
    let config = Config::load()?;
    let state = build_state(&config)?;

    let handle = state
        .pipeline
        .start(meeting_id, user_id)
        .await
        .with_context(|| format!("Failed to start processing for meeting {meeting_id}"))?;
    handle.wait().await;

    let id = meeting_id.to_string();
    let report = state
        .db
        .call(move |conn| {
            let meeting = MeetingRepository::get(conn, &id)?
                .context("Meeting disappeared during processing")?;
            processing_status(conn, &meeting)
        })
        .await?;

    println!(
        "{} {} ({}%) - {}",
        report.meeting_id,
        report.status.as_str(),
        report.progress,
        report.message
    );
    Ok(())
}

/// Print the persisted processing status of a meeting.
pub async fn print_status(meeting_id: &str) -> Result<()> {
    let db = Db::open_default()?;
    let id = meeting_id.to_string();
    let report = db
        .call(move |conn| {
            let Some(meeting) = MeetingRepository::get(conn, &id)? else {
                bail!("Meeting not found: {id}");
            };
            processing_status(conn, &meeting)
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
