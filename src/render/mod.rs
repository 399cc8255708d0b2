//! Minutes document rendering.
//!
//! The pipeline only depends on the [`MinutesRenderer`] trait: render the
//! minutes for a meeting, store the bytes as a blob, record the metadata
//! sidecar, hand back the blob id. The shipped implementation builds an HTML
//! document and shells out to pandoc for the PDF/DOCX conversion.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::artifacts::{
    BlobStore, DocumentFormat, DocumentRepository, Extraction,
};
use crate::db::{AttendeeRepository, Db, MeetingRecord, UserRecord, UserRepository};

#[async_trait]
pub trait MinutesRenderer: Send + Sync {
    /// Render PDF minutes; returns the stored blob id.
    async fn render_pdf(
        &self,
        meeting: &MeetingRecord,
        extraction: &Extraction,
        user_id: &str,
    ) -> Result<String>;

    /// Render DOCX minutes; returns the stored blob id.
    async fn render_docx(
        &self,
        meeting: &MeetingRecord,
        extraction: &Extraction,
        user_id: &str,
    ) -> Result<String>;
}

/// Renders minutes HTML and converts it with the pandoc binary.
pub struct PandocRenderer {
    db: Db,
    blobs: BlobStore,
}

impl PandocRenderer {
    pub fn new(db: Db, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    async fn render(
        &self,
        meeting: &MeetingRecord,
        extraction: &Extraction,
        user_id: &str,
        format: DocumentFormat,
    ) -> Result<String> {
        let pandoc = which::which("pandoc")
            .context("pandoc is required to render minutes but was not found on PATH")?;

        let meeting_id = meeting.id.clone();
        let user_id = user_id.to_string();
        let (attendees, version, generated_by) = self
            .db
            .call(move |conn| {
                let attendees = AttendeeRepository::linked_users(conn, &meeting_id)?;
                let version = DocumentRepository::next_version(conn, &meeting_id, format)?;
                let generated_by = UserRepository::get(conn, &user_id)?;
                Ok((attendees, version, generated_by))
            })
            .await?;

        let html = build_minutes_html(
            meeting,
            &attendees,
            extraction,
            generated_by.as_ref(),
            version,
        );

        let bytes = convert_with_pandoc(&pandoc, &html, format).await?;
        info!(
            "Rendered {} minutes for meeting {} ({} bytes)",
            format.as_str(),
            meeting.id,
            bytes.len()
        );

        // Blob first; a sidecar failure leaves an orphan for the GC sweep.
        let blob_id = self.blobs.store(&bytes)?;
        let filename = minutes_filename(meeting, format, version);

        let meeting_id = meeting.id.clone();
        let summary = meeting.title.clone();
        let blob_for_sidecar = blob_id.clone();
        let size = bytes.len() as i64;
        self.db
            .call(move |conn| {
                DocumentRepository::save_metadata(
                    conn,
                    &meeting_id,
                    &blob_for_sidecar,
                    &filename,
                    format,
                    size,
                    version,
                    Some(&summary),
                )
            })
            .await?;

        Ok(blob_id)
    }
}

#[async_trait]
impl MinutesRenderer for PandocRenderer {
    async fn render_pdf(
        &self,
        meeting: &MeetingRecord,
        extraction: &Extraction,
        user_id: &str,
    ) -> Result<String> {
        self.render(meeting, extraction, user_id, DocumentFormat::Pdf)
            .await
    }

    async fn render_docx(
        &self,
        meeting: &MeetingRecord,
        extraction: &Extraction,
        user_id: &str,
    ) -> Result<String> {
        self.render(meeting, extraction, user_id, DocumentFormat::Docx)
            .await
    }
}

async fn convert_with_pandoc(
    pandoc: &std::path::Path,
    html: &str,
    format: DocumentFormat,
) -> Result<Vec<u8>> {
    let workdir = tempfile::tempdir().context("Failed to create render workdir")?;
    let input = workdir.path().join("minutes.html");
    let output = workdir
        .path()
        .join(format!("minutes.{}", format.extension()));

    tokio::fs::write(&input, html)
        .await
        .context("Failed to write minutes HTML")?;

    debug!("Converting minutes via pandoc to {}", format.as_str());

    let result = tokio::process::Command::new(pandoc)
        .arg(&input)
        .args(["-f", "html"])
        .arg("-o")
        .arg(&output)
        .output()
        .await
        .context("Failed to run pandoc")?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!(
            "pandoc failed with status {}: {}",
            result.status,
            stderr.trim()
        );
    }

    tokio::fs::read(&output)
        .await
        .context("Failed to read rendered minutes")
}

fn minutes_filename(meeting: &MeetingRecord, format: DocumentFormat, version: i64) -> String {
    let safe_title: String = meeting
        .title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let date = meeting
        .scheduled_time
        .as_deref()
        .and_then(|t| t.split('T').next())
        .unwrap_or("undated")
        .to_string();
    format!(
        "minutes_{}_{}_v{}.{}",
        safe_title,
        date,
        version,
        format.extension()
    )
}

/// Build the minutes HTML from the meeting and its extraction.
pub fn build_minutes_html(
    meeting: &MeetingRecord,
    attendees: &[UserRecord],
    extraction: &Extraction,
    generated_by: Option<&UserRecord>,
    version: i64,
) -> String {
    let data = &extraction.extracted_data;
    let mut html = String::new();

    html.push_str("<html><head><meta charset=\"utf-8\"/></head><body>");
    html.push_str(&format!("<h1>Meeting Minutes: {}</h1>", escape(&meeting.title)));

    if let Some(time) = &meeting.scheduled_time {
        html.push_str(&format!("<p><b>Date:</b> {}</p>", escape(time)));
    }
    if let Some(description) = &meeting.description {
        html.push_str(&format!("<p>{}</p>", escape(description)));
    }

    if !attendees.is_empty() {
        html.push_str("<h2>Attendees</h2><ul>");
        for attendee in attendees {
            html.push_str(&format!(
                "<li>{} ({})</li>",
                escape(&attendee.name),
                escape(&attendee.email)
            ));
        }
        html.push_str("</ul>");
    }

    if !data.topics_discussed.is_empty() {
        html.push_str("<h2>Topics Discussed</h2>");
        for topic in &data.topics_discussed {
            html.push_str(&format!(
                "<h3>{}</h3><p>{}</p>",
                escape(&topic.agenda_item),
                escape(&topic.summary)
            ));
        }
    }

    if !data.decisions.is_empty() {
        html.push_str("<h2>Decisions</h2><ul>");
        for decision in &data.decisions {
            html.push_str(&format!(
                "<li><b>{}:</b> {}</li>",
                escape(&decision.topic),
                escape(&decision.decision)
            ));
        }
        html.push_str("</ul>");
    }

    if !data.action_items.is_empty() {
        html.push_str("<h2>Action Items</h2><ul>");
        for item in &data.action_items {
            let assignee = item.assigned_to.as_deref().unwrap_or("unassigned");
            let deadline = item
                .deadline
                .as_deref()
                .map(|d| format!(", due {}", escape(d)))
                .unwrap_or_default();
            html.push_str(&format!(
                "<li>{} ({}{})</li>",
                escape(&item.description),
                escape(assignee),
                deadline
            ));
        }
        html.push_str("</ul>");
    }

    let generated_by = generated_by
        .map(|user| user.name.as_str())
        .unwrap_or("minuted");
    html.push_str(&format!(
        "<hr/><p><i>Version {} - generated by {}</i></p>",
        version,
        escape(generated_by)
    ));
    html.push_str("</body></html>");

    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
