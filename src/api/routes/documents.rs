//! Generated minutes document endpoints.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::processing::load_accessible_meeting;
use crate::api::{caller_id, AppState};
use crate::artifacts::DocumentRepository;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings/:id/documents", get(list_documents))
        .route(
            "/meetings/:id/documents/:document_id/download",
            get(download_document),
        )
        .with_state(state)
}

async fn list_documents(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    load_accessible_meeting(&state, &meeting_id, &user_id).await?;

    let id = meeting_id.clone();
    let documents = state
        .db
        .call(move |conn| DocumentRepository::for_meeting(conn, &id))
        .await?;

    let entries: Vec<Value> = documents
        .iter()
        .map(|doc| {
            json!({
                "id": doc.id,
                "filename": doc.filename,
                "format": doc.format,
                "contentType": doc.content_type,
                "sizeBytes": doc.size_bytes,
                "version": doc.version,
                "generatedAt": doc.generated_at,
                "downloadUrl": format!(
                    "/meetings/{}/documents/{}/download", meeting_id, doc.id
                ),
            })
        })
        .collect();

    Ok(Json(json!({ "documents": entries })))
}

async fn download_document(
    Path((meeting_id, document_id)): Path<(String, String)>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let user_id = caller_id(&headers)?;
    load_accessible_meeting(&state, &meeting_id, &user_id).await?;

    let id = meeting_id.clone();
    let documents = state
        .db
        .call(move |conn| DocumentRepository::for_meeting(conn, &id))
        .await?;

    let document = documents
        .into_iter()
        .find(|doc| doc.id == document_id)
        .ok_or_else(|| ApiError::not_found("Document not found"))?;

    let blobs = state.blobs.clone();
    let blob_id = document.blob_id.clone();
    let bytes = tokio::task::spawn_blocking(move || blobs.read(&blob_id))
        .await
        .map_err(|_| ApiError::internal("Blob read task failed"))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, document.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        bytes,
    )
        .into_response())
}
