use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::ApiError;
use crate::mail::{attachment_filename, PDF_CONTENT_TYPE};
use crate::state::AppState;

pub async fn send_certificates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .orchestrator
        .send_pending(state.shutdown.child_token())
        .await?;

    let message = if summary.total_processed == 0 && summary.skipped == 0 {
        "No pending participants to send certificates to".to_string()
    } else {
        format!("Sent: {}, Failed: {}", summary.sent, summary.failed)
    };

    Ok(Json(json!({
        "message": message,
        "sent": summary.sent,
        "failed": summary.failed,
        "total": summary.total_processed,
        "summary": summary,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    ids: Option<Vec<i32>>,
}

pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RetryRequest>>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.unwrap_or_default();
    let reset = state.orchestrator.reset_failed(request.ids).await?;
    Ok(Json(json!({ "reset": reset })))
}

pub async fn preview_certificate(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = state.orchestrator.preview(participant_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "inline; filename=\"{}\"",
                    attachment_filename(&preview.participant.name)
                ),
            ),
        ],
        preview.pdf,
    ))
}
