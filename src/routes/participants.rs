use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{read_upload, ApiError};
use crate::db::Participant;
use crate::ingest::{IngestSummary, ParticipantInput};
use crate::state::AppState;

pub async fn list_participants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ParticipantInput>, JsonRejection>,
) -> Result<Json<Participant>, ApiError> {
    let Json(input) = payload?;
    Ok(Json(state.normalizer.ingest_one(input).await?))
}

/// Spreadsheet import. The client is expected to follow up with a send.
pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let bytes = read_upload(&mut multipart, "file").await?;
    let summary = state.normalizer.ingest_spreadsheet(&bytes).await?;
    Ok(Json(bulk_response(&summary)))
}

fn bulk_response(summary: &IngestSummary) -> Value {
    json!({
        "message": format!("Successfully uploaded {} participants", summary.inserted),
        "count": summary.inserted,
        "summary": summary,
        "triggerSend": true,
    })
}
