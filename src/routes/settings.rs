use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{read_upload, ApiError};
use crate::state::AppState;
use crate::storage::NamePlacement;

pub async fn upload_template(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let bytes = read_upload(&mut multipart, "template").await?;
    state.templates.save_template(&bytes).await?;
    Ok(Json(json!({ "message": "Template uploaded successfully" })))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(placement): Json<NamePlacement>,
) -> Result<Json<Value>, ApiError> {
    state.templates.save_placement(placement).await?;
    Ok(Json(json!({ "message": "Settings saved", "settings": placement })))
}

pub async fn template_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "exists": state.templates.has_template().await,
        "settings": state.templates.placement().await,
    }))
}
