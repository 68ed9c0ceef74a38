mod delivery;
mod participants;
mod settings;

pub use delivery::{preview_certificate, retry_failed, send_certificates};
pub use participants::{add_participant, bulk_upload, list_participants};
pub use settings::{template_info, update_config, upload_template};

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::{
    DeliveryError, IngestError, InputError, PreviewError, RenderError, StoreError,
};
use crate::storage::TemplateUploadError;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Handler error rendered as `{ "error": … }` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Input(e) => e.into(),
            IngestError::Store(e) => e.into(),
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::Configuration(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            DeliveryError::Store(e) => e.into(),
        }
    }
}

impl From<PreviewError> for ApiError {
    fn from(e: PreviewError) -> Self {
        match e {
            PreviewError::Render(e) => e.into(),
            PreviewError::Store(e) => e.into(),
        }
    }
}

impl From<TemplateUploadError> for ApiError {
    fn from(e: TemplateUploadError) -> Self {
        match e {
            TemplateUploadError::Input(e) => e.into(),
            TemplateUploadError::Store(e) => e.into(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        InputError::InvalidPayload(e.body_text()).into()
    }
}

/// Bytes of the first multipart field called `name`.
async fn read_upload(multipart: &mut Multipart, name: &str) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            let data = field.bytes().await?;
            if data.is_empty() {
                break;
            }
            return Ok(data.to_vec());
        }
    }
    Err(InputError::MissingUpload.into())
}
