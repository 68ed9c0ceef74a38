use thiserror::Error;

/// Problems with caller-supplied input. Nothing is persisted when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("no valid records found; check the column headers (name, email, event)")]
    NoValidRecords,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("spreadsheet could not be read: {0}")]
    Spreadsheet(String),

    #[error("spreadsheet is empty")]
    EmptySheet,

    #[error("only PDF files are accepted as templates")]
    NotAPdf,

    #[error("no file uploaded")]
    MissingUpload,

    #[error("invalid request body: {0}")]
    InvalidPayload(String),
}

/// Failure to produce a certificate for a single participant.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template could not be parsed: {0}")]
    Template(#[source] lopdf::Error),

    #[error("template has no pages")]
    EmptyTemplate,

    #[error("template page has no usable MediaBox")]
    MissingMediaBox,

    #[error("failed to assemble PDF: {0}")]
    Assemble(#[source] lopdf::Error),

    #[error("failed to write PDF: {0}")]
    Save(String),

    #[error("rendering timed out after {0}s")]
    Timeout(u64),

    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// Failure reported by the mail transport for a single message.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// The mail transport cannot be used at all.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("email credentials (EMAIL_USER, EMAIL_PASS) are not set")]
    MissingCredentials,

    #[error("EMAIL_HOST is not set")]
    MissingHost,

    #[error("invalid sender address {0}")]
    InvalidSender(String),

    #[error("SMTP relay could not be configured: {0}")]
    Relay(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: i32, reason: String },

    #[error("participant {0} not found")]
    NotFound(i32),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
