//! Outgoing certificate email and the transport seam it is sent through.

mod smtp;

pub use smtp::{MailerConfig, SmtpMailer};

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tera::escape_html;

use crate::db::Participant;
use crate::error::{ConfigurationError, TransportError};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachment: Option<EmailAttachment>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Fails when the transport cannot send at all, e.g. missing credentials.
    fn ensure_configured(&self) -> Result<(), ConfigurationError>;

    async fn send(&self, email: OutgoingEmail) -> Result<(), TransportError>;
}

/// `Certificate_<name>.pdf` with whitespace runs collapsed to `_` and
/// anything outside letters, digits, `_`, `-` and `.` removed.
pub fn attachment_filename(name: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let joined = whitespace.replace_all(name.trim(), "_");
    let safe: String = joined
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    let safe = safe.trim_matches('.');

    if safe.is_empty() {
        "Certificate.pdf".to_string()
    } else {
        format!("Certificate_{safe}.pdf")
    }
}

pub fn certificate_email(participant: &Participant, pdf: Vec<u8>) -> OutgoingEmail {
    let name = &participant.name;
    let event = &participant.event_name;
    let cert_id = &participant.certificate_id;

    OutgoingEmail {
        to: participant.email.clone(),
        subject: format!("Your Certificate for {event}"),
        text: format!(
            "Hi {name},\n\nCongratulations! Attached is your certificate for \"{event}\".\n\nCertificate ID: {cert_id}"
        ),
        html: format!(
            "<p>Hi {},</p><p>Congratulations! Attached is your certificate for \"<strong>{}</strong>\".</p><p>Certificate ID: <code>{}</code></p>",
            escape_html(name),
            escape_html(event),
            escape_html(cert_id),
        ),
        attachment: Some(EmailAttachment {
            filename: attachment_filename(name),
            content_type: PDF_CONTENT_TYPE.to_string(),
            content: pdf,
        }),
    }
}
