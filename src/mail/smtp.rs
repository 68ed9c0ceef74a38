use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

use super::{Mailer, OutgoingEmail};
use crate::error::{ConfigurationError, TransportError};

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Falls back to `user` when unset.
    pub from: Option<String>,
    pub timeout: Duration,
}

struct Ready {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

/// SMTP relay transport. Construction never fails; a missing or invalid
/// configuration is reported by [`Mailer::ensure_configured`] and by every
/// send attempt.
pub struct SmtpMailer {
    state: Result<Ready, ConfigurationError>,
}

impl SmtpMailer {
    pub fn new(config: MailerConfig) -> Self {
        let state = Self::connect(&config);
        match &state {
            Ok(ready) => info!(
                host = config.host.as_deref().unwrap_or_default(),
                port = config.port,
                sender = %ready.sender,
                "SMTP transport configured"
            ),
            Err(e) => info!(reason = %e, "SMTP transport not configured; sending is disabled"),
        }
        Self { state }
    }

    fn connect(config: &MailerConfig) -> Result<Ready, ConfigurationError> {
        let (user, password) = match (&config.user, &config.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                (user.clone(), password.clone())
            }
            _ => return Err(ConfigurationError::MissingCredentials),
        };
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(ConfigurationError::MissingHost)?;

        let from = config.from.clone().unwrap_or_else(|| user.clone());
        let sender: Mailbox = from
            .parse()
            .map_err(|_| ConfigurationError::InvalidSender(from.clone()))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ConfigurationError::Relay(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(user, password))
            .timeout(Some(config.timeout))
            .build();

        Ok(Ready { transport, sender })
    }

    fn ready(&self) -> Result<&Ready, ConfigurationError> {
        self.state.as_ref().map_err(Clone::clone)
    }
}

fn build_message(sender: Mailbox, email: OutgoingEmail) -> Result<Message, TransportError> {
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e: AddressError| TransportError::Address {
            address: email.to.clone(),
            reason: e.to_string(),
        })?;

    let builder = Message::builder()
        .from(sender)
        .to(to)
        .subject(email.subject);
    let body = MultiPart::alternative_plain_html(email.text, email.html);

    let message = match email.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| TransportError::Build(e.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .multipart(body)
                    .singlepart(Attachment::new(attachment.filename).body(attachment.content, content_type)),
            )
        }
        None => builder.multipart(body),
    };

    message.map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn ensure_configured(&self) -> Result<(), ConfigurationError> {
        self.ready().map(|_| ())
    }

    async fn send(&self, email: OutgoingEmail) -> Result<(), TransportError> {
        let ready = self
            .ready()
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        let recipient = email.to.clone();
        let message = build_message(ready.sender.clone(), email)?;

        let response = ready
            .transport
            .send(message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        debug!(recipient = %recipient, code = %response.code(), "message accepted by relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::EmailAttachment;

    fn config() -> MailerConfig {
        MailerConfig {
            host: Some("smtp.example.com".into()),
            port: 587,
            user: Some("certs@example.com".into()),
            password: Some("secret".into()),
            from: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let mailer = SmtpMailer::new(MailerConfig {
            password: None,
            ..config()
        });
        assert!(matches!(
            mailer.ensure_configured(),
            Err(ConfigurationError::MissingCredentials)
        ));
    }

    #[test]
    fn missing_host_is_a_configuration_error() {
        let mailer = SmtpMailer::new(MailerConfig {
            host: None,
            ..config()
        });
        assert!(matches!(
            mailer.ensure_configured(),
            Err(ConfigurationError::MissingHost)
        ));
    }

    #[tokio::test]
    async fn complete_config_is_ready() {
        let mailer = SmtpMailer::new(config());
        assert!(mailer.ensure_configured().is_ok());
    }

    #[test]
    fn invalid_recipient_is_rejected_before_sending() {
        let sender: Mailbox = "certs@example.com".parse().unwrap();
        let err = build_message(
            sender,
            OutgoingEmail {
                to: "not an address".into(),
                subject: "s".into(),
                text: "t".into(),
                html: "<p>t</p>".into(),
                attachment: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Address { .. }));
    }

    #[test]
    fn message_carries_pdf_attachment() {
        let sender: Mailbox = "certs@example.com".parse().unwrap();
        let message = build_message(
            sender,
            OutgoingEmail {
                to: "ada@example.com".into(),
                subject: "Your Certificate for RustConf".into(),
                text: "Hi Ada".into(),
                html: "<p>Hi Ada</p>".into(),
                attachment: Some(EmailAttachment {
                    filename: "Certificate_Ada.pdf".into(),
                    content_type: "application/pdf".into(),
                    content: b"%PDF-1.5 fake".to_vec(),
                }),
            },
        )
        .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: application/pdf"));
        assert!(raw.contains("Certificate_Ada.pdf"));
    }
}
