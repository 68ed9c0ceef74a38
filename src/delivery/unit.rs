use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn, Instrument};

use crate::db::{Participant, ParticipantStatus, ParticipantStore};
use crate::error::TransportError;
use crate::mail::{certificate_email, Mailer, OutgoingEmail};
use crate::pdf::{CertificateData, Renderer};
use crate::storage::TemplateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Outcome {
    Sent,
    Failed,
    DeliveredUnrecorded,
}

/// Everything one participant's render + send + status write needs. Shared
/// read-only across the workers of a batch.
pub(super) struct DeliveryUnit {
    pub store: Arc<dyn ParticipantStore>,
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<dyn Renderer>,
    pub template: TemplateConfig,
    pub send_timeout: Duration,
}

impl DeliveryUnit {
    pub async fn deliver(&self, participant: Participant) -> Outcome {
        let data = CertificateData {
            name: participant.name.clone(),
            event_name: participant.event_name.clone(),
            certificate_id: participant.certificate_id.clone(),
        };

        let pdf = match self.renderer.render(data, self.template.clone()).await {
            Ok(pdf) => pdf,
            Err(e) => {
                warn!(error = %e, "certificate render failed");
                return self.record(&participant, ParticipantStatus::Failed).await;
            }
        };
        debug!(bytes = pdf.len(), "certificate rendered");

        let email = certificate_email(&participant, pdf);
        let status = match send_with_timeout(self.mailer.as_ref(), email, self.send_timeout).await
        {
            Ok(()) => ParticipantStatus::Sent,
            Err(e) => {
                warn!(email = %participant.email, error = %e, "certificate email not delivered");
                ParticipantStatus::Failed
            }
        };
        self.record(&participant, status).await
    }

    /// Run [`deliver`](Self::deliver) on its own task so a panic inside the
    /// unit marks the participant FAILED instead of leaving it unaccounted.
    pub async fn deliver_isolated(self: Arc<Self>, participant: Participant) -> Outcome {
        let fallback = participant.clone();
        let unit = self.clone();
        let run = tokio::spawn(async move { unit.deliver(participant).await }.in_current_span());

        match run.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "delivery unit panicked");
                self.record(&fallback, ParticipantStatus::Failed).await
            }
        }
    }

    async fn record(&self, participant: &Participant, status: ParticipantStatus) -> Outcome {
        debug_assert!(participant.status.can_transition_to(status));

        match self.store.set_status(participant.id, status).await {
            Ok(()) if status == ParticipantStatus::Sent => Outcome::Sent,
            Ok(()) => Outcome::Failed,
            Err(e) if status == ParticipantStatus::Sent => {
                error!(
                    delivered_unrecorded = true,
                    email = %participant.email,
                    error = %e,
                    "certificate delivered but SENT status was not saved; participant is still PENDING"
                );
                Outcome::DeliveredUnrecorded
            }
            Err(e) => {
                error!(error = %e, "could not save FAILED status; participant is still PENDING");
                Outcome::Failed
            }
        }
    }
}

pub(super) async fn send_with_timeout(
    mailer: &dyn Mailer,
    email: OutgoingEmail,
    limit: Duration,
) -> Result<(), TransportError> {
    tokio::time::timeout(limit, mailer.send(email))
        .await
        .unwrap_or(Err(TransportError::Timeout(limit)))
}
