//! Delivery orchestration: render, send and record every PENDING participant.
//!
//! Each participant is handled as an isolated unit (render, send, status
//! write) on a bounded pool of workers. A unit never aborts the batch; its
//! outcome only moves the shared counters.

mod unit;

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::db::{Participant, ParticipantStatus, ParticipantStore};
use crate::error::{DeliveryError, PreviewError, StoreError};
use crate::mail::Mailer;
use crate::pdf::{CertificateData, Renderer};
use crate::storage::TemplateStore;
use unit::{DeliveryUnit, Outcome};

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub total_processed: usize,
    /// Emails accepted by the transport, including `unrecorded` ones.
    pub sent: usize,
    pub failed: usize,
    /// PENDING participants not dispatched because the batch was cancelled.
    pub skipped: usize,
    /// Delivered, but the SENT status could not be written. These remain
    /// PENDING and would be emailed again by the next batch.
    pub unrecorded: Vec<i32>,
}

#[derive(Default)]
struct Tally {
    sent: AtomicUsize,
    failed: AtomicUsize,
    unrecorded: Mutex<Vec<i32>>,
}

impl Tally {
    fn record(&self, participant_id: i32, outcome: Outcome) {
        match outcome {
            Outcome::Sent => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::DeliveredUnrecorded => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                self.unrecorded
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(participant_id);
            }
        }
    }

    fn summary(&self, skipped: usize) -> DeliverySummary {
        let sent = self.sent.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let mut unrecorded = self
            .unrecorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        unrecorded.sort_unstable();

        DeliverySummary {
            total_processed: sent + failed,
            sent,
            failed,
            skipped,
            unrecorded,
        }
    }
}

/// A rendered certificate together with the participant it was rendered for.
#[derive(Debug, Clone)]
pub struct CertificatePreview {
    pub participant: Participant,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeliverySettings {
    pub workers: usize,
    pub send_timeout: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            send_timeout: Duration::from_secs(60),
        }
    }
}

pub struct DeliveryOrchestrator {
    store: Arc<dyn ParticipantStore>,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn Renderer>,
    templates: Arc<TemplateStore>,
    settings: DeliverySettings,
    batch: tokio::sync::Mutex<()>,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn ParticipantStore>,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn Renderer>,
        templates: Arc<TemplateStore>,
        settings: DeliverySettings,
    ) -> Self {
        let workers = if settings.workers == 0 {
            DEFAULT_WORKERS
        } else {
            settings.workers
        };

        Self {
            store,
            mailer,
            renderer,
            templates,
            settings: DeliverySettings { workers, ..settings },
            batch: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one batch over every participant currently PENDING.
    ///
    /// Fails up front, before any participant is read, when the transport is
    /// not configured. Cancelling `cancel` stops new dispatches; units already
    /// running finish and are counted.
    pub async fn send_pending(
        &self,
        cancel: CancellationToken,
    ) -> Result<DeliverySummary, DeliveryError> {
        self.mailer.ensure_configured()?;

        let _batch = self.batch.lock().await;
        let template = self.templates.snapshot().await?;
        let pending = self.store.list_by_status(ParticipantStatus::Pending).await?;

        if pending.is_empty() {
            info!("no pending participants to process");
            return Ok(DeliverySummary::default());
        }

        info!(
            pending = pending.len(),
            workers = self.settings.workers,
            template = template.has_background(),
            "starting certificate batch"
        );

        let unit = Arc::new(DeliveryUnit {
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            renderer: self.renderer.clone(),
            template,
            send_timeout: self.settings.send_timeout,
        });
        let tally = Arc::new(Tally::default());
        let permits = Arc::new(Semaphore::new(self.settings.workers));
        let mut running = JoinSet::new();
        let mut queue = pending.into_iter();
        let mut skipped = 0;

        while let Some(participant) = queue.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped = 1 + queue.len();
                info!(skipped, "batch cancelled; remaining participants stay pending");
                break;
            };

            let unit = unit.clone();
            let tally = tally.clone();
            let span = info_span!(
                "deliver",
                participant_id = participant.id,
                certificate_id = %participant.certificate_id
            );
            running.spawn(
                async move {
                    let id = participant.id;
                    let outcome = unit.deliver_isolated(participant).await;
                    tally.record(id, outcome);
                    drop(permit);
                }
                .instrument(span),
            );
        }

        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "delivery task failed outside its unit");
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let summary = tally.summary(skipped);
        info!(
            total = summary.total_processed,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            unrecorded = summary.unrecorded.len(),
            "certificate batch complete"
        );
        Ok(summary)
    }

    /// Explicitly return FAILED participants to PENDING so the next batch
    /// retries them. `None` resets every FAILED participant.
    pub async fn reset_failed(&self, ids: Option<Vec<i32>>) -> Result<u64, StoreError> {
        let _batch = self.batch.lock().await;
        let requested = ids.clone();
        let reset = self.store.reset_failed(ids).await?;
        info!(
            audit = true,
            ?requested,
            reset,
            "failed participants reset to pending"
        );
        Ok(reset)
    }

    /// Render a participant's certificate with the current template without
    /// sending it or touching its status.
    pub async fn preview(&self, participant_id: i32) -> Result<CertificatePreview, PreviewError> {
        let participant = self
            .store
            .get(participant_id)
            .await?
            .ok_or(StoreError::NotFound(participant_id))?;
        let template = self.templates.snapshot().await?;

        let pdf = self
            .renderer
            .render(
                CertificateData {
                    name: participant.name.clone(),
                    event_name: participant.event_name.clone(),
                    certificate_id: participant.certificate_id.clone(),
                },
                template,
            )
            .await?;
        Ok(CertificatePreview { participant, pdf })
    }
}
