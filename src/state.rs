use crate::db::ParticipantStore;
use crate::delivery::DeliveryOrchestrator;
use crate::ingest::Normalizer;
use crate::storage::TemplateStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ParticipantStore>,
    pub normalizer: Normalizer,
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub templates: Arc<TemplateStore>,
    /// Cancelled on shutdown; running batches stop dispatching new units.
    pub shutdown: CancellationToken,
}
