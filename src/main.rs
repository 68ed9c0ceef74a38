mod config;
mod db;
mod delivery;
mod error;
mod ingest;
mod mail;
mod pdf;
mod routes;
mod state;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{ParticipantStore, PgParticipantStore};
use crate::delivery::DeliveryOrchestrator;
use crate::ingest::Normalizer;
use crate::mail::SmtpMailer;
use crate::pdf::CertificateRenderer;
use crate::storage::TemplateStore;

/// Spreadsheets and template PDFs.
const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certifier=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    crate::storage::ensure_dirs(&config.upload_folder)?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(pool.as_ref()).await?;

    let store: Arc<dyn ParticipantStore> = Arc::new(PgParticipantStore::new(pool));
    let templates = Arc::new(TemplateStore::new(config.upload_folder.clone()));
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        store.clone(),
        Arc::new(SmtpMailer::new(config.mailer())),
        Arc::new(CertificateRenderer::new(config.render_timeout)),
        templates.clone(),
        config.delivery(),
    ));
    let shutdown = CancellationToken::new();

    let state = Arc::new(state::AppState {
        store: store.clone(),
        normalizer: Normalizer::new(store),
        orchestrator,
        templates,
        shutdown: shutdown.clone(),
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/participants",
            get(routes::list_participants).post(routes::add_participant),
        )
        .route("/api/participants/bulk", post(routes::bulk_upload))
        .route("/api/participants/retry-failed", post(routes::retry_failed))
        .route(
            "/api/participants/:id/certificate",
            get(routes::preview_certificate),
        )
        .route("/api/send-certificates", post(routes::send_certificates))
        .route("/api/settings/template", post(routes::upload_template))
        .route("/api/settings/config", post(routes::update_config))
        .route("/api/settings/info", get(routes::template_info))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Certifier listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down; running batches stop dispatching");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
