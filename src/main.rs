//! OCR Gateway - submits images and PDFs to Mistral OCR and optionally
//! forwards the extracted pages into the assistant's knowledge store.

mod auth;
mod config;
mod error;
mod ingest;
mod ocr;
mod routes;
mod schema;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use config::Settings;
use ingest::{Ingestor, RabbitHoleClient};
use ocr::mistral::MistralOcrProvider;
use ocr::OcrProvider;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub provider: Arc<dyn OcrProvider>,
    pub ingestor: Arc<dyn Ingestor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    info!(
        "Settings loaded: model={}, pdf_strategy={:?}, save_text_to_rabbit_hole={}, auth={}",
        settings.model,
        settings.pdf_strategy,
        settings.save_text(),
        settings.gateway_api_key.is_some()
    );

    let client = reqwest::Client::new();
    let state = AppState {
        provider: Arc::new(MistralOcrProvider::new(client.clone(), &settings)),
        ingestor: Arc::new(RabbitHoleClient::new(client, &settings)),
        settings: Arc::new(settings),
    };

    info!(
        "OCR provider: {} at {}; ingestion at {}",
        state.provider.name(),
        state.settings.api_url,
        state.settings.rabbit_hole_url
    );

    let bind_addr = state.settings.bind_addr;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/settings/schema", get(routes::settings_schema))
        .route("/ocr", post(routes::ocr_image))
        .route("/ocr-pdf", post(routes::ocr_pdf))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
