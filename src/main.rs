use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[cfg(test)]
mod test_support;

use config::AppConfig;
use services::file_intake::FileIntake;
use services::notifier::Notifier;
use services::storage::connect_store;
use state::AppState;

/// Multipart framing overhead on top of the largest accepted receipt.
const BODY_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env()?;
    config.log_summary();

    let app_state = initialize_app_state(&config).await;
    let app = build_router(app_state, &config);
    start_server(app, &config).await
}

async fn initialize_app_state(config: &AppConfig) -> AppState {
    let intake = FileIntake::new(
        &config.upload_dir,
        config.max_upload_bytes,
        config.allowed_receipt_types.clone(),
        config.receipt_required,
    );
    if let Err(e) = intake.ensure_dir().await {
        tracing::warn!("Failed to create {}: {}", config.upload_dir, e);
    }

    let store = connect_store(config).await;

    tracing::info!("🔧 Attempting to initialize email notifications...");
    let notifier = Notifier::from_config(&config.email).await;
    if !notifier.is_ready() {
        tracing::warn!("Email notifications are disabled due to configuration issues");
    }

    AppState::new(store, intake, notifier, config.port)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false)
}

pub(crate) fn build_router(app_state: AppState, config: &AppConfig) -> Router {
    let body_limit = (config.max_upload_bytes + BODY_OVERHEAD_BYTES) as usize;

    Router::new()
        .route("/", get(handlers::health::root_handler))
        .nest("/api", routes::api_routes())
        .nest("/uploads", routes::uploads::routes())
        .fallback(handlers::health::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("🚀 IMF Africa Pay API starting on {}", addr);
    tracing::info!("Health check: http://localhost:{}/api/health", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
