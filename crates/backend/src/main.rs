// =============================================================================
// Riparian API - Server Entry Point
// =============================================================================
// Table of Contents:
// 1. Imports
// 2. Application State
// 3. Main Entry Point
// 4. Router Setup
// =============================================================================

mod config;
mod error;
mod map;
mod parcels;
mod sessions;
mod upload;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use riparian_geo::ParcelStore;

use crate::config::Config;

// -----------------------------------------------------------------------------
// 2. Application State
// -----------------------------------------------------------------------------

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Base parcel data; write-locked only for uploads and reloads
    pub store: Arc<RwLock<ParcelStore>>,
    /// Cover edits per session
    pub sessions: Arc<RwLock<HashMap<Uuid, sessions::Session>>>,
}

impl AppState {
    pub fn new(config: Config, store: ParcelStore) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(RwLock::new(store)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

// -----------------------------------------------------------------------------
// 3. Main Entry Point
// -----------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load();
    let bind_addr = config.bind_address.clone();

    // Load parcel data; a bad config or data file stops startup
    let store = ParcelStore::open(&config.risk_config)?;
    tracing::info!(
        "Loaded {} parcels, {} geometries, {} cover rules",
        store.table().len(),
        store.geometries().len(),
        store.config().cover_columns.len()
    );

    let state = AppState::new(config, store);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Riparian API Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

// -----------------------------------------------------------------------------
// 4. Router Setup
// -----------------------------------------------------------------------------

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let cors = match state
        .config
        .frontend_url
        .as_deref()
        .and_then(|url| url.parse::<HeaderValue>().ok())
    {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    };

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Parcels API
        .route("/api/parcels", get(parcels::list_parcels))
        .route("/api/parcels/by-altparno/:altparno", get(parcels::find_by_altparno))
        .route("/api/sliders", get(parcels::get_sliders))
        .route("/api/parcel-info", get(parcels::get_parcel_info))
        // Sessions API
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:id", delete(sessions::delete_session))
        .route(
            "/api/sessions/:id/parcels/:fid/covers",
            put(sessions::set_covers).delete(sessions::reset_covers),
        )
        // Map API
        .route("/api/map", get(map::get_map))
        // Uploads
        .route("/api/upload/:target", post(upload::upload_table))
        .route("/api/reload", post(upload::reload))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
