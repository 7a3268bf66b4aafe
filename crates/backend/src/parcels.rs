// =============================================================================
// Riparian API - Parcels API
// =============================================================================
// Parcel lookup, slider state and the selected-parcel info table
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use riparian_geo::overrides::slider_specs;
use riparian_geo::{parcel_summary, ParcelSummary, SliderSpec};

use crate::error::ApiError;
use crate::sessions::session_overrides;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Selection shared by the per-parcel endpoints
#[derive(Debug, Default, Deserialize)]
pub struct SelectionQuery {
    pub session: Option<Uuid>,
    pub parcel_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ParcelListResponse {
    pub fids: Vec<i64>,
    pub altparnos: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ParcelLookupResponse {
    pub fid: i64,
    pub altparno: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/parcels
pub async fn list_parcels(State(state): State<AppState>) -> Json<ParcelListResponse> {
    let store = state.store.read();
    Json(ParcelListResponse {
        fids: store.table().fids(),
        altparnos: store.table().altparnos(),
    })
}

/// GET /api/parcels/by-altparno/:altparno
pub async fn find_by_altparno(
    State(state): State<AppState>,
    Path(altparno): Path<String>,
) -> Result<Json<ParcelLookupResponse>, ApiError> {
    let store = state.store.read();
    let parcel = store
        .table()
        .find_by_altparno(&altparno)
        .ok_or_else(|| ApiError::NotFound(format!("Parcel {} not found", altparno)))?;
    Ok(Json(ParcelLookupResponse {
        fid: parcel.fid,
        altparno: parcel.altparno.clone(),
    }))
}

/// GET /api/sliders — slider values the UI resets to on selection
pub async fn get_sliders(
    State(state): State<AppState>,
    Query(query): Query<SelectionQuery>,
) -> Result<Json<Vec<SliderSpec>>, ApiError> {
    let overrides = session_overrides(&state, query.session)?;
    let store = state.store.read();
    let table = overrides.apply_to(store.table())?;
    let specs = slider_specs(&table, &store.config().cover_marker, query.parcel_id)?;
    Ok(Json(specs))
}

/// GET /api/parcel-info
pub async fn get_parcel_info(
    State(state): State<AppState>,
    Query(query): Query<SelectionQuery>,
) -> Result<Json<Vec<ParcelSummary>>, ApiError> {
    let overrides = session_overrides(&state, query.session)?;
    let store = state.store.read();
    let (table, report) = store.compute(&overrides)?;
    let rows = parcel_summary(
        &table,
        &report,
        &store.cover_fields(),
        &store.config().conservation_columns,
        query.parcel_id,
    )?;
    Ok(Json(rows))
}
