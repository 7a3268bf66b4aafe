// =============================================================================
// Riparian API - Upload & Reload API
// =============================================================================
// Uploads overwrite the parcel or conservation table on disk and reload the
// store. Any change of base data drops every session's edits.
// =============================================================================

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use riparian_geo::{ImportOutcome, StoreError, UploadTarget};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub parcels: usize,
    pub geometries: usize,
}

const UPLOAD_FAILED: &str = "There was an error processing this file.";

/// POST /api/upload/:target?filename=
pub async fn upload_table(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportOutcome>), ApiError> {
    let target: UploadTarget = target.parse()?;

    let mut store = state.store.write();
    let outcome = store
        .import(target, &body, &query.filename)
        .map_err(|e| match e {
            // Upload parsed but does not fit the configured rules
            StoreError::Config(_) | StoreError::Parcels(_) => {
                tracing::warn!("Upload {} rejected: {}", query.filename, e);
                ApiError::Unprocessable(UPLOAD_FAILED.to_string())
            }
            other => other.into(),
        })?;

    let dropped = {
        let mut sessions = state.sessions.write();
        sessions.values_mut().for_each(|session| session.overrides.clear());
        sessions.len()
    };
    tracing::info!(
        "Upload {} accepted ({} rows); cleared edits of {} sessions",
        outcome.filename,
        outcome.rows,
        dropped
    );

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/reload — re-read data files after they changed on disk
pub async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let mut store = state.store.write();
    store.reload()?;
    state
        .sessions
        .write()
        .values_mut()
        .for_each(|session| session.overrides.clear());

    Ok(Json(ReloadResponse {
        parcels: store.table().len(),
        geometries: store.geometries().len(),
    }))
}
