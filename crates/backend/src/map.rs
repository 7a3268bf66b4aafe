// =============================================================================
// Riparian API - Map API
// =============================================================================

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use riparian_geo::{build_figure, resolve_view, ColorScale, Figure, FigureOptions, MapStyle};

use crate::error::ApiError;
use crate::sessions::session_overrides;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    pub session: Option<Uuid>,
    pub parcel_id: Option<i64>,
    #[serde(default = "default_center_on_parcel")]
    pub center_on_parcel: bool,
    pub map_style: Option<String>,
    pub color_scale: Option<String>,
}

fn default_center_on_parcel() -> bool {
    true
}

/// GET /api/map — choropleth of normalized cumulative risk
pub async fn get_map(
    State(state): State<AppState>,
    Query(query): Query<MapQuery>,
) -> Result<Json<Figure>, ApiError> {
    let overrides = session_overrides(&state, query.session)?;
    let store = state.store.read();
    let map = &store.config().map;

    let map_style: MapStyle = query.map_style.as_deref().unwrap_or(&map.style).parse()?;
    let color_scale: ColorScale = query.color_scale.as_deref().unwrap_or(&map.color_scale).parse()?;
    let view = resolve_view(query.parcel_id, query.center_on_parcel, store.geometries(), map)?;

    let (table, report) = store.compute(&overrides)?;
    let options = FigureOptions {
        map_style,
        color_scale,
        view,
        opacity: map.opacity,
    };
    Ok(Json(build_figure(&table, &report, store.geometries(), &options)))
}
