//! # Map View Resolution
//!
//! Picks the map center and zoom: the selected parcel's centroid when the
//! user asked to center on it, the area-of-interest default otherwise.
//!
//! ## Table of Contents
//! 1. LatLon / MapView
//! 2. Parcel centroid
//! 3. resolve_view — Main entry point

use geo::Centroid;
use serde::Serialize;

use crate::config::MapConfig;
use crate::geometry::ParcelGeometries;

// ============================================================================
// 1. LatLon / MapView
// ============================================================================

/// WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Map center and zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: f64,
}

impl MapView {
    /// Area-of-interest view from config
    pub fn default_for(map: &MapConfig) -> Self {
        Self {
            center: LatLon { lat: map.default_lat, lon: map.default_lon },
            zoom: map.default_zoom,
        }
    }
}

// ============================================================================
// 2. Parcel centroid
// ============================================================================

/// Area-weighted centroid of a parcel's geometry
pub fn parcel_centroid(geometries: &ParcelGeometries, fid: i64) -> Result<LatLon, ViewError> {
    let shape = geometries.get(fid).ok_or(ViewError::GeometryNotFound(fid))?;
    let point = shape.centroid().ok_or(ViewError::EmptyGeometry(fid))?;
    // GeoJSON axis order: x = lon, y = lat
    Ok(LatLon { lat: point.y(), lon: point.x() })
}

// ============================================================================
// 3. resolve_view — Main entry point
// ============================================================================

/// Resolve the map view for the current selection
pub fn resolve_view(
    parcel_id: Option<i64>,
    center_on_parcel: bool,
    geometries: &ParcelGeometries,
    map: &MapConfig,
) -> Result<MapView, ViewError> {
    match parcel_id {
        Some(fid) if center_on_parcel => Ok(MapView {
            center: parcel_centroid(geometries, fid)?,
            zoom: map.parcel_zoom,
        }),
        _ => Ok(MapView::default_for(map)),
    }
}

/// Errors from map view resolution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error("No geometry for parcel {0}")]
    GeometryNotFound(i64),

    #[error("Geometry of parcel {0} has no centroid")]
    EmptyGeometry(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometries() -> ParcelGeometries {
        ParcelGeometries::from_geojson_str(
            r#"{"type":"FeatureCollection","features":[
              {"type":"Feature","properties":{"fid":7},
               "geometry":{"type":"Polygon","coordinates":[[[-82.2,35.6],[-82.0,35.6],[-82.0,35.8],[-82.2,35.8],[-82.2,35.6]]]}},
              {"type":"Feature","properties":{"fid":8},
               "geometry":{"type":"Polygon","coordinates":[[]]}}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_center_on_parcel_uses_centroid() {
        let view = resolve_view(Some(7), true, &geometries(), &MapConfig::default()).unwrap();
        assert!((view.center.lat - 35.7).abs() < 1e-9);
        assert!((view.center.lon + 82.1).abs() < 1e-9);
        assert_eq!(view.zoom, 15.0);
    }

    #[test]
    fn test_flag_off_uses_default() {
        let view = resolve_view(Some(7), false, &geometries(), &MapConfig::default()).unwrap();
        assert_eq!(view.center, LatLon { lat: 35.666930, lon: -82.097059 });
        assert_eq!(view.zoom, 11.0);
    }

    #[test]
    fn test_no_selection_uses_default() {
        let view = resolve_view(None, true, &geometries(), &MapConfig::default()).unwrap();
        assert_eq!(view, MapView::default_for(&MapConfig::default()));
    }

    #[test]
    fn test_missing_geometry_is_error() {
        let err = resolve_view(Some(99), true, &geometries(), &MapConfig::default()).unwrap_err();
        assert_eq!(err, ViewError::GeometryNotFound(99));
        let err = resolve_view(Some(8), true, &geometries(), &MapConfig::default()).unwrap_err();
        assert_eq!(err, ViewError::EmptyGeometry(8));
    }
}
