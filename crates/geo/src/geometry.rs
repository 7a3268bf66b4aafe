//! # Parcel Geometry Import
//!
//! Loads the parcel polygon collection keyed by `fid`. GeoJSON is always
//! supported; ESRI shapefiles are read with the `shapefile-support` feature.
//! Coordinates are expected in WGS84 (lon, lat).
//!
//! ## Table of Contents
//! 1. ParcelGeometries — fid → polygon collection
//! 2. GeoJSON import
//! 3. Shapefile import (feature-gated)
//! 4. GeoJSON export helpers

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::parcels::{parse_fid, FID_COLUMN};

// ============================================================================
// 1. ParcelGeometries — fid → polygon collection
// ============================================================================

/// Parcel polygons keyed by `fid`
#[derive(Debug, Clone, Default)]
pub struct ParcelGeometries {
    by_fid: BTreeMap<i64, MultiPolygon<f64>>,
}

impl ParcelGeometries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parcel shape. Each fid owns exactly one geometry.
    pub fn insert(&mut self, fid: i64, shape: MultiPolygon<f64>) -> Result<(), GeometryError> {
        if self.by_fid.insert(fid, shape).is_some() {
            return Err(GeometryError::DuplicateFid(fid));
        }
        Ok(())
    }

    pub fn get(&self, fid: i64) -> Option<&MultiPolygon<f64>> {
        self.by_fid.get(&fid)
    }

    pub fn contains(&self, fid: i64) -> bool {
        self.by_fid.contains_key(&fid)
    }

    pub fn fids(&self) -> impl Iterator<Item = i64> + '_ {
        self.by_fid.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_fid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fid.is_empty()
    }

    /// Load geometry, picking the reader from the file extension
    pub fn load(path: &Path) -> Result<Self, GeometryError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let geometries = match extension.as_str() {
            "geojson" | "json" => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| GeometryError::Io(path.to_path_buf(), e))?;
                Self::from_geojson_str(&content)
                    .map_err(|e| e.with_path(path))?
            }
            #[cfg(feature = "shapefile-support")]
            "shp" => import_shapefile(path)?,
            _ => return Err(GeometryError::UnsupportedFormat(extension)),
        };

        tracing::info!(
            "Imported {} parcel geometries from {}",
            geometries.len(),
            path.display()
        );
        Ok(geometries)
    }

    // ========================================================================
    // 2. GeoJSON import
    // ========================================================================

    /// Parse a GeoJSON document into parcel geometries
    pub fn from_geojson_str(content: &str) -> Result<Self, GeometryError> {
        let geojson: GeoJson = content
            .parse()
            .map_err(|e| GeometryError::Parse(format!("{}", e)))?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(GeometryError::Parse(
                    "bare geometry has no fid; expected a FeatureCollection".to_string(),
                ))
            }
        };

        let mut geometries = Self::new();
        let mut skipped = 0usize;

        for feature in features {
            let Some(fid) = feature_fid(&feature) else {
                skipped += 1;
                continue;
            };
            let Some(shape) = feature.geometry.as_ref().and_then(|g| to_multi_polygon(&g.value)) else {
                skipped += 1;
                continue;
            };
            geometries.insert(fid, shape)?;
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} features without a fid or polygon geometry", skipped);
        }

        Ok(geometries)
    }
}

/// Read `fid` from feature properties, falling back to the feature id
fn feature_fid(feature: &Feature) -> Option<i64> {
    let from_props = feature
        .properties
        .as_ref()
        .and_then(|props| props.get(FID_COLUMN))
        .and_then(json_fid);
    from_props.or_else(|| match &feature.id {
        Some(geojson::feature::Id::Number(n)) => n.as_i64(),
        Some(geojson::feature::Id::String(s)) => parse_fid(s),
        None => None,
    })
}

fn json_fid(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(|f| parse_fid(&f.to_string()))),
        serde_json::Value::String(s) => parse_fid(s.trim()),
        _ => None,
    }
}

fn ring(coords: &[Vec<f64>]) -> LineString<f64> {
    coords
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect::<Vec<_>>()
        .into()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Polygon<f64> {
    let exterior = rings.first().map(|r| ring(r)).unwrap_or_else(|| LineString::new(vec![]));
    let interiors = rings.iter().skip(1).map(|r| ring(r)).collect();
    Polygon::new(exterior, interiors)
}

/// Convert a GeoJSON value into a multipolygon (None for non-areal geometry)
fn to_multi_polygon(value: &Value) -> Option<MultiPolygon<f64>> {
    match value {
        Value::Polygon(rings) => Some(MultiPolygon::new(vec![polygon(rings)])),
        Value::MultiPolygon(polys) => Some(MultiPolygon::new(polys.iter().map(|p| polygon(p)).collect())),
        Value::GeometryCollection(geoms) => {
            let polys: Vec<Polygon<f64>> = geoms
                .iter()
                .filter_map(|g| to_multi_polygon(&g.value))
                .flat_map(|mp| mp.0)
                .collect();
            if polys.is_empty() {
                None
            } else {
                Some(MultiPolygon::new(polys))
            }
        }
        _ => None,
    }
}

// ============================================================================
// 3. Shapefile import (feature-gated)
// ============================================================================

/// Import a polygon shapefile, reading `fid` from the attribute table
#[cfg(feature = "shapefile-support")]
fn import_shapefile(path: &Path) -> Result<ParcelGeometries, GeometryError> {
    use shapefile::dbase::FieldValue;
    use shapefile::{PolygonRing, Shape};

    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| GeometryError::Parse(format!("{}: {}", path.display(), e)))?;

    let mut geometries = ParcelGeometries::new();
    let mut skipped = 0usize;

    for result in reader.iter_shapes_and_records() {
        let (shape, record) =
            result.map_err(|e| GeometryError::Parse(format!("{}: {}", path.display(), e)))?;

        let fid = match record.get(FID_COLUMN) {
            Some(FieldValue::Numeric(Some(n))) => parse_fid(&n.to_string()),
            Some(FieldValue::Integer(n)) => Some(i64::from(*n)),
            Some(FieldValue::Double(n)) => parse_fid(&n.to_string()),
            Some(FieldValue::Float(Some(n))) => parse_fid(&n.to_string()),
            Some(FieldValue::Character(Some(s))) => parse_fid(s.trim()),
            _ => None,
        };
        let Some(fid) = fid else {
            skipped += 1;
            continue;
        };

        let Shape::Polygon(poly) = shape else {
            skipped += 1;
            continue;
        };

        // Shapefile polygons are a flat list of rings; each outer ring starts
        // a new polygon and inner rings attach to the preceding outer ring.
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for ring in poly.rings() {
            let line: LineString<f64> = ring
                .points()
                .iter()
                .map(|p| Coord { x: p.x, y: p.y })
                .collect::<Vec<_>>()
                .into();
            match ring {
                PolygonRing::Outer(_) => polygons.push(Polygon::new(line, vec![])),
                PolygonRing::Inner(_) => {
                    if let Some(last) = polygons.last_mut() {
                        last.interiors_push(line);
                    }
                }
            }
        }
        geometries.insert(fid, MultiPolygon::new(polygons))?;
    }

    if skipped > 0 {
        tracing::warn!(
            "Skipped {} shapefile records without a fid or polygon shape in {}",
            skipped,
            path.display()
        );
    }

    Ok(geometries)
}

// ============================================================================
// 4. GeoJSON export helpers
// ============================================================================

/// Convert a parcel shape back to a GeoJSON geometry
pub fn to_geojson_geometry(shape: &MultiPolygon<f64>) -> geojson::Geometry {
    let polys = shape
        .0
        .iter()
        .map(|p| {
            std::iter::once(p.exterior())
                .chain(p.interiors().iter())
                .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    geojson::Geometry::new(Value::MultiPolygon(polys))
}

/// Errors from parcel geometry import
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse geometry: {0}")]
    Parse(String),

    #[error("Failed to parse {0}: {1}")]
    ParseFile(PathBuf, String),

    #[error("Unsupported geometry format '{0}'")]
    UnsupportedFormat(String),

    #[error("Duplicate geometry for fid {0}")]
    DuplicateFid(i64),
}

impl GeometryError {
    fn with_path(self, path: &Path) -> Self {
        match self {
            GeometryError::Parse(msg) => GeometryError::ParseFile(path.to_path_buf(), msg),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARCELS: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        { "type": "Feature", "properties": { "fid": 1, "ALTPARNO": "A-1" },
          "geometry": { "type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]] } },
        { "type": "Feature", "properties": { "fid": "2" },
          "geometry": { "type": "MultiPolygon", "coordinates": [[[[10,10],[12,10],[12,12],[10,12],[10,10]]]] } },
        { "type": "Feature", "properties": { "fid": 3.0 },
          "geometry": { "type": "Point", "coordinates": [5,5] } },
        { "type": "Feature", "properties": { "name": "no fid" },
          "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } }
      ]
    }"#;

    #[test]
    fn test_import_keys_by_fid() {
        let geoms = ParcelGeometries::from_geojson_str(PARCELS).unwrap();
        assert_eq!(geoms.len(), 2);
        assert!(geoms.contains(1));
        assert!(geoms.contains(2));
        assert!(!geoms.contains(3));
        assert_eq!(geoms.fids().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_fid_rejected() {
        let doc = r#"{"type":"FeatureCollection","features":[
          {"type":"Feature","properties":{"fid":1},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
          {"type":"Feature","properties":{"fid":1},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#;
        let err = ParcelGeometries::from_geojson_str(doc).unwrap_err();
        assert!(matches!(err, GeometryError::DuplicateFid(1)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = ParcelGeometries::load(Path::new("parcels.kml")).unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedFormat(ref e) if e == "kml"));
    }

    #[test]
    fn test_geojson_round_trip_keeps_rings() {
        let geoms = ParcelGeometries::from_geojson_str(PARCELS).unwrap();
        let geometry = to_geojson_geometry(geoms.get(1).unwrap());
        match geometry.value {
            Value::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0][0].len(), 5);
                assert_eq!(polys[0][0][2], vec![2.0, 2.0]);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}
