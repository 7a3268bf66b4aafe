//! # Choropleth Figure
//!
//! Turns a risk report plus parcel geometry into a map figure: a GeoJSON
//! FeatureCollection colored by normalized cumulative risk, with the view,
//! style and color scale a map client needs.
//!
//! ## Table of Contents
//! 1. MapStyle — Base map styles
//! 2. ColorScale — Named sequential scales
//! 3. Figure — Output document
//! 4. build_figure — Main entry point

use geojson::{feature::Id, Feature, FeatureCollection};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::geometry::{to_geojson_geometry, ParcelGeometries};
use crate::parcels::{ParcelTable, ALTPARNO_COLUMN, FID_COLUMN};
use crate::risk::RiskReport;
use crate::view::MapView;

// ============================================================================
// 1. MapStyle — Base map styles
// ============================================================================

/// Base map tiles under the parcel layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapStyle {
    OpenStreetMap,
    #[default]
    CartoPositron,
    CartoDarkmatter,
    StamenTerrain,
    StamenToner,
    StamenWatercolor,
}

impl MapStyle {
    pub const ALL: [MapStyle; 6] = [
        MapStyle::OpenStreetMap,
        MapStyle::CartoPositron,
        MapStyle::CartoDarkmatter,
        MapStyle::StamenTerrain,
        MapStyle::StamenToner,
        MapStyle::StamenWatercolor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MapStyle::OpenStreetMap => "open-street-map",
            MapStyle::CartoPositron => "carto-positron",
            MapStyle::CartoDarkmatter => "carto-darkmatter",
            MapStyle::StamenTerrain => "stamen-terrain",
            MapStyle::StamenToner => "stamen-toner",
            MapStyle::StamenWatercolor => "stamen-watercolor",
        }
    }
}

impl fmt::Display for MapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MapStyle {
    type Err = FigureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        MapStyle::ALL
            .into_iter()
            .find(|style| style.name() == wanted)
            .ok_or_else(|| FigureError::UnknownMapStyle(s.to_string()))
    }
}

// ============================================================================
// 2. ColorScale — Named sequential scales
// ============================================================================

/// Sequential scales and their evenly spaced RGB stops
const SCALES: &[(&str, &[[u8; 3]])] = &[
    ("reds", &[
        [255, 245, 240], [254, 224, 210], [252, 187, 161], [252, 146, 114], [251, 106, 74],
        [239, 59, 44], [203, 24, 29], [165, 15, 21], [103, 0, 13],
    ]),
    ("blues", &[
        [247, 251, 255], [222, 235, 247], [198, 219, 239], [158, 202, 225], [107, 174, 214],
        [66, 146, 198], [33, 113, 181], [8, 81, 156], [8, 48, 107],
    ]),
    ("greens", &[
        [247, 252, 245], [229, 245, 224], [199, 233, 192], [161, 217, 155], [116, 196, 118],
        [65, 171, 93], [35, 139, 69], [0, 109, 44], [0, 68, 27],
    ]),
    ("greys", &[
        [255, 255, 255], [240, 240, 240], [217, 217, 217], [189, 189, 189], [150, 150, 150],
        [115, 115, 115], [82, 82, 82], [37, 37, 37], [0, 0, 0],
    ]),
    ("oranges", &[
        [255, 245, 235], [254, 230, 206], [253, 208, 162], [253, 174, 107], [253, 141, 60],
        [241, 105, 19], [217, 72, 1], [166, 54, 3], [127, 39, 4],
    ]),
    ("purples", &[
        [252, 251, 253], [239, 237, 245], [218, 218, 235], [188, 189, 220], [158, 154, 200],
        [128, 125, 186], [106, 81, 163], [84, 39, 143], [63, 0, 125],
    ]),
    ("ylorrd", &[
        [255, 255, 204], [255, 237, 160], [254, 217, 118], [254, 178, 76], [253, 141, 60],
        [252, 78, 42], [227, 26, 28], [189, 0, 38], [128, 0, 38],
    ]),
    ("viridis", &[
        [68, 1, 84], [72, 40, 120], [62, 73, 137], [49, 104, 142], [38, 130, 142],
        [31, 158, 137], [53, 183, 121], [110, 206, 88], [181, 222, 43], [253, 231, 37],
    ]),
    ("cividis", &[
        [0, 34, 78], [18, 53, 112], [59, 73, 108], [87, 93, 109], [112, 113, 115],
        [138, 134, 120], [165, 156, 116], [195, 179, 105], [225, 204, 85], [254, 232, 56],
    ]),
    ("plasma", &[
        [13, 8, 135], [70, 3, 159], [114, 1, 168], [156, 23, 158], [189, 55, 134],
        [216, 87, 107], [237, 121, 83], [251, 159, 58], [253, 202, 38], [240, 249, 33],
    ]),
    ("inferno", &[
        [0, 0, 4], [27, 12, 65], [74, 12, 107], [120, 28, 109], [165, 44, 96],
        [207, 68, 70], [237, 105, 37], [251, 155, 6], [247, 209, 61], [252, 255, 164],
    ]),
    ("magma", &[
        [0, 0, 4], [24, 15, 61], [68, 15, 118], [114, 31, 129], [158, 47, 127],
        [205, 64, 113], [241, 96, 93], [253, 150, 104], [254, 202, 141], [252, 253, 191],
    ]),
];

/// A named color scale, optionally reversed with an `_r` suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScale {
    name: &'static str,
    stops: &'static [[u8; 3]],
    reversed: bool,
}

impl ColorScale {
    /// Names accepted by `FromStr` (each also accepts `_r`)
    pub fn names() -> impl Iterator<Item = &'static str> {
        SCALES.iter().map(|(name, _)| *name)
    }

    pub fn name(&self) -> String {
        if self.reversed {
            format!("{}_r", self.name)
        } else {
            self.name.to_string()
        }
    }

    /// Color at `t` in [0, 1] as `#rrggbb`. Out-of-range and NaN clamp to the ends.
    pub fn sample(&self, t: f64) -> String {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let t = if self.reversed { 1.0 - t } else { t };
        let segments = (self.stops.len() - 1) as f64;
        let pos = t * segments;
        let lo = (pos.floor() as usize).min(self.stops.len() - 1);
        let hi = (lo + 1).min(self.stops.len() - 1);
        let frac = pos - lo as f64;
        let channel = |i: usize| {
            let a = self.stops[lo][i] as f64;
            let b = self.stops[hi][i] as f64;
            (a + (b - a) * frac).round() as u8
        };
        format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
    }
}

impl Default for ColorScale {
    fn default() -> Self {
        Self { name: SCALES[0].0, stops: SCALES[0].1, reversed: false }
    }
}

impl FromStr for ColorScale {
    type Err = FigureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (base, reversed) = match lowered.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (lowered.as_str(), false),
        };
        SCALES
            .iter()
            .find(|(name, _)| *name == base)
            .map(|&(name, stops)| ColorScale { name, stops, reversed })
            .ok_or_else(|| FigureError::UnknownColorScale(s.to_string()))
    }
}

// ============================================================================
// 3. Figure — Output document
// ============================================================================

/// Display options chosen by the user
#[derive(Debug, Clone)]
pub struct FigureOptions {
    pub map_style: MapStyle,
    pub color_scale: ColorScale,
    pub view: MapView,
    pub opacity: f64,
}

/// Choropleth map document
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub map_style: MapStyle,
    pub color_scale: String,
    pub center: crate::view::LatLon,
    pub zoom: f64,
    pub opacity: f64,
    pub range_color: [f64; 2],
    /// Legend label of the colored value
    pub color_label: &'static str,
    pub hover_data: Vec<&'static str>,
    /// True when every parcel shares one cumulative risk
    pub degenerate: bool,
    /// Parcels in the table without geometry (not drawn)
    pub missing_geometry: usize,
    pub geojson: FeatureCollection,
}

// ============================================================================
// 4. build_figure — Main entry point
// ============================================================================

/// Build the choropleth for every parcel of `table` that has geometry
pub fn build_figure(
    table: &ParcelTable,
    report: &RiskReport,
    geometries: &ParcelGeometries,
    options: &FigureOptions,
) -> Figure {
    let mut features = Vec::with_capacity(table.len());
    let mut missing_geometry = 0;

    for parcel in table.parcels() {
        let Some(shape) = geometries.get(parcel.fid) else {
            missing_geometry += 1;
            continue;
        };
        let risk = report.get(parcel.fid);
        let cumulative = risk.map(|r| r.cumulative);
        let normalized = risk.and_then(|r| r.normalized);

        let mut properties = Map::new();
        properties.insert(FID_COLUMN.to_string(), json!(parcel.fid));
        properties.insert(ALTPARNO_COLUMN.to_string(), json!(parcel.altparno));
        properties.insert("cum_risk".to_string(), json!(cumulative));
        properties.insert("cum_risk_normalized".to_string(), json!(normalized));
        properties.insert(
            "fill".to_string(),
            JsonValue::String(options.color_scale.sample(normalized.unwrap_or(0.0))),
        );

        features.push(Feature {
            bbox: None,
            geometry: Some(to_geojson_geometry(shape)),
            id: Some(Id::Number(parcel.fid.into())),
            properties: Some(properties),
            foreign_members: None,
        });
    }

    if missing_geometry > 0 {
        tracing::warn!("{} parcels have no geometry and are not drawn", missing_geometry);
    }

    Figure {
        map_style: options.map_style,
        color_scale: options.color_scale.name(),
        center: options.view.center,
        zoom: options.view.zoom,
        opacity: options.opacity,
        range_color: [0.0, 1.0],
        color_label: "risk",
        hover_data: vec![ALTPARNO_COLUMN],
        degenerate: report.is_degenerate(),
        missing_geometry,
        geojson: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
    }
}

/// Errors from figure option parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FigureError {
    #[error("Unknown map style '{0}'")]
    UnknownMapStyle(String),

    #[error("Unknown color scale '{0}'")]
    UnknownColorScale(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapConfig, Threshold, ThresholdRule};
    use crate::risk::compute_risk;

    #[test]
    fn test_parse_styles_and_scales() {
        assert_eq!("carto-darkmatter".parse::<MapStyle>().unwrap(), MapStyle::CartoDarkmatter);
        assert!("satellite".parse::<MapStyle>().is_err());
        assert_eq!(MapStyle::default().to_string(), "carto-positron");

        let reds: ColorScale = "Reds".parse().unwrap();
        assert_eq!(reds.name(), "reds");
        assert_eq!("viridis_r".parse::<ColorScale>().unwrap().name(), "viridis_r");
        assert_eq!(
            "jet".parse::<ColorScale>(),
            Err(FigureError::UnknownColorScale("jet".to_string()))
        );
    }

    #[test]
    fn test_sample_endpoints_and_clamping() {
        let reds = ColorScale::default();
        assert_eq!(reds.sample(0.0), "#fff5f0");
        assert_eq!(reds.sample(1.0), "#67000d");
        assert_eq!(reds.sample(-3.0), "#fff5f0");
        assert_eq!(reds.sample(f64::NAN), "#fff5f0");
        assert_eq!(reds.sample(0.5), "#fb6a4a");

        let reversed: ColorScale = "reds_r".parse().unwrap();
        assert_eq!(reversed.sample(0.0), "#67000d");
    }

    fn fixture() -> (ParcelTable, ParcelGeometries, Vec<ThresholdRule>) {
        let table = ParcelTable::from_csv_reader(
            "fid,ALTPARNO,%cover22\n1,A,0.1\n2,B,0.9\n3,C,0.5\n".as_bytes(),
        )
        .unwrap();
        let geometries = ParcelGeometries::from_geojson_str(
            r#"{"type":"FeatureCollection","features":[
              {"type":"Feature","properties":{"fid":1},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
              {"type":"Feature","properties":{"fid":2},"geometry":{"type":"Polygon","coordinates":[[[2,2],[3,2],[3,3],[2,2]]]}}
            ]}"#,
        )
        .unwrap();
        let rules = vec![ThresholdRule {
            id: None,
            column: "%cover22".to_string(),
            new_column: "risk22".to_string(),
            thresholds: vec![Threshold { check: 0.2, value: 0.0 }],
            default: 4.0,
        }];
        (table, geometries, rules)
    }

    fn options() -> FigureOptions {
        FigureOptions {
            map_style: MapStyle::default(),
            color_scale: ColorScale::default(),
            view: MapView::default_for(&MapConfig::default()),
            opacity: 0.5,
        }
    }

    #[test]
    fn test_figure_colors_by_normalized_risk() {
        let (table, geometries, rules) = fixture();
        let report = compute_risk(&table, &rules).unwrap();
        let figure = build_figure(&table, &report, &geometries, &options());

        assert_eq!(figure.geojson.features.len(), 2);
        assert_eq!(figure.missing_geometry, 1);
        assert!(!figure.degenerate);
        assert_eq!(figure.zoom, 11.0);

        let props = figure.geojson.features[1].properties.as_ref().unwrap();
        assert_eq!(props["fid"], json!(2));
        assert_eq!(props["ALTPARNO"], json!("B"));
        assert_eq!(props["cum_risk_normalized"], json!(1.0));
        assert_eq!(props["fill"], json!("#67000d"));

        let doc = serde_json::to_value(&figure).unwrap();
        assert_eq!(doc["map_style"], json!("carto-positron"));
        assert_eq!(doc["geojson"]["type"], json!("FeatureCollection"));
    }

    #[test]
    fn test_degenerate_figure_uses_low_end() {
        let (table, geometries, mut rules) = fixture();
        rules[0].thresholds.clear();
        let report = compute_risk(&table, &rules).unwrap();
        let figure = build_figure(&table, &report, &geometries, &options());

        assert!(figure.degenerate);
        for feature in &figure.geojson.features {
            let props = feature.properties.as_ref().unwrap();
            assert_eq!(props["cum_risk_normalized"], JsonValue::Null);
            assert_eq!(props["fill"], json!("#fff5f0"));
        }
    }
}
