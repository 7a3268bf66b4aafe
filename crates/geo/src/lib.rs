//! # Riparian Geo — Parcel Risk Scoring for a Riparian Buffer Dashboard
//!
//! Loads a parcel attribute table, its polygons and an optional conservation
//! table from local files, scores each parcel's land-cover fractions against
//! threshold rules and produces the choropleth map and info table the
//! dashboard shows.
//!
//! ## Architecture
//! - `risk.toml` — Declarative project config (data files, map, cover rules)
//! - `cata_data.csv` — One row per parcel, keyed by `fid`
//! - `parcels.geojson` — Parcel polygons in WGS84, keyed by `fid`
//!
//! ## Modules
//! - `config` — Parse `risk.toml`
//! - `parcels` — Parcel attribute table and conservation join
//! - `geometry` — Parcel polygons from GeoJSON (or Shapefile)
//! - `risk` — Threshold rules, cumulative risk and normalization
//! - `overrides` — Per-session cover edits and slider state
//! - `view` — Map center and zoom for the current selection
//! - `import` — Validated table uploads
//! - `choropleth` — Map figure: styles, color scales, feature fill
//! - `summary` — Selected-parcel info table
//! - `store` — Base data loaded from disk, with reload
//!
//! ## Table of Contents
//! 1. Module declarations
//! 2. Re-exports

pub mod config;
pub mod parcels;
pub mod geometry;
pub mod risk;
pub mod overrides;
pub mod view;
pub mod import;
pub mod choropleth;
pub mod summary;
pub mod store;

pub use config::{ConfigError, MapConfig, RiskConfig, Threshold, ThresholdRule};
pub use parcels::{Parcel, ParcelError, ParcelTable};
pub use geometry::{GeometryError, ParcelGeometries};
pub use risk::{compute_risk, Normalization, ParcelRisk, RiskError, RiskReport};
pub use overrides::{OverrideError, OverrideSet, SliderSpec};
pub use view::{resolve_view, LatLon, MapView, ViewError};
pub use import::{ImportError, ImportOutcome};
pub use choropleth::{build_figure, ColorScale, Figure, FigureError, FigureOptions, MapStyle};
pub use summary::{parcel_summary, ParcelSummary, SummaryError};
pub use store::{ParcelStore, StoreError, UploadTarget};
