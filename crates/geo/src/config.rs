//! # Risk Project Configuration
//!
//! Parses `risk.toml` — the declarative config for a riparian risk project.
//! Data paths are relative to the directory holding `risk.toml`.
//!
//! ## Table of Contents
//! 1. RiskConfig — Top-level project config
//! 2. DataConfig — Parcel data sources
//! 3. MapConfig — Map defaults
//! 4. ThresholdRule — Cover scoring rules
//! 5. Parsing and validation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::parcels::ParcelTable;

/// Expected number of parcels in the riparian zone dataset
pub const EXPECTED_PARCEL_ROWS: usize = 419;

// ============================================================================
// 1. RiskConfig — Top-level project config
// ============================================================================

/// Top-level risk project configuration, parsed from `risk.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Substring identifying land-cover columns that get a slider
    #[serde(default = "default_cover_marker")]
    pub cover_marker: String,
    /// Columns surfaced from the conservation table
    #[serde(default)]
    pub conservation_columns: Vec<String>,
    /// Data file locations
    pub data: DataConfig,
    /// Map defaults
    #[serde(default)]
    pub map: MapConfig,
    /// One scoring rule per land-cover column
    #[serde(default)]
    pub cover_columns: Vec<ThresholdRule>,
}

fn default_cover_marker() -> String {
    "%cover".to_string()
}

// ============================================================================
// 2. DataConfig — Parcel data sources
// ============================================================================

/// Parcel data files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Parcel attribute table (CSV)
    pub parcels: String,
    /// Parcel geometry collection (.geojson, or .shp with `shapefile-support`)
    pub geometry: String,
    /// Conservation attribute table (CSV), joined on `fid`
    #[serde(default)]
    pub conservation: Option<String>,
    /// Row count every uploaded table must have
    #[serde(default = "default_expected_rows")]
    pub expected_rows: usize,
}

fn default_expected_rows() -> usize {
    EXPECTED_PARCEL_ROWS
}

// ============================================================================
// 3. MapConfig — Map defaults
// ============================================================================

/// Default map view and styling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Latitude of the area-of-interest center (WGS84 degrees)
    #[serde(default = "default_lat")]
    pub default_lat: f64,
    /// Longitude of the area-of-interest center (WGS84 degrees)
    #[serde(default = "default_lon")]
    pub default_lon: f64,
    /// Zoom used when no parcel is centered
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,
    /// Zoom used when centered on a parcel
    #[serde(default = "default_parcel_zoom")]
    pub parcel_zoom: f64,
    /// Base map style name
    #[serde(default = "default_style")]
    pub style: String,
    /// Color scale name
    #[serde(default = "default_color_scale")]
    pub color_scale: String,
    /// Fill opacity of parcel polygons (0.0–1.0)
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_lat: default_lat(),
            default_lon: default_lon(),
            default_zoom: default_zoom(),
            parcel_zoom: default_parcel_zoom(),
            style: default_style(),
            color_scale: default_color_scale(),
            opacity: default_opacity(),
        }
    }
}

fn default_lat() -> f64 { 35.666930 }
fn default_lon() -> f64 { -82.097059 }
fn default_zoom() -> f64 { 11.0 }
fn default_parcel_zoom() -> f64 { 15.0 }
fn default_style() -> String { "carto-positron".to_string() }
fn default_color_scale() -> String { "reds".to_string() }
fn default_opacity() -> f64 { 0.5 }

// ============================================================================
// 4. ThresholdRule — Cover scoring rules
// ============================================================================

/// One bucket of a threshold rule: values strictly below `check` score `value`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Exclusive upper bound
    pub check: f64,
    /// Risk assigned when the field value is below `check`
    pub value: f64,
}

/// Ordered bucketing of one land-cover field into a derived risk field.
///
/// Thresholds are evaluated in order and the first match wins; `default`
/// catches every value no threshold matched (including NaN).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Stable rule identifier (defaults to `new_column`)
    #[serde(default)]
    pub id: Option<String>,
    /// Source field in the parcel table
    pub column: String,
    /// Name of the derived risk field
    pub new_column: String,
    /// Ordered thresholds
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
    /// Fallback risk value
    pub default: f64,
}

impl ThresholdRule {
    /// Stable identifier of this rule
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.new_column)
    }
}

// ============================================================================
// 5. Parsing and validation
// ============================================================================

impl RiskConfig {
    /// Load a RiskConfig from a `risk.toml` file path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| match e {
                ConfigError::Syntax(e) => ConfigError::Parse(path.to_path_buf(), e),
                other => other,
            })?;
        tracing::info!(
            "Loaded {} cover rules from {}",
            config.cover_columns.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse and structurally check a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RiskConfig = toml::from_str(content).map_err(ConfigError::Syntax)?;
        config.check_rules()?;
        Ok(config)
    }

    /// Resolve a path from `risk.toml` against the config directory
    pub fn resolve_path(&self, config_dir: &Path, relative: &str) -> PathBuf {
        config_dir.join(relative)
    }

    /// Rule ids and derived field names must be unique
    fn check_rules(&self) -> Result<(), ConfigError> {
        let mut ids = std::collections::HashSet::new();
        let mut derived = std::collections::HashSet::new();
        for rule in &self.cover_columns {
            if !ids.insert(rule.id().to_string()) {
                return Err(ConfigError::DuplicateRule(rule.id().to_string()));
            }
            if !derived.insert(rule.new_column.clone()) {
                return Err(ConfigError::DuplicateRule(rule.new_column.clone()));
            }
            // Risk values feed the cumulative sum; a check of +inf is a valid catch-all
            let finite_values = rule.default.is_finite()
                && rule
                    .thresholds
                    .iter()
                    .all(|t| t.value.is_finite() && !t.check.is_nan());
            if !finite_values {
                return Err(ConfigError::NonFiniteValue(rule.id().to_string()));
            }
        }
        Ok(())
    }

    /// Check every rule against the table schema.
    ///
    /// Source fields must be numeric columns of the table; derived fields
    /// must not shadow an existing column.
    pub fn validate_against(&self, table: &ParcelTable) -> Result<(), ConfigError> {
        for rule in &self.cover_columns {
            if !table.has_numeric_field(&rule.column) {
                return Err(ConfigError::UnknownColumn {
                    rule: rule.id().to_string(),
                    column: rule.column.clone(),
                });
            }
            if table.has_field(&rule.new_column) {
                return Err(ConfigError::ShadowedColumn {
                    rule: rule.id().to_string(),
                    column: rule.new_column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Errors from loading or validating risk.toml
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid config: {0}")]
    Syntax(toml::de::Error),

    #[error("Duplicate rule or derived field '{0}'")]
    DuplicateRule(String),

    #[error("Rule '{rule}' references unknown numeric column '{column}'")]
    UnknownColumn { rule: String, column: String },

    #[error("Rule '{rule}' derived field '{column}' collides with an existing column")]
    ShadowedColumn { rule: String, column: String },

    #[error("Rule '{0}' has a non-finite risk value or a NaN threshold")]
    NonFiniteValue(String),
}
