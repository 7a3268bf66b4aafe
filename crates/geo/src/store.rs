//! # Parcel Data Store
//!
//! Owns the base parcel table and geometry loaded from the files named in
//! `risk.toml`. The base table is never edited; per-session edits are applied
//! to a copy in `compute`.
//!
//! ## Table of Contents
//! 1. UploadTarget — Replaceable data files
//! 2. ParcelStore — Loading and reloading
//! 3. Computation
//! 4. Uploads

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{ConfigError, RiskConfig};
use crate::geometry::{GeometryError, ParcelGeometries};
use crate::import::{parse_upload, validate_and_store, ImportError, ImportOutcome};
use crate::overrides::{OverrideError, OverrideSet};
use crate::parcels::{ParcelError, ParcelTable};
use crate::risk::{compute_risk, rule_is_monotonic, RiskError, RiskReport};

// ============================================================================
// 1. UploadTarget — Replaceable data files
// ============================================================================

/// Data file an upload replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Parcels,
    Conservation,
}

impl FromStr for UploadTarget {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parcels" => Ok(UploadTarget::Parcels),
            "conservation" => Ok(UploadTarget::Conservation),
            other => Err(StoreError::UnknownUploadTarget(other.to_string())),
        }
    }
}

// ============================================================================
// 2. ParcelStore — Loading and reloading
// ============================================================================

/// Base parcel data for a project
#[derive(Debug, Clone)]
pub struct ParcelStore {
    config: RiskConfig,
    config_dir: PathBuf,
    table: ParcelTable,
    geometries: ParcelGeometries,
}

impl ParcelStore {
    /// Load `risk.toml` and every data file it names
    pub fn open(config_path: &Path) -> Result<Self, StoreError> {
        let config = RiskConfig::load(config_path)?;
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::with_config(config, config_dir)
    }

    /// Load data files for an already-parsed config
    pub fn with_config(config: RiskConfig, config_dir: PathBuf) -> Result<Self, StoreError> {
        let (table, geometries) = load_data(&config, &config_dir)?;
        Ok(Self { config, config_dir, table, geometries })
    }

    /// Re-read every data file from disk. On failure the current data stays.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let (table, geometries) = load_data(&self.config, &self.config_dir)?;
        self.table = table;
        self.geometries = geometries;
        tracing::info!("Reloaded parcel data ({} parcels)", self.table.len());
        Ok(())
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn table(&self) -> &ParcelTable {
        &self.table
    }

    pub fn geometries(&self) -> &ParcelGeometries {
        &self.geometries
    }

    /// Slider fields of the base table
    pub fn cover_fields(&self) -> Vec<String> {
        self.table.cover_fields(&self.config.cover_marker)
    }

    // ========================================================================
    // 3. Computation
    // ========================================================================

    /// Apply `overrides` to a copy of the base table and score it
    pub fn compute(&self, overrides: &OverrideSet) -> Result<(ParcelTable, RiskReport), StoreError> {
        let table = overrides.apply_to(&self.table)?;
        let report = compute_risk(&table, &self.config.cover_columns)?;
        Ok((table, report))
    }

    // ========================================================================
    // 4. Uploads
    // ========================================================================

    /// On-disk file an upload overwrites
    pub fn upload_target(&self, target: UploadTarget) -> Result<PathBuf, StoreError> {
        let relative = match target {
            UploadTarget::Parcels => Some(self.config.data.parcels.as_str()),
            UploadTarget::Conservation => self.config.data.conservation.as_deref(),
        };
        let relative = relative.ok_or(StoreError::NoConservationTable)?;
        Ok(self.config.resolve_path(&self.config_dir, relative))
    }

    /// Validate an upload, overwrite the target file and reload.
    ///
    /// The upload is checked the way the reload will read it: a parcel table
    /// must satisfy every cover rule and a conservation table must join on
    /// `fid` with every configured column. A file that would fail the reload
    /// is never written.
    pub fn import(&mut self, target: UploadTarget, bytes: &[u8], filename: &str) -> Result<ImportOutcome, StoreError> {
        let path = self.upload_target(target)?;
        let upload = parse_upload(bytes, filename)?;
        match target {
            UploadTarget::Parcels => {
                let candidate = ParcelTable::from_records(upload.headers, upload.rows)?;
                self.config.validate_against(&candidate)?;
            }
            UploadTarget::Conservation => {
                let csv = upload.to_csv()?;
                self.table
                    .clone()
                    .join_conservation(csv.as_slice(), &self.config.conservation_columns)?;
            }
        }
        let outcome = validate_and_store(bytes, filename, &path, self.config.data.expected_rows)?;
        self.reload()?;
        Ok(outcome)
    }
}

fn load_data(config: &RiskConfig, config_dir: &Path) -> Result<(ParcelTable, ParcelGeometries), StoreError> {
    let mut table = ParcelTable::load_csv(&config.resolve_path(config_dir, &config.data.parcels))?;
    if let Some(conservation) = &config.data.conservation {
        table.join_conservation_csv(
            &config.resolve_path(config_dir, conservation),
            &config.conservation_columns,
        )?;
    }
    config.validate_against(&table)?;

    for rule in &config.cover_columns {
        if !rule_is_monotonic(rule) {
            tracing::warn!(
                "Rule '{}' on {} is not ascending; larger covers may score lower",
                rule.id(),
                rule.column
            );
        }
    }

    let geometries = ParcelGeometries::load(&config.resolve_path(config_dir, &config.data.geometry))?;

    let without_geometry = table.fids().into_iter().filter(|f| !geometries.contains(*f)).count();
    let without_row = geometries.fids().filter(|f| !table.contains(*f)).count();
    if without_geometry > 0 || without_row > 0 {
        tracing::warn!(
            "fid mismatch: {} parcels without geometry, {} geometries without a parcel",
            without_geometry,
            without_row
        );
    }

    Ok((table, geometries))
}

/// Errors from the parcel data store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parcels(#[from] ParcelError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error("No conservation table is configured")]
    NoConservationTable,

    #[error("Unknown upload target '{0}'")]
    UnknownUploadTarget(String),
}
