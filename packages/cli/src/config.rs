//! Pipeline configuration loaded from a TOML file.
//!
//! Every section has defaults that reproduce the Utah 2017-2024 panel, so
//! an empty file (or no file at all) is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use field_panel_parcel_models::{
    DEFAULT_ACCEPTANCE_THRESHOLD_ACRES, REFERENCE_YEAR, Year, default_survey_years,
};
use field_panel_survey_models::SurveySource;
use field_panel_taxonomy::{ClassCode, UnknownCropPolicy};
use serde::Deserialize;
use thiserror::Error;

/// NAD83 / UTM zone 12N.
pub const DEFAULT_TARGET_CRS: &str = "+proj=utm +zone=12 +datum=NAD83 +units=m +no_defs";

/// Name written into `GeoJSON` output for [`DEFAULT_TARGET_CRS`].
pub const DEFAULT_CRS_NAME: &str = "EPSG:26912";

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`PanelConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The values parse but cannot describe a panel.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Years and matching parameters.
    pub panel: PanelSection,
    /// Survey layer locations and schema.
    pub survey: SurveySource,
    /// Yearly crop rasters.
    pub raster: RasterSection,
    /// Crop reference tables.
    pub reference: ReferenceSection,
    /// Output locations.
    pub output: OutputSection,
}

/// The `[panel]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PanelSection {
    /// Survey years making up the panel.
    pub years: Vec<Year>,
    /// Year whose parcels define identity.
    pub reference_year: Year,
    /// Maximum acreage difference for a cross-year match.
    pub threshold_acres: f64,
    /// Proj string of the planar CRS all geometry is held in.
    pub target_crs: String,
    /// CRS name written into `GeoJSON` output.
    pub crs_name: String,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            years: default_survey_years(),
            reference_year: REFERENCE_YEAR,
            threshold_acres: DEFAULT_ACCEPTANCE_THRESHOLD_ACRES,
            target_crs: DEFAULT_TARGET_CRS.to_string(),
            crs_name: DEFAULT_CRS_NAME.to_string(),
        }
    }
}

/// One explicitly listed raster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RasterLayer {
    /// Year the raster describes.
    pub year: Year,
    /// `GeoTIFF` path.
    pub path: PathBuf,
}

/// The `[raster]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RasterSection {
    /// Directory scanned for yearly `GeoTIFF`s.
    pub dir: Option<PathBuf>,
    /// Explicit layers. These win over discovered files for the same year.
    pub layers: Vec<RasterLayer>,
    /// Proj string of the rasters' CRS. When set, parcels are reprojected
    /// into it before extraction.
    pub crs: Option<String>,
    /// EPSG code every raster must declare, if it declares one.
    pub epsg: Option<u16>,
    /// NoData override.
    pub nodata: Option<ClassCode>,
}

impl RasterSection {
    /// `true` when no raster source is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dir.is_none() && self.layers.is_empty()
    }

    /// Explicit layers keyed by year. Later duplicates win.
    #[must_use]
    pub fn explicit_layers(&self) -> BTreeMap<Year, PathBuf> {
        self.layers
            .iter()
            .map(|layer| (layer.year, layer.path.clone()))
            .collect()
    }
}

/// The `[reference]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferenceSection {
    /// CSV with `cdl_code,crop` columns.
    pub crop_codes: PathBuf,
    /// CSV with `crop,rz_in,cultivated` columns.
    pub rooting_depth: PathBuf,
}

impl Default for ReferenceSection {
    fn default() -> Self {
        Self {
            crop_codes: PathBuf::from("data/reference/crop_codes.csv"),
            rooting_depth: PathBuf::from("data/reference/rooting_depth.csv"),
        }
    }
}

/// The `[output]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Long-format `GeoJSON` panel.
    pub geojson: Option<PathBuf>,
    /// Long-format CSV panel without geometry.
    pub csv: Option<PathBuf>,
    /// Wide table with year-suffixed columns.
    pub wide_csv: Option<PathBuf>,
    /// What to do with harmonized crops outside the vocabulary.
    pub unknown_crop: UnknownCropPolicy,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            geojson: Some(PathBuf::from("data/output/field_panel.geojson")),
            csv: None,
            wide_csv: None,
            unknown_crop: UnknownCropPolicy::default(),
        }
    }
}

impl PanelConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid
    /// TOML, or describes an impossible panel.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or fails
    /// validation.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.panel.years.sort_unstable();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let years = &self.panel.years;
        if years.is_empty() {
            return Err(ConfigError::Invalid("panel.years is empty".to_string()));
        }
        if years.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid("panel.years has duplicates".to_string()));
        }
        if !years.contains(&self.panel.reference_year) {
            return Err(ConfigError::Invalid(format!(
                "reference year {} is not in panel.years",
                self.panel.reference_year
            )));
        }
        Ok(())
    }
}
