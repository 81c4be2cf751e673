#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crop-cover raster gap-filling.
//!
//! Reads yearly single-band categorical `GeoTIFF`s, computes each parcel's
//! area-weighted majority class, and fills panel rows whose survey crop is
//! missing with the class's unified label.

pub mod discover;
pub mod gapfill;
pub mod geotiff;
pub mod zonal;

use std::path::PathBuf;

use field_panel_parcel_models::Year;
use field_panel_spatial::SpatialError;
use thiserror::Error;

pub use discover::{discover_layers, year_from_file_name};
pub use gapfill::{GapFillReport, GapFiller, YearFillStats};
pub use geotiff::{CategoricalRaster, GeoTransform};
pub use zonal::{class_weights, majority_class};

/// Errors raised while reading rasters or filling the panel from them.
#[derive(Debug, Error)]
pub enum RasterError {
    /// A raster or raster directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TIFF could not be decoded.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The TIFF has no usable georeferencing tags.
    #[error("Raster has no ModelPixelScale/ModelTiepoint or ModelTransformation tags")]
    MissingGeoreference,

    /// Sample type cannot hold class codes.
    #[error("Unsupported raster sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// Pixel buffer length disagrees with the image dimensions.
    #[error("Raster has {found} samples, expected {expected}")]
    DataSize {
        /// `width * height`.
        expected: usize,
        /// Decoded samples.
        found: usize,
    },

    /// Zonal extraction needs a north-up grid.
    #[error("Rotated or sheared rasters are not supported")]
    RotatedTransform,

    /// The raster's EPSG code does not match the configured one.
    #[error("Raster for {year} is EPSG:{found}, expected EPSG:{expected}")]
    CrsMismatch {
        /// Raster year.
        year: Year,
        /// Configured code.
        expected: u16,
        /// Code found in the GeoKey directory.
        found: u16,
    },

    /// Parcel reprojection failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}
