#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crop taxonomy for the field panel.
//!
//! Survey crop labels drift between years ("Idle" vs "Fallow", "Grassy
//! Hay" vs "Grass Hay") and raster classes use their own naming. This
//! crate folds both onto one unified vocabulary with ordered rewrite rules,
//! and loads the crop reference tables (raster code labels, rooting depth).

pub mod raster;
pub mod reference;
pub mod rules;
pub mod survey;
pub mod vocabulary;

use std::path::PathBuf;

use thiserror::Error;

pub use raster::RasterRemap;
pub use reference::{
    ClassCode, CropCodeTable, RootingDepth, RootingDepthTable, attach_rooting_depth,
};
pub use rules::{Predicate, RewriteRule, RuleContext, RuleSet};
pub use survey::{HarmonizeReport, harmonize, harmonize_with};
pub use vocabulary::{UnifiedVocabulary, UnknownCropPolicy};

/// Errors raised while loading crop reference tables.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    /// The table file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Table path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The table is not valid CSV or has the wrong columns.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A cell could not be interpreted.
    #[error("Invalid value {value:?} in column {column} of {table}")]
    InvalidValue {
        /// Which table.
        table: &'static str,
        /// Which column.
        column: &'static str,
        /// Offending cell.
        value: String,
    },
}
