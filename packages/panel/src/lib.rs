#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Panel reshaping and output.
//!
//! Turns the resolved wide table (one row per reference parcel, one
//! attribute block per year) into the long panel with exactly one row per
//! (parcel, year), and writes the panel as `GeoJSON` or CSV. A panel that
//! would not be rectangular is never produced.

pub mod output;
pub mod reshape;
pub mod wide;

use thiserror::Error;

/// Errors raised while reshaping or writing the panel.
#[derive(Debug, Error)]
pub enum PanelError {
    /// The parcel × year grid is broken (duplicate id, missing or extra
    /// year block). The run must stop rather than emit a partial panel.
    #[error("Structural violation: {message}")]
    StructuralViolation {
        /// What was violated.
        message: String,
    },

    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PanelError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::StructuralViolation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use field_panel_parcel_models::{
        CropAttributes, MatchOutcome, ReferenceParcel, WideRow, WideTable, Year, YearBlock,
    };
    use geo::{MultiPolygon, Rect, coord};

    pub fn parcel(id: i64, acres: f64) -> ReferenceParcel {
        #[allow(clippy::cast_precision_loss)]
        let x = id as f64 * 100.0;
        ReferenceParcel {
            id,
            county: Some("Box Elder".to_string()),
            basin: Some("Bear".to_string()),
            sub_area: Some("Lower Bear".to_string()),
            land_use: Some("Agricultural".to_string()),
            acres,
            attributes: crop_block("Grass Hay"),
            geometry: Arc::new(MultiPolygon(vec![
                Rect::new(coord! { x: x, y: 0.0 }, coord! { x: x + 50.0, y: 50.0 }).to_polygon(),
            ])),
        }
    }

    pub fn crop_block(label: &str) -> CropAttributes {
        CropAttributes {
            crop: Some(label.to_string()),
            cdl: Some(label.to_string()),
            crop_group: Some("Hay".to_string()),
            land_use_group: Some("Irrigated".to_string()),
            irr_method: Some("Sprinkler".to_string()),
        }
    }

    /// A wide table where every parcel has an accepted block for each
    /// non-reference year in `years`.
    pub fn table(ids: &[i64], years: &[Year], reference_year: Year) -> WideTable {
        let rows = ids
            .iter()
            .map(|&id| {
                let parcel = parcel(id, 10.0);
                let mut blocks = BTreeMap::new();
                for &year in years {
                    let block = if year == reference_year {
                        YearBlock::from_reference(&parcel)
                    } else {
                        YearBlock {
                            acres: Some(10.0),
                            attributes: crop_block("Alfalfa"),
                            outcome: MatchOutcome::Accepted {
                                candidate: 0,
                                area_diff: 0.0,
                            },
                        }
                    };
                    blocks.insert(year, block);
                }
                WideRow { parcel, blocks }
            })
            .collect();

        WideTable {
            reference_year,
            rows,
        }
    }
}
