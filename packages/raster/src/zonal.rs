//! Area-weighted zonal statistics over a categorical raster.
//!
//! Each cell contributes the area of its overlap with the parcel polygon,
//! so a cell half inside the parcel counts half. NoData cells contribute
//! nothing.

use std::collections::BTreeMap;

use field_panel_taxonomy::ClassCode;
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};

use crate::RasterError;
use crate::geotiff::CategoricalRaster;

/// Overlap area per class code between `polygon` and the valid cells of
/// `raster`. Both must share a CRS.
///
/// # Errors
///
/// Returns [`RasterError::RotatedTransform`] if the raster grid is not
/// axis-aligned.
pub fn class_weights(
    raster: &CategoricalRaster,
    polygon: &MultiPolygon<f64>,
) -> Result<BTreeMap<ClassCode, f64>, RasterError> {
    if !raster.transform().is_axis_aligned() {
        return Err(RasterError::RotatedTransform);
    }

    let mut weights = BTreeMap::new();
    let Some(bounds) = polygon.bounding_rect() else {
        return Ok(weights);
    };
    let Some((cols, rows)) = raster.window(&bounds) else {
        return Ok(weights);
    };

    for row in rows {
        for col in cols.clone() {
            let Some(code) = raster.value(col, row) else {
                continue;
            };
            let cell = raster.cell_rect(col, row).to_polygon();
            if !polygon.intersects(&cell) {
                continue;
            }
            let area = polygon.intersection(&cell).unsigned_area();
            if area > 0.0 {
                *weights.entry(code).or_insert(0.0) += area;
            }
        }
    }

    Ok(weights)
}

/// The class covering the largest share of `polygon`. Equal weights go to
/// the lowest class code. `None` if no valid cell overlaps the polygon.
///
/// # Errors
///
/// Returns [`RasterError::RotatedTransform`] if the raster grid is not
/// axis-aligned.
pub fn majority_class(
    raster: &CategoricalRaster,
    polygon: &MultiPolygon<f64>,
) -> Result<Option<ClassCode>, RasterError> {
    Ok(pick_majority(&class_weights(raster, polygon)?))
}

fn pick_majority(weights: &BTreeMap<ClassCode, f64>) -> Option<ClassCode> {
    let mut best: Option<(ClassCode, f64)> = None;
    // Ascending code order, so only a strictly larger weight displaces.
    for (&code, &weight) in weights {
        if best.is_none_or(|(_, w)| weight > w) {
            best = Some((code, weight));
        }
    }
    best.map(|(code, _)| code)
}
