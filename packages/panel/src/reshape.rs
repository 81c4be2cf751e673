//! Wide-to-long reshaping.
//!
//! Identifier columns (`id`, administrative fields, reference acreage and
//! geometry) are held fixed per parcel while every year-varying family is
//! unpivoted jointly on the same year axis.

use std::collections::BTreeSet;
use std::sync::Arc;

use field_panel_parcel_models::{CropSource, Panel, PanelRow, WideRow, WideTable, Year};

use crate::PanelError;

/// Reshapes `table` into a long panel over `years`.
///
/// Every parcel must carry exactly one block per year in `years`, and no
/// id may repeat. Rows come out ordered by `id` ascending, then `year`
/// descending. A row's crop is tagged [`CropSource::Survey`] when present.
///
/// # Errors
///
/// Returns [`PanelError::StructuralViolation`] if the years are empty,
/// duplicated or exclude the reference year, if an id repeats, or if any
/// parcel's year blocks differ from `years`.
pub fn reshape(table: &WideTable, years: &[Year]) -> Result<Panel, PanelError> {
    let year_set: BTreeSet<Year> = years.iter().copied().collect();
    if year_set.is_empty() {
        return Err(PanelError::structural("no survey years configured"));
    }
    if year_set.len() != years.len() {
        return Err(PanelError::structural(format!(
            "survey years contain duplicates: {years:?}"
        )));
    }
    if !year_set.contains(&table.reference_year) {
        return Err(PanelError::structural(format!(
            "reference year {} is not among the survey years {years:?}",
            table.reference_year
        )));
    }

    let mut seen = BTreeSet::new();
    for row in &table.rows {
        if !seen.insert(row.parcel.id) {
            return Err(PanelError::structural(format!(
                "duplicate parcel id {}",
                row.parcel.id
            )));
        }
        let block_years: BTreeSet<Year> = row.blocks.keys().copied().collect();
        if block_years != year_set {
            return Err(PanelError::structural(format!(
                "parcel {} has year blocks {block_years:?}, expected {year_set:?}",
                row.parcel.id
            )));
        }
    }

    let mut rows: Vec<PanelRow> = table.rows.iter().flat_map(unpivot_row).collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| b.year.cmp(&a.year)));

    let expected = table.rows.len() * year_set.len();
    if rows.len() != expected {
        return Err(PanelError::structural(format!(
            "reshaped {} rows, expected {expected}",
            rows.len()
        )));
    }

    log::info!(
        "Reshaped {} parcels x {} years into {} panel rows",
        table.rows.len(),
        year_set.len(),
        rows.len()
    );

    Ok(Panel {
        years: year_set.into_iter().collect(),
        rows,
    })
}

fn unpivot_row(row: &WideRow) -> impl Iterator<Item = PanelRow> + '_ {
    let parcel = &row.parcel;
    row.blocks.iter().map(move |(&year, block)| {
        let attrs = &block.attributes;
        PanelRow {
            id: parcel.id,
            year,
            county: parcel.county.clone(),
            basin: parcel.basin.clone(),
            sub_area: parcel.sub_area.clone(),
            land_use: parcel.land_use.clone(),
            acres: parcel.acres,
            crop: attrs.crop.clone(),
            crop_source: attrs.crop.as_ref().map(|_| CropSource::Survey),
            cdl: attrs.cdl.clone(),
            crop_group: attrs.crop_group.clone(),
            land_use_group: attrs.land_use_group.clone(),
            irr_method: attrs.irr_method.clone(),
            match_outcome: block.outcome,
            rooting_zone_depth: None,
            cultivated: None,
            geometry: Arc::clone(&parcel.geometry),
        }
    })
}
