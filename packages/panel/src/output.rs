//! Long panel writers.
//!
//! The `GeoJSON` writer streams one feature per (parcel, year) row into a
//! `FeatureCollection` whose `crs` member names the panel CRS. The CSV
//! writer drops geometry and keeps every attribute column.

use std::io::{BufWriter, Write};
use std::path::Path;

use field_panel_parcel_models::{CropSource, MatchOutcome, Panel, PanelRow, Year};
use field_panel_spatial::geojson_convert::from_multipolygon;
use serde::Serialize;

use crate::PanelError;

/// Short label for a match outcome, used as an output column.
#[must_use]
pub const fn outcome_label(outcome: &MatchOutcome) -> &'static str {
    match outcome {
        MatchOutcome::Reference => "reference",
        MatchOutcome::NoCandidate => "no_candidate",
        MatchOutcome::Rejected { .. } => "rejected",
        MatchOutcome::Accepted { .. } => "accepted",
    }
}

#[derive(Debug, Serialize)]
struct PanelRecord<'a> {
    id: i64,
    year: Year,
    county: Option<&'a str>,
    basin: Option<&'a str>,
    sub_area: Option<&'a str>,
    land_use: Option<&'a str>,
    acres: f64,
    cultivated: Option<bool>,
    crop: Option<&'a str>,
    crop_source: Option<CropSource>,
    crop_group: Option<&'a str>,
    land_use_group: Option<&'a str>,
    rooting_zone_depth: Option<f64>,
    irrigation_method: Option<&'a str>,
    match_status: &'static str,
    area_diff: Option<f64>,
}

impl<'a> From<&'a PanelRow> for PanelRecord<'a> {
    fn from(row: &'a PanelRow) -> Self {
        Self {
            id: row.id,
            year: row.year,
            county: row.county.as_deref(),
            basin: row.basin.as_deref(),
            sub_area: row.sub_area.as_deref(),
            land_use: row.land_use.as_deref(),
            acres: row.acres,
            cultivated: row.cultivated,
            crop: row.crop.as_deref(),
            crop_source: row.crop_source,
            crop_group: row.crop_group.as_deref(),
            land_use_group: row.land_use_group.as_deref(),
            rooting_zone_depth: row.rooting_zone_depth,
            irrigation_method: row.irr_method.as_deref(),
            match_status: outcome_label(&row.match_outcome),
            area_diff: row.match_outcome.area_diff().filter(|d| d.is_finite()),
        }
    }
}

/// Writes the panel as an attribute-only CSV.
///
/// # Errors
///
/// Returns [`PanelError::Csv`] if a record cannot be written.
pub fn write_csv<W: Write>(panel: &Panel, writer: W) -> Result<(), PanelError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in &panel.rows {
        csv_writer.serialize(PanelRecord::from(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the panel as a `GeoJSON` `FeatureCollection` in `crs`.
///
/// # Errors
///
/// Returns [`PanelError::Io`] or [`PanelError::Json`] on write failure.
pub fn write_geojson<W: Write>(panel: &Panel, crs: &str, writer: W) -> Result<(), PanelError> {
    let mut writer = BufWriter::new(writer);

    let crs_member = serde_json::json!({
        "type": "name",
        "properties": { "name": crs },
    });
    writer.write_all(b"{\"type\":\"FeatureCollection\",\"crs\":")?;
    serde_json::to_writer(&mut writer, &crs_member)?;
    writer.write_all(b",\"features\":[")?;

    for (i, row) in panel.rows.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",\n")?;
        }
        let feature = serde_json::json!({
            "type": "Feature",
            "geometry": from_multipolygon(&row.geometry),
            "properties": PanelRecord::from(row),
        });
        serde_json::to_writer(&mut writer, &feature)?;
    }

    writer.write_all(b"]}\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes the panel to `path`, choosing the format from the extension
/// (`.csv` for CSV, anything else for `GeoJSON`).
///
/// # Errors
///
/// Returns [`PanelError`] if the file cannot be created or written.
pub fn write_panel(panel: &Panel, crs: &str, path: &Path) -> Result<(), PanelError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_csv(panel, file)?;
    } else {
        write_geojson(panel, crs, file)?;
    }

    log::info!("Wrote {} panel rows to {}", panel.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reshape::reshape;
    use crate::test_support::table;

    fn sample_panel() -> Panel {
        let years = vec![2023, 2024];
        let mut panel = reshape(&table(&[7], &years, 2024), &years).unwrap();
        panel.rows[0].rooting_zone_depth = Some(36.0);
        panel.rows[0].cultivated = Some(true);
        panel
    }

    #[test]
    fn csv_has_expected_header_and_rows() {
        let mut buf = Vec::new();
        write_csv(&sample_panel(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "id,year,county,basin,sub_area,land_use,acres,cultivated,crop,crop_source,\
             crop_group,land_use_group,rooting_zone_depth,irrigation_method,match_status,area_diff"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("7,2024,Box Elder,Bear,Lower Bear,Agricultural,10.0,true,Grass Hay,survey,"));
        assert!(first.contains("reference"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn geojson_is_a_feature_collection_with_crs() {
        let mut buf = Vec::new();
        write_geojson(&sample_panel(), "EPSG:26912", &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], "EPSG:26912");

        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["type"], "MultiPolygon");
        assert_eq!(features[0]["properties"]["year"], 2024);
        assert_eq!(features[1]["properties"]["crop"], "Alfalfa");
        assert_eq!(features[1]["properties"]["match_status"], "accepted");
        assert!(features[0]["properties"].get("irrigation_method").is_some());
    }

    #[test]
    fn empty_panel_writes_empty_collection() {
        let mut buf = Vec::new();
        write_geojson(&Panel::default(), "EPSG:26912", &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["features"].as_array().unwrap().len(), 0);
    }
}
