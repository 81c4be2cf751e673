//! Crop reference tables.
//!
//! * `cdl_code,crop`: raster class code → raster class label.
//! * `crop,rz_in,cultivated`: unified crop → rooting-zone depth (inches)
//!   and whether the crop is cultivated.
//!
//! An empty table is skipped with a warning and behaves as a table with no
//! entries; lookups against it simply miss.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use field_panel_parcel_models::Panel;
use serde::Deserialize;

use crate::TaxonomyError;

/// A raster class code.
pub type ClassCode = u32;

fn open(path: &Path) -> Result<std::fs::File, TaxonomyError> {
    std::fs::File::open(path).map_err(|source| TaxonomyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Parses a class code, accepting spreadsheet-style integral floats
/// (`"36.0"`).
fn parse_code(value: &str) -> Option<ClassCode> {
    if let Ok(code) = value.parse::<ClassCode>() {
        return Some(code);
    }
    let float = value.parse::<f64>().ok()?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let code = float as ClassCode;
    (float >= 0.0 && float.fract() == 0.0 && f64::from(code) == float).then_some(code)
}

/// Parses a cultivated flag: `1/0`, `true/false`, `yes/no`, `y/n`.
fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" => Some(true),
        "0" | "0.0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CodeRecord {
    cdl_code: String,
    crop: String,
}

#[derive(Debug, Deserialize)]
struct RootingRecord {
    crop: String,
    #[serde(default)]
    rz_in: Option<String>,
    #[serde(default)]
    cultivated: Option<String>,
}

/// Raster class code → class label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CropCodeTable {
    labels: BTreeMap<ClassCode, String>,
}

impl CropCodeTable {
    /// Loads the table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] if the file cannot be read or a code is
    /// not an integer.
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let table = Self::from_reader(open(path)?)?;
        if table.is_empty() {
            log::warn!("Crop code table {} is empty, skipping", path.display());
        } else {
            log::info!("Loaded {} crop codes from {}", table.len(), path.display());
        }
        Ok(table)
    }

    /// Reads the table from CSV with `cdl_code,crop` columns. Repeated codes
    /// keep their first label.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] on malformed CSV or a non-integer code.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TaxonomyError> {
        let mut labels = BTreeMap::new();
        for record in csv_reader(reader).deserialize::<CodeRecord>() {
            let record = record?;
            if record.cdl_code.is_empty() || record.crop.is_empty() {
                continue;
            }
            let code = parse_code(&record.cdl_code).ok_or_else(|| TaxonomyError::InvalidValue {
                table: "crop codes",
                column: "cdl_code",
                value: record.cdl_code.clone(),
            })?;
            if let Some(existing) = labels.get(&code) {
                log::warn!("Duplicate crop code {code}: keeping {existing:?}, ignoring {:?}", record.crop);
                continue;
            }
            labels.insert(code, record.crop);
        }
        Ok(Self { labels })
    }

    /// Builds a table from `(code, label)` pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (ClassCode, &'a str)>) -> Self {
        Self {
            labels: pairs
                .into_iter()
                .map(|(code, label)| (code, label.to_string()))
                .collect(),
        }
    }

    /// The label for `code`.
    #[must_use]
    pub fn label(&self, code: ClassCode) -> Option<&str> {
        self.labels.get(&code).map(String::as_str)
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the table has no codes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Rooting-zone attributes of one crop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootingDepth {
    /// Rooting-zone depth in inches.
    pub rz_in: Option<f64>,
    /// Whether the crop is cultivated.
    pub cultivated: Option<bool>,
}

/// Unified crop → rooting-zone attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootingDepthTable {
    entries: BTreeMap<String, RootingDepth>,
}

impl RootingDepthTable {
    /// Loads the table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] if the file cannot be read or a cell is
    /// malformed.
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let table = Self::from_reader(open(path)?)?;
        if table.is_empty() {
            log::warn!("Rooting depth table {} is empty, skipping", path.display());
        } else {
            log::info!("Loaded rooting depth for {} crops from {}", table.len(), path.display());
        }
        Ok(table)
    }

    /// Reads the table from CSV with `crop,rz_in,cultivated` columns. Empty
    /// cells are nulls; repeated crops keep their first entry.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError`] on malformed CSV, a non-numeric depth, or
    /// an unrecognized cultivated flag.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TaxonomyError> {
        let mut entries = BTreeMap::new();
        for record in csv_reader(reader).deserialize::<RootingRecord>() {
            let record = record?;
            if record.crop.is_empty() {
                continue;
            }

            let rz_in = match record.rz_in.as_deref().filter(|v| !v.is_empty()) {
                None => None,
                Some(value) => Some(value.parse::<f64>().map_err(|_| TaxonomyError::InvalidValue {
                    table: "rooting depth",
                    column: "rz_in",
                    value: value.to_string(),
                })?),
            };
            let cultivated = match record.cultivated.as_deref().filter(|v| !v.is_empty()) {
                None => None,
                Some(value) => Some(parse_flag(value).ok_or_else(|| TaxonomyError::InvalidValue {
                    table: "rooting depth",
                    column: "cultivated",
                    value: value.to_string(),
                })?),
            };

            if entries.contains_key(&record.crop) {
                log::warn!("Duplicate rooting depth entry for {:?}, keeping the first", record.crop);
                continue;
            }
            entries.insert(record.crop, RootingDepth { rz_in, cultivated });
        }
        Ok(Self { entries })
    }

    /// Attributes for `crop`.
    #[must_use]
    pub fn get(&self, crop: &str) -> Option<RootingDepth> {
        self.entries.get(crop).copied()
    }

    /// Crops listed in the table.
    pub fn crops(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of crops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no crops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sets `rooting_zone_depth` and `cultivated` on every row whose crop is in
/// `table`; other rows get nulls. Returns the number of matched rows.
pub fn attach_rooting_depth(panel: &mut Panel, table: &RootingDepthTable) -> usize {
    let mut matched = 0;
    for row in &mut panel.rows {
        let depth = row.crop.as_deref().and_then(|crop| table.get(crop));
        row.rooting_zone_depth = depth.and_then(|d| d.rz_in);
        row.cultivated = depth.and_then(|d| d.cultivated);
        if depth.is_some() {
            matched += 1;
        }
    }

    let missing = panel.len() - matched;
    log::info!("Attached rooting depth to {matched} rows ({missing} without a match)");
    matched
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use field_panel_parcel_models::{MatchOutcome, PanelRow};
    use geo::MultiPolygon;

    use super::*;

    #[test]
    fn crop_codes_parse_with_float_codes_and_duplicates() {
        let csv = "cdl_code,crop\n1,Corn\n36.0,Alfalfa\n1,Maize\n,\n";
        let table = CropCodeTable::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.label(1), Some("Corn"));
        assert_eq!(table.label(36), Some("Alfalfa"));
        assert_eq!(table.label(2), None);
    }

    #[test]
    fn bad_code_is_an_error() {
        let csv = "cdl_code,crop\nabc,Corn\n";
        assert!(matches!(
            CropCodeTable::from_reader(csv.as_bytes()),
            Err(TaxonomyError::InvalidValue { column: "cdl_code", .. })
        ));
    }

    #[test]
    fn empty_tables_have_no_entries() {
        assert!(CropCodeTable::from_reader("".as_bytes()).unwrap().is_empty());
        assert!(CropCodeTable::from_reader("cdl_code,crop\n".as_bytes()).unwrap().is_empty());
        assert!(RootingDepthTable::from_reader("crop,rz_in,cultivated\n".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn rooting_depth_parses_nulls_and_flags() {
        let csv = "crop,rz_in,cultivated\nAlfalfa,60,1\nPasture,,no\nCorn,36.5,\n";
        let table = RootingDepthTable::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(
            table.get("Alfalfa"),
            Some(RootingDepth { rz_in: Some(60.0), cultivated: Some(true) })
        );
        assert_eq!(
            table.get("Pasture"),
            Some(RootingDepth { rz_in: None, cultivated: Some(false) })
        );
        assert_eq!(table.get("Corn").unwrap().rz_in, Some(36.5));
        assert_eq!(table.crops().count(), 3);
    }

    #[test]
    fn attach_fills_matches_and_nulls_misses() {
        let table = RootingDepthTable::from_reader("crop,rz_in,cultivated\nAlfalfa,60,true\n".as_bytes()).unwrap();
        let row = |crop: Option<&str>| PanelRow {
            id: 1,
            year: 2024,
            county: None,
            basin: None,
            sub_area: None,
            land_use: None,
            acres: 1.0,
            crop: crop.map(ToString::to_string),
            crop_source: None,
            cdl: None,
            crop_group: None,
            land_use_group: None,
            irr_method: None,
            match_outcome: MatchOutcome::Reference,
            rooting_zone_depth: Some(99.0),
            cultivated: None,
            geometry: Arc::new(MultiPolygon(vec![])),
        };
        let mut panel = Panel {
            years: vec![2024],
            rows: vec![row(Some("Alfalfa")), row(Some("Unknown")), row(None)],
        };

        assert_eq!(attach_rooting_depth(&mut panel, &table), 1);
        assert_eq!(panel.rows[0].rooting_zone_depth, Some(60.0));
        assert_eq!(panel.rows[0].cultivated, Some(true));
        assert_eq!(panel.rows[1].rooting_zone_depth, None);
        assert_eq!(panel.rows[2].cultivated, None);
    }
}
