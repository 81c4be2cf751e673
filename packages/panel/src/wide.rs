//! Wide CSV export: one row per reference parcel with year-suffixed
//! attribute columns (`acres_2017`, `crop_2017`, ..., `irr_method_2024`).

use std::io::Write;
use std::path::Path;

use field_panel_parcel_models::{AttributeFamily, WideTable, Year};
use strum::IntoEnumIterator as _;

use crate::PanelError;

const IDENTIFIER_COLUMNS: &[&str] = &["id", "county", "basin", "sub_area", "land_use"];

/// Column names of the wide export for `years`, in write order.
#[must_use]
pub fn wide_header(years: &[Year]) -> Vec<String> {
    let mut header: Vec<String> = IDENTIFIER_COLUMNS.iter().map(ToString::to_string).collect();
    for &year in years {
        header.extend(AttributeFamily::iter().map(|family| family.column_name(year)));
    }
    header
}

/// Writes `table` in the suffixed wide shape. Years missing from a row are
/// written as empty cells.
///
/// # Errors
///
/// Returns [`PanelError::Csv`] if a record cannot be written.
pub fn write_wide_csv<W: Write>(
    table: &WideTable,
    years: &[Year],
    writer: W,
) -> Result<(), PanelError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(wide_header(years))?;

    for row in &table.rows {
        let parcel = &row.parcel;
        let mut record = vec![
            parcel.id.to_string(),
            parcel.county.clone().unwrap_or_default(),
            parcel.basin.clone().unwrap_or_default(),
            parcel.sub_area.clone().unwrap_or_default(),
            parcel.land_use.clone().unwrap_or_default(),
        ];

        for year in years {
            let block = row.blocks.get(year);
            for family in AttributeFamily::iter() {
                let cell = match (block, family) {
                    (None, _) => String::new(),
                    (Some(b), AttributeFamily::Acres) => {
                        b.acres.map(|a| a.to_string()).unwrap_or_default()
                    }
                    (Some(b), _) => b.attributes.get(family).unwrap_or_default().to_string(),
                };
                record.push(cell);
            }
        }

        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    log::info!("Wrote {} wide rows across {} years", table.len(), years.len());
    Ok(())
}

/// Writes the wide table to a CSV file at `path`, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns [`PanelError`] if the file cannot be created or written.
pub fn write_wide_table(table: &WideTable, years: &[Year], path: &Path) -> Result<(), PanelError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    write_wide_csv(table, years, std::fs::File::create(path)?)?;
    log::info!("Wide table written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use field_panel_parcel_models::{YearBlock, parse_suffixed_column};

    use super::*;
    use crate::test_support::table;

    #[test]
    fn header_has_identifiers_then_suffixed_families() {
        let header = wide_header(&[2023, 2024]);
        assert_eq!(&header[..5], IDENTIFIER_COLUMNS);
        assert_eq!(header.len(), 5 + 2 * 6);
        assert_eq!(header[5], "acres_2023");
        assert_eq!(header[6], "crop_2023");

        for column in &header[5..] {
            assert!(parse_suffixed_column(column).is_some(), "{column}");
        }
    }

    #[test]
    fn rows_carry_each_years_block() {
        let years = vec![2023, 2024];
        let mut wide = table(&[4], &years, 2024);
        wide.rows[0].blocks.insert(2023, YearBlock::empty());

        let mut buf = Vec::new();
        write_wide_csv(&wide, &years, &mut buf).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers = reader.headers().unwrap().clone();
        let record = reader.records().next().unwrap().unwrap();

        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        assert_eq!(&record[col("id")], "4");
        assert_eq!(&record[col("crop_2023")], "");
        assert_eq!(&record[col("acres_2023")], "");
        assert_eq!(&record[col("crop_2024")], "Grass Hay");
        assert_eq!(&record[col("acres_2024")], "10");
    }
}
