//! Raster layer discovery.
//!
//! A raster directory holds one `.tif` per year with the year somewhere in
//! the file name (`CDL_2019_49.tif`). The first four-digit run is taken as
//! the year.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use field_panel_parcel_models::Year;
use regex::Regex;

use crate::RasterError;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4}").unwrap_or_else(|_| unreachable!()));

/// Extracts the year from a raster file name.
#[must_use]
pub fn year_from_file_name(name: &str) -> Option<Year> {
    YEAR_RE.find(name)?.as_str().parse().ok()
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

/// Scans `dir` for yearly rasters.
///
/// Files without a year in their name are skipped with a warning. When two
/// files carry the same year the first in path order is kept.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the directory cannot be listed.
pub fn discover_layers(dir: &Path) -> Result<BTreeMap<Year, PathBuf>, RasterError> {
    let io_err = |source| RasterError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_tiff(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut layers: BTreeMap<Year, PathBuf> = BTreeMap::new();
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let Some(year) = year_from_file_name(name) else {
            log::warn!("Skipping raster {}: no year in file name", path.display());
            continue;
        };
        if let Some(existing) = layers.get(&year) {
            log::warn!(
                "Skipping raster {}: {year} already provided by {}",
                path.display(),
                existing.display()
            );
            continue;
        }
        layers.insert(year, path);
    }

    log::info!("Found {} yearly rasters in {}", layers.len(), dir.display());
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_is_first_four_digit_run() {
        assert_eq!(year_from_file_name("CDL_2019_49.tif"), Some(2019));
        assert_eq!(year_from_file_name("2021_cdl.tif"), Some(2021));
        assert_eq!(year_from_file_name("cdl_utah.tif"), None);
        assert_eq!(year_from_file_name("cdl_49.tif"), None);
        assert_eq!(year_from_file_name("utah_cdl_2017_30m_cdls.tif"), Some(2017));
    }

    #[test]
    fn discovers_tiffs_by_year() {
        let dir = std::env::temp_dir().join(format!("field_panel_discover_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["CDL_2020_49.tif", "CDL_2021_49.TIF", "CDL_2020_49b.tif", "notes.txt", "nodate.tif"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let layers = discover_layers(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(layers.keys().copied().collect::<Vec<_>>(), vec![2020, 2021]);
        assert!(layers[&2020].ends_with("CDL_2020_49.tif"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(matches!(
            discover_layers(Path::new("/nonexistent/field_panel/rasters")),
            Err(RasterError::Io { .. })
        ));
    }
}
