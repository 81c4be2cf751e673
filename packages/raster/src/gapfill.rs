//! Filling missing survey crops from the crop-cover raster.
//!
//! Only rows whose crop is still null are touched; a survey label, once
//! present, always wins. For each such row the parcel's area-weighted
//! majority class is looked up in the code table, remapped onto the unified
//! vocabulary for that year, and written with [`CropSource::Raster`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use field_panel_parcel_models::progress::ProgressCallback;
use field_panel_parcel_models::{CropSource, Panel, Year};
use field_panel_spatial::Reprojector;
use field_panel_taxonomy::{ClassCode, CropCodeTable, RasterRemap};
use geo::MultiPolygon;
use rayon::prelude::*;

use crate::RasterError;
use crate::geotiff::CategoricalRaster;
use crate::zonal::majority_class;

/// Gap-fill outcome for one year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearFillStats {
    /// Raster year.
    pub year: Year,
    /// Rows with a null crop before filling.
    pub missing: usize,
    /// Rows filled from the raster.
    pub filled: usize,
    /// Parcels that overlap no valid raster cell.
    pub no_coverage: usize,
    /// Majority codes absent from the code table.
    pub unlabeled_code: usize,
    /// Raster labels with no remap rule.
    pub unmapped_label: usize,
}

/// Gap-fill outcome for a whole panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapFillReport {
    /// Per-year statistics for every year that had a raster.
    pub years: Vec<YearFillStats>,
    /// Years with missing crops but no raster.
    pub years_without_raster: Vec<Year>,
}

impl GapFillReport {
    /// Total rows filled.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.years.iter().map(|s| s.filled).sum()
    }
}

/// Fills null panel crops from yearly categorical rasters.
#[derive(Debug)]
pub struct GapFiller {
    codes: CropCodeTable,
    remap: RasterRemap,
    reprojector: Option<Reprojector>,
    expected_epsg: Option<u16>,
    nodata: Option<ClassCode>,
}

impl GapFiller {
    /// A gap-filler using `codes` to label raster classes and the built-in
    /// remap rules.
    #[must_use]
    pub fn new(codes: CropCodeTable) -> Self {
        Self {
            codes,
            remap: RasterRemap::default(),
            reprojector: None,
            expected_epsg: None,
            nodata: None,
        }
    }

    /// Replaces the remap rules.
    #[must_use]
    pub fn with_remap(mut self, remap: RasterRemap) -> Self {
        self.remap = remap;
        self
    }

    /// Reprojects parcel geometry into the raster CRS before extraction.
    #[must_use]
    pub fn with_reprojector(mut self, reprojector: Reprojector) -> Self {
        self.reprojector = Some(reprojector);
        self
    }

    /// Requires rasters that declare an EPSG code to declare this one.
    #[must_use]
    pub fn with_expected_epsg(mut self, epsg: Option<u16>) -> Self {
        self.expected_epsg = epsg;
        self
    }

    /// Overrides the NoData code declared by the rasters.
    #[must_use]
    pub fn with_nodata(mut self, nodata: Option<ClassCode>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Fills every year of `panel` that has a layer in `layers`.
    ///
    /// Rasters are loaded one year at a time. Years whose rows are all
    /// labeled are not loaded at all.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if a raster cannot be read, its CRS does not
    /// match, or parcel reprojection fails.
    pub fn fill(
        &self,
        panel: &mut Panel,
        layers: &BTreeMap<Year, PathBuf>,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<GapFillReport, RasterError> {
        let missing_years: BTreeSet<Year> = panel
            .rows
            .iter()
            .filter(|r| r.awaits_raster())
            .map(|r| r.year)
            .collect();

        let mut report = GapFillReport::default();
        progress.set_total(missing_years.len() as u64);

        for year in missing_years {
            let Some(path) = layers.get(&year) else {
                log::warn!("No raster for {year}: its missing crops stay null");
                report.years_without_raster.push(year);
                progress.inc(1);
                continue;
            };

            progress.set_message(format!("Raster {year}"));
            let mut raster = CategoricalRaster::open(path)?;
            if self.nodata.is_some() {
                raster.set_nodata(self.nodata);
            }
            report.years.push(self.fill_year(panel, year, &raster)?);
            progress.inc(1);
        }

        progress.finish(format!("Filled {} crops from rasters", report.filled()));
        Ok(report)
    }

    /// Fills the null crops of `year` from `raster`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::CrsMismatch`] when the raster's EPSG code
    /// differs from the expected one, [`RasterError::Spatial`] if a parcel
    /// cannot be reprojected, and [`RasterError::RotatedTransform`] for a
    /// rotated grid.
    pub fn fill_year(
        &self,
        panel: &mut Panel,
        year: Year,
        raster: &CategoricalRaster,
    ) -> Result<YearFillStats, RasterError> {
        if let (Some(expected), Some(found)) = (self.expected_epsg, raster.epsg())
            && expected != found
        {
            return Err(RasterError::CrsMismatch {
                year,
                expected,
                found,
            });
        }

        let targets: Vec<usize> = panel
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.year == year && r.awaits_raster())
            .map(|(i, _)| i)
            .collect();

        let geometries = targets
            .iter()
            .map(|&i| self.to_raster_crs(&panel.rows[i].geometry))
            .collect::<Result<Vec<_>, _>>()?;

        let codes = geometries
            .par_iter()
            .map(|geometry| majority_class(raster, geometry))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = YearFillStats {
            year,
            missing: targets.len(),
            ..YearFillStats::default()
        };
        let mut unlabeled = BTreeSet::new();
        let mut unmapped = BTreeSet::new();

        for (&i, code) in targets.iter().zip(codes) {
            let Some(code) = code else {
                stats.no_coverage += 1;
                continue;
            };
            let Some(label) = self.codes.label(code) else {
                stats.unlabeled_code += 1;
                unlabeled.insert(code);
                continue;
            };
            let Some(crop) = self.remap.remap(label, year) else {
                stats.unmapped_label += 1;
                unmapped.insert(label);
                continue;
            };

            let row = &mut panel.rows[i];
            row.crop = Some(crop.to_string());
            row.crop_source = Some(CropSource::Raster);
            stats.filled += 1;
        }

        for code in &unlabeled {
            log::warn!("{year}: raster class {code} is not in the crop code table");
        }
        for label in &unmapped {
            log::warn!("{year}: raster label {label:?} has no unified crop, left null");
        }
        log::info!(
            "{year}: filled {} of {} missing crops from raster ({} uncovered, {} unlabeled, {} unmapped)",
            stats.filled,
            stats.missing,
            stats.no_coverage,
            stats.unlabeled_code,
            stats.unmapped_label
        );

        Ok(stats)
    }

    fn to_raster_crs(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, RasterError> {
        match &self.reprojector {
            Some(reprojector) => Ok(reprojector.project(geometry)?),
            None => Ok(geometry.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use field_panel_parcel_models::progress::null_progress;
    use field_panel_parcel_models::{MatchOutcome, PanelRow, ParcelId};
    use geo::{Rect, coord};

    use super::*;
    use crate::geotiff::GeoTransform;

    const ALFALFA: ClassCode = 36;
    const DEVELOPED_MED: ClassCode = 123;
    const OPEN_WATER: ClassCode = 111;
    const UNLISTED: ClassCode = 200;

    fn codes() -> CropCodeTable {
        CropCodeTable::from_pairs([
            (ALFALFA, "Alfalfa"),
            (DEVELOPED_MED, "Developed/Med Intensity"),
            (OPEN_WATER, "Open Water"),
        ])
    }

    /// Raster with one 10 m column per entry of `classes`, origin (0, 10).
    fn strip(classes: &[ClassCode]) -> CategoricalRaster {
        CategoricalRaster::from_parts(
            u32::try_from(classes.len()).unwrap(),
            1,
            GeoTransform::north_up(0.0, 10.0, 10.0),
            Some(0),
            Some(26912),
            classes.to_vec(),
        )
        .unwrap()
    }

    /// Parcel `id` covers column `id` of the strip.
    fn row(id: ParcelId, year: Year, crop: Option<&str>) -> PanelRow {
        #[allow(clippy::cast_precision_loss)]
        let x = id as f64 * 10.0;
        PanelRow {
            id,
            year,
            county: None,
            basin: None,
            sub_area: None,
            land_use: None,
            acres: 0.02,
            crop: crop.map(ToString::to_string),
            crop_source: crop.map(|_| CropSource::Survey),
            cdl: None,
            crop_group: None,
            land_use_group: None,
            irr_method: None,
            match_outcome: MatchOutcome::NoCandidate,
            rooting_zone_depth: None,
            cultivated: None,
            geometry: Arc::new(MultiPolygon(vec![
                Rect::new(coord! { x: x + 1.0, y: 1.0 }, coord! { x: x + 9.0, y: 9.0 })
                    .to_polygon(),
            ])),
        }
    }

    fn panel(rows: Vec<PanelRow>) -> Panel {
        Panel {
            years: vec![2019, 2021],
            rows,
        }
    }

    #[test]
    fn null_crop_is_filled_from_majority_class() {
        let mut p = panel(vec![row(0, 2019, None)]);
        let stats = GapFiller::new(codes())
            .fill_year(&mut p, 2019, &strip(&[ALFALFA]))
            .unwrap();

        assert_eq!(p.rows[0].crop.as_deref(), Some("Alfalfa"));
        assert_eq!(p.rows[0].crop_source, Some(CropSource::Raster));
        assert_eq!(stats.filled, 1);
        assert_eq!(stats.missing, 1);
    }

    #[test]
    fn survey_crop_is_never_overwritten() {
        let mut p = panel(vec![row(0, 2019, Some("Corn"))]);
        let stats = GapFiller::new(codes())
            .fill_year(&mut p, 2019, &strip(&[ALFALFA]))
            .unwrap();

        assert_eq!(p.rows[0].crop.as_deref(), Some("Corn"));
        assert_eq!(p.rows[0].crop_source, Some(CropSource::Survey));
        assert_eq!(stats.missing, 0);
    }

    #[test]
    fn survey_label_outside_vocabulary_beats_raster() {
        use field_panel_taxonomy::{UnifiedVocabulary, UnknownCropPolicy};

        let raster = strip(&[ALFALFA]);
        for policy in [UnknownCropPolicy::Keep, UnknownCropPolicy::Null] {
            let mut p = panel(vec![row(0, 2019, Some("Sod Farm Turf"))]);
            UnifiedVocabulary::builtin().enforce(&mut p, policy);
            let stats = GapFiller::new(codes()).fill_year(&mut p, 2019, &raster).unwrap();

            let expected = (policy == UnknownCropPolicy::Keep).then_some("Sod Farm Turf");
            assert_eq!(p.rows[0].crop.as_deref(), expected, "{policy}");
            assert_eq!(p.rows[0].crop_source, Some(CropSource::Survey), "{policy}");
            assert_eq!(stats.missing, 0, "{policy}");
        }
    }

    #[test]
    fn only_rows_of_the_raster_year_are_filled() {
        let mut p = panel(vec![row(0, 2019, None), row(0, 2021, None)]);
        GapFiller::new(codes())
            .fill_year(&mut p, 2019, &strip(&[ALFALFA]))
            .unwrap();

        assert_eq!(p.row(0, 2019).unwrap().crop.as_deref(), Some("Alfalfa"));
        assert_eq!(p.row(0, 2021).unwrap().crop, None);
    }

    #[test]
    fn year_conditional_remap_applies() {
        let filler = GapFiller::new(codes());
        let raster = strip(&[DEVELOPED_MED]);
        let mut p = panel(vec![row(0, 2019, None), row(0, 2021, None)]);

        filler.fill_year(&mut p, 2019, &raster).unwrap();
        filler.fill_year(&mut p, 2021, &raster).unwrap();

        assert_eq!(p.row(0, 2019).unwrap().crop.as_deref(), Some("Vegetables"));
        assert_eq!(p.row(0, 2021).unwrap().crop.as_deref(), Some("Pasture"));
    }

    #[test]
    fn unmapped_and_unlabeled_classes_stay_null() {
        let mut p = panel(vec![row(0, 2019, None), row(1, 2019, None), row(2, 2019, None)]);
        let stats = GapFiller::new(codes())
            .fill_year(&mut p, 2019, &strip(&[OPEN_WATER, UNLISTED, 0]))
            .unwrap();

        assert!(p.rows.iter().all(|r| r.crop.is_none()));
        assert_eq!(stats.unmapped_label, 1);
        assert_eq!(stats.unlabeled_code, 1);
        assert_eq!(stats.no_coverage, 1);
        assert_eq!(stats.filled, 0);
    }

    #[test]
    fn epsg_mismatch_is_fatal() {
        let mut p = panel(vec![row(0, 2019, None)]);
        let result = GapFiller::new(codes())
            .with_expected_epsg(Some(5070))
            .fill_year(&mut p, 2019, &strip(&[ALFALFA]));

        assert!(matches!(
            result,
            Err(RasterError::CrsMismatch { expected: 5070, found: 26912, .. })
        ));
    }

    #[test]
    fn years_without_raster_are_reported() {
        let mut p = panel(vec![row(0, 2019, None), row(0, 2021, Some("Corn"))]);
        let report = GapFiller::new(codes())
            .fill(&mut p, &BTreeMap::new(), &null_progress())
            .unwrap();

        assert_eq!(report.years_without_raster, vec![2019]);
        assert_eq!(report.filled(), 0);
        assert_eq!(p.rows[0].crop, None);
    }
}
