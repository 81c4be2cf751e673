//! Year-keyed storage for normalized survey snapshots.
//!
//! The store hands out the reference year as [`ReferenceParcel`]s (the
//! fixed identity set) and every other year as [`CandidateParcel`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use field_panel_parcel_models::progress::ProgressCallback;
use field_panel_parcel_models::{CandidateParcel, ReferenceParcel, Year};
use field_panel_survey_models::SurveySource;

use crate::SurveyError;
use crate::normalize::{YearSnapshot, load_year};

/// Normalized survey snapshots keyed by year.
#[derive(Debug, Default)]
pub struct YearSnapshotStore {
    snapshots: BTreeMap<Year, YearSnapshot>,
}

impl YearSnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            snapshots: BTreeMap::new(),
        }
    }

    /// Loads every year in `years` from `source`.
    ///
    /// All layers must exist; a missing year would leave holes in the
    /// panel, so it aborts the load.
    ///
    /// # Errors
    ///
    /// Returns the first [`SurveyError`] raised by any year's load.
    pub fn load(
        source: &SurveySource,
        years: &[Year],
        target_crs: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Self, SurveyError> {
        progress.set_total(years.len() as u64);

        let mut store = Self::new();
        for &year in years {
            progress.set_message(format!("Loading {year}"));
            store.insert(load_year(source, year, target_crs)?);
            progress.inc(1);
        }

        progress.finish(format!("Loaded {} survey years", store.snapshots.len()));
        Ok(store)
    }

    /// Adds a snapshot, replacing any existing one for the same year.
    pub fn insert(&mut self, snapshot: YearSnapshot) {
        let year = snapshot.year;
        if self.snapshots.insert(year, snapshot).is_some() {
            log::warn!("Replacing previously loaded snapshot for {year}");
        }
    }

    /// Loaded years, oldest first.
    #[must_use]
    pub fn years(&self) -> Vec<Year> {
        self.snapshots.keys().copied().collect()
    }

    /// Returns the snapshot for `year`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::YearNotLoaded`] if the year is absent.
    pub fn get(&self, year: Year) -> Result<&YearSnapshot, SurveyError> {
        self.snapshots
            .get(&year)
            .ok_or(SurveyError::YearNotLoaded { year })
    }

    /// Builds the reference parcel set from `year`'s snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::MissingReferenceGeometry`] if the normalizer
    /// skipped any feature of `year` for lacking a polygon,
    /// [`SurveyError::MissingReferenceId`] for a feature without an id and
    /// [`SurveyError::DuplicateReferenceId`] when an id repeats.
    pub fn reference_parcels(&self, year: Year) -> Result<Vec<ReferenceParcel>, SurveyError> {
        let snapshot = self.get(year)?;
        if snapshot.stats.unsupported_geometry > 0 {
            return Err(SurveyError::MissingReferenceGeometry {
                year,
                count: snapshot.stats.unsupported_geometry,
            });
        }
        let mut seen = BTreeSet::new();

        snapshot
            .features
            .iter()
            .enumerate()
            .map(|(position, feature)| {
                let id = feature
                    .source_id
                    .ok_or(SurveyError::MissingReferenceId { position })?;
                if !seen.insert(id) {
                    return Err(SurveyError::DuplicateReferenceId { id });
                }

                Ok(ReferenceParcel {
                    id,
                    county: feature.county.clone(),
                    basin: feature.basin.clone(),
                    sub_area: feature.sub_area.clone(),
                    land_use: feature.land_use.clone(),
                    acres: feature.acres,
                    attributes: feature.attributes.clone(),
                    geometry: Arc::new(feature.geometry.clone()),
                })
            })
            .collect()
    }

    /// Returns `year`'s features as match candidates, indexed by layer
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::YearNotLoaded`] if the year is absent.
    pub fn candidates(&self, year: Year) -> Result<Vec<CandidateParcel>, SurveyError> {
        Ok(self
            .get(year)?
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| CandidateParcel {
                index,
                source_id: feature.source_id,
                acres: feature.acres,
                attributes: feature.attributes.clone(),
                geometry: feature.geometry.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{NormalizeStats, SurveyFeature};
    use field_panel_parcel_models::CropAttributes;
    use geo::{MultiPolygon, Rect, coord};

    fn feature(id: Option<i64>, acres: f64) -> SurveyFeature {
        SurveyFeature {
            source_id: id,
            county: Some("Cache".to_string()),
            basin: None,
            sub_area: None,
            land_use: Some("Agricultural".to_string()),
            acres,
            attributes: CropAttributes {
                crop: Some("Alfalfa".to_string()),
                ..CropAttributes::default()
            },
            geometry: MultiPolygon(vec![
                Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon(),
            ]),
        }
    }

    fn snapshot(year: Year, features: Vec<SurveyFeature>) -> YearSnapshot {
        YearSnapshot {
            year,
            features,
            stats: NormalizeStats::default(),
        }
    }

    #[test]
    fn reference_parcels_keep_ids_and_attributes() {
        let mut store = YearSnapshotStore::new();
        store.insert(snapshot(2024, vec![feature(Some(1), 2.0), feature(Some(2), 3.0)]));

        let parcels = store.reference_parcels(2024).unwrap();
        assert_eq!(parcels.len(), 2);
        assert_eq!(parcels[1].id, 2);
        assert_eq!(parcels[1].attributes.crop.as_deref(), Some("Alfalfa"));
    }

    #[test]
    fn duplicate_reference_id_is_fatal() {
        let mut store = YearSnapshotStore::new();
        store.insert(snapshot(2024, vec![feature(Some(5), 2.0), feature(Some(5), 3.0)]));

        assert!(matches!(
            store.reference_parcels(2024),
            Err(SurveyError::DuplicateReferenceId { id: 5 })
        ));
    }

    #[test]
    fn missing_reference_id_is_fatal() {
        let mut store = YearSnapshotStore::new();
        store.insert(snapshot(2024, vec![feature(Some(1), 2.0), feature(None, 3.0)]));

        assert!(matches!(
            store.reference_parcels(2024),
            Err(SurveyError::MissingReferenceId { position: 1 })
        ));
    }

    #[test]
    fn reference_feature_without_polygon_is_fatal() {
        let mut store = YearSnapshotStore::new();
        let mut reference = snapshot(2024, vec![feature(Some(1), 2.0)]);
        reference.stats.unsupported_geometry = 1;
        store.insert(reference);

        assert!(matches!(
            store.reference_parcels(2024),
            Err(SurveyError::MissingReferenceGeometry { year: 2024, count: 1 })
        ));
    }

    #[test]
    fn candidate_years_tolerate_skipped_geometry() {
        let mut store = YearSnapshotStore::new();
        let mut other = snapshot(2019, vec![feature(Some(1), 2.0)]);
        other.stats.unsupported_geometry = 3;
        store.insert(other);

        assert_eq!(store.candidates(2019).unwrap().len(), 1);
    }

    #[test]
    fn candidates_are_indexed_by_layer_position() {
        let mut store = YearSnapshotStore::new();
        store.insert(snapshot(2019, vec![feature(None, 2.0), feature(Some(9), 3.0)]));

        let candidates = store.candidates(2019).unwrap();
        assert_eq!(candidates[0].index, 0);
        assert_eq!(candidates[1].index, 1);
        assert_eq!(candidates[1].source_id, Some(9));
    }

    #[test]
    fn unknown_year_is_an_error() {
        let store = YearSnapshotStore::new();
        assert!(matches!(
            store.candidates(2018),
            Err(SurveyError::YearNotLoaded { year: 2018 })
        ));
    }
}
