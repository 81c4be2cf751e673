#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parcel, year and panel row types.
//!
//! These types describe the data flowing through the field panel pipeline:
//! reference-year parcels that anchor identity, candidate polygons from the
//! other survey years, the per-year match outcome, and the final long panel
//! with one row per (parcel, year).

pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Stable parcel identity, taken from the reference-year feature id.
pub type ParcelId = i64;

/// A survey year.
pub type Year = u16;

/// The survey year whose polygons define every parcel identity.
pub const REFERENCE_YEAR: Year = 2024;

/// First year of the survey window.
pub const FIRST_SURVEY_YEAR: Year = 2017;

/// Maximum acreage discrepancy for a cross-year match to be trusted.
pub const DEFAULT_ACCEPTANCE_THRESHOLD_ACRES: f64 = 0.01;

/// Square meters in one international acre.
pub const SQ_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Returns the default survey window, oldest year first.
#[must_use]
pub fn default_survey_years() -> Vec<Year> {
    (FIRST_SURVEY_YEAR..=REFERENCE_YEAR).collect()
}

/// The year-varying attribute families carried by a survey polygon.
///
/// In the wide representation each family appears once per year as a
/// suffixed column (`crop_2019`, `irr_method_2023`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeFamily {
    /// Surveyed area of the matched polygon.
    Acres,
    /// Crop description.
    Crop,
    /// Survey crop class name.
    Cdl,
    /// Crop group.
    CropGroup,
    /// Land-use group.
    LandUseGroup,
    /// Irrigation method code.
    IrrMethod,
}

impl AttributeFamily {
    /// Returns the year-suffixed column name for this family.
    #[must_use]
    pub fn column_name(self, year: Year) -> String {
        format!("{}_{year}", self.as_ref())
    }

    /// Families that are cleared when a match fails the area test.
    pub const CROP_RELATED: &[Self] = &[
        Self::Crop,
        Self::Cdl,
        Self::CropGroup,
        Self::LandUseGroup,
        Self::IrrMethod,
    ];
}

/// Splits a year-suffixed column name into its family and year.
///
/// Returns `None` for identifier columns and anything whose suffix is not
/// a four-digit year.
#[must_use]
pub fn parse_suffixed_column(name: &str) -> Option<(AttributeFamily, Year)> {
    let (stub, suffix) = name.rsplit_once('_')?;
    if suffix.len() != 4 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let family = stub.parse::<AttributeFamily>().ok()?;
    let year = suffix.parse::<Year>().ok()?;
    Some((family, year))
}

/// Crop-related attributes recorded by one survey polygon in one year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropAttributes {
    /// Crop description (e.g. "Alfalfa").
    pub crop: Option<String>,
    /// Crop class name.
    pub cdl: Option<String>,
    /// Crop group.
    pub crop_group: Option<String>,
    /// Land-use group.
    pub land_use_group: Option<String>,
    /// Irrigation method code.
    pub irr_method: Option<String>,
}

impl CropAttributes {
    /// Returns the value of a crop-related family. `Acres` is not stored
    /// here and always yields `None`.
    #[must_use]
    pub fn get(&self, family: AttributeFamily) -> Option<&str> {
        match family {
            AttributeFamily::Acres => None,
            AttributeFamily::Crop => self.crop.as_deref(),
            AttributeFamily::Cdl => self.cdl.as_deref(),
            AttributeFamily::CropGroup => self.crop_group.as_deref(),
            AttributeFamily::LandUseGroup => self.land_use_group.as_deref(),
            AttributeFamily::IrrMethod => self.irr_method.as_deref(),
        }
    }

    /// Returns `true` if every field is null.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.crop.is_none()
            && self.cdl.is_none()
            && self.crop_group.is_none()
            && self.land_use_group.is_none()
            && self.irr_method.is_none()
    }
}

/// A reference-year parcel. Its `id`, administrative fields, acreage and
/// geometry are carried unchanged into every year of the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceParcel {
    /// Stable identity.
    pub id: ParcelId,
    /// County name.
    pub county: Option<String>,
    /// Hydrologic basin.
    pub basin: Option<String>,
    /// Basin sub-area.
    pub sub_area: Option<String>,
    /// Land-use classification.
    pub land_use: Option<String>,
    /// Reference-year area in acres.
    pub acres: f64,
    /// Reference-year crop attributes.
    pub attributes: CropAttributes,
    /// Reference-year polygon in the panel's planar CRS.
    pub geometry: Arc<MultiPolygon<f64>>,
}

/// A polygon from a non-reference survey year, considered as a match for
/// reference parcels. Never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateParcel {
    /// Row position in the year's layer, used as the deterministic
    /// tie-break between equally good matches.
    pub index: usize,
    /// Feature id within its own year, if the layer carries one.
    pub source_id: Option<i64>,
    /// Surveyed area in acres.
    pub acres: f64,
    /// That year's crop attributes.
    pub attributes: CropAttributes,
    /// Polygon in the panel's planar CRS.
    pub geometry: MultiPolygon<f64>,
}

/// How a reference parcel was resolved against one survey year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// The block comes from the reference parcel itself.
    Reference,
    /// No polygon in that year intersects the parcel.
    NoCandidate,
    /// The best candidate disagreed on area by more than the threshold;
    /// its crop attributes were discarded.
    Rejected {
        /// Row index of the chosen candidate.
        candidate: usize,
        /// Absolute acreage difference.
        area_diff: f64,
    },
    /// The best candidate agreed on area; its attributes were kept.
    Accepted {
        /// Row index of the chosen candidate.
        candidate: usize,
        /// Absolute acreage difference.
        area_diff: f64,
    },
}

impl MatchOutcome {
    /// Absolute acreage difference of the chosen candidate, if any.
    #[must_use]
    pub const fn area_diff(&self) -> Option<f64> {
        match self {
            Self::Rejected { area_diff, .. } | Self::Accepted { area_diff, .. } => Some(*area_diff),
            Self::Reference => Some(0.0),
            Self::NoCandidate => None,
        }
    }

    /// Returns `true` when a geometric candidate existed, accepted or not.
    #[must_use]
    pub const fn has_candidate(&self) -> bool {
        !matches!(self, Self::NoCandidate)
    }

    /// Returns `true` when the year's attributes are trusted.
    #[must_use]
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Reference | Self::Accepted { .. })
    }
}

/// One year's resolved attribute block for a reference parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct YearBlock {
    /// Acreage of the matched polygon (null when nothing intersected).
    pub acres: Option<f64>,
    /// Crop attributes, nulled when the match was rejected.
    pub attributes: CropAttributes,
    /// How the block was produced.
    pub outcome: MatchOutcome,
}

impl YearBlock {
    /// The block for a parcel with no intersecting polygon.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            acres: None,
            attributes: CropAttributes::default(),
            outcome: MatchOutcome::NoCandidate,
        }
    }

    /// The reference year's own block for a parcel.
    #[must_use]
    pub fn from_reference(parcel: &ReferenceParcel) -> Self {
        Self {
            acres: Some(parcel.acres),
            attributes: parcel.attributes.clone(),
            outcome: MatchOutcome::Reference,
        }
    }
}

/// A reference parcel with its year-keyed attribute blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    /// The anchoring parcel.
    pub parcel: ReferenceParcel,
    /// Resolved attribute blocks keyed by year.
    pub blocks: BTreeMap<Year, YearBlock>,
}

/// The resolved table: one row per reference parcel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    /// Reference year of the anchoring parcels.
    pub reference_year: Year,
    /// Rows in reference-layer order.
    pub rows: Vec<WideRow>,
}

impl WideTable {
    /// Starts a table from the reference parcels, each holding only its
    /// reference-year block.
    #[must_use]
    pub fn from_reference(reference_year: Year, parcels: Vec<ReferenceParcel>) -> Self {
        let rows = parcels
            .into_iter()
            .map(|parcel| {
                let mut blocks = BTreeMap::new();
                blocks.insert(reference_year, YearBlock::from_reference(&parcel));
                WideRow { parcel, blocks }
            })
            .collect();

        Self {
            reference_year,
            rows,
        }
    }

    /// Number of reference parcels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no parcels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a panel row's final crop label came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CropSource {
    /// The land-use survey (possibly harmonized).
    Survey,
    /// Area-weighted majority class of the crop-cover raster.
    Raster,
}

/// One (parcel, year) observation in the long panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    /// Stable parcel identity.
    pub id: ParcelId,
    /// Survey year.
    pub year: Year,
    /// County name (reference year).
    pub county: Option<String>,
    /// Hydrologic basin (reference year).
    pub basin: Option<String>,
    /// Basin sub-area (reference year).
    pub sub_area: Option<String>,
    /// Land-use classification (reference year).
    pub land_use: Option<String>,
    /// Reference-year acreage.
    pub acres: f64,
    /// Crop label in the unified vocabulary.
    pub crop: Option<String>,
    /// Provenance of `crop`.
    pub crop_source: Option<CropSource>,
    /// Survey crop class name.
    pub cdl: Option<String>,
    /// Crop group.
    pub crop_group: Option<String>,
    /// Land-use group.
    pub land_use_group: Option<String>,
    /// Irrigation method code.
    pub irr_method: Option<String>,
    /// Identity resolution outcome for this year.
    pub match_outcome: MatchOutcome,
    /// Rooting-zone depth of `crop`, in inches.
    pub rooting_zone_depth: Option<f64>,
    /// Whether `crop` is a cultivated crop.
    pub cultivated: Option<bool>,
    /// Reference-year polygon, shared by every year of the parcel.
    pub geometry: Arc<MultiPolygon<f64>>,
}

impl PanelRow {
    /// Returns `true` if the raster may supply this row's crop: the crop is
    /// null and no survey label was ever attached. A survey label cleared
    /// by the vocabulary check keeps its [`CropSource::Survey`] provenance
    /// and stays null.
    #[must_use]
    pub const fn awaits_raster(&self) -> bool {
        self.crop.is_none() && self.crop_source.is_none()
    }
}

/// The long panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    /// Years covered, oldest first.
    pub years: Vec<Year>,
    /// Rows ordered by `id` ascending, then `year` descending.
    pub rows: Vec<PanelRow>,
}

impl Panel {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the panel has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row for a given parcel and year.
    #[must_use]
    pub fn row(&self, id: ParcelId, year: Year) -> Option<&PanelRow> {
        self.rows.iter().find(|r| r.id == id && r.year == year)
    }

    /// Counts rows whose crop is still null.
    #[must_use]
    pub fn missing_crop_count(&self) -> usize {
        self.rows.iter().filter(|r| r.crop.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator as _;

    #[test]
    fn suffixed_column_names_round_trip_through_parser() {
        for family in AttributeFamily::iter() {
            let name = family.column_name(2019);
            assert_eq!(parse_suffixed_column(&name), Some((family, 2019)));
        }
    }

    #[test]
    fn parse_prefers_longest_family_stub() {
        assert_eq!(
            parse_suffixed_column("crop_group_2021"),
            Some((AttributeFamily::CropGroup, 2021))
        );
        assert_eq!(
            parse_suffixed_column("land_use_group_2017"),
            Some((AttributeFamily::LandUseGroup, 2017))
        );
    }

    #[test]
    fn identifier_columns_are_not_suffixed() {
        assert_eq!(parse_suffixed_column("id"), None);
        assert_eq!(parse_suffixed_column("sub_area"), None);
        assert_eq!(parse_suffixed_column("land_use"), None);
        assert_eq!(parse_suffixed_column("crop_20x4"), None);
        assert_eq!(parse_suffixed_column("county_2024"), None);
    }

    #[test]
    fn default_window_covers_2017_through_2024() {
        let years = default_survey_years();
        assert_eq!(years.first(), Some(&2017));
        assert_eq!(years.last(), Some(&2024));
        assert_eq!(years.len(), 8);
    }

    #[test]
    fn outcome_flags() {
        assert!(!MatchOutcome::NoCandidate.has_candidate());
        assert!(MatchOutcome::Rejected {
            candidate: 0,
            area_diff: 1.0
        }
        .has_candidate());
        assert!(!MatchOutcome::Rejected {
            candidate: 0,
            area_diff: 1.0
        }
        .is_trusted());
        assert!(MatchOutcome::Reference.is_trusted());
        assert_eq!(MatchOutcome::NoCandidate.area_diff(), None);
    }
}
