#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Land-use survey source definition types.
//!
//! A [`SurveySource`] describes where each year's survey layer lives, which
//! features belong to the panel, and how the layer's property names map
//! onto the pipeline's attribute families. The same definition drives the
//! loader for every year; per-year differences are expressed as schema
//! overrides instead of separate code paths.

use std::collections::BTreeMap;
use std::path::PathBuf;

use field_panel_parcel_models::Year;
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the survey year in [`SurveySource::path_template`].
pub const YEAR_PLACEHOLDER: &str = "{year}";

/// A yearly land-use survey, deserialized from the `[survey]` TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveySource {
    /// Human-readable name (e.g. "Utah Water-Related Land Use").
    pub name: String,
    /// Path to each year's `GeoJSON` layer, with `{year}` as placeholder.
    pub path_template: String,
    /// Proj string of the layers' CRS. `None` means the layers are already
    /// in the panel's planar CRS.
    pub source_crs: Option<String>,
    /// Property equality filters; a feature must pass all of them.
    pub filters: Vec<AttributeFilter>,
    /// Property names for each attribute.
    pub fields: FieldSchema,
    /// Per-year field name overrides, keyed by year.
    pub year_overrides: BTreeMap<String, FieldOverrides>,
}

impl Default for SurveySource {
    fn default() -> Self {
        Self {
            name: "Utah Water-Related Land Use".to_string(),
            path_template: "data/wrlu/{year}/wrlu_{year}.geojson".to_string(),
            source_crs: None,
            filters: vec![
                AttributeFilter::new("Landuse", "Agricultural"),
                AttributeFilter::new("State", "Utah"),
            ],
            fields: FieldSchema::default(),
            year_overrides: BTreeMap::new(),
        }
    }
}

impl SurveySource {
    /// Resolves the layer path for a year.
    #[must_use]
    pub fn path_for(&self, year: Year) -> PathBuf {
        PathBuf::from(
            self.path_template
                .replace(YEAR_PLACEHOLDER, &year.to_string()),
        )
    }

    /// Returns the field schema for a year with its overrides applied.
    #[must_use]
    pub fn fields_for(&self, year: Year) -> FieldSchema {
        self.year_overrides
            .get(&year.to_string())
            .map_or_else(|| self.fields.clone(), |o| o.apply(&self.fields))
    }
}

/// Keeps only features whose `field` property equals `equals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    /// Property name.
    pub field: String,
    /// Required value.
    pub equals: String,
}

impl AttributeFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(field: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }
}

/// Maps layer property names onto pipeline attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    /// Unique-within-year feature id.
    pub id: String,
    /// County name.
    pub county: String,
    /// Hydrologic basin.
    pub basin: String,
    /// Basin sub-area.
    pub sub_area: String,
    /// Land-use classification.
    pub land_use: String,
    /// Area in acres.
    pub acres: String,
    /// Crop description.
    pub crop: String,
    /// Crop class name.
    pub cdl: String,
    /// Crop group.
    pub crop_group: String,
    /// Land-use group.
    pub land_use_group: String,
    /// Irrigation method.
    pub irr_method: String,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            id: "OBJECTID".to_string(),
            county: "County".to_string(),
            basin: "Basin".to_string(),
            sub_area: "SubArea".to_string(),
            land_use: "Landuse".to_string(),
            acres: "Acres".to_string(),
            crop: "Descriptio".to_string(),
            cdl: "Class_Name".to_string(),
            crop_group: "CropGroup".to_string(),
            land_use_group: "LU_Group".to_string(),
            irr_method: "IRR_Method".to_string(),
        }
    }
}

/// Partial [`FieldSchema`]; only the names that differ for one year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverrides {
    /// Feature id override.
    pub id: Option<String>,
    /// County override.
    pub county: Option<String>,
    /// Basin override.
    pub basin: Option<String>,
    /// Sub-area override.
    pub sub_area: Option<String>,
    /// Land-use override.
    pub land_use: Option<String>,
    /// Acres override.
    pub acres: Option<String>,
    /// Crop description override.
    pub crop: Option<String>,
    /// Crop class name override.
    pub cdl: Option<String>,
    /// Crop group override.
    pub crop_group: Option<String>,
    /// Land-use group override.
    pub land_use_group: Option<String>,
    /// Irrigation method override.
    pub irr_method: Option<String>,
}

impl FieldOverrides {
    /// Returns `base` with every overridden name replaced.
    #[must_use]
    pub fn apply(&self, base: &FieldSchema) -> FieldSchema {
        let pick = |o: &Option<String>, b: &String| o.clone().unwrap_or_else(|| b.clone());
        FieldSchema {
            id: pick(&self.id, &base.id),
            county: pick(&self.county, &base.county),
            basin: pick(&self.basin, &base.basin),
            sub_area: pick(&self.sub_area, &base.sub_area),
            land_use: pick(&self.land_use, &base.land_use),
            acres: pick(&self.acres, &base.acres),
            crop: pick(&self.crop, &base.crop),
            cdl: pick(&self.cdl, &base.cdl),
            crop_group: pick(&self.crop_group, &base.crop_group),
            land_use_group: pick(&self.land_use_group, &base.land_use_group),
            irr_method: pick(&self.irr_method, &base.irr_method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_template_substitutes_every_placeholder() {
        let source = SurveySource::default();
        assert_eq!(
            source.path_for(2019),
            PathBuf::from("data/wrlu/2019/wrlu_2019.geojson")
        );
    }

    #[test]
    fn year_override_replaces_only_named_fields() {
        let toml_str = r#"
            path_template = "layers/{year}.geojson"

            [year_overrides.2017]
            crop = "Crop_Desc"
        "#;
        let source: SurveySource = toml::from_str(toml_str).unwrap();

        let fields_2017 = source.fields_for(2017);
        assert_eq!(fields_2017.crop, "Crop_Desc");
        assert_eq!(fields_2017.acres, "Acres");

        let fields_2018 = source.fields_for(2018);
        assert_eq!(fields_2018.crop, "Descriptio");
    }

    #[test]
    fn defaults_filter_to_utah_agriculture() {
        let source: SurveySource = toml::from_str("").unwrap();
        assert_eq!(source.filters.len(), 2);
        assert_eq!(source.filters[0], AttributeFilter::new("Landuse", "Agricultural"));
        assert_eq!(source.filters[1], AttributeFilter::new("State", "Utah"));
    }
}
