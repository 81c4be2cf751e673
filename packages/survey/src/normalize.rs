//! Normalizes one survey year's raw `GeoJSON` layer.
//!
//! Uses the source's [`FieldSchema`] to pull identifiers and crop
//! attributes out of each feature regardless of the year's property
//! naming, applies the attribute filters, repairs invalid polygons and
//! reprojects into the panel CRS.

use std::path::Path;

use field_panel_parcel_models::{CropAttributes, Year};
use field_panel_spatial::{
    RepairOutcome, Reprojector, geojson_convert::to_multipolygon, planar_acres,
    repair_multipolygon,
};
use field_panel_survey_models::{AttributeFilter, FieldSchema, SurveySource};
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};

use crate::SurveyError;

/// One normalized survey polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyFeature {
    /// Feature id within its year.
    pub source_id: Option<i64>,
    /// County name.
    pub county: Option<String>,
    /// Hydrologic basin.
    pub basin: Option<String>,
    /// Basin sub-area.
    pub sub_area: Option<String>,
    /// Land-use classification.
    pub land_use: Option<String>,
    /// Surveyed area in acres.
    pub acres: f64,
    /// Crop attributes.
    pub attributes: CropAttributes,
    /// Repaired polygon in the panel CRS.
    pub geometry: MultiPolygon<f64>,
}

/// Counters collected while normalizing a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Features in the raw layer.
    pub total: usize,
    /// Features removed by the attribute filters.
    pub filtered_out: usize,
    /// Features skipped for a missing or non-polygonal geometry.
    pub unsupported_geometry: usize,
    /// Invalid polygons that were rebuilt.
    pub repaired: usize,
    /// Invalid polygons kept as-is because the rebuild was empty.
    pub unrepairable: usize,
    /// Features whose acreage was computed from geometry.
    pub computed_acres: usize,
}

/// One survey year after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct YearSnapshot {
    /// Survey year.
    pub year: Year,
    /// Normalized features in layer order.
    pub features: Vec<SurveyFeature>,
    /// Normalization counters.
    pub stats: NormalizeStats,
}

/// Loads and normalizes the layer for `year`.
///
/// # Errors
///
/// Returns [`SurveyError`] if the layer is missing or unreadable, is not
/// a `FeatureCollection`, or a CRS cannot be parsed or applied.
pub fn load_year(
    source: &SurveySource,
    year: Year,
    target_crs: &str,
) -> Result<YearSnapshot, SurveyError> {
    let path = source.path_for(year);
    if !path.exists() {
        return Err(SurveyError::MissingLayer { year, path });
    }

    log::info!("Loading {} {year} from {}", source.name, path.display());
    let collection = read_feature_collection(&path, year)?;

    let reprojector = source
        .source_crs
        .as_deref()
        .map(|src| Reprojector::new(src, target_crs))
        .transpose()?;

    normalize_layer(
        year,
        &collection,
        &source.fields_for(year),
        &source.filters,
        reprojector.as_ref(),
    )
}

fn read_feature_collection(path: &Path, year: Year) -> Result<FeatureCollection, SurveyError> {
    let text = std::fs::read_to_string(path).map_err(|source| SurveyError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => Err(SurveyError::NotAFeatureCollection { year }),
    }
}

/// Normalizes an in-memory layer.
///
/// Features with no polygonal geometry are skipped and counted; invalid
/// polygons are repaired, never dropped.
///
/// # Errors
///
/// Returns [`SurveyError::Spatial`] if reprojection fails for a feature.
pub fn normalize_layer(
    year: Year,
    collection: &FeatureCollection,
    fields: &FieldSchema,
    filters: &[AttributeFilter],
    reprojector: Option<&Reprojector>,
) -> Result<YearSnapshot, SurveyError> {
    let mut stats = NormalizeStats {
        total: collection.features.len(),
        ..NormalizeStats::default()
    };
    let mut features = Vec::with_capacity(collection.features.len());

    for feature in &collection.features {
        let empty = JsonObject::new();
        let props = feature.properties.as_ref().unwrap_or(&empty);

        if !passes_filters(props, filters) {
            stats.filtered_out += 1;
            continue;
        }

        let Some(geometry) = feature_polygon(feature) else {
            stats.unsupported_geometry += 1;
            log::warn!(
                "{year}: skipping feature {:?} with missing or non-polygon geometry",
                prop_i64(props, &fields.id)
            );
            continue;
        };

        let (geometry, outcome) = repair_multipolygon(geometry);
        match outcome {
            RepairOutcome::Valid => {}
            RepairOutcome::Repaired => stats.repaired += 1,
            RepairOutcome::Unrepairable => {
                stats.unrepairable += 1;
                log::warn!(
                    "{year}: feature {:?} is invalid and could not be repaired; keeping it as-is",
                    prop_i64(props, &fields.id)
                );
            }
        }

        let geometry = match reprojector {
            Some(r) => r.project(&geometry)?,
            None => geometry,
        };

        let acres = match prop_f64(props, &fields.acres) {
            Some(acres) => acres,
            None => {
                stats.computed_acres += 1;
                planar_acres(&geometry)
            }
        };

        features.push(SurveyFeature {
            source_id: prop_i64(props, &fields.id),
            county: prop_string(props, &fields.county),
            basin: prop_string(props, &fields.basin),
            sub_area: prop_string(props, &fields.sub_area),
            land_use: prop_string(props, &fields.land_use),
            acres,
            attributes: CropAttributes {
                crop: prop_string(props, &fields.crop),
                cdl: prop_string(props, &fields.cdl),
                crop_group: prop_string(props, &fields.crop_group),
                land_use_group: prop_string(props, &fields.land_use_group),
                irr_method: prop_string(props, &fields.irr_method),
            },
            geometry,
        });
    }

    log::info!(
        "{year}: kept {} of {} features ({} filtered, {} without polygon, {} repaired, {} acreage computed)",
        features.len(),
        stats.total,
        stats.filtered_out,
        stats.unsupported_geometry,
        stats.repaired,
        stats.computed_acres,
    );

    Ok(YearSnapshot {
        year,
        features,
        stats,
    })
}

fn feature_polygon(feature: &Feature) -> Option<MultiPolygon<f64>> {
    feature.geometry.as_ref().and_then(to_multipolygon)
}

fn passes_filters(props: &JsonObject, filters: &[AttributeFilter]) -> bool {
    filters
        .iter()
        .all(|f| prop_string(props, &f.field).is_some_and(|v| v == f.equals))
}

/// Reads a property as trimmed, non-empty text. Numbers are rendered in
/// their JSON form.
fn prop_string(props: &JsonObject, key: &str) -> Option<String> {
    match props.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn prop_f64(props: &JsonObject, key: &str) -> Option<f64> {
    match props.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn prop_i64(props: &JsonObject, key: &str) -> Option<i64> {
    match props.get(key)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
