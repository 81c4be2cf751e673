//! The unified crop vocabulary and the out-of-vocabulary policy.

use std::collections::{BTreeMap, BTreeSet};

use field_panel_parcel_models::Panel;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::raster::raster_rules;
use crate::reference::RootingDepthTable;
use crate::survey::survey_rules;

/// Unified labels that survey polygons carry without any rewrite.
const SURVEY_LABELS: &[&str] = &[
    "Alfalfa",
    "Apples",
    "Apricots",
    "Barley",
    "Beans",
    "Berries",
    "Cherries",
    "Corn",
    "Fallow/Idle",
    "Field Crop Unspecified",
    "Flaxseed",
    "Grain/Seeds Unspecified",
    "Grapes",
    "Grass Hay",
    "Grass/Pasture",
    "Greenhouse",
    "Horticulture",
    "Mustard",
    "Nursery",
    "Oats",
    "Onion",
    "Orchard Unspecified",
    "Pasture",
    "Peaches",
    "Pears",
    "Potato",
    "Pumpkins",
    "Rye",
    "Safflower",
    "Sod Farm",
    "Sorghum",
    "Spring Wheat",
    "Squash",
    "Sunflower",
    "Tomatoes",
    "Triticale",
    "Turfgrass Ag",
    "Vegetables",
    "Vineyard",
    "Watermelons",
    "Winter Wheat",
];

/// What to do with a crop label outside the unified vocabulary.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnknownCropPolicy {
    /// Keep the label and only warn.
    #[default]
    Keep,
    /// Clear the label. The row keeps its survey provenance, so the raster
    /// never fills it.
    Null,
}

/// The set of crop labels the panel may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedVocabulary {
    labels: BTreeSet<String>,
}

impl UnifiedVocabulary {
    /// Built-in labels: plain survey labels plus every replacement either
    /// rule set can produce.
    #[must_use]
    pub fn builtin() -> Self {
        let mut labels: BTreeSet<String> = SURVEY_LABELS.iter().map(ToString::to_string).collect();
        for rules in [survey_rules(), raster_rules()] {
            labels.extend(rules.rules().iter().map(|r| r.replacement.clone()));
        }
        Self { labels }
    }

    /// Built-in labels plus every crop in the rooting-depth table.
    #[must_use]
    pub fn with_rooting_depth(table: &RootingDepthTable) -> Self {
        let mut vocabulary = Self::builtin();
        vocabulary
            .labels
            .extend(table.crops().map(ToString::to_string));
        vocabulary
    }

    /// Returns `true` if `label` is in the vocabulary.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the vocabulary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Checks every crop label in `panel`, applying `policy` to unknown
    /// ones. Returns the number of rows with an unknown label.
    pub fn enforce(&self, panel: &mut Panel, policy: UnknownCropPolicy) -> usize {
        let mut unknown: BTreeMap<String, usize> = BTreeMap::new();

        for row in &mut panel.rows {
            let Some(label) = row.crop.as_deref() else {
                continue;
            };
            if self.contains(label) {
                continue;
            }
            *unknown.entry(label.to_string()).or_default() += 1;
            if policy == UnknownCropPolicy::Null {
                row.crop = None;
            }
        }

        for (label, n) in &unknown {
            log::warn!("Crop label {label:?} is not in the unified vocabulary ({n} rows, policy {policy})");
        }

        unknown.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use field_panel_parcel_models::{CropSource, MatchOutcome, PanelRow};
    use geo::MultiPolygon;

    use super::*;

    fn panel(crops: &[Option<&str>]) -> Panel {
        let rows = crops
            .iter()
            .zip(2017u16..)
            .map(|(crop, year)| PanelRow {
                id: 1,
                year,
                county: None,
                basin: None,
                sub_area: None,
                land_use: None,
                acres: 1.0,
                crop: crop.map(ToString::to_string),
                crop_source: crop.map(|_| CropSource::Survey),
                cdl: None,
                crop_group: None,
                land_use_group: None,
                irr_method: None,
                match_outcome: MatchOutcome::Reference,
                rooting_zone_depth: None,
                cultivated: None,
                geometry: Arc::new(MultiPolygon(vec![])),
            })
            .collect();
        Panel {
            years: Vec::new(),
            rows,
        }
    }

    #[test]
    fn builtin_covers_every_rule_output() {
        let vocabulary = UnifiedVocabulary::builtin();
        for label in ["Fallow/Idle", "Turfgrass Ag", "Grass/Pasture", "Onion", "Field Crop Unspecified"] {
            assert!(vocabulary.contains(label), "{label}");
        }
        assert!(!vocabulary.contains("Onions"));
        assert!(!vocabulary.contains("Idle"));
    }

    #[test]
    fn null_policy_clears_unknown_labels() {
        let mut p = panel(&[Some("Corn"), Some("Mystery Crop"), None]);
        let unknown = UnifiedVocabulary::builtin().enforce(&mut p, UnknownCropPolicy::Null);

        assert_eq!(unknown, 1);
        assert_eq!(p.rows[0].crop.as_deref(), Some("Corn"));
        assert_eq!(p.rows[1].crop, None);
        assert_eq!(p.rows[1].crop_source, Some(CropSource::Survey));
        assert!(!p.rows[1].awaits_raster());
        assert!(p.rows[2].awaits_raster());
    }

    #[test]
    fn default_policy_passes_survey_labels_through() {
        let mut p = panel(&[Some("Sod Farm Turf")]);
        let unknown = UnifiedVocabulary::builtin().enforce(&mut p, UnknownCropPolicy::default());

        assert_eq!(unknown, 1);
        assert_eq!(p.rows[0].crop.as_deref(), Some("Sod Farm Turf"));
        assert_eq!(p.rows[0].crop_source, Some(CropSource::Survey));
    }

    #[test]
    fn keep_policy_only_counts() {
        let mut p = panel(&[Some("Mystery Crop")]);
        let unknown = UnifiedVocabulary::builtin().enforce(&mut p, UnknownCropPolicy::Keep);

        assert_eq!(unknown, 1);
        assert_eq!(p.rows[0].crop.as_deref(), Some("Mystery Crop"));
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("null".parse::<UnknownCropPolicy>().unwrap(), UnknownCropPolicy::Null);
        assert_eq!("keep".parse::<UnknownCropPolicy>().unwrap(), UnknownCropPolicy::Keep);
        assert!("drop".parse::<UnknownCropPolicy>().is_err());
    }
}
