//! Raster class label → unified crop vocabulary.
//!
//! Raster classes are finer (forest and developed classes, double crops)
//! and named differently ("Onions", "Potatoes"). Labels without a rule are
//! reported as unmapped and never written into the panel.

use field_panel_parcel_models::Year;

use crate::rules::{Predicate, RewriteRule, RuleContext, RuleSet};

/// Years in which "Developed/Med Intensity" parcels are vegetable plots.
pub const DEVELOPED_MED_VEGETABLE_YEARS: &[Year] = &[2017, 2018, 2019, 2020, 2022];

/// Years in which "Developed/Med Intensity" parcels are pasture.
pub const DEVELOPED_MED_PASTURE_YEARS: &[Year] = &[2021, 2023, 2024];

const DIRECT: &[(&str, &str)] = &[
    ("Alfalfa", "Alfalfa"),
    ("Apples", "Apples"),
    ("Apricots", "Apricots"),
    ("Barley", "Barley"),
    ("Barren", "Fallow/Idle"),
    ("Cherries", "Cherries"),
    ("Chick Peas", "Beans"),
    ("Corn", "Corn"),
    ("Dbl Crop Triticale/Corn", "Corn"),
    ("Dbl Crop WinWht/Corn", "Corn"),
    ("Deciduous Forest", "Pasture"),
    ("Developed/Low Intensity", "Pasture"),
];

const DIRECT_AFTER_DEVELOPED_MED: &[(&str, &str)] = &[
    ("Developed/Open Space", "Pasture"),
    ("Dry Beans", "Beans"),
    ("Evergreen Forest", "Pasture"),
    ("Fallow/Idle Cropland", "Fallow/Idle"),
    ("Flaxseed", "Flaxseed"),
    ("Grass/Pasture", "Grass Hay"),
    ("Herbaceous Wetlands", "Pasture"),
    ("Herbs", "Horticulture"),
    ("Misc Vegs & Fruits", "Vegetables"),
    ("Mixed Forest", "Pasture"),
    ("Mustard", "Mustard"),
    ("Oats", "Oats"),
    ("Onions", "Onion"),
    ("Other Crops", "Field Crop Unspecified"),
    ("Other Hay/Non Alfalfa", "Grass Hay"),
    ("Peaches", "Peaches"),
    ("Pears", "Peaches"),
    ("Peas", "Vegetables"),
    ("Potatoes", "Potato"),
    ("Pumpkins", "Pumpkins"),
    ("Rye", "Rye"),
    ("Safflower", "Safflower"),
    ("Shrubland", "Fallow/Idle"),
    ("Sod/Grass Seed", "Grass Hay"),
    ("Sorghum", "Sorghum"),
    ("Spring Wheat", "Spring Wheat"),
    ("Squash", "Squash"),
    ("Sunflower", "Sunflower"),
    ("Sweet Corn", "Corn"),
    ("Triticale", "Triticale"),
    ("Watermelons", "Watermelons"),
    ("Winter Wheat", "Winter Wheat"),
    ("Woody Wetlands", "Pasture"),
];

fn direct(label: &str, replacement: &str) -> RewriteRule {
    RewriteRule::new(label, Predicate::equals(label), replacement)
}

/// The raster remap rules in evaluation order.
#[must_use]
pub fn raster_rules() -> RuleSet {
    let mut rules: Vec<RewriteRule> = DIRECT.iter().map(|(l, r)| direct(l, r)).collect();

    rules.push(RewriteRule::new(
        "Developed/Med Intensity (vegetable years)",
        Predicate::equals_in_years("Developed/Med Intensity", DEVELOPED_MED_VEGETABLE_YEARS),
        "Vegetables",
    ));
    rules.push(RewriteRule::new(
        "Developed/Med Intensity (pasture years)",
        Predicate::equals_in_years("Developed/Med Intensity", DEVELOPED_MED_PASTURE_YEARS),
        "Pasture",
    ));

    rules.extend(DIRECT_AFTER_DEVELOPED_MED.iter().map(|(l, r)| direct(l, r)));
    RuleSet::new(rules)
}

/// Maps raster class labels onto the unified crop vocabulary.
#[derive(Debug, Clone)]
pub struct RasterRemap {
    rules: RuleSet,
}

impl Default for RasterRemap {
    fn default() -> Self {
        Self {
            rules: raster_rules(),
        }
    }
}

impl RasterRemap {
    /// Uses a custom rule set.
    #[must_use]
    pub const fn with_rules(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// The rule set in use.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Unified label for a raster class label in `year`, or `None` when no
    /// rule covers it.
    #[must_use]
    pub fn remap(&self, label: &str, year: Year) -> Option<&str> {
        self.rules.rewrite(label, &RuleContext::for_year(year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_count_and_order() {
        let rules = raster_rules();
        assert_eq!(rules.len(), 47);
        assert_eq!(rules.rules()[0].name, "Alfalfa");
        assert_eq!(
            rules.rules()[12].name,
            "Developed/Med Intensity (vegetable years)"
        );
        assert_eq!(rules.rules()[46].name, "Woody Wetlands");
    }

    #[test]
    fn developed_med_intensity_depends_on_year() {
        let remap = RasterRemap::default();
        assert_eq!(remap.remap("Developed/Med Intensity", 2021), Some("Pasture"));
        assert_eq!(remap.remap("Developed/Med Intensity", 2019), Some("Vegetables"));
        assert_eq!(remap.remap("Developed/Med Intensity", 2022), Some("Vegetables"));
        assert_eq!(remap.remap("Developed/Med Intensity", 2024), Some("Pasture"));
        assert_eq!(remap.remap("Developed/Med Intensity", 2016), None);
    }

    #[test]
    fn renames_and_merges() {
        let remap = RasterRemap::default();
        assert_eq!(remap.remap("Onions", 2020), Some("Onion"));
        assert_eq!(remap.remap("Potatoes", 2020), Some("Potato"));
        assert_eq!(remap.remap("Pears", 2020), Some("Peaches"));
        assert_eq!(remap.remap("Sweet Corn", 2020), Some("Corn"));
        assert_eq!(remap.remap("Grass/Pasture", 2020), Some("Grass Hay"));
        assert_eq!(remap.remap("Other Crops", 2020), Some("Field Crop Unspecified"));
        assert_eq!(remap.remap("Barren", 2020), Some("Fallow/Idle"));
    }

    #[test]
    fn unknown_labels_are_not_leaked() {
        let remap = RasterRemap::default();
        assert_eq!(remap.remap("Open Water", 2020), None);
        assert_eq!(remap.remap("Background", 2020), None);
    }

    #[test]
    fn every_year_in_window_maps_developed_med_intensity() {
        let remap = RasterRemap::default();
        for year in field_panel_parcel_models::default_survey_years() {
            assert!(remap.remap("Developed/Med Intensity", year).is_some(), "{year}");
        }
    }
}
