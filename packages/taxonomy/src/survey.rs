//! Survey crop label harmonization.

use std::collections::BTreeMap;

use field_panel_parcel_models::{Panel, ParcelId, Year};

use crate::rules::{Predicate, RewriteRule, RuleContext, RuleSet};

/// Survey crop rewrites, in evaluation order.
///
/// The cross-year rule comes first: a parcel surveyed as "Grass Hay" in
/// the reference year was recorded as "Alfalfa" in earlier years by a
/// different classification, not by a crop change.
#[must_use]
pub fn survey_rules() -> RuleSet {
    RuleSet::new(vec![
        RewriteRule::new(
            "alfalfa_to_reference_grass_hay",
            Predicate::ReferenceCropPair {
                reference_crop: "Grass Hay".to_string(),
                label: "Alfalfa".to_string(),
            },
            "Grass Hay",
        ),
        RewriteRule::new(
            "fallow_idle",
            Predicate::one_of(&["Fallow", "Idle", "Idle Pasture"]),
            "Fallow/Idle",
        ),
        RewriteRule::new("turfgrass", Predicate::equals("Turfgrass"), "Turfgrass Ag"),
        RewriteRule::new("grassy_hay", Predicate::equals("Grassy Hay"), "Grass Hay"),
        RewriteRule::new(
            "grassland_pasture",
            Predicate::equals("Grassland/Pasture"),
            "Grass/Pasture",
        ),
        RewriteRule::new("dry_land_other", Predicate::equals("Dry Land/Other"), "Fallow/Idle"),
    ])
}

/// Per-rule rewrite counts from one harmonization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarmonizeReport {
    /// `(rule name, rows rewritten)` in rule order.
    pub counts: Vec<(String, usize)>,
}

impl HarmonizeReport {
    /// Total rows rewritten by any rule.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    /// Rows rewritten by the named rule.
    #[must_use]
    pub fn count(&self, rule: &str) -> usize {
        self.counts
            .iter()
            .find(|(name, _)| name == rule)
            .map_or(0, |(_, n)| *n)
    }
}

/// Harmonizes every row's crop label in one pass.
///
/// Reference-year crops are captured before any row is rewritten, so the
/// cross-year rule sees the raw reference label.
pub fn harmonize(panel: &mut Panel, reference_year: Year) -> HarmonizeReport {
    harmonize_with(panel, reference_year, &survey_rules())
}

/// [`harmonize`] with an explicit rule set.
pub fn harmonize_with(panel: &mut Panel, reference_year: Year, rules: &RuleSet) -> HarmonizeReport {
    let reference_crops: BTreeMap<ParcelId, Option<String>> = panel
        .rows
        .iter()
        .filter(|row| row.year == reference_year)
        .map(|row| (row.id, row.crop.clone()))
        .collect();

    let mut counts = vec![0usize; rules.len()];

    for row in &mut panel.rows {
        let Some(label) = row.crop.as_deref() else {
            continue;
        };
        let reference_crop = reference_crops.get(&row.id).and_then(Option::as_deref);
        let ctx = RuleContext::for_row(row.year, reference_year, reference_crop);

        if let Some((position, rule)) = rules.first_match(label, &ctx) {
            counts[position] += 1;
            row.crop = Some(rule.replacement.clone());
        }
    }

    let report = HarmonizeReport {
        counts: rules
            .rules()
            .iter()
            .zip(counts)
            .map(|(rule, n)| (rule.name.clone(), n))
            .collect(),
    };

    for (name, n) in &report.counts {
        if *n > 0 {
            log::info!("Harmonized {n} crop labels with rule {name}");
        }
    }
    log::info!("Harmonized {} crop labels in total", report.total());

    report
}
