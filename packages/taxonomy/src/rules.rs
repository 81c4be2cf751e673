//! Ordered categorical rewrite rules.
//!
//! A [`RuleSet`] is a list of `(predicate, replacement)` pairs. For each
//! value the first rule whose predicate holds supplies the replacement;
//! later rules are not consulted and the output of one rule is never fed
//! to another. Values no rule matches pass through unchanged.

use std::collections::BTreeSet;

use field_panel_parcel_models::Year;

/// Row context a predicate may look at besides the label itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleContext<'a> {
    /// Year of the row being rewritten.
    pub year: Year,
    /// Reference year of the panel.
    pub reference_year: Year,
    /// The parcel's reference-year crop, looked up before any rewrite.
    pub reference_crop: Option<&'a str>,
}

impl<'a> RuleContext<'a> {
    /// Context for rules that only depend on the label and year.
    #[must_use]
    pub const fn for_year(year: Year) -> Self {
        Self {
            year,
            reference_year: year,
            reference_crop: None,
        }
    }

    /// Full context for a panel row.
    #[must_use]
    pub const fn for_row(year: Year, reference_year: Year, reference_crop: Option<&'a str>) -> Self {
        Self {
            year,
            reference_year,
            reference_crop,
        }
    }
}

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The label equals this value.
    Equals(String),
    /// The label is one of these values.
    OneOf(BTreeSet<String>),
    /// The label equals `label` and the row's year is in `years`.
    EqualsInYears {
        /// Label to match.
        label: String,
        /// Years in which the rule applies.
        years: BTreeSet<Year>,
    },
    /// The label equals `label`, the row precedes the reference year and
    /// the parcel's reference-year crop equals `reference_crop`.
    ReferenceCropPair {
        /// Reference-year crop that enables the rule.
        reference_crop: String,
        /// Earlier-year label to match.
        label: String,
    },
}

impl Predicate {
    /// Shorthand for [`Predicate::Equals`].
    #[must_use]
    pub fn equals(label: &str) -> Self {
        Self::Equals(label.to_string())
    }

    /// Shorthand for [`Predicate::OneOf`].
    #[must_use]
    pub fn one_of(labels: &[&str]) -> Self {
        Self::OneOf(labels.iter().map(ToString::to_string).collect())
    }

    /// Shorthand for [`Predicate::EqualsInYears`].
    #[must_use]
    pub fn equals_in_years(label: &str, years: &[Year]) -> Self {
        Self::EqualsInYears {
            label: label.to_string(),
            years: years.iter().copied().collect(),
        }
    }

    /// Returns `true` if the predicate holds for `label` in `ctx`.
    #[must_use]
    pub fn matches(&self, label: &str, ctx: &RuleContext<'_>) -> bool {
        match self {
            Self::Equals(value) => value == label,
            Self::OneOf(values) => values.contains(label),
            Self::EqualsInYears { label: value, years } => {
                value == label && years.contains(&ctx.year)
            }
            Self::ReferenceCropPair {
                reference_crop,
                label: value,
            } => {
                value == label
                    && ctx.year < ctx.reference_year
                    && ctx.reference_crop == Some(reference_crop.as_str())
            }
        }
    }
}

/// A named `(predicate, replacement)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Stable name used in rewrite counts.
    pub name: String,
    /// When the rule applies.
    pub predicate: Predicate,
    /// The label written when it does.
    pub replacement: String,
}

impl RewriteRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(name: impl Into<String>, predicate: Predicate, replacement: &str) -> Self {
        Self {
            name: name.into(),
            predicate,
            replacement: replacement.to_string(),
        }
    }
}

/// An ordered, first-match-wins list of rewrite rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// Creates a rule set evaluated in the given order.
    #[must_use]
    pub const fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the position and rule of the first match for `label`.
    #[must_use]
    pub fn first_match(&self, label: &str, ctx: &RuleContext<'_>) -> Option<(usize, &RewriteRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.predicate.matches(label, ctx))
    }

    /// Returns the replacement for `label`, or `None` if no rule matches.
    #[must_use]
    pub fn rewrite(&self, label: &str, ctx: &RuleContext<'_>) -> Option<&str> {
        self.first_match(label, ctx)
            .map(|(_, rule)| rule.replacement.as_str())
    }

    /// Returns the replacement for `label`, or `label` itself if no rule
    /// matches.
    #[must_use]
    pub fn apply<'a>(&'a self, label: &'a str, ctx: &RuleContext<'_>) -> &'a str {
        self.rewrite(label, ctx).unwrap_or(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> RuleSet {
        RuleSet::new(vec![
            RewriteRule::new("a_to_b", Predicate::equals("A"), "B"),
            RewriteRule::new("b_to_c", Predicate::equals("B"), "C"),
        ])
    }

    #[test]
    fn first_match_wins_and_outputs_are_not_rechained() {
        let rules = chain();
        let ctx = RuleContext::for_year(2020);
        assert_eq!(rules.apply("A", &ctx), "B");
        assert_eq!(rules.apply("B", &ctx), "C");
    }

    #[test]
    fn unmatched_labels_pass_through() {
        let rules = chain();
        let ctx = RuleContext::for_year(2020);
        assert_eq!(rules.rewrite("Z", &ctx), None);
        assert_eq!(rules.apply("Z", &ctx), "Z");
    }

    #[test]
    fn year_conditional_predicate() {
        let predicate = Predicate::equals_in_years("X", &[2019, 2020]);
        assert!(predicate.matches("X", &RuleContext::for_year(2019)));
        assert!(!predicate.matches("X", &RuleContext::for_year(2021)));
        assert!(!predicate.matches("Y", &RuleContext::for_year(2019)));
    }

    #[test]
    fn reference_crop_pair_only_applies_before_reference_year() {
        let predicate = Predicate::ReferenceCropPair {
            reference_crop: "Grass Hay".to_string(),
            label: "Alfalfa".to_string(),
        };

        assert!(predicate.matches("Alfalfa", &RuleContext::for_row(2019, 2024, Some("Grass Hay"))));
        assert!(!predicate.matches("Alfalfa", &RuleContext::for_row(2024, 2024, Some("Grass Hay"))));
        assert!(!predicate.matches("Alfalfa", &RuleContext::for_row(2019, 2024, Some("Alfalfa"))));
        assert!(!predicate.matches("Alfalfa", &RuleContext::for_row(2019, 2024, None)));
    }

    #[test]
    fn first_match_reports_position() {
        let rules = chain();
        let ctx = RuleContext::for_year(2020);
        let (position, rule) = rules.first_match("B", &ctx).unwrap();
        assert_eq!(position, 1);
        assert_eq!(rule.name, "b_to_c");
    }
}
