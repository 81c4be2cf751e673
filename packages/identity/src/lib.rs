#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cross-year parcel identity resolution.
//!
//! Every survey year is digitized independently, so the same field shows up
//! with slightly different boundaries from year to year. Identity is
//! anchored to the reference-year polygons: for each other year, every
//! reference parcel is joined against the year's polygons by intersection,
//! the candidate whose acreage agrees best is chosen, and its crop
//! attributes are only trusted if the acreage agrees within the acceptance
//! threshold.
//!
//! Ranking is by area consistency, never by overlap area. Boundary lines
//! shift between surveys, so a large overlap says little about whether two
//! polygons describe the same field, while a near-identical acreage does.

use std::sync::Arc;

use field_panel_parcel_models::progress::ProgressCallback;
use field_panel_parcel_models::{
    CandidateParcel, CropAttributes, DEFAULT_ACCEPTANCE_THRESHOLD_ACRES, MatchOutcome,
    ReferenceParcel, WideTable, Year, YearBlock,
};
use field_panel_spatial::CandidateIndex;
use field_panel_survey::SurveyError;
use field_panel_survey::store::YearSnapshotStore;
use rayon::prelude::*;
use thiserror::Error;

/// Errors raised while resolving identities.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Loading a snapshot or the reference parcel set failed.
    #[error("Survey error: {0}")]
    Survey(#[from] SurveyError),

    /// A year was folded into the table twice.
    #[error("Year {year} has already been resolved")]
    YearAlreadyResolved {
        /// The repeated year.
        year: Year,
    },

    /// The acceptance threshold is negative or not a number.
    #[error("Invalid acceptance threshold {threshold}")]
    InvalidThreshold {
        /// The rejected value.
        threshold: f64,
    },
}

/// Per-year resolution counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMatchStats {
    /// Survey year.
    pub year: Year,
    /// Parcels whose best candidate passed the area test.
    pub accepted: usize,
    /// Parcels whose best candidate failed the area test.
    pub rejected: usize,
    /// Parcels with no intersecting polygon.
    pub no_candidate: usize,
}

/// The resolved wide table plus per-year statistics.
#[derive(Debug)]
pub struct Resolution {
    /// One row per reference parcel with a block for every year.
    pub table: WideTable,
    /// Statistics for each non-reference year, oldest first.
    pub stats: Vec<YearMatchStats>,
}

/// Matches reference parcels against other survey years.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityResolver {
    threshold_acres: f64,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            threshold_acres: DEFAULT_ACCEPTANCE_THRESHOLD_ACRES,
        }
    }
}

impl IdentityResolver {
    /// Creates a resolver with an absolute acreage tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidThreshold`] for a negative or
    /// non-finite tolerance.
    pub fn new(threshold_acres: f64) -> Result<Self, IdentityError> {
        if !threshold_acres.is_finite() || threshold_acres < 0.0 {
            return Err(IdentityError::InvalidThreshold {
                threshold: threshold_acres,
            });
        }
        Ok(Self { threshold_acres })
    }

    /// The acceptance tolerance in acres.
    #[must_use]
    pub const fn threshold_acres(&self) -> f64 {
        self.threshold_acres
    }

    /// Resolves every year in `years` against the reference year held in
    /// `store`, returning the wide table.
    ///
    /// The reference year's own block comes straight from the reference
    /// parcels. Years are resolved independently of each other.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the reference parcel set is invalid or a
    /// year is not loaded.
    pub fn resolve(
        &self,
        store: &YearSnapshotStore,
        years: &[Year],
        reference_year: Year,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Resolution, IdentityError> {
        let parcels = store.reference_parcels(reference_year)?;
        log::info!(
            "Resolving {} reference parcels from {reference_year} against {} other years",
            parcels.len(),
            years.iter().filter(|&&y| y != reference_year).count()
        );

        let mut table = WideTable::from_reference(reference_year, parcels);
        let mut stats = Vec::new();

        progress.set_total(years.len().saturating_sub(1) as u64);
        for &year in years.iter().filter(|&&y| y != reference_year) {
            progress.set_message(format!("Matching {year}"));
            let candidates = store.candidates(year)?;
            stats.push(self.fold_year(&mut table, &candidates, year)?);
            progress.inc(1);
        }
        progress.finish("Identity resolution complete".to_string());

        Ok(Resolution { table, stats })
    }

    /// Resolves one year and adds its blocks to `table`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::YearAlreadyResolved`] if any row already
    /// has a block for `year`.
    pub fn fold_year(
        &self,
        table: &mut WideTable,
        candidates: &[CandidateParcel],
        year: Year,
    ) -> Result<YearMatchStats, IdentityError> {
        if table.rows.iter().any(|row| row.blocks.contains_key(&year)) {
            return Err(IdentityError::YearAlreadyResolved { year });
        }

        let parcels: Vec<&ReferenceParcel> = table.rows.iter().map(|row| &row.parcel).collect();
        let blocks = self.resolve_year(&parcels, candidates);

        let mut stats = YearMatchStats {
            year,
            accepted: 0,
            rejected: 0,
            no_candidate: 0,
        };
        for (row, block) in table.rows.iter_mut().zip(blocks) {
            match block.outcome {
                MatchOutcome::Accepted { .. } | MatchOutcome::Reference => stats.accepted += 1,
                MatchOutcome::Rejected { .. } => stats.rejected += 1,
                MatchOutcome::NoCandidate => stats.no_candidate += 1,
            }
            row.blocks.insert(year, block);
        }

        log::info!(
            "{year}: {} accepted, {} rejected (area difference > {} ac), {} without candidate",
            stats.accepted,
            stats.rejected,
            self.threshold_acres,
            stats.no_candidate
        );

        Ok(stats)
    }

    /// Resolves one year for every reference parcel, returning one block
    /// per parcel in the same order.
    ///
    /// Per-parcel work is independent and runs in parallel; the choice for
    /// each parcel does not depend on execution order.
    #[must_use]
    pub fn resolve_year(
        &self,
        parcels: &[&ReferenceParcel],
        candidates: &[CandidateParcel],
    ) -> Vec<YearBlock> {
        let index = CandidateIndex::new(candidates.iter().map(|c| &c.geometry));

        parcels
            .par_iter()
            .map(|parcel| {
                let hits = index.intersecting(&parcel.geometry);
                self.block_for(parcel, &hits, candidates)
            })
            .collect()
    }

    fn block_for(
        &self,
        parcel: &ReferenceParcel,
        hits: &[usize],
        candidates: &[CandidateParcel],
    ) -> YearBlock {
        let Some((position, area_diff)) = best_candidate(parcel.acres, hits, candidates) else {
            return YearBlock::empty();
        };
        let candidate = &candidates[position];

        if area_diff <= self.threshold_acres {
            YearBlock {
                acres: Some(candidate.acres),
                attributes: candidate.attributes.clone(),
                outcome: MatchOutcome::Accepted {
                    candidate: candidate.index,
                    area_diff,
                },
            }
        } else {
            YearBlock {
                acres: Some(candidate.acres),
                attributes: CropAttributes::default(),
                outcome: MatchOutcome::Rejected {
                    candidate: candidate.index,
                    area_diff,
                },
            }
        }
    }
}

/// Picks the candidate with the smallest absolute acreage difference.
///
/// Ties go to the candidate that comes first in the year's layer. A
/// non-finite difference ranks behind every finite one. Returns the
/// candidate's slice position and its difference.
#[must_use]
pub fn best_candidate(
    reference_acres: f64,
    hits: &[usize],
    candidates: &[CandidateParcel],
) -> Option<(usize, f64)> {
    hits.iter()
        .map(|&position| {
            let diff = (reference_acres - candidates[position].acres).abs();
            (position, diff)
        })
        .min_by(|(a_pos, a_diff), (b_pos, b_diff)| {
            rank_key(*a_diff)
                .total_cmp(&rank_key(*b_diff))
                .then_with(|| candidates[*a_pos].index.cmp(&candidates[*b_pos].index))
        })
}

const fn rank_key(diff: f64) -> f64 {
    if diff.is_nan() { f64::INFINITY } else { diff }
}
