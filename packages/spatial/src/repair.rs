//! Repair of invalid survey polygons.
//!
//! Hand-digitized survey layers contain self-intersecting rings and
//! overlapping parts. Every reference parcel needs a usable geometry, so
//! invalid polygons are rebuilt rather than dropped.

use geo::{Area, MultiPolygon, Validation, unary_union};

/// What happened to a polygon passed through [`repair_multipolygon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The polygon was already valid.
    Valid,
    /// The polygon was invalid and has been rebuilt.
    Repaired,
    /// The polygon was invalid and the rebuild produced nothing usable;
    /// the original geometry is kept.
    Unrepairable,
}

/// Makes a polygon valid.
///
/// Invalid input is rebuilt by unioning its parts, which resolves
/// self-intersections and overlapping members into a valid
/// [`MultiPolygon`] covering the same area. If the union collapses to an
/// empty geometry (e.g. a zero-area sliver), the input is returned
/// unchanged with [`RepairOutcome::Unrepairable`].
#[must_use]
pub fn repair_multipolygon(polygon: MultiPolygon<f64>) -> (MultiPolygon<f64>, RepairOutcome) {
    if polygon.is_valid() {
        return (polygon, RepairOutcome::Valid);
    }

    let rebuilt = unary_union(polygon.0.iter());

    if rebuilt.0.is_empty() || rebuilt.unsigned_area() <= 0.0 {
        log::debug!("Polygon could not be repaired; keeping original geometry");
        return (polygon, RepairOutcome::Unrepairable);
    }

    (rebuilt, RepairOutcome::Repaired)
}
