#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial primitives for parcel matching.
//!
//! Provides an R-tree over one survey year's polygons for the many-to-many
//! "intersects" join against reference parcels, plus the geometry helpers
//! every stage shares: `GeoJSON` conversion, repair of invalid polygons,
//! reprojection between CRSs, and planar acreage.

pub mod geojson_convert;
pub mod projection;
pub mod repair;

use geo::{Area, BoundingRect, Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

pub use projection::Reprojector;
pub use repair::{RepairOutcome, repair_multipolygon};

/// Square meters in one acre.
const SQ_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Errors from spatial operations.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A CRS definition could not be parsed.
    #[error("Invalid CRS definition '{definition}': {message}")]
    InvalidCrs {
        /// The proj string that failed.
        definition: String,
        /// Parser message.
        message: String,
    },

    /// A coordinate could not be transformed.
    #[error("Reprojection failed: {0}")]
    Transform(String),
}

/// A polygon stored in the R-tree with its position in the source layer.
struct IndexedPolygon<'a> {
    position: usize,
    envelope: AABB<[f64; 2]>,
    polygon: &'a MultiPolygon<f64>,
}

impl RTreeObject for IndexedPolygon<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over one survey year's polygons.
///
/// Built once per year and queried with every reference parcel. Lookups
/// return layer positions so callers can break ties by row order.
pub struct CandidateIndex<'a> {
    tree: RTree<IndexedPolygon<'a>>,
}

impl<'a> CandidateIndex<'a> {
    /// Bulk-loads an index over `polygons`, remembering each one's position.
    #[must_use]
    pub fn new(polygons: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let entries: Vec<IndexedPolygon<'a>> = polygons
            .into_iter()
            .enumerate()
            .map(|(position, polygon)| IndexedPolygon {
                position,
                envelope: compute_envelope(polygon),
                polygon,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Positions of every indexed polygon that intersects `query`, in
    /// ascending order.
    ///
    /// The envelope query is only a prefilter; each hit is confirmed with
    /// an exact intersection test. Touching boundaries count as
    /// intersecting.
    #[must_use]
    pub fn intersecting(&self, query: &MultiPolygon<f64>) -> Vec<usize> {
        if query.0.is_empty() {
            return Vec::new();
        }
        let query_env = compute_envelope(query);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(query))
            .map(|entry| entry.position)
            .collect();

        hits.sort_unstable();
        hits
    }
}

/// Planar area of a polygon in acres. The polygon must be in a CRS whose
/// units are meters.
#[must_use]
pub fn planar_acres(polygon: &MultiPolygon<f64>) -> f64 {
    polygon.unsigned_area() / SQ_METERS_PER_ACRE
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
