#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Yearly land-use survey loading and snapshot storage.
//!
//! Each survey year is loaded by the same parameterized routine: read the
//! year's `GeoJSON` layer, keep agricultural features in the target
//! jurisdiction, map properties through the declarative field schema,
//! repair invalid polygons and reproject into the panel's planar CRS. The
//! resulting snapshots are held in a [`store::YearSnapshotStore`] keyed by
//! year.

pub mod normalize;
pub mod store;

use std::path::PathBuf;

use field_panel_parcel_models::{ParcelId, Year};
use field_panel_spatial::SpatialError;
use thiserror::Error;

/// Errors that can occur while loading survey layers.
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Reading a layer from disk failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Layer path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A configured year has no layer on disk.
    #[error("No survey layer for {year} at {path}")]
    MissingLayer {
        /// Survey year.
        year: Year,
        /// Expected path.
        path: PathBuf,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The layer parsed but is not a `FeatureCollection`.
    #[error("Layer for {year} is not a GeoJSON FeatureCollection")]
    NotAFeatureCollection {
        /// Survey year.
        year: Year,
    },

    /// Reprojection or CRS parsing failed.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// A reference-year feature has no usable id.
    #[error("Reference-year feature at position {position} has no id")]
    MissingReferenceId {
        /// Row position in the reference layer.
        position: usize,
    },

    /// Reference-year features were dropped for lacking a polygon. Each one
    /// would silently remove a parcel identity.
    #[error("{count} reference-year features in {year} have no polygon geometry")]
    MissingReferenceGeometry {
        /// Reference year.
        year: Year,
        /// Features skipped by the normalizer.
        count: usize,
    },

    /// Two reference-year features share an id. Parcel identity would be
    /// ambiguous, so the run must stop.
    #[error("Duplicate reference-year parcel id {id}")]
    DuplicateReferenceId {
        /// The repeated id.
        id: ParcelId,
    },

    /// A year was requested that the store has not loaded.
    #[error("Survey year {year} is not loaded")]
    YearNotLoaded {
        /// Survey year.
        year: Year,
    },
}
