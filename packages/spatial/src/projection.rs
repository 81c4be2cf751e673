//! Reprojection between coordinate reference systems.
//!
//! CRSs are given as proj strings (e.g. `+proj=utm +zone=12 +datum=NAD83
//! +units=m +no_defs`). Geographic CRSs take and return degrees.

use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::Proj;

use crate::SpatialError;

/// Transforms geometries from one CRS to another.
///
/// When source and target definitions are identical the reprojector is a
/// no-op and geometries are returned unchanged.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    identity: bool,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Reprojector {
    /// Builds a reprojector between two proj strings.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidCrs`] if either definition cannot be
    /// parsed.
    pub fn new(source: &str, target: &str) -> Result<Self, SpatialError> {
        Ok(Self {
            source: parse_proj(source)?,
            target: parse_proj(target)?,
            identity: normalize(source) == normalize(target),
        })
    }

    /// Returns `true` if this reprojector leaves coordinates unchanged.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.identity
    }

    /// Reprojects a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Transform`] if the coordinate falls outside
    /// the domain of either projection.
    pub fn project_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
        if self.identity {
            return Ok(coord);
        }

        let (x, y) = if self.source.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians())
        } else {
            (coord.x, coord.y)
        };

        let mut point = (x, y, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| SpatialError::Transform(format!("({}, {}): {e}", coord.x, coord.y)))?;

        let (x, y) = if self.target.is_latlong() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        Ok(Coord { x, y })
    }

    /// Reprojects every vertex of a polygon.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Transform`] if any vertex fails.
    pub fn project(&self, polygon: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, SpatialError> {
        if self.identity {
            return Ok(polygon.clone());
        }
        polygon.try_map_coords(|c| self.project_coord(c))
    }
}

fn parse_proj(definition: &str) -> Result<Proj, SpatialError> {
    Proj::from_proj_string(definition).map_err(|e| SpatialError::InvalidCrs {
        definition: definition.to_string(),
        message: e.to_string(),
    })
}

/// Collapses whitespace so cosmetically different definitions compare equal.
fn normalize(definition: &str) -> String {
    definition.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::square;

    const UTM_12N: &str = "+proj=utm +zone=12 +datum=NAD83 +units=m +no_defs";
    const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

    #[test]
    fn identical_definitions_are_identity() {
        let reprojector = Reprojector::new(UTM_12N, &format!("  {UTM_12N} ")).unwrap();
        assert!(reprojector.is_identity());

        let input = square(400_000.0, 4_500_000.0, 100.0);
        assert_eq!(reprojector.project(&input).unwrap(), input);
    }

    #[test]
    fn central_meridian_projects_to_false_easting() {
        let reprojector = Reprojector::new(WGS84, UTM_12N).unwrap();
        let projected = reprojector
            .project_coord(Coord { x: -111.0, y: 40.0 })
            .unwrap();

        assert!((projected.x - 500_000.0).abs() < 1.0);
        assert!((projected.y - 4_427_757.0).abs() < 100.0);
    }

    #[test]
    fn round_trip_returns_to_origin() {
        let forward = Reprojector::new(WGS84, UTM_12N).unwrap();
        let back = Reprojector::new(UTM_12N, WGS84).unwrap();

        let start = Coord { x: -111.9, y: 40.7 };
        let end = back
            .project_coord(forward.project_coord(start).unwrap())
            .unwrap();

        assert!((end.x - start.x).abs() < 1e-6);
        assert!((end.y - start.y).abs() < 1e-6);
    }

    #[test]
    fn garbage_definition_is_rejected() {
        assert!(matches!(
            Reprojector::new("not a crs", UTM_12N),
            Err(SpatialError::InvalidCrs { .. })
        ));
    }
}
