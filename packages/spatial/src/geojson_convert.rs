//! Conversion between `GeoJSON` geometries and [`MultiPolygon`]s.

use geo::{Geometry, MultiPolygon};

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
///
/// Handles `Polygon`, `MultiPolygon`, and geometry collections made of
/// those. Returns `None` for any other geometry type.
#[must_use]
pub fn to_multipolygon(geometry: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: Geometry<f64> = geometry.clone().try_into().ok()?;
    flatten_polygons(geo_geom)
}

fn flatten_polygons(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection
                .into_iter()
                .filter_map(flatten_polygons)
                .flat_map(|mp| mp.0)
                .collect();
            if polygons.is_empty() {
                None
            } else {
                Some(MultiPolygon(polygons))
            }
        }
        _ => None,
    }
}

/// Converts a [`MultiPolygon`] into a `GeoJSON` geometry.
#[must_use]
pub fn from_multipolygon(polygon: &MultiPolygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(polygon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_becomes_single_member_multipolygon() {
        let geometry = geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0],
        ]]));

        let mp = to_multipolygon(&geometry).unwrap();
        assert_eq!(mp.0.len(), 1);
    }

    #[test]
    fn points_are_rejected() {
        let geometry = geojson::Geometry::new(geojson::Value::Point(vec![1.0, 2.0]));
        assert!(to_multipolygon(&geometry).is_none());
    }

    #[test]
    fn collection_of_polygons_is_flattened() {
        let square = geojson::Value::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 0.0],
        ]]);
        let geometry = geojson::Geometry::new(geojson::Value::GeometryCollection(vec![
            geojson::Geometry::new(square.clone()),
            geojson::Geometry::new(geojson::Value::Point(vec![5.0, 5.0])),
            geojson::Geometry::new(square),
        ]));

        let mp = to_multipolygon(&geometry).unwrap();
        assert_eq!(mp.0.len(), 2);
    }
}
