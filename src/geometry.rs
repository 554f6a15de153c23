//! Planar geometry utilities shared by the evaluator and the buffer renderer.
//!
//! All distance math happens in a local planar projection (meters), never in
//! raw lat/lon degrees. Callers project once, query many times, and convert
//! to feet at the edge.

use geo::{
    Area, BooleanOps, Centroid, Coord, EuclideanDistance, EuclideanLength, Geometry, LineString,
    MapCoords, MultiPolygon, Point, Polygon,
};
use std::f64::consts::PI;

/// Feet per meter, for reporting distances the way the zoning rules are
/// written.
pub const FEET_PER_METER: f64 = 3.28084;

/// Square meters per acre.
pub const SQ_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Meters per degree of latitude on the WGS84 ellipsoid (mean).
const METERS_PER_DEGREE: f64 = 111_319.9;

/// An equirectangular projection centered on a reference coordinate.
///
/// Adequate for city-scale extents: error against a true conformal
/// projection is far below the 250-1980 ft ring thresholds being tested.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coord<f64>,
    cos_lat: f64,
}

impl LocalProjection {
    #[must_use]
    pub fn new(origin_lon: f64, origin_lat: f64) -> Self {
        Self {
            origin: Coord {
                x: origin_lon,
                y: origin_lat,
            },
            cos_lat: origin_lat.to_radians().cos(),
        }
    }

    /// Builds a projection centered on the mean of the given lon/lat
    /// coordinates. Returns `None` for an empty iterator.
    pub fn centered_on<I: IntoIterator<Item = Coord<f64>>>(coords: I) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = Coord { x: 0.0, y: 0.0 };
        for c in coords {
            sum.x += c.x;
            sum.y += c.y;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        Some(Self::new(sum.x / n, sum.y / n))
    }

    /// Projects a lon/lat coordinate to local planar meters.
    #[must_use]
    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.cos_lat * METERS_PER_DEGREE,
            y: (c.y - self.origin.y) * METERS_PER_DEGREE,
        }
    }

    /// Inverse of [`LocalProjection::project`].
    #[must_use]
    pub fn unproject(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x / (self.cos_lat * METERS_PER_DEGREE) + self.origin.x,
            y: c.y / METERS_PER_DEGREE + self.origin.y,
        }
    }

    /// Projects an entire geometry to local planar meters.
    #[must_use]
    pub fn project_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        geometry.map_coords(|c| self.project(c))
    }

    /// Converts a projected geometry back to lon/lat.
    #[must_use]
    pub fn unproject_polygons(&self, merged: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        merged.map_coords(|c| self.unproject(c))
    }
}

/// The point a parcel is measured from: the polygon centroid, falling back to
/// any coordinate of the geometry when the centroid is undefined (degenerate
/// rings).
#[must_use]
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    if let Some(centroid) = geometry.centroid() {
        return Some(centroid);
    }
    first_coord(geometry).map(Point::from)
}

fn first_coord(geometry: &Geometry<f64>) -> Option<Coord<f64>> {
    match geometry {
        Geometry::Point(p) => Some(p.0),
        Geometry::MultiPoint(mp) => mp.0.first().map(|p| p.0),
        Geometry::LineString(ls) => ls.0.first().copied(),
        Geometry::MultiLineString(mls) => mls.0.first().and_then(|ls| ls.0.first().copied()),
        Geometry::Polygon(poly) => poly.exterior().0.first().copied(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .first()
            .and_then(|poly| poly.exterior().0.first().copied()),
        _ => None,
    }
}

/// Minimum planar distance in meters from a point to a geometry. Zero when
/// the point lies inside a polygon feature.
#[must_use]
pub fn distance_to_geometry(point: &Point<f64>, geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Point(p) => point.euclidean_distance(p),
        Geometry::MultiPoint(mp) => mp
            .0
            .iter()
            .map(|p| point.euclidean_distance(p))
            .fold(f64::INFINITY, f64::min),
        Geometry::LineString(ls) => point.euclidean_distance(ls),
        Geometry::MultiLineString(mls) => point.euclidean_distance(mls),
        Geometry::Polygon(poly) => point.euclidean_distance(poly),
        Geometry::MultiPolygon(mp) => point.euclidean_distance(mp),
        _ => f64::INFINITY,
    }
}

/// Approximates a circle of `radius` meters around `center` as a closed
/// polygon with `segments` vertices.
#[must_use]
pub fn circle_polygon(center: Point<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    let n = segments.max(4);
    let r = radius.abs();
    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((center.x() + r * angle.cos(), center.y() + r * angle.sin()));
    }
    // Close the ring
    coords.push(coords[0]);
    Polygon::new(LineString::from(coords), vec![])
}

/// Unions a set of polygons into one merged multipolygon.
///
/// Pairwise union is effectively quadratic; callers cap the input size
/// (the raster strategy handles large feature counts).
#[must_use]
pub fn union_all(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    let mut merged = MultiPolygon::new(vec![]);
    for polygon in polygons {
        if merged.0.is_empty() {
            merged = MultiPolygon::new(vec![polygon.clone()]);
        } else {
            merged = merged.union(&MultiPolygon::new(vec![polygon.clone()]));
        }
    }
    merged
}

/// Area of a projected polygon in acres.
#[must_use]
pub fn area_acres(polygon: &Polygon<f64>) -> f64 {
    polygon.unsigned_area() / SQ_METERS_PER_ACRE
}

/// Polsby-Popper compactness score: `4π·A / P²`.
///
/// 1.0 is a perfect circle; thin strips (roads, rail rights-of-way) score
/// below 0.3. Degenerate polygons are treated as compact so they are not
/// silently filtered on bad data.
#[must_use]
pub fn polsby_popper(polygon: &Polygon<f64>) -> f64 {
    let area = polygon.unsigned_area();
    let perimeter = polygon.exterior().euclidean_length();
    if area > 0.0 && perimeter > 0.0 {
        (4.0 * PI * area) / (perimeter * perimeter)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use geo::{polygon, Point};

    #[test]
    fn projection_round_trips() {
        let projection = LocalProjection::new(-104.9903, 39.7392);
        let c = Coord {
            x: -104.95,
            y: 39.75,
        };
        let projected = projection.project(c);
        let back = projection.unproject(projected);
        assert_approx_eq!(back.x, c.x, 1e-9);
        assert_approx_eq!(back.y, c.y, 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_111km() {
        let projection = LocalProjection::new(0.0, 0.0);
        let projected = projection.project(Coord { x: 0.0, y: 1.0 });
        assert_approx_eq!(projected.y, 111_319.9, 1.0);
    }

    #[test]
    fn distance_zero_inside_polygon() {
        let poly: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        assert_approx_eq!(distance_to_geometry(&Point::new(5.0, 5.0), &poly), 0.0);
        assert_approx_eq!(distance_to_geometry(&Point::new(13.0, 14.0), &poly), 5.0);
    }

    #[test]
    fn circle_area_approximates_pi_r_squared() {
        let circle = circle_polygon(Point::new(0.0, 0.0), 10.0, 64);
        let expected = PI * 100.0;
        let actual = circle.unsigned_area();
        assert!(
            (actual - expected).abs() / expected < 0.01,
            "area error too large: {actual} vs {expected}"
        );
    }

    #[test]
    fn circle_ring_is_closed() {
        let circle = circle_polygon(Point::new(5.0, 5.0), 1.0, 32);
        let ring = circle.exterior();
        assert_eq!(ring.0.len(), 33);
        assert_eq!(ring.0.first(), ring.0.last());
    }

    #[test]
    fn union_merges_overlapping_circles() {
        let a = circle_polygon(Point::new(0.0, 0.0), 10.0, 64);
        let b = circle_polygon(Point::new(5.0, 0.0), 10.0, 64);
        let merged = union_all(&[a.clone(), b.clone()]);
        assert_eq!(merged.0.len(), 1);
        let merged_area = merged.unsigned_area();
        assert!(merged_area < a.unsigned_area() + b.unsigned_area());
        assert!(merged_area > a.unsigned_area());
    }

    #[test]
    fn union_keeps_disjoint_circles_apart() {
        let a = circle_polygon(Point::new(0.0, 0.0), 1.0, 32);
        let b = circle_polygon(Point::new(100.0, 0.0), 1.0, 32);
        let merged = union_all(&[a, b]);
        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn polsby_popper_scores() {
        let circle = circle_polygon(Point::new(0.0, 0.0), 10.0, 128);
        assert!(polsby_popper(&circle) > 0.95);

        let strip = polygon![
            (x: 0.0, y: 0.0),
            (x: 1000.0, y: 0.0),
            (x: 1000.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(polsby_popper(&strip) < 0.3);
    }

    #[test]
    fn representative_point_of_degenerate_ring() {
        // Zero-area ring has no centroid under some definitions; we still
        // want a measuring point.
        let geom: Geometry<f64> = Point::new(3.0, 4.0).into();
        let rep = representative_point(&geom).unwrap();
        assert_approx_eq!(rep.x(), 3.0);
        assert_approx_eq!(rep.y(), 4.0);
    }
}
