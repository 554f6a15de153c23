//! Nearest-feature queries over a projected feature set.
//!
//! Parcel classification is O(parcels × features) if done naively; an R-tree
//! over feature anchor points keeps each query logarithmic. Polygon features
//! (parks) are anchored at their centroid, so candidate anchors are refined
//! against exact polygon distance with a bound derived from the largest
//! feature extent.

use geo::{Geometry, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::geometry::{distance_to_geometry, representative_point, FEET_PER_METER};

type AnchorEntry = GeomWithData<[f64; 2], usize>;

/// Spatial index over one feature class, in projected meters.
pub struct FeatureIndex {
    tree: RTree<AnchorEntry>,
    geometries: Vec<Geometry<f64>>,
    /// Largest anchor-to-vertex distance across all indexed geometries.
    /// Zero when every feature is a point.
    max_extent: f64,
}

impl FeatureIndex {
    /// Builds an index from projected geometries. Features without a
    /// representative point are dropped.
    #[must_use]
    pub fn build(geometries: Vec<Geometry<f64>>) -> Self {
        let mut entries = Vec::with_capacity(geometries.len());
        let mut max_extent = 0.0f64;
        for (i, geometry) in geometries.iter().enumerate() {
            let Some(anchor) = representative_point(geometry) else {
                continue;
            };
            entries.push(AnchorEntry::new([anchor.x(), anchor.y()], i));
            max_extent = max_extent.max(geometry_extent(&anchor, geometry));
        }
        Self {
            tree: RTree::bulk_load(entries),
            geometries,
            max_extent,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Minimum distance in meters from `point` to any indexed feature, or
    /// `None` when the index is empty.
    #[must_use]
    pub fn nearest_distance_meters(&self, point: &Point<f64>) -> Option<f64> {
        let query = [point.x(), point.y()];
        let mut best: Option<f64> = None;
        for entry in self.tree.nearest_neighbor_iter(&query) {
            let anchor = entry.geom();
            let anchor_distance = (anchor[0] - query[0]).hypot(anchor[1] - query[1]);
            // Every remaining candidate's exact distance is at least its
            // anchor distance minus the largest feature extent.
            if let Some(best_so_far) = best {
                if anchor_distance - self.max_extent > best_so_far {
                    break;
                }
            }
            let exact = distance_to_geometry(point, &self.geometries[entry.data]);
            if best.is_none_or(|b| exact < b) {
                best = Some(exact);
            }
        }
        best
    }

    /// Minimum distance in feet, the unit the ring thresholds are written in.
    #[must_use]
    pub fn nearest_distance_feet(&self, point: &Point<f64>) -> Option<f64> {
        self.nearest_distance_meters(point)
            .map(|m| m * FEET_PER_METER)
    }
}

fn geometry_extent(anchor: &Point<f64>, geometry: &Geometry<f64>) -> f64 {
    use geo::CoordsIter;
    geometry
        .coords_iter()
        .map(|c| (c.x - anchor.x()).hypot(c.y - anchor.y()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use geo::{polygon, Point};

    #[test]
    fn empty_index_returns_none() {
        let index = FeatureIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index
            .nearest_distance_meters(&Point::new(0.0, 0.0))
            .is_none());
    }

    #[test]
    fn nearest_point_feature() {
        let index = FeatureIndex::build(vec![
            Point::new(0.0, 0.0).into(),
            Point::new(100.0, 0.0).into(),
            Point::new(0.0, 50.0).into(),
        ]);
        assert_eq!(index.len(), 3);
        let d = index
            .nearest_distance_meters(&Point::new(10.0, 40.0))
            .unwrap();
        // closest is (0, 50)
        assert_approx_eq!(d, (10.0f64.powi(2) + 10.0f64.powi(2)).sqrt(), 1e-9);
    }

    #[test]
    fn nearest_polygon_beats_nearer_anchor() {
        // A long park whose centroid is far away but whose edge is close,
        // plus a point feature with a nearer anchor. The refinement must pick
        // the park edge.
        let park = polygon![
            (x: 10.0, y: -500.0),
            (x: 20.0, y: -500.0),
            (x: 20.0, y: 500.0),
            (x: 10.0, y: 500.0),
            (x: 10.0, y: -500.0),
        ];
        let index = FeatureIndex::build(vec![park.into(), Point::new(40.0, 0.0).into()]);
        let d = index.nearest_distance_meters(&Point::new(0.0, 0.0)).unwrap();
        assert_approx_eq!(d, 10.0, 1e-9);
    }

    #[test]
    fn feet_conversion() {
        let index = FeatureIndex::build(vec![Point::new(100.0, 0.0).into()]);
        let feet = index.nearest_distance_feet(&Point::new(0.0, 0.0)).unwrap();
        assert_approx_eq!(feet, 328.084, 1e-6);
    }
}
