//! Buffer overlay rendering for the map view.
//!
//! Each enabled policy gets one overlay showing its outermost ring distance
//! around that policy's features. Two strategies exist: an exact polygon
//! union of per-point circles, and a raster mask that stamps filled circles
//! into a viewport-sized grid. The exact shape is what gets drawn as vector
//! geometry; the raster mask trades fidelity for constant per-frame cost on
//! large feature sets.

use geo::{Coord, MultiPolygon, Point};
use rustc_hash::FxHashMap;

use crate::error::MilehighError;
use crate::geometry::{circle_polygon, union_all, LocalProjection, FEET_PER_METER};
use crate::log::warn;

/// Above this many stamp centers the automatic strategy switches from exact
/// union to raster.
pub const EXACT_UNION_MAX_FEATURES: usize = 64;

/// Circle segment count for exact buffers.
const CIRCLE_SEGMENTS: usize = 32;

/// Web-mercator ground resolution at the equator for zoom 0, meters/pixel.
const MERCATOR_BASE_RESOLUTION: f64 = 156_543.033_92;

/// Meters of ground per screen pixel at `zoom` and latitude `lat_deg`.
#[must_use]
pub fn meters_per_pixel(zoom: f64, lat_deg: f64) -> f64 {
    MERCATOR_BASE_RESOLUTION * lat_deg.to_radians().cos() / 2f64.powf(zoom)
}

/// The visible map window, in lon/lat bounds plus screen dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub zoom: f64,
    pub width_px: u32,
    pub height_px: u32,
}

impl Viewport {
    #[must_use]
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.west + self.east) / 2.0,
            y: (self.south + self.north) / 2.0,
        }
    }

    #[must_use]
    pub fn meters_per_pixel(&self) -> f64 {
        meters_per_pixel(self.zoom, self.center().y)
    }

    fn validate(&self) -> Result<(), MilehighError> {
        if self.east <= self.west || self.north <= self.south {
            return Err(MilehighError::MilehighError(format!(
                "degenerate viewport bounds ({}, {}) to ({}, {})",
                self.west, self.south, self.east, self.north
            )));
        }
        if self.width_px == 0 || self.height_px == 0 {
            return Err(MilehighError::MilehighError(
                "viewport has zero pixel size".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which rendering strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferQuality {
    /// Exact union up to [`EXACT_UNION_MAX_FEATURES`] centers, raster above.
    #[default]
    Auto,
    Exact,
    Fast,
}

/// A rendered overlay shape.
#[derive(Debug, Clone)]
pub enum BufferShape {
    /// Merged circle polygons in lon/lat.
    Exact(MultiPolygon<f64>),
    Raster(RasterMask),
}

/// A single-channel coverage mask over the viewport.
#[derive(Debug, Clone)]
pub struct RasterMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl RasterMask {
    fn new(width: u32, height: u32) -> Self {
        RasterMask {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[(y * self.width + x) as usize]
    }

    #[must_use]
    pub fn coverage(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Stamps a filled circle, clipped to the mask bounds.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn stamp_circle(&mut self, cx: f64, cy: f64, radius_px: f64) {
        let r2 = radius_px * radius_px;
        let x_min = ((cx - radius_px).floor().max(0.0)) as u32;
        let y_min = ((cy - radius_px).floor().max(0.0)) as u32;
        let x_max = (cx + radius_px).ceil().min(f64::from(self.width) - 1.0);
        let y_max = (cy + radius_px).ceil().min(f64::from(self.height) - 1.0);
        if x_max < 0.0 || y_max < 0.0 {
            return;
        }
        for y in y_min..=(y_max as u32) {
            for x in x_min..=(x_max as u32) {
                let dx = f64::from(x) + 0.5 - cx;
                let dy = f64::from(y) + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.bits[(y * self.width + x) as usize] = true;
                }
            }
        }
    }
}

/// One policy's rendered overlay.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub distance_ft: f64,
    pub shape: BufferShape,
}

/// Holds each policy's stamp centers and rendered overlay. Rendering failures
/// are contained per overlay: the failure is logged and that overlay omitted,
/// never propagated to the caller.
pub struct OverlayManager {
    quality: BufferQuality,
    sources: FxHashMap<String, Vec<Coord<f64>>>,
    overlays: FxHashMap<String, Overlay>,
}

impl OverlayManager {
    #[must_use]
    pub fn new(quality: BufferQuality) -> Self {
        OverlayManager {
            quality,
            sources: FxHashMap::default(),
            overlays: FxHashMap::default(),
        }
    }

    /// Registers the stamp centers for `key`: every coordinate of every
    /// feature geometry. Dense line vertices approximate a line buffer.
    pub fn set_source(&mut self, key: &str, geometries: &[geo::Geometry<f64>]) {
        use geo::CoordsIter;
        let centers: Vec<Coord<f64>> = geometries
            .iter()
            .flat_map(CoordsIter::coords_iter)
            .collect();
        self.sources.insert(key.to_string(), centers);
    }

    /// Renders (or re-renders) the overlay for `key` at `distance_ft`.
    pub fn render(&mut self, key: &str, distance_ft: f64, viewport: &Viewport) {
        match self.try_render(key, distance_ft, viewport) {
            Ok(overlay) => {
                self.overlays.insert(key.to_string(), overlay);
            }
            Err(e) => {
                warn!("overlay {key} failed to render, omitting: {e}");
                self.overlays.remove(key);
            }
        }
    }

    /// Redraws `key` at a new distance using the already-registered features.
    pub fn update_distance(&mut self, key: &str, distance_ft: f64, viewport: &Viewport) {
        self.render(key, distance_ft, viewport);
    }

    /// Removes the rendered overlay but keeps the registered features, so a
    /// re-enable can redraw without reloading.
    pub fn hide(&mut self, key: &str) {
        self.overlays.remove(key);
    }

    /// Removes the overlay and its source features.
    pub fn clear(&mut self, key: &str) {
        self.sources.remove(key);
        self.overlays.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.sources.clear();
        self.overlays.clear();
    }

    #[must_use]
    pub fn overlay(&self, key: &str) -> Option<&Overlay> {
        self.overlays.get(key)
    }

    #[must_use]
    pub fn has_source(&self, key: &str) -> bool {
        self.sources.contains_key(key)
    }

    fn try_render(
        &self,
        key: &str,
        distance_ft: f64,
        viewport: &Viewport,
    ) -> Result<Overlay, MilehighError> {
        viewport.validate()?;
        if !distance_ft.is_finite() || distance_ft <= 0.0 {
            return Err(MilehighError::MilehighError(format!(
                "overlay {key} has invalid buffer distance {distance_ft}"
            )));
        }
        let centers = self.sources.get(key).ok_or_else(|| {
            MilehighError::MilehighError(format!("overlay {key} has no registered features"))
        })?;

        let exact = match self.quality {
            BufferQuality::Exact => true,
            BufferQuality::Fast => false,
            BufferQuality::Auto => centers.len() <= EXACT_UNION_MAX_FEATURES,
        };
        let radius_m = distance_ft / FEET_PER_METER;
        let shape = if exact {
            let center = viewport.center();
            let projection = LocalProjection::new(center.x, center.y);
            let circles: Vec<_> = centers
                .iter()
                .map(|c| {
                    circle_polygon(Point::from(projection.project(*c)), radius_m, CIRCLE_SEGMENTS)
                })
                .collect();
            BufferShape::Exact(projection.unproject_polygons(&union_all(&circles)))
        } else {
            let radius_px = radius_m / viewport.meters_per_pixel();
            let mut mask = RasterMask::new(viewport.width_px, viewport.height_px);
            let x_scale = f64::from(viewport.width_px) / (viewport.east - viewport.west);
            let y_scale = f64::from(viewport.height_px) / (viewport.north - viewport.south);
            for c in centers {
                let px = (c.x - viewport.west) * x_scale;
                // Screen y grows downward.
                let py = (viewport.north - c.y) * y_scale;
                mask.stamp_circle(px, py, radius_px);
            }
            BufferShape::Raster(mask)
        };
        Ok(Overlay { distance_ft, shape })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use geo::Area;

    fn viewport() -> Viewport {
        Viewport {
            west: -105.05,
            south: 39.70,
            east: -104.95,
            north: 39.80,
            zoom: 13.0,
            width_px: 256,
            height_px: 256,
        }
    }

    fn point_features(coords: &[(f64, f64)]) -> Vec<geo::Geometry<f64>> {
        coords
            .iter()
            .map(|(x, y)| geo::Geometry::Point(Point::new(*x, *y)))
            .collect()
    }

    #[test]
    fn pixel_scale_halves_per_zoom_out() {
        let at_12 = meters_per_pixel(12.0, 39.7);
        let at_13 = meters_per_pixel(13.0, 39.7);
        assert_approx_eq!(at_12, at_13 * 2.0, 1e-9);
        // Equator, zoom 0: the base resolution itself.
        assert_approx_eq!(meters_per_pixel(0.0, 0.0), 156_543.033_92, 1e-6);
    }

    #[test]
    fn exact_buffer_covers_the_feature() {
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.set_source("TOD", &point_features(&[(-105.0, 39.75)]));
        manager.render("TOD", 500.0, &viewport());
        let overlay = manager.overlay("TOD").expect("overlay rendered");
        let BufferShape::Exact(shape) = &overlay.shape else {
            panic!("expected an exact shape");
        };
        assert_eq!(shape.0.len(), 1);
        assert!(shape.unsigned_area() > 0.0);
    }

    #[test]
    fn nearby_exact_buffers_merge() {
        // Two stations ~330 ft apart with 500 ft buffers form one blob.
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.set_source("TOD", &point_features(&[(-105.0, 39.75), (-105.0, 39.7503)]));
        manager.render("TOD", 500.0, &viewport());
        let overlay = manager.overlay("TOD").expect("overlay rendered");
        let BufferShape::Exact(shape) = &overlay.shape else {
            panic!("expected an exact shape");
        };
        assert_eq!(shape.0.len(), 1);
    }

    #[test]
    fn auto_switches_to_raster_above_threshold() {
        let coords: Vec<(f64, f64)> = (0..100)
            .map(|i| (-105.05 + 0.001 * f64::from(i), 39.75))
            .collect();
        let mut manager = OverlayManager::new(BufferQuality::Auto);
        manager.set_source("BOD", &point_features(&coords));
        manager.render("BOD", 250.0, &viewport());
        assert!(matches!(
            manager.overlay("BOD").unwrap().shape,
            BufferShape::Raster(_)
        ));

        manager.set_source("TOD", &point_features(&[(-105.0, 39.75)]));
        manager.render("TOD", 500.0, &viewport());
        assert!(matches!(
            manager.overlay("TOD").unwrap().shape,
            BufferShape::Exact(_)
        ));
    }

    #[test]
    fn raster_stamp_is_clipped_to_viewport() {
        let mut manager = OverlayManager::new(BufferQuality::Fast);
        // A feature well outside the viewport to the west.
        manager.set_source("BOD", &point_features(&[(-106.0, 39.75), (-105.0, 39.75)]));
        manager.render("BOD", 500.0, &viewport());
        let overlay = manager.overlay("BOD").unwrap();
        let BufferShape::Raster(mask) = &overlay.shape else {
            panic!("expected raster");
        };
        assert!(mask.coverage() > 0);
        // Every set pixel is inside the mask by construction.
        assert_eq!(mask.width(), 256);
        assert_eq!(mask.height(), 256);
        let center_set = mask.is_set(128, 128);
        assert!(center_set);
    }

    #[test]
    fn update_distance_redraws_without_new_source() {
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.set_source("TOD", &point_features(&[(-105.0, 39.75)]));
        manager.render("TOD", 500.0, &viewport());
        let small = match &manager.overlay("TOD").unwrap().shape {
            BufferShape::Exact(shape) => shape.unsigned_area(),
            BufferShape::Raster(_) => panic!("expected exact"),
        };
        manager.update_distance("TOD", 1500.0, &viewport());
        let overlay = manager.overlay("TOD").unwrap();
        assert_approx_eq!(overlay.distance_ft, 1500.0);
        let large = match &overlay.shape {
            BufferShape::Exact(shape) => shape.unsigned_area(),
            BufferShape::Raster(_) => panic!("expected exact"),
        };
        assert!(large > small * 4.0);
    }

    #[test]
    fn clear_forgets_the_overlay() {
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.set_source("TOD", &point_features(&[(-105.0, 39.75)]));
        manager.render("TOD", 500.0, &viewport());
        manager.clear("TOD");
        assert!(manager.overlay("TOD").is_none());
        assert!(!manager.has_source("TOD"));
    }

    #[test]
    fn failed_overlay_is_omitted_not_fatal() {
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.set_source("TOD", &point_features(&[(-105.0, 39.75)]));
        // Invalid distance: render logs and omits, does not panic.
        manager.render("TOD", -10.0, &viewport());
        assert!(manager.overlay("TOD").is_none());
        // A later valid render recovers.
        manager.render("TOD", 500.0, &viewport());
        assert!(manager.overlay("TOD").is_some());
    }

    #[test]
    fn rendering_without_source_is_omitted() {
        let mut manager = OverlayManager::new(BufferQuality::Exact);
        manager.render("POD", 250.0, &viewport());
        assert!(manager.overlay("POD").is_none());
    }
}
