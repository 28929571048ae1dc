//! Geometry helpers
//!
//! Two kinds of geometry are used by the ingest pipeline:
//! - **Planar** membership tests against region boundaries (lng = x, lat = y).
//!   The bounding box is only a coarse pre-filter for the search API; the
//!   multipolygon is the ground truth.
//! - **Spherical** point-to-segment distance for road proximity, computed on
//!   unit vectors so that segments follow great circles.

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.01;

/// Axis-aligned bounding box in geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Format as `min_lng,min_lat,max_lng,max_lat` with 6 decimals
    pub fn to_query_param(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.min_lng, self.min_lat, self.max_lng, self.max_lat
        )
    }

    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Bounding box of a boundary, `None` for an empty multipolygon
pub fn bounding_box(boundary: &MultiPolygon<f64>) -> Option<BoundingBox> {
    boundary.bounding_rect().map(|rect| BoundingBox {
        min_lng: rect.min().x,
        min_lat: rect.min().y,
        max_lng: rect.max().x,
        max_lat: rect.max().y,
    })
}

/// Exact point-in-multipolygon test. Points on the boundary are outside.
pub fn contains_point(boundary: &MultiPolygon<f64>, lng: f64, lat: f64) -> bool {
    boundary.contains(&Point::new(lng, lat))
}

#[derive(Debug, Clone, Copy)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    fn from_coord(c: Coord<f64>) -> Self {
        let (lat, lng) = (c.y.to_radians(), c.x.to_radians());
        Self {
            x: lat.cos() * lng.cos(),
            y: lat.cos() * lng.sin(),
            z: lat.sin(),
        }
    }

    fn dot(self, o: Self) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    fn cross(self, o: Self) -> Self {
        Self {
            x: self.y * o.z - self.z * o.y,
            y: self.z * o.x - self.x * o.z,
            z: self.x * o.y - self.y * o.x,
        }
    }

    fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    fn angle_to(self, o: Self) -> f64 {
        self.cross(o).norm().atan2(self.dot(o))
    }
}

/// Angular distance (radians) from `p` to the great-circle segment `a`-`b`
///
/// If the perpendicular foot of `p` falls between the endpoints, the distance
/// is to the great circle itself; otherwise it is to the nearer endpoint.
pub fn distance_to_segment_radians(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (p, a, b) = (Vec3::from_coord(p), Vec3::from_coord(a), Vec3::from_coord(b));

    let to_endpoints = || p.angle_to(a).min(p.angle_to(b));

    let n = a.cross(b);
    let n_len = n.norm();
    if n_len < 1e-15 {
        // Degenerate (coincident or antipodal endpoints)
        return to_endpoints();
    }

    let past_a = p.dot(n.cross(a)) > 0.0;
    let before_b = p.dot(b.cross(n)) > 0.0;
    if past_a && before_b {
        (p.dot(n).abs() / n_len).clamp(0.0, 1.0).asin()
    } else {
        to_endpoints()
    }
}

/// Convert an angular distance on the Earth's surface to meters
pub fn radians_to_meters(angle: f64) -> f64 {
    angle * EARTH_RADIUS_KM * 1000.0
}
