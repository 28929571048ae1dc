//! Distance to the nearest paved road
//!
//! Queries Overpass for every `highway` way within 1 km of the point, keeps
//! the ones that look like roads, and measures the spherical distance to
//! each of their segments. Results are clamped to [`MAX_DISTANCE_METERS`].

use crate::clients::{OverpassQuery, OverpassResponse};
use crate::error::IngestResult;
use geo::Coord;
use geoharvest_common::geometry::{distance_to_segment_radians, radians_to_meters};
use std::sync::Arc;

/// Search radius and upper bound of every result
pub const MAX_DISTANCE_METERS: u32 = 1000;

/// `surface` values that make any way a road
const PAVED_SURFACES: &[&str] = &["paved", "asphalt", "chipseal", "concrete"];

/// `highway` values treated as roads regardless of surface
const ROAD_HIGHWAYS: &[&str] = &[
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "motorway_link",
    "trunk_link",
    "primary_link",
    "secondary_link",
    "tertiary_link",
    "living_street",
    "service",
    "raceway",
    "busway",
    "rest_area",
];

/// Overpass QL for all highway ways (and their nodes) within 1 km
pub fn build_query(lng: f64, lat: f64) -> String {
    format!(
        "[out:json];\nway(around:{},{},{})[\"highway\"];\n(._;>;);\nout;\n",
        MAX_DISTANCE_METERS, lat, lng
    )
}

/// Does any `;`-separated value equal a needle, or sit in its `needle:` namespace?
pub fn tag_value_contains(tag_value: &str, needles: &[&str]) -> bool {
    tag_value.split(';').any(|value| {
        needles.iter().any(|needle| {
            value == *needle
                || value
                    .strip_prefix(needle)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
    })
}

/// Paved, or a vehicular highway class
pub fn is_road(highway: &str, surface: &str) -> bool {
    tag_value_contains(surface, PAVED_SURFACES) || tag_value_contains(highway, ROAD_HIGHWAYS)
}

/// Nearest road distance in whole metres, within `[0, 1000]`
///
/// Every consecutive node pair of every road way is measured.
pub fn nearest_road_meters(lng: f64, lat: f64, response: &OverpassResponse) -> u32 {
    let p = Coord { x: lng, y: lat };
    let mut closest = MAX_DISTANCE_METERS as f64;

    for way in &response.ways {
        if !is_road(way.tag("highway"), way.tag("surface")) {
            continue;
        }

        for pair in way.nodes.windows(2) {
            let a = Coord { x: pair[0].lng, y: pair[0].lat };
            let b = Coord { x: pair[1].lng, y: pair[1].lat };
            let meters = radians_to_meters(distance_to_segment_radians(p, a, b)).round();
            if meters < closest {
                closest = meters;
            }
        }
    }

    closest.clamp(0.0, MAX_DISTANCE_METERS as f64) as u32
}

/// Road proximity estimator backed by an Overpass endpoint
pub struct RoadProximity {
    overpass: Arc<dyn OverpassQuery>,
}

impl RoadProximity {
    pub fn new(overpass: Arc<dyn OverpassQuery>) -> Self {
        Self { overpass }
    }

    pub async fn distance_to_road(&self, lng: f64, lat: f64) -> IngestResult<u32> {
        let response = self.overpass.query(&build_query(lng, lat)).await?;
        let meters = nearest_road_meters(lng, lat, &response);
        tracing::debug!(lng, lat, ways = response.ways.len(), meters, "Road distance");
        Ok(meters)
    }
}
