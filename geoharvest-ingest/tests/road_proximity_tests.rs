//! Road proximity tests against synthetic Overpass responses
//!
//! Fixture coordinates are placed so the nearest road lands at a known
//! distance from the query point.

mod helpers;

use geoharvest_ingest::clients::OverpassResponse;
use geoharvest_ingest::services::road_proximity::MAX_DISTANCE_METERS;
use geoharvest_ingest::services::{nearest_road_meters, RoadProximity};
use helpers::FakeOverpass;
use std::sync::Arc;

const LNG: f64 = -105.494735;
const LAT: f64 = 39.778578;

fn fixture(body: &[u8]) -> OverpassResponse {
    OverpassResponse::from_json(body).unwrap()
}

#[test]
fn test_nearest_residential_road() {
    let response = fixture(include_bytes!("fixtures/overpass_road_315m.json"));

    assert_eq!(response.ways.len(), 4);
    // The footway and track are closer but are not roads
    assert_eq!(nearest_road_meters(LNG, LAT, &response), 315);
}

#[test]
fn test_no_ways_is_max_distance() {
    let response = fixture(include_bytes!("fixtures/overpass_no_ways.json"));

    assert!(response.ways.is_empty());
    assert_eq!(nearest_road_meters(LNG, LAT, &response), MAX_DISTANCE_METERS);
}

#[test]
fn test_every_segment_is_measured() {
    // Nearest point lies on the final segment of a three-node way
    let response = fixture(include_bytes!("fixtures/overpass_multi_segment.json"));

    assert_eq!(response.ways[0].nodes.len(), 3);
    assert_eq!(nearest_road_meters(LNG, LAT, &response), 315);
}

#[test]
fn test_paved_surface_makes_any_highway_a_road() {
    let body = br#"{
        "elements": [
            {"type": "way", "id": 1, "nodes": [1, 2], "tags": {"highway": "footway", "surface": "asphalt"}},
            {"type": "node", "id": 1, "lat": 39.770, "lon": -105.4910489},
            {"type": "node", "id": 2, "lat": 39.790, "lon": -105.4910489}
        ]
    }"#;
    assert_eq!(nearest_road_meters(LNG, LAT, &fixture(body)), 315);
}

#[test]
fn test_point_on_road_is_zero() {
    let body = br#"{
        "elements": [
            {"type": "node", "id": 1, "lat": 39.770, "lon": -105.494735},
            {"type": "node", "id": 2, "lat": 39.790, "lon": -105.494735},
            {"type": "way", "id": 1, "nodes": [1, 2], "tags": {"highway": "primary"}}
        ]
    }"#;
    assert_eq!(nearest_road_meters(LNG, LAT, &fixture(body)), 0);
}

#[tokio::test]
async fn test_distance_to_road_sends_around_query() {
    let overpass = Arc::new(FakeOverpass::from_fixture(include_bytes!(
        "fixtures/overpass_road_315m.json"
    )));
    let roads = RoadProximity::new(overpass.clone());

    let meters = roads.distance_to_road(LNG, LAT).await.unwrap();
    assert_eq!(meters, 315);

    let queries = overpass.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("way(around:1000,39.778578,-105.494735)[\"highway\"];"));
}
