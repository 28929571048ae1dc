//! Regions, candidates and photos used across the integration tests

use geo::{polygon, MultiPolygon};
use geoharvest_common::{Candidate, ExifTag, Photo, PhotoSize, Region, SizeVariant};
use geoharvest_ingest::clients::PhotoDetail;
use serde_json::json;

/// Inside the Denali boundary
pub const INSIDE: (f64, f64) = (-150.044398, 63.519358);

/// Inside the Denali bounding box but west of the slanted edge
pub const OUTSIDE: (f64, f64) = (-152.1032309, 63.4936134);

/// Quadrilateral around Denali with a slanted western edge
pub fn denali() -> Region {
    Region::new(
        1,
        "Denali",
        MultiPolygon(vec![polygon![
            (x: -152.5, y: 62.5),
            (x: -149.0, y: 62.5),
            (x: -149.0, y: 64.2),
            (x: -151.2, y: 64.2),
            (x: -152.5, y: 62.5),
        ]]),
    )
}

pub fn candidate(id: &str, (lng, lat): (f64, f64), date_upload: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        owner: "12345678@N00".to_string(),
        latitude: lat.to_string(),
        longitude: lng.to_string(),
        date_upload: date_upload.to_string(),
    }
}

/// Full GPS block, altitude 1523.6 m above sea level
pub fn gps_exif() -> Vec<ExifTag> {
    vec![
        ExifTag::new("Make", "Canon"),
        ExifTag::new("GPSLatitude", "63 deg 31' 9.69\" N"),
        ExifTag::new("GPSLongitude", "150 deg 2' 39.83\" W"),
        ExifTag::new("GPSAltitude", "1523.6 m"),
        ExifTag::new("GPSAltitudeRef", "Above Sea Level"),
    ]
}

/// Square, Medium, Large and Original renditions served from the photo host
pub fn standard_sizes(id: &str) -> Vec<SizeVariant> {
    let size = |label: &str, width: u32, height: u32| SizeVariant {
        label: label.to_string(),
        width,
        height,
        source: format!("https://live.test/{}_{}.jpg", id, label.replace(' ', "_")),
        media: "photo".to_string(),
    };
    vec![
        size("Square", 75, 75),
        size("Medium", 500, 375),
        size("Large", 1024, 768),
        size("Original", 4000, 3000),
    ]
}

pub fn detail(id: &str, (lng, lat): (f64, f64)) -> PhotoDetail {
    PhotoDetail {
        info: json!({
            "id": id,
            "owner": {"nsid": "12345678@N00", "username": "hiker"},
            "title": {"_content": "Ridge line"},
            "location": {"latitude": lat.to_string(), "longitude": lng.to_string()}
        }),
        sizes: standard_sizes(id),
        exif: gps_exif(),
    }
}

/// Photo as it looks after a successful crawl step
pub fn stored_photo(id: &str, region_id: i64, lng_lat: (f64, f64)) -> Photo {
    let detail = detail(id, lng_lat);
    Photo {
        id: id.to_string(),
        region_id,
        info: detail.info,
        sizes: detail.sizes,
        exif: detail.exif,
        medium: PhotoSize {
            width: 500,
            height: 375,
            source: format!("https://cdn.test/flickr/{}/medium.jpg", id),
        },
        large: PhotoSize {
            width: 1024,
            height: 768,
            source: format!("https://cdn.test/flickr/{}/large.jpg", id),
        },
    }
}
