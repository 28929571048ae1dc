//! Data model shared by the crawler, the enricher and persistence

use crate::geometry;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use crate::geometry::BoundingBox;

// ============================================================================
// Regions and cursors
// ============================================================================

/// Hand-drawn geographic region. Immutable after configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
    /// Exact boundary (lng = x, lat = y)
    pub boundary: MultiPolygon<f64>,
}

impl Region {
    pub fn new(id: i64, name: impl Into<String>, boundary: MultiPolygon<f64>) -> Self {
        Self {
            id,
            name: name.into(),
            boundary,
        }
    }

    /// Coarse pre-filter passed to the search API
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        geometry::bounding_box(&self.boundary)
    }

    /// Exact membership test
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        geometry::contains_point(&self.boundary, lng, lat)
    }
}

/// Crawl position for one region
///
/// `page` and `min_upload_date` always change together; only the region
/// crawler produces new cursors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub region_id: i64,
    pub min_upload_date: DateTime<Utc>,
    pub page: u32,
    pub last_check: Option<DateTime<Utc>>,
}

impl Cursor {
    /// Starting state: epoch, page 1, never checked
    pub fn initial(region_id: i64) -> Self {
        Self {
            region_id,
            min_upload_date: crate::time::epoch(),
            page: 1,
            last_check: None,
        }
    }

    /// Repair a stored page of 0 (never valid for the search API)
    pub fn normalized(mut self) -> Self {
        if self.page == 0 {
            self.page = 1;
        }
        self
    }
}

// ============================================================================
// Search results and photos
// ============================================================================

/// Unverified search result row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub latitude: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub longitude: String,
    #[serde(default, rename = "dateupload", deserialize_with = "string_or_number")]
    pub date_upload: String,
}

impl Candidate {
    /// Parse `(lng, lat)`; either coordinate missing or malformed is an error
    pub fn lng_lat(&self) -> Result<(f64, f64)> {
        Ok((
            parse_coordinate("longitude", &self.longitude)?,
            parse_coordinate("latitude", &self.latitude)?,
        ))
    }
}

/// One size rendition offered by the photo host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeVariant {
    pub label: String,
    #[serde(deserialize_with = "u32_from_string_or_number")]
    pub width: u32,
    #[serde(deserialize_with = "u32_from_string_or_number")]
    pub height: u32,
    pub source: String,
    #[serde(default = "default_media")]
    pub media: String,
}

fn default_media() -> String {
    "photo".to_string()
}

/// One EXIF tag with its raw textual value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExifTag {
    pub tag: String,
    pub raw: String,
}

impl ExifTag {
    pub fn new(tag: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            raw: raw.into(),
        }
    }
}

/// Stored rendition of a photo in the blob store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub width: u32,
    pub height: u32,
    /// Final URL; empty until the asset has been stored
    pub source: String,
}

/// Accepted photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub region_id: i64,
    /// Owner, title, description and location as returned by the host
    pub info: Value,
    pub sizes: Vec<SizeVariant>,
    pub exif: Vec<ExifTag>,
    #[serde(default)]
    pub medium: PhotoSize,
    #[serde(default)]
    pub large: PhotoSize,
}

impl Photo {
    /// Raw value of the first EXIF tag named `tag`
    pub fn exif_raw(&self, tag: &str) -> Option<&str> {
        self.exif
            .iter()
            .find(|t| t.tag == tag)
            .map(|t| t.raw.as_str())
    }

    /// Parse `(lng, lat)` from `info.location`
    pub fn parse_lng_lat(&self) -> Result<(f64, f64)> {
        let location = self
            .info
            .get("location")
            .ok_or_else(|| Error::InvalidInput(format!("photo {} has no location", self.id)))?;

        let field = |name: &str| -> Result<f64> {
            match location.get(name) {
                Some(Value::String(s)) => parse_coordinate(name, s),
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| Error::InvalidInput(format!("{} is not finite", name))),
                _ => Err(Error::InvalidInput(format!(
                    "photo {} location has no {}",
                    self.id, name
                ))),
            }
        };

        Ok((field("longitude")?, field("latitude")?))
    }
}

/// Enrichment record, 1:1 with a photo and append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub photo_id: String,
    pub terrain_elevation_meters: i32,
    /// `None` when the photo carries no usable GPS altitude
    pub gps_altitude_meters: Option<i32>,
    pub validity_score: f64,
    pub validity_model: String,
    pub nearest_road_meters: u32,
}

impl Feature {
    pub fn no_gps_altitude(&self) -> bool {
        self.gps_altitude_meters.is_none()
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn parse_coordinate(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid {}: {:?}", name, raw)))?;
    if !value.is_finite() {
        return Err(Error::InvalidInput(format!("invalid {}: {:?}", name, raw)));
    }
    Ok(value)
}

/// The host is inconsistent about quoting numbers; accept both
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn u32_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid dimension: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid dimension: {:?}", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected dimension, got {}",
            other
        ))),
    }
}
