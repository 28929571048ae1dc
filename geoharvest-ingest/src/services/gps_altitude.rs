//! GPS altitude from EXIF
//!
//! `GPSAltitude` is expected as `"<metres> m"` and `GPSAltitudeRef` as
//! `"Above Sea Level"` or `"Below Sea Level"`. Anything else is treated as
//! missing by the enricher.

use geoharvest_common::Photo;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static ALTITUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?) m$").expect("altitude pattern is valid"));

#[derive(Debug, Error, PartialEq)]
pub enum AltitudeParseError {
    #[error("no {0} tag")]
    MissingTag(&'static str),

    #[error("unexpected GPSAltitude: {0:?}")]
    BadAltitude(String),

    #[error("unexpected GPSAltitudeRef: {0:?}")]
    BadReference(String),
}

/// Signed altitude in metres
pub fn parse_gps_altitude(photo: &Photo) -> Result<f64, AltitudeParseError> {
    let raw = photo
        .exif_raw("GPSAltitude")
        .ok_or(AltitudeParseError::MissingTag("GPSAltitude"))?;
    let reference = photo
        .exif_raw("GPSAltitudeRef")
        .ok_or(AltitudeParseError::MissingTag("GPSAltitudeRef"))?;

    let value: f64 = ALTITUDE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| AltitudeParseError::BadAltitude(raw.to_string()))?;

    match reference {
        "Above Sea Level" => Ok(value),
        "Below Sea Level" => Ok(-value),
        other => Err(AltitudeParseError::BadReference(other.to_string())),
    }
}

/// Rounded altitude, or `None` when absent or unparsable
pub fn gps_altitude_meters(photo: &Photo) -> Option<i32> {
    match parse_gps_altitude(photo) {
        Ok(value) => Some(value.round() as i32),
        Err(e) => {
            tracing::debug!(photo_id = %photo.id, error = %e, "No usable GPS altitude");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoharvest_common::{ExifTag, PhotoSize};
    use serde_json::json;

    fn photo(tags: &[(&str, &str)]) -> Photo {
        Photo {
            id: "1".to_string(),
            region_id: 1,
            info: json!({}),
            sizes: vec![],
            exif: tags.iter().map(|(t, r)| ExifTag::new(*t, *r)).collect(),
            medium: PhotoSize::default(),
            large: PhotoSize::default(),
        }
    }

    #[test]
    fn test_above_sea_level() {
        let p = photo(&[("GPSAltitude", "1523.6 m"), ("GPSAltitudeRef", "Above Sea Level")]);
        assert_eq!(parse_gps_altitude(&p), Ok(1523.6));
        assert_eq!(gps_altitude_meters(&p), Some(1524));
    }

    #[test]
    fn test_below_sea_level() {
        let p = photo(&[("GPSAltitude", "12 m"), ("GPSAltitudeRef", "Below Sea Level")]);
        assert_eq!(parse_gps_altitude(&p), Ok(-12.0));
    }

    #[test]
    fn test_rejects_other_formats() {
        for raw in ["1523.6", "1523.6 ft", "-5 m", " 12 m", "m"] {
            let p = photo(&[("GPSAltitude", raw), ("GPSAltitudeRef", "Above Sea Level")]);
            assert_eq!(
                parse_gps_altitude(&p),
                Err(AltitudeParseError::BadAltitude(raw.to_string()))
            );
        }
    }

    #[test]
    fn test_bad_reference() {
        let p = photo(&[("GPSAltitude", "12 m"), ("GPSAltitudeRef", "0")]);
        assert!(matches!(parse_gps_altitude(&p), Err(AltitudeParseError::BadReference(_))));
        assert_eq!(gps_altitude_meters(&p), None);
    }

    #[test]
    fn test_missing_tags() {
        assert_eq!(
            parse_gps_altitude(&photo(&[])),
            Err(AltitudeParseError::MissingTag("GPSAltitude"))
        );
        assert_eq!(
            parse_gps_altitude(&photo(&[("GPSAltitude", "12 m")])),
            Err(AltitudeParseError::MissingTag("GPSAltitudeRef"))
        );
    }
}
