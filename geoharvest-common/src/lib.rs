//! # GeoHarvest Common Library
//!
//! Shared code for the GeoHarvest ingest services including:
//! - Data model (regions, crawl cursors, photos, features)
//! - Spherical and planar geometry helpers
//! - Upload timestamp parsing
//! - TOML configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    BoundingBox, Candidate, Cursor, ExifTag, Feature, Photo, PhotoSize, Region, SizeVariant,
};
