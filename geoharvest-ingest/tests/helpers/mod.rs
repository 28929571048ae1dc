//! Test Helper Utilities
//!
//! Shared utilities for testing geoharvest-ingest

#![allow(dead_code)]

pub mod builders;
pub mod db_utils;
pub mod fakes;

// Re-export commonly used items
pub use builders::{
    candidate, denali, detail, gps_exif, standard_sizes, stored_photo, INSIDE, OUTSIDE,
};
pub use db_utils::create_test_db;
pub use fakes::{FakeClassifier, FakeElevation, FakeImages, FakeOverpass, FakeSearch, FakeStore};
