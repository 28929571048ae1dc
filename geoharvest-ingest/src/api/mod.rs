//! HTTP API handlers for geoharvest-ingest

pub mod health;

pub use health::health_routes;
