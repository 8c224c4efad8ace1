//! Geotag media resources from their GPS metadata.
//!
//! Coordinates are quantized into cache keys; cache misses go to a
//! reverse-geocoding provider paced by a token bucket.

pub mod bucket;
pub mod cancel;
pub mod config;
pub mod degrees;
pub mod error;
pub mod location;
pub mod manifest;
pub mod tagger;

pub use error::{GeotagError, Result};
