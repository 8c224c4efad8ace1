//! Location subsystem: coordinate quantization, the coordinate cache,
//! reverse-geocoding providers and the rate-limited resolver.

pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cache::{CoordinateCache, StorageKind};
pub use providers::{extract_record, AddressComponent, AddressResult, CandidateLocation, Geocoder, HttpGeocoder};
pub use resolver::LocationResolver;
pub use types::{CacheKey, Coordinate, Geotag, LocationRecord};
