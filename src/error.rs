//! Error taxonomy for the geotagging pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeotagError>;

#[derive(Debug, Error)]
pub enum GeotagError {
    /// A GPS rational could not be converted (zero denominator, short triple).
    #[error("Malformed GPS rational: {0}")]
    MalformedRational(String),

    /// Some of the latitude/longitude fields are present, others are not.
    #[error("Incomplete coordinate: missing {missing}")]
    IncompleteCoordinate { missing: String },

    #[error("Unsupported geotag storage: {0}")]
    UnsupportedStorage(String),

    #[error("Geolocation lookup failed: {0}")]
    LookupFailed(String),

    /// Stored bytes under `key` do not decode into a location record.
    #[error("Corrupt cache entry for key {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl GeotagError {
    /// Errors local to a single resource: the batch reports them and moves on.
    pub fn is_per_resource(&self) -> bool {
        matches!(
            self,
            Self::MalformedRational(_) | Self::IncompleteCoordinate { .. } | Self::LookupFailed(_)
        )
    }
}

impl From<sled::Error> for GeotagError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for GeotagError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
