//! Configuration surface: attribute names, provider, pacing, precision, storage.
//!
//! Every field is settable by flag, by `GEOTAG_*` environment variable, or
//! from a JSON config file. Missing JSON fields take the same defaults as
//! the flags.

use crate::error::{GeotagError, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Decimal places beyond this exceed f64 significance.
const MAX_PRECISION: usize = 15;

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeotagConfig {
    /// Metadata attribute holding the latitude rationals.
    #[arg(long, env = "GEOTAG_LATITUDE_ATTR", default_value = "latitude.value")]
    pub latitude_attr: String,

    /// Metadata attribute holding the latitude hemisphere (N/S).
    #[arg(long, env = "GEOTAG_LATITUDE_REF_ATTR", default_value = "latitude.ref")]
    pub latitude_ref_attr: String,

    /// Metadata attribute holding the longitude rationals.
    #[arg(long, env = "GEOTAG_LONGITUDE_ATTR", default_value = "longitude.value")]
    pub longitude_attr: String,

    /// Metadata attribute holding the longitude hemisphere (E/W).
    #[arg(long, env = "GEOTAG_LONGITUDE_REF_ATTR", default_value = "longitude.ref")]
    pub longitude_ref_attr: String,

    /// Geolocation provider name.
    #[arg(long, env = "GEOTAG_PROVIDER", default_value = "google")]
    pub provider: String,

    /// Provider reverse-geocoding endpoint.
    #[arg(long, env = "GEOTAG_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Optional provider API key.
    #[arg(long, env = "GEOTAG_API_KEY")]
    pub api_key: Option<String>,

    /// Sensor flag forwarded to the provider.
    #[arg(long, env = "GEOTAG_SENSOR", default_value_t = true, action = clap::ArgAction::Set)]
    pub sensor: bool,

    /// Provider requests per second.
    #[arg(long, env = "GEOTAG_RATE", default_value_t = 1.0)]
    pub rate: f64,

    /// Maximum burst of back-to-back requests.
    #[arg(long, env = "GEOTAG_BURST", default_value_t = 10.0)]
    pub burst: f64,

    /// Tokens available at startup.
    #[arg(long, env = "GEOTAG_INITIAL_TOKENS", default_value_t = 1.0)]
    pub initial_tokens: f64,

    /// Decimal places kept in cache keys.
    #[arg(long, env = "GEOTAG_PRECISION", default_value_t = 6)]
    pub precision: usize,

    #[command(flatten)]
    pub storage: StorageConfig,
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend: dbm or sled.
    #[arg(long = "storage", env = "GEOTAG_STORAGE", default_value = "dbm")]
    pub backend: String,

    /// Directory holding the cache store.
    #[arg(long = "storage-path", env = "GEOTAG_STORAGE_PATH", default_value = ".")]
    pub path: PathBuf,

    /// File (or directory, for sled) name of the store inside `path`.
    #[arg(long = "storage-name", env = "GEOTAG_STORAGE_NAME", default_value = "geotag.db")]
    pub name: String,
}

impl Default for GeotagConfig {
    fn default() -> Self {
        Self {
            latitude_attr: "latitude.value".into(),
            latitude_ref_attr: "latitude.ref".into(),
            longitude_attr: "longitude.value".into(),
            longitude_ref_attr: "longitude.ref".into(),
            provider: "google".into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            api_key: None,
            sensor: true,
            rate: 1.0,
            burst: 10.0,
            initial_tokens: 1.0,
            precision: 6,
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "dbm".into(),
            path: PathBuf::from("."),
            name: "geotag.db".into(),
        }
    }
}

impl StorageConfig {
    /// Full path of the store.
    pub fn location(&self) -> PathBuf {
        self.path.join(&self.name)
    }
}

impl GeotagConfig {
    /// Load from a JSON file. Absent fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| GeotagError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&data).map_err(|e| GeotagError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(GeotagError::InvalidConfig(format!("rate must be positive, got {}", self.rate)));
        }
        if !(self.burst.is_finite() && self.burst > 0.0) {
            return Err(GeotagError::InvalidConfig(format!("burst must be positive, got {}", self.burst)));
        }
        if !(self.initial_tokens.is_finite() && self.initial_tokens >= 0.0) {
            return Err(GeotagError::InvalidConfig(format!(
                "initial tokens must be non-negative, got {}",
                self.initial_tokens
            )));
        }
        if self.initial_tokens > self.burst {
            return Err(GeotagError::InvalidConfig(format!(
                "initial tokens ({}) exceed burst ({})",
                self.initial_tokens, self.burst
            )));
        }
        if self.precision > MAX_PRECISION {
            return Err(GeotagError::InvalidConfig(format!(
                "precision must be at most {}, got {}",
                MAX_PRECISION, self.precision
            )));
        }
        Ok(())
    }
}
