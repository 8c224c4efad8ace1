//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Quantized coordinate used as the cache key: `"<lat>,<lng>"` with both
/// axes rounded to a fixed number of decimal places.
///
/// Coordinates that round to the same value share a key; at 6 places that
/// is roughly 0.11 m.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

const KEY_SEPARATOR: char = ',';

impl CacheKey {
    pub fn quantize(coord: Coordinate, precision: usize) -> Self {
        Self(format!(
            "{}{}{}",
            format_axis(coord.lat, precision),
            KEY_SEPARATOR,
            format_axis(coord.lng, precision)
        ))
    }

    /// Recover the quantized coordinate the key stands for.
    pub fn to_coordinate(&self) -> Option<Coordinate> {
        let (lat, lng) = self.0.split_once(KEY_SEPARATOR)?;
        Some(Coordinate::new(lat.parse().ok()?, lng.parse().ok()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Round to `precision` places. Values that round to zero lose their sign,
/// so `-0.0000001` and `0.0000001` share a key.
fn format_axis(value: f64, precision: usize) -> String {
    let s = format!("{:.*}", precision, value);
    match s.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => s,
    }
}

/// A reverse-geocoded place. Any field the provider did not report is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub address_number: Option<String>,
}

impl LocationRecord {
    pub fn display_line(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (Some(city), None) => city.clone(),
            (None, Some(country)) => country.clone(),
            (None, None) => "Unknown location".into(),
        }
    }
}

/// The annotation attached back onto a media resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geotag {
    pub city: Option<String>,
    pub country: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl Geotag {
    pub fn new(record: &LocationRecord, coord: Coordinate) -> Self {
        Self {
            city: record.city.clone(),
            country: record.country.clone(),
            lat: coord.lat,
            lng: coord.lng,
        }
    }
}
