//! Reverse geocoding providers and address-component extraction.

use super::types::LocationRecord;
use crate::config::GeotagConfig;
use crate::error::{GeotagError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Provider capability ────────────────────────────────────────

/// Something that turns a position into a structured address.
pub trait Geocoder {
    /// Provider name, for log lines.
    fn name(&self) -> &str;

    fn get_by_position(&self, lat: f64, lng: f64, sensor: bool) -> Result<AddressResult>;
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_by_position(&self, lat: f64, lng: f64, sensor: bool) -> Result<AddressResult> {
        (**self).get_by_position(lat, lng, sensor)
    }
}

impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_by_position(&self, lat: f64, lng: f64, sensor: bool) -> Result<AddressResult> {
        (**self).get_by_position(lat, lng, sensor)
    }
}

/// Candidate locations, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "results")]
    pub locations: Vec<CandidateLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateLocation {
    #[serde(default, rename = "address_components")]
    pub components: Vec<AddressComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    #[serde(rename = "long_name")]
    pub long: String,
    #[serde(rename = "short_name")]
    pub short: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl AddressComponent {
    pub fn new(types: &[&str], long: &str, short: &str) -> Self {
        Self {
            long: long.to_string(),
            short: short.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.types.iter().any(|t| t == tag)
    }
}

// ─── Component priority table ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Country,
    City,
    Address,
    AddressNumber,
}

/// Type tags per field, in priority order. A tag earlier in the list wins
/// over a later one regardless of where the components appear, so
/// `postal_town` beats `sublocality` even when listed after it.
const FIELD_PRIORITY: &[(Field, &[&str])] = &[
    (Field::Country, &["country"]),
    (Field::City, &["postal_town", "sublocality"]),
    (Field::Address, &["route"]),
    (Field::AddressNumber, &["street_number"]),
];

/// First component matching the highest-priority tag that matches at all.
fn first_match<'a>(components: &'a [AddressComponent], tags: &[&str]) -> Option<&'a AddressComponent> {
    tags.iter()
        .find_map(|tag| components.iter().find(|c| c.has_type(tag)))
}

/// Build a record from the first candidate location.
pub fn extract_record(result: &AddressResult) -> Result<LocationRecord> {
    let location = result.locations.first().ok_or_else(|| {
        GeotagError::LookupFailed(match &result.status {
            Some(status) => format!("no locations returned (status {})", status),
            None => "no locations returned".into(),
        })
    })?;

    let mut record = LocationRecord::default();
    for (field, tags) in FIELD_PRIORITY {
        let Some(component) = first_match(&location.components, tags) else {
            continue;
        };
        match field {
            Field::Country => {
                record.country = Some(component.long.clone());
                record.country_code = Some(component.short.clone());
            }
            Field::City => record.city = Some(component.long.clone()),
            Field::Address => record.address = Some(component.long.clone()),
            Field::AddressNumber => record.address_number = Some(component.long.clone()),
        }
    }

    Ok(record)
}

// ─── HTTP provider ──────────────────────────────────────────────

const USER_AGENT: &str = concat!("geotag/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking JSON-over-HTTP reverse geocoder.
///
/// Sends `latlng`, `sensor` and optionally `key` as query parameters and
/// expects a `results[].address_components[]` body.
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    name: String,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGeocoder {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &GeotagConfig) -> Self {
        Self::new(config.provider.clone(), config.endpoint.clone(), config.api_key.clone())
    }
}

impl Geocoder for HttpGeocoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_by_position(&self, lat: f64, lng: f64, sensor: bool) -> Result<AddressResult> {
        let mut request = ureq::get(&self.endpoint)
            .set("User-Agent", USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .query("latlng", &format!("{},{}", lat, lng))
            .query("sensor", if sensor { "true" } else { "false" });
        if let Some(key) = &self.api_key {
            request = request.query("key", key);
        }

        let response = request
            .call()
            .map_err(|e| GeotagError::LookupFailed(format!("{}: {}", self.name, e)))?;

        let result: AddressResult = response
            .into_json()
            .map_err(|e| GeotagError::LookupFailed(format!("{}: invalid response: {}", self.name, e)))?;

        if result.locations.is_empty() {
            return Err(GeotagError::LookupFailed(format!(
                "{}: no results for {},{} (status {})",
                self.name,
                lat,
                lng,
                result.status.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::barcelona_result;
    use super::*;

    fn single(components: Vec<AddressComponent>) -> AddressResult {
        AddressResult {
            status: None,
            locations: vec![CandidateLocation { components }],
        }
    }

    #[test]
    fn test_extract_full_record() {
        let rec = extract_record(&barcelona_result()).unwrap();
        assert_eq!(rec.country.as_deref(), Some("Spain"));
        assert_eq!(rec.country_code.as_deref(), Some("ES"));
        assert_eq!(rec.city.as_deref(), Some("Barcelona"));
        assert_eq!(rec.address.as_deref(), Some("Carrer de Mallorca"));
        assert_eq!(rec.address_number.as_deref(), Some("401"));
    }

    #[test]
    fn test_postal_town_beats_earlier_sublocality() {
        let result = single(vec![
            AddressComponent::new(&["sublocality", "political"], "A", "A"),
            AddressComponent::new(&["postal_town"], "B", "B"),
        ]);
        assert_eq!(extract_record(&result).unwrap().city.as_deref(), Some("B"));
    }

    #[test]
    fn test_sublocality_does_not_overwrite_postal_town() {
        let result = single(vec![
            AddressComponent::new(&["postal_town"], "B", "B"),
            AddressComponent::new(&["sublocality"], "A", "A"),
        ]);
        assert_eq!(extract_record(&result).unwrap().city.as_deref(), Some("B"));
    }

    #[test]
    fn test_sublocality_fallback() {
        let result = single(vec![
            AddressComponent::new(&["sublocality", "sublocality_level_1"], "Shibuya", "Shibuya"),
            AddressComponent::new(&["sublocality"], "Later", "Later"),
            AddressComponent::new(&["country"], "Japan", "JP"),
        ]);
        let rec = extract_record(&result).unwrap();
        assert_eq!(rec.city.as_deref(), Some("Shibuya"));
        assert_eq!(rec.country_code.as_deref(), Some("JP"));
    }

    #[test]
    fn test_missing_components_stay_unset() {
        let rec = extract_record(&single(vec![AddressComponent::new(&["country"], "Iceland", "IS")])).unwrap();
        assert_eq!(rec.country.as_deref(), Some("Iceland"));
        assert!(rec.city.is_none());
        assert!(rec.address.is_none());
        assert!(rec.address_number.is_none());
    }

    #[test]
    fn test_only_first_location_used() {
        let mut result = single(vec![AddressComponent::new(&["country"], "Norway", "NO")]);
        result.locations.push(CandidateLocation {
            components: vec![AddressComponent::new(&["postal_town"], "Tromsø", "Tromsø")],
        });
        let rec = extract_record(&result).unwrap();
        assert!(rec.city.is_none());
    }

    #[test]
    fn test_no_locations_is_lookup_failure() {
        let result = AddressResult {
            status: Some("ZERO_RESULTS".into()),
            locations: vec![],
        };
        let err = extract_record(&result).unwrap_err();
        assert!(matches!(err, GeotagError::LookupFailed(ref m) if m.contains("ZERO_RESULTS")));
    }

    #[test]
    fn test_deserialize_provider_json() {
        let json = r#"{
            "status": "OK",
            "results": [{
                "address_components": [
                    {"long_name": "Stockholm", "short_name": "Stockholm", "types": ["postal_town"]},
                    {"long_name": "Sweden", "short_name": "SE", "types": ["country", "political"]}
                ],
                "formatted_address": "Stockholm, Sweden"
            }]
        }"#;
        let result: AddressResult = serde_json::from_str(json).unwrap();
        let rec = extract_record(&result).unwrap();
        assert_eq!(rec.city.as_deref(), Some("Stockholm"));
        assert_eq!(rec.country_code.as_deref(), Some("SE"));
    }

    #[test]
    fn test_http_geocoder_from_config() {
        let config = GeotagConfig {
            provider: "osm".into(),
            api_key: Some("secret".into()),
            ..Default::default()
        };
        let geocoder = HttpGeocoder::from_config(&config);
        assert_eq!(geocoder.name(), "osm");
        assert_eq!(geocoder.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_http_geocoder_unreachable_endpoint() {
        let geocoder = HttpGeocoder::new("local", "http://127.0.0.1:9/geocode", None);
        let err = geocoder.get_by_position(41.4, 2.17, true).unwrap_err();
        assert!(matches!(err, GeotagError::LookupFailed(_)));
    }
}
