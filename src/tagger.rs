//! Batch geotagging over a collection of media resources.
//!
//! Each resource exposes GPS metadata under configurable attribute names.
//! Resources with no GPS fields at all are skipped; resources whose fields
//! are partial or malformed, or whose lookup fails, are reported and
//! skipped. Anything else aborts the batch. The cache is closed on every
//! exit path.

use crate::bucket::{Clock, SystemClock};
use crate::cancel::CancelToken;
use crate::config::GeotagConfig;
use crate::degrees::{to_decimal_degrees, Hemisphere, Rational};
use crate::error::{GeotagError, Result};
use crate::location::{Coordinate, Geocoder, Geotag, LocationResolver};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// A raw metadata value as the media source reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Rationals(Vec<Rational>),
    Text(String),
    /// Anything else (numbers, fractional pairs, nested objects). Kept
    /// verbatim so unrelated attributes round-trip untouched.
    Other(serde_json::Value),
}

/// A media resource the tagger can read GPS fields from and annotate.
pub trait MediaResource {
    /// Identifier for log lines and failure reports.
    fn id(&self) -> String;

    fn meta(&self, attr: &str) -> Option<MetaValue>;

    fn set_geotag(&mut self, tag: Geotag);
}

#[derive(Debug)]
pub struct ResourceFailure {
    pub id: String,
    pub error: GeotagError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub tagged: usize,
    /// Resources without any GPS metadata.
    pub skipped: usize,
    pub failed: Vec<ResourceFailure>,
}

/// Read and convert a resource's GPS fields.
///
/// `Ok(None)` when all four fields are absent; `IncompleteCoordinate` when
/// only some are.
pub fn read_coordinate<R: MediaResource + ?Sized>(resource: &R, config: &GeotagConfig) -> Result<Option<Coordinate>> {
    let attrs = [
        &config.latitude_attr,
        &config.latitude_ref_attr,
        &config.longitude_attr,
        &config.longitude_ref_attr,
    ];
    let values = attrs.map(|attr| resource.meta(attr));

    let (lat, lng) = match values {
        [None, None, None, None] => return Ok(None),
        [Some(lat), Some(lat_ref), Some(lng), Some(lng_ref)] => (
            to_decimal_degrees(rationals(&lat, &config.latitude_attr)?, hemisphere(&lat_ref, &config.latitude_ref_attr)?)?,
            to_decimal_degrees(rationals(&lng, &config.longitude_attr)?, hemisphere(&lng_ref, &config.longitude_ref_attr)?)?,
        ),
        partial => {
            let missing: Vec<&str> = attrs
                .iter()
                .zip(&partial)
                .filter(|(_, v)| v.is_none())
                .map(|(attr, _)| attr.as_str())
                .collect();
            return Err(GeotagError::IncompleteCoordinate {
                missing: missing.join(", "),
            });
        }
    };

    let coord = Coordinate::new(lat, lng);
    if !coord.is_valid() {
        return Err(GeotagError::MalformedRational(format!("coordinate out of range: {}", coord)));
    }
    Ok(Some(coord))
}

fn rationals<'a>(value: &'a MetaValue, attr: &str) -> Result<&'a [Rational]> {
    match value {
        MetaValue::Rationals(r) => Ok(r),
        MetaValue::Text(t) => Err(GeotagError::MalformedRational(format!("{} is text ('{}'), not rationals", attr, t))),
        MetaValue::Other(v) => Err(GeotagError::MalformedRational(format!("{} is not a rational list: {}", attr, v))),
    }
}

fn hemisphere(value: &MetaValue, attr: &str) -> Result<Hemisphere> {
    match value {
        MetaValue::Text(t) => t.parse(),
        MetaValue::Rationals(_) | MetaValue::Other(_) => {
            Err(GeotagError::MalformedRational(format!("{} is not a hemisphere reference", attr)))
        }
    }
}

/// Drives one tagging batch.
pub struct GeoTagger<'a> {
    config: &'a GeotagConfig,
    cancel: CancelToken,
    offline: bool,
}

impl<'a> GeoTagger<'a> {
    pub fn new(config: &'a GeotagConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            offline: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn process<R: MediaResource, P: Geocoder>(&self, resources: &mut [R], provider: P) -> Result<BatchReport> {
        self.process_with_clock(resources, provider, SystemClock)
    }

    #[instrument(skip_all, fields(resources = resources.len(), storage = %self.config.storage.backend))]
    pub fn process_with_clock<R: MediaResource, P: Geocoder, C: Clock>(
        &self,
        resources: &mut [R],
        provider: P,
        clock: C,
    ) -> Result<BatchReport> {
        let mut resolver =
            LocationResolver::from_config_with_clock(self.config, provider, clock)?.with_cancel(self.cancel.clone());
        resolver.set_offline(self.offline);

        let outcome = self.tag_all(&mut resolver, resources);
        let closed = resolver.close();

        let report = outcome?;
        closed?;

        info!(
            "Tagged {} resources, skipped {}, failed {}",
            report.tagged,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    fn tag_all<R: MediaResource, P: Geocoder, C: Clock>(
        &self,
        resolver: &mut LocationResolver<P, C>,
        resources: &mut [R],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for resource in resources.iter_mut() {
            let outcome = read_coordinate(&*resource, self.config).and_then(|coord| match coord {
                Some(coord) => resolver.resolve(coord).map(|record| Some((coord, record))),
                None => Ok(None),
            });

            match outcome {
                Ok(Some((coord, record))) => {
                    resource.set_geotag(Geotag::new(&record, coord));
                    report.tagged += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(error) if error.is_per_resource() => {
                    let id = resource.id();
                    warn!("Skipping {}: {}", id, error);
                    report.failed.push(ResourceFailure { id, error });
                }
                Err(error) => return Err(error),
            }
        }

        Ok(report)
    }
}
